//! Interface de linha de comando do FILA baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (serve, enter, call,
//! attend, cancel, status, report, ...) e flags globais (--config, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// FILA: fila virtual multi-tenant com senhas, chamadas e monitores.
#[derive(Debug, Parser)]
#[command(name = "fila", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho do arquivo de configuração (padrão: ./fila.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sobe o servidor HTTP.
    Serve {
        /// Endereço de escuta; sobrepõe `bind` da configuração.
        #[arg(long)]
        bind: Option<String>,
    },

    /// Cadastra um tenant.
    Register {
        tenant: String,

        /// Hash da credencial já calculado.
        #[arg(long)]
        hash: String,

        /// Nome exibido nos monitores.
        #[arg(long, default_value = "")]
        label: String,
    },

    /// Emite uma senha.
    Enter {
        tenant: String,

        /// Senha preferencial.
        #[arg(long, short)]
        priority: bool,

        /// Nome do cliente.
        #[arg(long)]
        name: Option<String>,
    },

    /// Importa uma lista de nomes, um por linha, ou um JSON `[{name, priority}]`.
    Import {
        tenant: String,

        file: PathBuf,

        /// Marca todas as linhas de um arquivo texto como preferenciais.
        #[arg(long, short)]
        priority: bool,
    },

    /// Chama a próxima senha, ou uma senha específica.
    Call {
        tenant: String,

        /// Guichê ou atendente que está chamando.
        #[arg(long, short)]
        attendant: String,

        /// Número a chamar (repetição ou escolha manual).
        #[arg(long)]
        ticket: Option<u64>,
    },

    /// Marca uma senha como atendida.
    Attend { tenant: String, ticket: u64 },

    /// Cancela uma senha.
    Cancel {
        tenant: String,
        ticket: u64,

        /// Registra como não comparecimento em vez de desistência.
        #[arg(long)]
        missed: bool,
    },

    /// Mostra o painel atual da fila.
    Status { tenant: String },

    /// Relatório por senha com totais e médias.
    Report {
        tenant: String,

        /// Imprime o relatório em JSON.
        #[arg(long)]
        json: bool,
    },

    /// Zera a fila do tenant.
    Reset {
        tenant: String,

        #[arg(long, short)]
        attendant: String,
    },

    /// Ajusta o contador para que a próxima senha seja `next`.
    SetCounter { tenant: String, next: u64 },

    /// Acompanha o painel ao vivo até Ctrl-C.
    Watch { tenant: String },
}
