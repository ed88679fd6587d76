//! Configuração do FILA carregada a partir de `fila.toml`.
//!
//! A struct [`FilaConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! Variáveis de ambiente `FILA_*` têm precedência sobre o arquivo.

use anyhow::{Result, bail};
use serde::Deserialize;
use std::path::Path;

/// Configuração de nível superior carregada de `fila.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct FilaConfig {
    /// Endereço em que o servidor HTTP escuta.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// URL do Redis. Sem valor, usa o armazenamento em memória.
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Máximo de entradas mantidas em cada log de eventos.
    #[serde(default = "default_log_cap")]
    pub log_cap: usize,

    /// Dias até os logs e chaves por senha expirarem.
    #[serde(default = "default_log_ttl_days")]
    pub log_ttl_days: u64,

    /// Intervalo de consulta do feed de status, em segundos.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Validade da trava de chamada por tenant, em milissegundos.
    #[serde(default = "default_call_lock_ttl_ms")]
    pub call_lock_ttl_ms: u64,

    /// URL do relay de notificações push.
    #[serde(default)]
    pub push_relay_url: Option<String>,

    /// Token bearer enviado ao relay de notificações.
    #[serde(default)]
    pub push_relay_token: Option<String>,
}

// Valor padrão para o endereço: todas as interfaces, porta 8080.
fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

// Valor padrão para o tamanho dos logs: 1000 entradas.
fn default_log_cap() -> usize {
    1000
}

// Valor padrão para a retenção: 30 dias.
fn default_log_ttl_days() -> u64 {
    30
}

// Valor padrão para o polling: 5 segundos.
fn default_poll_interval_secs() -> u64 {
    5
}

// Valor padrão para a trava de chamada: 5000ms.
fn default_call_lock_ttl_ms() -> u64 {
    5000
}

impl Default for FilaConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            redis_url: None,
            log_cap: default_log_cap(),
            log_ttl_days: default_log_ttl_days(),
            poll_interval_secs: default_poll_interval_secs(),
            call_lock_ttl_ms: default_call_lock_ttl_ms(),
            push_relay_url: None,
            push_relay_token: None,
        }
    }
}

impl FilaConfig {
    /// Carrega a configuração de `fila.toml` no diretório atual.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("fila.toml"))
    }

    /// Carrega a configuração de um caminho explícito.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<FilaConfig>(&contents)?
        } else {
            Self::default()
        };

        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Recusa valores que travariam o serviço: logs sem espaço, trava de
    /// chamada sem validade e polling sem intervalo.
    pub fn validate(&self) -> Result<()> {
        if self.log_cap == 0 {
            bail!("log_cap deve ser maior que zero");
        }
        if self.call_lock_ttl_ms == 0 {
            bail!("call_lock_ttl_ms deve ser maior que zero");
        }
        if self.poll_interval_secs == 0 {
            bail!("poll_interval_secs deve ser maior que zero");
        }
        Ok(())
    }

    /// Variáveis de ambiente têm precedência sobre o arquivo de configuração.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(url) = non_empty("FILA_REDIS_URL") {
            self.redis_url = Some(url);
        }
        if let Some(bind) = non_empty("FILA_BIND") {
            self.bind = bind;
        }
        if let Some(url) = non_empty("FILA_PUSH_RELAY_URL") {
            self.push_relay_url = Some(url);
        }
        if let Some(token) = non_empty("FILA_PUSH_RELAY_TOKEN") {
            self.push_relay_token = Some(token);
        }
    }

    /// Retenção dos logs e chaves por senha, em segundos.
    pub fn retention_secs(&self) -> u64 {
        self.log_ttl_days * 24 * 60 * 60
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn default_config_values() {
        let config = FilaConfig::default();
        assert_eq!(config.bind, "0.0.0.0:8080");
        assert_eq!(config.log_cap, 1000);
        assert_eq!(config.log_ttl_days, 30);
        assert_eq!(config.poll_interval_secs, 5);
        assert_eq!(config.call_lock_ttl_ms, 5000);
        assert!(config.redis_url.is_none());
        assert!(config.push_relay_url.is_none());
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            redis_url = "redis://127.0.0.1:6379"
            log_cap = 200
        "#;
        let config: FilaConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.redis_url.as_deref(), Some("redis://127.0.0.1:6379"));
        assert_eq!(config.log_cap, 200);
        assert_eq!(config.log_ttl_days, 30);
        assert_eq!(config.bind, "0.0.0.0:8080");
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bind = \"127.0.0.1:9000\"\npoll_interval_secs = 2").unwrap();

        let config = FilaConfig::load_from(file.path()).unwrap();
        assert_eq!(config.poll_interval_secs, 2);
        assert_eq!(config.log_cap, 1000);
    }

    #[test]
    fn load_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = FilaConfig::load_from(&dir.path().join("fila.toml")).unwrap();
        assert_eq!(config.log_cap, 1000);
    }

    #[test]
    fn env_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            ("FILA_REDIS_URL", "redis://cache:6379"),
            ("FILA_BIND", ""),
            ("FILA_PUSH_RELAY_TOKEN", "secret"),
        ]
        .into_iter()
        .collect();

        let mut config = FilaConfig::default();
        config.apply_env(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.redis_url.as_deref(), Some("redis://cache:6379"));
        // Variável vazia não sobrescreve o valor existente.
        assert_eq!(config.bind, "0.0.0.0:8080");
        assert_eq!(config.push_relay_token.as_deref(), Some("secret"));
    }

    #[test]
    fn zero_limits_are_rejected() {
        for line in ["log_cap = 0", "call_lock_ttl_ms = 0", "poll_interval_secs = 0"] {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            writeln!(file, "{line}").unwrap();

            let err = FilaConfig::load_from(file.path()).unwrap_err();
            let field = line.split(' ').next().unwrap();
            assert!(err.to_string().contains(field), "{err}");
        }
        assert!(FilaConfig::default().validate().is_ok());
    }

    #[test]
    fn retention_is_thirty_days() {
        assert_eq!(FilaConfig::default().retention_secs(), 2_592_000);
    }
}
