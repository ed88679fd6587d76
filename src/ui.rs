//! Interface de terminal do FILA: spinners e saída colorida.
//!
//! Usa as crates `indicatif` para spinners de progresso e `console` para
//! estilização com cores. O [`Progress`] acompanha visualmente uma operação
//! no terminal; as funções `print_*` formatam os resultados.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use fila::lifecycle::{Call, CallOutcome, CancelOutcome, Entered, TicketClass, TicketState};
use fila::projector::{Report, StatusView};

/// Spinner exibido enquanto uma operação conversa com o armazenamento.
pub struct Progress {
    // Barra de progresso/spinner do indicatif.
    pb: ProgressBar,
    // Estilo verde para mensagens de sucesso.
    green: Style,
    // Estilo vermelho para mensagens de falha.
    red: Style,
}

impl Progress {
    /// Inicia o spinner com a descrição da operação.
    pub fn start(description: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(description.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
        }
    }

    /// Finaliza o spinner com uma mensagem de sucesso em verde.
    pub fn success(&self, message: &str) {
        self.pb.finish_and_clear();
        println!("  {} {message}", self.green.apply_to("✓"));
    }

    /// Finaliza o spinner com uma mensagem de falha em vermelho.
    pub fn fail(&self, message: &str) {
        self.pb.finish_and_clear();
        eprintln!("  {} {message}", self.red.apply_to("✗"));
    }
}

fn class_label(class: TicketClass) -> &'static str {
    match class {
        TicketClass::Normal => "normal",
        TicketClass::Priority => "preferencial",
    }
}

pub fn entered_message(entered: &Entered) -> String {
    let mut message = format!("Senha {} emitida", entered.ticket_number);
    if entered.priority {
        message.push_str(" (preferencial)");
    }
    if entered.off_hours {
        message.push_str(", fora do horário de atendimento");
    }
    if let Some(client_id) = &entered.client_id {
        message.push_str(&format!("\n  clientId: {client_id}"));
    }
    message
}

pub fn call_message(outcome: &CallOutcome) -> String {
    match outcome {
        CallOutcome::Called(Call {
            ticket,
            attendant,
            class,
            repeat,
        }) => {
            let again = if *repeat { " novamente" } else { "" };
            format!(
                "Senha {ticket} ({}) chamada{again} para {attendant}",
                class_label(*class)
            )
        }
        CallOutcome::Empty => "Ninguém aguardando".to_string(),
    }
}

pub fn cancel_message(outcome: &CancelOutcome) -> String {
    match outcome {
        CancelOutcome::Cancelled {
            ticket,
            reason,
            wait,
            ..
        } => format!("Senha {ticket} encerrada ({reason}) após {}", duration(*wait)),
        CancelOutcome::AlreadyAttended { ticket } => {
            format!("Senha {ticket} já foi atendida; nada alterado")
        }
        CancelOutcome::NotCancelled => "Nenhuma senha para cancelar".to_string(),
    }
}

/// Milissegundos como `1m05s`.
pub fn duration(ms: i64) -> String {
    let secs = ms.max(0) / 1000;
    if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{secs}s")
    }
}

/// Painel de monitor: senha atual, contadores e a fila.
pub fn print_status(tenant: &str, view: &StatusView) {
    let bold = Style::new().bold();
    let dim = Style::new().dim();
    let cyan = Style::new().cyan().bold();

    println!("{}", bold.apply_to(format!("─── {tenant} ───")));
    if view.current_call == 0 {
        println!("  Chamando: {}", dim.apply_to("-"));
    } else {
        let tag = if view.current_call_priority { " (preferencial)" } else { "" };
        println!(
            "  Chamando: {}{tag} → {}",
            cyan.apply_to(view.current_call),
            view.current_attendant
        );
    }
    println!(
        "  Emitidas: {}   Aguardando: {}   Atendidas: {}   Canceladas: {}   Ausentes: {}",
        view.ticket_counter,
        view.waiting,
        view.attended_count,
        view.cancelled_count,
        view.missed_count
    );
    if !view.queue.is_empty() {
        let queue: Vec<String> = view
            .queue
            .iter()
            .map(|n| {
                let label = match view.names.get(n) {
                    Some(name) => format!("{n} {name}"),
                    None => n.to_string(),
                };
                if view.priority_history.contains(n) {
                    format!("{label}*")
                } else {
                    label
                }
            })
            .collect();
        println!("  Fila: {}", queue.join(", "));
    }
}

fn state_style(state: TicketState) -> Style {
    match state {
        TicketState::Attended => Style::new().green(),
        TicketState::Cancelled | TicketState::Missed => Style::new().red(),
        TicketState::Called => Style::new().cyan(),
        TicketState::OffHours => Style::new().dim(),
        TicketState::Waiting => Style::new().yellow(),
    }
}

/// Relatório em tabela, uma linha por senha, seguido dos totais.
pub fn print_report(report: &Report) {
    let bold = Style::new().bold();
    println!(
        "{}",
        bold.apply_to(format!(
            "{:>6}  {:<10}  {:>8}  {:>8}  {:<12}  {}",
            "senha", "status", "espera", "duração", "guichê", "nome"
        ))
    );
    for record in &report.tickets {
        let state = format!("{:<10}", record.status.as_str());
        println!(
            "{:>6}  {}  {:>8}  {:>8}  {:<12}  {}{}",
            record.ticket,
            state_style(record.status).apply_to(state),
            record.wait.map(duration).unwrap_or_default(),
            record.duration.map(duration).unwrap_or_default(),
            record.attendant.as_deref().unwrap_or(""),
            record.name.as_deref().unwrap_or(""),
            if record.priority { " *" } else { "" },
        );
    }

    let s = &report.summary;
    println!();
    println!(
        "  Total {}: {} atendidas (espera média {}, atendimento médio {}), {} canceladas, {} ausentes, {} aguardando",
        s.total,
        s.attended.count,
        duration(s.attended.avg_wait),
        duration(s.attended.avg_duration),
        s.cancelled.count,
        s.missed.count,
        s.waiting.count + s.off_hours.count,
    );
    println!(
        "  Preferenciais {} (espera média {}), normais {} (espera média {})",
        s.priority.count,
        duration(s.priority.avg_wait),
        s.normal.count,
        duration(s.normal.avg_wait),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use fila::lifecycle::CancelReason;

    #[test]
    fn formats_durations() {
        assert_eq!(duration(0), "0s");
        assert_eq!(duration(59_999), "59s");
        assert_eq!(duration(65_000), "1m05s");
        assert_eq!(duration(-10), "0s");
    }

    #[test]
    fn entered_message_shows_the_client_id_when_there_is_one() {
        let mut entered = Entered {
            client_id: Some("c-123".into()),
            ticket_number: 4,
            ts: 0,
            priority: true,
            off_hours: false,
        };
        assert_eq!(
            entered_message(&entered),
            "Senha 4 emitida (preferencial)\n  clientId: c-123"
        );

        entered.client_id = None;
        entered.priority = false;
        entered.off_hours = true;
        assert_eq!(
            entered_message(&entered),
            "Senha 4 emitida, fora do horário de atendimento"
        );
    }

    #[test]
    fn messages_describe_outcomes() {
        let call = CallOutcome::Called(Call {
            ticket: 7,
            attendant: "Guichê 2".into(),
            class: TicketClass::Priority,
            repeat: true,
        });
        assert_eq!(
            call_message(&call),
            "Senha 7 (preferencial) chamada novamente para Guichê 2"
        );
        assert_eq!(call_message(&CallOutcome::Empty), "Ninguém aguardando");

        let cancelled = CancelOutcome::Cancelled {
            ticket: 3,
            reason: CancelReason::Missed,
            wait: 90_000,
            duration: 0,
        };
        assert_eq!(cancel_message(&cancelled), "Senha 3 encerrada (missed) após 1m30s");
    }
}
