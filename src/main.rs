mod cli;
mod ui;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use fila::clock::SystemClock;
use fila::config::FilaConfig;
use fila::feed::{PollingFeed, StatusFeed};
use fila::lifecycle::{BatchEntry, CancelReason, CancelTarget, EngineSettings, EnterRequest, QueueEngine};
use fila::projector::Projector;
use fila::push::PushRelay;
use fila::server::{self, AppState};
use fila::store::{MemoryStore, RedisStore, TicketStore};
use fila::tenant::Registration;
use ui::Progress;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "fila=debug,tower_http=debug" } else { "fila=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let config = match &cli.config {
        Some(path) => FilaConfig::load_from(path)?,
        None => FilaConfig::load()?,
    };

    match config.redis_url.clone() {
        Some(url) => {
            let store = RedisStore::connect(&url)
                .await
                .with_context(|| format!("connecting to redis at {url}"))?;
            run(cli, config, store).await
        }
        None => {
            tracing::warn!("no redis_url configured, queues live in memory only");
            run(cli, config, MemoryStore::new()).await
        }
    }
}

async fn run<S: TicketStore>(cli: Cli, config: FilaConfig, store: S) -> Result<()> {
    let clock = Arc::new(SystemClock);
    let mut engine = QueueEngine::new(store.clone(), clock.clone(), EngineSettings::from(&config));
    if let Some(url) = &config.push_relay_url {
        engine = engine.with_push(PushRelay::new(url.clone(), config.push_relay_token.clone())?);
    }
    let projector = Projector::new(store, clock);

    match cli.command {
        Command::Serve { bind } => {
            let addr = bind.unwrap_or_else(|| config.bind.clone());
            server::serve(&addr, AppState::new(engine, projector)).await?;
        }
        Command::Register {
            tenant,
            hash,
            label,
        } => {
            let keys = engine
                .tenants()
                .register(Registration {
                    tenant_id: tenant,
                    credential_hash: hash,
                    label,
                    schedule: None,
                })
                .await?;
            println!("Tenant {} cadastrado", keys.tenant());
        }
        Command::Enter {
            tenant,
            priority,
            name,
        } => {
            let entered = engine.enter(&tenant, EnterRequest { priority, name }).await?;
            println!("{}", ui::entered_message(&entered));
        }
        Command::Import {
            tenant,
            file,
            priority,
        } => {
            let entries = read_import(&file, priority)?;
            let progress = Progress::start(&format!("Importando {} nomes...", entries.len()));
            match engine.enter_batch(&tenant, entries).await {
                Ok(imported) => progress.success(&format!(
                    "{} senhas emitidas ({} preferenciais, {} normais)",
                    imported.imported, imported.priority, imported.normal
                )),
                Err(e) => {
                    progress.fail(&e.to_string());
                    return Err(e.into());
                }
            }
        }
        Command::Call {
            tenant,
            attendant,
            ticket,
        } => {
            let outcome = engine.call(&tenant, &attendant, ticket).await?;
            println!("{}", ui::call_message(&outcome));
        }
        Command::Attend { tenant, ticket } => {
            let attended = engine.attend(&tenant, ticket).await?;
            println!(
                "Senha {} atendida: espera {}, atendimento {}",
                attended.ticket,
                ui::duration(attended.wait),
                ui::duration(attended.duration)
            );
        }
        Command::Cancel {
            tenant,
            ticket,
            missed,
        } => {
            let reason = if missed { CancelReason::Missed } else { CancelReason::Client };
            let outcome = engine
                .cancel(&tenant, CancelTarget::Ticket(ticket), reason, None)
                .await?;
            println!("{}", ui::cancel_message(&outcome));
        }
        Command::Status { tenant } => {
            let view = projector.status(&tenant).await?;
            ui::print_status(&tenant, &view);
        }
        Command::Report { tenant, json } => {
            let progress = Progress::start("Montando relatório...");
            let report = projector.report(&tenant).await;
            let report = match report {
                Ok(report) => {
                    progress.success(&format!("{} senhas", report.tickets.len()));
                    report
                }
                Err(e) => {
                    progress.fail(&e.to_string());
                    return Err(e.into());
                }
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                ui::print_report(&report);
            }
        }
        Command::Reset { tenant, attendant } => {
            let outcome = engine.reset(&tenant, &attendant).await?;
            println!("Fila zerada ({} chaves removidas)", outcome.cleared_keys);
        }
        Command::SetCounter { tenant, next } => {
            let outcome = engine.set_ticket_counter(&tenant, next).await?;
            let mut message = format!("Próxima senha: {}", outcome.ticket_number);
            if outcome.skipped > 0 {
                message.push_str(&format!(" ({} números pulados)", outcome.skipped));
            }
            println!("{message}");
        }
        Command::Watch { tenant } => {
            let feed = PollingFeed::new(projector, Duration::from_secs(config.poll_interval_secs));
            let mut updates = feed.subscribe(&tenant).await?;
            loop {
                tokio::select! {
                    update = updates.recv() => match update {
                        Some(view) => ui::print_status(&tenant, &view),
                        None => break,
                    },
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
        }
    }

    Ok(())
}

/// JSON `[{name, priority}]`, or plain text with one name per line.
fn read_import(path: &Path, priority: bool) -> Result<Vec<BatchEntry>> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;

    if contents.trim_start().starts_with('[') {
        return serde_json::from_str(&contents)
            .with_context(|| format!("parsing {}", path.display()));
    }

    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|name| BatchEntry {
            name: name.to_string(),
            priority,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_plain_text_import() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Ana\n\n  Bia  \nCarlos").unwrap();

        let entries = read_import(file.path(), true).unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["Ana", "Bia", "Carlos"]);
        assert!(entries.iter().all(|e| e.priority));
    }

    #[test]
    fn reads_json_import() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"name": "Ana"}}, {{"name": "Bia", "priority": true}}]"#).unwrap();

        let entries = read_import(file.path(), false).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(!entries[0].priority);
        assert!(entries[1].priority);
    }
}
