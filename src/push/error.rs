//! Tipos de erro para o cliente do relay de notificações push.
//!
//! Define [`NotifyError`] com variantes para rate limiting, erros do relay
//! e erros de rede. Usa `thiserror` para derivar `Display` e `Error`
//! automaticamente a partir dos atributos `#[error(...)]`.

use thiserror::Error;

/// Erros que podem ocorrer ao entregar uma notificação ao relay.
///
/// Nenhum deles interrompe a chamada de senha: o motor registra o erro e segue.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// O relay retornou HTTP 429.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// O relay recusou a notificação (ex.: 410 assinatura expirada).
    #[error("relay error (status {status}): {message}")]
    RelayError { status: u16, message: String },

    /// Falha de rede subjacente (DNS, conexão recusada, timeout).
    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

impl NotifyError {
    /// A assinatura não vale mais e pode ser descartada.
    pub fn is_gone(&self) -> bool {
        matches!(self, NotifyError::RelayError { status: 404 | 410, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_display() {
        let err = NotifyError::RateLimited {
            retry_after_ms: 5000,
        };
        assert_eq!(err.to_string(), "rate limited, retry after 5000ms");
    }

    #[test]
    fn relay_error_display_and_gone() {
        let err = NotifyError::RelayError {
            status: 410,
            message: "subscription expired".into(),
        };
        assert_eq!(err.to_string(), "relay error (status 410): subscription expired");
        assert!(err.is_gone());
        assert!(
            !NotifyError::RelayError {
                status: 500,
                message: String::new()
            }
            .is_gone()
        );
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NotifyError>();
    }
}
