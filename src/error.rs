use thiserror::Error;

pub type Result<T, E = QueueError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Invalid tenant: {0}")]
    InvalidTenant(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Call lock for tenant {0} is held by another attendant, try again")]
    Contention(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl QueueError {
    /// Classifies the error for the caller: a bad request can be fixed by the
    /// caller, a system failure can only be retried.
    pub fn kind(&self) -> FailureKind {
        match self {
            QueueError::InvalidTenant(_)
            | QueueError::InvalidArgument(_)
            | QueueError::NotFound(_)
            | QueueError::Json(_)
            | QueueError::Toml(_) => FailureKind::Business,
            QueueError::Contention(_) | QueueError::Store(_) | QueueError::Io(_) => {
                FailureKind::System
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("key {key} holds a value of another type")]
    WrongType { key: String },

    #[error("backend failure: {0}")]
    Backend(String),
}

/// Distinguishes caller mistakes from infrastructure failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FailureKind {
    /// The request cannot succeed as sent (unknown tenant, bad number).
    Business,
    /// The store or the lock failed; the same request may succeed later.
    System,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Business => write!(f, "Business"),
            FailureKind::System => write!(f, "System"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_tenant_display() {
        let err = QueueError::InvalidTenant("acme".into());
        assert_eq!(err.to_string(), "Invalid tenant: acme");
    }

    #[test]
    fn store_errors_are_system_failures() {
        let err = QueueError::from(StoreError::Backend("connection reset".into()));
        assert_eq!(err.kind(), FailureKind::System);
        assert_eq!(err.to_string(), "Store error: backend failure: connection reset");
    }

    #[test]
    fn validation_errors_are_business_failures() {
        assert_eq!(
            QueueError::InvalidArgument("nextTicket".into()).kind(),
            FailureKind::Business
        );
        assert_eq!(QueueError::NotFound("ticket 9".into()).kind(), FailureKind::Business);
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<QueueError>();
    }
}
