//! Error taxonomy for the integration manager

use super::events::ModelKind;
use thiserror::Error;

/// Errors returned by registration, lookup and queue operations.
///
/// Expected conditions (duplicates, missing entries, a full queue) are
/// reported here rather than panicking.
#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("model {kind}/{id} is already registered")]
    AlreadyRegistered { kind: ModelKind, id: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("event queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("event sequence numbers exhausted")]
    SequenceExhausted,

    #[error("capacity exceeded (limit {limit})")]
    CapacityExceeded { limit: usize },

    #[error("allocation failure")]
    AllocationFailure,

    #[error("validation failure: {0}")]
    ValidationFailure(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<std::collections::TryReserveError> for IntegrationError {
    fn from(_: std::collections::TryReserveError) -> Self {
        IntegrationError::AllocationFailure
    }
}

/// Result type for integration operations
pub type IntegrationResult<T> = Result<T, IntegrationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_registered_names_the_model() {
        let err = IntegrationError::AlreadyRegistered {
            kind: ModelKind::Qsm,
            id: "qsm-1".to_string(),
        };
        assert_eq!(err.to_string(), "model QSM/qsm-1 is already registered");
    }

    #[test]
    fn try_reserve_failure_maps_to_allocation_failure() {
        let mut v: Vec<u64> = Vec::new();
        let err = v.try_reserve(usize::MAX).unwrap_err();
        assert!(matches!(
            IntegrationError::from(err),
            IntegrationError::AllocationFailure
        ));
    }
}
