//! ModelAdapter trait, the contract every model implements
//!
//! The manager drives adapters through four groups of operations:
//! lifecycle, state exchange, event processing and service management.
//! Only identity and `process_event` are mandatory; everything else has
//! a permissive default.

use crate::completion::CompletionError;
use crate::integration::{EventKind, IntegrationError, IntegrationEvent, ModelKind, ServiceProvider};
use async_trait::async_trait;
use thiserror::Error;

/// Errors from adapter callbacks.
///
/// The dispatch loop logs these and keeps draining; they never abort
/// delivery to other subscribers.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("adapter not initialized")]
    NotInitialized,
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("completion error: {0}")]
    Completion(#[from] CompletionError),
    #[error("integration error: {0}")]
    Integration(#[from] IntegrationError),
    #[error("adapter error: {0}")]
    Internal(String),
}

/// A model taking part in integration.
///
/// Adapters are shared with the manager through `Arc`; the manager never
/// owns the model behind them. All methods take `&self`, so implementations
/// keep mutable state behind their own locks.
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    fn model_kind(&self) -> ModelKind;

    /// Unique within a model kind
    fn model_id(&self) -> &str;

    fn model_name(&self) -> &str;

    fn version(&self) -> &str {
        "0.0.0"
    }

    async fn initialize(&self, _config: Option<&serde_json::Value>) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn start(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn cleanup(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    /// Serialize the model state.
    fn export_state(&self) -> Result<Vec<u8>, AdapterError> {
        Err(AdapterError::Unsupported("export_state"))
    }

    /// Replace the model state with a previously exported one.
    fn import_state(&self, _state: &[u8]) -> Result<(), AdapterError> {
        Err(AdapterError::Unsupported("import_state"))
    }

    fn validate_state(&self, _state: &[u8]) -> bool {
        false
    }

    /// Handle one dispatched event.
    async fn process_event(&self, event: &IntegrationEvent) -> Result<(), AdapterError>;

    fn subscribe(&self, _kind: EventKind) {}

    fn unsubscribe(&self, _kind: EventKind) {}

    /// Event kinds the adapter wants at registration time.
    fn subscriptions(&self) -> Vec<EventKind> {
        Vec::new()
    }

    fn register_service(&self, _provider: ServiceProvider) -> Result<(), AdapterError> {
        Err(AdapterError::Unsupported("register_service"))
    }

    fn unregister_service(&self, _service_id: &str) -> Result<(), AdapterError> {
        Err(AdapterError::Unsupported("unregister_service"))
    }

    /// Count active services offered by models of `kind`.
    fn discover_services(&self, _kind: ModelKind) -> Result<usize, AdapterError> {
        Ok(0)
    }
}
