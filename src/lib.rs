//! Integration Bus: event-driven integration of heterogeneous models
//!
//! Connects independently developed models (a quantum stochastic model, a
//! self-organizing map, a weighted quantum model, and custom models)
//! through a bounded event queue. Models publish events, subscribe to
//! event kinds, offer services to each other, and run synchronization
//! rounds. When a model's confidence is low it asks a text-completion
//! service for knowledge and announces the result to its peers.
//!
//! # Core Concepts
//!
//! - **Adapters**: one `ModelAdapter` per model instance, shared with the manager
//! - **Events**: typed, sequenced, optionally carrying a text or binary payload
//! - **Handlers**: plain callbacks; `EventKind::Custom` handlers see every event
//! - **Services**: providers announced by models, reference-counted by consumers
//!
//! # Example
//!
//! ```
//! use integration_bus::{EventKind, IntegrationEvent, IntegrationManager, ModelKind};
//!
//! let manager = IntegrationManager::default();
//! let sequence = manager
//!     .publish_event(IntegrationEvent::new(EventKind::StateChanged, "qsm-1", ModelKind::Qsm))
//!     .unwrap();
//! assert_eq!(sequence, 1);
//! ```

pub mod adapter;
pub mod completion;
pub mod integration;

pub use adapter::{AdapterError, ModelAdapter, QsmAdapter, SomAdapter, StandardAdapter, WeqAdapter};
pub use completion::{CompletionError, KnowledgeArtifact, MockCompletion, TextCompletion};
pub use integration::{
    EventKind, EventPayload, IntegrationBus, IntegrationConfig, IntegrationError, IntegrationEvent,
    IntegrationManager, IntegrationResult, ModelKind, ServiceProvider, SyncOutcome, SyncStrategy,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
