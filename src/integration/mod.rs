//! Event bus connecting model adapters
//!
//! `IntegrationManager` owns a bounded event queue, the model and service
//! registries and the handler table. Events are published into the queue
//! and delivered on `process_integration_events`: first to every active
//! adapter subscribed to the event kind, then to every matching handler.

mod config;
mod error;
mod events;
mod handlers;
mod manager;
mod queue;
mod registry;

pub use config::IntegrationConfig;
pub use error::{IntegrationError, IntegrationResult};
pub use events::{now_millis, EventKind, EventPayload, IntegrationEvent, ModelKind, SyncStrategy};
pub use handlers::{EventCallback, EventHandlerTable, HandlerId, UserData};
pub use manager::{IntegrationBus, IntegrationManager, IntegrationStats, SyncOutcome, MANAGER_SOURCE_ID};
pub use queue::{EventQueue, DEFAULT_QUEUE_CAPACITY};
pub use registry::{
    ModelInfo, ModelRegistry, RegisteredModel, RegisteredService, ServiceProvider, ServiceRegistry,
    ServiceRemoval, ServiceRole, ServiceUpsert,
};
