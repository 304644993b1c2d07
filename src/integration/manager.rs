//! IntegrationManager: registry owner and event dispatcher
//!
//! All mutable state lives behind a single mutex. The lock is released
//! before any adapter or handler runs, so callbacks may publish events
//! (or try to drain) while a dispatch is in progress.
//!
//! Dispatch order for each event:
//! 1. every active adapter subscribed to the event kind, registration order
//! 2. every active handler for the kind or for the `Custom` wildcard

use super::config::IntegrationConfig;
use super::error::{IntegrationError, IntegrationResult};
use super::events::{now_millis, EventKind, IntegrationEvent, ModelKind, SyncStrategy};
use super::handlers::{EventCallback, EventHandlerTable, HandlerId, UserData};
use super::queue::EventQueue;
use super::registry::{
    ModelInfo, ModelRegistry, RegisteredService, ServiceProvider, ServiceRegistry, ServiceRemoval,
    ServiceUpsert,
};
use crate::adapter::ModelAdapter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Source id stamped on events the manager emits itself.
pub const MANAGER_SOURCE_ID: &str = "integration-manager";

/// The part of the manager adapters call back into.
///
/// Adapters hold this as a `Weak` handle so the manager and its adapters
/// never keep each other alive.
pub trait IntegrationBus: Send + Sync {
    /// Enqueue an event, returning its sequence number.
    fn publish_event(&self, event: IntegrationEvent) -> IntegrationResult<u32>;

    fn register_service(&self, provider: ServiceProvider) -> IntegrationResult<()>;

    fn unregister_service(&self, service_id: &str) -> IntegrationResult<()>;

    fn find_services_by_model(&self, kind: ModelKind) -> Vec<ServiceProvider>;
}

/// Counters describing manager activity since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntegrationStats {
    pub events_published: u64,
    pub events_processed: u64,
    /// Publish attempts refused because the queue was full
    pub events_rejected: u64,
    pub adapter_failures: u64,
    pub sync_count: u64,
}

/// Result of a `synchronize_models` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Called again inside the sync interval; nothing happened
    Skipped,
    /// Called while a drain was running; nothing happened
    Deferred,
    /// Both phases ran; `events_processed` covers both drains
    Completed { events_processed: usize },
}

struct ManagerState {
    queue: EventQueue,
    models: ModelRegistry,
    services: ServiceRegistry,
    handlers: EventHandlerTable,
    last_sync_time: u64,
    stats: IntegrationStats,
}

impl ManagerState {
    fn enqueue(&mut self, event: IntegrationEvent) -> IntegrationResult<u32> {
        let kind = event.kind;
        match self.queue.push(event) {
            Ok(sequence) => {
                self.stats.events_published += 1;
                debug!(event = %kind, sequence, pending = self.queue.len(), "event enqueued");
                Ok(sequence)
            }
            Err(e) => {
                self.stats.events_rejected += 1;
                Err(e)
            }
        }
    }

    /// Enqueue a manager notification. A full queue is logged, not returned:
    /// the operation that triggered the notice has already succeeded.
    fn notify(&mut self, event: IntegrationEvent) {
        let kind = event.kind;
        if let Err(e) = self.enqueue(event) {
            warn!(event = %kind, error = %e, "notification dropped");
        }
    }
}

/// Clears the processing flag when a drain ends, including by panic.
struct ProcessingGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Owns the event queue, adapter registry, service registry and handler
/// table, and drives dispatch.
///
/// Construct one per application and pass it where needed; there is no
/// process-wide instance.
pub struct IntegrationManager {
    config: IntegrationConfig,
    state: Mutex<ManagerState>,
    processing: AtomicBool,
}

impl IntegrationManager {
    pub fn new(config: IntegrationConfig) -> Self {
        let state = ManagerState {
            queue: EventQueue::new(config.queue_capacity),
            models: ModelRegistry::with_capacity(config.initial_model_capacity),
            services: ServiceRegistry::new(config.max_providers),
            handlers: EventHandlerTable::with_capacity(config.initial_handler_capacity),
            last_sync_time: 0,
            stats: IntegrationStats::default(),
        };
        Self {
            config,
            state: Mutex::new(state),
            processing: AtomicBool::new(false),
        }
    }

    fn state(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &IntegrationConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Model adapters
    // ------------------------------------------------------------------

    /// Initialize an adapter and register it.
    ///
    /// The adapter is initialized before it enters the registry, so a
    /// drain running concurrently never dispatches to an uninitialized
    /// adapter. Registration succeeds even when `initialize` fails; the
    /// failure is logged and announced as an `ERROR_OCCURRED` event after
    /// `MODEL_REGISTERED`.
    pub async fn register_model_adapter(&self, adapter: Arc<dyn ModelAdapter>) -> IntegrationResult<()> {
        let kind = adapter.model_kind();
        let id = adapter.model_id().to_string();
        ModelRegistry::validate(adapter.as_ref())?;
        if self.state().models.find(kind, &id).is_some() {
            return Err(IntegrationError::AlreadyRegistered { kind, id });
        }

        let init = adapter.initialize(None).await;

        let mut state = self.state();
        state.models.insert(adapter.clone(), now_millis())?;
        state.notify(
            IntegrationEvent::new(EventKind::ModelRegistered, id.clone(), kind)
                .with_payload(adapter.model_name()),
        );
        info!(model = %kind, id = %id, "model adapter registered");

        if let Err(e) = init {
            warn!(model = %kind, id = %id, error = %e, "adapter failed to initialize");
            state.notify(
                IntegrationEvent::new(EventKind::ErrorOccurred, id, kind)
                    .with_payload(format!("initialize failed: {}", e)),
            );
        }
        Ok(())
    }

    /// Stop, clean up and forget an adapter.
    ///
    /// Lifecycle errors are logged and ignored. The registry slot is
    /// swap-removed, so the order of remaining adapters may change.
    pub async fn unregister_model_adapter(&self, kind: ModelKind, id: &str) -> IntegrationResult<()> {
        let removed = self.state().models.remove(kind, id)?;
        let adapter = removed.adapter;

        if let Err(e) = adapter.stop().await {
            debug!(model = %kind, id, error = %e, "adapter stop failed");
        }
        if let Err(e) = adapter.cleanup().await {
            debug!(model = %kind, id, error = %e, "adapter cleanup failed");
        }

        self.state()
            .notify(IntegrationEvent::new(EventKind::ModelUnregistered, id, kind));
        info!(model = %kind, id, "model adapter unregistered");
        Ok(())
    }

    /// Subscribe a registered model to `event`, in the registry and on the adapter.
    pub fn subscribe_model(&self, kind: ModelKind, id: &str, event: EventKind) -> IntegrationResult<()> {
        let adapter = {
            let mut state = self.state();
            let model = state
                .models
                .find_mut(kind, id)
                .ok_or_else(|| IntegrationError::NotFound(format!("model {}/{}", kind, id)))?;
            model.subscribed_events.insert(event);
            model.adapter.clone()
        };
        adapter.subscribe(event);
        Ok(())
    }

    pub fn unsubscribe_model(&self, kind: ModelKind, id: &str, event: EventKind) -> IntegrationResult<()> {
        let adapter = {
            let mut state = self.state();
            let model = state
                .models
                .find_mut(kind, id)
                .ok_or_else(|| IntegrationError::NotFound(format!("model {}/{}", kind, id)))?;
            model.subscribed_events.remove(&event);
            model.adapter.clone()
        };
        adapter.unsubscribe(event);
        Ok(())
    }

    /// Enable or disable dispatch to an adapter without unregistering it.
    pub fn set_model_active(&self, kind: ModelKind, id: &str, active: bool) -> IntegrationResult<()> {
        let mut state = self.state();
        let model = state
            .models
            .find_mut(kind, id)
            .ok_or_else(|| IntegrationError::NotFound(format!("model {}/{}", kind, id)))?;
        model.active = active;
        Ok(())
    }

    /// Record that the adapter is alive.
    pub fn heartbeat(&self, kind: ModelKind, id: &str) -> IntegrationResult<u64> {
        let now = now_millis();
        let mut state = self.state();
        let model = state
            .models
            .find_mut(kind, id)
            .ok_or_else(|| IntegrationError::NotFound(format!("model {}/{}", kind, id)))?;
        model.last_heartbeat = now;
        Ok(now)
    }

    pub fn model_info(&self, kind: ModelKind, id: &str) -> Option<ModelInfo> {
        self.state().models.find(kind, id).map(|m| m.info())
    }

    /// Snapshot of every registered model, in registry order.
    pub fn models(&self) -> Vec<ModelInfo> {
        self.state().models.iter().map(|m| m.info()).collect()
    }

    pub fn model_count(&self) -> usize {
        self.state().models.len()
    }

    // ------------------------------------------------------------------
    // Service providers
    // ------------------------------------------------------------------

    /// Insert or update a provider. Only a first-time insert announces
    /// `SERVICE_DISCOVERED`.
    pub fn register_service(&self, provider: ServiceProvider) -> IntegrationResult<()> {
        let id = provider.service_id.clone();
        let kind = provider.model_kind;
        let mut state = self.state();
        match state.services.upsert(provider, now_millis())? {
            ServiceUpsert::Inserted => {
                info!(service = %id, model = %kind, "service registered");
                state.notify(
                    IntegrationEvent::new(EventKind::ServiceDiscovered, id.clone(), kind)
                        .with_payload(id),
                );
            }
            ServiceUpsert::Updated => debug!(service = %id, "service updated"),
        }
        Ok(())
    }

    /// Remove a provider, or only deactivate it while references remain.
    pub fn unregister_service(&self, service_id: &str) -> IntegrationResult<()> {
        match self.state().services.remove(service_id)? {
            ServiceRemoval::Deactivated => {
                debug!(service = service_id, "service deactivated, still referenced")
            }
            ServiceRemoval::Removed => info!(service = service_id, "service unregistered"),
        }
        Ok(())
    }

    /// Take a reference on an active provider.
    pub fn acquire_service(&self, service_id: &str) -> IntegrationResult<u32> {
        self.state().services.acquire(service_id)
    }

    /// Drop a reference; frees a deactivated provider on the last release.
    pub fn release_service(&self, service_id: &str) -> IntegrationResult<u32> {
        self.state().services.release(service_id)
    }

    pub fn find_services_by_model(&self, kind: ModelKind) -> Vec<ServiceProvider> {
        self.state().services.find_by_model(kind)
    }

    pub fn service_info(&self, service_id: &str) -> Option<RegisteredService> {
        self.state().services.get(service_id).cloned()
    }

    /// Tracked providers, including deactivated ones.
    pub fn provider_count(&self) -> usize {
        self.state().services.len()
    }

    // ------------------------------------------------------------------
    // Event handlers
    // ------------------------------------------------------------------

    /// Register a handler. `EventKind::Custom` receives every event.
    pub fn add_event_handler(
        &self,
        event_type: EventKind,
        callback: EventCallback,
        user_data: UserData,
    ) -> IntegrationResult<HandlerId> {
        self.state().handlers.add(event_type, callback, user_data)
    }

    /// Remove the first handler registered with this kind and callback.
    pub fn remove_event_handler(&self, event_type: EventKind, callback: &EventCallback) -> IntegrationResult<()> {
        self.state().handlers.remove(event_type, callback)
    }

    pub fn remove_event_handler_by_id(&self, id: HandlerId) -> IntegrationResult<()> {
        self.state().handlers.remove_by_id(id)
    }

    pub fn set_handler_active(&self, id: HandlerId, active: bool) -> IntegrationResult<()> {
        self.state().handlers.set_active(id, active)
    }

    pub fn handler_count(&self) -> usize {
        self.state().handlers.len()
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Enqueue an event. Fails with `QueueFull` at capacity.
    pub fn publish_event(&self, event: IntegrationEvent) -> IntegrationResult<u32> {
        self.state().enqueue(event)
    }

    /// Drain the queue, dispatching each event to subscribed adapters and
    /// matching handlers. Returns the number of events processed.
    ///
    /// Non-reentrant: a call made while a drain (or a sync round) is
    /// already running returns 0 without touching the queue. Adapter
    /// failures are logged and do not stop the drain. Events published by
    /// callbacks are drained in the same call.
    pub async fn process_integration_events(&self) -> usize {
        match self.claim_processing() {
            Some(_guard) => self.drain().await,
            None => {
                debug!("drain already in progress, skipping nested call");
                0
            }
        }
    }

    fn claim_processing(&self) -> Option<ProcessingGuard<'_>> {
        self.processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ProcessingGuard(&self.processing))
    }

    /// Dispatch until the queue is empty. Caller holds the processing flag.
    async fn drain(&self) -> usize {
        let mut processed = 0usize;
        let mut failures = 0u64;
        loop {
            let (event, adapters, handlers) = {
                let mut state = self.state();
                let Some(event) = state.queue.pop() else {
                    break;
                };
                let adapters = state.models.subscribers(event.kind, now_millis());
                let handlers = state.handlers.matching(event.kind);
                (event, adapters, handlers)
            };

            for adapter in &adapters {
                if let Err(e) = adapter.process_event(&event).await {
                    failures += 1;
                    warn!(
                        model = %adapter.model_kind(),
                        id = adapter.model_id(),
                        event = %event.kind,
                        sequence = event.sequence,
                        error = %e,
                        "adapter failed to process event"
                    );
                }
            }

            for (callback, user_data) in &handlers {
                callback(&event, user_data);
            }

            debug!(
                event = %event.kind,
                sequence = event.sequence,
                adapters = adapters.len(),
                handlers = handlers.len(),
                "event dispatched"
            );
            processed += 1;
        }

        let mut state = self.state();
        state.stats.events_processed += processed as u64;
        state.stats.adapter_failures += failures;
        processed
    }

    /// Run a two-phase synchronization round.
    ///
    /// Publishes `SYNC_REQUESTED` carrying the strategy, drains, publishes
    /// `SYNC_COMPLETED`, drains again. The round holds the processing flag
    /// throughout, so no other drain interleaves with it; a call made while
    /// a drain is running is `Deferred`. A call within `sync_interval_ms`
    /// of the previous round is `Skipped`. The interval clock and
    /// `sync_count` only advance once `SYNC_REQUESTED` is enqueued.
    pub async fn synchronize_models(&self, strategy: SyncStrategy) -> IntegrationResult<SyncOutcome> {
        let Some(_guard) = self.claim_processing() else {
            debug!(strategy = strategy.as_payload(), "sync deferred, drain in progress");
            return Ok(SyncOutcome::Deferred);
        };

        let now = now_millis();
        {
            let mut state = self.state();
            let interval = self.config.sync_interval_ms;
            if interval > 0
                && state.last_sync_time != 0
                && now.saturating_sub(state.last_sync_time) < interval
            {
                debug!(strategy = strategy.as_payload(), "sync skipped, interval not elapsed");
                return Ok(SyncOutcome::Skipped);
            }
            state.enqueue(
                IntegrationEvent::new(EventKind::SyncRequested, MANAGER_SOURCE_ID, ModelKind::Custom)
                    .with_payload(strategy.as_payload()),
            )?;
            state.last_sync_time = now;
            state.stats.sync_count += 1;
        }
        let mut processed = self.drain().await;

        self.publish_event(
            IntegrationEvent::new(EventKind::SyncCompleted, MANAGER_SOURCE_ID, ModelKind::Custom)
                .with_payload(strategy.as_payload()),
        )?;
        processed += self.drain().await;

        info!(strategy = strategy.as_payload(), processed, "models synchronized");
        Ok(SyncOutcome::Completed {
            events_processed: processed,
        })
    }

    pub fn last_sync_time(&self) -> u64 {
        self.state().last_sync_time
    }

    pub fn pending_events(&self) -> usize {
        self.state().queue.len()
    }

    pub fn queue_capacity(&self) -> usize {
        self.state().queue.capacity()
    }

    pub fn is_processing_events(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> IntegrationStats {
        self.state().stats
    }

    /// Stop and clean up every adapter, then discard pending events.
    pub async fn shutdown(&self) {
        let adapters = self.state().models.drain();
        for adapter in &adapters {
            if let Err(e) = adapter.stop().await {
                debug!(id = adapter.model_id(), error = %e, "adapter stop failed");
            }
            if let Err(e) = adapter.cleanup().await {
                debug!(id = adapter.model_id(), error = %e, "adapter cleanup failed");
            }
        }
        let dropped = self.state().queue.clear();
        info!(adapters = adapters.len(), dropped, "integration manager shut down");
    }
}

impl Default for IntegrationManager {
    fn default() -> Self {
        Self::new(IntegrationConfig::default())
    }
}

impl IntegrationBus for IntegrationManager {
    fn publish_event(&self, event: IntegrationEvent) -> IntegrationResult<u32> {
        IntegrationManager::publish_event(self, event)
    }

    fn register_service(&self, provider: ServiceProvider) -> IntegrationResult<()> {
        IntegrationManager::register_service(self, provider)
    }

    fn unregister_service(&self, service_id: &str) -> IntegrationResult<()> {
        IntegrationManager::unregister_service(self, service_id)
    }

    fn find_services_by_model(&self, kind: ModelKind) -> Vec<ServiceProvider> {
        IntegrationManager::find_services_by_model(self, kind)
    }
}
