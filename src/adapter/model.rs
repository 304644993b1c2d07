//! Model adapters for QSM, SOM and WEQ
//!
//! The three models share one adapter implementation, `StandardAdapter<S>`,
//! parameterized by the model's state type. The state type supplies the
//! model identity and its own validation; lifecycle, subscriptions,
//! services and the knowledge exchange are common.
//!
//! Knowledge exchange triggers:
//! - `STATE_CHANGED` published by a different model kind
//! - `CUSTOM` events whose payload carries the `KNOWLEDGE_GAP` marker

use super::knowledge::{ExchangeOutcome, KnowledgeAgent, KnowledgeRequest};
use super::traits::{AdapterError, ModelAdapter};
use crate::completion::TextCompletion;
use crate::integration::{
    EventKind, IntegrationBus, IntegrationEvent, IntegrationManager, ModelKind, ServiceProvider,
    SyncStrategy,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::debug;

/// Serializable model state with its identity and validity rules.
pub trait ModelState: Serialize + DeserializeOwned + Clone + Default + Send + Sync + 'static {
    const KIND: ModelKind;
    const NAME: &'static str;
    const VERSION: &'static str;

    /// Check shape and numeric sanity.
    fn validate(&self) -> Result<(), String>;

    /// Apply a synchronization round to the state.
    fn synchronize(&mut self, _strategy: SyncStrategy) {}
}

fn all_finite(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite())
}

/// Quantum stochastic model state: real amplitudes plus a field strength.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QsmState {
    pub amplitudes: Vec<f64>,
    pub field_strength: f64,
}

impl Default for QsmState {
    fn default() -> Self {
        Self {
            amplitudes: vec![1.0, 0.0],
            field_strength: 0.0,
        }
    }
}

impl QsmState {
    fn norm(&self) -> f64 {
        self.amplitudes.iter().map(|a| a * a).sum::<f64>().sqrt()
    }
}

impl ModelState for QsmState {
    const KIND: ModelKind = ModelKind::Qsm;
    const NAME: &'static str = "Quantum Stochastic Model";
    const VERSION: &'static str = "1.0.0";

    fn validate(&self) -> Result<(), String> {
        if self.amplitudes.is_empty() {
            return Err("state vector is empty".to_string());
        }
        if !all_finite(&self.amplitudes) || !self.field_strength.is_finite() {
            return Err("state contains non-finite values".to_string());
        }
        if (self.norm() - 1.0).abs() > 1e-6 {
            return Err(format!("state vector is not normalized (norm {})", self.norm()));
        }
        Ok(())
    }

    fn synchronize(&mut self, strategy: SyncStrategy) {
        if matches!(strategy, SyncStrategy::State | SyncStrategy::All) {
            let norm = self.norm();
            if norm > 0.0 && norm.is_finite() {
                self.amplitudes.iter_mut().for_each(|a| *a /= norm);
            }
        }
    }
}

/// Self-organizing map state: a `width × height` grid of weight vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SomState {
    pub width: usize,
    pub height: usize,
    pub dimensions: usize,
    /// Row-major, `width * height * dimensions` values
    pub weights: Vec<f64>,
}

impl Default for SomState {
    fn default() -> Self {
        Self {
            width: 2,
            height: 2,
            dimensions: 2,
            weights: vec![0.0; 8],
        }
    }
}

impl ModelState for SomState {
    const KIND: ModelKind = ModelKind::Som;
    const NAME: &'static str = "Self-Organizing Map";
    const VERSION: &'static str = "1.0.0";

    fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 || self.dimensions == 0 {
            return Err("grid dimensions must be non-zero".to_string());
        }
        let expected = self.width * self.height * self.dimensions;
        if self.weights.len() != expected {
            return Err(format!(
                "expected {} weights, found {}",
                expected,
                self.weights.len()
            ));
        }
        if !all_finite(&self.weights) {
            return Err("weights contain non-finite values".to_string());
        }
        Ok(())
    }
}

/// Weighted quantum model state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeqState {
    pub weights: Vec<f64>,
    /// In `[0, 1]`
    pub coherence: f64,
}

impl Default for WeqState {
    fn default() -> Self {
        Self {
            weights: vec![0.25; 4],
            coherence: 1.0,
        }
    }
}

impl ModelState for WeqState {
    const KIND: ModelKind = ModelKind::Weq;
    const NAME: &'static str = "Weighted Quantum Model";
    const VERSION: &'static str = "1.0.0";

    fn validate(&self) -> Result<(), String> {
        if !all_finite(&self.weights) {
            return Err("weights contain non-finite values".to_string());
        }
        if !(0.0..=1.0).contains(&self.coherence) {
            return Err(format!("coherence {} outside [0, 1]", self.coherence));
        }
        Ok(())
    }

    fn synchronize(&mut self, strategy: SyncStrategy) {
        if matches!(strategy, SyncStrategy::Field | SyncStrategy::All) {
            let total: f64 = self.weights.iter().sum();
            if total > 0.0 && total.is_finite() {
                self.weights.iter_mut().for_each(|w| *w /= total);
            }
        }
    }
}

/// Lifecycle position of an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterStatus {
    Created,
    Initialized,
    Running,
    Stopped,
    CleanedUp,
}

/// Event kinds a standard adapter listens to unless told otherwise.
pub const DEFAULT_SUBSCRIPTIONS: [EventKind; 4] = [
    EventKind::StateChanged,
    EventKind::SyncRequested,
    EventKind::SyncCompleted,
    EventKind::Custom,
];

/// Adapter shared by all model variants.
pub struct StandardAdapter<S: ModelState> {
    id: String,
    name: String,
    state: Mutex<S>,
    status: Mutex<AdapterStatus>,
    subscriptions: Mutex<HashSet<EventKind>>,
    services: Mutex<Vec<String>>,
    knowledge: KnowledgeAgent,
    completion: Arc<dyn TextCompletion>,
    bus: Weak<dyn IntegrationBus>,
    events_processed: AtomicU64,
    sync_rounds: AtomicU64,
}

pub type QsmAdapter = StandardAdapter<QsmState>;
pub type SomAdapter = StandardAdapter<SomState>;
pub type WeqAdapter = StandardAdapter<WeqState>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<S: ModelState> StandardAdapter<S> {
    /// Adapter publishing through `bus`.
    pub fn new(
        id: impl Into<String>,
        completion: Arc<dyn TextCompletion>,
        bus: Weak<dyn IntegrationBus>,
    ) -> Self {
        let id = id.into();
        Self {
            knowledge: KnowledgeAgent::new(S::KIND, id.clone()),
            id,
            name: S::NAME.to_string(),
            state: Mutex::new(S::default()),
            status: Mutex::new(AdapterStatus::Created),
            subscriptions: Mutex::new(DEFAULT_SUBSCRIPTIONS.into_iter().collect()),
            services: Mutex::new(Vec::new()),
            completion,
            bus,
            events_processed: AtomicU64::new(0),
            sync_rounds: AtomicU64::new(0),
        }
    }

    /// Adapter bound to `manager` through a weak handle.
    pub fn for_manager(
        id: impl Into<String>,
        completion: Arc<dyn TextCompletion>,
        manager: &Arc<IntegrationManager>,
    ) -> Self {
        let bus: Weak<IntegrationManager> = Arc::downgrade(manager);
        Self::new(id, completion, bus)
    }

    /// Adapter with no bus; knowledge exchanges still run but publish nothing.
    pub fn detached(id: impl Into<String>, completion: Arc<dyn TextCompletion>) -> Self {
        let bus: Weak<IntegrationManager> = Weak::new();
        Self::new(id, completion, bus)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_subscriptions(self, kinds: impl IntoIterator<Item = EventKind>) -> Self {
        *lock(&self.subscriptions) = kinds.into_iter().collect();
        self
    }

    pub fn with_state(self, state: S) -> Result<Self, AdapterError> {
        state.validate().map_err(AdapterError::InvalidState)?;
        *lock(&self.state) = state;
        Ok(self)
    }

    pub fn status(&self) -> AdapterStatus {
        *lock(&self.status)
    }

    pub fn state(&self) -> S {
        lock(&self.state).clone()
    }

    pub fn knowledge(&self) -> &KnowledgeAgent {
        &self.knowledge
    }

    /// Events handed to `process_event`, whatever their kind.
    pub fn events_processed(&self) -> u64 {
        self.events_processed.load(Ordering::Relaxed)
    }

    pub fn sync_rounds(&self) -> u64 {
        self.sync_rounds.load(Ordering::Relaxed)
    }

    /// Service ids this adapter registered and has not withdrawn.
    pub fn registered_services(&self) -> Vec<String> {
        lock(&self.services).clone()
    }

    fn bus(&self) -> Result<Arc<dyn IntegrationBus>, AdapterError> {
        self.bus
            .upgrade()
            .ok_or_else(|| AdapterError::Internal("integration manager is gone".to_string()))
    }

    fn require_usable(&self) -> Result<(), AdapterError> {
        match self.status() {
            AdapterStatus::Created | AdapterStatus::CleanedUp => Err(AdapterError::NotInitialized),
            _ => Ok(()),
        }
    }

    fn decode(&self, bytes: &[u8]) -> Result<S, AdapterError> {
        let state: S = serde_json::from_slice(bytes)?;
        state.validate().map_err(AdapterError::InvalidState)?;
        Ok(state)
    }

    /// Run the knowledge exchange for `query`.
    pub async fn resolve_query(&self, query: &str) -> Result<ExchangeOutcome, AdapterError> {
        let bus = self.bus.upgrade();
        self.knowledge
            .exchange(query, self.completion.as_ref(), bus.as_deref())
            .await
    }

    fn query_for(&self, event: &IntegrationEvent) -> Option<String> {
        match event.kind {
            EventKind::StateChanged if event.source_model != S::KIND => {
                let detail = event
                    .payload_text()
                    .map(|p| format!(": {}", p))
                    .unwrap_or_default();
                Some(format!(
                    "How does the state change of {} model '{}' affect the {}{}",
                    event.source_model, event.source_id, S::NAME, detail
                ))
            }
            EventKind::Custom => event
                .payload_text()
                .and_then(KnowledgeRequest::parse)
                .map(|req| {
                    req.query.unwrap_or_else(|| {
                        format!("What knowledge is the {} missing?", S::NAME)
                    })
                }),
            _ => None,
        }
    }
}

#[async_trait]
impl<S: ModelState> ModelAdapter for StandardAdapter<S> {
    fn model_kind(&self) -> ModelKind {
        S::KIND
    }

    fn model_id(&self) -> &str {
        &self.id
    }

    fn model_name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        S::VERSION
    }

    /// `config`, when given, is a JSON rendering of the model state.
    async fn initialize(&self, config: Option<&serde_json::Value>) -> Result<(), AdapterError> {
        if let Some(config) = config {
            let state: S = serde_json::from_value(config.clone())?;
            state.validate().map_err(AdapterError::InvalidState)?;
            *lock(&self.state) = state;
        }
        *lock(&self.status) = AdapterStatus::Initialized;
        debug!(model = %S::KIND, id = %self.id, "adapter initialized");
        Ok(())
    }

    async fn start(&self) -> Result<(), AdapterError> {
        let mut status = lock(&self.status);
        match *status {
            AdapterStatus::Initialized | AdapterStatus::Stopped | AdapterStatus::Running => {
                *status = AdapterStatus::Running;
                Ok(())
            }
            _ => Err(AdapterError::NotInitialized),
        }
    }

    async fn stop(&self) -> Result<(), AdapterError> {
        let mut status = lock(&self.status);
        if *status == AdapterStatus::Running {
            *status = AdapterStatus::Stopped;
        }
        Ok(())
    }

    /// Withdraws the adapter's services and marks it unusable.
    async fn cleanup(&self) -> Result<(), AdapterError> {
        let services = std::mem::take(&mut *lock(&self.services));
        if let Some(bus) = self.bus.upgrade() {
            for service_id in &services {
                if let Err(e) = bus.unregister_service(service_id) {
                    debug!(service = %service_id, error = %e, "service already gone");
                }
            }
        }
        *lock(&self.status) = AdapterStatus::CleanedUp;
        Ok(())
    }

    fn export_state(&self) -> Result<Vec<u8>, AdapterError> {
        Ok(serde_json::to_vec(&*lock(&self.state))?)
    }

    fn import_state(&self, state: &[u8]) -> Result<(), AdapterError> {
        let decoded = self.decode(state)?;
        *lock(&self.state) = decoded;
        Ok(())
    }

    fn validate_state(&self, state: &[u8]) -> bool {
        self.decode(state).is_ok()
    }

    async fn process_event(&self, event: &IntegrationEvent) -> Result<(), AdapterError> {
        self.require_usable()?;
        self.events_processed.fetch_add(1, Ordering::Relaxed);

        match event.kind {
            EventKind::SyncRequested => {
                let strategy = event
                    .payload_text()
                    .and_then(SyncStrategy::from_payload)
                    .unwrap_or(SyncStrategy::All);
                lock(&self.state).synchronize(strategy);
                self.sync_rounds.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            EventKind::SyncCompleted => {
                debug!(model = %S::KIND, id = %self.id, "sync round completed");
                Ok(())
            }
            _ => match self.query_for(event) {
                Some(query) => self.resolve_query(&query).await.map(|_| ()),
                None => Ok(()),
            },
        }
    }

    fn subscribe(&self, kind: EventKind) {
        lock(&self.subscriptions).insert(kind);
    }

    fn unsubscribe(&self, kind: EventKind) {
        lock(&self.subscriptions).remove(&kind);
    }

    fn subscriptions(&self) -> Vec<EventKind> {
        let subscriptions = lock(&self.subscriptions);
        EventKind::ALL
            .into_iter()
            .filter(|k| subscriptions.contains(k))
            .collect()
    }

    fn register_service(&self, provider: ServiceProvider) -> Result<(), AdapterError> {
        let service_id = provider.service_id.clone();
        self.bus()?.register_service(provider)?;
        let mut services = lock(&self.services);
        if !services.contains(&service_id) {
            services.push(service_id);
        }
        Ok(())
    }

    fn unregister_service(&self, service_id: &str) -> Result<(), AdapterError> {
        self.bus()?.unregister_service(service_id)?;
        lock(&self.services).retain(|s| s != service_id);
        Ok(())
    }

    fn discover_services(&self, kind: ModelKind) -> Result<usize, AdapterError> {
        Ok(self.bus()?.find_services_by_model(kind).len())
    }
}
