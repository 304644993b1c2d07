//! Common test utilities for integration bus scenarios
//!
//! Provides a recording adapter and manager constructors shared by the
//! black-box tests.

#![allow(dead_code)]

use async_trait::async_trait;
use integration_bus::adapter::{AdapterError, ModelAdapter};
use integration_bus::integration::{
    EventKind, IntegrationConfig, IntegrationEvent, IntegrationManager, ModelKind,
};
use std::sync::{Arc, Mutex};

/// Adapter that records every event it is handed.
pub struct RecordingAdapter {
    kind: ModelKind,
    id: String,
    subscriptions: Vec<EventKind>,
    seen: Mutex<Vec<(EventKind, u32)>>,
    fail_on: Option<EventKind>,
}

impl RecordingAdapter {
    pub fn new(kind: ModelKind, id: &str, subscriptions: &[EventKind]) -> Self {
        Self {
            kind,
            id: id.to_string(),
            subscriptions: subscriptions.to_vec(),
            seen: Mutex::new(Vec::new()),
            fail_on: None,
        }
    }

    /// Fail processing of every event of `kind`.
    pub fn failing_on(mut self, kind: EventKind) -> Self {
        self.fail_on = Some(kind);
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// `(kind, sequence)` pairs in delivery order.
    pub fn seen(&self) -> Vec<(EventKind, u32)> {
        self.seen.lock().unwrap().clone()
    }

    pub fn seen_kinds(&self) -> Vec<EventKind> {
        self.seen().into_iter().map(|(kind, _)| kind).collect()
    }
}

#[async_trait]
impl ModelAdapter for RecordingAdapter {
    fn model_kind(&self) -> ModelKind {
        self.kind
    }

    fn model_id(&self) -> &str {
        &self.id
    }

    fn model_name(&self) -> &str {
        "recording"
    }

    fn subscriptions(&self) -> Vec<EventKind> {
        self.subscriptions.clone()
    }

    async fn process_event(&self, event: &IntegrationEvent) -> Result<(), AdapterError> {
        self.seen.lock().unwrap().push((event.kind, event.sequence));
        if self.fail_on == Some(event.kind) {
            return Err(AdapterError::Internal(format!("refusing {}", event.kind)));
        }
        Ok(())
    }
}

/// Manager with the given queue capacity and no sync rate limit.
pub fn manager_with_capacity(capacity: usize) -> Arc<IntegrationManager> {
    Arc::new(IntegrationManager::new(
        IntegrationConfig::default()
            .with_queue_capacity(capacity)
            .with_sync_interval_ms(0),
    ))
}
