//! Registries for model adapters and service providers
//!
//! Both registries are plain growable vectors. Removal swaps the last
//! entry into the vacated slot, so the relative order of the remaining
//! entries is not preserved.

use super::error::{IntegrationError, IntegrationResult};
use super::events::{EventKind, ModelKind};
use crate::adapter::ModelAdapter;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// An adapter as tracked by the manager.
pub struct RegisteredModel {
    pub adapter: Arc<dyn ModelAdapter>,
    pub active: bool,
    pub last_heartbeat: u64,
    pub subscribed_events: HashSet<EventKind>,
}

impl RegisteredModel {
    fn new(adapter: Arc<dyn ModelAdapter>, now: u64) -> Self {
        let subscribed_events = adapter.subscriptions().into_iter().collect();
        Self {
            adapter,
            active: true,
            last_heartbeat: now,
            subscribed_events,
        }
    }

    fn is_identified_by(&self, kind: ModelKind, id: &str) -> bool {
        self.adapter.model_kind() == kind && self.adapter.model_id() == id
    }

    /// Whether dispatch should hand an event of `kind` to this adapter.
    pub fn wants(&self, kind: EventKind) -> bool {
        self.active && self.subscribed_events.contains(&kind)
    }

    pub fn info(&self) -> ModelInfo {
        let mut subscribed: Vec<EventKind> = self.subscribed_events.iter().copied().collect();
        subscribed.sort_by_key(|k| k.as_str());
        ModelInfo {
            model_kind: self.adapter.model_kind(),
            model_id: self.adapter.model_id().to_string(),
            model_name: self.adapter.model_name().to_string(),
            version: self.adapter.version().to_string(),
            active: self.active,
            last_heartbeat: self.last_heartbeat,
            subscribed_events: subscribed,
        }
    }
}

/// Read-only snapshot of a registered model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub model_kind: ModelKind,
    pub model_id: String,
    pub model_name: String,
    pub version: String,
    pub active: bool,
    pub last_heartbeat: u64,
    pub subscribed_events: Vec<EventKind>,
}

/// Registered adapters, unique by `(model_kind, model_id)`.
pub struct ModelRegistry {
    models: Vec<RegisteredModel>,
}

impl ModelRegistry {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            models: Vec::with_capacity(capacity),
        }
    }

    /// An adapter is acceptable only with a non-empty id and name.
    pub fn validate(adapter: &dyn ModelAdapter) -> IntegrationResult<()> {
        if adapter.model_id().trim().is_empty() {
            return Err(IntegrationError::ValidationFailure(
                "adapter has no model_id".to_string(),
            ));
        }
        if adapter.model_name().trim().is_empty() {
            return Err(IntegrationError::ValidationFailure(format!(
                "adapter '{}' has no model_name",
                adapter.model_id()
            )));
        }
        Ok(())
    }

    pub fn insert(&mut self, adapter: Arc<dyn ModelAdapter>, now: u64) -> IntegrationResult<()> {
        Self::validate(adapter.as_ref())?;
        let (kind, id) = (adapter.model_kind(), adapter.model_id());
        if self.find(kind, id).is_some() {
            return Err(IntegrationError::AlreadyRegistered {
                kind,
                id: id.to_string(),
            });
        }
        self.models.try_reserve(1)?;
        self.models.push(RegisteredModel::new(adapter, now));
        Ok(())
    }

    /// Swap-remove the wrapper for `(kind, id)`.
    pub fn remove(&mut self, kind: ModelKind, id: &str) -> IntegrationResult<RegisteredModel> {
        let index = self
            .models
            .iter()
            .position(|m| m.is_identified_by(kind, id))
            .ok_or_else(|| IntegrationError::NotFound(format!("model {}/{}", kind, id)))?;
        Ok(self.models.swap_remove(index))
    }

    pub fn find(&self, kind: ModelKind, id: &str) -> Option<&RegisteredModel> {
        self.models.iter().find(|m| m.is_identified_by(kind, id))
    }

    pub fn find_mut(&mut self, kind: ModelKind, id: &str) -> Option<&mut RegisteredModel> {
        self.models.iter_mut().find(|m| m.is_identified_by(kind, id))
    }

    /// Adapters that should receive an event of `kind`, in registration
    /// order. Their heartbeat is refreshed to `now`.
    pub fn subscribers(&mut self, kind: EventKind, now: u64) -> Vec<Arc<dyn ModelAdapter>> {
        self.models
            .iter_mut()
            .filter(|m| m.wants(kind))
            .map(|m| {
                m.last_heartbeat = now;
                m.adapter.clone()
            })
            .collect()
    }

    /// Remove every wrapper, returning the adapters in registry order.
    pub fn drain(&mut self) -> Vec<Arc<dyn ModelAdapter>> {
        self.models.drain(..).map(|m| m.adapter).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredModel> {
        self.models.iter()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// Whether a service offers, consumes, or does both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceRole {
    Provider,
    Consumer,
    Both,
}

/// A discoverable service registered by a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceProvider {
    pub service_id: String,
    pub service_name: String,
    pub service_uri: String,
    pub role: ServiceRole,
    pub model_kind: ModelKind,
    /// Opaque capability description
    #[serde(default)]
    pub capabilities: serde_json::Value,
}

impl ServiceProvider {
    pub fn new(
        service_id: impl Into<String>,
        service_name: impl Into<String>,
        model_kind: ModelKind,
    ) -> Self {
        Self {
            service_id: service_id.into(),
            service_name: service_name.into(),
            service_uri: String::new(),
            role: ServiceRole::Provider,
            model_kind,
            capabilities: serde_json::Value::Null,
        }
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.service_uri = uri.into();
        self
    }

    pub fn with_role(mut self, role: ServiceRole) -> Self {
        self.role = role;
        self
    }

    pub fn with_capabilities(mut self, capabilities: serde_json::Value) -> Self {
        self.capabilities = capabilities;
        self
    }
}

/// A service provider as tracked by the manager.
#[derive(Debug, Clone)]
pub struct RegisteredService {
    pub provider: ServiceProvider,
    pub registration_time: u64,
    pub active: bool,
    pub reference_count: u32,
}

/// Outcome of an upsert into the service registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceUpsert {
    Inserted,
    Updated,
}

/// Outcome of removing a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceRemoval {
    /// Still referenced; only marked inactive
    Deactivated,
    /// Freed
    Removed,
}

/// Registered service providers, unique by `service_id`.
pub struct ServiceRegistry {
    services: Vec<RegisteredService>,
    max_providers: usize,
}

impl ServiceRegistry {
    pub fn new(max_providers: usize) -> Self {
        Self {
            services: Vec::new(),
            max_providers,
        }
    }

    fn position(&self, service_id: &str) -> Option<usize> {
        self.services
            .iter()
            .position(|s| s.provider.service_id == service_id)
    }

    /// Insert a new provider or update an existing one in place.
    ///
    /// An update replaces every provider field and reactivates a
    /// soft-deleted entry; references held on it are kept.
    pub fn upsert(&mut self, provider: ServiceProvider, now: u64) -> IntegrationResult<ServiceUpsert> {
        if provider.service_id.trim().is_empty() {
            return Err(IntegrationError::InvalidArgument(
                "service_id is required".to_string(),
            ));
        }

        if let Some(index) = self.position(&provider.service_id) {
            let entry = &mut self.services[index];
            entry.provider = provider;
            entry.active = true;
            return Ok(ServiceUpsert::Updated);
        }

        if self.services.len() >= self.max_providers {
            return Err(IntegrationError::CapacityExceeded {
                limit: self.max_providers,
            });
        }
        self.services.try_reserve(1)?;
        self.services.push(RegisteredService {
            provider,
            registration_time: now,
            active: true,
            reference_count: 0,
        });
        Ok(ServiceUpsert::Inserted)
    }

    /// Remove a provider; soft-delete while references are outstanding.
    pub fn remove(&mut self, service_id: &str) -> IntegrationResult<ServiceRemoval> {
        let index = self
            .position(service_id)
            .ok_or_else(|| IntegrationError::NotFound(format!("service {}", service_id)))?;

        if self.services[index].reference_count > 0 {
            self.services[index].active = false;
            Ok(ServiceRemoval::Deactivated)
        } else {
            self.services.swap_remove(index);
            Ok(ServiceRemoval::Removed)
        }
    }

    /// Take a reference on an active provider, returning the new count.
    pub fn acquire(&mut self, service_id: &str) -> IntegrationResult<u32> {
        let entry = self
            .services
            .iter_mut()
            .find(|s| s.provider.service_id == service_id && s.active)
            .ok_or_else(|| IntegrationError::NotFound(format!("service {}", service_id)))?;
        entry.reference_count = entry.reference_count.saturating_add(1);
        Ok(entry.reference_count)
    }

    /// Drop a reference, returning the remaining count. A soft-deleted
    /// provider is freed once its last reference goes.
    pub fn release(&mut self, service_id: &str) -> IntegrationResult<u32> {
        let index = self
            .position(service_id)
            .ok_or_else(|| IntegrationError::NotFound(format!("service {}", service_id)))?;

        let entry = &mut self.services[index];
        entry.reference_count = entry.reference_count.saturating_sub(1);
        let remaining = entry.reference_count;
        if remaining == 0 && !entry.active {
            self.services.swap_remove(index);
        }
        Ok(remaining)
    }

    /// Active providers for `kind`. Empty when none match.
    pub fn find_by_model(&self, kind: ModelKind) -> Vec<ServiceProvider> {
        self.services
            .iter()
            .filter(|s| s.active && s.provider.model_kind == kind)
            .map(|s| s.provider.clone())
            .collect()
    }

    pub fn get(&self, service_id: &str) -> Option<&RegisteredService> {
        self.services
            .iter()
            .find(|s| s.provider.service_id == service_id)
    }

    /// Number of tracked providers, including soft-deleted ones.
    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::AdapterError;
    use crate::integration::events::IntegrationEvent;
    use async_trait::async_trait;

    struct StubAdapter {
        kind: ModelKind,
        id: String,
        name: String,
        subscriptions: Vec<EventKind>,
    }

    impl StubAdapter {
        fn new(kind: ModelKind, id: &str) -> Self {
            Self {
                kind,
                id: id.to_string(),
                name: format!("{} stub", id),
                subscriptions: vec![EventKind::StateChanged],
            }
        }
    }

    #[async_trait]
    impl ModelAdapter for StubAdapter {
        fn model_kind(&self) -> ModelKind {
            self.kind
        }
        fn model_id(&self) -> &str {
            &self.id
        }
        fn model_name(&self) -> &str {
            &self.name
        }
        fn subscriptions(&self) -> Vec<EventKind> {
            self.subscriptions.clone()
        }
        async fn process_event(&self, _event: &IntegrationEvent) -> Result<(), AdapterError> {
            Ok(())
        }
    }

    fn stub(kind: ModelKind, id: &str) -> Arc<dyn ModelAdapter> {
        Arc::new(StubAdapter::new(kind, id))
    }

    #[test]
    fn duplicate_identity_is_rejected() {
        let mut registry = ModelRegistry::with_capacity(2);
        registry.insert(stub(ModelKind::Qsm, "m1"), 1).unwrap();

        let err = registry.insert(stub(ModelKind::Qsm, "m1"), 2).unwrap_err();
        assert!(matches!(err, IntegrationError::AlreadyRegistered { .. }));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn same_id_under_different_kind_is_distinct() {
        let mut registry = ModelRegistry::with_capacity(2);
        registry.insert(stub(ModelKind::Qsm, "m1"), 1).unwrap();
        registry.insert(stub(ModelKind::Som, "m1"), 1).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn adapter_without_name_fails_validation() {
        let mut adapter = StubAdapter::new(ModelKind::Weq, "w1");
        adapter.name = String::new();
        let mut registry = ModelRegistry::with_capacity(1);
        let err = registry.insert(Arc::new(adapter), 0).unwrap_err();
        assert!(matches!(err, IntegrationError::ValidationFailure(_)));
    }

    #[test]
    fn registry_grows_past_initial_capacity() {
        let mut registry = ModelRegistry::with_capacity(1);
        for i in 0..5 {
            registry.insert(stub(ModelKind::Custom, &format!("c{}", i)), 0).unwrap();
        }
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn swap_remove_moves_last_entry_into_gap() {
        let mut registry = ModelRegistry::with_capacity(4);
        for id in ["a", "b", "c"] {
            registry.insert(stub(ModelKind::Som, id), 0).unwrap();
        }
        registry.remove(ModelKind::Som, "a").unwrap();
        let ids: Vec<_> = registry.iter().map(|m| m.adapter.model_id().to_string()).collect();
        assert_eq!(ids, vec!["c", "b"]);

        assert!(matches!(
            registry.remove(ModelKind::Som, "a"),
            Err(IntegrationError::NotFound(_))
        ));
    }

    #[test]
    fn subscribers_respect_activity_and_refresh_heartbeat() {
        let mut registry = ModelRegistry::with_capacity(4);
        registry.insert(stub(ModelKind::Qsm, "q"), 10).unwrap();
        registry.insert(stub(ModelKind::Som, "s"), 10).unwrap();
        registry.find_mut(ModelKind::Som, "s").unwrap().active = false;

        let subs = registry.subscribers(EventKind::StateChanged, 50);
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].model_id(), "q");
        assert_eq!(registry.find(ModelKind::Qsm, "q").unwrap().last_heartbeat, 50);
        assert_eq!(registry.find(ModelKind::Som, "s").unwrap().last_heartbeat, 10);

        assert!(registry.subscribers(EventKind::FieldUpdated, 60).is_empty());
    }

    fn provider(id: &str, kind: ModelKind) -> ServiceProvider {
        ServiceProvider::new(id, format!("{} service", id), kind)
    }

    #[test]
    fn upsert_updates_in_place() {
        let mut services = ServiceRegistry::new(4);
        assert_eq!(services.upsert(provider("svc", ModelKind::Qsm), 1).unwrap(), ServiceUpsert::Inserted);

        let updated = provider("svc", ModelKind::Som)
            .with_uri("qsm://renamed")
            .with_role(ServiceRole::Both);
        assert_eq!(services.upsert(updated, 2).unwrap(), ServiceUpsert::Updated);
        assert_eq!(services.len(), 1);

        let entry = services.get("svc").unwrap();
        assert_eq!(entry.provider.service_uri, "qsm://renamed");
        assert_eq!(entry.provider.role, ServiceRole::Both);
        assert_eq!(entry.provider.model_kind, ModelKind::Som);
        assert_eq!(entry.registration_time, 1);
    }

    #[test]
    fn upsert_requires_service_id() {
        let mut services = ServiceRegistry::new(4);
        let err = services.upsert(provider("", ModelKind::Qsm), 0).unwrap_err();
        assert!(matches!(err, IntegrationError::InvalidArgument(_)));
    }

    #[test]
    fn insert_beyond_limit_is_rejected_but_update_is_not() {
        let mut services = ServiceRegistry::new(1);
        services.upsert(provider("a", ModelKind::Qsm), 0).unwrap();
        assert!(matches!(
            services.upsert(provider("b", ModelKind::Qsm), 0),
            Err(IntegrationError::CapacityExceeded { limit: 1 })
        ));
        assert!(services.upsert(provider("a", ModelKind::Weq), 0).is_ok());
    }

    #[test]
    fn referenced_provider_is_soft_deleted_then_freed_on_release() {
        let mut services = ServiceRegistry::new(4);
        services.upsert(provider("svc", ModelKind::Weq), 0).unwrap();
        assert_eq!(services.acquire("svc").unwrap(), 1);

        assert_eq!(services.remove("svc").unwrap(), ServiceRemoval::Deactivated);
        assert!(services.find_by_model(ModelKind::Weq).is_empty());
        assert_eq!(services.len(), 1);

        // No new references on an inactive provider
        assert!(services.acquire("svc").is_err());

        assert_eq!(services.release("svc").unwrap(), 0);
        assert!(services.get("svc").is_none());
        assert!(services.release("svc").is_err());
    }

    #[test]
    fn unreferenced_provider_is_hard_deleted() {
        let mut services = ServiceRegistry::new(4);
        services.upsert(provider("svc", ModelKind::Qsm), 0).unwrap();
        assert_eq!(services.remove("svc").unwrap(), ServiceRemoval::Removed);
        assert!(services.is_empty());
    }

    #[test]
    fn find_by_model_filters_kind() {
        let mut services = ServiceRegistry::new(4);
        services.upsert(provider("q1", ModelKind::Qsm), 0).unwrap();
        services.upsert(provider("s1", ModelKind::Som), 0).unwrap();
        services.upsert(provider("q2", ModelKind::Qsm), 0).unwrap();

        let ids: Vec<_> = services
            .find_by_model(ModelKind::Qsm)
            .into_iter()
            .map(|p| p.service_id)
            .collect();
        assert_eq!(ids, vec!["q1", "q2"]);
        assert!(services.find_by_model(ModelKind::Custom).is_empty());
    }
}
