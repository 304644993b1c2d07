//! Free-standing event handlers
//!
//! Handlers are callbacks keyed by event kind, independent of adapters.
//! A handler registered for `EventKind::Custom` sees every event.
//! Duplicate `(kind, callback)` pairs are allowed and fire independently.

use super::error::{IntegrationError, IntegrationResult};
use super::events::{EventKind, IntegrationEvent};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Handler callback. Receives the event and the handler's user data.
pub type EventCallback = Arc<dyn Fn(&IntegrationEvent, &UserData) + Send + Sync>;

/// Opaque data attached to a handler at registration.
#[derive(Clone, Default)]
pub struct UserData(Option<Arc<dyn Any + Send + Sync>>);

impl UserData {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Some(Arc::new(value)))
    }

    /// Attempt to downcast the attached data to a specific type.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.as_ref().and_then(|d| d.downcast_ref::<T>())
    }

    pub fn is_some(&self) -> bool {
        self.0.is_some()
    }
}

impl fmt::Debug for UserData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(_) => f.write_str("UserData(..)"),
            None => f.write_str("UserData(None)"),
        }
    }
}

/// Identifies one handler registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler-{}", self.0)
    }
}

struct EventHandler {
    id: HandlerId,
    event_type: EventKind,
    callback: EventCallback,
    user_data: UserData,
    active: bool,
}

/// Handler registrations in insertion order.
pub struct EventHandlerTable {
    handlers: Vec<EventHandler>,
    next_id: u64,
}

impl EventHandlerTable {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            handlers: Vec::with_capacity(capacity),
            next_id: 1,
        }
    }

    pub fn add(
        &mut self,
        event_type: EventKind,
        callback: EventCallback,
        user_data: UserData,
    ) -> IntegrationResult<HandlerId> {
        if self.handlers.len() == self.handlers.capacity() {
            // Double on overflow
            self.handlers.try_reserve_exact(self.handlers.capacity().max(1))?;
        }
        let id = HandlerId(self.next_id);
        self.next_id += 1;
        self.handlers.push(EventHandler {
            id,
            event_type,
            callback,
            user_data,
            active: true,
        });
        Ok(id)
    }

    /// Remove the first handler matching `(event_type, callback)`.
    pub fn remove(&mut self, event_type: EventKind, callback: &EventCallback) -> IntegrationResult<()> {
        let index = self
            .handlers
            .iter()
            .position(|h| h.event_type == event_type && Arc::ptr_eq(&h.callback, callback))
            .ok_or_else(|| IntegrationError::NotFound(format!("{} handler", event_type)))?;
        self.handlers.swap_remove(index);
        Ok(())
    }

    pub fn remove_by_id(&mut self, id: HandlerId) -> IntegrationResult<()> {
        let index = self
            .handlers
            .iter()
            .position(|h| h.id == id)
            .ok_or_else(|| IntegrationError::NotFound(id.to_string()))?;
        self.handlers.swap_remove(index);
        Ok(())
    }

    pub fn set_active(&mut self, id: HandlerId, active: bool) -> IntegrationResult<()> {
        let handler = self
            .handlers
            .iter_mut()
            .find(|h| h.id == id)
            .ok_or_else(|| IntegrationError::NotFound(id.to_string()))?;
        handler.active = active;
        Ok(())
    }

    /// Active handlers that should see an event of `kind`, in table order.
    pub fn matching(&self, kind: EventKind) -> Vec<(EventCallback, UserData)> {
        self.handlers
            .iter()
            .filter(|h| h.active && h.event_type.handler_matches(kind))
            .map(|h| (h.callback.clone(), h.user_data.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integration::events::ModelKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(counter: &Arc<AtomicUsize>) -> EventCallback {
        let counter = counter.clone();
        Arc::new(move |_event: &IntegrationEvent, _data: &UserData| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn fire(table: &EventHandlerTable, kind: EventKind) {
        let event = IntegrationEvent::new(kind, "t", ModelKind::Custom);
        for (callback, data) in table.matching(kind) {
            callback(&event, &data);
        }
    }

    #[test]
    fn duplicate_pairs_both_fire() {
        let counter = Arc::new(AtomicUsize::new(0));
        let callback = counting(&counter);
        let mut table = EventHandlerTable::with_capacity(1);
        table.add(EventKind::StateChanged, callback.clone(), UserData::none()).unwrap();
        table.add(EventKind::StateChanged, callback, UserData::none()).unwrap();

        fire(&table, EventKind::StateChanged);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn remove_drops_only_first_match() {
        let counter = Arc::new(AtomicUsize::new(0));
        let callback = counting(&counter);
        let mut table = EventHandlerTable::with_capacity(2);
        table.add(EventKind::FieldUpdated, callback.clone(), UserData::none()).unwrap();
        table.add(EventKind::FieldUpdated, callback.clone(), UserData::none()).unwrap();

        table.remove(EventKind::FieldUpdated, &callback).unwrap();
        assert_eq!(table.len(), 1);
        fire(&table, EventKind::FieldUpdated);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn remove_requires_matching_event_type() {
        let counter = Arc::new(AtomicUsize::new(0));
        let callback = counting(&counter);
        let other = counting(&counter);
        let mut table = EventHandlerTable::with_capacity(2);
        table.add(EventKind::FieldUpdated, callback.clone(), UserData::none()).unwrap();

        assert!(matches!(
            table.remove(EventKind::StateChanged, &callback),
            Err(IntegrationError::NotFound(_))
        ));
        assert!(table.remove(EventKind::FieldUpdated, &other).is_err());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn wildcard_handler_sees_every_kind() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut table = EventHandlerTable::with_capacity(2);
        table.add(EventKind::Custom, counting(&counter), UserData::none()).unwrap();

        fire(&table, EventKind::SyncRequested);
        fire(&table, EventKind::ErrorOccurred);
        fire(&table, EventKind::Custom);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn inactive_handler_is_skipped() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut table = EventHandlerTable::with_capacity(2);
        let id = table.add(EventKind::SyncCompleted, counting(&counter), UserData::none()).unwrap();
        table.set_active(id, false).unwrap();

        fire(&table, EventKind::SyncCompleted);
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        table.remove_by_id(id).unwrap();
        assert!(table.is_empty());
        assert!(table.set_active(id, true).is_err());
    }

    #[test]
    fn user_data_is_passed_through() {
        let seen = Arc::new(std::sync::Mutex::new(None));
        let seen_clone = seen.clone();
        let callback: EventCallback = Arc::new(move |_e: &IntegrationEvent, data: &UserData| {
            *seen_clone.lock().unwrap() = data.downcast_ref::<String>().cloned();
        });
        let mut table = EventHandlerTable::with_capacity(1);
        table
            .add(EventKind::ModelRegistered, callback, UserData::new("dashboard".to_string()))
            .unwrap();

        fire(&table, EventKind::ModelRegistered);
        assert_eq!(seen.lock().unwrap().as_deref(), Some("dashboard"));
    }

    #[test]
    fn table_grows_by_doubling() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut table = EventHandlerTable::with_capacity(2);
        for _ in 0..5 {
            table.add(EventKind::Custom, counting(&counter), UserData::none()).unwrap();
        }
        assert_eq!(table.len(), 5);
        assert!(table.handlers.capacity() >= 5);
    }
}
