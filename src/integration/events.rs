//! Integration events exchanged between models and the manager
//!
//! Eleven event kinds form the contract between adapters and the manager.
//! `Custom` doubles as the wildcard when used as a handler's event type.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of an integration event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    StateChanged,
    EntanglementCreated,
    EntanglementBroken,
    FieldUpdated,
    ModelRegistered,
    ModelUnregistered,
    ServiceDiscovered,
    SyncRequested,
    SyncCompleted,
    ErrorOccurred,
    /// Free-form event; also matches every event when used as a handler type
    Custom,
}

impl EventKind {
    pub const ALL: [EventKind; 11] = [
        EventKind::StateChanged,
        EventKind::EntanglementCreated,
        EventKind::EntanglementBroken,
        EventKind::FieldUpdated,
        EventKind::ModelRegistered,
        EventKind::ModelUnregistered,
        EventKind::ServiceDiscovered,
        EventKind::SyncRequested,
        EventKind::SyncCompleted,
        EventKind::ErrorOccurred,
        EventKind::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StateChanged => "STATE_CHANGED",
            Self::EntanglementCreated => "ENTANGLEMENT_CREATED",
            Self::EntanglementBroken => "ENTANGLEMENT_BROKEN",
            Self::FieldUpdated => "FIELD_UPDATED",
            Self::ModelRegistered => "MODEL_REGISTERED",
            Self::ModelUnregistered => "MODEL_UNREGISTERED",
            Self::ServiceDiscovered => "SERVICE_DISCOVERED",
            Self::SyncRequested => "SYNC_REQUESTED",
            Self::SyncCompleted => "SYNC_COMPLETED",
            Self::ErrorOccurred => "ERROR_OCCURRED",
            Self::Custom => "CUSTOM",
        }
    }

    /// True if a handler registered for `self` should see an event of `kind`.
    pub fn handler_matches(&self, kind: EventKind) -> bool {
        *self == kind || *self == EventKind::Custom
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The model family an adapter or service belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    /// Quantum stochastic model
    #[serde(rename = "QSM")]
    Qsm,
    /// Self-organizing map
    #[serde(rename = "SOM")]
    Som,
    /// Weighted quantum model
    #[serde(rename = "WEQ")]
    Weq,
    #[serde(rename = "CUSTOM")]
    Custom,
}

impl ModelKind {
    pub const ALL: [ModelKind; 4] = [
        ModelKind::Qsm,
        ModelKind::Som,
        ModelKind::Weq,
        ModelKind::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Qsm => "QSM",
            Self::Som => "SOM",
            Self::Weq => "WEQ",
            Self::Custom => "CUSTOM",
        }
    }

    /// Every other model kind, in declaration order.
    pub fn peers(&self) -> impl Iterator<Item = ModelKind> + '_ {
        Self::ALL.into_iter().filter(move |k| k != self)
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which part of the models a synchronization round targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStrategy {
    State,
    Entanglement,
    Field,
    Events,
    All,
}

impl SyncStrategy {
    /// Payload encoding carried by `SYNC_REQUESTED` events.
    pub fn as_payload(&self) -> &'static str {
        match self {
            Self::State => "SYNC_STATE",
            Self::Entanglement => "SYNC_ENTANGLEMENT",
            Self::Field => "SYNC_FIELD",
            Self::Events => "SYNC_EVENTS",
            Self::All => "SYNC_ALL",
        }
    }

    pub fn from_payload(payload: &str) -> Option<Self> {
        match payload {
            "SYNC_STATE" => Some(Self::State),
            "SYNC_ENTANGLEMENT" => Some(Self::Entanglement),
            "SYNC_FIELD" => Some(Self::Field),
            "SYNC_EVENTS" => Some(Self::Events),
            "SYNC_ALL" => Some(Self::All),
            _ => None,
        }
    }
}

impl FromStr for SyncStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "state" => Ok(Self::State),
            "entanglement" => Ok(Self::Entanglement),
            "field" => Ok(Self::Field),
            "events" => Ok(Self::Events),
            "all" => Ok(Self::All),
            other => Err(format!("unknown sync strategy '{}'", other)),
        }
    }
}

/// Event payload. Text is the common case; binary covers exported state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventPayload {
    Text(String),
    Binary(Vec<u8>),
}

impl EventPayload {
    /// The payload as text, if it is text or valid UTF-8 bytes.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Binary(b) => std::str::from_utf8(b).ok(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Text(s) => s.len(),
            Self::Binary(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<String> for EventPayload {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for EventPayload {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<Vec<u8>> for EventPayload {
    fn from(b: Vec<u8>) -> Self {
        Self::Binary(b)
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// An event travelling through the integration queue.
///
/// `sequence` is stamped by the queue on enqueue; whatever the producer sets
/// is overwritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationEvent {
    pub kind: EventKind,
    pub source_id: String,
    pub source_model: ModelKind,
    pub payload: Option<EventPayload>,
    pub timestamp: u64,
    pub sequence: u32,
}

impl IntegrationEvent {
    pub fn new(kind: EventKind, source_id: impl Into<String>, source_model: ModelKind) -> Self {
        Self {
            kind,
            source_id: source_id.into(),
            source_model,
            payload: None,
            timestamp: now_millis(),
            sequence: 0,
        }
    }

    pub fn with_payload(mut self, payload: impl Into<EventPayload>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Payload text, or `None` for missing or non-UTF-8 payloads.
    pub fn payload_text(&self) -> Option<&str> {
        self.payload.as_ref().and_then(|p| p.as_text())
    }
}
