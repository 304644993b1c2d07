//! Knowledge exchange shared by every model adapter
//!
//! A `KnowledgeAgent` tracks how confident a model is in its own knowledge.
//! Below the gap threshold it asks the text-completion service, integrates
//! the answer, announces the state change and opens one entanglement
//! channel per peer model:
//!
//! detect gap → query → integrate → `STATE_CHANGED` → channels → `ENTANGLEMENT_CREATED`
//!
//! Confidence is kept in basis points so threshold comparisons are exact.

use super::traits::AdapterError;
use crate::completion::{KnowledgeArtifact, TextCompletion};
use crate::integration::{now_millis, EventKind, IntegrationBus, IntegrationEvent, ModelKind};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};
use uuid::Uuid;

/// Integrated knowledge entries kept per agent.
pub const KNOWLEDGE_CAPACITY: usize = 20;
/// Recent queries kept per agent.
pub const QUERY_LOG_CAPACITY: usize = 10;

const BASIS: u32 = 10_000;
const INITIAL_CONFIDENCE_BP: u32 = 5_000;
const CONFIDENCE_STEP_BP: u32 = 500;
const GAP_THRESHOLD_BP: u32 = 7_000;

/// Marker identifying a knowledge-gap custom event.
pub const KNOWLEDGE_GAP_MARKER: &str = "KNOWLEDGE_GAP";
/// Prefix of the query line inside a knowledge-gap payload.
pub const QUERY_MARKER: &str = "QUERY:";

/// A knowledge-gap request carried in a custom event payload.
///
/// Payload format: any text containing `KNOWLEDGE_GAP`, optionally with
/// `QUERY:<text>` terminated by a newline or the end of the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeRequest {
    pub query: Option<String>,
}

impl KnowledgeRequest {
    /// `None` unless the payload carries the knowledge-gap marker.
    pub fn parse(payload: &str) -> Option<Self> {
        if !payload.contains(KNOWLEDGE_GAP_MARKER) {
            return None;
        }
        let query = payload.find(QUERY_MARKER).and_then(|start| {
            let rest = &payload[start + QUERY_MARKER.len()..];
            let line = rest.split('\n').next().unwrap_or_default().trim();
            (!line.is_empty()).then(|| line.to_string())
        });
        Some(Self { query })
    }

    /// Encode a request in the payload format `parse` understands.
    pub fn to_payload(&self) -> String {
        match &self.query {
            Some(q) => format!("{}\n{}{}\n", KNOWLEDGE_GAP_MARKER, QUERY_MARKER, q),
            None => KNOWLEDGE_GAP_MARKER.to_string(),
        }
    }
}

/// Knowledge integrated into a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeState {
    pub id: String,
    pub model_kind: ModelKind,
    pub query: String,
    pub artifact: KnowledgeArtifact,
    pub integrated_at: u64,
}

/// Synthetic cross-model link opened after integrating knowledge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntanglementChannel {
    pub channel_id: String,
    pub source_model: ModelKind,
    pub source_id: String,
    pub target_model: ModelKind,
    pub knowledge_id: String,
    pub created_at: u64,
}

/// What a knowledge exchange did.
#[derive(Debug, Clone, PartialEq)]
pub enum ExchangeOutcome {
    /// Confidence was at or above the threshold; nothing was queried
    Confident,
    Integrated {
        knowledge_id: String,
        confidence: f64,
        channels: Vec<EntanglementChannel>,
    },
}

struct AgentState {
    confidence_bp: u32,
    knowledge: VecDeque<KnowledgeState>,
    queries: VecDeque<String>,
}

/// Per-model knowledge store, query log and confidence tracker.
pub struct KnowledgeAgent {
    model_kind: ModelKind,
    model_id: String,
    state: Mutex<AgentState>,
}

impl KnowledgeAgent {
    pub fn new(model_kind: ModelKind, model_id: impl Into<String>) -> Self {
        Self {
            model_kind,
            model_id: model_id.into(),
            state: Mutex::new(AgentState {
                confidence_bp: INITIAL_CONFIDENCE_BP,
                knowledge: VecDeque::with_capacity(KNOWLEDGE_CAPACITY),
                queries: VecDeque::with_capacity(QUERY_LOG_CAPACITY),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, AgentState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn model_kind(&self) -> ModelKind {
        self.model_kind
    }

    /// Current confidence in `[0, 1]`.
    pub fn confidence(&self) -> f64 {
        f64::from(self.state().confidence_bp) / f64::from(BASIS)
    }

    /// True when confidence is below 0.7. Always logs `query`.
    pub fn detect_knowledge_gap(&self, query: &str) -> bool {
        let mut state = self.state();
        if state.queries.len() == QUERY_LOG_CAPACITY {
            state.queries.pop_front();
        }
        state.queries.push_back(query.to_string());
        state.confidence_bp < GAP_THRESHOLD_BP
    }

    /// Store knowledge and raise confidence by 0.05 (capped at 1.0).
    /// Returns the new confidence.
    pub fn integrate_knowledge(&self, knowledge: KnowledgeState) -> f64 {
        let mut state = self.state();
        if state.knowledge.len() == KNOWLEDGE_CAPACITY {
            if let Some(evicted) = state.knowledge.pop_front() {
                debug!(model = %self.model_kind, knowledge = %evicted.id, "evicted oldest knowledge");
            }
        }
        state.knowledge.push_back(knowledge);
        state.confidence_bp = (state.confidence_bp + CONFIDENCE_STEP_BP).min(BASIS);
        f64::from(state.confidence_bp) / f64::from(BASIS)
    }

    pub fn knowledge_count(&self) -> usize {
        self.state().knowledge.len()
    }

    pub fn latest_knowledge(&self) -> Option<KnowledgeState> {
        self.state().knowledge.back().cloned()
    }

    /// Logged queries, oldest first.
    pub fn recent_queries(&self) -> Vec<String> {
        self.state().queries.iter().cloned().collect()
    }

    /// One channel per peer model for freshly integrated knowledge.
    pub fn open_channels(&self, knowledge_id: &str, now: u64) -> Vec<EntanglementChannel> {
        self.model_kind
            .peers()
            .map(|target| EntanglementChannel {
                channel_id: format!("{}-{}-{}", self.model_kind, target, now).to_lowercase(),
                source_model: self.model_kind,
                source_id: self.model_id.clone(),
                target_model: target,
                knowledge_id: knowledge_id.to_string(),
                created_at: now,
            })
            .collect()
    }

    /// Run the full exchange for `query`.
    ///
    /// Events go to `bus` when one is given; a full queue drops the event
    /// with a warning and the exchange carries on.
    pub async fn exchange(
        &self,
        query: &str,
        completion: &dyn TextCompletion,
        bus: Option<&dyn IntegrationBus>,
    ) -> Result<ExchangeOutcome, AdapterError> {
        if !self.detect_knowledge_gap(query) {
            return Ok(ExchangeOutcome::Confident);
        }

        let system_message = format!(
            "You supply missing knowledge to the {} model '{}'. Answer concisely.",
            self.model_kind, self.model_id
        );
        let text = completion.process_text(query, &system_message).await?;
        let knowledge_id = format!("knowledge-{}", Uuid::new_v4());
        let artifact = completion
            .generate_knowledge_artifact(&text, &knowledge_id)
            .await?;

        let now = now_millis();
        let confidence = self.integrate_knowledge(KnowledgeState {
            id: knowledge_id.clone(),
            model_kind: self.model_kind,
            query: query.to_string(),
            artifact,
            integrated_at: now,
        });

        let channels = self.open_channels(&knowledge_id, now);
        if let Some(bus) = bus {
            let notice = serde_json::json!({
                "knowledge_id": knowledge_id,
                "confidence": confidence,
            });
            self.publish(
                bus,
                IntegrationEvent::new(EventKind::StateChanged, self.model_id.clone(), self.model_kind)
                    .with_payload(notice.to_string()),
            );
            for channel in &channels {
                self.publish(
                    bus,
                    IntegrationEvent::new(
                        EventKind::EntanglementCreated,
                        self.model_id.clone(),
                        self.model_kind,
                    )
                    .with_payload(serde_json::to_string(channel)?),
                );
            }
        }

        debug!(
            model = %self.model_kind,
            id = %self.model_id,
            knowledge = %knowledge_id,
            confidence,
            "knowledge integrated"
        );
        Ok(ExchangeOutcome::Integrated {
            knowledge_id,
            confidence,
            channels,
        })
    }

    fn publish(&self, bus: &dyn IntegrationBus, event: IntegrationEvent) {
        let kind = event.kind;
        if let Err(e) = bus.publish_event(event) {
            warn!(model = %self.model_kind, id = %self.model_id, event = %kind, error = %e, "event dropped");
        }
    }
}
