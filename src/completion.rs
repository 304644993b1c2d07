//! Text-completion collaborator used by the knowledge exchange
//!
//! Adapters only depend on the `TextCompletion` trait: one call turns a
//! prompt into text, a second wraps that text into a knowledge artifact.
//! How the service is reached (HTTP, subprocess, mock) is up to the
//! implementation.
//!
//! `MockCompletion` returns preconfigured responses for tests and the CLI.

use crate::integration::now_millis;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};

/// A unit of knowledge produced from a completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeArtifact {
    pub id: String,
    pub content: String,
    /// Producer's certainty (0.0–1.0)
    pub confidence: f64,
    pub created_at: u64,
}

impl KnowledgeArtifact {
    pub fn from_text(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: text.into(),
            confidence: 1.0,
            created_at: now_millis(),
        }
    }
}

/// Errors from text-completion operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CompletionError {
    #[error("completion service not available: {0}")]
    Unavailable(String),
    #[error("completion failed: {0}")]
    InvocationFailed(String),
    #[error("response parse error: {0}")]
    ParseError(String),
}

/// Client trait for the external text-completion service.
#[async_trait]
pub trait TextCompletion: Send + Sync {
    /// Complete `prompt` under `system_message`.
    async fn process_text(&self, prompt: &str, system_message: &str) -> Result<String, CompletionError>;

    /// Wrap completion text into an artifact with the given id.
    async fn generate_knowledge_artifact(
        &self,
        text: &str,
        id: &str,
    ) -> Result<KnowledgeArtifact, CompletionError> {
        if text.trim().is_empty() {
            return Err(CompletionError::ParseError(
                "empty completion text".to_string(),
            ));
        }
        Ok(KnowledgeArtifact::from_text(id, text))
    }
}

/// Mock client for testing. Returns preconfigured responses.
///
/// Responses are matched by substring of the prompt, first registered
/// match wins. Unmatched prompts get an echo answer.
pub struct MockCompletion {
    available: bool,
    responses: Vec<(String, Result<String, CompletionError>)>,
    prompts: Mutex<Vec<String>>,
}

impl MockCompletion {
    /// Create a mock client that answers every prompt.
    pub fn available() -> Self {
        Self {
            available: true,
            responses: Vec::new(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock client that reports as unavailable.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::available()
        }
    }

    /// Register a response for prompts containing `pattern`.
    pub fn with_response(mut self, pattern: impl Into<String>, response: impl Into<String>) -> Self {
        self.responses.push((pattern.into(), Ok(response.into())));
        self
    }

    /// Register a failure for prompts containing `pattern`.
    pub fn with_failure(mut self, pattern: impl Into<String>, error: CompletionError) -> Self {
        self.responses.push((pattern.into(), Err(error)));
        self
    }

    /// Prompts received so far, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl TextCompletion for MockCompletion {
    async fn process_text(&self, prompt: &str, _system_message: &str) -> Result<String, CompletionError> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(prompt.to_string());

        if !self.available {
            return Err(CompletionError::Unavailable(
                "mock client configured as unavailable".to_string(),
            ));
        }

        match self.responses.iter().find(|(pattern, _)| prompt.contains(pattern.as_str())) {
            Some((_, Ok(response))) => Ok(response.clone()),
            Some((_, Err(err))) => Err(err.clone()),
            None => Ok(format!("Knowledge about: {}", prompt)),
        }
    }
}
