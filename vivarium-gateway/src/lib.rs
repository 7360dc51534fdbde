//! Vivarium Gateway - AI Provider Abstraction
//!
//! Provider-agnostic trait for the five generative operations the sandbox
//! delegates: dialogue, speech, disposition evolution, persona merging, and
//! image editing. Mock providers for testing live here; the HTTP-backed
//! provider lives in [`http`].

pub mod http;

pub use http::HttpGateway;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use vivarium_core::{Agent, GatewayError, Message, SourceRef, VivariumResult};

// ============================================================================
// REQUEST / REPLY TYPES
// ============================================================================

/// Display identity of an agent, as the gateway sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub name: String,
    pub emoji: String,
}

impl From<&Agent> for AgentIdentity {
    fn from(agent: &Agent) -> Self {
        Self {
            name: agent.name.clone(),
            emoji: agent.emoji.clone(),
        }
    }
}

/// A generated dialogue reply with optional web citations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueReply {
    pub text: String,
    pub sources: Vec<SourceRef>,
}

/// Persona invented for a merge of two agents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedPersona {
    pub emoji: String,
    pub name: String,
    /// Wire key is "trait" - the JSON schema the model is asked to fill.
    #[serde(rename = "trait")]
    pub disposition: String,
}

// ============================================================================
// GATEWAY TRAIT
// ============================================================================

/// Trait for generative AI providers.
/// Implementations must be thread-safe (Send + Sync).
///
/// Every operation may fail with a [`GatewayError`]; callers recover by
/// reverting agent state, never by propagating a fatal error.
///
/// # Example
/// ```ignore
/// struct MyProvider { /* ... */ }
///
/// #[async_trait]
/// impl AiGateway for MyProvider {
///     async fn generate_dialogue(&self, ...) -> VivariumResult<DialogueReply> {
///         // Call the remote API
///     }
///     // ...
/// }
/// ```
#[async_trait]
pub trait AiGateway: Send + Sync {
    /// Generate an in-persona reply to user input.
    ///
    /// # Arguments
    /// * `identity` - Display identity the reply should speak as
    /// * `prompt` - Raw user input
    /// * `history` - Full prior conversation, chronological
    /// * `grounding` - Memory-ledger text to bias the reply with
    async fn generate_dialogue(
        &self,
        identity: &AgentIdentity,
        prompt: &str,
        history: &[Message],
        grounding: &str,
    ) -> VivariumResult<DialogueReply>;

    /// Synthesize speech audio for a reply.
    ///
    /// # Returns
    /// * `Ok(Some(bytes))` - Raw audio payload
    /// * `Ok(None)` - Provider produced no audio (non-fatal, skip playback)
    async fn synthesize_speech(&self, text: &str) -> VivariumResult<Option<Vec<u8>>>;

    /// Invent a more advanced version of a persona disposition.
    ///
    /// # Arguments
    /// * `current` - The disposition being evolved
    /// * `target_level` - The level the agent is advancing to
    async fn evolve_disposition(&self, current: &str, target_level: i32)
        -> VivariumResult<String>;

    /// Invent a combined persona for merging two agents.
    async fn merge_personas(
        &self,
        a: &AgentIdentity,
        b: &AgentIdentity,
    ) -> VivariumResult<MergedPersona>;

    /// Edit a captured image according to an instruction.
    ///
    /// # Returns
    /// * `Ok(Some(bytes))` - The edited image
    /// * `Ok(None)` - Response carried no image
    async fn edit_image(&self, image: &[u8], instruction: &str)
        -> VivariumResult<Option<Vec<u8>>>;
}

// ============================================================================
// MOCK PROVIDERS FOR TESTING
// ============================================================================

/// Mock gateway for testing.
/// Produces deterministic replies and records which operations were invoked.
#[derive(Debug, Default)]
pub struct MockGateway {
    /// Operation names in invocation order
    calls: Mutex<Vec<String>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Operation names recorded so far, in invocation order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, op: &str) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(op.to_string());
        }
    }
}

#[async_trait]
impl AiGateway for MockGateway {
    async fn generate_dialogue(
        &self,
        identity: &AgentIdentity,
        prompt: &str,
        _history: &[Message],
        _grounding: &str,
    ) -> VivariumResult<DialogueReply> {
        self.record("generate_dialogue");
        Ok(DialogueReply {
            text: format!("{} Noted: {}", identity.emoji, prompt),
            sources: Vec::new(),
        })
    }

    async fn synthesize_speech(&self, text: &str) -> VivariumResult<Option<Vec<u8>>> {
        self.record("synthesize_speech");
        Ok(Some(text.as_bytes().to_vec()))
    }

    async fn evolve_disposition(
        &self,
        current: &str,
        target_level: i32,
    ) -> VivariumResult<String> {
        self.record("evolve_disposition");
        Ok(format!("{} (lv{})", current, target_level))
    }

    async fn merge_personas(
        &self,
        a: &AgentIdentity,
        b: &AgentIdentity,
    ) -> VivariumResult<MergedPersona> {
        self.record("merge_personas");
        Ok(MergedPersona {
            emoji: a.emoji.clone(),
            name: format!("{}-{}", a.name, b.name),
            disposition: "Synthesized".to_string(),
        })
    }

    async fn edit_image(
        &self,
        image: &[u8],
        _instruction: &str,
    ) -> VivariumResult<Option<Vec<u8>>> {
        self.record("edit_image");
        Ok(Some(image.to_vec()))
    }
}

/// Mock gateway whose every operation fails.
/// Used to exercise the failure-recovery paths of the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct FailingGateway;

impl FailingGateway {
    pub fn new() -> Self {
        Self
    }

    fn failure(&self) -> vivarium_core::VivariumError {
        GatewayError::RequestFailed {
            provider: "mock".to_string(),
            status: 503,
            message: "forced failure".to_string(),
        }
        .into()
    }
}

#[async_trait]
impl AiGateway for FailingGateway {
    async fn generate_dialogue(
        &self,
        _identity: &AgentIdentity,
        _prompt: &str,
        _history: &[Message],
        _grounding: &str,
    ) -> VivariumResult<DialogueReply> {
        Err(self.failure())
    }

    async fn synthesize_speech(&self, _text: &str) -> VivariumResult<Option<Vec<u8>>> {
        Err(self.failure())
    }

    async fn evolve_disposition(
        &self,
        _current: &str,
        _target_level: i32,
    ) -> VivariumResult<String> {
        Err(self.failure())
    }

    async fn merge_personas(
        &self,
        _a: &AgentIdentity,
        _b: &AgentIdentity,
    ) -> VivariumResult<MergedPersona> {
        Err(self.failure())
    }

    async fn edit_image(
        &self,
        _image: &[u8],
        _instruction: &str,
    ) -> VivariumResult<Option<Vec<u8>>> {
        Err(self.failure())
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================


// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        /// Mock dialogue replies SHALL never be blank for non-empty prompts.
        #[test]
        fn prop_mock_dialogue_never_blank(prompt in ".{1,80}") {
            let rt = tokio::runtime::Builder::new_current_thread()
                .build()
                .unwrap();
            let gateway = MockGateway::new();
            let id = AgentIdentity {
                name: "Spark".to_string(),
                emoji: "🦊".to_string(),
            };
            let reply = rt
                .block_on(gateway.generate_dialogue(&id, &prompt, &[], ""))
                .unwrap();
            prop_assert!(!reply.text.trim().is_empty());
        }

        /// Evolved dispositions SHALL carry the target level.
        #[test]
        fn prop_mock_evolution_carries_level(current in "[a-zA-Z]{1,20}", level in 2i32..100) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .build()
                .unwrap();
            let gateway = MockGateway::new();
            let evolved = rt
                .block_on(gateway.evolve_disposition(&current, level))
                .unwrap();
            prop_assert!(evolved.contains(&current));
            prop_assert!(evolved.contains(&level.to_string()));
        }
    }
}
