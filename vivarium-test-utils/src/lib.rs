//! Vivarium Test Utilities
//!
//! Centralized test infrastructure for the Vivarium workspace:
//! - Scripted and blocking gateway stubs for orchestration tests
//! - Fixtures for common entities
//! - Proptest generators

// Re-export the stock mocks from their source crates
pub use vivarium_gateway::{FailingGateway, MockGateway};
pub use vivarium_storage::InMemorySnapshotStore;

// Re-export core types for convenience
pub use vivarium_core::{
    Agent, AgentStatus, EntityId, MemoryEntry, Message, MessageRole, OrchestratorConfig,
    Position, SourceRef, Timestamp, VivariumResult, new_entity_id,
};

use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::Notify;
use vivarium_core::GatewayError;
use vivarium_gateway::{AgentIdentity, AiGateway, DialogueReply, MergedPersona};

// ============================================================================
// SCRIPTED GATEWAY
// ============================================================================

/// A recorded dialogue request, for asserting what the orchestrator sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogueRequest {
    pub agent_name: String,
    pub prompt: String,
    pub history_len: usize,
    pub grounding: String,
}

/// Gateway stub with queued per-operation results.
///
/// Each operation pops its queue; an empty queue falls back to a
/// deterministic canned success, so only the interesting calls need
/// scripting. Dialogue requests are recorded for inspection.
#[derive(Debug, Default)]
pub struct ScriptedGateway {
    dialogues: Mutex<VecDeque<VivariumResult<DialogueReply>>>,
    evolutions: Mutex<VecDeque<VivariumResult<String>>>,
    merges: Mutex<VecDeque<VivariumResult<MergedPersona>>>,
    requests: Mutex<Vec<DialogueRequest>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a dialogue reply without citations.
    pub fn push_dialogue(&self, text: impl Into<String>) {
        self.push_dialogue_with_sources(text, Vec::new());
    }

    /// Queue a dialogue reply carrying citations.
    pub fn push_dialogue_with_sources(&self, text: impl Into<String>, sources: Vec<SourceRef>) {
        if let Ok(mut q) = self.dialogues.lock() {
            q.push_back(Ok(DialogueReply {
                text: text.into(),
                sources,
            }));
        }
    }

    /// Queue a dialogue failure.
    pub fn push_dialogue_failure(&self) {
        if let Ok(mut q) = self.dialogues.lock() {
            q.push_back(Err(forced_failure()));
        }
    }

    /// Queue an evolved disposition.
    pub fn push_evolution(&self, disposition: impl Into<String>) {
        if let Ok(mut q) = self.evolutions.lock() {
            q.push_back(Ok(disposition.into()));
        }
    }

    /// Queue an evolution failure.
    pub fn push_evolution_failure(&self) {
        if let Ok(mut q) = self.evolutions.lock() {
            q.push_back(Err(forced_failure()));
        }
    }

    /// Queue a merged persona.
    pub fn push_merge(&self, emoji: &str, name: &str, disposition: &str) {
        if let Ok(mut q) = self.merges.lock() {
            q.push_back(Ok(MergedPersona {
                emoji: emoji.to_string(),
                name: name.to_string(),
                disposition: disposition.to_string(),
            }));
        }
    }

    /// Queue a merge failure.
    pub fn push_merge_failure(&self) {
        if let Ok(mut q) = self.merges.lock() {
            q.push_back(Err(forced_failure()));
        }
    }

    /// Dialogue requests recorded so far, in order.
    pub fn dialogue_requests(&self) -> Vec<DialogueRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn pop<T>(queue: &Mutex<VecDeque<VivariumResult<T>>>) -> Option<VivariumResult<T>> {
        queue.lock().ok().and_then(|mut q| q.pop_front())
    }
}

fn forced_failure() -> vivarium_core::VivariumError {
    GatewayError::RequestFailed {
        provider: "scripted".to_string(),
        status: 503,
        message: "scripted failure".to_string(),
    }
    .into()
}

#[async_trait]
impl AiGateway for ScriptedGateway {
    async fn generate_dialogue(
        &self,
        identity: &AgentIdentity,
        prompt: &str,
        history: &[Message],
        grounding: &str,
    ) -> VivariumResult<DialogueReply> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(DialogueRequest {
                agent_name: identity.name.clone(),
                prompt: prompt.to_string(),
                history_len: history.len(),
                grounding: grounding.to_string(),
            });
        }
        Self::pop(&self.dialogues).unwrap_or_else(|| {
            Ok(DialogueReply {
                text: format!("{} Noted: {}", identity.emoji, prompt),
                sources: Vec::new(),
            })
        })
    }

    async fn synthesize_speech(&self, _text: &str) -> VivariumResult<Option<Vec<u8>>> {
        Ok(None)
    }

    async fn evolve_disposition(
        &self,
        current: &str,
        target_level: i32,
    ) -> VivariumResult<String> {
        Self::pop(&self.evolutions)
            .unwrap_or_else(|| Ok(format!("{} (lv{})", current, target_level)))
    }

    async fn merge_personas(
        &self,
        a: &AgentIdentity,
        b: &AgentIdentity,
    ) -> VivariumResult<MergedPersona> {
        Self::pop(&self.merges).unwrap_or_else(|| {
            Ok(MergedPersona {
                emoji: a.emoji.clone(),
                name: format!("{}-{}", a.name, b.name),
                disposition: "Synthesized".to_string(),
            })
        })
    }

    async fn edit_image(
        &self,
        image: &[u8],
        _instruction: &str,
    ) -> VivariumResult<Option<Vec<u8>>> {
        Ok(Some(image.to_vec()))
    }
}

// ============================================================================
// BLOCKING GATEWAY
// ============================================================================

/// Gateway stub whose dialogue calls park until released.
///
/// Lets tests observe mid-flight state: start a chat, inspect the Thinking
/// status, then [`BlockingGateway::release`] the reply. Each release lets
/// exactly one parked (or future) dialogue call proceed.
#[derive(Debug, Default)]
pub struct BlockingGateway {
    gate: Notify,
}

impl BlockingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let one dialogue call through.
    pub fn release(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl AiGateway for BlockingGateway {
    async fn generate_dialogue(
        &self,
        identity: &AgentIdentity,
        prompt: &str,
        _history: &[Message],
        _grounding: &str,
    ) -> VivariumResult<DialogueReply> {
        self.gate.notified().await;
        Ok(DialogueReply {
            text: format!("{} Noted: {}", identity.emoji, prompt),
            sources: Vec::new(),
        })
    }

    async fn synthesize_speech(&self, _text: &str) -> VivariumResult<Option<Vec<u8>>> {
        Ok(None)
    }

    async fn evolve_disposition(
        &self,
        current: &str,
        target_level: i32,
    ) -> VivariumResult<String> {
        Ok(format!("{} (lv{})", current, target_level))
    }

    async fn merge_personas(
        &self,
        a: &AgentIdentity,
        b: &AgentIdentity,
    ) -> VivariumResult<MergedPersona> {
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
        Ok(Some(image.to_vec()))
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

/// A completed user/agent exchange with correctly ordered timestamps.
pub fn exchange(user_text: &str, reply_text: &str) -> (Message, Message) {
    let start = Utc::now();
    (
        Message::user(user_text, start),
        Message::agent(
            reply_text,
            start + chrono::Duration::milliseconds(1),
            Vec::new(),
        ),
    )
}

/// An agent with `turns` completed exchanges already in its history.
pub fn agent_with_turns(turns: usize) -> Agent {
    let mut agent = Agent::new("🦊", "Spark", "Curious");
    for i in 0..turns {
        let (user, reply) = exchange(&format!("question {}", i), &format!("answer {}", i));
        agent.history.push(user);
        agent.history.push(reply);
    }
    agent
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use super::*;
    use proptest::prelude::*;

    /// Strategy producing idle agents with printable identities.
    pub fn arb_agent() -> impl Strategy<Value = Agent> {
        ("[A-Z][a-z]{2,10}", "[a-z ]{3,20}", 1i32..20).prop_map(|(name, disposition, level)| {
            Agent::new("🦊", name, disposition).with_level(level)
        })
    }

    /// Strategy producing memory entries with printable values.
    pub fn arb_memory_entry() -> impl Strategy<Value = MemoryEntry> {
        "[a-zA-Z0-9 ]{1,40}".prop_map(|value| MemoryEntry::new(value))
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================
