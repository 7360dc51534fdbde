//! The orchestrator: receives user intents, drives each agent's lifecycle
//! state machine, issues gateway calls, and applies results back to the
//! registry and ledger.
//!
//! Concurrency model: a single logical thread of control per operation, with
//! independent in-flight operations across agents. The only concurrency
//! primitive is the per-agent Idle guard; the world-state lock is never held
//! across an `.await`.

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};
use vivarium_core::{
    Agent, AgentStatus, EntityId, MemoryEntry, Message, OrchestratorConfig, Position,
    RegistryError, StorageError, ValidationError, VivariumResult,
};
use vivarium_gateway::{AgentIdentity, AiGateway};
use vivarium_storage::SnapshotStore;

use crate::ledger::MemoryLedger;
use crate::registry::AgentRegistry;
use crate::selection::MergeSelection;
use crate::triggers;

// ============================================================================
// OUTCOME TYPES
// ============================================================================

/// Result of a chat submission.
///
/// Gateway failures surface as `Failed`, never as an error: the agent is
/// back to Idle and nothing was mutated. Errors are reserved for guard
/// rejections at the call boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatOutcome {
    Replied {
        /// The appended agent reply
        reply: Message,
        /// Whether a deferred level-up was scheduled for this agent
        level_up_scheduled: bool,
        /// Whether a memory entry was extracted from the input
        memory_recorded: bool,
    },
    Failed,
}

/// Result of a level-up operation.
#[derive(Debug, Clone, PartialEq)]
pub enum LevelUpOutcome {
    Evolved { level: i32, disposition: String },
    Failed,
}

/// Result of a merge operation.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    /// The newly created agent; the originals remain, back at Idle
    Created(Agent),
    Failed,
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

struct WorldState {
    registry: AgentRegistry,
    ledger: MemoryLedger,
    selection: MergeSelection,
    audio_enabled: bool,
}

/// The orchestration core.
///
/// Cheaply cloneable: clones share the same world state, gateway, and store.
/// Deferred work (speech synthesis, scheduled level-ups) runs on spawned
/// tasks holding a clone.
#[derive(Clone)]
pub struct Orchestrator {
    state: Arc<RwLock<WorldState>>,
    gateway: Arc<dyn AiGateway>,
    store: Arc<dyn SnapshotStore>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Create an orchestrator with an empty registry and ledger.
    /// Call [`Orchestrator::bootstrap`] to restore snapshots or seed agents.
    pub fn new(
        gateway: Arc<dyn AiGateway>,
        store: Arc<dyn SnapshotStore>,
        config: OrchestratorConfig,
    ) -> VivariumResult<Self> {
        config.validate()?;
        let ledger = MemoryLedger::new(config.max_memories);
        Ok(Self {
            state: Arc::new(RwLock::new(WorldState {
                registry: AgentRegistry::new(),
                ledger,
                selection: MergeSelection::new(),
                audio_enabled: false,
            })),
            gateway,
            store,
            config,
        })
    }

    /// Load persisted snapshots, falling back to the seed set on a missing
    /// or unreadable agents snapshot and to an empty ledger for memories.
    /// Called once at startup.
    pub async fn bootstrap(&self) -> VivariumResult<()> {
        let registry = match self.store.load_agents().await {
            Ok(Some(agents)) => {
                info!(count = agents.len(), "restored agents snapshot");
                AgentRegistry::from_agents(agents)
            }
            Ok(None) => {
                info!("no agents snapshot, seeding stock agents");
                AgentRegistry::seed()
            }
            Err(e) => {
                warn!(error = %e, "agents snapshot unreadable, seeding stock agents");
                AgentRegistry::seed()
            }
        };

        let ledger = match self.store.load_memories().await {
            Ok(Some(entries)) => MemoryLedger::from_entries(entries, self.config.max_memories),
            Ok(None) => MemoryLedger::new(self.config.max_memories),
            Err(e) => {
                warn!(error = %e, "memories snapshot unreadable, starting empty");
                MemoryLedger::new(self.config.max_memories)
            }
        };

        {
            let mut state = self.write_state()?;
            state.registry = registry;
            state.ledger = ledger;
        }
        self.persist().await;
        Ok(())
    }

    // ========================================================================
    // CHAT
    // ========================================================================

    /// Submit a user message to an agent.
    ///
    /// The agent must exist and be Idle; it is Thinking for the duration of
    /// the gateway call. On success a user/agent message pair is appended
    /// atomically; on failure the history is untouched. Level-up and memory
    /// triggers are evaluated against the input after the append.
    pub async fn submit_message(
        &self,
        agent_id: EntityId,
        text: impl Into<String>,
    ) -> VivariumResult<ChatOutcome> {
        let text = text.into();
        let call_start = Utc::now();

        let (agent, grounding) = {
            let mut state = self.write_state()?;
            let agent = state.registry.try_begin(agent_id, AgentStatus::Thinking)?;
            (agent, state.ledger.grounding_string())
        };
        debug!(%agent_id, "agent thinking");
        self.persist().await;

        let identity = AgentIdentity::from(&agent);
        let result = self
            .gateway
            .generate_dialogue(&identity, &text, &agent.history, &grounding)
            .await;

        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                warn!(%agent_id, error = %e, "dialogue generation failed");
                {
                    let mut state = self.write_state()?;
                    state.registry.set_status(agent_id, AgentStatus::Idle)?;
                }
                self.persist().await;
                return Ok(ChatOutcome::Failed);
            }
        };

        let reply_text = if reply.text.trim().is_empty() {
            self.config.fallback_reply.clone()
        } else {
            reply.text
        };

        // The reply is stamped strictly after the user message so ordering
        // stays stable when wall-clock timestamps collide.
        let user_msg = Message::user(text.clone(), call_start);
        let agent_msg = Message::agent(
            reply_text,
            call_start + ChronoDuration::milliseconds(1),
            reply.sources,
        );

        let praised = triggers::contains_praise(&text, &self.config.praise_keywords);
        let extracted = triggers::extract_memory(&text, &self.config.memory_trigger);

        let (level_up_scheduled, memory_recorded) = {
            let mut state = self.write_state()?;
            let mut updated = state
                .registry
                .get(agent_id)
                .ok_or(RegistryError::AgentNotFound { agent_id })?;
            updated.history.push(user_msg);
            updated.history.push(agent_msg.clone());
            updated.status = AgentStatus::Idle;
            let turn_count = updated.turn_count();
            state.registry.replace(updated)?;

            let memory_recorded = match extracted {
                Some(value) => {
                    debug!(%agent_id, "memory trigger matched");
                    state.ledger.insert(MemoryEntry::new(value));
                    true
                }
                None => false,
            };

            let due = triggers::level_up_due(turn_count, self.config.level_up_every, praised);
            (due, memory_recorded)
        };
        self.persist().await;

        if self.audio_enabled()? {
            let gateway = Arc::clone(&self.gateway);
            let speech_text = agent_msg.content.clone();
            tokio::spawn(async move {
                if let Err(e) = gateway.synthesize_speech(&speech_text).await {
                    warn!(error = %e, "speech synthesis failed");
                }
            });
        }

        if level_up_scheduled {
            debug!(%agent_id, "level-up scheduled");
            let this = self.clone();
            let defer = self.config.level_up_defer;
            tokio::spawn(async move {
                tokio::time::sleep(defer).await;
                if let Err(e) = this.level_up(agent_id).await {
                    debug!(%agent_id, error = %e, "deferred level-up rejected");
                }
            });
        }

        Ok(ChatOutcome::Replied {
            reply: agent_msg,
            level_up_scheduled,
            memory_recorded,
        })
    }

    // ========================================================================
    // LEVEL-UP
    // ========================================================================

    /// Level an agent up: hold the LevelingUp status for the pacing pause,
    /// then ask the gateway for an evolved disposition.
    ///
    /// On success level and disposition change together; on failure neither
    /// changes. The agent is Idle afterwards either way.
    pub async fn level_up(&self, agent_id: EntityId) -> VivariumResult<LevelUpOutcome> {
        let agent = {
            let mut state = self.write_state()?;
            state.registry.try_begin(agent_id, AgentStatus::LevelingUp)?
        };
        debug!(%agent_id, level = agent.level, "level-up started");
        self.persist().await;

        // Pacing hold: the status stays visible (and other operations on the
        // agent stay blocked) for the full pause regardless of gateway speed.
        tokio::time::sleep(self.config.level_up_pause).await;

        let next_level = agent.level + 1;
        match self
            .gateway
            .evolve_disposition(&agent.disposition, next_level)
            .await
        {
            Ok(evolved) => {
                // A blank evolution keeps the old disposition; the level
                // still advances.
                let disposition = if evolved.trim().is_empty() {
                    agent.disposition.clone()
                } else {
                    evolved.trim().to_string()
                };
                {
                    let mut state = self.write_state()?;
                    let mut updated = state
                        .registry
                        .get(agent_id)
                        .ok_or(RegistryError::AgentNotFound { agent_id })?;
                    updated.level = next_level;
                    updated.disposition = disposition.clone();
                    updated.status = AgentStatus::Idle;
                    state.registry.replace(updated)?;
                }
                self.persist().await;
                info!(%agent_id, level = next_level, "agent leveled up");
                Ok(LevelUpOutcome::Evolved {
                    level: next_level,
                    disposition,
                })
            }
            Err(e) => {
                warn!(%agent_id, error = %e, "disposition evolution failed");
                {
                    let mut state = self.write_state()?;
                    state.registry.set_status(agent_id, AgentStatus::Idle)?;
                }
                self.persist().await;
                Ok(LevelUpOutcome::Failed)
            }
        }
    }

    // ========================================================================
    // MERGE
    // ========================================================================

    /// Merge two agents into a new one. Additive: the originals remain.
    ///
    /// Both agents must be distinct, present, and Idle; both hold Evolving
    /// for the duration of the gateway call. The new agent starts at
    /// `max(level_a, level_b) + 1` with an empty history at the midpoint of
    /// its parents' positions.
    pub async fn merge(&self, id_a: EntityId, id_b: EntityId) -> VivariumResult<MergeOutcome> {
        if id_a == id_b {
            return Err(ValidationError::InvalidValue {
                field: "agent_ids".to_string(),
                reason: "cannot merge an agent with itself".to_string(),
            }
            .into());
        }

        let (a, b) = {
            let mut state = self.write_state()?;
            // All-or-nothing: verify both are Idle before marking either
            let a = state
                .registry
                .get(id_a)
                .ok_or(RegistryError::AgentNotFound { agent_id: id_a })?;
            let b = state
                .registry
                .get(id_b)
                .ok_or(RegistryError::AgentNotFound { agent_id: id_b })?;
            if !a.is_idle() {
                return Err(RegistryError::AgentBusy {
                    agent_id: id_a,
                    status: a.status,
                }
                .into());
            }
            if !b.is_idle() {
                return Err(RegistryError::AgentBusy {
                    agent_id: id_b,
                    status: b.status,
                }
                .into());
            }
            state.registry.set_status(id_a, AgentStatus::Evolving)?;
            state.registry.set_status(id_b, AgentStatus::Evolving)?;
            (a, b)
        };
        debug!(%id_a, %id_b, "merge started");
        self.persist().await;

        match self
            .gateway
            .merge_personas(&AgentIdentity::from(&a), &AgentIdentity::from(&b))
            .await
        {
            Ok(persona) => {
                let midpoint = Position::midpoint(a.position, b.position);
                let merged = Agent::new(persona.emoji, persona.name, persona.disposition)
                    .with_level(a.level.max(b.level) + 1)
                    .with_position(midpoint.x, midpoint.y);
                {
                    let mut state = self.write_state()?;
                    state.registry.set_status(id_a, AgentStatus::Idle)?;
                    state.registry.set_status(id_b, AgentStatus::Idle)?;
                    state.registry.insert(merged.clone());
                    state.selection.clear();
                }
                self.persist().await;
                info!(merged_id = %merged.agent_id, level = merged.level, "merge produced a new agent");
                Ok(MergeOutcome::Created(merged))
            }
            Err(e) => {
                warn!(%id_a, %id_b, error = %e, "persona merge failed");
                {
                    let mut state = self.write_state()?;
                    state.registry.set_status(id_a, AgentStatus::Idle)?;
                    state.registry.set_status(id_b, AgentStatus::Idle)?;
                }
                self.persist().await;
                Ok(MergeOutcome::Failed)
            }
        }
    }

    /// Toggle an agent in the merge selection; returns the current picks.
    /// A third pick evicts the oldest.
    pub fn toggle_selection(&self, agent_id: EntityId) -> VivariumResult<Vec<EntityId>> {
        let mut state = self.write_state()?;
        if !state.registry.contains(agent_id) {
            return Err(RegistryError::AgentNotFound { agent_id }.into());
        }
        state.selection.toggle(agent_id);
        Ok(state.selection.picks().to_vec())
    }

    /// Merge the currently selected pair.
    pub async fn merge_selected(&self) -> VivariumResult<MergeOutcome> {
        let pair = self.read_state()?.selection.pair();
        match pair {
            Some((a, b)) => self.merge(a, b).await,
            None => Err(ValidationError::ConstraintViolation {
                constraint: "merge_selection".to_string(),
                reason: "exactly two agents must be selected".to_string(),
            }
            .into()),
        }
    }

    // ========================================================================
    // SENSOR PIPELINE
    // ========================================================================

    /// Edit a captured image through the gateway. Failures degrade to `None`;
    /// no agent state is involved.
    pub async fn edit_capture(&self, image: &[u8], instruction: &str) -> Option<Vec<u8>> {
        match self.gateway.edit_image(image, instruction).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "image edit failed");
                None
            }
        }
    }

    // ========================================================================
    // STATE ACCESS
    // ========================================================================

    /// Snapshot of all agents, in insertion order.
    pub fn agents(&self) -> VivariumResult<Vec<Agent>> {
        Ok(self.read_state()?.registry.to_vec())
    }

    /// Value copy of one agent.
    pub fn agent(&self, agent_id: EntityId) -> VivariumResult<Option<Agent>> {
        Ok(self.read_state()?.registry.get(agent_id))
    }

    /// Snapshot of the memory ledger, newest first.
    pub fn memories(&self) -> VivariumResult<Vec<MemoryEntry>> {
        Ok(self.read_state()?.ledger.to_vec())
    }

    /// Current merge picks, oldest first.
    pub fn selection(&self) -> VivariumResult<Vec<EntityId>> {
        Ok(self.read_state()?.selection.picks().to_vec())
    }

    /// Whether replies are spoken aloud.
    pub fn audio_enabled(&self) -> VivariumResult<bool> {
        Ok(self.read_state()?.audio_enabled)
    }

    /// Toggle spoken replies.
    pub fn set_audio_enabled(&self, enabled: bool) -> VivariumResult<()> {
        self.write_state()?.audio_enabled = enabled;
        Ok(())
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    fn read_state(&self) -> VivariumResult<RwLockReadGuard<'_, WorldState>> {
        self.state
            .read()
            .map_err(|_| StorageError::LockPoisoned.into())
    }

    fn write_state(&self) -> VivariumResult<RwLockWriteGuard<'_, WorldState>> {
        self.state
            .write()
            .map_err(|_| StorageError::LockPoisoned.into())
    }

    /// Write both snapshots. Best-effort: persistence failures are logged
    /// and never fail the operation that triggered them.
    async fn persist(&self) {
        let snapshot = {
            match self.read_state() {
                Ok(state) => Some((state.registry.to_vec(), state.ledger.to_vec())),
                Err(_) => None,
            }
        };
        let Some((agents, memories)) = snapshot else {
            warn!("skipping persistence, world state unavailable");
            return;
        };
        if let Err(e) = self.store.save_agents(&agents).await {
            warn!(error = %e, "agents snapshot write failed");
        }
        if let Err(e) = self.store.save_memories(&memories).await {
            warn!(error = %e, "memories snapshot write failed");
        }
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================
