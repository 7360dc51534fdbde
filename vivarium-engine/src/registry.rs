//! Agent registry - the single source of truth for agent state.
//!
//! All mutation is whole-value replacement: readers always observe a fully
//! consistent agent, never a partially updated one. Status transitions go
//! through [`AgentRegistry::try_begin`], the per-agent concurrency guard.

use vivarium_core::{Agent, AgentStatus, EntityId, RegistryError, VivariumResult};

/// The set of agents in the sandbox, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct AgentRegistry {
    agents: Vec<Agent>,
}

impl AgentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry from a restored snapshot.
    pub fn from_agents(agents: Vec<Agent>) -> Self {
        Self { agents }
    }

    /// Create a registry holding the stock seed set.
    pub fn seed() -> Self {
        Self {
            agents: vec![
                Agent::new("🦊", "Spark", "Curious").with_position(100.0, 150.0),
                Agent::new("👾", "Neon", "Analytic").with_position(400.0, 300.0),
                Agent::new("🎙️", "Echo", "Harmonious").with_position(700.0, 200.0),
            ],
        }
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// All agents, in insertion order.
    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    /// Snapshot copy of all agents.
    pub fn to_vec(&self) -> Vec<Agent> {
        self.agents.clone()
    }

    pub fn contains(&self, agent_id: EntityId) -> bool {
        self.agents.iter().any(|a| a.agent_id == agent_id)
    }

    /// Value copy of an agent by id.
    pub fn get(&self, agent_id: EntityId) -> Option<Agent> {
        self.agents.iter().find(|a| a.agent_id == agent_id).cloned()
    }

    /// Append a new agent.
    pub fn insert(&mut self, agent: Agent) {
        self.agents.push(agent);
    }

    /// Replace an agent wholesale by id.
    pub fn replace(&mut self, agent: Agent) -> VivariumResult<()> {
        let slot = self
            .agents
            .iter_mut()
            .find(|a| a.agent_id == agent.agent_id)
            .ok_or(RegistryError::AgentNotFound {
                agent_id: agent.agent_id,
            })?;
        *slot = agent;
        Ok(())
    }

    /// Set an agent's status without touching anything else.
    pub fn set_status(&mut self, agent_id: EntityId, status: AgentStatus) -> VivariumResult<()> {
        let slot = self
            .agents
            .iter_mut()
            .find(|a| a.agent_id == agent_id)
            .ok_or(RegistryError::AgentNotFound { agent_id })?;
        slot.status = status;
        Ok(())
    }

    /// The per-agent operation guard: atomically verify the agent exists and
    /// is Idle, move it into `status`, and return a value copy.
    ///
    /// # Returns
    /// * `Ok(Agent)` - Snapshot of the agent after the transition
    /// * `Err(RegistryError::AgentNotFound)` - Unknown id
    /// * `Err(RegistryError::AgentBusy)` - An operation is already in flight
    pub fn try_begin(
        &mut self,
        agent_id: EntityId,
        status: AgentStatus,
    ) -> VivariumResult<Agent> {
        let slot = self
            .agents
            .iter_mut()
            .find(|a| a.agent_id == agent_id)
            .ok_or(RegistryError::AgentNotFound { agent_id })?;
        if !slot.status.is_idle() {
            return Err(RegistryError::AgentBusy {
                agent_id,
                status: slot.status,
            }
            .into());
        }
        slot.status = status;
        Ok(slot.clone())
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================
