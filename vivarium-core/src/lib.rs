//! Vivarium Core - Entity Types
//!
//! Pure data structures with no behavior. All other crates depend on this.
//! This crate contains ONLY data types - no orchestration logic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Entity identifier using UUIDv7 for timestamp-sortable IDs.
/// UUIDv7 embeds a Unix timestamp, making IDs naturally sortable by creation time.
pub type EntityId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Generate a new UUIDv7 EntityId (timestamp-sortable).
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}

// ============================================================================
// ENUMS
// ============================================================================

/// Lifecycle status of an agent.
///
/// Exactly one status is active per agent at any time. `Idle` is both the
/// initial state and the terminal state of every operation: the orchestrator
/// restores `Idle` on success and failure paths alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AgentStatus {
    /// Agent is available; the only state new operations are accepted in
    #[default]
    Idle,
    /// Agent is waiting on a dialogue generation call
    Thinking,
    /// Agent is consulting external sources (presentation-driven)
    Searching,
    /// Agent is participating in a merge
    Evolving,
    /// Agent is undergoing a level-up
    LevelingUp,
}

impl AgentStatus {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            AgentStatus::Idle => "Idle",
            AgentStatus::Thinking => "Thinking",
            AgentStatus::Searching => "Searching",
            AgentStatus::Evolving => "Evolving",
            AgentStatus::LevelingUp => "LevelingUp",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, AgentStatusParseError> {
        match s.to_lowercase().replace('_', "").as_str() {
            "idle" => Ok(AgentStatus::Idle),
            "thinking" => Ok(AgentStatus::Thinking),
            "searching" => Ok(AgentStatus::Searching),
            "evolving" => Ok(AgentStatus::Evolving),
            "levelingup" | "levelup" => Ok(AgentStatus::LevelingUp),
            _ => Err(AgentStatusParseError(s.to_string())),
        }
    }

    /// Whether the agent can accept a new operation.
    pub fn is_idle(&self) -> bool {
        matches!(self, AgentStatus::Idle)
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for AgentStatus {
    type Err = AgentStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid agent status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentStatusParseError(pub String);

impl fmt::Display for AgentStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid agent status: {}", self.0)
    }
}

impl std::error::Error for AgentStatusParseError {}

/// Role of a message in a conversation history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Agent,
}

impl MessageRole {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Agent => "agent",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

// ============================================================================
// CORE ENTITY STRUCTS
// ============================================================================

/// Spatial position of an agent on the presentation surface.
///
/// Carried through the core untouched except for merge midpoint computation;
/// the core never interprets coordinates otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Midpoint between two positions, used to place a merged agent.
    pub fn midpoint(a: Position, b: Position) -> Position {
        Position {
            x: (a.x + b.x) / 2.0,
            y: (a.y + b.y) / 2.0,
        }
    }
}

/// A web source citation attached to an agent reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub title: String,
    pub uri: String,
}

/// A single message in an agent's conversation history.
///
/// Timestamps are the logical ordering key: within one history they are
/// monotonically non-decreasing. A completed exchange appends the user
/// message at call-start time and the agent reply one millisecond later, so
/// ordering stays stable even when wall-clock timestamps collide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: Timestamp,
    /// Source citations; agent-role only, always empty for user messages.
    #[serde(default)]
    pub sources: Vec<SourceRef>,
}

impl Message {
    /// Create a user message.
    pub fn user(content: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            timestamp,
            sources: Vec::new(),
        }
    }

    /// Create an agent reply carrying optional citations.
    pub fn agent(
        content: impl Into<String>,
        timestamp: Timestamp,
        sources: Vec<SourceRef>,
    ) -> Self {
        Self {
            role: MessageRole::Agent,
            content: content.into(),
            timestamp,
            sources,
        }
    }
}

/// An agent in the sandbox.
///
/// The registry is the sole holder of agent data; the orchestrator mutates
/// agents by whole-value replacement, never in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    /// Unique identifier for this agent
    pub agent_id: EntityId,
    /// Display glyph
    pub emoji: String,
    /// Display name
    pub name: String,
    /// Current level, always >= 1
    pub level: i32,
    /// Free-text persona descriptor, rewritten on level-up and merge
    pub disposition: String,
    /// Conversation history, append-only, chronological
    pub history: Vec<Message>,
    /// Current lifecycle status
    pub status: AgentStatus,
    /// Presentation-surface position
    pub position: Position,
    /// When this agent was created
    pub created_at: Timestamp,
}

impl Agent {
    /// Create a new level-1 idle agent with an empty history.
    pub fn new(
        emoji: impl Into<String>,
        name: impl Into<String>,
        disposition: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: new_entity_id(),
            emoji: emoji.into(),
            name: name.into(),
            level: 1,
            disposition: disposition.into(),
            history: Vec::new(),
            status: AgentStatus::Idle,
            position: Position::default(),
            created_at: Utc::now(),
        }
    }

    /// Set the presentation position.
    pub fn with_position(mut self, x: f32, y: f32) -> Self {
        self.position = Position::new(x, y);
        self
    }

    /// Set the starting level.
    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    /// Number of completed exchanges (history holds user/agent pairs).
    pub fn turn_count(&self) -> usize {
        self.history.len() / 2
    }

    /// Whether the agent can accept a new operation.
    pub fn is_idle(&self) -> bool {
        self.status.is_idle()
    }
}

/// A fact extracted from user input and retained in the memory ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub entry_id: EntityId,
    /// Derived label, `note_<epoch-millis>`
    pub key: String,
    /// Extracted free text
    pub value: String,
    pub created_at: Timestamp,
}

impl MemoryEntry {
    /// Create a new entry stamped with the current time.
    pub fn new(value: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            entry_id: new_entity_id(),
            key: format!("note_{}", now.timestamp_millis()),
            value: value.into(),
            created_at: now,
        }
    }
}

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Registry and lifecycle guard errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Agent not found: {agent_id}")]
    AgentNotFound { agent_id: EntityId },

    #[error("Agent {agent_id} is busy: {status}")]
    AgentBusy {
        agent_id: EntityId,
        status: AgentStatus,
    },
}

/// AI gateway errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Request to {provider} failed with status {status}: {message}")]
    RequestFailed {
        provider: String,
        status: i32,
        message: String,
    },

    #[error("Rate limited by {provider}, retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: i64,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Snapshot persistence errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Failed to write {snapshot} snapshot: {reason}")]
    SnapshotWriteFailed { snapshot: String, reason: String },

    #[error("Failed to read {snapshot} snapshot: {reason}")]
    SnapshotReadFailed { snapshot: String, reason: String },

    #[error("Failed to serialize {snapshot} snapshot: {reason}")]
    SerializationFailed { snapshot: String, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Constraint violation on {constraint}: {reason}")]
    ConstraintViolation { constraint: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all Vivarium errors.
#[derive(Debug, Clone, Error)]
pub enum VivariumError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for Vivarium operations.
pub type VivariumResult<T> = Result<T, VivariumError>;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Praise phrases that trigger a level-up when present in user input.
/// Matching is case-insensitive substring - deliberately loose.
pub const DEFAULT_PRAISE_KEYWORDS: &[&str] = &[
    "good job",
    "thanks",
    "thank you",
    "amazing",
    "awesome",
    "great",
    "brilliant",
    "well done",
    "love it",
];

/// Phrase that marks user input for memory extraction.
pub const DEFAULT_MEMORY_TRIGGER: &str = "remember that";

/// Placeholder substituted when the gateway returns a blank reply.
pub const DEFAULT_FALLBACK_REPLY: &str = "I'm processing that right now.";

/// Maximum number of entries retained by the memory ledger.
pub const DEFAULT_MAX_MEMORIES: usize = 50;

/// Orchestrator configuration.
///
/// Defaults reproduce the stock sandbox behavior; the keyword list and
/// trigger phrase are configurable so callers can tighten the heuristics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Memory ledger capacity; the oldest entry is evicted past this bound
    pub max_memories: usize,
    /// A level-up fires every N completed exchanges
    pub level_up_every: usize,
    /// Minimum visible duration of the LevelingUp status (pacing hold)
    pub level_up_pause: Duration,
    /// Delay between a triggering chat reply and the level-up it schedules
    pub level_up_defer: Duration,
    /// Lowercase praise phrases matched as substrings of user input
    pub praise_keywords: Vec<String>,
    /// Lowercase phrase that triggers memory extraction
    pub memory_trigger: String,
    /// Reply substituted when the gateway returns blank text
    pub fallback_reply: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_memories: DEFAULT_MAX_MEMORIES,
            level_up_every: 3,
            level_up_pause: Duration::from_millis(2500),
            level_up_defer: Duration::from_millis(500),
            praise_keywords: DEFAULT_PRAISE_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
            memory_trigger: DEFAULT_MEMORY_TRIGGER.to_string(),
            fallback_reply: DEFAULT_FALLBACK_REPLY.to_string(),
        }
    }
}

impl OrchestratorConfig {
    /// Validate the configuration.
    ///
    /// Validates:
    /// - max_memories > 0
    /// - level_up_every > 0
    /// - praise keywords present and lowercase (matching lowercases input only)
    /// - memory_trigger non-empty and lowercase
    /// - fallback_reply non-empty
    pub fn validate(&self) -> VivariumResult<()> {
        if self.max_memories == 0 {
            return Err(VivariumError::Config(ConfigError::InvalidValue {
                field: "max_memories".to_string(),
                value: self.max_memories.to_string(),
                reason: "max_memories must be greater than 0".to_string(),
            }));
        }

        if self.level_up_every == 0 {
            return Err(VivariumError::Config(ConfigError::InvalidValue {
                field: "level_up_every".to_string(),
                value: self.level_up_every.to_string(),
                reason: "level_up_every must be greater than 0".to_string(),
            }));
        }

        if self.praise_keywords.is_empty() {
            return Err(VivariumError::Config(ConfigError::MissingRequired {
                field: "praise_keywords".to_string(),
            }));
        }

        for keyword in &self.praise_keywords {
            if keyword.is_empty() || *keyword != keyword.to_lowercase() {
                return Err(VivariumError::Config(ConfigError::InvalidValue {
                    field: "praise_keywords".to_string(),
                    value: keyword.clone(),
                    reason: "keywords must be non-empty and lowercase".to_string(),
                }));
            }
        }

        if self.memory_trigger.is_empty()
            || self.memory_trigger != self.memory_trigger.to_lowercase()
        {
            return Err(VivariumError::Config(ConfigError::InvalidValue {
                field: "memory_trigger".to_string(),
                value: self.memory_trigger.clone(),
                reason: "memory_trigger must be non-empty and lowercase".to_string(),
            }));
        }

        if self.fallback_reply.is_empty() {
            return Err(VivariumError::Config(ConfigError::MissingRequired {
                field: "fallback_reply".to_string(),
            }));
        }

        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entity_id_is_v7() {
        let id = new_entity_id();
        assert_eq!(id.get_version_num(), 7);
    }

    #[test]
    fn test_entity_ids_are_sortable() {
        let id1 = new_entity_id();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = new_entity_id();
        // UUIDv7 should be lexicographically sortable by time
        assert!(id1.to_string() < id2.to_string());
    }

    #[test]
    fn test_agent_status_default_is_idle() {
        assert_eq!(AgentStatus::default(), AgentStatus::Idle);
        assert!(AgentStatus::Idle.is_idle());
        assert!(!AgentStatus::Thinking.is_idle());
    }

    #[test]
    fn test_agent_status_db_str_round_trip() {
        for status in [
            AgentStatus::Idle,
            AgentStatus::Thinking,
            AgentStatus::Searching,
            AgentStatus::Evolving,
            AgentStatus::LevelingUp,
        ] {
            let parsed = AgentStatus::from_db_str(status.as_db_str()).unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_agent_status_parse_accepts_snake_case() {
        assert_eq!(
            AgentStatus::from_db_str("level_up").unwrap(),
            AgentStatus::LevelingUp
        );
        assert_eq!(
            AgentStatus::from_db_str("LEVELING_UP").unwrap(),
            AgentStatus::LevelingUp
        );
    }

    #[test]
    fn test_agent_status_parse_rejects_unknown() {
        let err = AgentStatus::from_db_str("dancing").unwrap_err();
        assert_eq!(err, AgentStatusParseError("dancing".to_string()));
    }

    #[test]
    fn test_message_role_serde_is_lowercase() {
        let json = serde_json::to_string(&MessageRole::User).unwrap();
        assert_eq!(json, "\"user\"");
        let json = serde_json::to_string(&MessageRole::Agent).unwrap();
        assert_eq!(json, "\"agent\"");
    }

    #[test]
    fn test_message_constructors() {
        let now = Utc::now();
        let user = Message::user("hello", now);
        assert_eq!(user.role, MessageRole::User);
        assert!(user.sources.is_empty());

        let sources = vec![SourceRef {
            title: "Source".to_string(),
            uri: "https://example.com".to_string(),
        }];
        let agent = Message::agent("hi", now, sources.clone());
        assert_eq!(agent.role, MessageRole::Agent);
        assert_eq!(agent.sources, sources);
    }

    #[test]
    fn test_message_deserialize_without_sources() {
        // User messages persisted by older snapshots carry no sources field
        let json = r#"{"role":"user","content":"hey","timestamp":"2024-01-01T00:00:00Z"}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert!(msg.sources.is_empty());
    }

    #[test]
    fn test_agent_new_defaults() {
        let agent = Agent::new("🦊", "Spark", "Curious");
        assert_eq!(agent.level, 1);
        assert_eq!(agent.status, AgentStatus::Idle);
        assert!(agent.history.is_empty());
        assert_eq!(agent.turn_count(), 0);
    }

    #[test]
    fn test_agent_builders() {
        let agent = Agent::new("👾", "Neon", "Analytic")
            .with_position(400.0, 300.0)
            .with_level(3);
        assert_eq!(agent.position, Position::new(400.0, 300.0));
        assert_eq!(agent.level, 3);
    }

    #[test]
    fn test_position_midpoint() {
        let mid = Position::midpoint(Position::new(100.0, 150.0), Position::new(400.0, 300.0));
        assert_eq!(mid, Position::new(250.0, 225.0));
    }

    #[test]
    fn test_memory_entry_key_format() {
        let entry = MemoryEntry::new("the sky is blue");
        assert!(entry.key.starts_with("note_"));
        assert_eq!(entry.value, "the sky is blue");
    }

    #[test]
    fn test_config_default_is_valid() {
        assert!(OrchestratorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_config_rejects_zero_max_memories() {
        let config = OrchestratorConfig {
            max_memories: 0,
            ..OrchestratorConfig::default()
        };
        let result = config.validate();
        assert!(matches!(
            result,
            Err(VivariumError::Config(ConfigError::InvalidValue { field, .. })) if field == "max_memories"
        ));
    }

    #[test]
    fn test_config_rejects_uppercase_keyword() {
        let config = OrchestratorConfig {
            praise_keywords: vec!["Thanks".to_string()],
            ..OrchestratorConfig::default()
        };
        let result = config.validate();
        assert!(matches!(
            result,
            Err(VivariumError::Config(ConfigError::InvalidValue { field, .. })) if field == "praise_keywords"
        ));
    }

    #[test]
    fn test_config_rejects_empty_trigger() {
        let config = OrchestratorConfig {
            memory_trigger: String::new(),
            ..OrchestratorConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_vivarium_error_from_variants() {
        let registry = VivariumError::from(RegistryError::AgentNotFound {
            agent_id: Uuid::nil(),
        });
        assert!(matches!(registry, VivariumError::Registry(_)));

        let gateway = VivariumError::from(GatewayError::InvalidResponse {
            provider: "test".to_string(),
            reason: "empty".to_string(),
        });
        assert!(matches!(gateway, VivariumError::Gateway(_)));

        let storage = VivariumError::from(StorageError::LockPoisoned);
        assert!(matches!(storage, VivariumError::Storage(_)));

        let validation = VivariumError::from(ValidationError::InvalidValue {
            field: "agent_ids".to_string(),
            reason: "identical".to_string(),
        });
        assert!(matches!(validation, VivariumError::Validation(_)));
    }

    #[test]
    fn test_error_display_agent_busy() {
        let err = RegistryError::AgentBusy {
            agent_id: Uuid::nil(),
            status: AgentStatus::Thinking,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("busy"));
        assert!(msg.contains("Thinking"));
    }
}

// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// For any max_memories == 0 the config SHALL be rejected; for any
        /// positive value with default remaining fields it SHALL be accepted.
        #[test]
        fn prop_config_max_memories_boundary(max_memories in 0usize..1000) {
            let config = OrchestratorConfig {
                max_memories,
                ..OrchestratorConfig::default()
            };
            prop_assert_eq!(config.validate().is_ok(), max_memories > 0);
        }

        /// For any lowercase non-empty keyword set, validation SHALL pass.
        #[test]
        fn prop_config_accepts_lowercase_keywords(
            keywords in prop::collection::vec("[a-z ]{1,20}", 1..10)
        ) {
            let config = OrchestratorConfig {
                praise_keywords: keywords,
                ..OrchestratorConfig::default()
            };
            prop_assert!(config.validate().is_ok());
        }

        /// Midpoint SHALL always land between its operands on both axes.
        #[test]
        fn prop_midpoint_is_between(
            ax in -1000.0f32..1000.0, ay in -1000.0f32..1000.0,
            bx in -1000.0f32..1000.0, by in -1000.0f32..1000.0,
        ) {
            let mid = Position::midpoint(Position::new(ax, ay), Position::new(bx, by));
            prop_assert!(mid.x >= ax.min(bx) && mid.x <= ax.max(bx));
            prop_assert!(mid.y >= ay.min(by) && mid.y <= ay.max(by));
        }

        /// Agent status strings SHALL round-trip through from_db_str.
        #[test]
        fn prop_status_round_trip(idx in 0usize..5) {
            let statuses = [
                AgentStatus::Idle,
                AgentStatus::Thinking,
                AgentStatus::Searching,
                AgentStatus::Evolving,
                AgentStatus::LevelingUp,
            ];
            let status = statuses[idx];
            prop_assert_eq!(AgentStatus::from_db_str(status.as_db_str()).unwrap(), status);
        }

        /// Message serde SHALL round-trip content and sources.
        #[test]
        fn prop_message_serde_round_trip(
            content in ".{0,100}",
            titles in prop::collection::vec("[a-zA-Z ]{1,20}", 0..3)
        ) {
            let sources: Vec<SourceRef> = titles
                .into_iter()
                .map(|title| SourceRef {
                    title,
                    uri: "https://example.com".to_string(),
                })
                .collect();
            let msg = Message::agent(content, Utc::now(), sources);
            let json = serde_json::to_string(&msg).unwrap();
            let back: Message = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(back, msg);
        }
    }
}
