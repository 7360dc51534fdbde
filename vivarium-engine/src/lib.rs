//! Vivarium Engine - Orchestration Core
//!
//! Drives the per-agent lifecycle state machine and the chat/level/merge
//! orchestration rules:
//! - Agent registry with copy-on-write mutation and the per-agent Idle guard
//! - Bounded newest-first memory ledger
//! - Trigger heuristics (praise detection, memory extraction, level cadence)
//! - The orchestrator itself, which issues gateway calls and applies results
//!
//! The engine only sees the [`vivarium_gateway::AiGateway`] and
//! [`vivarium_storage::SnapshotStore`] traits; concrete providers are
//! injected by the caller.

pub mod ledger;
pub mod orchestrator;
pub mod registry;
pub mod selection;
pub mod triggers;

pub use ledger::MemoryLedger;
pub use orchestrator::{ChatOutcome, LevelUpOutcome, MergeOutcome, Orchestrator};
pub use registry::AgentRegistry;
pub use selection::MergeSelection;
