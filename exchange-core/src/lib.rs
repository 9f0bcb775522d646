use serde::{Deserialize, Serialize};

pub mod derangement;
pub mod engine;
pub mod store;

pub use derangement::{derangement, is_derangement, repair_fixed_points};
pub use engine::{AssignmentEngine, EngineError};
pub use store::{CommitOutcome, ExchangeStore, StoreError};

pub type ParticipantId = String;

/// A registered person as seen by the assignment engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participant {
    pub id: ParticipantId,
    pub display_name: String,
    pub participating: bool,
    pub assigned_friend_id: Option<ParticipantId>,
}

/// Singleton record tracking where the current event cycle stands.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EventState {
    pub event_locked: bool,
    pub assignments_done: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeStatus {
    pub is_locked: bool,
    pub is_assignment_done: bool,
    pub participant_count: usize,
}

/// One giver/receiver pair, by display name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pairing {
    pub from: String,
    pub to: String,
}
