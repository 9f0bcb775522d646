use thiserror::Error;

use crate::{EventState, Participant, ParticipantId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// Assignments were already persisted for this cycle; nothing was written.
    AlreadyAssigned,
}

/// Persistence seam for participants and the event-state singleton.
pub trait ExchangeStore {
    fn event_state(&self) -> Result<Option<EventState>, StoreError>;

    /// Opted-in participants, in a stable order across calls.
    fn participants(&self) -> Result<Vec<Participant>, StoreError>;

    /// Writes every `(from, to)` friend link and flips the event to locked and
    /// assigned, as one unit. Must check `assignments_done` under the same
    /// guard as the writes and refuse with `AlreadyAssigned` if it is set.
    fn commit_assignments(
        &self,
        assignments: &[(ParticipantId, ParticipantId)],
    ) -> Result<CommitOutcome, StoreError>;

    /// Opts everyone out, clears friend links and reopens the event.
    fn reset_cycle(&self) -> Result<(), StoreError>;
}

impl<S: ExchangeStore + ?Sized> ExchangeStore for std::sync::Arc<S> {
    fn event_state(&self) -> Result<Option<EventState>, StoreError> {
        (**self).event_state()
    }

    fn participants(&self) -> Result<Vec<Participant>, StoreError> {
        (**self).participants()
    }

    fn commit_assignments(
        &self,
        assignments: &[(ParticipantId, ParticipantId)],
    ) -> Result<CommitOutcome, StoreError> {
        (**self).commit_assignments(assignments)
    }

    fn reset_cycle(&self) -> Result<(), StoreError> {
        (**self).reset_cycle()
    }
}
