use std::sync::{Mutex, TryLockError};

use rand::Rng;
use thiserror::Error;
use tracing::{info, warn};

use crate::derangement::derangement;
use crate::store::{CommitOutcome, ExchangeStore, StoreError};
use crate::{EventState, ExchangeStatus, Pairing, Participant, ParticipantId};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("event state not initialized")]
    NotInitialized,
    #[error("need at least 2 participants, found {found}")]
    InsufficientParticipants { found: usize },
    #[error("another assignment is in progress, try again")]
    ConcurrentAssignmentInProgress,
    #[error("assigned friend of participant {0} is missing")]
    MissingFriend(ParticipantId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Computes and persists the secret-friend derangement, at most once per
/// event cycle.
pub struct AssignmentEngine<S> {
    store: S,
    assignment_lock: Mutex<()>,
}

impl<S: ExchangeStore> AssignmentEngine<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            assignment_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn status(&self) -> Result<ExchangeStatus, EngineError> {
        let state = self.event_state()?;
        let participant_count = self.store.participants()?.len();
        Ok(ExchangeStatus {
            is_locked: state.event_locked,
            is_assignment_done: state.assignments_done,
            participant_count,
        })
    }

    /// Pairs every opted-in participant with someone else.
    ///
    /// Once a cycle has been assigned this returns the persisted pairs
    /// unchanged; it never draws a second derangement for the same cycle.
    pub fn perform_assignment<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
    ) -> Result<Vec<Pairing>, EngineError> {
        let _guard = match self.assignment_lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                return Err(EngineError::ConcurrentAssignmentInProgress)
            }
        };

        let state = self.event_state()?;
        let participants = self.store.participants()?;
        if state.assignments_done {
            return existing_pairings(&participants);
        }

        let found = participants.len();
        let perm = derangement(found, rng).ok_or(EngineError::InsufficientParticipants { found })?;

        let links = perm
            .iter()
            .enumerate()
            .map(|(from, &to)| (participants[from].id.clone(), participants[to].id.clone()))
            .collect::<Vec<_>>();

        match self.store.commit_assignments(&links)? {
            CommitOutcome::Committed => {
                info!(participants = found, "secret friends assigned");
            }
            CommitOutcome::AlreadyAssigned => {
                warn!("assignment lost the commit race to another writer");
                return Err(EngineError::ConcurrentAssignmentInProgress);
            }
        }

        Ok(perm
            .iter()
            .enumerate()
            .map(|(from, &to)| Pairing {
                from: participants[from].display_name.clone(),
                to: participants[to].display_name.clone(),
            })
            .collect())
    }

    /// Starts a new cycle. Waits for an in-flight assignment to finish first.
    pub fn reset_assignments(&self) -> Result<(), EngineError> {
        let _guard = self
            .assignment_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.event_state()?;
        self.store.reset_cycle()?;
        info!("event cycle reset");
        Ok(())
    }

    fn event_state(&self) -> Result<EventState, EngineError> {
        self.store.event_state()?.ok_or(EngineError::NotInitialized)
    }
}

fn existing_pairings(participants: &[Participant]) -> Result<Vec<Pairing>, EngineError> {
    participants
        .iter()
        .map(|p| {
            let friend = p
                .assigned_friend_id
                .as_ref()
                .and_then(|fid| participants.iter().find(|other| &other.id == fid))
                .ok_or_else(|| EngineError::MissingFriend(p.id.clone()))?;
            Ok(Pairing {
                from: p.display_name.clone(),
                to: friend.display_name.clone(),
            })
        })
        .collect()
}
