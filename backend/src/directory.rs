//! User accounts, participation flags, friend links and wishlists.
//!
//! Everything lives in one in-memory snapshot behind a `std::sync::RwLock`.
//! When a persist path is configured the whole snapshot is rewritten as JSON
//! after each mutating request and loaded back at startup.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use exchange_core::{
    CommitOutcome, EventState, ExchangeStore, Participant, ParticipantId, StoreError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    User,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub full_name: String,
    pub password_hash: String,
    pub salt: String,
    pub role: Role,
    pub participating: bool,
    pub assigned_friend_id: Option<String>,
    pub registered_at: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WishlistItem {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRef {
    pub id: String,
    pub full_name: String,
}

/// Opted-in participant with their friend resolved to a name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub id: String,
    pub full_name: String,
    pub assigned_friend: Option<FriendRef>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    event: Option<EventState>,
    users: Vec<UserRecord>,
    #[serde(default)]
    wishlists: HashMap<String, Vec<WishlistItem>>,
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("this name is already registered, add your initials to differentiate")]
    NameTaken,
    #[error("user not found")]
    UserNotFound,
    #[error("event is locked")]
    EventLocked,
    #[error("already participating")]
    AlreadyParticipating,
    #[error("event state not initialized")]
    NotInitialized,
    #[error("cannot delete participants after assignments are done")]
    AssignmentsDone,
    #[error("cannot delete an admin user")]
    CannotRemoveAdmin,
    #[error("no assigned friend found")]
    NoAssignedFriend,
    #[error("assigned friend not found")]
    FriendNotFound,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("cannot read snapshot {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("snapshot {} is corrupt: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Default)]
pub struct Directory {
    data: RwLock<Snapshot>,
    persist_path: Option<PathBuf>,
    /// Held across snapshot and write so files land in mutation order.
    persist_lock: tokio::sync::Mutex<()>,
}

impl Directory {
    /// Loads the snapshot at `path`, starting empty only when no file exists.
    ///
    /// An unreadable or unparsable file is an error so it is never replaced
    /// by an empty directory.
    pub async fn with_persistence(path: impl Into<PathBuf>) -> Result<Self, SnapshotError> {
        let path = path.into();
        let mut directory = Self {
            persist_path: Some(path.clone()),
            ..Self::default()
        };
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let saved = serde_json::from_slice::<Snapshot>(&bytes).map_err(|source| {
                    SnapshotError::Corrupt {
                        path: path.clone(),
                        source,
                    }
                })?;
                info!(path = %path.display(), users = saved.users.len(), "loaded snapshot");
                directory.data = RwLock::new(saved);
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no snapshot yet, starting empty");
            }
            Err(source) => return Err(SnapshotError::Read { path, source }),
        }
        Ok(directory)
    }

    /// Creates the event-state singleton if absent. Returns true when created.
    pub fn initialize_event(&mut self) -> bool {
        let data = self.data.get_mut().unwrap_or_else(PoisonError::into_inner);
        if data.event.is_some() {
            return false;
        }
        data.event = Some(EventState::default());
        info!("event state initialized");
        true
    }

    pub async fn persist(&self) {
        let Some(path) = &self.persist_path else {
            return;
        };
        let _guard = self.persist_lock.lock().await;
        let snapshot = match self.read() {
            Ok(data) => data.clone(),
            Err(err) => {
                error!(%err, "cannot snapshot directory");
                return;
            }
        };
        let json = match serde_json::to_vec_pretty(&snapshot) {
            Ok(json) => json,
            Err(err) => {
                error!(%err, "snapshot serialization failed");
                return;
            }
        };
        // write-then-rename keeps the previous file intact if we stop midway
        let tmp = path.with_extension("tmp");
        if let Err(err) = tokio::fs::write(&tmp, json).await {
            error!(path = %tmp.display(), %err, "persist error");
            return;
        }
        if let Err(err) = tokio::fs::rename(&tmp, path).await {
            error!(path = %path.display(), %err, "persist rename error");
        }
    }

    pub fn insert_user(
        &self,
        full_name: String,
        password_hash: String,
        salt: String,
    ) -> Result<UserRecord, DirectoryError> {
        let mut data = self.write()?;
        if find_by_name(&data.users, &full_name).is_some() {
            return Err(DirectoryError::NameTaken);
        }
        let role = if data.users.is_empty() {
            Role::Admin
        } else {
            Role::User
        };
        let record = UserRecord {
            id: Uuid::new_v4().to_string(),
            full_name,
            password_hash,
            salt,
            role,
            participating: false,
            assigned_friend_id: None,
            registered_at: now_millis(),
        };
        data.users.push(record.clone());
        info!(user_id = %record.id, ?role, "user registered");
        Ok(record)
    }

    /// Case-insensitive lookup.
    pub fn find_by_name(&self, full_name: &str) -> Result<Option<UserRecord>, DirectoryError> {
        Ok(find_by_name(&self.read()?.users, full_name).cloned())
    }

    pub fn user(&self, user_id: &str) -> Result<UserRecord, DirectoryError> {
        self.read()?
            .users
            .iter()
            .find(|u| u.id == user_id)
            .cloned()
            .ok_or(DirectoryError::UserNotFound)
    }

    pub fn opt_in(&self, user_id: &str) -> Result<UserRecord, DirectoryError> {
        let mut data = self.write()?;
        let event = data.event.ok_or(DirectoryError::NotInitialized)?;
        let user = data
            .users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or(DirectoryError::UserNotFound)?;
        if event.event_locked {
            return Err(DirectoryError::EventLocked);
        }
        if user.participating {
            return Err(DirectoryError::AlreadyParticipating);
        }
        user.participating = true;
        info!(user_id, "user opted in");
        Ok(user.clone())
    }

    /// Display name of the caller's assigned friend, if assignments exist.
    pub fn assigned_friend(&self, user_id: &str) -> Result<Option<String>, DirectoryError> {
        let data = self.read()?;
        let user = data
            .users
            .iter()
            .find(|u| u.id == user_id)
            .ok_or(DirectoryError::UserNotFound)?;
        let Some(friend_id) = &user.assigned_friend_id else {
            return Ok(None);
        };
        data.users
            .iter()
            .find(|u| &u.id == friend_id)
            .map(|friend| Some(friend.full_name.clone()))
            .ok_or(DirectoryError::FriendNotFound)
    }

    pub fn remove_participant(&self, user_id: &str) -> Result<UserRecord, DirectoryError> {
        let mut data = self.write()?;
        let event = data.event.ok_or(DirectoryError::NotInitialized)?;
        if event.assignments_done {
            return Err(DirectoryError::AssignmentsDone);
        }
        let index = data
            .users
            .iter()
            .position(|u| u.id == user_id)
            .ok_or(DirectoryError::UserNotFound)?;
        if data.users[index].role == Role::Admin {
            return Err(DirectoryError::CannotRemoveAdmin);
        }
        let removed = data.users.remove(index);
        data.wishlists.remove(user_id);
        info!(user_id, "participant removed");
        Ok(removed)
    }

    pub fn roster(&self) -> Result<Vec<RosterEntry>, DirectoryError> {
        let data = self.read()?;
        Ok(data
            .users
            .iter()
            .filter(|u| u.participating)
            .map(|u| RosterEntry {
                id: u.id.clone(),
                full_name: u.full_name.clone(),
                assigned_friend: u.assigned_friend_id.as_ref().and_then(|fid| {
                    data.users.iter().find(|f| &f.id == fid).map(|f| FriendRef {
                        id: f.id.clone(),
                        full_name: f.full_name.clone(),
                    })
                }),
            })
            .collect())
    }

    pub fn wishlist(&self, user_id: &str) -> Result<Vec<WishlistItem>, DirectoryError> {
        Ok(self
            .read()?
            .wishlists
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }

    pub fn replace_wishlist(
        &self,
        user_id: &str,
        items: Vec<WishlistItem>,
    ) -> Result<Vec<WishlistItem>, DirectoryError> {
        let mut data = self.write()?;
        if !data.users.iter().any(|u| u.id == user_id) {
            return Err(DirectoryError::UserNotFound);
        }
        data.wishlists.insert(user_id.to_string(), items.clone());
        debug!(user_id, items = items.len(), "wishlist updated");
        Ok(items)
    }

    pub fn friend_wishlist(&self, user_id: &str) -> Result<Vec<WishlistItem>, DirectoryError> {
        let data = self.read()?;
        let friend_id = data
            .users
            .iter()
            .find(|u| u.id == user_id)
            .and_then(|u| u.assigned_friend_id.as_ref())
            .ok_or(DirectoryError::NoAssignedFriend)?;
        Ok(data.wishlists.get(friend_id).cloned().unwrap_or_default())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Snapshot>, StoreError> {
        self.data
            .read()
            .map_err(|_| StoreError::Unavailable("directory lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Snapshot>, StoreError> {
        self.data
            .write()
            .map_err(|_| StoreError::Unavailable("directory lock poisoned".into()))
    }
}

impl ExchangeStore for Directory {
    fn event_state(&self) -> Result<Option<EventState>, StoreError> {
        Ok(self.read()?.event)
    }

    fn participants(&self) -> Result<Vec<Participant>, StoreError> {
        Ok(self
            .read()?
            .users
            .iter()
            .filter(|u| u.participating)
            .map(|u| Participant {
                id: u.id.clone(),
                display_name: u.full_name.clone(),
                participating: true,
                assigned_friend_id: u.assigned_friend_id.clone(),
            })
            .collect())
    }

    fn commit_assignments(
        &self,
        assignments: &[(ParticipantId, ParticipantId)],
    ) -> Result<CommitOutcome, StoreError> {
        let mut data = self.write()?;
        let Some(event) = data.event else {
            return Err(StoreError::Unavailable("event state missing".into()));
        };
        if event.assignments_done {
            return Ok(CommitOutcome::AlreadyAssigned);
        }
        for (from, to) in assignments {
            if let Some(user) = data.users.iter_mut().find(|u| &u.id == from) {
                user.assigned_friend_id = Some(to.clone());
            }
        }
        data.event = Some(EventState {
            event_locked: true,
            assignments_done: true,
        });
        Ok(CommitOutcome::Committed)
    }

    fn reset_cycle(&self) -> Result<(), StoreError> {
        let mut data = self.write()?;
        for user in data.users.iter_mut().filter(|u| u.participating) {
            user.participating = false;
            user.assigned_friend_id = None;
        }
        data.event = Some(EventState::default());
        Ok(())
    }
}

fn find_by_name<'a>(users: &'a [UserRecord], full_name: &str) -> Option<&'a UserRecord> {
    let wanted = full_name.to_lowercase();
    users.iter().find(|u| u.full_name.to_lowercase() == wanted)
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_snapshot_path() -> PathBuf {
        std::env::temp_dir().join(format!("directory_{}.json", Uuid::new_v4()))
    }

    fn directory_with(names: &[&str]) -> (Directory, Vec<String>) {
        let mut directory = Directory::default();
        directory.initialize_event();
        let ids = names
            .iter()
            .map(|name| {
                directory
                    .insert_user(name.to_string(), "hash".into(), "salt".into())
                    .unwrap()
                    .id
            })
            .collect();
        (directory, ids)
    }

    #[test]
    fn first_user_is_admin_and_names_are_case_insensitive() {
        let (directory, ids) = directory_with(&["Ada Lovelace", "Alan Turing"]);
        assert_eq!(directory.user(&ids[0]).unwrap().role, Role::Admin);
        assert_eq!(directory.user(&ids[1]).unwrap().role, Role::User);

        let err = directory
            .insert_user("ada LOVELACE".into(), "h".into(), "s".into())
            .unwrap_err();
        assert!(matches!(err, DirectoryError::NameTaken));
        assert_eq!(
            directory.find_by_name("alan turing").unwrap().unwrap().id,
            ids[1]
        );
    }

    #[test]
    fn initialize_event_only_once() {
        let mut directory = Directory::default();
        assert!(directory.event_state().unwrap().is_none());
        assert!(directory.initialize_event());
        assert!(!directory.initialize_event());
        assert_eq!(directory.event_state().unwrap(), Some(EventState::default()));
    }

    #[test]
    fn opt_in_rejected_when_locked_or_repeated() {
        let (directory, ids) = directory_with(&["Ada Lovelace", "Alan Turing", "Grace Hopper"]);
        directory.opt_in(&ids[0]).unwrap();
        assert!(matches!(
            directory.opt_in(&ids[0]).unwrap_err(),
            DirectoryError::AlreadyParticipating
        ));
        directory.opt_in(&ids[1]).unwrap();

        directory
            .commit_assignments(&[
                (ids[0].clone(), ids[1].clone()),
                (ids[1].clone(), ids[0].clone()),
            ])
            .unwrap();

        assert!(matches!(
            directory.opt_in(&ids[2]).unwrap_err(),
            DirectoryError::EventLocked
        ));
    }

    #[test]
    fn opt_in_without_event_state_fails() {
        let directory = Directory::default();
        let id = directory
            .insert_user("Ada Lovelace".into(), "h".into(), "s".into())
            .unwrap()
            .id;
        assert!(matches!(
            directory.opt_in(&id).unwrap_err(),
            DirectoryError::NotInitialized
        ));
    }

    #[test]
    fn commit_is_compare_and_swap() {
        let (directory, ids) = directory_with(&["Ada Lovelace", "Alan Turing"]);
        for id in &ids {
            directory.opt_in(id).unwrap();
        }
        let swap = [
            (ids[0].clone(), ids[1].clone()),
            (ids[1].clone(), ids[0].clone()),
        ];
        assert_eq!(directory.commit_assignments(&swap).unwrap(), CommitOutcome::Committed);

        let bogus = [(ids[0].clone(), ids[0].clone())];
        assert_eq!(
            directory.commit_assignments(&bogus).unwrap(),
            CommitOutcome::AlreadyAssigned
        );
        assert_eq!(
            directory.assigned_friend(&ids[0]).unwrap().as_deref(),
            Some("Alan Turing")
        );
        assert_eq!(
            directory.event_state().unwrap(),
            Some(EventState { event_locked: true, assignments_done: true })
        );
    }

    #[test]
    fn reset_cycle_clears_only_participants() {
        let (directory, ids) = directory_with(&["Ada Lovelace", "Alan Turing", "Grace Hopper"]);
        directory.opt_in(&ids[0]).unwrap();
        directory.opt_in(&ids[1]).unwrap();
        directory
            .commit_assignments(&[
                (ids[0].clone(), ids[1].clone()),
                (ids[1].clone(), ids[0].clone()),
            ])
            .unwrap();

        directory.reset_cycle().unwrap();

        assert!(directory.participants().unwrap().is_empty());
        assert_eq!(directory.assigned_friend(&ids[0]).unwrap(), None);
        assert_eq!(directory.event_state().unwrap(), Some(EventState::default()));
        assert!(directory.roster().unwrap().is_empty());
    }

    #[test]
    fn remove_participant_rules() {
        let (directory, ids) = directory_with(&["Ada Lovelace", "Alan Turing", "Grace Hopper"]);
        assert!(matches!(
            directory.remove_participant(&ids[0]).unwrap_err(),
            DirectoryError::CannotRemoveAdmin
        ));
        directory
            .replace_wishlist(&ids[2], vec![WishlistItem {
                title: "Compiler".into(),
                description: None,
                link: None,
            }])
            .unwrap();
        directory.remove_participant(&ids[2]).unwrap();
        assert!(matches!(
            directory.user(&ids[2]).unwrap_err(),
            DirectoryError::UserNotFound
        ));
        assert!(directory.wishlist(&ids[2]).unwrap().is_empty());

        directory.opt_in(&ids[0]).unwrap();
        directory.opt_in(&ids[1]).unwrap();
        directory
            .commit_assignments(&[
                (ids[0].clone(), ids[1].clone()),
                (ids[1].clone(), ids[0].clone()),
            ])
            .unwrap();
        assert!(matches!(
            directory.remove_participant(&ids[1]).unwrap_err(),
            DirectoryError::AssignmentsDone
        ));
    }

    #[test]
    fn roster_resolves_friend_names() {
        let (directory, ids) = directory_with(&["Ada Lovelace", "Alan Turing"]);
        for id in &ids {
            directory.opt_in(id).unwrap();
        }
        directory
            .commit_assignments(&[
                (ids[0].clone(), ids[1].clone()),
                (ids[1].clone(), ids[0].clone()),
            ])
            .unwrap();

        let roster = directory.roster().unwrap();
        assert_eq!(roster.len(), 2);
        assert_eq!(
            roster[0].assigned_friend,
            Some(FriendRef {
                id: ids[1].clone(),
                full_name: "Alan Turing".into(),
            })
        );
    }

    #[test]
    fn friend_wishlist_requires_assignment() {
        let (directory, ids) = directory_with(&["Ada Lovelace", "Alan Turing"]);
        assert!(matches!(
            directory.friend_wishlist(&ids[0]).unwrap_err(),
            DirectoryError::NoAssignedFriend
        ));

        let items = vec![WishlistItem {
            title: "Punch cards".into(),
            description: Some("blank ones".into()),
            link: None,
        }];
        directory.replace_wishlist(&ids[1], items.clone()).unwrap();
        for id in &ids {
            directory.opt_in(id).unwrap();
        }
        directory
            .commit_assignments(&[
                (ids[0].clone(), ids[1].clone()),
                (ids[1].clone(), ids[0].clone()),
            ])
            .unwrap();

        assert_eq!(directory.friend_wishlist(&ids[0]).unwrap(), items);
        assert!(directory.friend_wishlist(&ids[1]).unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_snapshot_is_refused_and_left_in_place() {
        let path = temp_snapshot_path();
        let truncated = r#"{"event":{"eventLocked":false,"assignmentsDone":false},"users":[{"id":"1","full_name":"Ada Lovelace""#;
        tokio::fs::write(&path, truncated).await.unwrap();

        let err = Directory::with_persistence(path.clone()).await.unwrap_err();

        assert!(matches!(err, SnapshotError::Corrupt { .. }));
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), truncated);
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn unreadable_snapshot_is_an_error_but_missing_is_fresh() {
        let dir = std::env::temp_dir().join(format!("directory_dir_{}", Uuid::new_v4()));
        tokio::fs::create_dir(&dir).await.unwrap();
        let err = Directory::with_persistence(dir.clone()).await.unwrap_err();
        assert!(matches!(err, SnapshotError::Read { .. }));
        let _ = tokio::fs::remove_dir(&dir).await;

        let fresh = Directory::with_persistence(temp_snapshot_path()).await.unwrap();
        assert!(fresh.participants().unwrap().is_empty());
        assert!(fresh.event_state().unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn overlapping_persists_leave_latest_valid_file() {
        let path = temp_snapshot_path();
        let directory = std::sync::Arc::new(Directory::with_persistence(path.clone()).await.unwrap());

        let mut handles = Vec::new();
        for i in 0..16 {
            let directory = std::sync::Arc::clone(&directory);
            handles.push(tokio::spawn(async move {
                directory
                    .insert_user(format!("Person Number{}", "x".repeat(i + 2)), "h".into(), "s".into())
                    .unwrap();
                directory.persist().await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let reloaded = Directory::with_persistence(path.clone()).await.unwrap();
        assert_eq!(reloaded.read().unwrap().users.len(), 16);
        assert!(tokio::fs::metadata(path.with_extension("tmp")).await.is_err());
        let _ = tokio::fs::remove_file(&path).await;
    }
}
