use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::error::StoreError;
use super::proof::Proof;
use super::store::{AttendanceStore, WindowTx};
use super::window::{AttendanceWindow, WindowId};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    last_id: WindowId,
    windows: Vec<AttendanceWindow>,
}

/// In-process store used by tests and local runs without a database.
///
/// A transaction holds the whole store and works on a staged copy, so
/// uncommitted writes are never visible and are dropped with the transaction.
#[derive(Debug, Clone, Default)]
pub struct MemoryAttendanceStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryAttendanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed windows of a user, oldest first.
    pub async fn windows_of(&self, user_id: u64) -> Vec<AttendanceWindow> {
        self.state
            .lock()
            .await
            .windows
            .iter()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AttendanceStore for MemoryAttendanceStore {
    async fn begin(&self, user_id: u64) -> Result<Box<dyn WindowTx>, StoreError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryWindowTx {
            user_id,
            guard,
            staged,
        }))
    }

    async fn windows_between(
        &self,
        user_id: u64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AttendanceWindow>, StoreError> {
        Ok(self
            .windows_of(user_id)
            .await
            .into_iter()
            .filter(|w| w.created_at().is_some_and(|at| at >= from && at < to))
            .collect())
    }
}

struct MemoryWindowTx {
    user_id: u64,
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
}

#[async_trait]
impl WindowTx for MemoryWindowTx {
    async fn latest_window(&mut self) -> Result<Option<AttendanceWindow>, StoreError> {
        Ok(self
            .staged
            .windows
            .iter()
            .rev()
            .find(|w| w.user_id == self.user_id)
            .cloned())
    }

    async fn create_window(&mut self, proof: &Proof) -> Result<WindowId, StoreError> {
        self.staged.last_id += 1;
        let id = self.staged.last_id;
        self.staged.windows.push(AttendanceWindow::seeded(id, proof));
        Ok(id)
    }

    async fn update_window(&mut self, window_id: WindowId, proof: &Proof) -> Result<(), StoreError> {
        let user_id = self.user_id;
        let window = self
            .staged
            .windows
            .iter_mut()
            .find(|w| w.id == window_id && w.user_id == user_id)
            .ok_or(StoreError::Conflict(window_id))?;
        window.put(proof);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryWindowTx {
            mut guard, staged, ..
        } = *self;
        *guard = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::proof::{Coordinates, ProofKind, ProofPayload};

    fn location(user_id: u64) -> Proof {
        Proof {
            user_id,
            kind: ProofKind::Location,
            payload: ProofPayload::Location(Coordinates {
                latitude: 1.0,
                longitude: 2.0,
            }),
            submitted_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn dropped_transaction_discards_writes() {
        let store = MemoryAttendanceStore::new();

        let mut tx = store.begin(1).await.unwrap();
        tx.create_window(&location(1)).await.unwrap();
        drop(tx);
        assert!(store.windows_of(1).await.is_empty());

        let mut tx = store.begin(1).await.unwrap();
        let id = tx.create_window(&location(1)).await.unwrap();
        tx.commit().await.unwrap();
        let windows = store.windows_of(1).await;
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].id, id);
    }

    #[tokio::test]
    async fn latest_window_is_scoped_to_the_user() {
        let store = MemoryAttendanceStore::new();
        let mut tx = store.begin(1).await.unwrap();
        let mine = tx.create_window(&location(1)).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin(2).await.unwrap();
        tx.create_window(&location(2)).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin(1).await.unwrap();
        let latest = tx.latest_window().await.unwrap().expect("user 1 has a window");
        assert_eq!(latest.id, mine);
    }

    #[tokio::test]
    async fn updating_another_users_window_is_a_conflict() {
        let store = MemoryAttendanceStore::new();
        let mut tx = store.begin(1).await.unwrap();
        let id = tx.create_window(&location(1)).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin(2).await.unwrap();
        let err = tx.update_window(id, &location(2)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(w) if w == id));
    }
}
