use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::StoreError;
use super::proof::Proof;
use super::window::{AttendanceWindow, WindowId};

/// Durable storage of attendance windows.
///
/// All correlation writes go through a [`WindowTx`] scoped to one user, so
/// the read of the latest window and the write that follows are isolated
/// from other submissions of that user.
#[async_trait]
pub trait AttendanceStore: Send + Sync {
    /// Opens a transaction for `user_id`, blocking other transactions of the
    /// same user until it is committed or dropped.
    async fn begin(&self, user_id: u64) -> Result<Box<dyn WindowTx>, StoreError>;

    /// Windows of a user created in `[from, to)`, oldest first.
    async fn windows_between(
        &self,
        user_id: u64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AttendanceWindow>, StoreError>;
}

/// A per-user transaction. Dropping it without [`WindowTx::commit`] discards
/// every write made through it.
#[async_trait]
pub trait WindowTx: Send {
    async fn latest_window(&mut self) -> Result<Option<AttendanceWindow>, StoreError>;

    async fn create_window(&mut self, proof: &Proof) -> Result<WindowId, StoreError>;

    /// Writes the proof into the slot of its kind on an existing window.
    async fn update_window(&mut self, window_id: WindowId, proof: &Proof) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
