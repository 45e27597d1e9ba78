use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, Weak};

use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per user id, so at most one correlation per user is in
/// flight. Waiters are served in FIFO order.
///
/// The table keeps only weak references; an entry disappears once nobody
/// holds or waits on its lock.
#[derive(Debug, Default)]
pub struct UserLocks {
    table: StdMutex<HashMap<u64, Weak<Mutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, user_id: u64) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut table = self.table.lock().expect("user lock table poisoned");
            match table.get(&user_id).and_then(Weak::upgrade) {
                Some(mutex) => mutex,
                None => {
                    table.retain(|_, weak| weak.strong_count() > 0);
                    let mutex = Arc::new(Mutex::new(()));
                    table.insert(user_id, Arc::downgrade(&mutex));
                    mutex
                }
            }
        };
        mutex.lock_owned().await
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.table.lock().expect("user lock table poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_user_is_serialized() {
        let locks = UserLocks::new();
        let guard = locks.lock(1).await;

        let pending = tokio::time::timeout(Duration::from_millis(50), locks.lock(1)).await;
        assert!(pending.is_err(), "second lock for the same user must wait");

        drop(guard);
        let relocked = tokio::time::timeout(Duration::from_millis(50), locks.lock(1)).await;
        assert!(relocked.is_ok());
    }

    #[tokio::test]
    async fn different_users_do_not_block_each_other() {
        let locks = UserLocks::new();
        let _one = locks.lock(1).await;
        let two = tokio::time::timeout(Duration::from_millis(50), locks.lock(2)).await;
        assert!(two.is_ok());
    }

    #[tokio::test]
    async fn idle_entries_are_pruned() {
        let locks = UserLocks::new();
        drop(locks.lock(1).await);
        drop(locks.lock(2).await);
        let _three = locks.lock(3).await;
        assert_eq!(locks.tracked(), 1);
    }
}
