use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use super::correlator::{CorrelationPolicy, StartReason, Transition, decide};
use super::error::{StoreError, SubmitError};
use super::locks::UserLocks;
use super::outcome::Outcome;
use super::proof::{Proof, ProofKind, ProofPayload};
use super::store::AttendanceStore;
use super::window::AttendanceWindow;

/// Entry point of the correlation core: one call per incoming proof.
pub struct AttendanceService {
    store: Arc<dyn AttendanceStore>,
    locks: UserLocks,
    policy: CorrelationPolicy,
}

impl AttendanceService {
    pub fn new(store: Arc<dyn AttendanceStore>, policy: CorrelationPolicy) -> Self {
        Self {
            store,
            locks: UserLocks::new(),
            policy,
        }
    }

    pub fn policy(&self) -> &CorrelationPolicy {
        &self.policy
    }

    /// Validates a raw proof and correlates it against the user's latest window.
    pub async fn submit_proof(
        &self,
        user_id: u64,
        kind: ProofKind,
        payload: Option<ProofPayload>,
        submitted_at: Option<DateTime<Utc>>,
    ) -> Result<Outcome, SubmitError> {
        let proof = Proof::new(user_id, kind, payload, submitted_at).inspect_err(|e| {
            debug!(user_id, %kind, error = %e, "Rejected malformed proof");
        })?;
        self.correlate(&proof).await
    }

    /// Read-decide-write for one proof, under the user's lock and inside one
    /// store transaction. Nothing is committed unless every step succeeds.
    #[instrument(
        name = "correlate",
        skip(self, proof),
        fields(user_id = proof.user_id, kind = %proof.kind)
    )]
    pub async fn correlate(&self, proof: &Proof) -> Result<Outcome, SubmitError> {
        let _guard = self.locks.lock(proof.user_id).await;

        let result = self.correlate_locked(proof).await;
        match &result {
            Ok(outcome) => info!(
                outcome = outcome.label(),
                window_id = outcome.window_id(),
                new_window = outcome.started_window(),
                "Proof correlated"
            ),
            Err(e) => warn!(error = %e, "Proof correlation failed"),
        }
        result
    }

    async fn correlate_locked(&self, proof: &Proof) -> Result<Outcome, SubmitError> {
        let mut tx = self.store.begin(proof.user_id).await?;
        let latest = tx.latest_window().await?;
        let transition = decide(latest.as_ref(), proof, &self.policy);
        debug!(?transition, "Transition decided");

        let respond_by = proof.submitted_at + self.policy.delay_budget;
        let kind = proof.kind;

        let outcome = match transition {
            Transition::Start(reason) => {
                let window_id = tx.create_window(proof).await?;
                match reason {
                    StartReason::PreviousComplete(completed_window_id) => Outcome::AlreadyComplete {
                        completed_window_id,
                        window_id,
                        kind,
                        respond_by,
                    },
                    StartReason::NoWindow | StartReason::OutsideLookback(_) => Outcome::WindowStarted {
                        window_id,
                        kind,
                        respond_by,
                    },
                }
            }
            Transition::Complete { window_id, elapsed } => {
                tx.update_window(window_id, proof).await?;
                Outcome::WindowCompleted {
                    window_id,
                    kind,
                    elapsed_secs: elapsed.num_seconds(),
                }
            }
            Transition::Overwrite { window_id, .. } => {
                tx.update_window(window_id, proof).await?;
                Outcome::DuplicateWithinBudget {
                    window_id,
                    kind,
                    respond_by,
                }
            }
            Transition::ExpireAndRestart {
                stale_window_id,
                missing,
                elapsed,
            } => {
                let window_id = tx.create_window(proof).await?;
                Outcome::WindowExpiredRestarted {
                    expired_window_id: stale_window_id,
                    window_id,
                    kind,
                    missing,
                    elapsed_secs: elapsed.num_seconds(),
                    respond_by,
                }
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    /// Windows of a user created in `[from, to)`.
    pub async fn windows_between(
        &self,
        user_id: u64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AttendanceWindow>, StoreError> {
        self.store.windows_between(user_id, from, to).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::error::ValidationError;
    use crate::attendance::memory_store::MemoryAttendanceStore;
    use crate::attendance::proof::{Coordinates, Picture};
    use crate::attendance::store::WindowTx;
    use crate::attendance::window::{WindowId, WindowState};
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use std::sync::atomic::{AtomicU64, Ordering};

    const T0: i64 = 1_760_000_000;

    fn at(offset_secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(T0 + offset_secs, 0).unwrap()
    }

    fn pictures(tag: &str) -> ProofPayload {
        ProofPayload::Selfie(vec![Picture {
            file_id: tag.to_string(),
            file_unique_id: Some(format!("{tag}-u")),
            width: 1280,
            height: 960,
            file_size: Some(2048),
        }])
    }

    fn coordinates() -> ProofPayload {
        ProofPayload::Location(Coordinates {
            latitude: 26.879218,
            longitude: 81.016495,
        })
    }

    fn service_with(store: Arc<dyn AttendanceStore>) -> AttendanceService {
        AttendanceService::new(store, CorrelationPolicy::new(Duration::seconds(60)))
    }

    async fn selfie(service: &AttendanceService, user_id: u64, offset: i64) -> Outcome {
        service
            .submit_proof(user_id, ProofKind::Selfie, Some(pictures(&format!("s{offset}"))), Some(at(offset)))
            .await
            .expect("selfie should be accepted")
    }

    async fn location(service: &AttendanceService, user_id: u64, offset: i64) -> Outcome {
        service
            .submit_proof(user_id, ProofKind::Location, Some(coordinates()), Some(at(offset)))
            .await
            .expect("location should be accepted")
    }

    #[tokio::test]
    async fn selfie_then_location_within_budget_completes_one_window() {
        let store = Arc::new(MemoryAttendanceStore::new());
        let service = service_with(store.clone());

        let first = selfie(&service, 1, 0).await;
        assert!(matches!(first, Outcome::WindowStarted { kind: ProofKind::Selfie, .. }));

        let second = location(&service, 1, 60).await;
        assert_eq!(
            second,
            Outcome::WindowCompleted {
                window_id: first.window_id(),
                kind: ProofKind::Location,
                elapsed_secs: 60,
            }
        );

        let windows = store.windows_of(1).await;
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].state(), WindowState::Complete);
        assert_eq!(windows[0].selfie.as_ref().unwrap().payload, pictures("s0"));
        assert_eq!(windows[0].location.as_ref().unwrap().at, at(60));
    }

    #[tokio::test]
    async fn late_location_expires_and_restarts() {
        let store = Arc::new(MemoryAttendanceStore::new());
        let service = service_with(store.clone());

        let first = selfie(&service, 1, 0).await;
        let second = location(&service, 1, 61).await;

        match second {
            Outcome::WindowExpiredRestarted {
                expired_window_id,
                window_id,
                kind,
                missing,
                elapsed_secs,
                respond_by,
            } => {
                assert_eq!(expired_window_id, first.window_id());
                assert_ne!(window_id, expired_window_id);
                assert_eq!(kind, ProofKind::Location);
                assert_eq!(missing, ProofKind::Location);
                assert_eq!(elapsed_secs, 61);
                assert_eq!(respond_by, at(121));
            }
            other => panic!("expected expiry, got {other:?}"),
        }

        let windows = store.windows_of(1).await;
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].state(), WindowState::Open(ProofKind::Selfie));
        assert_eq!(windows[1].state(), WindowState::Open(ProofKind::Location));
    }

    #[tokio::test]
    async fn repeated_selfie_within_budget_overwrites() {
        let store = Arc::new(MemoryAttendanceStore::new());
        let service = service_with(store.clone());

        let first = selfie(&service, 1, 0).await;
        let second = selfie(&service, 1, 45).await;
        assert_eq!(
            second,
            Outcome::DuplicateWithinBudget {
                window_id: first.window_id(),
                kind: ProofKind::Selfie,
                respond_by: at(105),
            }
        );

        let windows = store.windows_of(1).await;
        assert_eq!(windows.len(), 1);
        let slot = windows[0].selfie.as_ref().unwrap();
        assert_eq!(slot.payload, pictures("s45"));
        assert_eq!(slot.at, at(45));
        assert!(windows[0].location.is_none());
    }

    #[tokio::test]
    async fn overwrite_restarts_the_budget_for_the_opposite_proof() {
        let store = Arc::new(MemoryAttendanceStore::new());
        let service = service_with(store.clone());

        selfie(&service, 1, 0).await;
        selfie(&service, 1, 50).await;
        let outcome = location(&service, 1, 100).await;
        assert!(matches!(outcome, Outcome::WindowCompleted { elapsed_secs: 50, .. }));
    }

    #[tokio::test]
    async fn complete_windows_are_never_mutated() {
        let store = Arc::new(MemoryAttendanceStore::new());
        let service = service_with(store.clone());

        selfie(&service, 1, 0).await;
        let completed = location(&service, 1, 10).await;
        let before = store.windows_of(1).await;

        let next = selfie(&service, 1, 11).await;
        assert!(matches!(
            next,
            Outcome::AlreadyComplete { completed_window_id, .. } if completed_window_id == completed.window_id()
        ));
        let after_long_pause = location(&service, 1, 5_000).await;
        assert!(matches!(after_long_pause, Outcome::WindowExpiredRestarted { .. }));

        let windows = store.windows_of(1).await;
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0], before[0]);
    }

    #[tokio::test]
    async fn users_are_correlated_independently() {
        let store = Arc::new(MemoryAttendanceStore::new());
        let service = service_with(store.clone());

        selfie(&service, 1, 0).await;
        let other = location(&service, 2, 5).await;
        assert!(matches!(other, Outcome::WindowStarted { .. }));
        let mine = location(&service, 1, 6).await;
        assert!(matches!(mine, Outcome::WindowCompleted { .. }));
    }

    #[tokio::test]
    async fn malformed_proofs_never_reach_the_store() {
        let store = Arc::new(MemoryAttendanceStore::new());
        let service = service_with(store.clone());

        let err = service
            .submit_proof(1, ProofKind::Selfie, None, Some(at(0)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SubmitError::Validation(ValidationError::MissingPayload { kind: ProofKind::Selfie })
        ));

        let err = service
            .submit_proof(1, ProofKind::Location, Some(coordinates()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::Validation(ValidationError::MissingTimestamp)));
        assert!(store.windows_of(1).await.is_empty());
    }

    /// Wraps the memory store and fails the first write of every transaction.
    struct FailingWrites(MemoryAttendanceStore);

    struct FailingTx(Box<dyn WindowTx>);

    #[async_trait]
    impl AttendanceStore for FailingWrites {
        async fn begin(&self, user_id: u64) -> Result<Box<dyn WindowTx>, StoreError> {
            Ok(Box::new(FailingTx(self.0.begin(user_id).await?)))
        }

        async fn windows_between(
            &self,
            user_id: u64,
            from: DateTime<Utc>,
            to: DateTime<Utc>,
        ) -> Result<Vec<AttendanceWindow>, StoreError> {
            self.0.windows_between(user_id, from, to).await
        }
    }

    #[async_trait]
    impl WindowTx for FailingTx {
        async fn latest_window(&mut self) -> Result<Option<AttendanceWindow>, StoreError> {
            self.0.latest_window().await
        }

        async fn create_window(&mut self, proof: &Proof) -> Result<WindowId, StoreError> {
            self.0.create_window(proof).await?;
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn update_window(&mut self, window_id: WindowId, proof: &Proof) -> Result<(), StoreError> {
            self.0.update_window(window_id, proof).await?;
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn commit(self: Box<Self>) -> Result<(), StoreError> {
            self.0.commit().await
        }
    }

    #[tokio::test]
    async fn storage_failure_leaves_committed_windows_untouched() {
        let memory = MemoryAttendanceStore::new();
        let healthy = service_with(Arc::new(memory.clone()));
        selfie(&healthy, 1, 0).await;
        let before = memory.windows_of(1).await;

        let failing = service_with(Arc::new(FailingWrites(memory.clone())));
        for result in [
            failing
                .submit_proof(1, ProofKind::Location, Some(coordinates()), Some(at(10)))
                .await,
            failing
                .submit_proof(1, ProofKind::Location, Some(coordinates()), Some(at(500)))
                .await,
        ] {
            let err = result.unwrap_err();
            assert!(matches!(err, SubmitError::Storage(StoreError::Database(_))));
        }

        assert_eq!(memory.windows_of(1).await, before);
    }

    enum PendingWrite {
        Create(AttendanceWindow),
        Update(WindowId, Proof),
    }

    /// Store without any isolation of its own: reads see the last commit and
    /// are slow enough for concurrent transactions to interleave.
    #[derive(Default)]
    struct UnisolatedStore {
        windows: Arc<std::sync::Mutex<Vec<AttendanceWindow>>>,
        last_id: Arc<AtomicU64>,
    }

    impl UnisolatedStore {
        fn windows_of(&self, user_id: u64) -> Vec<AttendanceWindow> {
            let windows = self.windows.lock().unwrap();
            windows.iter().filter(|w| w.user_id == user_id).cloned().collect()
        }
    }

    struct UnisolatedTx {
        windows: Arc<std::sync::Mutex<Vec<AttendanceWindow>>>,
        last_id: Arc<AtomicU64>,
        user_id: u64,
        writes: Vec<PendingWrite>,
    }

    #[async_trait]
    impl AttendanceStore for UnisolatedStore {
        async fn begin(&self, user_id: u64) -> Result<Box<dyn WindowTx>, StoreError> {
            Ok(Box::new(UnisolatedTx {
                windows: Arc::clone(&self.windows),
                last_id: Arc::clone(&self.last_id),
                user_id,
                writes: Vec::new(),
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
                .into_iter()
                .filter(|w| w.created_at().is_some_and(|at| at >= from && at < to))
                .collect())
        }
    }

    #[async_trait]
    impl WindowTx for UnisolatedTx {
        async fn latest_window(&mut self) -> Result<Option<AttendanceWindow>, StoreError> {
            let latest = {
                let windows = self.windows.lock().unwrap();
                windows.iter().rev().find(|w| w.user_id == self.user_id).cloned()
            };
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            Ok(latest)
        }

        async fn create_window(&mut self, proof: &Proof) -> Result<WindowId, StoreError> {
            let id = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;
            self.writes
                .push(PendingWrite::Create(AttendanceWindow::seeded(id, proof)));
            Ok(id)
        }

        async fn update_window(&mut self, window_id: WindowId, proof: &Proof) -> Result<(), StoreError> {
            self.writes.push(PendingWrite::Update(window_id, proof.clone()));
            Ok(())
        }

        async fn commit(self: Box<Self>) -> Result<(), StoreError> {
            let this = *self;
            let mut windows = this.windows.lock().unwrap();
            for write in this.writes {
                match write {
                    PendingWrite::Create(window) => windows.push(window),
                    PendingWrite::Update(window_id, proof) => {
                        let window = windows
                            .iter_mut()
                            .find(|w| w.id == window_id)
                            .ok_or(StoreError::Conflict(window_id))?;
                        window.put(&proof);
                    }
                }
            }
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_selfies_share_one_window() {
        let store = Arc::new(UnisolatedStore::default());
        let service = Arc::new(service_with(store.clone()));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let service = Arc::clone(&service);
                tokio::spawn(async move {
                    service
                        .submit_proof(9, ProofKind::Selfie, Some(pictures(&format!("c{i}"))), Some(at(i)))
                        .await
                })
            })
            .collect();

        let mut started = 0;
        for handle in handles {
            match handle.await.unwrap().unwrap() {
                Outcome::WindowStarted { .. } => started += 1,
                Outcome::DuplicateWithinBudget { .. } => {}
                other => panic!("unexpected outcome {other:?}"),
            }
        }

        assert_eq!(started, 1);
        assert_eq!(store.windows_of(9).len(), 1);
    }

    #[tokio::test]
    async fn simultaneous_selfie_and_location_pair_in_arrival_order() {
        let store = Arc::new(UnisolatedStore::default());
        let service = service_with(store.clone());

        // The selfie is polled first, so it takes the user's lock first.
        let (first, second) = tokio::join!(
            service.submit_proof(4, ProofKind::Selfie, Some(pictures("same")), Some(at(0))),
            service.submit_proof(4, ProofKind::Location, Some(coordinates()), Some(at(0))),
        );
        let first = first.unwrap();
        let second = second.unwrap();

        assert!(matches!(first, Outcome::WindowStarted { kind: ProofKind::Selfie, .. }));
        assert_eq!(
            second,
            Outcome::WindowCompleted {
                window_id: first.window_id(),
                kind: ProofKind::Location,
                elapsed_secs: 0,
            }
        );

        let windows = store.windows_of(4);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].state(), WindowState::Complete);
    }

    #[tokio::test]
    async fn report_range_is_half_open() {
        let store = Arc::new(MemoryAttendanceStore::new());
        let service = service_with(store.clone());
        selfie(&service, 1, 0).await;
        location(&service, 1, 200).await;

        let windows = service.windows_between(1, at(0), at(200)).await.unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].created_at(), Some(at(0)));
    }
}
