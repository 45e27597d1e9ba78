//! Transition table of the selfie/location correlator.
//!
//! [`decide`] is a pure function over the user's latest window and the
//! incoming proof. It never touches storage; the service applies the returned
//! [`Transition`] inside a store transaction.

use chrono::Duration;

use super::proof::{Proof, ProofKind};
use super::window::{AttendanceWindow, WindowId, WindowState};

/// Default time allowed between the two proofs of one window.
pub const DEFAULT_DELAY_BUDGET_SECS: i64 = 60;

/// Windows created longer ago than this are not considered "latest".
pub const LATEST_WINDOW_LOOKBACK_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelationPolicy {
    pub delay_budget: Duration,
    pub lookback: Duration,
}

impl CorrelationPolicy {
    pub fn new(delay_budget: Duration) -> Self {
        Self {
            delay_budget,
            lookback: Duration::hours(LATEST_WINDOW_LOOKBACK_HOURS),
        }
    }

    /// Inclusive boundary; negative elapsed (skew, reordering) is within budget.
    pub fn within_budget(&self, elapsed: Duration) -> bool {
        elapsed <= self.delay_budget
    }
}

impl Default for CorrelationPolicy {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_DELAY_BUDGET_SECS))
    }
}

/// Why a proof opens a new window without expiring anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartReason {
    NoWindow,
    /// The latest window is older than the lookback.
    OutsideLookback(WindowId),
    /// The latest window already holds both proofs.
    PreviousComplete(WindowId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Create a new window holding only the incoming proof.
    Start(StartReason),
    /// Fill the empty slot of an open window.
    Complete { window_id: WindowId, elapsed: Duration },
    /// Replace the already-filled slot of an open window.
    Overwrite { window_id: WindowId, elapsed: Duration },
    /// Leave the open window incomplete and create a new one for the proof.
    ExpireAndRestart {
        stale_window_id: WindowId,
        missing: ProofKind,
        elapsed: Duration,
    },
}

pub fn decide(
    latest: Option<&AttendanceWindow>,
    proof: &Proof,
    policy: &CorrelationPolicy,
) -> Transition {
    let Some(window) = latest else {
        return Transition::Start(StartReason::NoWindow);
    };

    if let Some(created_at) = window.created_at() {
        if proof.submitted_at - created_at > policy.lookback {
            return Transition::Start(StartReason::OutsideLookback(window.id));
        }
    }

    let filled = match window.state() {
        WindowState::Complete => return Transition::Start(StartReason::PreviousComplete(window.id)),
        WindowState::Fresh => return Transition::Start(StartReason::NoWindow),
        WindowState::Open(filled) => filled,
    };

    // Both branches measure from the single filled slot.
    let elapsed = match window.slot(filled) {
        Some(slot) => proof.submitted_at - slot.at,
        None => return Transition::Start(StartReason::NoWindow),
    };

    if !policy.within_budget(elapsed) {
        return Transition::ExpireAndRestart {
            stale_window_id: window.id,
            missing: filled.opposite(),
            elapsed,
        };
    }

    if proof.kind == filled {
        Transition::Overwrite {
            window_id: window.id,
            elapsed,
        }
    } else {
        Transition::Complete {
            window_id: window.id,
            elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::proof::{Coordinates, Picture, ProofPayload};
    use chrono::{DateTime, TimeZone, Utc};

    const T0: i64 = 1_760_000_000;

    fn at(offset_secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(T0 + offset_secs, 0).unwrap()
    }

    fn selfie(offset_secs: i64) -> Proof {
        Proof {
            user_id: 1,
            kind: ProofKind::Selfie,
            payload: ProofPayload::Selfie(vec![Picture {
                file_id: format!("pic-{offset_secs}"),
                file_unique_id: None,
                width: 640,
                height: 480,
                file_size: Some(1024),
            }]),
            submitted_at: at(offset_secs),
        }
    }

    fn location(offset_secs: i64) -> Proof {
        Proof {
            user_id: 1,
            kind: ProofKind::Location,
            payload: ProofPayload::Location(Coordinates {
                latitude: 26.879218,
                longitude: 81.016495,
            }),
            submitted_at: at(offset_secs),
        }
    }

    fn policy() -> CorrelationPolicy {
        CorrelationPolicy::default()
    }

    #[test]
    fn first_proof_starts_a_window() {
        assert_eq!(
            decide(None, &selfie(0), &policy()),
            Transition::Start(StartReason::NoWindow)
        );
    }

    #[test]
    fn opposite_proof_at_exact_budget_completes() {
        let window = AttendanceWindow::seeded(5, &selfie(0));
        assert_eq!(
            decide(Some(&window), &location(60), &policy()),
            Transition::Complete {
                window_id: 5,
                elapsed: Duration::seconds(60)
            }
        );
    }

    #[test]
    fn opposite_proof_past_budget_expires_and_restarts() {
        let window = AttendanceWindow::seeded(5, &selfie(0));
        assert_eq!(
            decide(Some(&window), &location(61), &policy()),
            Transition::ExpireAndRestart {
                stale_window_id: 5,
                missing: ProofKind::Location,
                elapsed: Duration::seconds(61)
            }
        );
    }

    #[test]
    fn same_kind_within_budget_overwrites() {
        let window = AttendanceWindow::seeded(5, &selfie(0));
        assert_eq!(
            decide(Some(&window), &selfie(60), &policy()),
            Transition::Overwrite {
                window_id: 5,
                elapsed: Duration::seconds(60)
            }
        );
    }

    #[test]
    fn same_kind_past_budget_expires_with_opposite_missing() {
        let window = AttendanceWindow::seeded(5, &location(0));
        assert_eq!(
            decide(Some(&window), &location(90), &policy()),
            Transition::ExpireAndRestart {
                stale_window_id: 5,
                missing: ProofKind::Selfie,
                elapsed: Duration::seconds(90)
            }
        );
    }

    #[test]
    fn complete_window_is_never_reopened() {
        let mut window = AttendanceWindow::seeded(5, &selfie(0));
        window.put(&location(10));
        for proof in [selfie(11), location(11), selfie(10_000)] {
            assert_eq!(
                decide(Some(&window), &proof, &policy()),
                Transition::Start(StartReason::PreviousComplete(5))
            );
        }
    }

    #[test]
    fn negative_elapsed_is_within_budget() {
        let window = AttendanceWindow::seeded(5, &selfie(30));
        assert_eq!(
            decide(Some(&window), &location(0), &policy()),
            Transition::Complete {
                window_id: 5,
                elapsed: Duration::seconds(-30)
            }
        );
    }

    #[test]
    fn windows_older_than_lookback_are_ignored() {
        let window = AttendanceWindow::seeded(5, &selfie(0));
        let next_day = 24 * 3600 + 1;
        assert_eq!(
            decide(Some(&window), &location(next_day), &policy()),
            Transition::Start(StartReason::OutsideLookback(5))
        );
    }

    #[test]
    fn budget_follows_policy() {
        let tight = CorrelationPolicy::new(Duration::seconds(5));
        let window = AttendanceWindow::seeded(5, &selfie(0));
        assert!(matches!(
            decide(Some(&window), &location(6), &tight),
            Transition::ExpireAndRestart { .. }
        ));
        assert!(matches!(
            decide(Some(&window), &location(5), &tight),
            Transition::Complete { .. }
        ));
    }
}
