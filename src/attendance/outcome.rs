use chrono::{DateTime, Utc};
use serde::Serialize;

use super::proof::ProofKind;
use super::window::WindowId;

/// Result of correlating one proof, consumed by a [`Notifier`](super::notifier::Notifier).
///
/// `respond_by` is the deadline for the opposite proof on windows left open.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    WindowStarted {
        window_id: WindowId,
        kind: ProofKind,
        respond_by: DateTime<Utc>,
    },
    WindowCompleted {
        window_id: WindowId,
        kind: ProofKind,
        elapsed_secs: i64,
    },
    WindowExpiredRestarted {
        expired_window_id: WindowId,
        window_id: WindowId,
        kind: ProofKind,
        /// The proof the expired window never received.
        missing: ProofKind,
        elapsed_secs: i64,
        respond_by: DateTime<Utc>,
    },
    DuplicateWithinBudget {
        window_id: WindowId,
        kind: ProofKind,
        respond_by: DateTime<Utc>,
    },
    /// The latest window was complete; a new window was started.
    AlreadyComplete {
        completed_window_id: WindowId,
        window_id: WindowId,
        kind: ProofKind,
        respond_by: DateTime<Utc>,
    },
}

impl Outcome {
    /// Window that now holds the submitted proof.
    pub fn window_id(&self) -> WindowId {
        match self {
            Outcome::WindowStarted { window_id, .. }
            | Outcome::WindowCompleted { window_id, .. }
            | Outcome::WindowExpiredRestarted { window_id, .. }
            | Outcome::DuplicateWithinBudget { window_id, .. }
            | Outcome::AlreadyComplete { window_id, .. } => *window_id,
        }
    }

    /// True when the proof created a new window.
    pub fn started_window(&self) -> bool {
        matches!(
            self,
            Outcome::WindowStarted { .. }
                | Outcome::WindowExpiredRestarted { .. }
                | Outcome::AlreadyComplete { .. }
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::WindowStarted { .. } => "window_started",
            Outcome::WindowCompleted { .. } => "window_completed",
            Outcome::WindowExpiredRestarted { .. } => "window_expired_restarted",
            Outcome::DuplicateWithinBudget { .. } => "duplicate_within_budget",
            Outcome::AlreadyComplete { .. } => "already_complete",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn serializes_with_outcome_tag() {
        let outcome = Outcome::WindowExpiredRestarted {
            expired_window_id: 3,
            window_id: 4,
            kind: ProofKind::Location,
            missing: ProofKind::Location,
            elapsed_secs: 61,
            respond_by: Utc.timestamp_opt(1_760_000_121, 0).unwrap(),
        };
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["outcome"], "window_expired_restarted");
        assert_eq!(value["outcome"], outcome.label());
        assert_eq!(value["expired_window_id"], 3);
        assert_eq!(value["missing"], "location");
        assert_eq!(outcome.window_id(), 4);
        assert!(outcome.started_window());
    }
}
