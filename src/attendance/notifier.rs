use chrono::Duration;

use super::outcome::Outcome;
use super::proof::ProofKind;

/// Turns an [`Outcome`] into the messages shown to the user. Delivery is the
/// transport's job.
pub trait Notifier: Send + Sync {
    fn render(&self, outcome: &Outcome) -> Vec<String>;
}

/// Plain-text messages, matching what employees saw from the check-in bot.
#[derive(Debug, Clone)]
pub struct TextNotifier {
    delay_budget: Duration,
}

impl TextNotifier {
    pub fn new(delay_budget: Duration) -> Self {
        Self { delay_budget }
    }

    fn budget_minutes(&self) -> String {
        format!("{:.1}", self.delay_budget.num_milliseconds() as f64 / 60_000.0)
    }
}

fn title(kind: ProofKind) -> &'static str {
    match kind {
        ProofKind::Selfie => "Selfie",
        ProofKind::Location => "Location",
    }
}

impl Notifier for TextNotifier {
    fn render(&self, outcome: &Outcome) -> Vec<String> {
        match outcome {
            Outcome::WindowStarted { kind, .. } | Outcome::AlreadyComplete { kind, .. } => {
                vec![format!(
                    "{} has been added, Please share your {} for attendance",
                    title(*kind),
                    kind.opposite()
                )]
            }
            Outcome::WindowCompleted { .. } => vec!["Your attendance has been added 👍".to_string()],
            Outcome::WindowExpiredRestarted { kind, missing, .. } => vec![
                format!(
                    "Oops.. You are unable to send {} within {} minutes",
                    missing,
                    self.budget_minutes()
                ),
                format!(
                    "We have added your {}, Please share your {} within {} minutes for attendance",
                    kind,
                    kind.opposite(),
                    self.budget_minutes()
                ),
            ],
            Outcome::DuplicateWithinBudget { kind, .. } => vec![format!(
                "{} has been updated; Please send your {} within {} minutes for attendance",
                title(*kind),
                kind.opposite(),
                self.budget_minutes()
            )],
        }
    }
}
