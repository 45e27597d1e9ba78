//! Selfie/location correlation core.
//!
//! Every proof a user submits is matched against the user's latest attendance
//! window: it completes it, overwrites its pending slot, expires it and starts
//! over, or starts a new window. See [`correlator::decide`] for the table.

pub mod correlator;
pub mod error;
pub mod locks;
pub mod memory_store;
pub mod mysql_store;
pub mod notifier;
pub mod outcome;
pub mod proof;
pub mod service;
pub mod store;
pub mod window;

pub use correlator::CorrelationPolicy;
pub use notifier::{Notifier, TextNotifier};
pub use outcome::Outcome;
pub use proof::{Coordinates, Picture, ProofKind, ProofPayload};
pub use service::AttendanceService;
pub use window::{AttendanceWindow, WindowState};
