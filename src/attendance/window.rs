use chrono::{DateTime, Utc};

use super::proof::{Proof, ProofKind, ProofPayload};

pub type WindowId = u64;

/// A proof that landed inside a window.
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    pub payload: ProofPayload,
    pub at: DateTime<Utc>,
}

impl From<&Proof> for Slot {
    fn from(proof: &Proof) -> Self {
        Self {
            payload: proof.payload.clone(),
            at: proof.submitted_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    /// Neither slot set. Only exists transiently while a window is created.
    Fresh,
    /// Exactly one slot set; carries the kind that is filled.
    Open(ProofKind),
    Complete,
}

/// One check-in attempt pairing a selfie with a location.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceWindow {
    pub id: WindowId,
    pub user_id: u64,
    pub selfie: Option<Slot>,
    pub location: Option<Slot>,
}

impl AttendanceWindow {
    /// A window seeded with its first proof.
    pub fn seeded(id: WindowId, proof: &Proof) -> Self {
        let mut window = Self {
            id,
            user_id: proof.user_id,
            selfie: None,
            location: None,
        };
        window.put(proof);
        window
    }

    pub fn slot(&self, kind: ProofKind) -> Option<&Slot> {
        match kind {
            ProofKind::Selfie => self.selfie.as_ref(),
            ProofKind::Location => self.location.as_ref(),
        }
    }

    /// Writes the proof into the slot of its kind, replacing what was there.
    pub fn put(&mut self, proof: &Proof) {
        let slot = Some(Slot::from(proof));
        match proof.kind {
            ProofKind::Selfie => self.selfie = slot,
            ProofKind::Location => self.location = slot,
        }
    }

    pub fn state(&self) -> WindowState {
        match (&self.selfie, &self.location) {
            (None, None) => WindowState::Fresh,
            (Some(_), None) => WindowState::Open(ProofKind::Selfie),
            (None, Some(_)) => WindowState::Open(ProofKind::Location),
            (Some(_), Some(_)) => WindowState::Complete,
        }
    }

    /// Earliest of the two slot timestamps.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        match (&self.selfie, &self.location) {
            (Some(s), Some(l)) => Some(s.at.min(l.at)),
            (Some(s), None) => Some(s.at),
            (None, Some(l)) => Some(l.at),
            (None, None) => None,
        }
    }
}
