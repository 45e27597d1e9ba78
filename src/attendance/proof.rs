use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use super::error::ValidationError;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, EnumString, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ProofKind {
    Selfie,
    Location,
}

impl ProofKind {
    pub fn opposite(self) -> Self {
        match self {
            ProofKind::Selfie => ProofKind::Location,
            ProofKind::Location => ProofKind::Selfie,
        }
    }
}

/// One resolution of an uploaded photo, as chat clients send several sizes
/// of the same selfie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Picture {
    #[schema(example = "AgACAgUAAxkBAAIB")]
    pub file_id: String,
    #[serde(default)]
    #[schema(example = "AQADx7wxG", nullable = true)]
    pub file_unique_id: Option<String>,
    #[schema(example = 1280)]
    pub width: u32,
    #[schema(example = 960)]
    pub height: u32,
    #[serde(default)]
    #[schema(example = 183214, nullable = true)]
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Coordinates {
    #[schema(example = 26.879218)]
    pub latitude: f64,
    #[schema(example = 81.016495)]
    pub longitude: f64,
}

/// Payload of a proof. Stored as JSON: a selfie is an array of pictures, a
/// location is an object, so the untagged form round-trips unambiguously.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProofPayload {
    Selfie(Vec<Picture>),
    Location(Coordinates),
}

impl ProofPayload {
    pub fn kind(&self) -> ProofKind {
        match self {
            ProofPayload::Selfie(_) => ProofKind::Selfie,
            ProofPayload::Location(_) => ProofKind::Location,
        }
    }
}

/// A validated proof. Construct with [`Proof::new`].
#[derive(Debug, Clone, PartialEq)]
pub struct Proof {
    pub user_id: u64,
    pub kind: ProofKind,
    pub payload: ProofPayload,
    pub submitted_at: DateTime<Utc>,
}

impl Proof {
    /// Validates a raw submission. Malformed proofs never reach the correlator.
    pub fn new(
        user_id: u64,
        kind: ProofKind,
        payload: Option<ProofPayload>,
        submitted_at: Option<DateTime<Utc>>,
    ) -> Result<Self, ValidationError> {
        let payload = payload.ok_or(ValidationError::MissingPayload { kind })?;
        let submitted_at = submitted_at.ok_or(ValidationError::MissingTimestamp)?;

        if payload.kind() != kind {
            return Err(ValidationError::KindMismatch {
                kind,
                payload: payload.kind(),
            });
        }

        match &payload {
            ProofPayload::Selfie(pictures) => {
                if pictures.is_empty() {
                    return Err(ValidationError::NoPictures);
                }
                if pictures.iter().any(|p| p.file_id.trim().is_empty()) {
                    return Err(ValidationError::EmptyFileId);
                }
            }
            ProofPayload::Location(c) => {
                let valid = c.latitude.is_finite()
                    && c.longitude.is_finite()
                    && c.latitude.abs() <= 90.0
                    && c.longitude.abs() <= 180.0;
                if !valid {
                    return Err(ValidationError::InvalidCoordinates {
                        latitude: c.latitude,
                        longitude: c.longitude,
                    });
                }
            }
        }

        Ok(Self {
            user_id,
            kind,
            payload,
            submitted_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn picture(file_id: &str) -> Picture {
        Picture {
            file_id: file_id.to_string(),
            file_unique_id: None,
            width: 320,
            height: 240,
            file_size: None,
        }
    }

    #[test]
    fn accepts_well_formed_selfie() {
        let proof = Proof::new(
            7,
            ProofKind::Selfie,
            Some(ProofPayload::Selfie(vec![picture("abc")])),
            Some(Utc::now()),
        )
        .expect("selfie should validate");
        assert_eq!(proof.kind, ProofKind::Selfie);
        assert_eq!(proof.user_id, 7);
    }

    #[test]
    fn rejects_missing_payload_and_timestamp() {
        let err = Proof::new(1, ProofKind::Location, None, Some(Utc::now())).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingPayload {
                kind: ProofKind::Location
            }
        );

        let payload = ProofPayload::Location(Coordinates {
            latitude: 1.0,
            longitude: 2.0,
        });
        let err = Proof::new(1, ProofKind::Location, Some(payload), None).unwrap_err();
        assert_eq!(err, ValidationError::MissingTimestamp);
    }

    #[test]
    fn rejects_payload_of_the_other_kind() {
        let payload = ProofPayload::Selfie(vec![picture("abc")]);
        let err = Proof::new(1, ProofKind::Location, Some(payload), Some(Utc::now())).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::KindMismatch {
                kind: ProofKind::Location,
                payload: ProofKind::Selfie
            }
        ));
    }

    #[test]
    fn rejects_empty_selfies() {
        let err = Proof::new(
            1,
            ProofKind::Selfie,
            Some(ProofPayload::Selfie(vec![])),
            Some(Utc::now()),
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::NoPictures);

        let err = Proof::new(
            1,
            ProofKind::Selfie,
            Some(ProofPayload::Selfie(vec![picture("ok"), picture("  ")])),
            Some(Utc::now()),
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::EmptyFileId);
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        for (latitude, longitude) in [(91.0, 0.0), (0.0, -180.5), (f64::NAN, 0.0)] {
            let payload = ProofPayload::Location(Coordinates {
                latitude,
                longitude,
            });
            let err = Proof::new(1, ProofKind::Location, Some(payload), Some(Utc::now()));
            assert!(
                matches!(err, Err(ValidationError::InvalidCoordinates { .. })),
                "({latitude}, {longitude}) must be rejected"
            );
        }
    }

    #[test]
    fn payload_json_shape_identifies_its_kind() {
        let selfie: ProofPayload =
            serde_json::from_str(r#"[{"file_id":"a","width":1,"height":1}]"#).unwrap();
        assert_eq!(selfie.kind(), ProofKind::Selfie);

        let location: ProofPayload =
            serde_json::from_str(r#"{"latitude":26.87,"longitude":81.01}"#).unwrap();
        assert_eq!(location.kind(), ProofKind::Location);
    }
}
