use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{MySql, MySqlPool, Transaction};

use super::error::StoreError;
use super::proof::{Coordinates, Picture, Proof, ProofPayload};
use super::store::{AttendanceStore, WindowTx};
use super::window::{AttendanceWindow, Slot, WindowId};
use crate::model::attendance::AttendanceWindowRow;

/// Attendance store backed by the `attendance_windows` table.
///
/// `begin` locks the user's row in `users` with `SELECT ... FOR UPDATE`, so
/// correlations of one user are serialized across service instances too.
#[derive(Clone)]
pub struct MySqlAttendanceStore {
    pool: MySqlPool,
}

impl MySqlAttendanceStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

fn slot(
    id: u64,
    payload: Option<ProofPayload>,
    at: Option<DateTime<Utc>>,
) -> Result<Option<Slot>, StoreError> {
    match (payload, at) {
        (Some(payload), Some(at)) => Ok(Some(Slot { payload, at })),
        (None, None) => Ok(None),
        _ => Err(StoreError::Corrupt {
            id,
            reason: "slot payload and timestamp must be set together".to_string(),
        }),
    }
}

/// Column values written for one window. `created_at` is always derived
/// from the slots the window holds after the write.
#[derive(Debug)]
struct WindowColumns {
    selfie: Option<Json<Vec<Picture>>>,
    selfie_at: Option<DateTime<Utc>>,
    location: Option<Json<Coordinates>>,
    location_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<&AttendanceWindow> for WindowColumns {
    type Error = StoreError;

    fn try_from(window: &AttendanceWindow) -> Result<Self, Self::Error> {
        let corrupt = |reason: &str| StoreError::Corrupt {
            id: window.id,
            reason: reason.to_string(),
        };

        let (selfie, selfie_at) = match &window.selfie {
            Some(Slot {
                payload: ProofPayload::Selfie(pictures),
                at,
            }) => (Some(Json(pictures.clone())), Some(*at)),
            Some(_) => return Err(corrupt("selfie slot holds a location")),
            None => (None, None),
        };
        let (location, location_at) = match &window.location {
            Some(Slot {
                payload: ProofPayload::Location(coordinates),
                at,
            }) => (Some(Json(*coordinates)), Some(*at)),
            Some(_) => return Err(corrupt("location slot holds a selfie")),
            None => (None, None),
        };
        let created_at = window
            .created_at()
            .ok_or_else(|| corrupt("window holds no proof"))?;

        Ok(Self {
            selfie,
            selfie_at,
            location,
            location_at,
            created_at,
        })
    }
}

/// Stored window with `proof` written into the slot of its kind.
fn with_proof(row: AttendanceWindowRow, proof: &Proof) -> Result<WindowColumns, StoreError> {
    let mut window = AttendanceWindow::try_from(row)?;
    window.put(proof);
    WindowColumns::try_from(&window)
}

impl TryFrom<AttendanceWindowRow> for AttendanceWindow {
    type Error = StoreError;

    fn try_from(row: AttendanceWindowRow) -> Result<Self, Self::Error> {
        let selfie = slot(
            row.id,
            row.selfie.map(|Json(p)| ProofPayload::Selfie(p)),
            row.selfie_at,
        )?;
        let location = slot(
            row.id,
            row.location.map(|Json(c)| ProofPayload::Location(c)),
            row.location_at,
        )?;
        Ok(AttendanceWindow {
            id: row.id,
            user_id: row.user_id,
            selfie,
            location,
        })
    }
}

#[async_trait]
impl AttendanceStore for MySqlAttendanceStore {
    async fn begin(&self, user_id: u64) -> Result<Box<dyn WindowTx>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let locked = sqlx::query_scalar::<_, u64>("SELECT id FROM users WHERE id = ? FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;

        if locked.is_none() {
            return Err(StoreError::UnknownUser(user_id));
        }

        Ok(Box::new(MySqlWindowTx { tx, user_id }))
    }

    async fn windows_between(
        &self,
        user_id: u64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AttendanceWindow>, StoreError> {
        let rows = sqlx::query_as::<_, AttendanceWindowRow>(
            r#"
            SELECT id, user_id, selfie, selfie_at, location, location_at
            FROM attendance_windows
            WHERE user_id = ?
            AND created_at >= ?
            AND created_at < ?
            ORDER BY id
            "#,
        )
        .bind(user_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AttendanceWindow::try_from).collect()
    }
}

struct MySqlWindowTx {
    tx: Transaction<'static, MySql>,
    user_id: u64,
}

#[async_trait]
impl WindowTx for MySqlWindowTx {
    async fn latest_window(&mut self) -> Result<Option<AttendanceWindow>, StoreError> {
        let row = sqlx::query_as::<_, AttendanceWindowRow>(
            r#"
            SELECT id, user_id, selfie, selfie_at, location, location_at
            FROM attendance_windows
            WHERE user_id = ?
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(self.user_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(AttendanceWindow::try_from).transpose()
    }

    async fn create_window(&mut self, proof: &Proof) -> Result<WindowId, StoreError> {
        let columns = WindowColumns::try_from(&AttendanceWindow::seeded(0, proof))?;

        let result = sqlx::query(
            r#"
            INSERT INTO attendance_windows
                (user_id, selfie, selfie_at, location, location_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(self.user_id)
        .bind(columns.selfie)
        .bind(columns.selfie_at)
        .bind(columns.location)
        .bind(columns.location_at)
        .bind(columns.created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.last_insert_id())
    }

    async fn update_window(&mut self, window_id: WindowId, proof: &Proof) -> Result<(), StoreError> {
        let row = sqlx::query_as::<_, AttendanceWindowRow>(
            r#"
            SELECT id, user_id, selfie, selfie_at, location, location_at
            FROM attendance_windows
            WHERE id = ?
            AND user_id = ?
            FOR UPDATE
            "#,
        )
        .bind(window_id)
        .bind(self.user_id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or(StoreError::Conflict(window_id))?;

        let columns = with_proof(row, proof)?;

        sqlx::query(
            r#"
            UPDATE attendance_windows
            SET selfie = ?, selfie_at = ?, location = ?, location_at = ?, created_at = ?
            WHERE id = ?
            AND user_id = ?
            "#,
        )
        .bind(columns.selfie)
        .bind(columns.selfie_at)
        .bind(columns.location)
        .bind(columns.location_at)
        .bind(columns.created_at)
        .bind(window_id)
        .bind(self.user_id)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        this.tx.commit().await?;
        Ok(())
    }
}
