use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

use crate::attendance::proof::{Coordinates, Picture};

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct AttendanceWindowRow {
    pub id: u64,
    pub user_id: u64,
    pub selfie: Option<Json<Vec<Picture>>>,
    pub selfie_at: Option<DateTime<Utc>>,
    pub location: Option<Json<Coordinates>>,
    pub location_at: Option<DateTime<Utc>>,
}
