use crate::api::users::ensure_active;
use crate::attendance::{
    AttendanceService, AttendanceWindow, Coordinates, Notifier, Outcome, Picture, ProofKind,
    ProofPayload, TextNotifier, WindowState,
};
use crate::auth::auth::AuthUser;
use actix_web::{HttpResponse, Responder, web};
use chrono::{DateTime, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::{error, instrument};
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, ToSchema)]
pub struct SelfieProofReq {
    /// Every resolution of the uploaded selfie
    pub pictures: Option<Vec<Picture>>,
}

#[derive(Deserialize, ToSchema)]
pub struct LocationProofReq {
    #[schema(example = 26.879218)]
    pub latitude: Option<f64>,
    #[schema(example = 81.016495)]
    pub longitude: Option<f64>,
}

#[derive(Serialize)]
struct ProofResponse {
    #[serde(flatten)]
    outcome: Outcome,
    messages: Vec<String>,
}

async fn submit(
    auth: &AuthUser,
    pool: &MySqlPool,
    service: &AttendanceService,
    notifier: &TextNotifier,
    kind: ProofKind,
    payload: Option<ProofPayload>,
) -> actix_web::Result<HttpResponse> {
    ensure_active(pool, auth.user_id).await?;

    // The receipt time is the proof's timestamp; clients cannot backdate proofs.
    let outcome = service
        .submit_proof(auth.user_id, kind, payload, Some(Utc::now()))
        .await?;

    let messages = notifier.render(&outcome);
    Ok(HttpResponse::Ok().json(ProofResponse { outcome, messages }))
}

/// Submit a selfie
#[utoipa::path(
    post,
    path = "/api/attendance/selfie",
    request_body = SelfieProofReq,
    responses(
        (status = 200, description = "Selfie correlated", body = Object, example = json!({
            "outcome": "window_started",
            "window_id": 41,
            "kind": "selfie",
            "respond_by": "2026-10-16T09:01:00Z",
            "messages": ["Selfie has been added, Please share your location for attendance"]
        })),
        (status = 400, description = "Malformed selfie", body = Object, example = json!({
            "error": "Please send a photo of yourself (selfie) to mark your attendance",
            "details": "selfie has no pictures"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "User deactivated"),
        (status = 409, description = "Concurrent submission, try again"),
        (status = 503, description = "Attendance store unavailable, try again")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
#[instrument(name = "submit_selfie", skip_all, fields(user_id = auth.user_id))]
pub async fn submit_selfie(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    service: web::Data<AttendanceService>,
    notifier: web::Data<TextNotifier>,
    payload: web::Json<SelfieProofReq>,
) -> actix_web::Result<impl Responder> {
    let payload = payload.into_inner().pictures.map(ProofPayload::Selfie);
    submit(&auth, &pool, &service, &notifier, ProofKind::Selfie, payload).await
}

/// Share a location
#[utoipa::path(
    post,
    path = "/api/attendance/location",
    request_body = LocationProofReq,
    responses(
        (status = 200, description = "Location correlated", body = Object, example = json!({
            "outcome": "window_completed",
            "window_id": 41,
            "kind": "location",
            "elapsed_secs": 23,
            "messages": ["Your attendance has been added 👍"]
        })),
        (status = 400, description = "Malformed location"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "User deactivated"),
        (status = 409, description = "Concurrent submission, try again"),
        (status = 503, description = "Attendance store unavailable, try again")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
#[instrument(name = "submit_location", skip_all, fields(user_id = auth.user_id))]
pub async fn submit_location(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    service: web::Data<AttendanceService>,
    notifier: web::Data<TextNotifier>,
    payload: web::Json<LocationProofReq>,
) -> actix_web::Result<impl Responder> {
    let LocationProofReq {
        latitude,
        longitude,
    } = payload.into_inner();
    let payload = latitude
        .zip(longitude)
        .map(|(latitude, longitude)| ProofPayload::Location(Coordinates { latitude, longitude }));
    submit(&auth, &pool, &service, &notifier, ProofKind::Location, payload).await
}

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct ReportQuery {
    #[schema(example = "2026-10")]
    /// Month as YYYY-MM
    pub month: String,
    #[schema(example = 12)]
    /// HR/Admin only: whose attendance to list (defaults to the caller)
    pub user_id: Option<u64>,
}

#[derive(Debug, Serialize, PartialEq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Complete,
    /// Open and still within the delay budget
    Pending,
    Incomplete,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReportEntry {
    #[schema(example = 41)]
    pub window_id: u64,
    #[schema(example = "2026-10-16T09:00:00Z", format = "date-time", value_type = String, nullable = true)]
    pub selfie_at: Option<DateTime<Utc>>,
    #[schema(example = "2026-10-16T09:00:23Z", format = "date-time", value_type = String, nullable = true)]
    pub location_at: Option<DateTime<Utc>>,
    pub status: ReportStatus,
}

#[derive(Serialize, ToSchema)]
pub struct ReportResponse {
    #[schema(example = 12)]
    pub user_id: u64,
    #[schema(example = "2026-10")]
    pub month: String,
    #[schema(example = 20)]
    pub complete: usize,
    #[schema(example = 2)]
    pub incomplete: usize,
    pub windows: Vec<ReportEntry>,
}

/// First instant of the month and of the following one.
fn month_range(month: &str) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let first = NaiveDate::parse_from_str(&format!("{month}-01"), "%Y-%m-%d").ok()?;
    let next = first.checked_add_months(Months::new(1))?;
    Some((
        first.and_hms_opt(0, 0, 0)?.and_utc(),
        next.and_hms_opt(0, 0, 0)?.and_utc(),
    ))
}

fn report_entry(window: &AttendanceWindow, service: &AttendanceService, now: DateTime<Utc>) -> ReportEntry {
    let status = match window.state() {
        WindowState::Complete => ReportStatus::Complete,
        WindowState::Open(kind) => match window.slot(kind) {
            Some(slot) if service.policy().within_budget(now - slot.at) => ReportStatus::Pending,
            _ => ReportStatus::Incomplete,
        },
        WindowState::Fresh => ReportStatus::Incomplete,
    };
    ReportEntry {
        window_id: window.id,
        selfie_at: window.selfie.as_ref().map(|s| s.at),
        location_at: window.location.as_ref().map(|s| s.at),
        status,
    }
}

/// Monthly attendance report
#[utoipa::path(
    get,
    path = "/api/attendance/report",
    params(ReportQuery),
    responses(
        (status = 200, description = "Attendance windows of the month", body = ReportResponse),
        (status = 400, description = "Invalid month"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn report(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    query: web::Query<ReportQuery>,
) -> actix_web::Result<impl Responder> {
    let user_id = query.user_id.unwrap_or(auth.user_id);
    auth.require_access_to(user_id)?;

    let Some((from, to)) = month_range(query.month.trim()) else {
        return Ok(HttpResponse::BadRequest().json(serde_json::json!({
            "message": "Please provide the month as YYYY-MM"
        })));
    };

    let windows = service
        .windows_between(user_id, from, to)
        .await
        .map_err(|e| {
            error!(error = %e, user_id, "Failed to load attendance report");
            actix_web::error::ErrorInternalServerError("Internal Server Error")
        })?;

    let now = Utc::now();
    let entries: Vec<ReportEntry> = windows
        .iter()
        .map(|w| report_entry(w, &service, now))
        .collect();
    let complete = entries
        .iter()
        .filter(|e| e.status == ReportStatus::Complete)
        .count();
    let incomplete = entries
        .iter()
        .filter(|e| e.status == ReportStatus::Incomplete)
        .count();

    Ok(HttpResponse::Ok().json(ReportResponse {
        user_id,
        month: query.month.trim().to_string(),
        complete,
        incomplete,
        windows: entries,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::memory_store::MemoryAttendanceStore;
    use crate::attendance::CorrelationPolicy;
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    #[test]
    fn month_range_spans_the_calendar_month() {
        let (from, to) = month_range("2026-12").unwrap();
        assert_eq!(from, Utc.with_ymd_and_hms(2026, 12, 1, 0, 0, 0).unwrap());
        assert_eq!(to, Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap());
        assert!(month_range("2026-13").is_none());
        assert!(month_range("october").is_none());
    }

    #[tokio::test]
    async fn open_windows_are_pending_until_the_budget_runs_out() {
        let store = Arc::new(MemoryAttendanceStore::new());
        let service = AttendanceService::new(store, CorrelationPolicy::new(Duration::seconds(60)));
        let t0 = Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap();

        let outcome = service
            .submit_proof(
                5,
                ProofKind::Location,
                Some(ProofPayload::Location(Coordinates {
                    latitude: 1.0,
                    longitude: 1.0,
                })),
                Some(t0),
            )
            .await
            .unwrap();
        let windows = service
            .windows_between(5, t0, t0 + Duration::days(1))
            .await
            .unwrap();
        assert_eq!(windows[0].id, outcome.window_id());

        let pending = report_entry(&windows[0], &service, t0 + Duration::seconds(30));
        assert_eq!(pending.status, ReportStatus::Pending);
        let stale = report_entry(&windows[0], &service, t0 + Duration::seconds(61));
        assert_eq!(stale.status, ReportStatus::Incomplete);
        assert_eq!(stale.location_at, Some(t0));
        assert_eq!(stale.selfie_at, None);
    }
}
