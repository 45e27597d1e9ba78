use crate::api::attendance::{
    LocationProofReq, ReportEntry, ReportQuery, ReportResponse, ReportStatus, SelfieProofReq,
};
use crate::api::users::{CreateUser, ResetPassword};
use crate::attendance::{Coordinates, Picture, ProofKind};
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Attendance API",
        version = "1.0.0",
        description = r#"
## Selfie + Location Attendance

Employees check in by sending two proofs: a **selfie** and their **location**.
The two may arrive in any order; when the second one lands within the delay
budget (60 seconds by default) of the first, one attendance record is complete.

### 🔹 Outcomes of a proof
- `window_started` — first proof of a new check-in
- `window_completed` — the other proof arrived in time
- `duplicate_within_budget` — same proof sent again; the newer one replaces it
- `window_expired_restarted` — the other proof came too late; the old check-in
  stays incomplete and a new one starts with this proof
- `already_complete` — the last check-in was complete; a new one starts

### 🔐 Security
Endpoints under `/api` require a **JWT Bearer** access token from `/auth/login`.
User management is restricted to **HR** and **Admin**.
"#,
    ),
    paths(
        crate::api::attendance::submit_selfie,
        crate::api::attendance::submit_location,
        crate::api::attendance::report,

        crate::api::users::create_user,
        crate::api::users::reset_password,
        crate::api::users::deactivate_user,
        crate::api::users::reactivate_user
    ),
    components(
        schemas(
            SelfieProofReq,
            LocationProofReq,
            Picture,
            Coordinates,
            ProofKind,
            ReportQuery,
            ReportStatus,
            ReportEntry,
            ReportResponse,
            CreateUser,
            ResetPassword
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Attendance", description = "Selfie/location check-in APIs"),
        (name = "Users", description = "HR user management APIs"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}
