use crate::{
    api::{attendance, users},
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

/// Per-route limiter allowing `requests_per_min` with an equal burst.
fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    let requests_per_min = requests_per_min.max(1);
    let cfg = GovernorConfigBuilder::default()
        .milliseconds_per_request((60_000 / requests_per_min as u64).max(1))
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .expect("rate limit settings must be non-zero");
    Governor::new(&cfg)
}

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    let login_limiter = Arc::new(build_limiter(config.rate_login_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));
    let proof_limiter = Arc::new(build_limiter(config.rate_proof_per_min));

    // Public routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/login")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::logout)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(protected_limiter) // rate limiting
            .service(
                web::scope("/attendance")
                    // /attendance/selfie
                    .service(
                        web::resource("/selfie")
                            .wrap(proof_limiter.clone())
                            .route(web::post().to(attendance::submit_selfie)),
                    )
                    // /attendance/location
                    .service(
                        web::resource("/location")
                            .wrap(proof_limiter.clone())
                            .route(web::post().to(attendance::submit_location)),
                    )
                    // /attendance/report?month=YYYY-MM
                    .service(web::resource("/report").route(web::get().to(attendance::report))),
            )
            .service(
                web::scope("/users")
                    // /users
                    .service(web::resource("").route(web::post().to(users::create_user)))
                    // /users/{employee_id}/password
                    .service(
                        web::resource("/{employee_id}/password")
                            .route(web::put().to(users::reset_password)),
                    )
                    // /users/{employee_id}/deactivate
                    .service(
                        web::resource("/{employee_id}/deactivate")
                            .route(web::put().to(users::deactivate_user)),
                    )
                    // /users/{employee_id}/reactivate
                    .service(
                        web::resource("/{employee_id}/reactivate")
                            .route(web::put().to(users::reactivate_user)),
                    ),
            ),
    );
}

// LOGIN (employee ID + OTP/password)
//  ├─ access_token (15 min)
//  └─ refresh_token (7 days)

// PROOF
//  └─ POST /api/attendance/{selfie|location} with Authorization: Bearer access_token
//       └─ outcome + messages for the employee
