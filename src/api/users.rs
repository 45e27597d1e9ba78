use crate::auth::auth::AuthUser;
use crate::auth::password::hash_password;
use crate::config::Config;
use crate::model::role::Role;
use crate::utils::user_status_cache;
use actix_web::{HttpResponse, Responder, error::ErrorInternalServerError, web};
use serde::Deserialize;
use serde_json::json;
use sqlx::MySqlPool;
use std::str::FromStr;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct CreateUser {
    #[schema(example = "EMP-1042")]
    pub employee_id: String,
    #[schema(example = "Asha Verma")]
    pub fullname: String,
    #[schema(example = "employee")]
    /// "employee" or "hr"
    pub role: String,
    #[schema(example = "otp-4821")]
    /// One-time password handed to the employee
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ResetPassword {
    #[schema(example = "otp-9310")]
    pub password: String,
}

/// Refuses proofs from deactivated or deleted users.
pub async fn ensure_active(pool: &MySqlPool, user_id: u64) -> actix_web::Result<()> {
    let active = match user_status_cache::get(user_id).await {
        Some(active) => Some(active),
        None => {
            let active = sqlx::query_scalar::<_, bool>("SELECT is_active FROM users WHERE id = ?")
                .bind(user_id)
                .fetch_optional(pool)
                .await
                .map_err(|e| {
                    error!(error = %e, user_id, "Failed to load user status");
                    ErrorInternalServerError("Internal Server Error")
                })?;
            if let Some(active) = active {
                user_status_cache::store(user_id, active).await;
            }
            active
        }
    };

    match active {
        Some(true) => Ok(()),
        Some(false) => Err(actix_web::error::ErrorForbidden(
            "Your account has been deactivated. Please contact HR for assistance.",
        )),
        None => Err(actix_web::error::ErrorUnauthorized("You are not yet logged in")),
    }
}

async fn insert_user(
    employee_id: &str,
    fullname: &str,
    role: Role,
    password: &str,
    pool: &MySqlPool,
) -> Result<(), HttpResponse> {
    let hashed = hash_password(password).map_err(|e| {
        error!(error = %e, "Failed to hash password");
        HttpResponse::InternalServerError().finish()
    })?;

    let result = sqlx::query(
        r#"
        INSERT INTO users (employee_id, fullname, password, role_id, is_active, is_pwd_expired)
        VALUES (?, ?, ?, ?, TRUE, FALSE)
        "#,
    )
    .bind(employee_id)
    .bind(fullname)
    .bind(hashed)
    .bind(role.id())
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(e) => {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.code().as_deref() == Some("23000") {
                    return Err(HttpResponse::Conflict().json(json!({
                        "error": "Employee ID already exists"
                    })));
                }
            }

            error!(error = %e, "Failed to insert user");
            Err(HttpResponse::InternalServerError().json(json!({
                "error": "Failed to create user"
            })))
        }
    }
}

/// Create a user (HR/Admin)
#[utoipa::path(
    post,
    path = "/api/users",
    request_body = CreateUser,
    responses(
        (status = 201, description = "User has been added", body = Object, example = json!({
            "message": "User has been added"
        })),
        (status = 400, description = "Invalid payload or role"),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "Employee ID already exists")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Users"
)]
#[instrument(name = "create_user", skip_all, fields(by = %auth.employee_id, employee_id = %payload.employee_id))]
pub async fn create_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateUser>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let employee_id = payload.employee_id.trim();
    let fullname = payload.fullname.trim();
    if employee_id.is_empty() || fullname.is_empty() || payload.password.is_empty() {
        return Ok(HttpResponse::BadRequest().json(json!({
            "error": "Please provide employee ID, full name, role and OTP"
        })));
    }

    let role = match Role::from_str(payload.role.trim()) {
        Ok(role @ (Role::Employee | Role::Hr)) => role,
        _ => {
            return Ok(HttpResponse::BadRequest().json(json!({
                "error": "Please provide Employee/HR as role"
            })));
        }
    };

    if let Err(resp) = insert_user(employee_id, fullname, role, &payload.password, pool.get_ref()).await {
        return Ok(resp);
    }

    info!(%role, "User created");
    Ok(HttpResponse::Created().json(json!({
        "message": "User has been added"
    })))
}

/// Reset a user's password to a new OTP (HR/Admin)
#[utoipa::path(
    put,
    path = "/api/users/{employee_id}/password",
    request_body = ResetPassword,
    params(("employee_id" = String, Path, description = "Employee ID")),
    responses(
        (status = 200, description = "New OTP has been updated"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Employee doesn't exist or deactivated")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Users"
)]
pub async fn reset_password(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
    payload: web::Json<ResetPassword>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    if payload.password.is_empty() {
        return Ok(HttpResponse::BadRequest().json(json!({
            "error": "Please provide the new OTP"
        })));
    }

    let hashed = hash_password(&payload.password).map_err(|e| {
        error!(error = %e, "Failed to hash password");
        ErrorInternalServerError("Internal Server Error")
    })?;

    let result = sqlx::query(
        r#"
        UPDATE users
        SET password = ?, is_pwd_expired = FALSE
        WHERE employee_id = ?
        AND is_active = TRUE
        "#,
    )
    .bind(hashed)
    .bind(path.trim())
    .execute(pool.get_ref())
    .await
    .map_err(|e| {
        error!(error = %e, "Password reset failed");
        ErrorInternalServerError("Internal Server Error")
    })?;

    if result.rows_affected() == 0 {
        return Ok(HttpResponse::NotFound().json(json!({
            "error": "Employee doesn't exist or deactivated"
        })));
    }

    info!(by = %auth.employee_id, employee_id = %path.trim(), "Password reset");
    Ok(HttpResponse::Ok().json(json!({
        "message": "New OTP has been updated"
    })))
}

async fn set_active(pool: &MySqlPool, employee_id: &str, active: bool) -> actix_web::Result<Option<bool>> {
    let mut tx = pool.begin().await.map_err(|e| {
        error!(error = %e, "Failed to begin transaction");
        ErrorInternalServerError("Internal Server Error")
    })?;

    let current = sqlx::query_as::<_, (u64, bool)>(
        "SELECT id, is_active FROM users WHERE employee_id = ? FOR UPDATE",
    )
    .bind(employee_id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(|e| {
        error!(error = %e, "Failed to load user");
        ErrorInternalServerError("Internal Server Error")
    })?;

    let Some((user_id, was_active)) = current else {
        return Ok(None);
    };

    if was_active != active {
        sqlx::query("UPDATE users SET is_active = ? WHERE employee_id = ?")
            .bind(active)
            .bind(employee_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to update user status");
                ErrorInternalServerError("Internal Server Error")
            })?;
    }

    tx.commit().await.map_err(|e| {
        error!(error = %e, "Failed to commit user status");
        ErrorInternalServerError("Internal Server Error")
    })?;

    user_status_cache::invalidate(user_id).await;
    Ok(Some(was_active))
}

/// Deactivate a user (HR/Admin)
#[utoipa::path(
    put,
    path = "/api/users/{employee_id}/deactivate",
    params(("employee_id" = String, Path, description = "Employee ID")),
    responses(
        (status = 200, description = "User has been deactivated"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Employee doesn't exist"),
        (status = 409, description = "User is already deactivated")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Users"
)]
pub async fn deactivate_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    let employee_id = path.trim();

    match set_active(pool.get_ref(), employee_id, false).await? {
        None => {
            warn!(by = %auth.employee_id, employee_id, "Deactivation of unknown user");
            Ok(HttpResponse::NotFound().json(json!({
                "error": "Employee doesn't exist"
            })))
        }
        Some(false) => Ok(HttpResponse::Conflict().json(json!({
            "error": "User is already deactivated."
        }))),
        Some(true) => {
            // Existing sessions cannot be refreshed anymore
            if let Err(e) = sqlx::query(
                r#"
                UPDATE refresh_tokens rt
                JOIN users u ON u.id = rt.user_id
                SET rt.revoked = TRUE
                WHERE u.employee_id = ?
                "#,
            )
            .bind(employee_id)
            .execute(pool.get_ref())
            .await
            {
                error!(error = %e, "Failed to revoke refresh tokens of deactivated user");
            }

            info!(by = %auth.employee_id, employee_id, "User deactivated");
            Ok(HttpResponse::Ok().json(json!({
                "message": "User has been deactivated"
            })))
        }
    }
}

/// Reactivate a user (HR/Admin)
#[utoipa::path(
    put,
    path = "/api/users/{employee_id}/reactivate",
    params(("employee_id" = String, Path, description = "Employee ID")),
    responses(
        (status = 200, description = "User has been reactivated"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Employee doesn't exist")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Users"
)]
pub async fn reactivate_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    let employee_id = path.trim();

    match set_active(pool.get_ref(), employee_id, true).await? {
        None => Ok(HttpResponse::NotFound().json(json!({
            "error": "Employee doesn't exist"
        }))),
        Some(_) => {
            info!(by = %auth.employee_id, employee_id, "User reactivated");
            Ok(HttpResponse::Ok().json(json!({
                "message": "User has been reactivated"
            })))
        }
    }
}

/// Creates the bootstrap HR account from `SUPER_HR_*` when it does not exist.
pub async fn ensure_super_hr(pool: &MySqlPool, config: &Config) -> anyhow::Result<()> {
    let (Some(employee_id), Some(password)) =
        (&config.super_hr_employee_id, &config.super_hr_password)
    else {
        return Ok(());
    };
    let fullname = config.super_hr_name.as_deref().unwrap_or("HR");

    let hashed = hash_password(password).map_err(|e| anyhow::anyhow!("hash failed: {e}"))?;
    let inserted = sqlx::query(
        r#"
        INSERT IGNORE INTO users (employee_id, fullname, password, role_id, is_active, is_pwd_expired)
        VALUES (?, ?, ?, ?, TRUE, FALSE)
        "#,
    )
    .bind(employee_id)
    .bind(fullname)
    .bind(hashed)
    .bind(Role::Hr.id())
    .execute(pool)
    .await?
    .rows_affected();

    if inserted > 0 {
        log::info!("Bootstrap HR account {} created", employee_id);
    }
    Ok(())
}
