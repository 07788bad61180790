// src/routes/user_routes.rs

use axum::{
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::{hash_password, password_is_acceptable, MIN_PASSWORD_LEN},
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{normalize_email, required_text, ApiOk, AppState, StaffRole},
    routes::{json_body, path_param},
};

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct StaffPublicRow {
    pub user_id: Uuid,
    pub email: String,
    pub display_name: String,
    pub role: String,
    pub is_active: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

const STAFF_PUBLIC_COLUMNS: &str = "user_id, email, display_name, role, is_active, created_at";

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,    // default front_desk
    pub is_active: Option<bool>, // default true
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub display_name: Option<String>,
    pub role: Option<String>,
    pub is_active: Option<bool>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        // /api/v1/users
        .route("/", get(list_users).post(create_user))
        // /api/v1/users/{user_id}
        .route("/{user_id}", get(get_user).patch(update_user))
}

fn parse_role(raw: &str) -> Result<StaffRole, ApiError> {
    raw.parse::<StaffRole>().map_err(ApiError::validation)
}

/// An admin cannot lock themselves out by demoting or disabling their own account.
fn guard_self_update(
    auth: &AuthContext,
    target: Uuid,
    role: Option<StaffRole>,
    is_active: Option<bool>,
) -> Result<(), ApiError> {
    if auth.user_id != target {
        return Ok(());
    }
    if role.is_some_and(|r| r != StaffRole::Admin) || is_active == Some(false) {
        return Err(ApiError::Conflict(
            "CONFLICT",
            "You cannot demote or disable your own account".into(),
        ));
    }
    Ok(())
}

fn user_not_found(user_id: Uuid) -> ApiError {
    ApiError::not_found(format!("user {user_id} was not found"))
}

pub async fn list_users(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<Vec<StaffPublicRow>>>, ApiError> {
    auth.ensure_admin()?;

    let users: Vec<StaffPublicRow> = sqlx::query_as::<_, StaffPublicRow>(&format!(
        r#"
        SELECT {STAFF_PUBLIC_COLUMNS}
        FROM staff_user
        ORDER BY created_at DESC
        "#
    ))
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk::new(users)))
}

pub async fn get_user(
    State(state): State<AppState>,
    auth: AuthContext,
    user_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ApiOk<StaffPublicRow>>, ApiError> {
    auth.ensure_admin()?;
    let user_id = path_param(user_id)?;

    let user: StaffPublicRow = sqlx::query_as::<_, StaffPublicRow>(&format!(
        "SELECT {STAFF_PUBLIC_COLUMNS} FROM staff_user WHERE user_id = $1"
    ))
    .bind(user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| user_not_found(user_id))?;

    Ok(Json(ApiOk::new(user)))
}

pub async fn create_user(
    State(state): State<AppState>,
    auth: AuthContext,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<Json<ApiOk<StaffPublicRow>>, ApiError> {
    auth.ensure_admin()?;
    let req = json_body(payload)?;

    let email = normalize_email(&required_text(req.email.as_deref(), "email")?)
        .ok_or_else(|| ApiError::validation("email is not a valid address"))?;
    let display_name = required_text(req.display_name.as_deref(), "display_name")?;
    let password = req.password.unwrap_or_default();
    if !password_is_acceptable(&password) {
        return Err(ApiError::validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    let role = match req.role.as_deref() {
        None => StaffRole::FrontDesk,
        Some(r) => parse_role(r)?,
    };

    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM staff_user WHERE email = $1)")
            .bind(&email)
            .fetch_one(&state.db)
            .await
            .map_err(ApiError::db)?;
    if exists {
        return Err(ApiError::Conflict(
            "CONFLICT",
            format!("a staff account for {email} already exists"),
        ));
    }

    let password_hash = hash_password(&password)
        .map_err(|e| ApiError::Internal(format!("password hash error: {e}")))?;

    let user: StaffPublicRow = sqlx::query_as::<_, StaffPublicRow>(&format!(
        r#"
        INSERT INTO staff_user (email, display_name, password_hash, role, is_active)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {STAFF_PUBLIC_COLUMNS}
        "#
    ))
    .bind(&email)
    .bind(display_name)
    .bind(password_hash)
    .bind(role.as_str())
    .bind(req.is_active.unwrap_or(true))
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::db)?;

    tracing::info!(user_id = %user.user_id, role = %role, created_by = %auth.user_id, "staff account created");
    Ok(Json(ApiOk::new(user)))
}

pub async fn update_user(
    State(state): State<AppState>,
    auth: AuthContext,
    user_id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Json<ApiOk<StaffPublicRow>>, ApiError> {
    auth.ensure_admin()?;
    let user_id = path_param(user_id)?;
    let req = json_body(payload)?;

    let display_name = match req.display_name.as_deref() {
        None => None,
        Some(d) => Some(required_text(Some(d), "display_name")?),
    };
    let role = req.role.as_deref().map(parse_role).transpose()?;
    guard_self_update(&auth, user_id, role, req.is_active)?;

    let user: StaffPublicRow = sqlx::query_as::<_, StaffPublicRow>(&format!(
        r#"
        UPDATE staff_user
        SET display_name = COALESCE($1, display_name),
            role = COALESCE($2, role),
            is_active = COALESCE($3, is_active)
        WHERE user_id = $4
        RETURNING {STAFF_PUBLIC_COLUMNS}
        "#
    ))
    .bind(display_name)
    .bind(role.map(StaffRole::as_str))
    .bind(req.is_active)
    .bind(user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| user_not_found(user_id))?;

    tracing::info!(user_id = %user_id, updated_by = %auth.user_id, "staff account updated");
    Ok(Json(ApiOk::new(user)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin() -> AuthContext {
        AuthContext {
            user_id: Uuid::new_v4(),
            role: StaffRole::Admin,
            session_token_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn roles_are_validated() {
        assert_eq!(parse_role("front_desk").unwrap(), StaffRole::FrontDesk);
        assert!(matches!(
            parse_role("nurse"),
            Err(ApiError::BadRequest("VALIDATION_ERROR", _))
        ));
    }

    #[test]
    fn admin_cannot_demote_or_disable_self() {
        let me = admin();
        assert!(guard_self_update(&me, me.user_id, Some(StaffRole::FrontDesk), None).is_err());
        assert!(guard_self_update(&me, me.user_id, None, Some(false)).is_err());
        assert!(guard_self_update(&me, me.user_id, Some(StaffRole::Admin), Some(true)).is_ok());

        let other = Uuid::new_v4();
        assert!(guard_self_update(&me, other, Some(StaffRole::FrontDesk), Some(false)).is_ok());
    }

    #[test]
    fn front_desk_is_not_admin() {
        let desk = AuthContext {
            role: StaffRole::FrontDesk,
            ..admin()
        };
        assert!(matches!(
            desk.ensure_admin(),
            Err(ApiError::Forbidden("FORBIDDEN", _))
        ));
        assert!(admin().ensure_admin().is_ok());
    }
}
