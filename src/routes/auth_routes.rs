use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    routing::{get, post},
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::{
        MIN_PASSWORD_LEN, generate_access_token, hash_access_token, hash_password,
        password_is_acceptable, verify_password,
    },
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::*,
    routes::json_body,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/me", get(me))
        .route("/logout", post(logout))
        // Rotate access token for the current session (invalidates old token immediately)
        .route("/refresh", post(refresh))
        .route("/change_password", post(change_password))
}

const STAFF_USER_COLUMNS: &str = "user_id, email, display_name, password_hash, role, is_active";

fn session_expiry(now: DateTime<Utc>, ttl_hours: i64) -> DateTime<Utc> {
    now + Duration::hours(ttl_hours)
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<ApiOk<LoginResponseData>>, ApiError> {
    let req = json_body(payload)?;

    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(ApiError::validation("email and password are required"));
    }
    // An address that cannot exist gets the same answer as a wrong password.
    let email = normalize_email(&req.email).ok_or_else(ApiError::invalid_credentials)?;

    let staff: StaffUserRow = sqlx::query_as::<_, StaffUserRow>(&format!(
        "SELECT {STAFF_USER_COLUMNS} FROM staff_user WHERE email = $1"
    ))
    .bind(&email)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(ApiError::invalid_credentials)?;

    if !verify_password(&req.password, &staff.password_hash) {
        tracing::info!(user_id = %staff.user_id, "login rejected: bad password");
        return Err(ApiError::invalid_credentials());
    }

    if !staff.is_active {
        return Err(ApiError::Forbidden(
            "FORBIDDEN",
            "Account is disabled".into(),
        ));
    }

    let access_token = generate_access_token();
    let token_hash = hash_access_token(&access_token);
    let expires_at = session_expiry(Utc::now(), state.session_ttl_hours);

    let session: SessionTokenRow = sqlx::query_as::<_, SessionTokenRow>(
        r#"
        INSERT INTO session_token
            (user_id, session_token_hash, device_name, expires_at)
        VALUES
            ($1, $2, $3, $4)
        RETURNING session_token_id, expires_at
        "#,
    )
    .bind(staff.user_id)
    .bind(&token_hash)
    .bind(optional_text(req.device_name))
    .bind(expires_at)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::db)?;

    tracing::info!(
        user_id = %staff.user_id,
        session_token_id = %session.session_token_id,
        "staff signed in"
    );

    Ok(Json(ApiOk::new(LoginResponseData {
        access_token,
        expires_at: session.expires_at,
        user: staff.profile(),
    })))
}

pub async fn me(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<MeResponseData>>, ApiError> {
    let staff: StaffUserRow = sqlx::query_as::<_, StaffUserRow>(&format!(
        "SELECT {STAFF_USER_COLUMNS} FROM staff_user WHERE user_id = $1 AND is_active = true"
    ))
    .bind(auth.user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(ApiError::session_expired)?;

    let session: SessionTokenRow = sqlx::query_as::<_, SessionTokenRow>(
        r#"
        SELECT session_token_id, expires_at
        FROM session_token
        WHERE session_token_id = $1
          AND user_id = $2
          AND revoked_at IS NULL
          AND expires_at > now()
        "#,
    )
    .bind(auth.session_token_id)
    .bind(auth.user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(ApiError::session_expired)?;

    Ok(Json(ApiOk::new(MeResponseData {
        user: staff.profile(),
        session: SessionInfo {
            session_token_id: session.session_token_id,
            expires_at: session.expires_at,
        },
    })))
}

pub async fn logout(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    let rows = sqlx::query(
        r#"
        UPDATE session_token
        SET revoked_at = now()
        WHERE session_token_id = $1
          AND user_id = $2
          AND revoked_at IS NULL
        "#,
    )
    .bind(auth.session_token_id)
    .bind(auth.user_id)
    .execute(&state.db)
    .await
    .map_err(ApiError::db)?;

    if rows.rows_affected() == 0 {
        return Err(ApiError::session_expired());
    }

    tracing::info!(user_id = %auth.user_id, session_token_id = %auth.session_token_id, "staff signed out");
    Ok(Json(ApiOk::new(OkData { ok: true })))
}

#[derive(Debug, Serialize)]
pub struct RefreshData {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    pub session_token_id: Uuid,
}

pub async fn refresh(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<RefreshData>>, ApiError> {
    let new_token = generate_access_token();
    let new_hash = hash_access_token(&new_token);

    let row: Option<(DateTime<Utc>,)> = sqlx::query_as(
        r#"
        UPDATE session_token
        SET session_token_hash = $1,
            last_seen_at = now()
        WHERE session_token_id = $2
          AND user_id = $3
          AND revoked_at IS NULL
          AND expires_at > now()
        RETURNING expires_at
        "#,
    )
    .bind(new_hash)
    .bind(auth.session_token_id)
    .bind(auth.user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?;

    let expires_at = row.ok_or_else(ApiError::session_expired)?.0;

    Ok(Json(ApiOk::new(RefreshData {
        access_token: new_token,
        expires_at,
        session_token_id: auth.session_token_id,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

fn validate_password_change(req: &ChangePasswordRequest) -> Result<(), ApiError> {
    if req.old_password.is_empty() || req.new_password.is_empty() {
        return Err(ApiError::validation(
            "old_password and new_password are required",
        ));
    }
    if !password_is_acceptable(&req.new_password) {
        return Err(ApiError::validation(format!(
            "new_password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if req.old_password == req.new_password {
        return Err(ApiError::validation(
            "new_password must differ from old_password",
        ));
    }
    Ok(())
}

pub async fn change_password(
    State(state): State<AppState>,
    auth: AuthContext,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    let req = json_body(payload)?;
    validate_password_change(&req)?;

    let current_hash: String = sqlx::query_scalar(
        r#"
        SELECT password_hash
        FROM staff_user
        WHERE user_id = $1
          AND is_active = true
        "#,
    )
    .bind(auth.user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(ApiError::session_expired)?;

    if !verify_password(&req.old_password, &current_hash) {
        return Err(ApiError::invalid_credentials());
    }

    let new_hash = hash_password(&req.new_password)
        .map_err(|e| ApiError::Internal(format!("password hash error: {e}")))?;

    let mut tx = state.db.begin().await.map_err(ApiError::db)?;

    sqlx::query(
        r#"
        UPDATE staff_user
        SET password_hash = $1
        WHERE user_id = $2
        "#,
    )
    .bind(new_hash)
    .bind(auth.user_id)
    .execute(&mut *tx)
    .await
    .map_err(ApiError::db)?;

    // keep the current session, revoke the rest
    let revoked = sqlx::query(
        r#"
        UPDATE session_token
        SET revoked_at = now()
        WHERE user_id = $1
          AND revoked_at IS NULL
          AND expires_at > now()
          AND session_token_id <> $2
        "#,
    )
    .bind(auth.user_id)
    .bind(auth.session_token_id)
    .execute(&mut *tx)
    .await
    .map_err(ApiError::db)?;

    tx.commit().await.map_err(ApiError::db)?;

    tracing::info!(
        user_id = %auth.user_id,
        revoked_sessions = revoked.rows_affected(),
        "password changed"
    );
    Ok(Json(ApiOk::new(OkData { ok: true })))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn change(old: &str, new: &str) -> ChangePasswordRequest {
        ChangePasswordRequest {
            old_password: old.into(),
            new_password: new.into(),
        }
    }

    #[test]
    fn session_expiry_adds_configured_hours() {
        let now = Utc.with_ymd_and_hms(2026, 1, 31, 20, 0, 0).unwrap();
        assert_eq!(
            session_expiry(now, 24),
            Utc.with_ymd_and_hms(2026, 2, 1, 20, 0, 0).unwrap()
        );
    }

    #[test]
    fn password_change_rules() {
        assert!(validate_password_change(&change("old-secret", "new-secret")).is_ok());
        assert!(validate_password_change(&change("", "new-secret")).is_err());
        assert!(validate_password_change(&change("old-secret", "short")).is_err());
        assert!(validate_password_change(&change("same-secret", "same-secret")).is_err());
    }

    #[test]
    fn login_request_device_name_is_optional() {
        let req: LoginRequest =
            serde_json::from_str(r#"{"email":"desk@clinic.test","password":"pw"}"#).unwrap();
        assert_eq!(req.device_name, None);
    }
}
