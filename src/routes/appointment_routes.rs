// src/routes/appointment_routes.rs

use std::fmt;
use std::str::FromStr;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{optional_text, ApiOk, AppState, OkData},
    routes::{deserialize_double_option, json_body, path_param, query_params},
};

/* ============================================================
   Status
   ============================================================ */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Booked,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Booked => "booked",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no_show",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "booked" => Ok(AppointmentStatus::Booked),
            "completed" => Ok(AppointmentStatus::Completed),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            "no_show" => Ok(AppointmentStatus::NoShow),
            other => Err(ApiError::validation(format!(
                "status must be one of booked, completed, cancelled, no_show (got {other:?})"
            ))),
        }
    }
}

/* ============================================================
   Rows & DTOs
   ============================================================ */

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct AppointmentRow {
    pub id: i64,
    pub patient_id: i64,
    pub patient_name: String,
    pub doctor_id: i64,
    pub doctor_name: String,
    pub appointment_date: DateTime<Utc>,
    pub status: String,
    pub notes: Option<String>,
    pub fee_cents: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const APPOINTMENT_SELECT: &str = r#"
    SELECT
      a.id,
      a.patient_id,
      p.name AS patient_name,
      a.doctor_id,
      d.name AS doctor_name,
      a.appointment_date,
      a.status,
      a.notes,
      a.fee_cents,
      a.created_at,
      a.updated_at
    FROM appointment a
    JOIN patient p ON p.id = a.patient_id
    JOIN doctor d ON d.id = a.doctor_id
"#;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAppointmentRequest {
    pub patient_id: Option<i64>,
    pub doctor_id: Option<i64>,
    pub appointment_date: Option<DateTime<Utc>>,
    pub status: Option<String>,
    pub notes: Option<String>,
    pub fee_cents: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAppointmentRequest {
    pub patient_id: Option<i64>,
    pub doctor_id: Option<i64>,
    pub appointment_date: Option<DateTime<Utc>>,
    pub status: Option<String>,
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub notes: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub fee_cents: Option<Option<i32>>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAppointmentStatusRequest {
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentListQuery {
    pub patient_id: Option<i64>,
    pub doctor_id: Option<i64>,
    pub status: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// Parsed list filters. `to` is inclusive, so the upper bound is the next midnight.
#[derive(Debug, PartialEq, Eq)]
struct AppointmentFilter {
    patient_id: Option<i64>,
    doctor_id: Option<i64>,
    status: Option<AppointmentStatus>,
    starts_at: Option<DateTime<Utc>>,
    ends_before: Option<DateTime<Utc>>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/appointments", post(create_appointment).get(list_appointments))
        .route(
            "/appointments/{appointment_id}",
            get(get_appointment)
                .patch(update_appointment)
                .delete(delete_appointment),
        )
        .route(
            "/appointments/{appointment_id}/status",
            patch(update_appointment_status),
        )
        .route("/appointments/{appointment_id}/cancel", patch(cancel_appointment))
}

/* ============================================================
   Helpers
   ============================================================ */

fn midnight_utc(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(chrono::NaiveTime::MIN).and_utc()
}

fn parse_filter(q: AppointmentListQuery) -> Result<AppointmentFilter, ApiError> {
    let status = match q.status.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(s) => Some(s.parse::<AppointmentStatus>()?),
    };

    if let (Some(from), Some(to)) = (q.from, q.to) {
        if from > to {
            return Err(ApiError::validation("from must not be after to"));
        }
    }

    let ends_before = match q.to {
        None => None,
        Some(to) => Some(midnight_utc(to.checked_add_days(Days::new(1)).ok_or_else(
            || ApiError::validation("to is out of range"),
        )?)),
    };

    Ok(AppointmentFilter {
        patient_id: q.patient_id,
        doctor_id: q.doctor_id,
        status,
        starts_at: q.from.map(midnight_utc),
        ends_before,
    })
}

fn validated_fee(fee_cents: Option<i32>) -> Result<Option<i32>, ApiError> {
    match fee_cents {
        Some(f) if f < 0 => Err(ApiError::validation("feeCents cannot be negative")),
        other => Ok(other),
    }
}

fn required_status(raw: Option<String>) -> Result<AppointmentStatus, ApiError> {
    raw.ok_or_else(|| ApiError::validation("status is required"))?
        .parse()
}

fn appointment_not_found(id: i64) -> ApiError {
    ApiError::not_found(format!("appointment {id} was not found"))
}

async fn ensure_patient(state: &AppState, patient_id: i64) -> Result<(), ApiError> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM patient WHERE id = $1)")
        .bind(patient_id)
        .fetch_one(&state.db)
        .await
        .map_err(ApiError::db)?;

    if exists {
        Ok(())
    } else {
        Err(ApiError::not_found(format!("patient {patient_id} was not found")))
    }
}

async fn ensure_doctor(state: &AppState, doctor_id: i64) -> Result<(), ApiError> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM doctor WHERE id = $1)")
        .bind(doctor_id)
        .fetch_one(&state.db)
        .await
        .map_err(ApiError::db)?;

    if exists {
        Ok(())
    } else {
        Err(ApiError::not_found(format!("doctor {doctor_id} was not found")))
    }
}

async fn load_appointment(state: &AppState, appointment_id: i64) -> Result<AppointmentRow, ApiError> {
    sqlx::query_as::<_, AppointmentRow>(&format!("{APPOINTMENT_SELECT} WHERE a.id = $1"))
        .bind(appointment_id)
        .fetch_optional(&state.db)
        .await
        .map_err(ApiError::db)?
        .ok_or_else(|| appointment_not_found(appointment_id))
}

async fn set_status(
    state: &AppState,
    appointment_id: i64,
    status: AppointmentStatus,
) -> Result<AppointmentRow, ApiError> {
    let res = sqlx::query(
        r#"
        UPDATE appointment
        SET status = $1, updated_at = now()
        WHERE id = $2
        "#,
    )
    .bind(status.as_str())
    .bind(appointment_id)
    .execute(&state.db)
    .await
    .map_err(ApiError::db)?;

    if res.rows_affected() == 0 {
        return Err(appointment_not_found(appointment_id));
    }

    tracing::info!(appointment_id, status = %status, "appointment status set");
    load_appointment(state, appointment_id).await
}

/* ============================================================
   Handlers
   ============================================================ */

pub async fn create_appointment(
    State(state): State<AppState>,
    _auth: AuthContext,
    payload: Result<Json<CreateAppointmentRequest>, JsonRejection>,
) -> Result<Json<ApiOk<AppointmentRow>>, ApiError> {
    let req = json_body(payload)?;

    let patient_id = req
        .patient_id
        .ok_or_else(|| ApiError::validation("patientId is required"))?;
    let doctor_id = req
        .doctor_id
        .ok_or_else(|| ApiError::validation("doctorId is required"))?;
    let appointment_date = req
        .appointment_date
        .ok_or_else(|| ApiError::validation("appointmentDate is required"))?;
    let status = match req.status {
        None => AppointmentStatus::Booked,
        Some(s) => s.parse()?,
    };
    let fee_cents = validated_fee(req.fee_cents)?;

    ensure_patient(&state, patient_id).await?;
    ensure_doctor(&state, doctor_id).await?;

    let appointment_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO appointment (patient_id, doctor_id, appointment_date, status, notes, fee_cents)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        "#,
    )
    .bind(patient_id)
    .bind(doctor_id)
    .bind(appointment_date)
    .bind(status.as_str())
    .bind(optional_text(req.notes))
    .bind(fee_cents)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::db)?;

    tracing::info!(appointment_id, patient_id, doctor_id, "appointment booked");
    let row = load_appointment(&state, appointment_id).await?;
    Ok(Json(ApiOk::new(row)))
}

pub async fn list_appointments(
    State(state): State<AppState>,
    _auth: AuthContext,
    params: Result<Query<AppointmentListQuery>, QueryRejection>,
) -> Result<Json<ApiOk<Vec<AppointmentRow>>>, ApiError> {
    let filter = parse_filter(query_params(params)?)?;

    let rows: Vec<AppointmentRow> = sqlx::query_as::<_, AppointmentRow>(&format!(
        r#"
        {APPOINTMENT_SELECT}
        WHERE ($1::bigint IS NULL OR a.patient_id = $1)
          AND ($2::bigint IS NULL OR a.doctor_id = $2)
          AND ($3::text IS NULL OR a.status = $3)
          AND ($4::timestamptz IS NULL OR a.appointment_date >= $4)
          AND ($5::timestamptz IS NULL OR a.appointment_date < $5)
        ORDER BY a.appointment_date ASC, a.id ASC
        "#
    ))
    .bind(filter.patient_id)
    .bind(filter.doctor_id)
    .bind(filter.status.map(AppointmentStatus::as_str))
    .bind(filter.starts_at)
    .bind(filter.ends_before)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk::new(rows)))
}

pub async fn get_appointment(
    State(state): State<AppState>,
    _auth: AuthContext,
    appointment_id: Result<Path<i64>, PathRejection>,
) -> Result<Json<ApiOk<AppointmentRow>>, ApiError> {
    let appointment_id = path_param(appointment_id)?;
    let row = load_appointment(&state, appointment_id).await?;
    Ok(Json(ApiOk::new(row)))
}

pub async fn update_appointment(
    State(state): State<AppState>,
    _auth: AuthContext,
    appointment_id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<UpdateAppointmentRequest>, JsonRejection>,
) -> Result<Json<ApiOk<AppointmentRow>>, ApiError> {
    let appointment_id = path_param(appointment_id)?;
    let req = json_body(payload)?;
    let existing = load_appointment(&state, appointment_id).await?;

    let status = match req.status {
        None => existing.status,
        Some(s) => s.parse::<AppointmentStatus>()?.as_str().to_string(),
    };
    let fee_cents = match req.fee_cents {
        None => existing.fee_cents,
        Some(f) => validated_fee(f)?,
    };
    let notes = match req.notes {
        None => existing.notes,
        Some(n) => optional_text(n),
    };

    let patient_id = match req.patient_id {
        Some(id) if id != existing.patient_id => {
            ensure_patient(&state, id).await?;
            id
        }
        _ => existing.patient_id,
    };
    let doctor_id = match req.doctor_id {
        Some(id) if id != existing.doctor_id => {
            ensure_doctor(&state, id).await?;
            id
        }
        _ => existing.doctor_id,
    };
    let appointment_date = req.appointment_date.unwrap_or(existing.appointment_date);

    let res = sqlx::query(
        r#"
        UPDATE appointment
        SET patient_id = $1,
            doctor_id = $2,
            appointment_date = $3,
            status = $4,
            notes = $5,
            fee_cents = $6,
            updated_at = now()
        WHERE id = $7
        "#,
    )
    .bind(patient_id)
    .bind(doctor_id)
    .bind(appointment_date)
    .bind(status)
    .bind(notes)
    .bind(fee_cents)
    .bind(appointment_id)
    .execute(&state.db)
    .await
    .map_err(ApiError::db)?;

    if res.rows_affected() == 0 {
        return Err(appointment_not_found(appointment_id));
    }

    let row = load_appointment(&state, appointment_id).await?;
    Ok(Json(ApiOk::new(row)))
}

pub async fn update_appointment_status(
    State(state): State<AppState>,
    _auth: AuthContext,
    appointment_id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<UpdateAppointmentStatusRequest>, JsonRejection>,
) -> Result<Json<ApiOk<AppointmentRow>>, ApiError> {
    let appointment_id = path_param(appointment_id)?;
    let status = required_status(json_body(payload)?.status)?;
    let row = set_status(&state, appointment_id, status).await?;
    Ok(Json(ApiOk::new(row)))
}

pub async fn cancel_appointment(
    State(state): State<AppState>,
    _auth: AuthContext,
    appointment_id: Result<Path<i64>, PathRejection>,
) -> Result<Json<ApiOk<AppointmentRow>>, ApiError> {
    let appointment_id = path_param(appointment_id)?;
    let row = set_status(&state, appointment_id, AppointmentStatus::Cancelled).await?;
    Ok(Json(ApiOk::new(row)))
}

pub async fn delete_appointment(
    State(state): State<AppState>,
    _auth: AuthContext,
    appointment_id: Result<Path<i64>, PathRejection>,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    let appointment_id = path_param(appointment_id)?;
    let res = sqlx::query("DELETE FROM appointment WHERE id = $1")
        .bind(appointment_id)
        .execute(&state.db)
        .await
        .map_err(ApiError::db)?;

    if res.rows_affected() == 0 {
        return Err(appointment_not_found(appointment_id));
    }

    tracing::info!(appointment_id, "appointment deleted");
    Ok(Json(ApiOk::new(OkData { ok: true })))
}
