// src/routes/doctor_routes.rs

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json as SqlJson;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{optional_text, required_text, ApiOk, AppState, OkData},
    routes::{
        deserialize_double_option, json_body, path_param, patient_routes::validated_email,
        query_params,
    },
};

const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilitySlot {
    pub day: String,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct DoctorRow {
    pub id: i64,
    pub name: String,
    pub specialization: String,
    pub gender: String,
    pub location: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub availability: SqlJson<Vec<AvailabilitySlot>>,
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const DOCTOR_COLUMNS: &str = "id, name, specialization, gender, location, phone, email, \
     availability, is_available, created_at, updated_at";

#[derive(Debug, Deserialize)]
pub struct CreateDoctorRequest {
    pub name: Option<String>,
    pub specialization: Option<String>,
    pub gender: Option<String>,
    pub location: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub availability: Option<Vec<AvailabilitySlot>>,
    pub is_available: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDoctorRequest {
    pub name: Option<String>,
    pub specialization: Option<String>,
    pub gender: Option<String>,
    pub location: Option<String>,
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub email: Option<Option<String>>,
    pub availability: Option<Vec<AvailabilitySlot>>,
    pub is_available: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct DoctorListQuery {
    pub specialization: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/doctors", post(create_doctor).get(list_doctors))
        .route("/doctors/available", get(list_available_doctors))
        .route(
            "/doctors/{doctor_id}",
            get(get_doctor).patch(update_doctor).delete(delete_doctor),
        )
}

/// Canonical weekday casing, `HH:MM` times, and start strictly before end.
fn normalize_availability(slots: Vec<AvailabilitySlot>) -> Result<Vec<AvailabilitySlot>, ApiError> {
    slots
        .into_iter()
        .map(|slot| {
            let day = WEEKDAYS
                .iter()
                .find(|d| d.eq_ignore_ascii_case(slot.day.trim()))
                .ok_or_else(|| {
                    ApiError::validation(format!("availability day {:?} is not a weekday", slot.day))
                })?;

            let parse = |raw: &str, field: &str| {
                NaiveTime::parse_from_str(raw.trim(), "%H:%M").map_err(|_| {
                    ApiError::validation(format!("availability {field} must be HH:MM (got {raw:?})"))
                })
            };
            let start = parse(&slot.start_time, "start_time")?;
            let end = parse(&slot.end_time, "end_time")?;
            if start >= end {
                return Err(ApiError::validation(format!(
                    "availability on {day} must start before it ends"
                )));
            }

            Ok(AvailabilitySlot {
                day: day.to_string(),
                start_time: start.format("%H:%M").to_string(),
                end_time: end.format("%H:%M").to_string(),
            })
        })
        .collect()
}

fn doctor_not_found(id: i64) -> ApiError {
    ApiError::not_found(format!("doctor {id} was not found"))
}

async fn load_doctor(state: &AppState, doctor_id: i64) -> Result<DoctorRow, ApiError> {
    sqlx::query_as::<_, DoctorRow>(&format!(
        "SELECT {DOCTOR_COLUMNS} FROM doctor WHERE id = $1"
    ))
    .bind(doctor_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| doctor_not_found(doctor_id))
}

pub async fn create_doctor(
    State(state): State<AppState>,
    _auth: AuthContext,
    payload: Result<Json<CreateDoctorRequest>, JsonRejection>,
) -> Result<Json<ApiOk<DoctorRow>>, ApiError> {
    let req = json_body(payload)?;

    let name = required_text(req.name.as_deref(), "name")?;
    let specialization = required_text(req.specialization.as_deref(), "specialization")?;
    let gender = required_text(req.gender.as_deref(), "gender")?;
    let location = required_text(req.location.as_deref(), "location")?;
    let email = validated_email(req.email)?;
    let availability = normalize_availability(req.availability.unwrap_or_default())?;

    let row: DoctorRow = sqlx::query_as::<_, DoctorRow>(&format!(
        r#"
        INSERT INTO doctor (name, specialization, gender, location, phone, email, availability, is_available)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING {DOCTOR_COLUMNS}
        "#
    ))
    .bind(name)
    .bind(specialization)
    .bind(gender)
    .bind(location)
    .bind(optional_text(req.phone))
    .bind(email)
    .bind(SqlJson(availability))
    .bind(req.is_available.unwrap_or(true))
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::db)?;

    tracing::info!(doctor_id = row.id, "doctor added");
    Ok(Json(ApiOk::new(row)))
}

pub async fn list_doctors(
    State(state): State<AppState>,
    _auth: AuthContext,
    params: Result<Query<DoctorListQuery>, QueryRejection>,
) -> Result<Json<ApiOk<Vec<DoctorRow>>>, ApiError> {
    let q = query_params(params)?;
    let specialization = optional_text(q.specialization);

    let rows: Vec<DoctorRow> = sqlx::query_as::<_, DoctorRow>(&format!(
        r#"
        SELECT {DOCTOR_COLUMNS}
        FROM doctor
        WHERE $1::text IS NULL OR lower(specialization) = lower($1)
        ORDER BY name ASC, id ASC
        "#
    ))
    .bind(specialization)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk::new(rows)))
}

pub async fn list_available_doctors(
    State(state): State<AppState>,
    _auth: AuthContext,
) -> Result<Json<ApiOk<Vec<DoctorRow>>>, ApiError> {
    let rows: Vec<DoctorRow> = sqlx::query_as::<_, DoctorRow>(&format!(
        r#"
        SELECT {DOCTOR_COLUMNS}
        FROM doctor
        WHERE is_available = true
        ORDER BY name ASC, id ASC
        "#
    ))
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk::new(rows)))
}

pub async fn get_doctor(
    State(state): State<AppState>,
    _auth: AuthContext,
    doctor_id: Result<Path<i64>, PathRejection>,
) -> Result<Json<ApiOk<DoctorRow>>, ApiError> {
    let doctor_id = path_param(doctor_id)?;
    let row = load_doctor(&state, doctor_id).await?;
    Ok(Json(ApiOk::new(row)))
}

pub async fn update_doctor(
    State(state): State<AppState>,
    _auth: AuthContext,
    doctor_id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<UpdateDoctorRequest>, JsonRejection>,
) -> Result<Json<ApiOk<DoctorRow>>, ApiError> {
    let doctor_id = path_param(doctor_id)?;
    let req = json_body(payload)?;
    let existing = load_doctor(&state, doctor_id).await?;

    let keep_or_require = |value: Option<String>, current: String, field: &str| match value {
        Some(v) => required_text(Some(v.as_str()), field),
        None => Ok(current),
    };
    let name = keep_or_require(req.name, existing.name, "name")?;
    let specialization = keep_or_require(req.specialization, existing.specialization, "specialization")?;
    let gender = keep_or_require(req.gender, existing.gender, "gender")?;
    let location = keep_or_require(req.location, existing.location, "location")?;

    let phone = match req.phone {
        None => existing.phone,
        Some(p) => optional_text(p),
    };
    let email = match req.email {
        None => existing.email,
        Some(e) => validated_email(e)?,
    };
    let availability = match req.availability {
        None => existing.availability.0,
        Some(slots) => normalize_availability(slots)?,
    };
    let is_available = req.is_available.unwrap_or(existing.is_available);

    let updated: DoctorRow = sqlx::query_as::<_, DoctorRow>(&format!(
        r#"
        UPDATE doctor
        SET name = $1,
            specialization = $2,
            gender = $3,
            location = $4,
            phone = $5,
            email = $6,
            availability = $7,
            is_available = $8,
            updated_at = now()
        WHERE id = $9
        RETURNING {DOCTOR_COLUMNS}
        "#
    ))
    .bind(name)
    .bind(specialization)
    .bind(gender)
    .bind(location)
    .bind(phone)
    .bind(email)
    .bind(SqlJson(availability))
    .bind(is_available)
    .bind(doctor_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| doctor_not_found(doctor_id))?;

    Ok(Json(ApiOk::new(updated)))
}

pub async fn delete_doctor(
    State(state): State<AppState>,
    _auth: AuthContext,
    doctor_id: Result<Path<i64>, PathRejection>,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    let doctor_id = path_param(doctor_id)?;
    let res = sqlx::query("DELETE FROM doctor WHERE id = $1")
        .bind(doctor_id)
        .execute(&state.db)
        .await
        .map_err(|e| ApiError::from_delete(e, &format!("doctor {doctor_id}")))?;

    if res.rows_affected() == 0 {
        return Err(doctor_not_found(doctor_id));
    }

    tracing::info!(doctor_id, "doctor deleted");
    Ok(Json(ApiOk::new(OkData { ok: true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(day: &str, start: &str, end: &str) -> AvailabilitySlot {
        AvailabilitySlot {
            day: day.into(),
            start_time: start.into(),
            end_time: end.into(),
        }
    }

    #[test]
    fn availability_is_normalized() {
        let slots = normalize_availability(vec![
            slot("monday", "09:00", "17:00"),
            slot(" WEDNESDAY ", "9:30", "13:05"),
        ])
        .unwrap();

        assert_eq!(
            slots,
            vec![
                slot("Monday", "09:00", "17:00"),
                slot("Wednesday", "09:30", "13:05"),
            ]
        );
    }

    #[test]
    fn availability_rejects_bad_slots() {
        assert!(normalize_availability(vec![slot("Funday", "09:00", "10:00")]).is_err());
        assert!(normalize_availability(vec![slot("Friday", "9am", "10:00")]).is_err());
        assert!(normalize_availability(vec![slot("Friday", "10:00", "10:00")]).is_err());
        assert!(normalize_availability(vec![slot("Friday", "18:00", "08:00")]).is_err());
        assert!(normalize_availability(Vec::new()).unwrap().is_empty());
    }

    #[test]
    fn availability_serializes_as_plain_array() {
        let value = serde_json::to_value(SqlJson(vec![slot("Friday", "08:00", "16:00")])).unwrap();
        assert_eq!(
            value,
            serde_json::json!([{"day": "Friday", "start_time": "08:00", "end_time": "16:00"}])
        );
    }
}
