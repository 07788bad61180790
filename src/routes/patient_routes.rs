// src/routes/patient_routes.rs

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{normalize_email, optional_text, required_text, ApiOk, AppState, OkData},
    routes::{deserialize_double_option, json_body, path_param, query_params},
};

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct PatientRow {
    pub id: i64,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub address: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const PATIENT_COLUMNS: &str =
    "id, name, phone, email, address, date_of_birth, gender, created_at, updated_at";

#[derive(Debug, Deserialize)]
pub struct CreatePatientRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePatientRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub email: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub address: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub date_of_birth: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub gender: Option<Option<String>>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/patients", post(create_patient).get(list_patients))
        .route(
            "/patients/{patient_id}",
            get(get_patient).patch(update_patient).delete(delete_patient),
        )
}

pub(crate) fn validated_email(raw: Option<String>) -> Result<Option<String>, ApiError> {
    match optional_text(raw) {
        None => Ok(None),
        Some(e) => normalize_email(&e)
            .map(Some)
            .ok_or_else(|| ApiError::validation("email is not a valid address")),
    }
}

fn validated_birth_date(dob: Option<NaiveDate>) -> Result<Option<NaiveDate>, ApiError> {
    match dob {
        Some(d) if d > Utc::now().date_naive() => {
            Err(ApiError::validation("date_of_birth cannot be in the future"))
        }
        other => Ok(other),
    }
}

fn patient_not_found(id: i64) -> ApiError {
    ApiError::not_found(format!("patient {id} was not found"))
}

async fn load_patient(state: &AppState, patient_id: i64) -> Result<PatientRow, ApiError> {
    sqlx::query_as::<_, PatientRow>(&format!(
        "SELECT {PATIENT_COLUMNS} FROM patient WHERE id = $1"
    ))
    .bind(patient_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| patient_not_found(patient_id))
}

pub async fn create_patient(
    State(state): State<AppState>,
    _auth: AuthContext,
    payload: Result<Json<CreatePatientRequest>, JsonRejection>,
) -> Result<Json<ApiOk<PatientRow>>, ApiError> {
    let req = json_body(payload)?;

    let name = required_text(req.name.as_deref(), "name")?;
    let phone = required_text(req.phone.as_deref(), "phone")?;
    let email = validated_email(req.email)?;
    let date_of_birth = validated_birth_date(req.date_of_birth)?;

    let row: PatientRow = sqlx::query_as::<_, PatientRow>(&format!(
        r#"
        INSERT INTO patient (name, phone, email, address, date_of_birth, gender)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {PATIENT_COLUMNS}
        "#
    ))
    .bind(name)
    .bind(phone)
    .bind(email)
    .bind(optional_text(req.address))
    .bind(date_of_birth)
    .bind(optional_text(req.gender))
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::db)?;

    tracing::info!(patient_id = row.id, "patient registered");
    Ok(Json(ApiOk::new(row)))
}

pub async fn get_patient(
    State(state): State<AppState>,
    _auth: AuthContext,
    patient_id: Result<Path<i64>, PathRejection>,
) -> Result<Json<ApiOk<PatientRow>>, ApiError> {
    let patient_id = path_param(patient_id)?;
    let row = load_patient(&state, patient_id).await?;
    Ok(Json(ApiOk::new(row)))
}

pub async fn list_patients(
    State(state): State<AppState>,
    _auth: AuthContext,
    params: Result<Query<SearchQuery>, QueryRejection>,
) -> Result<Json<ApiOk<Vec<PatientRow>>>, ApiError> {
    let q = query_params(params)?;
    let like = optional_text(q.query).map(|s| format!("%{s}%"));

    let rows: Vec<PatientRow> = sqlx::query_as::<_, PatientRow>(&format!(
        r#"
        SELECT {PATIENT_COLUMNS}
        FROM patient
        WHERE $1::text IS NULL
           OR name ILIKE $1
           OR phone ILIKE $1
           OR email ILIKE $1
        ORDER BY name ASC, id ASC
        "#
    ))
    .bind(like)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk::new(rows)))
}

pub async fn update_patient(
    State(state): State<AppState>,
    _auth: AuthContext,
    patient_id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<UpdatePatientRequest>, JsonRejection>,
) -> Result<Json<ApiOk<PatientRow>>, ApiError> {
    let patient_id = path_param(patient_id)?;
    let req = json_body(payload)?;
    let existing = load_patient(&state, patient_id).await?;

    let name = match req.name {
        Some(n) => required_text(Some(n.as_str()), "name")?,
        None => existing.name,
    };
    let phone = match req.phone {
        Some(p) => required_text(Some(p.as_str()), "phone")?,
        None => existing.phone,
    };
    let email = match req.email {
        None => existing.email,
        Some(e) => validated_email(e)?,
    };
    let address = match req.address {
        None => existing.address,
        Some(a) => optional_text(a),
    };
    let date_of_birth = match req.date_of_birth {
        None => existing.date_of_birth,
        Some(d) => validated_birth_date(d)?,
    };
    let gender = match req.gender {
        None => existing.gender,
        Some(g) => optional_text(g),
    };

    let updated: PatientRow = sqlx::query_as::<_, PatientRow>(&format!(
        r#"
        UPDATE patient
        SET name = $1,
            phone = $2,
            email = $3,
            address = $4,
            date_of_birth = $5,
            gender = $6,
            updated_at = now()
        WHERE id = $7
        RETURNING {PATIENT_COLUMNS}
        "#
    ))
    .bind(name)
    .bind(phone)
    .bind(email)
    .bind(address)
    .bind(date_of_birth)
    .bind(gender)
    .bind(patient_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| patient_not_found(patient_id))?;

    Ok(Json(ApiOk::new(updated)))
}

pub async fn delete_patient(
    State(state): State<AppState>,
    _auth: AuthContext,
    patient_id: Result<Path<i64>, PathRejection>,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    let patient_id = path_param(patient_id)?;
    let res = sqlx::query("DELETE FROM patient WHERE id = $1")
        .bind(patient_id)
        .execute(&state.db)
        .await
        .map_err(|e| ApiError::from_delete(e, &format!("patient {patient_id}")))?;

    if res.rows_affected() == 0 {
        return Err(patient_not_found(patient_id));
    }

    tracing::info!(patient_id, "patient deleted");
    Ok(Json(ApiOk::new(OkData { ok: true })))
}
