use axum::{
    Json, Router,
    extract::{Query, State, rejection::QueryRejection},
    routing::get,
};
use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::middleware::auth_context::AuthContext;
use crate::models::{ApiOk, AppState, OkData};
use crate::routes::query_params;

#[derive(Debug, Deserialize)]
pub struct DashboardQuery {
    pub date: Option<NaiveDate>,
}

#[derive(Debug, sqlx::FromRow)]
struct DashboardCounts {
    queue_waiting: i64,
    queue_with_doctor: i64,
    appointments_today: i64,
    appointments_completed_today: i64,
    available_doctors: i64,
}

#[derive(Debug, Serialize)]
pub struct DashboardData {
    pub date: NaiveDate,
    pub queue_waiting: i64,
    pub queue_with_doctor: i64,
    pub appointments_today: i64,
    pub appointments_completed_today: i64,
    /// Percentage of the day's appointments already completed, 0 when none are booked.
    pub completion_rate: f64,
    pub available_doctors: i64,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/dashboard", get(dashboard))
}

pub fn health_router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

fn completion_rate(completed: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    let pct = completed as f64 * 100.0 / total as f64;
    (pct * 10.0).round() / 10.0
}

fn day_bounds(day: NaiveDate) -> Result<(DateTime<Utc>, DateTime<Utc>), ApiError> {
    let next = day
        .checked_add_days(Days::new(1))
        .ok_or_else(|| ApiError::validation("date is out of range"))?;
    Ok((
        day.and_time(NaiveTime::MIN).and_utc(),
        next.and_time(NaiveTime::MIN).and_utc(),
    ))
}

pub async fn dashboard(
    State(state): State<AppState>,
    _auth: AuthContext,
    params: Result<Query<DashboardQuery>, QueryRejection>,
) -> Result<Json<ApiOk<DashboardData>>, ApiError> {
    let q = query_params(params)?;
    let date = q.date.unwrap_or_else(|| Utc::now().date_naive());
    let (start, end) = day_bounds(date)?;

    let counts: DashboardCounts = sqlx::query_as::<_, DashboardCounts>(
        r#"
        SELECT
          (SELECT COUNT(*) FROM queue_entry WHERE status = 'waiting') AS queue_waiting,
          (SELECT COUNT(*) FROM queue_entry WHERE status = 'with_doctor') AS queue_with_doctor,
          (SELECT COUNT(*) FROM appointment
             WHERE appointment_date >= $1 AND appointment_date < $2) AS appointments_today,
          (SELECT COUNT(*) FROM appointment
             WHERE appointment_date >= $1 AND appointment_date < $2
               AND status = 'completed') AS appointments_completed_today,
          (SELECT COUNT(*) FROM doctor WHERE is_available = true) AS available_doctors
        "#,
    )
    .bind(start)
    .bind(end)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk::new(DashboardData {
        date,
        queue_waiting: counts.queue_waiting,
        queue_with_doctor: counts.queue_with_doctor,
        appointments_today: counts.appointments_today,
        appointments_completed_today: counts.appointments_completed_today,
        completion_rate: completion_rate(
            counts.appointments_completed_today,
            counts.appointments_today,
        ),
        available_doctors: counts.available_doctors,
    })))
}

pub async fn health() -> Json<ApiOk<OkData>> {
    Json(ApiOk::new(OkData { ok: true }))
}
