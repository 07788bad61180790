use crate::error::ApiError;
use crate::models::AppState;
use axum::Json;
use axum::Router;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query};
use serde::{Deserialize, Deserializer};

pub mod appointment_routes;
pub mod auth_routes;
pub mod dashboard_routes;
pub mod doctor_routes;
pub mod patient_routes;
pub mod queue_routes;
pub mod user_routes;

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1/auth", auth_routes::router())
        .nest("/api/v1/users", user_routes::router())
        .nest(
            "/api/v1",
            Router::new()
                .merge(patient_routes::router())
                .merge(doctor_routes::router())
                .merge(appointment_routes::router())
                .merge(queue_routes::router())
                .merge(dashboard_routes::router()),
        )
        .merge(dashboard_routes::health_router())
        .with_state(state)
}

/// Unwraps a JSON body, reporting malformed payloads in the API error envelope.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| ApiError::validation(e.body_text()))
}

pub(crate) fn query_params<T>(params: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    params
        .map(|Query(q)| q)
        .map_err(|e| ApiError::validation(e.body_text()))
}

/// Unwraps a path segment such as `{entry_id}`, so `/queue/abc` is a 400 in the envelope.
pub(crate) fn path_param<T>(path: Result<Path<T>, PathRejection>) -> Result<T, ApiError> {
    path
        .map(|Path(p)| p)
        .map_err(|e| ApiError::validation(e.body_text()))
}

/// Lets PATCH bodies tell "absent" (`None`) apart from explicit `null` (`Some(None)`).
/// Use with `#[serde(default, deserialize_with = "deserialize_double_option")]`.
pub(crate) fn deserialize_double_option<'de, D, T>(
    deserializer: D,
) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    // only called when the field is present, even as null
    let inner = Option::<T>::deserialize(deserializer)?;
    Ok(Some(inner))
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use sqlx::postgres::PgPoolOptions;

    use crate::models::AppState;
    use crate::queue::memory::MemoryQueueStore;
    use crate::queue::{NumberingMode, QueueService, SystemClock};

    /// State whose pool never connects; only usable for requests rejected
    /// before touching the database.
    pub fn offline_state() -> AppState {
        let store = Arc::new(MemoryQueueStore::default());
        AppState {
            db: PgPoolOptions::new()
                .connect_lazy("postgres://clinic@127.0.0.1:1/unused")
                .unwrap(),
            session_ttl_hours: 24,
            queue: Arc::new(QueueService::new(
                store.clone(),
                store,
                Arc::new(SystemClock),
                NumberingMode::Serialized,
            )),
        }
    }
}
