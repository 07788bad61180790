// src/routes/queue_routes.rs

use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    routing::{get, patch, post},
};
use serde::Deserialize;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, OkData},
    queue::{QueueEntry, QueueError, QueueStatus},
    routes::{json_body, path_param, query_params},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/queue", get(list_queue))
        .route("/queue/add", post(add_to_queue))
        .route("/queue/current", get(current_queue))
        .route("/queue/{entry_id}", get(get_entry).delete(remove_entry))
        .route("/queue/{entry_id}/status", patch(update_status))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToQueueRequest {
    pub patient_id: Option<i64>,
    pub doctor_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub status: Option<String>,
    pub doctor_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct QueueListQuery {
    pub status: Option<String>,
}

fn parse_add_request(req: AddToQueueRequest) -> Result<(i64, Option<i64>), QueueError> {
    let patient_id = req
        .patient_id
        .ok_or_else(|| QueueError::ValidationFailed("patientId is required".into()))?;
    Ok((patient_id, req.doctor_id))
}

fn parse_status_request(req: UpdateStatusRequest) -> Result<(QueueStatus, Option<i64>), QueueError> {
    let status = req
        .status
        .ok_or_else(|| QueueError::ValidationFailed("status is required".into()))?
        .parse::<QueueStatus>()?;
    Ok((status, req.doctor_id))
}

/// `?status=` with an empty value means "no filter".
fn parse_status_filter(raw: Option<&str>) -> Result<Option<QueueStatus>, QueueError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s.parse::<QueueStatus>().map(Some),
    }
}

pub async fn add_to_queue(
    State(state): State<AppState>,
    _auth: AuthContext,
    payload: Result<Json<AddToQueueRequest>, JsonRejection>,
) -> Result<Json<ApiOk<QueueEntry>>, ApiError> {
    let (patient_id, doctor_id) = parse_add_request(json_body(payload)?)?;

    let entry = state.queue.enqueue(patient_id, doctor_id).await?;
    Ok(Json(ApiOk::new(entry)))
}

pub async fn list_queue(
    State(state): State<AppState>,
    _auth: AuthContext,
    params: Result<Query<QueueListQuery>, QueryRejection>,
) -> Result<Json<ApiOk<Vec<QueueEntry>>>, ApiError> {
    let q = query_params(params)?;
    let status = parse_status_filter(q.status.as_deref())?;

    let entries = state.queue.list(status).await?;
    Ok(Json(ApiOk::new(entries)))
}

pub async fn current_queue(
    State(state): State<AppState>,
    _auth: AuthContext,
) -> Result<Json<ApiOk<Vec<QueueEntry>>>, ApiError> {
    let entries = state.queue.current().await?;
    Ok(Json(ApiOk::new(entries)))
}

pub async fn get_entry(
    State(state): State<AppState>,
    _auth: AuthContext,
    entry_id: Result<Path<i64>, PathRejection>,
) -> Result<Json<ApiOk<QueueEntry>>, ApiError> {
    let entry_id = path_param(entry_id)?;
    let entry = state.queue.get(entry_id).await?;
    Ok(Json(ApiOk::new(entry)))
}

pub async fn update_status(
    State(state): State<AppState>,
    auth: AuthContext,
    entry_id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Json<ApiOk<QueueEntry>>, ApiError> {
    let entry_id = path_param(entry_id)?;
    let (status, doctor_id) = parse_status_request(json_body(payload)?)?;

    let entry = state.queue.transition(entry_id, status, doctor_id).await?;
    tracing::debug!(user_id = %auth.user_id, entry_id, "status updated from front desk");
    Ok(Json(ApiOk::new(entry)))
}

pub async fn remove_entry(
    State(state): State<AppState>,
    _auth: AuthContext,
    entry_id: Result<Path<i64>, PathRejection>,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    let entry_id = path_param(entry_id)?;
    state.queue.remove(entry_id).await?;
    Ok(Json(ApiOk::new(OkData { ok: true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_request_uses_camel_case_and_requires_patient() {
        let req: AddToQueueRequest =
            serde_json::from_str(r#"{"patientId": 4, "doctorId": 9}"#).unwrap();
        assert_eq!(parse_add_request(req).unwrap(), (4, Some(9)));

        let req: AddToQueueRequest = serde_json::from_str(r#"{"patientId": 4}"#).unwrap();
        assert_eq!(parse_add_request(req).unwrap(), (4, None));

        let req: AddToQueueRequest = serde_json::from_str(r#"{"doctorId": 9}"#).unwrap();
        let err = parse_add_request(req).unwrap_err();
        assert_eq!(err, QueueError::ValidationFailed("patientId is required".into()));
    }

    #[test]
    fn status_request_validates_the_status_value() {
        let req: UpdateStatusRequest =
            serde_json::from_str(r#"{"status": "with_doctor", "doctorId": 2}"#).unwrap();
        assert_eq!(
            parse_status_request(req).unwrap(),
            (QueueStatus::WithDoctor, Some(2))
        );

        let missing = parse_status_request(UpdateStatusRequest::default()).unwrap_err();
        assert!(matches!(missing, QueueError::ValidationFailed(_)));

        let req: UpdateStatusRequest = serde_json::from_str(r#"{"status": "seen"}"#).unwrap();
        assert!(matches!(
            parse_status_request(req).unwrap_err(),
            QueueError::ValidationFailed(_)
        ));
    }

    #[test]
    fn empty_status_filter_lists_everything() {
        assert_eq!(parse_status_filter(None).unwrap(), None);
        assert_eq!(parse_status_filter(Some("")).unwrap(), None);
        assert_eq!(
            parse_status_filter(Some("waiting")).unwrap(),
            Some(QueueStatus::Waiting)
        );
        assert!(parse_status_filter(Some("done")).is_err());
    }
}
