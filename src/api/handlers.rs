use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::Json,
    Json as RequestJson,
};
use serde::Serialize;
use std::sync::Arc;

use crate::api::response::{api_error, error_response, ApiError, ApiResponse};
use crate::logic::SelectionVersioning;
use crate::model::{
    Id, SelectionVersion, SelectionView, SubmitVersionRequest, SubmittedVersion, UserContext,
    VersionSummary,
};
use crate::store::traits::Store;

pub type AppState<S> = Arc<S>;

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// POST /lots/{lot_id}/material-selection/versions
/// Save a new version of the lot's material selection, creating the selection on first save
pub async fn submit_version<S: Store + 'static>(
    State(store): State<AppState<S>>,
    user: UserContext,
    Path(lot_id): Path<Id>,
    body: Result<RequestJson<SubmitVersionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<SubmittedVersion>>), ApiError> {
    if !user.can_submit() {
        return Err(api_error(
            StatusCode::FORBIDDEN,
            format!(
                "Role '{}' cannot save material selections",
                user.role.as_str()
            ),
        ));
    }

    let RequestJson(request) = body.map_err(|rejection| {
        log::warn!("Rejected submission body for lot {}: {}", lot_id, rejection.body_text());
        api_error(StatusCode::BAD_REQUEST, rejection.body_text())
    })?;

    let submitted = SelectionVersioning::submit_version(&*store, &user, &lot_id, request)
        .await
        .map_err(error_response)?;

    let message = format!(
        "Material selection version #{} saved",
        submitted.version.sequence_number
    );
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(message, submitted))))
}

/// GET /lots/{lot_id}/material-selection
/// Current version with history; `data` is null when nothing has been saved yet
pub async fn get_current_view<S: Store + 'static>(
    State(store): State<AppState<S>>,
    _user: UserContext,
    Path(lot_id): Path<Id>,
) -> Result<Json<ApiResponse<SelectionView>>, ApiError> {
    match SelectionVersioning::current_view(&*store, &lot_id).await {
        Ok(Some(view)) => Ok(Json(ApiResponse::ok("Material selection found", view))),
        Ok(None) => Ok(Json(ApiResponse::empty(
            "No material selection saved for this lot yet",
        ))),
        Err(e) => Err(error_response(e)),
    }
}

/// GET /lots/{lot_id}/material-selection/versions
pub async fn list_versions<S: Store + 'static>(
    State(store): State<AppState<S>>,
    _user: UserContext,
    Path(lot_id): Path<Id>,
) -> Result<Json<ApiResponse<Vec<VersionSummary>>>, ApiError> {
    let versions = SelectionVersioning::list_versions(&*store, &lot_id)
        .await
        .map_err(error_response)?;

    let message = format!("{} versions", versions.len());
    Ok(Json(ApiResponse::ok(message, versions)))
}

/// GET /material-selection/versions/{version_id}
pub async fn get_version_detail<S: Store + 'static>(
    State(store): State<AppState<S>>,
    _user: UserContext,
    Path(version_id): Path<Id>,
) -> Result<Json<ApiResponse<SelectionVersion>>, ApiError> {
    let version = SelectionVersioning::version_detail(&*store, &version_id)
        .await
        .map_err(error_response)?;

    Ok(Json(ApiResponse::ok("Material selection version found", version)))
}
