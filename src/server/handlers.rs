//! Route handlers

use crate::{
    error::SegmentError,
    server::{
        dto::{
            ErrorResponse, HealthResponse, SegmentRequest, SegmentResponse, MISSING_IMAGE_MESSAGE,
        },
        state::AppState,
    },
};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

/// `POST /api/segment`
pub async fn segment(
    State(state): State<AppState>,
    payload: Result<Json<SegmentRequest>, JsonRejection>,
) -> Result<Json<SegmentResponse>, Response> {
    let Json(request) = payload.map_err(rejection_response)?;

    let Some(image_url) = request.image else {
        return Err(SegmentError::invalid_request(MISSING_IMAGE_MESSAGE).into_response());
    };

    let outcome = state
        .service
        .segment_url(&image_url)
        .await
        .map_err(IntoResponse::into_response)?;

    Ok(Json(SegmentResponse::success(
        outcome.stored.path.display().to_string(),
    )))
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        model: state.service.model_name().to_string(),
        backend: state.service.backend_type().to_string(),
    })
}

/// Bodies over the size limit keep their 413, every other rejection is a 400
fn rejection_response(rejection: JsonRejection) -> Response {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        tracing::warn!("Rejected oversized request body");
        return (
            StatusCode::PAYLOAD_TOO_LARGE,
            Json(ErrorResponse {
                error: rejection.body_text(),
            }),
        )
            .into_response();
    }
    SegmentError::invalid_request(rejection.body_text()).into_response()
}
