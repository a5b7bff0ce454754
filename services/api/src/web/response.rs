//! services/api/src/web/response.rs
//!
//! The `{success, content | message}` envelope every generation route answers with,
//! and the HTTP status each failure maps to.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use creation_core::{GenerationError, PipelineOutcome};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ApiResponse {
    pub fn content(content: String) -> Self {
        Self {
            success: true,
            content: Some(content),
            message: None,
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: false,
            content: None,
            message: Some(message.into()),
        }
    }
}

/// Expected business denials answer 200; only faults get an error status.
pub fn status_for(error: &GenerationError) -> StatusCode {
    match error {
        GenerationError::QuotaExceeded
        | GenerationError::PlanRestricted
        | GenerationError::PayloadTooLarge { .. } => StatusCode::OK,
        GenerationError::Validation(_) => StatusCode::BAD_REQUEST,
        GenerationError::Unauthorized => StatusCode::UNAUTHORIZED,
        GenerationError::Provider(_) => StatusCode::BAD_GATEWAY,
        GenerationError::Persistence(_) | GenerationError::EntitlementStore(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

pub fn rejected(error: GenerationError) -> Response {
    (status_for(&error), Json(ApiResponse::message(error.to_string()))).into_response()
}

pub fn respond(outcome: PipelineOutcome) -> Response {
    match outcome {
        PipelineOutcome::Completed { content } => {
            (StatusCode::OK, Json(ApiResponse::content(content))).into_response()
        }
        PipelineOutcome::Failed { error, .. } => rejected(error),
    }
}
