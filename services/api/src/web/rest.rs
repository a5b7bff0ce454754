//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the generation endpoints and the master
//! definition for the OpenAPI specification.
//!
//! Handlers only translate HTTP into a `GenerationRequest`; entitlement, quota,
//! dispatch, recording and accounting all happen in the core pipeline.

use crate::web::response::{rejected, respond, ApiResponse};
use crate::web::state::AppState;
use crate::web::upload::{spool_form, SpooledForm, UploadError};
use crate::web::MAX_BODY_BYTES;
use axum::{
    extract::{
        multipart::MultipartRejection, rejection::JsonRejection, Extension, Multipart, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use creation_core::{CallerId, GenerationError, GenerationRequest};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;
use utoipa::{OpenApi, ToSchema};

const DEFAULT_ARTICLE_LENGTH: u32 = 500;
const IMAGE_LIMIT: (&str, u64) = ("Image", MAX_BODY_BYTES as u64);

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        generate_article_handler,
        generate_blog_title_handler,
        generate_image_handler,
        remove_image_background_handler,
        remove_image_object_handler,
        resume_review_handler,
    ),
    components(
        schemas(ArticleRequest, BlogTitleRequest, ImageRequest, ApiResponse, HealthResponse)
    ),
    tags(
        (name = "Creation Studio API", description = "Quota-gated text and image generation.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Payload Structs
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct ArticleRequest {
    pub prompt: String,
    /// Output budget in tokens.
    pub length: Option<u32>,
}

#[derive(Deserialize, ToSchema)]
pub struct BlogTitleRequest {
    pub prompt: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ImageRequest {
    pub prompt: String,
    /// Whether the image appears in the public community feed.
    #[serde(default)]
    pub publish: Option<bool>,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    status: &'static str,
}

fn malformed_body(rejection: impl std::fmt::Display) -> Response {
    rejected(GenerationError::Validation(rejection.to_string()))
}

//=========================================================================================
// Handlers
//=========================================================================================

/// Liveness check.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

/// Generate an article of roughly `length` tokens.
#[utoipa::path(
    post,
    path = "/api/ai/generate-article",
    request_body = ArticleRequest,
    responses(
        (status = 200, description = "Generated text, or a quota denial", body = ApiResponse),
        (status = 400, description = "Invalid request", body = ApiResponse),
        (status = 401, description = "Not signed in", body = ApiResponse),
        (status = 502, description = "Provider failure", body = ApiResponse)
    )
)]
pub async fn generate_article_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerId>,
    payload: Result<Json<ArticleRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return malformed_body(rejection),
    };
    let request = GenerationRequest::Article {
        prompt: req.prompt,
        length: req.length.unwrap_or(DEFAULT_ARTICLE_LENGTH),
    };
    respond(state.pipeline.run(&caller, request).await)
}

/// Generate blog title suggestions.
#[utoipa::path(
    post,
    path = "/api/ai/generate-blog-title",
    request_body = BlogTitleRequest,
    responses(
        (status = 200, description = "Generated text, or a quota denial", body = ApiResponse),
        (status = 400, description = "Invalid request", body = ApiResponse),
        (status = 401, description = "Not signed in", body = ApiResponse)
    )
)]
pub async fn generate_blog_title_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerId>,
    payload: Result<Json<BlogTitleRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return malformed_body(rejection),
    };
    let request = GenerationRequest::BlogTitle { prompt: req.prompt };
    respond(state.pipeline.run(&caller, request).await)
}

/// Generate an image from a prompt. Premium only.
#[utoipa::path(
    post,
    path = "/api/ai/generate-image",
    request_body = ImageRequest,
    responses(
        (status = 200, description = "Hosted image URL, or a plan denial", body = ApiResponse),
        (status = 400, description = "Invalid request", body = ApiResponse),
        (status = 401, description = "Not signed in", body = ApiResponse)
    )
)]
pub async fn generate_image_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerId>,
    payload: Result<Json<ImageRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return malformed_body(rejection),
    };
    let request = GenerationRequest::ImageSynthesis {
        prompt: req.prompt,
        publish: req.publish.unwrap_or(false),
    };
    respond(state.pipeline.run(&caller, request).await)
}

/// Remove the background of an uploaded image (multipart field `image`).
#[utoipa::path(
    post,
    path = "/api/ai/remove-image-background",
    request_body(content_type = "multipart/form-data", description = "The `image` to process."),
    responses(
        (status = 200, description = "Hosted image URL, or a quota denial", body = ApiResponse),
        (status = 400, description = "Missing image", body = ApiResponse),
        (status = 401, description = "Not signed in", body = ApiResponse)
    )
)]
pub async fn remove_image_background_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerId>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let form = match read_form(&state, multipart, "image", IMAGE_LIMIT).await {
        Ok(form) => form,
        Err(response) => return response,
    };
    let Some(image) = form.file else {
        return rejected(GenerationError::Validation("image file is required".to_string()));
    };
    respond(
        state
            .pipeline
            .run(&caller, GenerationRequest::RemoveBackground { image })
            .await,
    )
}

/// Remove a named object from an uploaded image (multipart fields `image` and `object`).
#[utoipa::path(
    post,
    path = "/api/ai/remove-image-object",
    request_body(content_type = "multipart/form-data", description = "The `image` and the `object` to remove."),
    responses(
        (status = 200, description = "Hosted image URL, or a quota denial", body = ApiResponse),
        (status = 400, description = "Missing image or object", body = ApiResponse),
        (status = 401, description = "Not signed in", body = ApiResponse)
    )
)]
pub async fn remove_image_object_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerId>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let form = match read_form(&state, multipart, "image", IMAGE_LIMIT).await {
        Ok(form) => form,
        Err(response) => return response,
    };
    let object = form.field("object").unwrap_or_default().to_string();
    let Some(image) = form.file else {
        return rejected(GenerationError::Validation("image file is required".to_string()));
    };
    respond(
        state
            .pipeline
            .run(&caller, GenerationRequest::RemoveObject { image, object })
            .await,
    )
}

/// Review an uploaded resume (multipart field `resume`, PDF, at most 5 MiB).
#[utoipa::path(
    post,
    path = "/api/ai/resume-review",
    request_body(content_type = "multipart/form-data", description = "The `resume` PDF."),
    responses(
        (status = 200, description = "Review text, or a quota/size denial", body = ApiResponse),
        (status = 400, description = "Missing or unreadable resume", body = ApiResponse),
        (status = 401, description = "Not signed in", body = ApiResponse)
    )
)]
pub async fn resume_review_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerId>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let form = match read_form(&state, multipart, "resume", ("Resume", state.max_resume_bytes)).await {
        Ok(form) => form,
        Err(response) => return response,
    };
    let Some(resume) = form.file else {
        return rejected(GenerationError::Validation("resume file is required".to_string()));
    };
    respond(
        state
            .pipeline
            .run(&caller, GenerationRequest::ResumeReview { resume })
            .await,
    )
}

/// Spools the form, capping the file field at `limit`. An oversized file is a
/// business denial named after `label`, not a malformed body.
async fn read_form(
    state: &AppState,
    multipart: Result<Multipart, MultipartRejection>,
    file_field: &str,
    (label, limit): (&'static str, u64),
) -> Result<SpooledForm, Response> {
    let multipart = multipart.map_err(malformed_body)?;
    spool_form(multipart, &state.upload_dir, file_field, limit)
        .await
        .map_err(|e| {
            warn!(error = %e, "Rejected multipart upload");
            match e {
                UploadError::TooLarge { limit, received } => {
                    rejected(GenerationError::PayloadTooLarge {
                        label,
                        limit,
                        actual: received,
                    })
                }
                other => malformed_body(other),
            }
        })
}
