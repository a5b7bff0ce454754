pub mod middleware;
pub mod response;
pub mod rest;
pub mod state;
pub mod upload;

use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

pub use middleware::require_auth;
pub use rest::{
    generate_article_handler, generate_blog_title_handler, generate_image_handler,
    health_handler, remove_image_background_handler, remove_image_object_handler,
    resume_review_handler,
};
pub use state::AppState;

/// Multipart bodies above this are refused before reaching a handler.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Builds the API router: a public health check plus the authenticated
/// generation routes under `/api/ai`.
pub fn build_router(app_state: Arc<AppState>) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new().route("/health", get(health_handler));

    // Protected routes (auth required)
    let ai_routes = Router::new()
        .route("/generate-article", post(generate_article_handler))
        .route("/generate-blog-title", post(generate_blog_title_handler))
        .route("/generate-image", post(generate_image_handler))
        .route("/remove-image-background", post(remove_image_background_handler))
        .route("/remove-image-object", post(remove_image_object_handler))
        .route("/resume-review", post(resume_review_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .nest("/api/ai", ai_routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(app_state)
}
