//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        http::build_client, ClerkAdapter, ClipdropImageAdapter, CloudinaryAdapter, DbAdapter,
        OpenAiTextAdapter, PdfTextExtractor,
    },
    config::Config,
    error::ApiError,
    web::{build_router, rest::ApiDoc, state::AppState},
};
use async_openai::{config::OpenAIConfig, Client};
use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use axum::Router;
use creation_core::{CapabilityDispatcher, DispatchSettings, Providers, QuotaPolicy, RequestPipeline};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let ledger = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    ledger.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let http = build_client(config.provider_timeout)?;
    let clerk = Arc::new(ClerkAdapter::new(
        http.clone(),
        config.clerk_api_url.clone(),
        config.clerk_secret_key.clone(),
    ));

    let openai_config = OpenAIConfig::new()
        .with_api_key(config.gemini_api_key.clone())
        .with_api_base(config.text_api_base.clone());
    let text_adapter = Arc::new(OpenAiTextAdapter::new(
        Client::with_config(openai_config),
        config.text_model.clone(),
    ));

    let providers = Providers {
        text: text_adapter,
        images: Arc::new(ClipdropImageAdapter::new(
            http.clone(),
            config.clipdrop_api_key.clone(),
        )),
        assets: Arc::new(CloudinaryAdapter::new(http, config.cloudinary.clone())),
        documents: Arc::new(PdfTextExtractor::new()),
    };
    let dispatcher = CapabilityDispatcher::new(
        providers,
        DispatchSettings {
            max_resume_bytes: config.max_resume_bytes,
            provider_timeout: config.provider_timeout,
            ..DispatchSettings::default()
        },
    );

    // --- 4. Build the Pipeline and the Shared AppState ---
    let pipeline = RequestPipeline::new(
        clerk.clone(),
        ledger,
        dispatcher,
        QuotaPolicy::new(config.free_usage_limit),
    );
    tokio::fs::create_dir_all(&config.upload_dir).await?;
    let app_state = Arc::new(AppState {
        pipeline,
        identity: clerk,
        upload_dir: config.upload_dir.clone(),
        max_resume_bytes: config.max_resume_bytes,
    });
    info!(
        free_usage_limit = config.free_usage_limit,
        upload_dir = %config.upload_dir.display(),
        "Pipeline ready"
    );

    // --- 5. Create the Web Router ---
    let origin = config.cors_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!("Invalid CORS_ORIGIN '{}': {}", config.cors_origin, e))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(build_router(app_state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
