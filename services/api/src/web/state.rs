//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use creation_core::ports::IdentityService;
use creation_core::RequestPipeline;
use std::path::PathBuf;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: RequestPipeline,
    pub identity: Arc<dyn IdentityService>,
    /// Where multipart uploads are spooled for the lifetime of one request.
    pub upload_dir: PathBuf,
    /// Spooling stops once a resume passes this size.
    pub max_resume_bytes: u64,
}
