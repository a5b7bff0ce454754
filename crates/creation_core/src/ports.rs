//! crates/creation_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the identity provider, the generation providers, the asset
//! store and the ledger database.

use async_trait::async_trait;
use bytes::Bytes;
use crate::domain::{
    AssetTransform, CallerId, CreationRecord, Entitlement, NewCreation, StoredAsset,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
    /// The caller-supplied input could not be processed by the service.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Identity and Entitlement Ports
//=========================================================================================

#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Resolves an opaque session token into the caller it was issued to.
    async fn resolve_session(&self, token: &str) -> PortResult<CallerId>;
}

#[async_trait]
pub trait EntitlementStore: Send + Sync {
    /// Reads the caller's plan and free-usage counter.
    async fn load_entitlement(&self, caller: &CallerId) -> PortResult<Entitlement>;

    /// Overwrites the caller's free-usage counter.
    async fn store_free_usage(&self, caller: &CallerId, free_usage: u32) -> PortResult<()>;
}

//=========================================================================================
// Generation Provider Ports
//=========================================================================================

#[async_trait]
pub trait TextCompletionService: Send + Sync {
    /// Completes a single-turn prompt within the given output token budget.
    async fn complete(&self, prompt: &str, max_tokens: u32) -> PortResult<String>;
}

#[async_trait]
pub trait ImageSynthesisService: Send + Sync {
    /// Renders an image for the prompt and returns the encoded bytes.
    async fn synthesize(&self, prompt: &str) -> PortResult<Bytes>;
}

#[async_trait]
pub trait AssetStorageService: Send + Sync {
    /// Uploads image bytes, optionally applying a transform on ingestion.
    async fn upload(&self, data: Bytes, transform: Option<AssetTransform>) -> PortResult<StoredAsset>;

    /// Builds the delivery URL of an already uploaded asset with a transform applied.
    fn derived_url(&self, public_id: &str, transform: &AssetTransform) -> String;
}

#[async_trait]
pub trait DocumentTextExtractor: Send + Sync {
    /// Extracts the plain text of a PDF document.
    async fn extract_text(&self, document: Bytes) -> PortResult<String>;
}

//=========================================================================================
// Ledger Port
//=========================================================================================

#[async_trait]
pub trait CreationLedger: Send + Sync {
    /// Appends a creation. Rows are never updated or deleted.
    async fn append(&self, creation: NewCreation) -> PortResult<CreationRecord>;
}
