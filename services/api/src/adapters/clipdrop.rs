//! services/api/src/adapters/clipdrop.rs
//!
//! This module contains the adapter for the Clipdrop text-to-image API.
//! It implements the `ImageSynthesisService` port from the `core` crate.

use crate::adapters::http::{ensure_success, transport_error};
use async_trait::async_trait;
use bytes::Bytes;
use creation_core::ports::{ImageSynthesisService, PortResult};
use reqwest::multipart::Form;

const CLIPDROP_TEXT_TO_IMAGE_URL: &str = "https://clipdrop-api.co/text-to-image/v1";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `ImageSynthesisService` using Clipdrop.
#[derive(Clone)]
pub struct ClipdropImageAdapter {
    http: reqwest::Client,
    api_key: String,
}

impl ClipdropImageAdapter {
    /// Creates a new `ClipdropImageAdapter`.
    pub fn new(http: reqwest::Client, api_key: String) -> Self {
        Self { http, api_key }
    }
}

//=========================================================================================
// `ImageSynthesisService` Trait Implementation
//=========================================================================================

#[async_trait]
impl ImageSynthesisService for ClipdropImageAdapter {
    /// Returns the PNG bytes Clipdrop renders for the prompt.
    async fn synthesize(&self, prompt: &str) -> PortResult<Bytes> {
        let form = Form::new().text("prompt", prompt.to_string());

        let response = self
            .http
            .post(CLIPDROP_TEXT_TO_IMAGE_URL)
            .header("x-api-key", &self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| transport_error("Clipdrop", e))?;

        ensure_success("Clipdrop", response)
            .await?
            .bytes()
            .await
            .map_err(|e| transport_error("Clipdrop", e))
    }
}
