//! services/api/src/adapters/cloudinary.rs
//!
//! This module contains the adapter for the Cloudinary asset store.
//! It implements the `AssetStorageService` port from the `core` crate using signed
//! uploads and transformation delivery URLs.

use crate::adapters::http::{ensure_success, transport_error};
use crate::config::CloudinaryConfig;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use creation_core::domain::{AssetTransform, StoredAsset};
use creation_core::ports::{AssetStorageService, PortError, PortResult};
use reqwest::multipart::{Form, Part};
use reqwest::Url;
use serde::Deserialize;
use sha2::{Digest, Sha256};

const UPLOAD_API_BASE: &str = "https://api.cloudinary.com/v1_1";
const DELIVERY_BASE: &str = "https://res.cloudinary.com";

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `AssetStorageService` using Cloudinary.
#[derive(Clone)]
pub struct CloudinaryAdapter {
    http: reqwest::Client,
    config: CloudinaryConfig,
}

impl CloudinaryAdapter {
    /// Creates a new `CloudinaryAdapter`.
    pub fn new(http: reqwest::Client, config: CloudinaryConfig) -> Self {
        Self { http, config }
    }

    /// Signs upload parameters: sorted `key=value` pairs joined by `&`, followed by
    /// the API secret, hashed with SHA-256.
    fn sign(&self, params: &[(&str, String)]) -> String {
        let mut sorted = params.to_vec();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        let to_sign = sorted
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        format!("{:x}", Sha256::digest(format!("{}{}", to_sign, self.config.api_secret)))
    }
}

/// The transformation string Cloudinary expects for a transform.
fn transformation(transform: &AssetTransform) -> String {
    match transform {
        AssetTransform::BackgroundRemoval => "e_background_removal".to_string(),
        AssetTransform::GenerativeRemove { object } => format!("e_gen_remove:{}", object),
    }
}

//=========================================================================================
// `AssetStorageService` Trait Implementation
//=========================================================================================

#[async_trait]
impl AssetStorageService for CloudinaryAdapter {
    async fn upload(&self, data: Bytes, transform: Option<AssetTransform>) -> PortResult<StoredAsset> {
        let mut params = vec![("timestamp", Utc::now().timestamp().to_string())];
        if let Some(transform) = &transform {
            params.push(("transformation", transformation(transform)));
        }
        let signature = self.sign(&params);

        let mut form = Form::new()
            .part("file", Part::stream(data).file_name("upload"))
            .text("api_key", self.config.api_key.clone())
            .text("signature", signature)
            .text("signature_algorithm", "sha256");
        for (key, value) in params {
            form = form.text(key, value);
        }

        let url = format!("{}/{}/image/upload", UPLOAD_API_BASE, self.config.cloud_name);
        let response = self
            .http
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| transport_error("Cloudinary", e))?;

        let uploaded: UploadResponse = ensure_success("Cloudinary", response)
            .await?
            .json()
            .await
            .map_err(|e| PortError::Unexpected(format!("Unreadable Cloudinary response: {}", e)))?;

        Ok(StoredAsset {
            url: uploaded.secure_url,
            public_id: uploaded.public_id,
        })
    }

    fn derived_url(&self, public_id: &str, transform: &AssetTransform) -> String {
        let effect = transformation(transform);
        let unencoded = || {
            format!(
                "{}/{}/image/upload/{}/{}",
                DELIVERY_BASE, self.config.cloud_name, effect, public_id
            )
        };

        let Ok(mut url) = Url::parse(DELIVERY_BASE) else {
            return unencoded();
        };
        match url.path_segments_mut() {
            Ok(mut segments) => {
                segments.push(&self.config.cloud_name).push("image").push("upload").push(&effect);
                // Public ids may contain folders, which stay as path separators.
                segments.extend(public_id.split('/'));
            }
            Err(()) => return unencoded(),
        }
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> CloudinaryAdapter {
        CloudinaryAdapter::new(
            reqwest::Client::new(),
            CloudinaryConfig {
                cloud_name: "demo".to_string(),
                api_key: "key".to_string(),
                api_secret: "secret".to_string(),
            },
        )
    }

    #[test]
    fn signature_is_order_independent() {
        let a = adapter();
        let one = a.sign(&[
            ("timestamp", "1700000000".to_string()),
            ("transformation", "e_background_removal".to_string()),
        ]);
        let two = a.sign(&[
            ("transformation", "e_background_removal".to_string()),
            ("timestamp", "1700000000".to_string()),
        ]);
        assert_eq!(one, two);
        assert_eq!(one.len(), 64);
        assert_eq!(
            one,
            format!(
                "{:x}",
                Sha256::digest("timestamp=1700000000&transformation=e_background_removalsecret")
            )
        );
    }

    #[test]
    fn derived_url_applies_generative_remove() {
        let url = adapter().derived_url(
            "samples/desk",
            &AssetTransform::GenerativeRemove {
                object: "coffee cup".to_string(),
            },
        );
        assert_eq!(
            url,
            "https://res.cloudinary.com/demo/image/upload/e_gen_remove:coffee%20cup/samples/desk"
        );
    }
}
