//! services/api/src/web/upload.rs
//!
//! Spools one multipart file field to transient storage and collects the text fields.
//! The returned `TransientFile` is owned by the request; the pipeline discards it.

use axum::extract::multipart::{Multipart, MultipartError};
use axum::http::StatusCode;
use creation_core::domain::TransientFile;
use std::collections::HashMap;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Failed to read multipart data: {0}")]
    Multipart(#[from] axum::extract::multipart::MultipartError),
    #[error("Upload exceeds {limit} bytes")]
    TooLarge { limit: u64, received: u64 },
    #[error("Failed to store upload: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Default)]
pub struct SpooledForm {
    pub file: Option<TransientFile>,
    pub fields: HashMap<String, String>,
}

impl SpooledForm {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Reads the whole form. Only `file_field` is written to disk, and only up to
/// `max_file_bytes`; other file parts are drained and dropped.
///
/// The spooled file belongs to the returned form from the moment it is created, so
/// an error or a cancelled read removes it.
pub async fn spool_form(
    mut multipart: Multipart,
    upload_dir: &Path,
    file_field: &str,
    max_file_bytes: u64,
) -> Result<SpooledForm, UploadError> {
    let mut form = SpooledForm::default();

    let result = async {
        while let Some(mut field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();

            if name == file_field && form.file.is_none() {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let path = upload_dir.join(format!("{}.upload", Uuid::new_v4()));
                let file = form.file.insert(TransientFile::new(path, file_name, 0)?);

                let mut out = tokio::fs::File::create(file.path()).await?;
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|e| too_large(e, file.size, max_file_bytes))?
                {
                    file.size += chunk.len() as u64;
                    if file.size > max_file_bytes {
                        return Err(UploadError::TooLarge {
                            limit: max_file_bytes,
                            received: file.size,
                        });
                    }
                    out.write_all(&chunk).await?;
                }
                out.flush().await?;
                debug!(field = %name, size = file.size, path = %file.path().display(), "Spooled upload");
            } else if field.file_name().is_some() {
                while field.chunk().await?.is_some() {}
            } else {
                let value = field.text().await?;
                form.fields.insert(name, value);
            }
        }
        Ok::<(), UploadError>(())
    }
    .await;

    match result {
        Ok(()) => Ok(form),
        Err(e) => {
            if let Some(file) = form.file.take() {
                file.discard().await;
            }
            Err(e)
        }
    }
}

/// A body that hits the request size ceiling mid-file is reported as an oversized
/// upload rather than a malformed form.
fn too_large(err: MultipartError, received: u64, limit: u64) -> UploadError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        UploadError::TooLarge { limit, received }
    } else {
        UploadError::Multipart(err)
    }
}
