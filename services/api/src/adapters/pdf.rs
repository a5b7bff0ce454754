//! services/api/src/adapters/pdf.rs
//!
//! This module contains the PDF text extractor.
//! It implements the `DocumentTextExtractor` port from the `core` crate.

use async_trait::async_trait;
use bytes::Bytes;
use creation_core::ports::{DocumentTextExtractor, PortError, PortResult};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// Extracts text from PDF documents with `pdf-extract`.
#[derive(Clone, Default)]
pub struct PdfTextExtractor;

impl PdfTextExtractor {
    pub fn new() -> Self {
        Self
    }
}

//=========================================================================================
// `DocumentTextExtractor` Trait Implementation
//=========================================================================================

#[async_trait]
impl DocumentTextExtractor for PdfTextExtractor {
    /// Parsing is CPU-bound, so it runs on the blocking pool.
    async fn extract_text(&self, document: Bytes) -> PortResult<String> {
        tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&document))
            .await
            .map_err(|e| {
                // pdf-extract panics on some malformed documents.
                if e.is_panic() {
                    PortError::InvalidInput("Uploaded resume is not a readable PDF".to_string())
                } else {
                    PortError::Unexpected(format!("PDF extraction task failed: {}", e))
                }
            })?
            .map_err(|e| PortError::InvalidInput(format!("Uploaded resume is not a readable PDF: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn non_pdf_input_is_rejected_as_invalid_input() {
        let result = PdfTextExtractor::new()
            .extract_text(Bytes::from_static(b"definitely not a pdf"))
            .await;
        assert!(matches!(result, Err(PortError::InvalidInput(_))));
    }
}
