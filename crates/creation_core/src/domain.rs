//! crates/creation_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database, provider SDK or serialization format.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use uuid::Uuid;

/// Opaque identity of a caller, as issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallerId(String);

impl CallerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Entitlement level of a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Free,
    Premium,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Premium => "premium",
        }
    }
}

/// The (tier, usage) pair read from the entitlement store at request start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entitlement {
    pub tier: Tier,
    pub free_usage: u32,
}

/// An entitlement snapshot bound to the caller it was resolved for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCaller {
    pub caller: CallerId,
    pub tier: Tier,
    pub free_usage: u32,
}

/// A temporarily stored uploaded binary, owned by exactly one request.
///
/// Dropping the value removes the file, so a request that is cancelled mid-flight
/// still leaves nothing behind. `discard` is the awaited form used on normal exits.
#[derive(Debug)]
pub struct TransientFile {
    path: TempPath,
    pub file_name: String,
    pub size: u64,
}

impl TransientFile {
    /// Takes ownership of `path`, which need not exist yet.
    pub fn new(path: PathBuf, file_name: impl Into<String>, size: u64) -> io::Result<Self> {
        Ok(Self {
            path: TempPath::try_from_path(path)?,
            file_name: file_name.into(),
            size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read(&self) -> io::Result<Bytes> {
        tokio::fs::read(self.path()).await.map(Bytes::from)
    }

    /// Removes the file from transient storage. A failure is logged, never returned.
    pub async fn discard(self) {
        let TransientFile { path, .. } = self;
        let shown = path.display().to_string();
        match tokio::task::spawn_blocking(move || path.close()).await {
            Ok(Ok(())) => tracing::debug!(path = %shown, "Discarded transient upload"),
            Ok(Err(e)) if e.kind() == io::ErrorKind::NotFound => {}
            Ok(Err(e)) => tracing::warn!(path = %shown, error = %e, "Failed to discard transient upload"),
            Err(e) => tracing::warn!(path = %shown, error = %e, "Discard task did not complete"),
        }
    }
}

/// The closed set of operations a caller may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Article,
    BlogTitle,
    ImageSynthesis,
    RemoveBackground,
    RemoveObject,
    ResumeReview,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Article => "article",
            OperationKind::BlogTitle => "blog-title",
            OperationKind::ImageSynthesis => "image-synthesis",
            OperationKind::RemoveBackground => "remove-background",
            OperationKind::RemoveObject => "remove-object",
            OperationKind::ResumeReview => "resume-review",
        }
    }

    /// The ledger type a successful run of this operation is recorded under.
    pub fn creation_kind(self) -> CreationKind {
        match self {
            OperationKind::Article => CreationKind::Article,
            OperationKind::BlogTitle => CreationKind::BlogTitle,
            OperationKind::ImageSynthesis
            | OperationKind::RemoveBackground
            | OperationKind::RemoveObject => CreationKind::Image,
            OperationKind::ResumeReview => CreationKind::ResumeReview,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated-on-dispatch request for one capability.
#[derive(Debug)]
pub enum GenerationRequest {
    Article { prompt: String, length: u32 },
    BlogTitle { prompt: String },
    ImageSynthesis { prompt: String, publish: bool },
    RemoveBackground { image: TransientFile },
    RemoveObject { image: TransientFile, object: String },
    ResumeReview { resume: TransientFile },
}

impl GenerationRequest {
    pub fn kind(&self) -> OperationKind {
        match self {
            GenerationRequest::Article { .. } => OperationKind::Article,
            GenerationRequest::BlogTitle { .. } => OperationKind::BlogTitle,
            GenerationRequest::ImageSynthesis { .. } => OperationKind::ImageSynthesis,
            GenerationRequest::RemoveBackground { .. } => OperationKind::RemoveBackground,
            GenerationRequest::RemoveObject { .. } => OperationKind::RemoveObject,
            GenerationRequest::ResumeReview { .. } => OperationKind::ResumeReview,
        }
    }

    /// Gives up the uploaded file this request owns, if any.
    pub fn into_transient_file(self) -> Option<TransientFile> {
        match self {
            GenerationRequest::RemoveBackground { image }
            | GenerationRequest::RemoveObject { image, .. } => Some(image),
            GenerationRequest::ResumeReview { resume } => Some(resume),
            GenerationRequest::Article { .. }
            | GenerationRequest::BlogTitle { .. }
            | GenerationRequest::ImageSynthesis { .. } => None,
        }
    }
}

/// A normalized provider result, ready to be recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generated {
    pub kind: CreationKind,
    pub prompt: String,
    pub content: String,
    pub publish: bool,
}

/// The outcome returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationResult {
    pub success: bool,
    pub content: Option<String>,
    pub failure_reason: Option<String>,
}

impl GenerationResult {
    pub fn succeeded(content: String) -> Self {
        Self {
            success: true,
            content: Some(content),
            failure_reason: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            content: None,
            failure_reason: Some(reason.into()),
        }
    }
}

/// Ledger type of a creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreationKind {
    Article,
    BlogTitle,
    Image,
    ResumeReview,
}

impl CreationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CreationKind::Article => "article",
            CreationKind::BlogTitle => "blog-title",
            CreationKind::Image => "image",
            CreationKind::ResumeReview => "resume-review",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "article" => Some(CreationKind::Article),
            "blog-title" => Some(CreationKind::BlogTitle),
            "image" => Some(CreationKind::Image),
            "resume-review" => Some(CreationKind::ResumeReview),
            _ => None,
        }
    }
}

/// The row handed to the ledger for insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCreation {
    pub owner: CallerId,
    pub prompt: String,
    pub content: String,
    pub kind: CreationKind,
    pub publish: bool,
}

/// An immutable ledger entry for one successfully completed generation.
#[derive(Debug, Clone)]
pub struct CreationRecord {
    pub id: Uuid,
    pub owner: CallerId,
    pub prompt: String,
    pub content: String,
    pub kind: CreationKind,
    pub publish: bool,
    pub created_at: DateTime<Utc>,
}

/// A named transform the asset store applies to an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetTransform {
    BackgroundRemoval,
    GenerativeRemove { object: String },
}

/// An asset hosted by the storage provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAsset {
    pub url: String,
    pub public_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spooled(dir: &tempfile::TempDir) -> TransientFile {
        let path = dir.path().join("upload.bin");
        std::fs::write(&path, b"payload").unwrap();
        TransientFile::new(path, "upload.bin", 7).unwrap()
    }

    #[test]
    fn dropping_a_transient_file_removes_it() {
        let dir = tempfile::tempdir().unwrap();
        let file = spooled(&dir);
        let path = file.path().to_path_buf();
        assert!(path.exists());

        drop(file);

        assert!(!path.exists());
    }

    #[tokio::test]
    async fn discard_removes_the_file_and_tolerates_it_being_gone() {
        let dir = tempfile::tempdir().unwrap();
        let file = spooled(&dir);
        let path = file.path().to_path_buf();
        assert_eq!(file.read().await.unwrap(), Bytes::from_static(b"payload"));

        file.discard().await;
        assert!(!path.exists());

        let missing = TransientFile::new(path, "upload.bin", 0).unwrap();
        missing.discard().await;
    }

    #[test]
    fn request_hands_over_its_upload() {
        let dir = tempfile::tempdir().unwrap();
        let request = GenerationRequest::ResumeReview {
            resume: spooled(&dir),
        };
        assert_eq!(request.kind().creation_kind(), CreationKind::ResumeReview);

        let file = request.into_transient_file().unwrap();
        assert_eq!(file.file_name, "upload.bin");
        assert!(GenerationRequest::BlogTitle {
            prompt: "x".to_string()
        }
        .into_transient_file()
        .is_none());
    }
}
