//! crates/creation_core/src/capability.rs
//!
//! Routes a request to exactly one capability adapter and normalizes what the
//! provider returns into a `Generated` value ready for the ledger.
//!
//! The dispatcher only borrows uploaded files; the pipeline owns and discards them.

use crate::domain::{
    AssetTransform, Generated, GenerationRequest, OperationKind, ResolvedCaller, Tier,
    TransientFile,
};
use crate::error::GenerationError;
use crate::ports::{
    AssetStorageService, DocumentTextExtractor, ImageSynthesisService, PortResult,
    TextCompletionService,
};
use bytes::Bytes;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const RESUME_REVIEW_TEMPLATE: &str = "Review the following resume and provide constructive feedback on its strengths, weaknesses, and areas for improvement. Resume Content:\n\n{resume}";

const REMOVE_BACKGROUND_PROMPT: &str = "Remove background from image";
const RESUME_REVIEW_PROMPT: &str = "Review the uploaded resume";

//=========================================================================================
// Settings and Providers
//=========================================================================================

/// Budgets and ceilings applied by the capability adapters.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub max_article_tokens: u32,
    pub blog_title_tokens: u32,
    pub resume_review_tokens: u32,
    pub max_resume_bytes: u64,
    pub provider_timeout: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            max_article_tokens: 4096,
            blog_title_tokens: 100,
            resume_review_tokens: 1000,
            max_resume_bytes: 5 * 1024 * 1024,
            provider_timeout: Duration::from_secs(60),
        }
    }
}

/// The external services the adapters call out to.
#[derive(Clone)]
pub struct Providers {
    pub text: Arc<dyn TextCompletionService>,
    pub images: Arc<dyn ImageSynthesisService>,
    pub assets: Arc<dyn AssetStorageService>,
    pub documents: Arc<dyn DocumentTextExtractor>,
}

//=========================================================================================
// The Dispatcher
//=========================================================================================

#[derive(Clone)]
pub struct CapabilityDispatcher {
    providers: Providers,
    settings: DispatchSettings,
}

impl CapabilityDispatcher {
    pub fn new(providers: Providers, settings: DispatchSettings) -> Self {
        Self { providers, settings }
    }

    /// Plan restrictions are independent of the numeric quota and checked before it.
    pub fn check_plan(&self, tier: Tier, kind: OperationKind) -> Result<(), GenerationError> {
        match (kind, tier) {
            (OperationKind::ImageSynthesis, Tier::Free) => Err(GenerationError::PlanRestricted),
            _ => Ok(()),
        }
    }

    pub async fn dispatch(
        &self,
        caller: &ResolvedCaller,
        request: &GenerationRequest,
    ) -> Result<Generated, GenerationError> {
        debug!(caller = %caller.caller, operation = %request.kind(), "Dispatching capability");
        match request {
            GenerationRequest::Article { prompt, length } => self.article(prompt, *length).await,
            GenerationRequest::BlogTitle { prompt } => self.blog_title(prompt).await,
            GenerationRequest::ImageSynthesis { prompt, publish } => {
                self.image_synthesis(caller.tier, prompt, *publish).await
            }
            GenerationRequest::RemoveBackground { image } => self.remove_background(image).await,
            GenerationRequest::RemoveObject { image, object } => {
                self.remove_object(image, object).await
            }
            GenerationRequest::ResumeReview { resume } => self.resume_review(resume).await,
        }
    }

    //=====================================================================================
    // Text Capabilities
    //=====================================================================================

    async fn article(&self, prompt: &str, length: u32) -> Result<Generated, GenerationError> {
        let prompt = required(prompt, "prompt")?;
        if length == 0 || length > self.settings.max_article_tokens {
            return Err(GenerationError::Validation(format!(
                "length must be between 1 and {}",
                self.settings.max_article_tokens
            )));
        }

        let content = self
            .call_provider("text completion", self.providers.text.complete(prompt, length))
            .await?;
        Ok(creation(OperationKind::Article, prompt.to_string(), content, false))
    }

    async fn blog_title(&self, prompt: &str) -> Result<Generated, GenerationError> {
        let prompt = required(prompt, "prompt")?;
        let content = self
            .call_provider(
                "text completion",
                self.providers.text.complete(prompt, self.settings.blog_title_tokens),
            )
            .await?;
        Ok(creation(OperationKind::BlogTitle, prompt.to_string(), content, false))
    }

    async fn resume_review(&self, resume: &TransientFile) -> Result<Generated, GenerationError> {
        if resume.size > self.settings.max_resume_bytes {
            return Err(GenerationError::PayloadTooLarge {
                label: "Resume",
                limit: self.settings.max_resume_bytes,
                actual: resume.size,
            });
        }

        let document = read_upload(resume, "resume").await?;
        let text = self
            .call_provider("document extraction", self.providers.documents.extract_text(document))
            .await?;
        if text.trim().is_empty() {
            return Err(GenerationError::Validation(
                "No readable text found in the uploaded resume".to_string(),
            ));
        }

        let prompt = RESUME_REVIEW_TEMPLATE.replace("{resume}", &text);
        let content = self
            .call_provider(
                "text completion",
                self.providers.text.complete(&prompt, self.settings.resume_review_tokens),
            )
            .await?;
        Ok(creation(
            OperationKind::ResumeReview,
            RESUME_REVIEW_PROMPT.to_string(),
            content,
            false,
        ))
    }

    //=====================================================================================
    // Image Capabilities
    //=====================================================================================

    async fn image_synthesis(
        &self,
        tier: Tier,
        prompt: &str,
        publish: bool,
    ) -> Result<Generated, GenerationError> {
        self.check_plan(tier, OperationKind::ImageSynthesis)?;
        let prompt = required(prompt, "prompt")?;

        let image = self
            .call_provider("image synthesis", self.providers.images.synthesize(prompt))
            .await?;
        let asset = self
            .call_provider("asset upload", self.providers.assets.upload(image, None))
            .await?;

        Ok(creation(
            OperationKind::ImageSynthesis,
            prompt.to_string(),
            asset.url,
            publish,
        ))
    }

    async fn remove_background(&self, image: &TransientFile) -> Result<Generated, GenerationError> {
        let data = read_upload(image, "image").await?;
        let asset = self
            .call_provider(
                "asset upload",
                self.providers
                    .assets
                    .upload(data, Some(AssetTransform::BackgroundRemoval)),
            )
            .await?;

        Ok(creation(
            OperationKind::RemoveBackground,
            REMOVE_BACKGROUND_PROMPT.to_string(),
            asset.url,
            false,
        ))
    }

    async fn remove_object(
        &self,
        image: &TransientFile,
        object: &str,
    ) -> Result<Generated, GenerationError> {
        let object = required(object, "object")?;
        let data = read_upload(image, "image").await?;
        let asset = self
            .call_provider("asset upload", self.providers.assets.upload(data, None))
            .await?;

        let transform = AssetTransform::GenerativeRemove {
            object: object.to_string(),
        };
        let url = self.providers.assets.derived_url(&asset.public_id, &transform);

        Ok(creation(
            OperationKind::RemoveObject,
            format!("Removed {} from image", object),
            url,
            false,
        ))
    }

    //=====================================================================================
    // Helpers
    //=====================================================================================

    /// Runs one provider call under the configured timeout, keeping only the
    /// provider's message on failure.
    async fn call_provider<T>(
        &self,
        what: &'static str,
        call: impl Future<Output = PortResult<T>>,
    ) -> Result<T, GenerationError> {
        match tokio::time::timeout(self.settings.provider_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!(provider = what, error = %e, "Provider call failed");
                Err(GenerationError::provider(e))
            }
            Err(_) => {
                warn!(provider = what, timeout = ?self.settings.provider_timeout, "Provider call timed out");
                Err(GenerationError::Provider(format!(
                    "{} timed out after {}s",
                    what,
                    self.settings.provider_timeout.as_secs()
                )))
            }
        }
    }
}

fn required<'a>(value: &'a str, field: &str) -> Result<&'a str, GenerationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(GenerationError::Validation(format!("{} is required", field)));
    }
    Ok(trimmed)
}

async fn read_upload(file: &TransientFile, field: &str) -> Result<Bytes, GenerationError> {
    let data = file.read().await.map_err(|e| {
        warn!(path = %file.path().display(), error = %e, "Failed to read transient upload");
        GenerationError::Validation(format!("Uploaded {} could not be read", field))
    })?;
    if data.is_empty() {
        return Err(GenerationError::Validation(format!("Uploaded {} is empty", field)));
    }
    Ok(data)
}

/// Only image synthesis carries a caller-chosen publish flag.
fn creation(operation: OperationKind, prompt: String, content: String, publish: bool) -> Generated {
    Generated {
        kind: operation.creation_kind(),
        prompt,
        content,
        publish,
    }
}
