//! crates/creation_core/src/pipeline.rs
//!
//! Composes entitlement resolution, the quota gate, capability dispatch, ledger
//! recording and usage accounting for one request.
//!
//! Stages run strictly in order:
//! `Received → Authorized → QuotaChecked → Dispatched → Recorded → Accounted → Completed`.
//! Any failure short-circuits to an error outcome. The request's transient upload is
//! discarded after the run whatever the outcome.

use crate::capability::CapabilityDispatcher;
use crate::domain::{CallerId, GenerationRequest, GenerationResult, Tier};
use crate::entitlement::{EntitlementResolver, UsageAccountant};
use crate::error::GenerationError;
use crate::ports::{CreationLedger, EntitlementStore};
use crate::quota::QuotaPolicy;
use crate::recorder::ArtifactRecorder;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Cost of one generation in quota units.
const GENERATION_COST: u32 = 1;

/// The stage a request reached before completing or failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Received,
    Authorized,
    QuotaChecked,
    Dispatched,
    Recorded,
    Accounted,
    Completed,
}

/// What the pipeline hands back to the transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    Completed { content: String },
    Failed { stage: PipelineStage, error: GenerationError },
}

impl PipelineOutcome {
    pub fn into_result(self) -> GenerationResult {
        match self {
            PipelineOutcome::Completed { content } => GenerationResult::succeeded(content),
            PipelineOutcome::Failed { error, .. } => GenerationResult::failed(error.to_string()),
        }
    }
}

//=========================================================================================
// Per-caller Quota Slots
//=========================================================================================

#[derive(Default)]
struct CallerSlot {
    lock: Arc<tokio::sync::Mutex<()>>,
    reserved: AtomicU32,
}

/// Per-caller bookkeeping for the quota gate.
///
/// A caller's slot lock is held only around entitlement-store calls, never across a
/// provider call. Requests admitted by the gate but not yet accounted hold a
/// `Reservation`, and later gate decisions count those units as spent.
#[derive(Default)]
pub struct CallerLocks {
    slots: Mutex<HashMap<CallerId, Arc<CallerSlot>>>,
}

impl CallerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, caller: &CallerId) -> CallerGuard<'_> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.entry(caller.clone()).or_default().clone()
        };
        let guard = slot.lock.clone().lock_owned().await;
        CallerGuard {
            owner: self,
            caller: caller.clone(),
            slot,
            guard: Some(guard),
        }
    }

    fn release(&self, caller: &CallerId, slot: &Arc<CallerSlot>) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        // Held by the map and the releasing handle only: no waiter, no reservation.
        if Arc::strong_count(slot) == 2 && slots.get(caller).is_some_and(|s| Arc::ptr_eq(s, slot)) {
            slots.remove(caller);
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Exclusive access to one caller's slot.
pub struct CallerGuard<'a> {
    owner: &'a CallerLocks,
    caller: CallerId,
    slot: Arc<CallerSlot>,
    guard: Option<tokio::sync::OwnedMutexGuard<()>>,
}

impl<'a> CallerGuard<'a> {
    /// Units admitted by the gate that are not accounted yet.
    pub fn reserved(&self) -> u32 {
        self.slot.reserved.load(Ordering::SeqCst)
    }

    pub fn reserve(&self, units: u32) -> Reservation<'a> {
        self.slot.reserved.fetch_add(units, Ordering::SeqCst);
        Reservation {
            owner: self.owner,
            caller: self.caller.clone(),
            slot: self.slot.clone(),
            units,
        }
    }
}

impl Drop for CallerGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.owner.release(&self.caller, &self.slot);
    }
}

/// Quota units held by an in-flight request. Returned on drop, including when the
/// request is cancelled.
pub struct Reservation<'a> {
    owner: &'a CallerLocks,
    caller: CallerId,
    slot: Arc<CallerSlot>,
    units: u32,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.slot.reserved.fetch_sub(self.units, Ordering::SeqCst);
        self.owner.release(&self.caller, &self.slot);
    }
}

//=========================================================================================
// The Pipeline
//=========================================================================================

#[derive(Clone)]
pub struct RequestPipeline {
    resolver: EntitlementResolver,
    quota: QuotaPolicy,
    dispatcher: CapabilityDispatcher,
    recorder: ArtifactRecorder,
    accountant: UsageAccountant,
    locks: Arc<CallerLocks>,
}

impl RequestPipeline {
    pub fn new(
        entitlements: Arc<dyn EntitlementStore>,
        ledger: Arc<dyn CreationLedger>,
        dispatcher: CapabilityDispatcher,
        quota: QuotaPolicy,
    ) -> Self {
        Self {
            resolver: EntitlementResolver::new(entitlements.clone()),
            quota,
            dispatcher,
            recorder: ArtifactRecorder::new(ledger),
            accountant: UsageAccountant::new(entitlements),
            locks: Arc::new(CallerLocks::new()),
        }
    }

    /// Runs one request to completion. Never panics on business or provider failures.
    pub async fn run(&self, caller: &CallerId, request: GenerationRequest) -> PipelineOutcome {
        let operation = request.kind();
        let span = info_span!("generation", %caller, %operation);

        async move {
            let outcome = self.run_stages(caller, &request).await;

            // If this future is dropped instead, the request drops its file with it.
            if let Some(file) = request.into_transient_file() {
                file.discard().await;
            }

            match &outcome {
                PipelineOutcome::Completed { .. } => info!("Generation completed"),
                PipelineOutcome::Failed { stage, error } if error.is_business_denial() => {
                    info!(?stage, reason = %error, "Generation denied")
                }
                PipelineOutcome::Failed { stage, error } => {
                    warn!(?stage, error = %error, "Generation failed")
                }
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn run_stages(&self, caller: &CallerId, request: &GenerationRequest) -> PipelineOutcome {
        let mut stage = PipelineStage::Received;
        macro_rules! step {
            ($result:expr) => {
                match $result {
                    Ok(value) => value,
                    Err(error) => return PipelineOutcome::Failed { stage, error },
                }
            };
        }

        let slot = self.locks.acquire(caller).await;

        let snapshot = step!(self.resolver.resolve(caller).await);
        stage = PipelineStage::Authorized;
        debug!(?stage, tier = snapshot.tier.as_str(), free_usage = snapshot.free_usage);

        step!(self.dispatcher.check_plan(snapshot.tier, request.kind()));
        let pending = slot.reserved();
        let spent = snapshot.free_usage.saturating_add(pending);
        if !self.quota.allow(snapshot.tier, spent, GENERATION_COST) {
            return PipelineOutcome::Failed {
                stage,
                error: GenerationError::QuotaExceeded,
            };
        }
        let reservation = (snapshot.tier == Tier::Free).then(|| slot.reserve(GENERATION_COST));
        drop(slot);
        stage = PipelineStage::QuotaChecked;
        debug!(?stage, pending);

        let generated = step!(self.dispatcher.dispatch(&snapshot, request).await);
        stage = PipelineStage::Dispatched;
        debug!(?stage);

        let record = step!(self.recorder.record(caller, generated).await);
        stage = PipelineStage::Recorded;
        debug!(?stage, creation_id = %record.id);

        if let Some(reservation) = reservation {
            let _slot = self.locks.acquire(caller).await;
            // The record already exists, so the caller still gets the content.
            match self.accountant.increment(caller).await {
                Ok(free_usage) => {
                    stage = PipelineStage::Accounted;
                    debug!(?stage, free_usage);
                }
                Err(e) => {
                    error!(error = %e, creation_id = %record.id, "Usage increment failed after recording");
                }
            }
            drop(reservation);
        }

        stage = PipelineStage::Completed;
        debug!(?stage);
        PipelineOutcome::Completed {
            content: record.content,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{DispatchSettings, Providers};
    use crate::domain::{AssetTransform, CreationKind, StoredAsset, TransientFile};
    use crate::error::{PLAN_RESTRICTED_MESSAGE, QUOTA_EXCEEDED_MESSAGE};
    use crate::memory::{InMemoryEntitlementStore, InMemoryLedger};
    use crate::ports::{
        AssetStorageService, DocumentTextExtractor, ImageSynthesisService, PortError, PortResult,
        TextCompletionService,
    };
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    //-------------------------------------------------------------------------------------
    // Fakes
    //-------------------------------------------------------------------------------------

    #[derive(Default)]
    struct ScriptedProviders {
        calls: AtomicUsize,
        fail: AtomicBool,
        delay_ms: u64,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ScriptedProviders {
        fn slow(delay_ms: u64) -> Self {
            Self {
                delay_ms,
                ..Self::default()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        /// Most provider calls that were running at the same time.
        fn peak(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }

        async fn step(&self) -> PortResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(running, Ordering::SeqCst);
            if self.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(PortError::Unexpected("provider returned 503".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl TextCompletionService for ScriptedProviders {
        async fn complete(&self, _prompt: &str, _max_tokens: u32) -> PortResult<String> {
            self.step().await?;
            Ok("hello".to_string())
        }
    }

    #[async_trait]
    impl ImageSynthesisService for ScriptedProviders {
        async fn synthesize(&self, _prompt: &str) -> PortResult<Bytes> {
            self.step().await?;
            Ok(Bytes::from_static(b"png"))
        }
    }

    #[async_trait]
    impl AssetStorageService for ScriptedProviders {
        async fn upload(&self, _data: Bytes, _transform: Option<AssetTransform>) -> PortResult<StoredAsset> {
            self.step().await?;
            Ok(StoredAsset {
                url: "https://cdn.test/img.png".to_string(),
                public_id: "img".to_string(),
            })
        }

        fn derived_url(&self, public_id: &str, _transform: &AssetTransform) -> String {
            format!("https://cdn.test/derived/{}", public_id)
        }
    }

    #[async_trait]
    impl DocumentTextExtractor for ScriptedProviders {
        async fn extract_text(&self, _document: Bytes) -> PortResult<String> {
            self.step().await?;
            Ok("resume text".to_string())
        }
    }

    struct Harness {
        store: Arc<InMemoryEntitlementStore>,
        ledger: Arc<InMemoryLedger>,
        providers: Arc<ScriptedProviders>,
        pipeline: RequestPipeline,
        caller: CallerId,
    }

    fn harness_with(tier: Tier, free_usage: u32, providers: ScriptedProviders) -> Harness {
        let store = Arc::new(InMemoryEntitlementStore::new());
        let ledger = Arc::new(InMemoryLedger::new());
        let providers = Arc::new(providers);
        let caller = CallerId::new("user_42");
        store.insert(&caller, tier, free_usage);

        let dispatcher = CapabilityDispatcher::new(
            Providers {
                text: providers.clone(),
                images: providers.clone(),
                assets: providers.clone(),
                documents: providers.clone(),
            },
            DispatchSettings::default(),
        );
        let pipeline =
            RequestPipeline::new(store.clone(), ledger.clone(), dispatcher, QuotaPolicy::default());
        Harness {
            store,
            ledger,
            providers,
            pipeline,
            caller,
        }
    }

    fn harness(tier: Tier, free_usage: u32) -> Harness {
        harness_with(tier, free_usage, ScriptedProviders::default())
    }

    fn article() -> GenerationRequest {
        GenerationRequest::Article {
            prompt: "x".to_string(),
            length: 50,
        }
    }

    fn spooled(dir: &tempfile::TempDir, name: &str) -> TransientFile {
        let path = dir.path().join(name);
        std::fs::write(&path, b"\x89PNG payload").unwrap();
        TransientFile::new(path, name, 12).unwrap()
    }

    //-------------------------------------------------------------------------------------
    // Scenarios
    //-------------------------------------------------------------------------------------

    #[tokio::test]
    async fn free_article_is_recorded_and_counted() {
        let h = harness(Tier::Free, 3);

        let outcome = h.pipeline.run(&h.caller, article()).await;

        assert_eq!(
            outcome,
            PipelineOutcome::Completed {
                content: "hello".to_string()
            }
        );
        let records = h.ledger.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, CreationKind::Article);
        assert_eq!(records[0].owner, h.caller);
        assert_eq!(h.store.usage_of(&h.caller), Some(4));
    }

    #[tokio::test]
    async fn exhausted_free_caller_is_denied_before_dispatch() {
        let h = harness(Tier::Free, 10);
        let request = GenerationRequest::BlogTitle {
            prompt: "x".to_string(),
        };

        let outcome = h.pipeline.run(&h.caller, request).await;

        assert_eq!(
            outcome,
            PipelineOutcome::Failed {
                stage: PipelineStage::Authorized,
                error: GenerationError::QuotaExceeded,
            }
        );
        assert_eq!(
            outcome.into_result().failure_reason.as_deref(),
            Some(QUOTA_EXCEEDED_MESSAGE)
        );
        assert_eq!(h.providers.calls(), 0);
        assert!(h.ledger.is_empty());
        assert_eq!(h.store.usage_of(&h.caller), Some(10));
    }

    #[tokio::test]
    async fn free_caller_gets_plan_message_for_images_whatever_the_counter() {
        for usage in [0, 10, 99] {
            let h = harness(Tier::Free, usage);
            let request = GenerationRequest::ImageSynthesis {
                prompt: "a crab".to_string(),
                publish: true,
            };

            let result = h.pipeline.run(&h.caller, request).await.into_result();

            assert!(!result.success);
            assert_eq!(result.failure_reason.as_deref(), Some(PLAN_RESTRICTED_MESSAGE));
            assert_eq!(h.providers.calls(), 0);
            assert_eq!(h.store.usage_of(&h.caller), Some(usage));
        }
    }

    #[tokio::test]
    async fn premium_background_removal_keeps_usage_at_zero_and_discards_upload() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(Tier::Premium, 6);
        let image = spooled(&dir, "photo.png");
        let path = image.path().to_path_buf();

        let outcome = h
            .pipeline
            .run(&h.caller, GenerationRequest::RemoveBackground { image })
            .await;

        assert_eq!(
            outcome,
            PipelineOutcome::Completed {
                content: "https://cdn.test/img.png".to_string()
            }
        );
        let records = h.ledger.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, CreationKind::Image);
        assert_eq!(h.store.usage_of(&h.caller), Some(0));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn premium_image_synthesis_records_publish_flag() {
        let h = harness(Tier::Premium, 0);
        let request = GenerationRequest::ImageSynthesis {
            prompt: "a crab".to_string(),
            publish: true,
        };

        let outcome = h.pipeline.run(&h.caller, request).await;

        assert!(matches!(outcome, PipelineOutcome::Completed { .. }));
        let records = h.ledger.records();
        assert!(records[0].publish);
        assert_eq!(records[0].prompt, "a crab");
        // Premium callers are never counted.
        assert_eq!(h.store.write_count(), 0);
    }

    //-------------------------------------------------------------------------------------
    // Failure paths
    //-------------------------------------------------------------------------------------

    #[tokio::test]
    async fn provider_failure_writes_nothing_and_discards_upload() {
        let dir = tempfile::tempdir().unwrap();
        let providers = ScriptedProviders::default();
        providers.fail.store(true, Ordering::SeqCst);
        let h = harness_with(Tier::Free, 2, providers);
        let image = spooled(&dir, "desk.png");
        let path = image.path().to_path_buf();

        let outcome = h
            .pipeline
            .run(
                &h.caller,
                GenerationRequest::RemoveObject {
                    image,
                    object: "cup".to_string(),
                },
            )
            .await;

        assert_eq!(
            outcome,
            PipelineOutcome::Failed {
                stage: PipelineStage::QuotaChecked,
                error: GenerationError::Provider("provider returned 503".to_string()),
            }
        );
        assert!(h.ledger.is_empty());
        assert_eq!(h.store.usage_of(&h.caller), Some(2));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn ledger_failure_consumes_no_quota() {
        let h = harness(Tier::Free, 5);
        h.ledger.fail_appends(true);

        let outcome = h.pipeline.run(&h.caller, article()).await;

        assert!(matches!(
            outcome,
            PipelineOutcome::Failed {
                stage: PipelineStage::Dispatched,
                error: GenerationError::Persistence(_),
            }
        ));
        assert_eq!(h.providers.calls(), 1);
        assert_eq!(h.store.usage_of(&h.caller), Some(5));
    }

    #[tokio::test]
    async fn failed_increment_still_returns_recorded_content() {
        let h = harness(Tier::Free, 1);
        h.store.fail_writes(true);

        let outcome = h.pipeline.run(&h.caller, article()).await;

        assert!(matches!(outcome, PipelineOutcome::Completed { .. }));
        assert_eq!(h.ledger.len(), 1);
        assert_eq!(h.store.usage_of(&h.caller), Some(1));
    }

    #[tokio::test]
    async fn denied_request_still_discards_upload() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(Tier::Free, 10);
        let resume = spooled(&dir, "cv.pdf");
        let path = resume.path().to_path_buf();

        let outcome = h
            .pipeline
            .run(&h.caller, GenerationRequest::ResumeReview { resume })
            .await;

        assert!(matches!(
            outcome,
            PipelineOutcome::Failed {
                error: GenerationError::QuotaExceeded,
                ..
            }
        ));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn oversized_resume_is_rejected_without_provider_call() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(Tier::Free, 0);
        let mut resume = spooled(&dir, "cv.pdf");
        resume.size = 6 * 1024 * 1024;
        let path = resume.path().to_path_buf();

        let outcome = h
            .pipeline
            .run(&h.caller, GenerationRequest::ResumeReview { resume })
            .await;

        assert!(matches!(
            outcome,
            PipelineOutcome::Failed {
                error: GenerationError::PayloadTooLarge { .. },
                ..
            }
        ));
        assert_eq!(h.providers.calls(), 0);
        assert!(h.ledger.is_empty());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn unknown_caller_is_unauthorized() {
        let h = harness(Tier::Free, 0);

        let outcome = h.pipeline.run(&CallerId::new("stranger"), article()).await;

        assert_eq!(
            outcome,
            PipelineOutcome::Failed {
                stage: PipelineStage::Received,
                error: GenerationError::Unauthorized,
            }
        );
        assert_eq!(h.providers.calls(), 0);
    }

    //-------------------------------------------------------------------------------------
    // Concurrency
    //-------------------------------------------------------------------------------------

    #[tokio::test]
    async fn concurrent_requests_from_one_caller_cannot_overrun_quota() {
        let h = harness_with(Tier::Free, 8, ScriptedProviders::slow(10));

        let runs = (0..5).map(|_| h.pipeline.run(&h.caller, article()));
        let outcomes = futures::future::join_all(runs).await;

        let completed = outcomes
            .iter()
            .filter(|o| matches!(o, PipelineOutcome::Completed { .. }))
            .count();
        assert_eq!(completed, 2);
        assert_eq!(h.ledger.len(), 2);
        assert_eq!(h.store.usage_of(&h.caller), Some(10));
        assert_eq!(h.pipeline.locks.tracked(), 0);
    }

    #[tokio::test]
    async fn premium_requests_from_one_caller_run_in_parallel() {
        let h = harness_with(Tier::Premium, 0, ScriptedProviders::slow(50));
        let title = || GenerationRequest::BlogTitle {
            prompt: "x".to_string(),
        };

        let runs = (0..4).map(|_| h.pipeline.run(&h.caller, title()));
        let outcomes = futures::future::join_all(runs).await;

        assert!(outcomes
            .iter()
            .all(|o| matches!(o, PipelineOutcome::Completed { .. })));
        assert_eq!(h.providers.peak(), 4);
        assert_eq!(h.pipeline.locks.tracked(), 0);
    }

    #[tokio::test]
    async fn free_requests_within_quota_do_not_wait_on_each_other() {
        let h = harness_with(Tier::Free, 0, ScriptedProviders::slow(50));

        let runs = (0..3).map(|_| h.pipeline.run(&h.caller, article()));
        let outcomes = futures::future::join_all(runs).await;

        assert!(outcomes
            .iter()
            .all(|o| matches!(o, PipelineOutcome::Completed { .. })));
        assert_eq!(h.providers.peak(), 3);
        assert_eq!(h.store.usage_of(&h.caller), Some(3));
    }

    //-------------------------------------------------------------------------------------
    // Cancellation
    //-------------------------------------------------------------------------------------

    #[tokio::test]
    async fn dropped_request_removes_upload_and_returns_its_reservation() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness_with(Tier::Free, 9, ScriptedProviders::slow(300));
        let resume = spooled(&dir, "cv.pdf");
        let path = resume.path().to_path_buf();

        let cancelled = tokio::time::timeout(
            Duration::from_millis(50),
            h.pipeline.run(&h.caller, GenerationRequest::ResumeReview { resume }),
        )
        .await;

        assert!(cancelled.is_err());
        assert!(!path.exists());
        assert!(h.ledger.is_empty());
        assert_eq!(h.store.usage_of(&h.caller), Some(9));
        assert_eq!(h.pipeline.locks.tracked(), 0);

        // The abandoned attempt did not use up the caller's last free generation.
        let outcome = h.pipeline.run(&h.caller, article()).await;
        assert!(matches!(outcome, PipelineOutcome::Completed { .. }));
        assert_eq!(h.store.usage_of(&h.caller), Some(10));
    }
}
