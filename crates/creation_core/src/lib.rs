pub mod capability;
pub mod domain;
pub mod entitlement;
pub mod error;
pub mod memory;
pub mod pipeline;
pub mod ports;
pub mod quota;
pub mod recorder;

pub use capability::{CapabilityDispatcher, DispatchSettings, Providers};
pub use domain::{
    AssetTransform, CallerId, CreationKind, CreationRecord, Entitlement, Generated,
    GenerationRequest, GenerationResult, NewCreation, OperationKind, ResolvedCaller, StoredAsset,
    Tier, TransientFile,
};
pub use error::GenerationError;
pub use pipeline::{PipelineOutcome, PipelineStage, RequestPipeline};
pub use ports::{
    AssetStorageService, CreationLedger, DocumentTextExtractor, EntitlementStore, IdentityService,
    ImageSynthesisService, PortError, PortResult, TextCompletionService,
};
pub use quota::QuotaPolicy;
