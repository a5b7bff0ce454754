//! crates/creation_core/src/recorder.rs

use crate::domain::{CallerId, CreationRecord, Generated, NewCreation};
use crate::error::GenerationError;
use crate::ports::CreationLedger;
use std::sync::Arc;
use tracing::{error, info};

/// Writes completed generations to the append-only ledger.
#[derive(Clone)]
pub struct ArtifactRecorder {
    ledger: Arc<dyn CreationLedger>,
}

impl ArtifactRecorder {
    pub fn new(ledger: Arc<dyn CreationLedger>) -> Self {
        Self { ledger }
    }

    pub async fn record(
        &self,
        owner: &CallerId,
        generated: Generated,
    ) -> Result<CreationRecord, GenerationError> {
        let creation = NewCreation {
            owner: owner.clone(),
            prompt: generated.prompt,
            content: generated.content,
            kind: generated.kind,
            publish: generated.publish,
        };

        let record = self.ledger.append(creation).await.map_err(|e| {
            error!(%owner, error = %e, "Failed to append creation");
            GenerationError::Persistence(e.to_string())
        })?;

        info!(%owner, creation_id = %record.id, kind = record.kind.as_str(), "Creation recorded");
        Ok(record)
    }
}
