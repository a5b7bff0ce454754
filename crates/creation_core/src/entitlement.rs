//! crates/creation_core/src/entitlement.rs
//!
//! Reading and writing the caller's entitlement metadata.
//!
//! `EntitlementResolver` is not pure: a premium caller's stale counter is reset
//! to zero while it is being read, so an upgrade never leaves a caller blocked.

use crate::domain::{CallerId, ResolvedCaller, Tier};
use crate::error::GenerationError;
use crate::ports::EntitlementStore;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone)]
pub struct EntitlementResolver {
    store: Arc<dyn EntitlementStore>,
}

impl EntitlementResolver {
    pub fn new(store: Arc<dyn EntitlementStore>) -> Self {
        Self { store }
    }

    pub async fn resolve(&self, caller: &CallerId) -> Result<ResolvedCaller, GenerationError> {
        let entitlement = self
            .store
            .load_entitlement(caller)
            .await
            .map_err(GenerationError::entitlement)?;

        let free_usage = match entitlement.tier {
            Tier::Premium => {
                if entitlement.free_usage != 0 {
                    info!(%caller, stale_usage = entitlement.free_usage, "Resetting usage for premium caller");
                    self.store
                        .store_free_usage(caller, 0)
                        .await
                        .map_err(GenerationError::entitlement)?;
                }
                0
            }
            Tier::Free => entitlement.free_usage,
        };

        debug!(%caller, tier = entitlement.tier.as_str(), free_usage, "Resolved entitlement");
        Ok(ResolvedCaller {
            caller: caller.clone(),
            tier: entitlement.tier,
            free_usage,
        })
    }
}

#[derive(Clone)]
pub struct UsageAccountant {
    store: Arc<dyn EntitlementStore>,
}

impl UsageAccountant {
    pub fn new(store: Arc<dyn EntitlementStore>) -> Self {
        Self { store }
    }

    /// Counts one generation against a free caller by rewriting the stored counter
    /// plus one. Callers serialize this per caller.
    pub async fn increment(&self, caller: &CallerId) -> Result<u32, GenerationError> {
        let current = self
            .store
            .load_entitlement(caller)
            .await
            .map_err(|e| GenerationError::EntitlementStore(e.to_string()))?;
        let next = current.free_usage.saturating_add(1);
        self.store
            .store_free_usage(caller, next)
            .await
            .map_err(|e| GenerationError::EntitlementStore(e.to_string()))?;
        debug!(%caller, free_usage = next, "Usage incremented");
        Ok(next)
    }
}
