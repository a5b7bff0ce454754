//! crates/creation_core/src/quota.rs
//!
//! The usage gate. A pure decision over a tier and a usage counter.

use crate::domain::Tier;

/// Number of free generations a caller gets before having to upgrade.
pub const DEFAULT_FREE_LIMIT: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaPolicy {
    pub free_limit: u32,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            free_limit: DEFAULT_FREE_LIMIT,
        }
    }
}

impl QuotaPolicy {
    pub fn new(free_limit: u32) -> Self {
        Self { free_limit }
    }

    /// Premium always passes; free passes while the spent usage plus `cost`
    /// stays within the limit.
    pub fn allow(&self, tier: Tier, free_usage: u32, cost: u32) -> bool {
        match tier {
            Tier::Premium => true,
            Tier::Free => free_usage.saturating_add(cost) <= self.free_limit,
        }
    }
}
