//! crates/creation_core/src/memory.rs
//!
//! In-process implementations of the identity, entitlement and ledger ports.
//! Used by the test suites and for running the service without external accounts.

use crate::domain::{CallerId, CreationRecord, Entitlement, NewCreation, Tier};
use crate::ports::{CreationLedger, EntitlementStore, IdentityService, PortError, PortResult};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

//=========================================================================================
// Identity
//=========================================================================================

/// Maps fixed session tokens to callers.
#[derive(Default)]
pub struct InMemoryIdentity {
    sessions: Mutex<HashMap<String, CallerId>>,
}

impl InMemoryIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self, token: impl Into<String>, caller: CallerId) {
        lock(&self.sessions).insert(token.into(), caller);
    }
}

#[async_trait]
impl IdentityService for InMemoryIdentity {
    async fn resolve_session(&self, token: &str) -> PortResult<CallerId> {
        lock(&self.sessions)
            .get(token)
            .cloned()
            .ok_or(PortError::Unauthorized)
    }
}

//=========================================================================================
// Entitlements
//=========================================================================================

#[derive(Default)]
pub struct InMemoryEntitlementStore {
    entitlements: Mutex<HashMap<CallerId, Entitlement>>,
    writes: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl InMemoryEntitlementStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, caller: &CallerId, tier: Tier, free_usage: u32) {
        lock(&self.entitlements).insert(caller.clone(), Entitlement { tier, free_usage });
    }

    pub fn usage_of(&self, caller: &CallerId) -> Option<u32> {
        lock(&self.entitlements).get(caller).map(|e| e.free_usage)
    }

    /// Number of successful counter writes since creation.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl EntitlementStore for InMemoryEntitlementStore {
    async fn load_entitlement(&self, caller: &CallerId) -> PortResult<Entitlement> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("entitlement store unreachable".to_string()));
        }
        lock(&self.entitlements)
            .get(caller)
            .copied()
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", caller)))
    }

    async fn store_free_usage(&self, caller: &CallerId, free_usage: u32) -> PortResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("entitlement store unreachable".to_string()));
        }
        let mut entitlements = lock(&self.entitlements);
        let entry = entitlements
            .get_mut(caller)
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", caller)))?;
        entry.free_usage = free_usage;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

//=========================================================================================
// Ledger
//=========================================================================================

#[derive(Default)]
pub struct InMemoryLedger {
    records: Mutex<Vec<CreationRecord>>,
    fail_appends: AtomicBool,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<CreationRecord> {
        lock(&self.records).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl CreationLedger for InMemoryLedger {
    async fn append(&self, creation: NewCreation) -> PortResult<CreationRecord> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("ledger unavailable".to_string()));
        }
        let record = CreationRecord {
            id: Uuid::new_v4(),
            owner: creation.owner,
            prompt: creation.prompt,
            content: creation.content,
            kind: creation.kind,
            publish: creation.publish,
            created_at: Utc::now(),
        };
        lock(&self.records).push(record.clone());
        Ok(record)
    }
}
