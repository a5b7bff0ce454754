//! services/api/src/adapters/clerk.rs
//!
//! This module contains the adapter for the Clerk Backend API.
//! It implements both the `IdentityService` port (session verification) and the
//! `EntitlementStore` port (plan and free usage kept in a user's private metadata).

use crate::adapters::http::{ensure_success, transport_error};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use creation_core::domain::{CallerId, Entitlement, Tier};
use creation_core::ports::{EntitlementStore, IdentityService, PortError, PortResult};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

//=========================================================================================
// Clerk Payloads
//=========================================================================================

/// The claims of a Clerk session token we rely on.
#[derive(Deserialize)]
struct SessionClaims {
    sid: String,
    sub: String,
}

#[derive(Deserialize)]
struct ClerkSession {
    user_id: String,
    status: String,
}

#[derive(Deserialize)]
struct ClerkUser {
    #[serde(default)]
    private_metadata: Option<PrivateMetadata>,
}

#[derive(Deserialize, Default)]
struct PrivateMetadata {
    plan: Option<String>,
    free_usage: Option<u32>,
}

impl PrivateMetadata {
    fn to_domain(&self) -> Entitlement {
        let tier = match self.plan.as_deref() {
            Some("premium") => Tier::Premium,
            _ => Tier::Free,
        };
        Entitlement {
            tier,
            free_usage: self.free_usage.unwrap_or(0),
        }
    }
}

/// Reads the claims segment of a session token without trusting it; the session
/// is verified against Clerk afterwards.
fn session_claims(token: &str) -> PortResult<SessionClaims> {
    let payload = token.split('.').nth(1).ok_or(PortError::Unauthorized)?;
    let decoded = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|_| PortError::Unauthorized)?;
    serde_json::from_slice(&decoded).map_err(|_| PortError::Unauthorized)
}

/// A 401/403 on a user lookup means our secret key was refused, not the caller.
fn backend_fault(err: PortError) -> PortError {
    match err {
        PortError::Unauthorized => {
            PortError::Unexpected("Clerk rejected the backend secret key".to_string())
        }
        other => other,
    }
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the identity and entitlement ports using Clerk.
#[derive(Clone)]
pub struct ClerkAdapter {
    http: reqwest::Client,
    api_url: String,
    secret_key: String,
}

impl ClerkAdapter {
    /// Creates a new `ClerkAdapter`.
    pub fn new(http: reqwest::Client, api_url: String, secret_key: String) -> Self {
        Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            secret_key,
        }
    }

    fn user_url(&self, caller: &CallerId) -> String {
        format!("{}/users/{}", self.api_url, caller)
    }
}

//=========================================================================================
// `IdentityService` Trait Implementation
//=========================================================================================

#[async_trait]
impl IdentityService for ClerkAdapter {
    async fn resolve_session(&self, token: &str) -> PortResult<CallerId> {
        let claims = session_claims(token)?;

        let response = self
            .http
            .post(format!("{}/sessions/{}/verify", self.api_url, claims.sid))
            .bearer_auth(&self.secret_key)
            .json(&json!({ "token": token }))
            .send()
            .await
            .map_err(|e| transport_error("Clerk", e))?;

        // Clerk answers 4xx for expired, revoked or forged sessions.
        if response.status().is_client_error() {
            debug!(status = %response.status(), "Clerk rejected session");
            return Err(PortError::Unauthorized);
        }
        let session: ClerkSession = ensure_success("Clerk", response)
            .await?
            .json()
            .await
            .map_err(|e| PortError::Unexpected(format!("Unreadable Clerk session: {}", e)))?;

        if session.status != "active" || session.user_id != claims.sub {
            return Err(PortError::Unauthorized);
        }
        Ok(CallerId::new(session.user_id))
    }
}

//=========================================================================================
// `EntitlementStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl EntitlementStore for ClerkAdapter {
    async fn load_entitlement(&self, caller: &CallerId) -> PortResult<Entitlement> {
        let response = self
            .http
            .get(self.user_url(caller))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| transport_error("Clerk", e))?;

        let user: ClerkUser = ensure_success("Clerk", response)
            .await
            .map_err(backend_fault)?
            .json()
            .await
            .map_err(|e| PortError::Unexpected(format!("Unreadable Clerk user: {}", e)))?;

        Ok(user.private_metadata.unwrap_or_default().to_domain())
    }

    async fn store_free_usage(&self, caller: &CallerId, free_usage: u32) -> PortResult<()> {
        // The metadata endpoint deep-merges, so other private keys (the plan) survive.
        let response = self
            .http
            .patch(format!("{}/metadata", self.user_url(caller)))
            .bearer_auth(&self.secret_key)
            .json(&json!({ "private_metadata": { "free_usage": free_usage } }))
            .send()
            .await
            .map_err(|e| transport_error("Clerk", e))?;

        ensure_success("Clerk", response).await.map_err(backend_fault)?;
        Ok(())
    }
}
