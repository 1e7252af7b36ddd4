//! Installation access token exchange.
//!
//! An app JWT is exchanged for an installation access token via
//! `POST /app/installations/{installation_id}/access_tokens`. GitHub issues
//! these tokens with a one hour lifetime, so each installation's token is
//! cached and re-exchanged once it gets within [`REFRESH_MARGIN_SECS`] of
//! expiry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as SyncMutex};

use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use super::AuthError;
use crate::github::{ApiRequest, GitHubClient};
use crate::types::InstallationId;

/// Tokens this close to expiry are exchanged again.
pub const REFRESH_MARGIN_SECS: i64 = 300;

/// An installation access token.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct InstallationToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl InstallationToken {
    /// Returns true if the token can still be used at `now`.
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - TimeDelta::seconds(REFRESH_MARGIN_SECS) > now
    }
}

impl std::fmt::Debug for InstallationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallationToken")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// One installation's cached token. Locked for the duration of an exchange.
type TokenSlot = Arc<Mutex<Option<InstallationToken>>>;

/// Exchanges and caches installation tokens for one app.
///
/// Cloning is cheap; clones share the cache and the app client.
#[derive(Clone)]
pub struct InstallationTokens {
    app_client: GitHubClient,
    slots: Arc<SyncMutex<HashMap<InstallationId, TokenSlot>>>,
}

impl InstallationTokens {
    /// Creates a token cache that exchanges through `app_client`, which must
    /// authenticate with app JWTs.
    pub fn new(app_client: GitHubClient) -> Self {
        Self {
            app_client,
            slots: Arc::new(SyncMutex::new(HashMap::new())),
        }
    }

    /// Returns a usable token for `installation`, exchanging a new one if
    /// nothing fresh is cached.
    ///
    /// Each installation has its own lock, held across the exchange:
    /// concurrent callers for one installation never exchange twice, and a
    /// slow exchange never holds up callers for other installations.
    pub async fn token(&self, installation: InstallationId) -> Result<String, AuthError> {
        let slot = self.slot(installation);
        let mut cached = slot.lock().await;

        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh_at(Utc::now())) {
            return Ok(token.token.clone());
        }

        let fresh = self.exchange(installation).await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }

    /// Drops any cached token for `installation`.
    pub async fn invalidate(&self, installation: InstallationId) {
        let slot = self
            .slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&installation)
            .cloned();
        if let Some(slot) = slot {
            *slot.lock().await = None;
        }
    }

    fn slot(&self, installation: InstallationId) -> TokenSlot {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(slots.entry(installation).or_default())
    }

    async fn exchange(&self, installation: InstallationId) -> Result<InstallationToken, AuthError> {
        debug!(installation = %installation, "Exchanging app token for installation token");

        let request = ApiRequest::post("/app/installations/{installation_id}/access_tokens")
            .param("installation_id", installation.0);

        let response = self
            .app_client
            .request(request)
            .await
            .map_err(|e| AuthError::Exchange(Box::new(e)))?;

        serde_json::from_value(response.data)
            .map_err(|e| AuthError::InvalidTokenResponse(e.to_string()))
    }
}

impl std::fmt::Debug for InstallationTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallationTokens").finish_non_exhaustive()
    }
}
