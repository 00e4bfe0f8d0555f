//! Time-boxed privileged sessions.
//!
//! Some module callbacks need to act with elevated rights (e.g. a service
//! account talking to the datastore). Instead of caching such a session in a
//! process-wide singleton, a [`PrivilegedSession`] is constructed at boot and
//! handed to requests through their capability set. It owns its refresh
//! policy: a grant is reused until it is within `refresh_skew` of expiry.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::AuthError;

/// A credential with an explicit validity window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionGrant {
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionGrant {
    /// Usable at `now` and not within `skew` of expiry.
    pub fn is_fresh(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        validate_window(self.issued_at, self.expires_at, now).is_ok() && now + skew < self.expires_at
    }
}

/// Deterministically validate a validity window against `now`.
pub fn validate_window(
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), AuthError> {
    if expires_at <= issued_at {
        return Err(AuthError::InvalidWindow);
    }
    if now < issued_at {
        return Err(AuthError::NotYetValid);
    }
    if now >= expires_at {
        return Err(AuthError::Expired);
    }
    Ok(())
}

/// Obtains a fresh grant (login against an identity provider, token exchange, ...).
#[async_trait]
pub trait SessionRefresher: Send + Sync {
    async fn refresh(&self) -> Result<SessionGrant, AuthError>;
}

/// Explicitly passed, explicitly time-boxed privileged session.
pub struct PrivilegedSession {
    refresher: Arc<dyn SessionRefresher>,
    refresh_skew: Duration,
    current: Mutex<Option<SessionGrant>>,
}

impl core::fmt::Debug for PrivilegedSession {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PrivilegedSession")
            .field("refresh_skew", &self.refresh_skew)
            .finish_non_exhaustive()
    }
}

impl PrivilegedSession {
    pub fn new(refresher: Arc<dyn SessionRefresher>, refresh_skew: Duration) -> Self {
        Self {
            refresher,
            refresh_skew,
            current: Mutex::new(None),
        }
    }

    pub async fn grant(&self) -> Result<SessionGrant, AuthError> {
        self.grant_at(Utc::now()).await
    }

    /// Return the cached grant, refreshing it first when it is stale.
    ///
    /// Concurrent callers serialize on the refresh; only one refresh runs.
    pub async fn grant_at(&self, now: DateTime<Utc>) -> Result<SessionGrant, AuthError> {
        let mut current = self.current.lock().await;
        if let Some(grant) = current.as_ref() {
            if grant.is_fresh(now, self.refresh_skew) {
                return Ok(grant.clone());
            }
        }

        tracing::debug!("refreshing privileged session");
        let grant = self.refresher.refresh().await.map_err(|e| {
            tracing::warn!(error = %e, "privileged session refresh failed");
            e
        })?;
        // Issuers stamp `issued_at` after `now` was taken.
        validate_window(grant.issued_at, grant.expires_at, now.max(grant.issued_at))?;
        *current = Some(grant.clone());
        Ok(grant)
    }

    /// Drop the cached grant so the next call refreshes.
    pub async fn invalidate(&self) {
        *self.current.lock().await = None;
    }
}
