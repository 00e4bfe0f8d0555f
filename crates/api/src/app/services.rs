//! Infrastructure wiring: datastore selection and capability objects.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use routeforge_auth::{AuthError, PrivilegedSession, SessionGrant, SessionRefresher};
use routeforge_core::Datastore;
use routeforge_core::context::Capabilities;
use routeforge_infra::{InMemoryDatastore, PostgresDatastore, ServerConfig};

use crate::app::BootError;

/// Lifetime of self-issued service grants.
pub const SERVICE_GRANT_TTL_MINUTES: i64 = 15;

/// Refresh this long before a service grant expires.
pub const SERVICE_GRANT_SKEW_SECONDS: i64 = 30;

/// Postgres when `DATABASE_URL` is set, in-memory otherwise.
pub async fn build_store(config: &ServerConfig) -> Result<Arc<dyn Datastore>, BootError> {
    match &config.database_url {
        Some(url) => {
            let store = PostgresDatastore::connect(url).await?;
            store.migrate().await?;
            tracing::info!("using postgres datastore");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory datastore");
            Ok(Arc::new(InMemoryDatastore::new()))
        }
    }
}

/// Issues opaque service tokens for in-process privileged work.
#[derive(Debug, Clone)]
pub struct ServiceTokenRefresher {
    ttl: Duration,
}

impl ServiceTokenRefresher {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }
}

#[async_trait]
impl SessionRefresher for ServiceTokenRefresher {
    async fn refresh(&self) -> Result<SessionGrant, AuthError> {
        let issued_at = Utc::now();
        Ok(SessionGrant {
            token: format!("svc-{}", Uuid::now_v7()),
            issued_at,
            expires_at: issued_at + self.ttl,
        })
    }
}

/// Capabilities every module callback can ask for.
pub fn build_capabilities() -> Capabilities {
    let session = PrivilegedSession::new(
        Arc::new(ServiceTokenRefresher::new(Duration::minutes(SERVICE_GRANT_TTL_MINUTES))),
        Duration::seconds(SERVICE_GRANT_SKEW_SECONDS),
    );
    Capabilities::new().with(Arc::new(session))
}
