//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: infrastructure wiring (datastore, capabilities)
//! - `system.rs`: routes that are not module endpoints (`/health`, `/__manifest`)
//! - `errors.rs`: response envelopes

use std::sync::Arc;

use axum::{Extension, Router, extract::DefaultBodyLimit, routing::get};
use thiserror::Error;
use tower::ServiceBuilder;

use routeforge_auth::SessionResolver;
use routeforge_core::context::Capabilities;
use routeforge_core::{BuildError, ComposeError, Datastore, ManifestMismatch, Namespace, StoreError, compose_manifest};
use routeforge_infra::ServerConfig;

use crate::introspect;
use crate::loader::{DiscoveryError, LoadReport, ModuleCatalog, load_from_dir};
use crate::middleware;
use crate::mount::{MountState, MountedRouter};

pub mod errors;
pub mod services;
pub mod system;

/// Anything that stops the server from booting.
#[derive(Debug, Error)]
pub enum BootError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Compose(#[from] ComposeError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Manifest(#[from] ManifestMismatch),

    #[error("datastore unavailable: {0}")]
    Store(#[from] StoreError),
}

/// Shared handles the router is built around.
#[derive(Clone)]
pub struct AppServices {
    pub store: Arc<dyn Datastore>,
    pub resolver: Arc<dyn SessionResolver>,
    pub capabilities: Capabilities,
    pub body_limit: usize,
}

/// Modules linked into this binary.
pub fn catalog() -> ModuleCatalog {
    ModuleCatalog::new().register("routeforge", "wallet", routeforge_wallet::server)
}

/// Mount `tree`, check the live routes against the composed manifest, and
/// add the system routes.
pub fn build_app(services: AppServices, tree: &Namespace) -> Result<Router, BootError> {
    let expected = compose_manifest(tree)?;

    let state = MountState::new(services.store, services.capabilities, services.body_limit);
    let mounted = MountedRouter::new(state).mount(tree)?;
    let manifest = Arc::new(introspect::verify(&mounted, &expected)?);
    tracing::info!(routes = manifest.len(), "routes mounted");

    let auth_state = middleware::AuthState {
        resolver: services.resolver,
    };

    let router = mounted
        .system_route("/health", get(system::health))?
        .system_route("/__manifest", get(system::manifest))?
        .with_fallback()
        .into_router()
        .layer(
            ServiceBuilder::new()
                .layer(Extension(manifest))
                .layer(DefaultBodyLimit::max(services.body_limit)),
        )
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));
    Ok(router)
}

/// Full boot sequence: datastore, modules, router.
pub async fn boot(config: &ServerConfig, catalog: &ModuleCatalog) -> Result<(Router, LoadReport), BootError> {
    let store = services::build_store(config).await?;

    let mut report = load_from_dir(&config.modules_dir, catalog, &config.first_party_vendor)?;
    tracing::info!(
        loaded = report.loaded.len(),
        failed = report.failures.len(),
        "modules loaded"
    );

    let services = AppServices {
        store,
        resolver: Arc::new(config.tokens.clone()),
        capabilities: services::build_capabilities(),
        body_limit: config.body_limit_bytes,
    };
    let tree = std::mem::take(&mut report.tree);
    let router = build_app(services, &tree)?;
    report.tree = tree;
    Ok((router, report))
}
