//! Route introspection: rebuild the manifest from a live mounted router.
//!
//! The layer stack is recorded by the same loop that registers routes with
//! axum, so [`verify`] catches drift between the composed tree and what was
//! mounted, not whether axum's matcher can reach every route. Conflicts the
//! matcher would reject (duplicate shapes, differently named parameters at
//! one position) are refused earlier by [`Namespace::flatten`].
//!
//! [`Namespace::flatten`]: routeforge_core::Namespace::flatten

use routeforge_core::{Manifest, ManifestMismatch, PathPattern, RouteDescriptor, verify_manifest};

use crate::mount::{HandlerTag, Layer, MountedRouter};

/// Every spec-backed route reachable on `router`, in registration order.
///
/// Fallbacks, wildcard routes, and routes whose terminal handler carries no
/// metadata are skipped.
pub fn introspect(router: &MountedRouter) -> Manifest {
    let mut routes = Vec::new();
    walk(router.layers(), &PathPattern::root(), &mut routes);
    Manifest::new(routes)
}

/// Introspect `router` and check it against the composed manifest.
pub fn verify(router: &MountedRouter, expected: &Manifest) -> Result<Manifest, ManifestMismatch> {
    let live = introspect(router);
    verify_manifest(expected, &live)?;
    Ok(live)
}

fn walk(layers: &[Layer], prefix: &PathPattern, out: &mut Vec<RouteDescriptor>) {
    for layer in layers {
        match layer {
            Layer::Router { pattern, stack } => match pattern.decode() {
                Ok(fragment) => walk(stack, &prefix.join(&fragment), out),
                Err(err) => {
                    tracing::debug!(pattern = pattern.as_str(), error = %err, "skipping undecodable router prefix")
                }
            },
            Layer::Route {
                pattern, handlers, ..
            } => {
                let decoded = match pattern.decode() {
                    Ok(p) => p,
                    Err(err) => {
                        tracing::debug!(pattern = pattern.as_str(), error = %err, "skipping undecodable route");
                        continue;
                    }
                };
                if decoded.has_wildcard() {
                    tracing::debug!(pattern = pattern.as_str(), "skipping wildcard route");
                    continue;
                }
                match handlers.last() {
                    Some(HandlerTag::Terminal(Some(metadata))) => out.push(metadata.describe(prefix)),
                    _ => tracing::debug!(pattern = pattern.as_str(), "skipping route without metadata"),
                }
            }
            Layer::Fallback => {}
        }
    }
}
