//! Route manifest: the machine-readable description of the API surface.
//!
//! The composer emits the expected manifest straight from the namespace tree.
//! The mounting adapter attaches a [`RouteMetadata`] to every live route, and
//! the introspector rebuilds a manifest from those. Both must agree;
//! [`verify_manifest`] reports every difference.

use serde::Serialize;
use thiserror::Error;

use crate::controller::{Description, Method};
use crate::error::ComposeError;
use crate::path::PathPattern;
use crate::schema::Schema;
use crate::tree::{FlatRoute, Namespace};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaSet {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<Schema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Schema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Schema>,
    pub response: Schema,
}

/// One manifest entry; everything a typed client needs to call the route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteDescriptor {
    pub key: String,
    pub method: Method,
    pub path: String,
    pub description: Description,
    pub status: u16,
    pub downloadable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploads: Option<usize>,
    pub schema: SchemaSet,
}

/// Metadata carried by a mounted route's terminal handler. The path is
/// relative to the sub-router the route is mounted on.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteMetadata {
    pub key: String,
    pub method: Method,
    pub path: PathPattern,
    pub description: Description,
    pub status: u16,
    pub downloadable: bool,
    pub uploads: Option<usize>,
    pub schema: SchemaSet,
}

impl RouteMetadata {
    pub fn from_route(route: &FlatRoute) -> Self {
        let spec = &route.spec;
        Self {
            key: route.key.clone(),
            method: spec.method(),
            path: spec.path().clone(),
            description: spec.description().clone(),
            status: spec.status(),
            downloadable: spec.is_downloadable(),
            uploads: spec.upload_limit(),
            schema: SchemaSet {
                query: spec.inputs().query.clone(),
                body: spec.inputs().body.clone(),
                params: spec.inputs().params.clone(),
                response: spec.response().clone(),
            },
        }
    }

    /// Descriptor for this route mounted under `prefix`.
    pub fn describe(&self, prefix: &PathPattern) -> RouteDescriptor {
        RouteDescriptor {
            key: self.key.clone(),
            method: self.method,
            path: prefix.join(&self.path).to_string(),
            description: self.description.clone(),
            status: self.status,
            downloadable: self.downloadable,
            uploads: self.uploads,
            schema: self.schema.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Manifest {
    routes: Vec<RouteDescriptor>,
}

impl Manifest {
    pub fn new(routes: Vec<RouteDescriptor>) -> Self {
        Self { routes }
    }

    pub fn routes(&self) -> &[RouteDescriptor] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&RouteDescriptor> {
        self.routes.iter().find(|r| r.key == key)
    }

    /// Differences between `self` (expected) and `live`.
    pub fn drift(&self, live: &Manifest) -> Vec<Drift> {
        let mut drifts = Vec::new();
        for expected in &self.routes {
            match live.get(&expected.key) {
                None => drifts.push(Drift::Missing(expected.key.clone())),
                Some(actual) if actual != expected => {
                    drifts.push(Drift::Changed(expected.key.clone()))
                }
                Some(_) => {}
            }
        }
        for actual in &live.routes {
            if self.get(&actual.key).is_none() {
                drifts.push(Drift::Unexpected(actual.key.clone()));
            }
        }
        if drifts.is_empty() && self != live {
            drifts.push(Drift::Reordered);
        }
        drifts
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Drift {
    /// Declared but not reachable on the live router.
    Missing(String),
    /// Reachable but not declared.
    Unexpected(String),
    /// Present in both with different metadata.
    Changed(String),
    /// Same entries, different registration order.
    Reordered,
}

impl core::fmt::Display for Drift {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Drift::Missing(key) => write!(f, "missing {key}"),
            Drift::Unexpected(key) => write!(f, "unexpected {key}"),
            Drift::Changed(key) => write!(f, "changed {key}"),
            Drift::Reordered => f.write_str("registration order differs"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("live routes do not match the composed manifest: {}", .drifts.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "))]
pub struct ManifestMismatch {
    pub drifts: Vec<Drift>,
}

/// Expected manifest, in mount order (routes grouped by base path).
pub fn compose_manifest(tree: &Namespace) -> Result<Manifest, ComposeError> {
    let flat = tree.flatten()?;
    let routes = flat
        .by_base()
        .into_iter()
        .flat_map(|(base, routes)| {
            routes
                .into_iter()
                .map(move |r| RouteMetadata::from_route(r).describe(&base))
        })
        .collect();
    Ok(Manifest { routes })
}

pub fn verify_manifest(expected: &Manifest, live: &Manifest) -> Result<(), ManifestMismatch> {
    let drifts = expected.drift(live);
    if drifts.is_empty() {
        Ok(())
    } else {
        Err(ManifestMismatch { drifts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use crate::controller::Controller;
    use crate::error::{ApiResult, Bucket};
    use crate::reply::Reply;
    use serde_json::json;

    async fn noop(_ctx: RequestContext) -> ApiResult<Reply> {
        Ok(Reply::empty())
    }

    fn tree() -> Namespace {
        Namespace::new()
            .route(
                "health",
                Controller::get("/ping").description("Ping").callback(noop).unwrap(),
            )
            .nest(
                "wallet",
                Namespace::new().nest(
                    "transactions",
                    Namespace::new().route(
                        "create",
                        Controller::post("/transactions")
                            .description("Create")
                            .body(Schema::object().required("asset", Schema::string()))
                            .exists(Bucket::Body, "asset", "wallet__assets")
                            .status(201)
                            .callback(noop)
                            .unwrap(),
                    ),
                ),
            )
    }

    #[test]
    fn composes_descriptors_with_full_paths() {
        let manifest = compose_manifest(&tree()).unwrap();
        assert_eq!(manifest.len(), 2);

        let create = manifest.get("wallet.transactions.create").unwrap();
        assert_eq!(create.method, Method::Post);
        assert_eq!(create.path, "/wallet/transactions");
        assert_eq!(create.status, 201);

        let json = serde_json::to_value(create).unwrap();
        assert_eq!(json["schema"]["body"]["fields"][0]["name"], "asset");
        assert_eq!(json["schema"]["response"], json!({"type": "any"}));
        assert!(json["schema"].get("query").is_none());

        assert_eq!(manifest.get("health").unwrap().path, "/ping");
    }

    #[test]
    fn drift_detection() {
        let expected = compose_manifest(&tree()).unwrap();
        assert!(verify_manifest(&expected, &expected.clone()).is_ok());

        let mut routes = expected.routes().to_vec();
        routes[1].status = 200;
        routes.remove(0);
        routes.push(RouteDescriptor {
            key: "ghost".into(),
            ..routes[0].clone()
        });
        let err = verify_manifest(&expected, &Manifest::new(routes)).unwrap_err();
        assert_eq!(
            err.drifts,
            vec![
                Drift::Missing("health".into()),
                Drift::Changed("wallet.transactions.create".into()),
                Drift::Unexpected("ghost".into()),
            ]
        );

        let mut reversed = expected.routes().to_vec();
        reversed.reverse();
        assert_eq!(
            expected.drift(&Manifest::new(reversed)),
            vec![Drift::Reordered]
        );
    }
}
