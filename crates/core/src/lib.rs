//! `routeforge-core`: controller specs, the request pipeline and route composition.
//!
//! This crate has **no HTTP server** in it. It describes endpoints
//! ([`ControllerSpec`]), runs requests through them ([`pipeline::execute`]),
//! and flattens namespace trees into routes and manifests. Mounting onto a
//! live router happens in `routeforge-api`.

pub mod context;
pub mod controller;
pub mod error;
pub mod existence;
pub mod manifest;
pub mod middleware;
pub mod path;
pub mod pipeline;
pub mod reply;
pub mod schema;
pub mod store;
pub mod tree;

#[cfg(test)]
mod testing;

pub use context::{Capabilities, Inputs, RawRequest, RequestContext, UploadedFile};
pub use controller::{Controller, ControllerBuilder, ControllerSpec, Description, InputSchemas, Method};
pub use error::{ApiError, ApiResult, Bucket, BuildError, ComposeError, ValidationError};
pub use existence::{CollectionRef, ExistenceRule};
pub use manifest::{Drift, Manifest, ManifestMismatch, RouteDescriptor, RouteMetadata, compose_manifest, verify_manifest};
pub use middleware::{Middleware, RequireAuth, RequireRole};
pub use path::{CompiledPattern, PathPattern, Segment};
pub use reply::{Download, Reply};
pub use schema::{Coercion, Field, ObjectSchema, Schema};
pub use store::{Datastore, StoreError};
pub use tree::{FlatRoute, FlatRoutes, Namespace, RouterNode};
