//! Controller builder: the declarative description of one endpoint.
//!
//! ```ignore
//! let spec = Controller::post("/transactions")
//!     .description("Record a transaction")
//!     .body(Schema::object().required("asset", Schema::string()))
//!     .exists(Bucket::Body, "asset", "wallet__assets")
//!     .status(201)
//!     .callback(|ctx| async move { create(ctx).await })?;
//! ```
//!
//! `.callback()` validates and freezes the declaration. The resulting
//! [`ControllerSpec`] is immutable and inert until it is mounted.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::context::RequestContext;
use crate::error::{ApiResult, Bucket, BuildError};
use crate::existence::{CollectionRef, ExistenceRule};
use crate::middleware::Middleware;
use crate::path::PathPattern;
use crate::reply::Reply;
use crate::schema::Schema;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Type-erased endpoint callback.
pub type Callback = Arc<dyn Fn(RequestContext) -> BoxFuture<'static, ApiResult<Reply>> + Send + Sync>;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }

    pub fn to_http(self) -> http::Method {
        match self {
            Method::Get => http::Method::GET,
            Method::Post => http::Method::POST,
            Method::Put => http::Method::PUT,
            Method::Patch => http::Method::PATCH,
            Method::Delete => http::Method::DELETE,
        }
    }
}

impl core::fmt::Display for Method {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human description, optionally per locale (`{"en": "...", "de": "..."}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Description {
    Text(String),
    Localized(BTreeMap<String, String>),
}

impl Default for Description {
    fn default() -> Self {
        Description::Text(String::new())
    }
}

/// Optional schema per input bucket. `None` means the bucket is passed
/// through unvalidated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputSchemas {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Schema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Schema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Schema>,
}

impl InputSchemas {
    pub fn get(&self, bucket: Bucket) -> Option<&Schema> {
        match bucket {
            Bucket::Query => self.query.as_ref(),
            Bucket::Body => self.body.as_ref(),
            Bucket::Params => self.params.as_ref(),
        }
    }

    fn slot(&mut self, bucket: Bucket) -> &mut Option<Schema> {
        match bucket {
            Bucket::Query => &mut self.query,
            Bucket::Body => &mut self.body,
            Bucket::Params => &mut self.params,
        }
    }

    /// Whether the bucket schema declares `field` as required. Unvalidated
    /// buckets require nothing.
    pub fn is_required(&self, bucket: Bucket, field: &str) -> bool {
        self.get(bucket)
            .and_then(Schema::as_object)
            .and_then(|obj| obj.field(field))
            .is_some_and(|f| f.required)
    }
}

/// Entry point of the builder.
#[derive(Debug)]
pub struct Controller;

impl Controller {
    pub fn new(method: Method, path: impl Into<String>) -> ControllerBuilder {
        ControllerBuilder {
            method,
            path: path.into(),
            description: Description::default(),
            inputs: InputSchemas::default(),
            response: Schema::Any,
            checks: Vec::new(),
            middlewares: Vec::new(),
            status: 200,
            downloadable: false,
            uploads: None,
        }
    }

    pub fn get(path: impl Into<String>) -> ControllerBuilder {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> ControllerBuilder {
        Self::new(Method::Post, path)
    }

    pub fn put(path: impl Into<String>) -> ControllerBuilder {
        Self::new(Method::Put, path)
    }

    pub fn patch(path: impl Into<String>) -> ControllerBuilder {
        Self::new(Method::Patch, path)
    }

    pub fn delete(path: impl Into<String>) -> ControllerBuilder {
        Self::new(Method::Delete, path)
    }
}

#[must_use = "a controller does nothing until `.callback()` finalizes it"]
pub struct ControllerBuilder {
    method: Method,
    path: String,
    description: Description,
    inputs: InputSchemas,
    response: Schema,
    checks: Vec<(Bucket, String, String)>,
    middlewares: Vec<Arc<dyn Middleware>>,
    status: u16,
    downloadable: bool,
    uploads: Option<usize>,
}

impl ControllerBuilder {
    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Description::Text(text.into());
        self
    }

    pub fn localized_description<I, L, T>(mut self, texts: I) -> Self
    where
        I: IntoIterator<Item = (L, T)>,
        L: Into<String>,
        T: Into<String>,
    {
        self.description = Description::Localized(
            texts
                .into_iter()
                .map(|(l, t)| (l.into(), t.into()))
                .collect(),
        );
        self
    }

    pub fn query(self, schema: Schema) -> Self {
        self.input(Bucket::Query, schema)
    }

    pub fn body(self, schema: Schema) -> Self {
        self.input(Bucket::Body, schema)
    }

    pub fn params(self, schema: Schema) -> Self {
        self.input(Bucket::Params, schema)
    }

    pub fn input(mut self, bucket: Bucket, schema: Schema) -> Self {
        *self.inputs.slot(bucket) = Some(schema);
        self
    }

    pub fn response(mut self, schema: Schema) -> Self {
        self.response = schema;
        self
    }

    /// Require `bucket.field` to reference an existing record.
    ///
    /// `collection` is a collection name, or `[name]` when the field holds an
    /// array of ids.
    pub fn exists(
        mut self,
        bucket: Bucket,
        field: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        self.checks.push((bucket, field.into(), collection.into()));
        self
    }

    pub fn middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn downloadable(mut self) -> Self {
        self.downloadable = true;
        self
    }

    /// Accept `multipart/form-data` with at most `max_files` file parts.
    pub fn uploads(mut self, max_files: usize) -> Self {
        self.uploads = Some(max_files);
        self
    }

    /// Finalize the declaration.
    pub fn callback<F, Fut>(self, f: F) -> Result<ControllerSpec, BuildError>
    where
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResult<Reply>> + Send + 'static,
    {
        let path = PathPattern::parse(&self.path)?;
        if path.has_wildcard() {
            return Err(BuildError::InvalidPath {
                path: self.path,
                reason: "wildcards are reserved for fallbacks".to_string(),
            });
        }

        for bucket in Bucket::ALL {
            if let Some(schema) = self.inputs.get(bucket) {
                if schema.as_object().is_none() {
                    return Err(BuildError::NonObjectBucket { bucket });
                }
            }
        }

        if self.uploads == Some(0) {
            return Err(BuildError::InvalidUploadLimit);
        }
        if !(200..=299).contains(&self.status) {
            return Err(BuildError::InvalidStatus(self.status));
        }

        let mut checks = Vec::with_capacity(self.checks.len());
        for (bucket, field, raw) in self.checks {
            let collection = CollectionRef::parse(&raw)?;
            if bucket == Bucket::Params && !path.has_param(&field) {
                return Err(BuildError::UnknownPathParam { field });
            }
            let declared = match self.inputs.get(bucket).and_then(Schema::as_object) {
                Some(obj) => obj.field(&field).is_some(),
                None => true,
            };
            if !declared {
                return Err(BuildError::UndeclaredExistenceField { bucket, field });
            }
            checks.push(ExistenceRule {
                bucket,
                field,
                collection,
            });
        }

        let callback: Callback =
            Arc::new(move |ctx| -> BoxFuture<'static, ApiResult<Reply>> { Box::pin(f(ctx)) });

        Ok(ControllerSpec {
            method: self.method,
            path,
            description: self.description,
            inputs: self.inputs,
            response: self.response,
            checks,
            middlewares: self.middlewares,
            status: self.status,
            downloadable: self.downloadable,
            uploads: self.uploads,
            callback,
        })
    }
}

/// A finalized endpoint declaration.
pub struct ControllerSpec {
    method: Method,
    path: PathPattern,
    description: Description,
    inputs: InputSchemas,
    response: Schema,
    checks: Vec<ExistenceRule>,
    middlewares: Vec<Arc<dyn Middleware>>,
    status: u16,
    downloadable: bool,
    uploads: Option<usize>,
    callback: Callback,
}

impl core::fmt::Debug for ControllerSpec {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ControllerSpec")
            .field("method", &self.method)
            .field("path", &self.path.to_string())
            .field("checks", &self.checks)
            .field("status", &self.status)
            .field("downloadable", &self.downloadable)
            .finish_non_exhaustive()
    }
}

impl ControllerSpec {
    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &PathPattern {
        &self.path
    }

    pub fn description(&self) -> &Description {
        &self.description
    }

    pub fn inputs(&self) -> &InputSchemas {
        &self.inputs
    }

    pub fn response(&self) -> &Schema {
        &self.response
    }

    pub fn existence_checks(&self) -> &[ExistenceRule] {
        &self.checks
    }

    pub fn middlewares(&self) -> &[Arc<dyn Middleware>] {
        &self.middlewares
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn is_downloadable(&self) -> bool {
        self.downloadable
    }

    pub fn upload_limit(&self) -> Option<usize> {
        self.uploads
    }

    pub fn callback(&self) -> &Callback {
        &self.callback
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::RequireAuth;

    async fn noop(_ctx: RequestContext) -> ApiResult<Reply> {
        Ok(Reply::empty())
    }

    #[test]
    fn finalizes_with_defaults() {
        let spec = Controller::get("/assets").callback(noop).unwrap();
        assert_eq!(spec.method(), Method::Get);
        assert_eq!(spec.path().to_string(), "/assets");
        assert_eq!(spec.status(), 200);
        assert!(!spec.is_downloadable());
        assert!(spec.inputs().body.is_none());
        assert_eq!(spec.response(), &Schema::Any);
    }

    #[test]
    fn success_status_must_be_2xx() {
        for status in [42, 199, 301, 404] {
            assert_eq!(
                Controller::get("/assets").status(status).callback(noop).unwrap_err(),
                BuildError::InvalidStatus(status)
            );
        }
        assert_eq!(Controller::post("/assets").status(204).callback(noop).unwrap().status(), 204);
    }

    #[test]
    fn keeps_rule_and_middleware_order() {
        let spec = Controller::post("/transactions")
            .body(
                Schema::object()
                    .required("asset", Schema::string())
                    .optional("related", Schema::array(Schema::string())),
            )
            .exists(Bucket::Body, "asset", "wallet__assets")
            .exists(Bucket::Body, "related", "[wallet__transactions]")
            .middleware(RequireAuth)
            .status(201)
            .callback(noop)
            .unwrap();

        let fields: Vec<_> = spec
            .existence_checks()
            .iter()
            .map(|r| (r.field.as_str(), r.collection.to_string()))
            .collect();
        assert_eq!(
            fields,
            vec![
                ("asset", "wallet__assets".to_string()),
                ("related", "[wallet__transactions]".to_string())
            ]
        );
        assert_eq!(spec.middlewares()[0].name(), "require_auth");
        assert_eq!(spec.status(), 201);
    }

    #[test]
    fn rejects_rules_on_undeclared_fields() {
        let err = Controller::post("/transactions")
            .body(Schema::object().required("amount", Schema::number()))
            .exists(Bucket::Body, "asset", "wallet__assets")
            .callback(noop)
            .unwrap_err();
        assert_eq!(
            err,
            BuildError::UndeclaredExistenceField {
                bucket: Bucket::Body,
                field: "asset".into()
            }
        );
    }

    #[test]
    fn rules_on_unvalidated_buckets_are_allowed() {
        assert!(Controller::post("/transactions")
            .exists(Bucket::Body, "asset", "wallet__assets")
            .callback(noop)
            .is_ok());
    }

    #[test]
    fn params_rules_must_name_a_path_parameter() {
        let err = Controller::get("/assets/:id")
            .exists(Bucket::Params, "asset", "wallet__assets")
            .callback(noop)
            .unwrap_err();
        assert_eq!(err, BuildError::UnknownPathParam { field: "asset".into() });

        assert!(Controller::get("/assets/:id")
            .exists(Bucket::Params, "id", "wallet__assets")
            .callback(noop)
            .is_ok());
    }

    #[test]
    fn rejects_bad_declarations() {
        assert!(matches!(
            Controller::get("assets").callback(noop),
            Err(BuildError::InvalidPath { .. })
        ));
        assert!(matches!(
            Controller::get("/*rest").callback(noop),
            Err(BuildError::InvalidPath { .. })
        ));
        assert!(matches!(
            Controller::post("/x").body(Schema::string()).callback(noop),
            Err(BuildError::NonObjectBucket { bucket: Bucket::Body })
        ));
        assert!(matches!(
            Controller::post("/x").exists(Bucket::Body, "a", "[oops").callback(noop),
            Err(BuildError::InvalidCollectionRef(_))
        ));
        assert_eq!(
            Controller::post("/x").uploads(0).callback(noop).unwrap_err(),
            BuildError::InvalidUploadLimit
        );
    }

    #[test]
    fn localized_description_serializes_as_map() {
        let spec = Controller::get("/")
            .localized_description([("en", "List"), ("de", "Liste")])
            .callback(noop)
            .unwrap();
        assert_eq!(
            serde_json::to_value(spec.description()).unwrap(),
            serde_json::json!({"de": "Liste", "en": "List"})
        );
    }
}
