//! Per-request context handed to middlewares and callbacks.
//!
//! A `RequestContext` is constructed fresh for every HTTP call and dropped
//! once the response is produced; nothing in it outlives the request except
//! the shared handles it borrows (datastore, capabilities).

use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, Method, Uri};
use serde::de::DeserializeOwned;
use serde_json::Value;

use routeforge_auth::Principal;

use crate::error::{ApiError, Bucket, ValidationError};
use crate::store::Datastore;

/// The three input buckets. After validation they hold normalized values.
#[derive(Debug, Clone, PartialEq)]
pub struct Inputs {
    pub query: Value,
    pub body: Value,
    pub params: Value,
}

impl Default for Inputs {
    fn default() -> Self {
        Self {
            query: Value::Object(Default::default()),
            body: Value::Null,
            params: Value::Object(Default::default()),
        }
    }
}

impl Inputs {
    pub fn get(&self, bucket: Bucket) -> &Value {
        match bucket {
            Bucket::Query => &self.query,
            Bucket::Body => &self.body,
            Bucket::Params => &self.params,
        }
    }

    pub fn set(&mut self, bucket: Bucket, value: Value) {
        match bucket {
            Bucket::Query => self.query = value,
            Bucket::Body => self.body = value,
            Bucket::Params => self.params = value,
        }
    }
}

/// One file part of a `multipart/form-data` upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    pub field: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// Raw request line and headers, for callbacks that need more than the
/// validated inputs.
#[derive(Debug, Clone)]
pub struct RawRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
}

impl RawRequest {
    /// Whether the body arrived as `multipart/form-data`.
    pub fn is_multipart(&self) -> bool {
        self.headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.trim_start().starts_with("multipart/form-data"))
    }
}

/// Typed set of shared capability objects (privileged sessions, clients).
///
/// Built once at boot; cloning is cheap.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    inner: Arc<http::Extensions>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<T: Clone + Send + Sync + 'static>(mut self, value: T) -> Self {
        Arc::make_mut(&mut self.inner).insert(value);
        self
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.inner.get::<T>()
    }
}

pub struct RequestContext {
    pub inputs: Inputs,
    pub files: Vec<UploadedFile>,
    pub request: RawRequest,
    pub principal: Option<Principal>,
    pub request_id: String,
    pub route_key: String,
    store: Arc<dyn Datastore>,
    capabilities: Capabilities,
}

impl core::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RequestContext")
            .field("route_key", &self.route_key)
            .field("request_id", &self.request_id)
            .field("inputs", &self.inputs)
            .field("files", &self.files.len())
            .field("principal", &self.principal)
            .finish_non_exhaustive()
    }
}

impl RequestContext {
    pub fn new(
        route_key: impl Into<String>,
        request: RawRequest,
        store: Arc<dyn Datastore>,
        capabilities: Capabilities,
    ) -> Self {
        Self {
            inputs: Inputs::default(),
            files: Vec::new(),
            request,
            principal: None,
            request_id: String::new(),
            route_key: route_key.into(),
            store,
            capabilities,
        }
    }

    pub fn store(&self) -> &dyn Datastore {
        self.store.as_ref()
    }

    pub fn store_handle(&self) -> Arc<dyn Datastore> {
        self.store.clone()
    }

    pub fn capability<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.capabilities.get::<T>()
    }

    /// The authenticated principal, or a 401.
    pub fn principal(&self) -> Result<&Principal, ApiError> {
        self.principal
            .as_ref()
            .ok_or_else(|| ApiError::unauthorized("authentication required"))
    }

    /// A path parameter as text.
    pub fn param(&self, name: &str) -> Option<String> {
        match self.inputs.params.get(name)? {
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn query_as<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        decode(Bucket::Query, &self.inputs.query)
    }

    pub fn body_as<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        decode(Bucket::Body, &self.inputs.body)
    }

    pub fn params_as<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        decode(Bucket::Params, &self.inputs.params)
    }

    /// First uploaded file for a form field.
    pub fn file(&self, field: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|f| f.field == field)
    }
}

fn decode<T: DeserializeOwned>(bucket: Bucket, value: &Value) -> Result<T, ApiError> {
    T::deserialize(value).map_err(|e| {
        ApiError::Validation(ValidationError {
            bucket,
            field: String::new(),
            constraint: "shape".to_string(),
            message: e.to_string(),
        })
    })
}
