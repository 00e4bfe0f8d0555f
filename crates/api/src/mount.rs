//! Mounting adapter: binds flattened controller specs onto an axum router.
//!
//! axum does not expose its routing table, so [`MountedRouter`] records its
//! own live layer stack while registering routes. The stack mirrors what was
//! handed to axum: one sub-router layer per module base path, one route layer
//! per spec (its handler chain ending in the route's metadata), and the
//! fallback. The introspector reads routes back from this stack.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::{FromRequest, FromRequestParts, Multipart, Query, RawPathParams, Request},
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{MethodFilter, MethodRouter, on},
};
use serde_json::{Map, Value};
use tracing::Instrument;
use uuid::Uuid;

use routeforge_auth::Principal;
use routeforge_core::context::{Capabilities, RawRequest, RequestContext, UploadedFile};
use routeforge_core::{
    ApiError, ApiResult, BuildError, CompiledPattern, ComposeError, ControllerSpec, Datastore,
    Method, Namespace, PathPattern, Reply, RouteMetadata, pipeline,
};

use crate::app::errors;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Shared handles every mounted route needs.
#[derive(Clone)]
pub struct MountState {
    pub store: Arc<dyn Datastore>,
    pub capabilities: Capabilities,
    pub body_limit: usize,
}

impl MountState {
    pub fn new(store: Arc<dyn Datastore>, capabilities: Capabilities, body_limit: usize) -> Self {
        Self {
            store,
            capabilities,
            body_limit,
        }
    }
}

/// One entry of a router's live stack.
#[derive(Debug, Clone)]
pub enum Layer {
    /// Nested sub-router under a compiled prefix.
    Router {
        pattern: CompiledPattern,
        stack: Vec<Layer>,
    },
    Route {
        /// `None` for system routes registered with their own method router.
        method: Option<Method>,
        pattern: CompiledPattern,
        handlers: Vec<HandlerTag>,
    },
    Fallback,
}

#[derive(Debug, Clone)]
pub enum HandlerTag {
    Middleware(String),
    /// The handler that runs the request; carries metadata for spec routes.
    Terminal(Option<Arc<RouteMetadata>>),
}

pub struct MountedRouter {
    router: Router,
    stack: Vec<Layer>,
    state: MountState,
}

impl MountedRouter {
    pub fn new(state: MountState) -> Self {
        Self {
            router: Router::new(),
            stack: Vec::new(),
            state,
        }
    }

    /// Bind every route of `tree`: one sub-router per module base, routes in
    /// flatten order.
    ///
    /// A tree is mounted once; mounting overlapping trees on the same router
    /// is rejected by axum.
    pub fn mount(mut self, tree: &Namespace) -> Result<Self, ComposeError> {
        let flat = tree.flatten()?;
        for (base, routes) in flat.by_base() {
            let mut sub = Router::new();
            let mut stack = Vec::with_capacity(routes.len());

            for route in routes {
                let metadata = Arc::new(RouteMetadata::from_route(route));
                let pattern = route.spec.path().compile();
                sub = sub.route(
                    pattern.as_str(),
                    self.endpoint(route.spec.clone(), Arc::from(route.key.as_str())),
                );

                let mut handlers: Vec<HandlerTag> = route
                    .spec
                    .middlewares()
                    .iter()
                    .map(|m| HandlerTag::Middleware(m.name().to_string()))
                    .collect();
                handlers.push(HandlerTag::Terminal(Some(metadata)));
                stack.push(Layer::Route {
                    method: Some(route.spec.method()),
                    pattern,
                    handlers,
                });

                tracing::debug!(
                    key = %route.key,
                    method = %route.spec.method(),
                    path = %route.full_path(),
                    "mounted route"
                );
            }

            if base.is_root() {
                self.router = self.router.merge(sub);
                self.stack.extend(stack);
            } else {
                let pattern = base.compile();
                self.router = self.router.nest(pattern.as_str(), sub);
                self.stack.push(Layer::Router { pattern, stack });
            }
        }
        Ok(self)
    }

    /// Register a route that is not described by a controller spec (health,
    /// manifest). It never appears in the introspected manifest.
    pub fn system_route(mut self, path: &str, handler: MethodRouter) -> Result<Self, BuildError> {
        let pattern = PathPattern::parse(path)?.compile();
        self.router = self.router.route(pattern.as_str(), handler);
        self.stack.push(Layer::Route {
            method: None,
            pattern,
            handlers: vec![HandlerTag::Terminal(None)],
        });
        Ok(self)
    }

    /// Install the catch-all JSON 404.
    pub fn with_fallback(mut self) -> Self {
        self.router = self.router.fallback(fallback);
        self.stack.push(Layer::Fallback);
        self
    }

    pub fn layers(&self) -> &[Layer] {
        &self.stack
    }

    pub fn into_router(self) -> Router {
        self.router
    }

    fn endpoint(&self, spec: Arc<ControllerSpec>, key: Arc<str>) -> MethodRouter {
        let state = self.state.clone();
        on(method_filter(spec.method()), move |req: Request| {
            let spec = spec.clone();
            let key = key.clone();
            let state = state.clone();
            async move { dispatch(spec, key, state, req).await }
        })
    }
}

fn method_filter(method: Method) -> MethodFilter {
    match method {
        Method::Get => MethodFilter::GET,
        Method::Post => MethodFilter::POST,
        Method::Put => MethodFilter::PUT,
        Method::Patch => MethodFilter::PATCH,
        Method::Delete => MethodFilter::DELETE,
    }
}

async fn fallback() -> Response {
    errors::not_found()
}

async fn dispatch(spec: Arc<ControllerSpec>, key: Arc<str>, state: MountState, req: Request) -> Response {
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::now_v7().to_string());
    let span = routeforge_observability::request_span(&key, spec.method().as_str(), &request_id);

    async move {
        let outcome = match build_context(&spec, &key, &state, req).await {
            Ok(mut ctx) => {
                ctx.request_id = request_id;
                pipeline::execute(&spec, ctx).await
            }
            Err(err) => Err(err),
        };
        render(&spec, outcome)
    }
    .instrument(span)
    .await
}

async fn build_context(
    spec: &ControllerSpec,
    key: &str,
    state: &MountState,
    req: Request,
) -> ApiResult<RequestContext> {
    let (mut parts, body) = req.into_parts();

    let raw_params = RawPathParams::from_request_parts(&mut parts, &())
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))?;
    let mut params = Map::new();
    for (name, value) in &raw_params {
        params.insert(name.to_string(), Value::String(value.to_string()));
    }

    let query = query_object(&parts.uri)?;
    let principal = parts.extensions.get::<Principal>().cloned();
    let request = RawRequest {
        method: parts.method.clone(),
        uri: parts.uri.clone(),
        headers: parts.headers.clone(),
    };

    let (body, files) = match (spec.upload_limit(), request.is_multipart()) {
        (Some(max_files), true) => read_multipart(Request::from_parts(parts, body), max_files).await?,
        (None, true) => return Err(ApiError::client(415, "this endpoint does not accept uploads")),
        (_, false) => (read_json(body, state.body_limit).await?, Vec::new()),
    };

    let mut ctx = RequestContext::new(key, request, state.store.clone(), state.capabilities.clone());
    ctx.inputs.query = query;
    ctx.inputs.body = body;
    ctx.inputs.params = Value::Object(params);
    ctx.files = files;
    ctx.principal = principal;
    Ok(ctx)
}

/// Query string as a JSON object of strings; repeated keys become arrays.
fn query_object(uri: &Uri) -> ApiResult<Value> {
    let Query(pairs) = Query::<Vec<(String, String)>>::try_from_uri(uri)
        .map_err(|e| ApiError::bad_request(e.body_text()))?;

    let mut map = Map::new();
    for (k, v) in pairs {
        match map.get_mut(&k) {
            Some(Value::Array(items)) => items.push(Value::String(v)),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, Value::String(v)]);
            }
            None => {
                map.insert(k, Value::String(v));
            }
        }
    }
    Ok(Value::Object(map))
}

async fn read_json(body: Body, limit: usize) -> ApiResult<Value> {
    let bytes = axum::body::to_bytes(body, limit)
        .await
        .map_err(|_| ApiError::client(413, format!("request body exceeds {limit} bytes")))?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&bytes).map_err(|e| ApiError::bad_request(format!("malformed JSON body: {e}")))
}

async fn read_multipart(req: Request, max_files: usize) -> ApiResult<(Value, Vec<UploadedFile>)> {
    let mut multipart = Multipart::from_request(req, &())
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))?;

    let mut fields = Map::new();
    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::client(e.status().as_u16(), e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);

        if file_name.is_some() {
            if files.len() == max_files {
                return Err(ApiError::bad_request(format!(
                    "at most {max_files} file(s) may be uploaded"
                )));
            }
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::client(e.status().as_u16(), e.body_text()))?;
            files.push(UploadedFile {
                field: name,
                file_name,
                content_type,
                bytes,
            });
        } else {
            let text = field
                .text()
                .await
                .map_err(|e| ApiError::client(e.status().as_u16(), e.body_text()))?;
            fields.insert(name, Value::String(text));
        }
    }
    Ok((Value::Object(fields), files))
}

fn render(spec: &ControllerSpec, outcome: ApiResult<Reply>) -> Response {
    let status = StatusCode::from_u16(spec.status()).unwrap_or(StatusCode::OK);
    match outcome {
        Ok(Reply::Data(data)) => errors::success(status, data),
        Ok(Reply::File(download)) => (status, download.headers, download.bytes).into_response(),
        Err(err) => errors::api_error_to_response(&err),
    }
}
