use std::sync::Arc;

use axum::{Extension, http::StatusCode, response::Response};
use serde_json::json;

use routeforge_core::Manifest;

use crate::app::errors::{json_error, success};

pub async fn health() -> Response {
    success(StatusCode::OK, json!({ "status": "ok" }))
}

/// The introspected manifest of every module route.
pub async fn manifest(Extension(manifest): Extension<Arc<Manifest>>) -> Response {
    match serde_json::to_value(&*manifest) {
        Ok(routes) => success(StatusCode::OK, routes),
        Err(err) => {
            tracing::error!(error = %err, "manifest serialization failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal server error", None)
        }
    }
}
