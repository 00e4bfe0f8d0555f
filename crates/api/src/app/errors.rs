use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::{Value, json};

use routeforge_core::ApiError;

/// Success envelope: `{state: "success", data}`.
pub fn success(status: StatusCode, data: Value) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "state": "success",
            "data": data,
        })),
    )
        .into_response()
}

/// Error envelope: `{state: "error", message, details?}`.
pub fn json_error(
    status: StatusCode,
    message: impl Into<String>,
    details: Option<Value>,
) -> axum::response::Response {
    let mut body = json!({
        "state": "error",
        "message": message.into(),
    });
    if let Some(details) = details {
        body["details"] = details;
    }
    (status, axum::Json(body)).into_response()
}

pub fn api_error_to_response(err: &ApiError) -> axum::response::Response {
    let status = StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let details = match err {
        ApiError::Validation(v) => Some(json!({
            "bucket": v.bucket,
            "field": v.field,
            "constraint": v.constraint,
        })),
        ApiError::ReferenceNotFound {
            bucket,
            field,
            collection,
            id,
        } => Some(json!({
            "bucket": bucket,
            "field": field,
            "collection": collection,
            "id": id,
        })),
        ApiError::Unexpected(inner) => {
            let chain = format!("{inner:#}");
            tracing::error!(error = %chain, "unexpected error");
            None
        }
        ApiError::Unauthorized(_) | ApiError::Client { .. } => None,
    };

    json_error(status, err.public_message(), details)
}

pub fn not_found() -> axum::response::Response {
    json_error(StatusCode::NOT_FOUND, "no route matches this request", None)
}
