//! Error model shared by the builder, the composer and the request pipeline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used by request callbacks and the pipeline.
pub type ApiResult<T> = Result<T, ApiError>;

/// One of the three request input buckets.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    Query,
    Body,
    Params,
}

impl Bucket {
    pub const ALL: [Bucket; 3] = [Bucket::Query, Bucket::Body, Bucket::Params];

    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::Query => "query",
            Bucket::Body => "body",
            Bucket::Params => "params",
        }
    }
}

impl core::fmt::Display for Bucket {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Schema failure for a single field.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
#[error("invalid {bucket}.{field}: {message} ({constraint})")]
pub struct ValidationError {
    pub bucket: Bucket,
    /// Dotted/indexed path inside the bucket (`asset`, `items[2].id`). Empty
    /// when the bucket value itself is wrong.
    pub field: String,
    /// Machine-readable constraint name (`required`, `type`, `min_length`, ...).
    pub constraint: String,
    pub message: String,
}

/// Failure surfaced to HTTP callers.
///
/// Each variant maps onto exactly one status code; see [`ApiError::status`].
#[derive(Debug, Error)]
pub enum ApiError {
    /// Input did not satisfy the endpoint's schema.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// An existence check found no record for a referenced id.
    #[error("{bucket}.{field} references unknown id '{id}' in {collection}")]
    ReferenceNotFound {
        bucket: Bucket,
        field: String,
        collection: String,
        id: String,
    },

    /// Missing or rejected credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A callback-chosen, user-facing failure; propagated verbatim.
    #[error("{message}")]
    Client { status: u16, message: String },

    /// Anything else. Logged server-side, never shown to the caller.
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl ApiError {
    pub fn client(status: u16, message: impl Into<String>) -> Self {
        Self::Client {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::client(400, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::client(403, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::client(404, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn unexpected(err: impl Into<anyhow::Error>) -> Self {
        Self::Unexpected(err.into())
    }

    pub fn status(&self) -> u16 {
        match self {
            ApiError::Validation(_) => 400,
            ApiError::ReferenceNotFound { .. } => 404,
            ApiError::Unauthorized(_) => 401,
            ApiError::Client { status, .. } => *status,
            ApiError::Unexpected(_) => 500,
        }
    }

    /// Message safe to show to the caller.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Unexpected(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

/// Malformed controller declaration, detected when `.callback()` finalizes it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("{bucket} schema must be an object")]
    NonObjectBucket { bucket: Bucket },

    #[error("existence check on {bucket}.{field}: field is not declared in the {bucket} schema")]
    UndeclaredExistenceField { bucket: Bucket, field: String },

    #[error("existence check on params.{field}: path has no such parameter")]
    UnknownPathParam { field: String },

    #[error("invalid collection reference '{0}'")]
    InvalidCollectionRef(String),

    #[error("upload limit must be at least 1")]
    InvalidUploadLimit,

    #[error("success status {0} is outside 200..=299")]
    InvalidStatus(u16),
}

/// Namespace tree that cannot be flattened or mounted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ComposeError {
    #[error("invalid namespace key '{0}'")]
    InvalidKey(String),

    #[error("route key '{0}' is declared more than once")]
    KeyCollision(String),

    #[error("duplicate route {method} {path} ('{first}' and '{second}')")]
    DuplicateRoute {
        method: String,
        path: String,
        first: String,
        second: String,
    },

    #[error("root route '{key}' overlaps module base {base}")]
    ShadowedBase { key: String, base: String },

    #[error("routes '{first}' and '{second}' name the same path parameter differently ({first_path} vs {second_path})")]
    ConflictingParams {
        first: String,
        first_path: String,
        second: String,
        second_path: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_failure_kind() {
        let validation = ApiError::from(ValidationError {
            bucket: Bucket::Body,
            field: "asset".into(),
            constraint: "required".into(),
            message: "field is required".into(),
        });
        assert_eq!(validation.status(), 400);

        let missing = ApiError::ReferenceNotFound {
            bucket: Bucket::Body,
            field: "asset".into(),
            collection: "wallet__assets".into(),
            id: "x".into(),
        };
        assert_eq!(missing.status(), 404);
        assert!(missing.to_string().contains("wallet__assets"));

        assert_eq!(ApiError::unauthorized("nope").status(), 401);
        assert_eq!(ApiError::client(409, "taken").status(), 409);
        assert_eq!(ApiError::unexpected(anyhow::anyhow!("boom")).status(), 500);
    }

    #[test]
    fn unexpected_errors_do_not_leak() {
        let err = ApiError::unexpected(anyhow::anyhow!("db password is hunter2"));
        assert_eq!(err.public_message(), "internal server error");
    }
}
