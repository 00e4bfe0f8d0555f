//! Callback results.

use bytes::Bytes;
use http::header::{CONTENT_DISPOSITION, CONTENT_TYPE, HeaderName, HeaderValue};
use http::HeaderMap;
use serde::Serialize;
use serde_json::Value;

use crate::error::ApiError;

/// What a callback produced.
///
/// `Data` is wrapped in the `{state, data}` envelope by the HTTP layer;
/// `File` is streamed as-is and is only valid for downloadable endpoints.
#[derive(Debug, Clone)]
pub enum Reply {
    Data(Value),
    File(Download),
}

impl Reply {
    pub fn data<T: Serialize>(value: &T) -> Result<Self, ApiError> {
        serde_json::to_value(value)
            .map(Reply::Data)
            .map_err(ApiError::unexpected)
    }

    pub fn json(value: Value) -> Self {
        Reply::Data(value)
    }

    pub fn empty() -> Self {
        Reply::Data(Value::Null)
    }
}

impl From<Download> for Reply {
    fn from(value: Download) -> Self {
        Reply::File(value)
    }
}

/// Raw bytes plus response headers.
#[derive(Debug, Clone)]
pub struct Download {
    pub bytes: Bytes,
    pub headers: HeaderMap,
}

impl Download {
    pub fn new(bytes: impl Into<Bytes>, content_type: &str) -> Self {
        let mut headers = HeaderMap::new();
        let content_type = HeaderValue::from_str(content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
        headers.insert(CONTENT_TYPE, content_type);
        Self {
            bytes: bytes.into(),
            headers,
        }
    }

    /// Mark as an attachment. Quotes and control characters are dropped from
    /// the name.
    pub fn attachment(mut self, file_name: &str) -> Self {
        let safe: String = file_name
            .chars()
            .filter(|c| !c.is_control() && *c != '"' && *c != '\\')
            .collect();
        if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{safe}\"")) {
            self.headers.insert(CONTENT_DISPOSITION, value);
        }
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}
