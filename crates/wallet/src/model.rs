use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use routeforge_core::{ApiError, ApiResult, Schema, StoreError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub name: String,
    pub decimals: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub asset: String,
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default)]
    pub related: Vec<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt: Option<ReceiptInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptInfo {
    pub file_name: String,
    pub content_type: String,
    pub size: usize,
}

/// Receipt file as stored; `data` is base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredReceipt {
    #[serde(flatten)]
    pub info: ReceiptInfo,
    pub data: String,
}

pub fn asset_schema() -> Schema {
    Schema::object()
        .required("id", Schema::string())
        .required("name", Schema::string())
        .required("decimals", Schema::integer())
        .required("created_at", Schema::string())
}

pub fn receipt_schema() -> Schema {
    Schema::object()
        .required("file_name", Schema::string())
        .required("content_type", Schema::string())
        .required("size", Schema::integer().min(0))
}

pub fn transaction_schema() -> Schema {
    Schema::object()
        .required("id", Schema::string())
        .required("asset", Schema::string())
        .required("amount", Schema::number())
        .optional("note", Schema::string())
        .required("related", Schema::array(Schema::string()))
        .required("created_by", Schema::string())
        .required("created_at", Schema::string())
        .optional("receipt", receipt_schema())
}

pub(crate) fn to_record<T: Serialize>(value: &T) -> ApiResult<Value> {
    serde_json::to_value(value).map_err(ApiError::unexpected)
}

pub(crate) fn from_record<T: DeserializeOwned>(value: Value) -> ApiResult<T> {
    serde_json::from_value(value).map_err(ApiError::unexpected)
}

pub(crate) fn store_error(err: StoreError) -> ApiError {
    match err {
        StoreError::AlreadyExists { collection, id } => {
            ApiError::client(409, format!("'{id}' already exists in {collection}"))
        }
        other => ApiError::unexpected(other),
    }
}
