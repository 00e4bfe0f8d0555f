//! Referential-integrity checks.
//!
//! A rule names an input field and the collection its value must exist in.
//! Rules run after schema validation and before the callback, one store
//! round-trip at a time, in declaration order: the first missing reference
//! wins and the callback never runs.

use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::context::Inputs;
use crate::controller::InputSchemas;
use crate::error::{ApiError, Bucket, BuildError, ValidationError};
use crate::store::Datastore;

/// Target collection of a rule. `[coll]` means the field holds an array of ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionRef {
    One(String),
    Many(String),
}

impl CollectionRef {
    pub fn parse(raw: &str) -> Result<Self, BuildError> {
        let invalid = || BuildError::InvalidCollectionRef(raw.to_string());
        let trimmed = raw.trim();
        let (name, many) = match trimmed.strip_prefix('[') {
            Some(inner) => (inner.strip_suffix(']').ok_or_else(invalid)?, true),
            None => (trimmed, false),
        };
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '-');
        if !valid {
            return Err(invalid());
        }
        Ok(if many {
            CollectionRef::Many(name.to_string())
        } else {
            CollectionRef::One(name.to_string())
        })
    }

    pub fn collection(&self) -> &str {
        match self {
            CollectionRef::One(c) | CollectionRef::Many(c) => c,
        }
    }

    pub fn is_many(&self) -> bool {
        matches!(self, CollectionRef::Many(_))
    }
}

impl core::fmt::Display for CollectionRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CollectionRef::One(c) => f.write_str(c),
            CollectionRef::Many(c) => write!(f, "[{c}]"),
        }
    }
}

impl Serialize for CollectionRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExistenceRule {
    pub bucket: Bucket,
    pub field: String,
    pub collection: CollectionRef,
}

/// Run every rule against validated inputs.
pub async fn check_references(
    rules: &[ExistenceRule],
    inputs: &Inputs,
    schemas: &InputSchemas,
    store: &dyn Datastore,
) -> Result<(), ApiError> {
    for rule in rules {
        let value = inputs.get(rule.bucket).get(&rule.field);
        let value = match value {
            None | Some(Value::Null) => {
                // Optionality comes from the bucket schema. Unvalidated buckets
                // are permissive: an absent field has nothing to check.
                if schemas.is_required(rule.bucket, &rule.field) {
                    return Err(invalid(rule, "required", "field is required"));
                }
                tracing::debug!(bucket = %rule.bucket, field = %rule.field, "reference absent, skipped");
                continue;
            }
            Some(v) => v,
        };

        match &rule.collection {
            CollectionRef::One(collection) => {
                let id = reference_id(value).ok_or_else(|| {
                    invalid(rule, "reference", "must be a string or integer id")
                })?;
                ensure_exists(rule, collection, &id, store).await?;
            }
            CollectionRef::Many(collection) => {
                let items = value
                    .as_array()
                    .ok_or_else(|| invalid(rule, "type", "must be an array of ids"))?;
                for item in items {
                    let id = reference_id(item).ok_or_else(|| {
                        invalid(rule, "reference", "every element must be a string or integer id")
                    })?;
                    ensure_exists(rule, collection, &id, store).await?;
                }
            }
        }
    }
    Ok(())
}

async fn ensure_exists(
    rule: &ExistenceRule,
    collection: &str,
    id: &str,
    store: &dyn Datastore,
) -> Result<(), ApiError> {
    let found = store.exists(collection, id).await.map_err(|e| {
        ApiError::unexpected(anyhow::Error::new(e).context(format!(
            "existence check {}.{} -> {collection}",
            rule.bucket, rule.field
        )))
    })?;
    if found {
        Ok(())
    } else {
        Err(ApiError::ReferenceNotFound {
            bucket: rule.bucket,
            field: rule.field.clone(),
            collection: collection.to_string(),
            id: id.to_string(),
        })
    }
}

fn reference_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
        _ => None,
    }
}

fn invalid(rule: &ExistenceRule, constraint: &str, message: &str) -> ApiError {
    ApiError::Validation(ValidationError {
        bucket: rule.bucket,
        field: rule.field.clone(),
        constraint: constraint.to_string(),
        message: message.to_string(),
    })
}
