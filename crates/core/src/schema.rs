//! Declarative input schemas.
//!
//! A [`Schema`] is both a validator and a serializable description: the same
//! value that checks a request body is published in the route manifest, so
//! typed clients see exactly the constraints the server enforces.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Schema {
    Any,
    String(StringRules),
    Integer(IntegerRules),
    Number(NumberRules),
    Boolean,
    Array(ArrayRules),
    Object(ObjectSchema),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StringRules {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub one_of: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegerRules {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NumberRules {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayRules {
    pub items: Box<Schema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_items: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectSchema {
    pub fields: Vec<Field>,
    /// Reject unknown keys instead of stripping them.
    #[serde(default)]
    pub strict: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub required: bool,
    pub schema: Schema,
}

impl ObjectSchema {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// How scalar values are read.
///
/// Path parameters and query strings only carry text, so they are coerced
/// into the declared scalar type; JSON bodies are taken as-is.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Coercion {
    Strict,
    FromStrings,
}

/// A single constraint failure, located by a path inside the validated value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub path: String,
    pub constraint: &'static str,
    pub message: String,
}

impl Schema {
    pub fn any() -> Self {
        Schema::Any
    }

    pub fn string() -> Self {
        Schema::String(StringRules::default())
    }

    pub fn integer() -> Self {
        Schema::Integer(IntegerRules::default())
    }

    pub fn number() -> Self {
        Schema::Number(NumberRules::default())
    }

    pub fn boolean() -> Self {
        Schema::Boolean
    }

    pub fn array(items: Schema) -> Self {
        Schema::Array(ArrayRules {
            items: Box::new(items),
            min_items: None,
            max_items: None,
        })
    }

    pub fn object() -> Self {
        Schema::Object(ObjectSchema::default())
    }

    pub fn min_length(mut self, n: usize) -> Self {
        if let Schema::String(rules) = &mut self {
            rules.min_length = Some(n);
        }
        self
    }

    pub fn max_length(mut self, n: usize) -> Self {
        if let Schema::String(rules) = &mut self {
            rules.max_length = Some(n);
        }
        self
    }

    pub fn one_of<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Schema::String(rules) = &mut self {
            rules.one_of = Some(values.into_iter().map(Into::into).collect());
        }
        self
    }

    /// Lower bound for integers and numbers.
    pub fn min(mut self, n: i64) -> Self {
        match &mut self {
            Schema::Integer(rules) => rules.minimum = Some(n),
            Schema::Number(rules) => rules.minimum = Some(n as f64),
            _ => {}
        }
        self
    }

    /// Upper bound for integers and numbers.
    pub fn max(mut self, n: i64) -> Self {
        match &mut self {
            Schema::Integer(rules) => rules.maximum = Some(n),
            Schema::Number(rules) => rules.maximum = Some(n as f64),
            _ => {}
        }
        self
    }

    pub fn min_items(mut self, n: usize) -> Self {
        if let Schema::Array(rules) = &mut self {
            rules.min_items = Some(n);
        }
        self
    }

    pub fn max_items(mut self, n: usize) -> Self {
        if let Schema::Array(rules) = &mut self {
            rules.max_items = Some(n);
        }
        self
    }

    pub fn required(self, name: impl Into<String>, schema: Schema) -> Self {
        self.with_field(name.into(), schema, true)
    }

    pub fn optional(self, name: impl Into<String>, schema: Schema) -> Self {
        self.with_field(name.into(), schema, false)
    }

    pub fn strict(mut self) -> Self {
        if let Schema::Object(obj) = &mut self {
            obj.strict = true;
        }
        self
    }

    fn with_field(mut self, name: String, schema: Schema, required: bool) -> Self {
        if let Schema::Object(obj) = &mut self {
            obj.fields.retain(|f| f.name != name);
            obj.fields.push(Field {
                name,
                required,
                schema,
            });
        }
        self
    }

    pub fn as_object(&self) -> Option<&ObjectSchema> {
        match self {
            Schema::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Validate `value`, returning the normalized value (coerced scalars,
    /// unknown keys stripped).
    pub fn validate(&self, value: &Value, coercion: Coercion) -> Result<Value, Violation> {
        self.check(value, coercion, "")
    }

    fn check(&self, value: &Value, coercion: Coercion, path: &str) -> Result<Value, Violation> {
        match self {
            Schema::Any => Ok(value.clone()),
            Schema::String(rules) => check_string(rules, value, path),
            Schema::Integer(rules) => check_integer(rules, value, coercion, path),
            Schema::Number(rules) => check_number(rules, value, coercion, path),
            Schema::Boolean => check_boolean(value, coercion, path),
            Schema::Array(rules) => check_array(rules, value, coercion, path),
            Schema::Object(obj) => check_object(obj, value, coercion, path),
        }
    }
}

fn violation(path: &str, constraint: &'static str, message: impl Into<String>) -> Violation {
    Violation {
        path: path.to_string(),
        constraint,
        message: message.into(),
    }
}

fn type_error(path: &str, expected: &str, found: &Value) -> Violation {
    violation(
        path,
        "type",
        format!("expected {expected}, found {}", type_name(found)),
    )
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn check_string(rules: &StringRules, value: &Value, path: &str) -> Result<Value, Violation> {
    let s = value.as_str().ok_or_else(|| type_error(path, "string", value))?;
    let len = s.chars().count();
    if let Some(min) = rules.min_length {
        if len < min {
            return Err(violation(
                path,
                "min_length",
                format!("must be at least {min} characters"),
            ));
        }
    }
    if let Some(max) = rules.max_length {
        if len > max {
            return Err(violation(
                path,
                "max_length",
                format!("must be at most {max} characters"),
            ));
        }
    }
    if let Some(allowed) = &rules.one_of {
        if !allowed.iter().any(|a| a == s) {
            return Err(violation(
                path,
                "one_of",
                format!("must be one of: {}", allowed.join(", ")),
            ));
        }
    }
    Ok(value.clone())
}

fn check_integer(
    rules: &IntegerRules,
    value: &Value,
    coercion: Coercion,
    path: &str,
) -> Result<Value, Violation> {
    let n = match (value, coercion) {
        (Value::Number(n), _) => n.as_i64(),
        (Value::String(s), Coercion::FromStrings) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
    .ok_or_else(|| type_error(path, "integer", value))?;

    if let Some(min) = rules.minimum {
        if n < min {
            return Err(violation(path, "minimum", format!("must be >= {min}")));
        }
    }
    if let Some(max) = rules.maximum {
        if n > max {
            return Err(violation(path, "maximum", format!("must be <= {max}")));
        }
    }
    Ok(Value::from(n))
}

fn check_number(
    rules: &NumberRules,
    value: &Value,
    coercion: Coercion,
    path: &str,
) -> Result<Value, Violation> {
    let n = match (value, coercion) {
        (Value::Number(n), _) => n.as_f64(),
        (Value::String(s), Coercion::FromStrings) => {
            s.trim().parse::<f64>().ok().filter(|n| n.is_finite())
        }
        _ => None,
    }
    .ok_or_else(|| type_error(path, "number", value))?;

    if let Some(min) = rules.minimum {
        if n < min {
            return Err(violation(path, "minimum", format!("must be >= {min}")));
        }
    }
    if let Some(max) = rules.maximum {
        if n > max {
            return Err(violation(path, "maximum", format!("must be <= {max}")));
        }
    }

    match value {
        Value::Number(_) => Ok(value.clone()),
        _ => serde_json::Number::from_f64(n)
            .map(Value::Number)
            .ok_or_else(|| type_error(path, "number", value)),
    }
}

fn check_boolean(value: &Value, coercion: Coercion, path: &str) -> Result<Value, Violation> {
    match (value, coercion) {
        (Value::Bool(_), _) => Ok(value.clone()),
        (Value::String(s), Coercion::FromStrings) => match s.as_str() {
            "true" | "1" => Ok(Value::Bool(true)),
            "false" | "0" => Ok(Value::Bool(false)),
            _ => Err(type_error(path, "boolean", value)),
        },
        _ => Err(type_error(path, "boolean", value)),
    }
}

fn check_array(
    rules: &ArrayRules,
    value: &Value,
    coercion: Coercion,
    path: &str,
) -> Result<Value, Violation> {
    // `?tag=a` arrives as a single string, `?tag=a&tag=b` as an array.
    let single;
    let items = match (value, coercion) {
        (Value::Array(items), _) => items.as_slice(),
        (Value::String(_), Coercion::FromStrings) => {
            single = [value.clone()];
            &single[..]
        }
        _ => return Err(type_error(path, "array", value)),
    };

    if let Some(min) = rules.min_items {
        if items.len() < min {
            return Err(violation(
                path,
                "min_items",
                format!("must contain at least {min} items"),
            ));
        }
    }
    if let Some(max) = rules.max_items {
        if items.len() > max {
            return Err(violation(
                path,
                "max_items",
                format!("must contain at most {max} items"),
            ));
        }
    }

    items
        .iter()
        .enumerate()
        .map(|(i, item)| rules.items.check(item, coercion, &format!("{path}[{i}]")))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

fn check_object(
    obj: &ObjectSchema,
    value: &Value,
    coercion: Coercion,
    path: &str,
) -> Result<Value, Violation> {
    let map = value
        .as_object()
        .ok_or_else(|| type_error(path, "object", value))?;

    let child = |name: &str| {
        if path.is_empty() {
            name.to_string()
        } else {
            format!("{path}.{name}")
        }
    };

    if obj.strict {
        if let Some(unknown) = map.keys().find(|k| obj.field(k).is_none()) {
            return Err(violation(&child(unknown), "unknown_field", "unknown field"));
        }
    }

    let mut out = Map::new();
    for field in &obj.fields {
        match map.get(&field.name) {
            None | Some(Value::Null) => {
                if field.required {
                    return Err(violation(&child(&field.name), "required", "field is required"));
                }
            }
            Some(v) => {
                let normalized = field.schema.check(v, coercion, &child(&field.name))?;
                out.insert(field.name.clone(), normalized);
            }
        }
    }
    Ok(Value::Object(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn transaction_body() -> Schema {
        Schema::object()
            .required("asset", Schema::string().min_length(1))
            .required("amount", Schema::number().min(0))
            .optional("note", Schema::string().max_length(5))
            .optional("related", Schema::array(Schema::string()).max_items(2))
    }

    #[test]
    fn accepts_valid_body_and_strips_unknown_fields() {
        let out = transaction_body()
            .validate(
                &json!({"asset": "btc", "amount": 1.5, "extra": true}),
                Coercion::Strict,
            )
            .unwrap();
        assert_eq!(out, json!({"asset": "btc", "amount": 1.5}));
    }

    #[test]
    fn reports_path_and_constraint() {
        let err = transaction_body()
            .validate(&json!({"amount": 1}), Coercion::Strict)
            .unwrap_err();
        assert_eq!(err.path, "asset");
        assert_eq!(err.constraint, "required");

        let err = transaction_body()
            .validate(
                &json!({"asset": "btc", "amount": 1, "related": ["a", 7]}),
                Coercion::Strict,
            )
            .unwrap_err();
        assert_eq!(err.path, "related[1]");
        assert_eq!(err.constraint, "type");

        let err = transaction_body()
            .validate(&json!({"asset": "btc", "amount": -1}), Coercion::Strict)
            .unwrap_err();
        assert_eq!(err.constraint, "minimum");
    }

    #[test]
    fn null_counts_as_absent() {
        let err = transaction_body()
            .validate(&json!({"asset": null, "amount": 1}), Coercion::Strict)
            .unwrap_err();
        assert_eq!(err.constraint, "required");

        let out = transaction_body()
            .validate(&json!({"asset": "a", "amount": 1, "note": null}), Coercion::Strict)
            .unwrap();
        assert!(out.get("note").is_none());
    }

    #[test]
    fn strict_objects_reject_unknown_keys() {
        let schema = Schema::object().required("id", Schema::string()).strict();
        let err = schema
            .validate(&json!({"id": "x", "other": 1}), Coercion::Strict)
            .unwrap_err();
        assert_eq!(err.path, "other");
        assert_eq!(err.constraint, "unknown_field");
    }

    #[test]
    fn coerces_strings_only_when_asked() {
        let schema = Schema::object()
            .required("page", Schema::integer().min(1))
            .optional("all", Schema::boolean())
            .optional("tag", Schema::array(Schema::string()));

        let out = schema
            .validate(
                &json!({"page": "3", "all": "true", "tag": "x"}),
                Coercion::FromStrings,
            )
            .unwrap();
        assert_eq!(out, json!({"page": 3, "all": true, "tag": ["x"]}));

        assert!(schema
            .validate(&json!({"page": "3"}), Coercion::Strict)
            .is_err());
        assert_eq!(
            schema
                .validate(&json!({"page": "0"}), Coercion::FromStrings)
                .unwrap_err()
                .constraint,
            "minimum"
        );
    }

    #[test]
    fn one_of_is_enforced() {
        let schema = Schema::string().one_of(["in", "out"]);
        assert!(schema.validate(&json!("in"), Coercion::Strict).is_ok());
        let err = schema.validate(&json!("sideways"), Coercion::Strict).unwrap_err();
        assert_eq!(err.constraint, "one_of");
    }

    #[test]
    fn serializes_for_the_manifest() {
        let schema = Schema::object().required("asset", Schema::string().min_length(1));
        assert_eq!(
            serde_json::to_value(&schema).unwrap(),
            json!({
                "type": "object",
                "fields": [
                    {"name": "asset", "required": true, "schema": {"type": "string", "min_length": 1}}
                ],
                "strict": false
            })
        );
    }
}
