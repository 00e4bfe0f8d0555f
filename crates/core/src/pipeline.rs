//! Request pipeline: middlewares → validation → existence checks → callback.
//!
//! ```text
//! received
//!   ↓ middlewares        (declaration order; 401/403 on rejection)
//!   ↓ validating         (query, body, params; 400 on failure)
//!   ↓ existence-checking (declaration order; 404 on first missing id)
//!   ↓ executing callback
//! responded
//! ```
//!
//! A failure at any stage ends the request; later stages never run. Nothing
//! is retried here.

use serde_json::Value;

use crate::context::{Inputs, RequestContext};
use crate::controller::{ControllerSpec, InputSchemas};
use crate::error::{ApiResult, Bucket, ValidationError};
use crate::existence::check_references;
use crate::reply::Reply;
use crate::schema::Coercion;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Stage {
    Middlewares,
    Validating,
    ExistenceChecking,
    Executing,
}

impl core::fmt::Display for Stage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Stage::Middlewares => "middlewares",
            Stage::Validating => "validating",
            Stage::ExistenceChecking => "existence-checking",
            Stage::Executing => "executing",
        })
    }
}

/// Run one request through `spec`. Consumes the context.
pub async fn execute(spec: &ControllerSpec, mut ctx: RequestContext) -> ApiResult<Reply> {
    let mut stage = Stage::Middlewares;
    let result: ApiResult<Reply> = async {
        for middleware in spec.middlewares() {
            tracing::debug!(middleware = middleware.name(), "middleware");
            middleware.handle(&mut ctx).await?;
        }

        stage = Stage::Validating;
        // Form fields are text, like the query string.
        let body = if ctx.request.is_multipart() {
            Coercion::FromStrings
        } else {
            Coercion::Strict
        };
        validate_inputs_with(spec.inputs(), &mut ctx.inputs, body)?;

        stage = Stage::ExistenceChecking;
        check_references(spec.existence_checks(), &ctx.inputs, spec.inputs(), ctx.store()).await?;

        stage = Stage::Executing;
        (spec.callback())(ctx).await
    }
    .await;

    if let Err(err) = &result {
        tracing::debug!(stage = %stage, status = err.status(), "request rejected");
    }
    result
}

/// Validate every bucket that has a schema, replacing it with its
/// normalized value. Buckets without a schema are left untouched.
pub fn validate_inputs(schemas: &InputSchemas, inputs: &mut Inputs) -> Result<(), ValidationError> {
    validate_inputs_with(schemas, inputs, Coercion::Strict)
}

/// [`validate_inputs`] with an explicit coercion for the body bucket.
pub fn validate_inputs_with(
    schemas: &InputSchemas,
    inputs: &mut Inputs,
    body: Coercion,
) -> Result<(), ValidationError> {
    for bucket in Bucket::ALL {
        let Some(schema) = schemas.get(bucket) else {
            continue;
        };
        let coercion = match bucket {
            Bucket::Body => body,
            Bucket::Query | Bucket::Params => Coercion::FromStrings,
        };

        // A request without a body validates like an empty object, so that
        // "all fields optional" bodies accept it.
        let raw = match inputs.get(bucket) {
            Value::Null => Value::Object(Default::default()),
            other => other.clone(),
        };

        let normalized = schema
            .validate(&raw, coercion)
            .map_err(|v| ValidationError {
                bucket,
                field: v.path,
                constraint: v.constraint.to_string(),
                message: v.message,
            })?;
        inputs.set(bucket, normalized);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::context::{Capabilities, RawRequest};
    use crate::controller::Controller;
    use crate::error::ApiError;
    use crate::middleware::RequireAuth;
    use crate::schema::Schema;
    use crate::testing::MemoryStore;

    fn transaction_builder() -> crate::controller::ControllerBuilder {
        Controller::post("/transactions/:account")
            .params(Schema::object().required("account", Schema::string()))
            .query(Schema::object().optional("dry_run", Schema::boolean()))
            .body(
                Schema::object()
                    .required("asset", Schema::string())
                    .required("amount", Schema::number()),
            )
    }

    fn context(store: Arc<MemoryStore>, inputs: Inputs) -> RequestContext {
        let request = RawRequest {
            method: http::Method::POST,
            uri: "/wallet/transactions/a1".parse().unwrap(),
            headers: http::HeaderMap::new(),
        };
        let mut ctx = RequestContext::new("wallet.transactions.create", request, store, Capabilities::new());
        ctx.inputs = inputs;
        ctx
    }

    fn counting(
        builder: crate::controller::ControllerBuilder,
        calls: Arc<AtomicUsize>,
    ) -> ControllerSpec {
        builder
            .callback(move |ctx: RequestContext| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Reply::json(json!({
                        "params": ctx.inputs.params,
                        "query": ctx.inputs.query,
                        "body": ctx.inputs.body,
                    })))
                }
            })
            .unwrap()
    }

    fn valid_inputs(asset: &str) -> Inputs {
        Inputs {
            query: json!({"dry_run": "false"}),
            body: json!({"asset": asset, "amount": 3}),
            params: json!({"account": "a1"}),
        }
    }

    #[tokio::test]
    async fn valid_input_reaches_callback_exactly_once_with_normalized_values() {
        let calls = Arc::new(AtomicUsize::new(0));
        let spec = counting(transaction_builder(), calls.clone());
        let store = Arc::new(MemoryStore::with(&[]));

        let reply = execute(&spec, context(store, valid_inputs("btc"))).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        match reply {
            Reply::Data(v) => {
                assert_eq!(v["query"], json!({"dry_run": false}));
                assert_eq!(v["params"], json!({"account": "a1"}));
            }
            Reply::File(_) => panic!("expected data"),
        }
    }

    #[tokio::test]
    async fn validation_failure_blocks_checks_and_callback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let spec = counting(
            transaction_builder().exists(Bucket::Body, "asset", "wallet__assets"),
            calls.clone(),
        );
        let store = Arc::new(MemoryStore::with(&[("wallet__assets", "btc")]));

        let mut inputs = valid_inputs("btc");
        inputs.body = json!({"asset": "btc", "amount": "three"});
        let err = execute(&spec, context(store.clone(), inputs)).await.unwrap_err();

        match err {
            ApiError::Validation(v) => {
                assert_eq!(v.bucket, Bucket::Body);
                assert_eq!(v.field, "amount");
                assert_eq!(v.constraint, "type");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(store.lookups().is_empty(), "existence checks must not run");
    }

    #[tokio::test]
    async fn missing_reference_blocks_callback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let spec = counting(
            transaction_builder().exists(Bucket::Body, "asset", "wallet__assets"),
            calls.clone(),
        );
        let store = Arc::new(MemoryStore::with(&[("wallet__assets", "btc")]));

        let err = execute(&spec, context(store.clone(), valid_inputs("doesnotexist")))
            .await
            .unwrap_err();
        assert_eq!(err.status(), 404);
        assert!(err.to_string().contains("wallet__assets"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        execute(&spec, context(store, valid_inputs("btc"))).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn middlewares_run_before_validation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let spec = counting(transaction_builder().middleware(RequireAuth), calls.clone());
        let store = Arc::new(MemoryStore::with(&[]));

        // Invalid body, but the anonymous caller is rejected first.
        let mut inputs = valid_inputs("btc");
        inputs.body = json!({});
        let err = execute(&spec, context(store, inputs)).await.unwrap_err();
        assert_eq!(err.status(), 401);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig::with_cases(64))]

        /// Property: any schema-valid input reaches the callback exactly once.
        #[test]
        fn valid_inputs_reach_callback_exactly_once(
            account in "[a-z0-9]{1,12}",
            asset in "[a-z]{1,8}",
            amount in -1.0e9f64..1.0e9,
            dry_run in proptest::option::of(proptest::bool::ANY),
        ) {
            let calls = Arc::new(AtomicUsize::new(0));
            let spec = counting(transaction_builder(), calls.clone());

            let query = match dry_run {
                Some(flag) => json!({"dry_run": flag.to_string()}),
                None => json!({}),
            };
            let inputs = Inputs {
                query,
                body: json!({"asset": asset, "amount": amount}),
                params: json!({"account": account}),
            };

            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let store = Arc::new(MemoryStore::with(&[]));
            let reply = runtime.block_on(execute(&spec, context(store, inputs)));
            proptest::prop_assert!(reply.is_ok());
            proptest::prop_assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn unvalidated_buckets_pass_through() {
        let mut inputs = Inputs {
            body: json!({"anything": [1, 2, 3]}),
            ..Inputs::default()
        };
        validate_inputs(&InputSchemas::default(), &mut inputs).unwrap();
        assert_eq!(inputs.body, json!({"anything": [1, 2, 3]}));
    }

    #[test]
    fn form_bodies_are_coerced_from_strings() {
        let schemas = InputSchemas {
            body: Some(Schema::object().required("amount", Schema::integer())),
            ..InputSchemas::default()
        };
        let mut inputs = Inputs {
            body: json!({"amount": "12"}),
            ..Inputs::default()
        };
        assert!(validate_inputs(&schemas, &mut inputs.clone()).is_err());
        validate_inputs_with(&schemas, &mut inputs, Coercion::FromStrings).unwrap();
        assert_eq!(inputs.body, json!({"amount": 12}));
    }

    #[test]
    fn missing_body_validates_as_empty_object() {
        let schemas = InputSchemas {
            body: Some(Schema::object().optional("note", Schema::string())),
            ..InputSchemas::default()
        };
        let mut inputs = Inputs::default();
        validate_inputs(&schemas, &mut inputs).unwrap();
        assert_eq!(inputs.body, json!({}));
    }
}
