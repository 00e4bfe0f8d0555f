use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use routeforge_auth::Role;
use routeforge_core::context::RequestContext;
use routeforge_core::{ApiError, ApiResult, Bucket, BuildError, Controller, Namespace, Reply, RequireRole, Schema};

use crate::model::{Asset, Transaction, asset_schema, from_record, store_error, to_record};
use crate::{ASSETS, TRANSACTIONS};

pub fn namespace() -> Result<Namespace, BuildError> {
    let id_param = || Schema::object().required("id", Schema::string());

    Ok(Namespace::new()
        .route(
            "list",
            Controller::get("/assets")
                .description("List assets")
                .response(Schema::array(asset_schema()))
                .callback(list)?,
        )
        .route(
            "get",
            Controller::get("/assets/:id")
                .description("Get one asset")
                .params(id_param())
                .exists(Bucket::Params, "id", ASSETS)
                .response(asset_schema())
                .callback(get)?,
        )
        .route(
            "balance",
            Controller::get("/assets/:id/balance")
                .description("Sum of all transaction amounts for an asset")
                .params(id_param())
                .exists(Bucket::Params, "id", ASSETS)
                .response(
                    Schema::object()
                        .required("asset", Schema::string())
                        .required("balance", Schema::number())
                        .required("transactions", Schema::integer()),
                )
                .callback(balance)?,
        )
        .route(
            "create",
            Controller::post("/assets")
                .description("Register an asset")
                .body(
                    Schema::object()
                        .required("id", Schema::string().min_length(1).max_length(32))
                        .required("name", Schema::string().min_length(1).max_length(120))
                        .optional("decimals", Schema::integer().min(0).max(18)),
                )
                .middleware(RequireRole::new(Role::admin()))
                .status(201)
                .response(asset_schema())
                .callback(create)?,
        ))
}

#[derive(Debug, Deserialize)]
struct CreateAsset {
    id: String,
    name: String,
    decimals: Option<i64>,
}

async fn list(ctx: RequestContext) -> ApiResult<Reply> {
    let assets = ctx.store().list(ASSETS).await.map_err(store_error)?;
    Ok(Reply::json(assets.into()))
}

async fn get(ctx: RequestContext) -> ApiResult<Reply> {
    let id = ctx.param("id").unwrap_or_default();
    let asset = ctx
        .store()
        .get(ASSETS, &id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| ApiError::not_found(format!("asset '{id}' not found")))?;
    Ok(Reply::json(asset))
}

async fn balance(ctx: RequestContext) -> ApiResult<Reply> {
    let id = ctx.param("id").unwrap_or_default();
    let mut total = 0.0;
    let mut count = 0usize;
    for record in ctx.store().list(TRANSACTIONS).await.map_err(store_error)? {
        let tx: Transaction = from_record(record)?;
        if tx.asset == id {
            total += tx.amount;
            count += 1;
        }
    }
    Ok(Reply::json(json!({
        "asset": id,
        "balance": total,
        "transactions": count,
    })))
}

async fn create(ctx: RequestContext) -> ApiResult<Reply> {
    let body: CreateAsset = ctx.body_as()?;
    let asset = Asset {
        id: body.id,
        name: body.name,
        decimals: body.decimals.unwrap_or(8),
        created_at: Utc::now(),
    };
    ctx.store()
        .insert(ASSETS, &asset.id, to_record(&asset)?)
        .await
        .map_err(store_error)?;
    tracing::info!(asset = %asset.id, "asset created");
    Reply::data(&asset)
}
