use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use routeforge_core::context::RequestContext;
use routeforge_core::{ApiError, ApiResult, Bucket, BuildError, Controller, Namespace, Reply, RequireAuth, Schema};

use crate::model::{Transaction, from_record, store_error, to_record, transaction_schema};
use crate::receipts;
use crate::{ASSETS, RECEIPTS, TRANSACTIONS};

pub const DEFAULT_LIST_LIMIT: usize = 100;

pub fn namespace() -> Result<Namespace, BuildError> {
    let id_param = || Schema::object().required("id", Schema::string());

    Ok(Namespace::new()
        .route(
            "list",
            Controller::get("/transactions")
                .description("List transactions, oldest first")
                .query(
                    Schema::object()
                        .optional("asset", Schema::string())
                        .optional("limit", Schema::integer().min(1).max(500)),
                )
                .exists(Bucket::Query, "asset", ASSETS)
                .response(Schema::array(transaction_schema()))
                .callback(list)?,
        )
        .route(
            "get",
            Controller::get("/transactions/:id")
                .description("Get one transaction")
                .params(id_param())
                .exists(Bucket::Params, "id", TRANSACTIONS)
                .response(transaction_schema())
                .callback(get)?,
        )
        .route(
            "create",
            Controller::post("/transactions")
                .description("Record a transaction")
                .body(
                    Schema::object()
                        .required("asset", Schema::string())
                        .required("amount", Schema::number())
                        .optional("note", Schema::string().max_length(280))
                        .optional("related", Schema::array(Schema::string()).max_items(32)),
                )
                .exists(Bucket::Body, "asset", ASSETS)
                .exists(Bucket::Body, "related", format!("[{TRANSACTIONS}]"))
                .middleware(RequireAuth)
                .status(201)
                .response(transaction_schema())
                .callback(create)?,
        )
        .route(
            "attach_receipt",
            Controller::post("/transactions/:id/receipt")
                .description("Upload the receipt of a transaction")
                .params(id_param())
                .exists(Bucket::Params, "id", TRANSACTIONS)
                .middleware(RequireAuth)
                .uploads(1)
                .response(transaction_schema())
                .callback(receipts::attach)?,
        )
        .route(
            "receipt",
            Controller::get("/transactions/:id/receipt")
                .description("Download the receipt of a transaction")
                .params(id_param())
                .exists(Bucket::Params, "id", RECEIPTS)
                .downloadable()
                .callback(receipts::download)?,
        ))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    asset: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct CreateTransaction {
    asset: String,
    amount: f64,
    note: Option<String>,
    #[serde(default)]
    related: Vec<String>,
}

async fn list(ctx: RequestContext) -> ApiResult<Reply> {
    let query: ListQuery = ctx.query_as()?;
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);

    let mut out = Vec::new();
    for record in ctx.store().list(TRANSACTIONS).await.map_err(store_error)? {
        let tx: Transaction = from_record(record)?;
        if query.asset.as_deref().is_none_or(|a| a == tx.asset) {
            out.push(tx);
        }
        if out.len() == limit {
            break;
        }
    }
    Reply::data(&out)
}

async fn get(ctx: RequestContext) -> ApiResult<Reply> {
    let tx = load(&ctx, &ctx.param("id").unwrap_or_default()).await?;
    Reply::data(&tx)
}

async fn create(ctx: RequestContext) -> ApiResult<Reply> {
    let principal = ctx.principal()?;
    let body: CreateTransaction = ctx.body_as()?;

    let tx = Transaction {
        // v7 ids sort by creation time, so listing by id is chronological.
        id: Uuid::now_v7().to_string(),
        asset: body.asset,
        amount: body.amount,
        note: body.note,
        related: body.related,
        created_by: principal.id.to_string(),
        created_at: Utc::now(),
        receipt: None,
    };
    ctx.store()
        .insert(TRANSACTIONS, &tx.id, to_record(&tx)?)
        .await
        .map_err(store_error)?;
    tracing::info!(transaction = %tx.id, asset = %tx.asset, "transaction recorded");
    Reply::data(&tx)
}

pub(crate) async fn load(ctx: &RequestContext, id: &str) -> ApiResult<Transaction> {
    let record = ctx
        .store()
        .get(TRANSACTIONS, id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| ApiError::not_found(format!("transaction '{id}' not found")))?;
    from_record(record)
}
