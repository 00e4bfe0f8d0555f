use routeforge_core::context::RequestContext;
use routeforge_core::{ApiError, ApiResult, BuildError, Controller, Download, Namespace, Reply};

use crate::TRANSACTIONS;
use crate::model::store_error;

pub fn namespace() -> Result<Namespace, BuildError> {
    Ok(Namespace::new().route(
        "transactions",
        Controller::get("/exports/transactions")
            .description("All transactions as newline-delimited JSON")
            .downloadable()
            .callback(transactions)?,
    ))
}

async fn transactions(ctx: RequestContext) -> ApiResult<Reply> {
    let mut out = Vec::new();
    for record in ctx.store().list(TRANSACTIONS).await.map_err(store_error)? {
        serde_json::to_writer(&mut out, &record).map_err(ApiError::unexpected)?;
        out.push(b'\n');
    }
    Ok(Download::new(out, "application/x-ndjson")
        .attachment("transactions.ndjson")
        .into())
}
