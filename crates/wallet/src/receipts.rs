//! Receipt upload and download for transactions.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use routeforge_core::context::RequestContext;
use routeforge_core::{ApiError, ApiResult, Download, Reply};

use crate::model::{ReceiptInfo, StoredReceipt, from_record, store_error, to_record};
use crate::transactions::load;
use crate::{RECEIPTS, TRANSACTIONS};

pub const RECEIPT_FIELD: &str = "receipt";

pub(crate) async fn attach(ctx: RequestContext) -> ApiResult<Reply> {
    let id = ctx.param("id").unwrap_or_default();
    let file = ctx
        .file(RECEIPT_FIELD)
        .ok_or_else(|| ApiError::bad_request(format!("expected a file in the '{RECEIPT_FIELD}' field")))?;

    let info = ReceiptInfo {
        file_name: file.file_name.clone().unwrap_or_else(|| format!("{id}.bin")),
        content_type: file
            .content_type
            .clone()
            .unwrap_or_else(|| "application/octet-stream".to_string()),
        size: file.bytes.len(),
    };
    let stored = StoredReceipt {
        info: info.clone(),
        data: STANDARD.encode(&file.bytes),
    };

    let mut tx = load(&ctx, &id).await?;
    tx.receipt = Some(info);

    let store = ctx.store();
    store
        .put(RECEIPTS, &id, to_record(&stored)?)
        .await
        .map_err(store_error)?;
    store
        .put(TRANSACTIONS, &id, to_record(&tx)?)
        .await
        .map_err(store_error)?;
    tracing::info!(transaction = %id, size = stored.info.size, "receipt attached");
    Reply::data(&tx)
}

pub(crate) async fn download(ctx: RequestContext) -> ApiResult<Reply> {
    let id = ctx.param("id").unwrap_or_default();
    let record = ctx
        .store()
        .get(RECEIPTS, &id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| ApiError::not_found(format!("no receipt for transaction '{id}'")))?;
    let stored: StoredReceipt = from_record(record)?;
    let bytes = STANDARD.decode(stored.data.as_bytes()).map_err(ApiError::unexpected)?;

    Ok(Download::new(bytes, &stored.info.content_type)
        .attachment(&stored.info.file_name)
        .into())
}
