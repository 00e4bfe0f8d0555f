//! Wallet module: assets, transactions and receipts.
//!
//! The module only declares endpoints; the server mounts them under the
//! module key (`/wallet/...`). Records live in the shared datastore under the
//! `wallet__*` collections.

pub mod assets;
pub mod exports;
pub mod model;
pub mod receipts;
pub mod transactions;

use routeforge_core::{Namespace, RouterNode};

pub const ASSETS: &str = "wallet__assets";
pub const TRANSACTIONS: &str = "wallet__transactions";
pub const RECEIPTS: &str = "wallet__receipts";

/// Server entry point.
pub fn server() -> anyhow::Result<RouterNode> {
    let tree = Namespace::new()
        .nest("assets", assets::namespace()?)
        .nest("transactions", transactions::namespace()?)
        .nest("exports", exports::namespace()?);
    Ok(tree.into())
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use routeforge_auth::{Principal, Role};
    use routeforge_core::context::{Capabilities, Inputs, RawRequest, RequestContext};
    use routeforge_core::{ApiResult, ControllerSpec, Reply, pipeline};
    use routeforge_infra::InMemoryDatastore;

    use super::server;

    pub fn spec(key: &str) -> Arc<ControllerSpec> {
        let node = server().unwrap();
        let routes = node.as_namespace().unwrap().flatten().unwrap();
        routes.get(key).unwrap().spec.clone()
    }

    pub fn alice() -> Principal {
        Principal::new("alice", vec![Role::admin()])
    }

    pub async fn call(
        store: &Arc<InMemoryDatastore>,
        key: &str,
        inputs: Inputs,
        principal: Option<Principal>,
    ) -> ApiResult<Reply> {
        let spec = spec(key);
        let request = RawRequest {
            method: spec.method().to_http(),
            uri: http::Uri::from_static("/"),
            headers: http::HeaderMap::new(),
        };
        let mut ctx = RequestContext::new(key, request, store.clone(), Capabilities::new());
        ctx.inputs = inputs;
        ctx.principal = principal;
        pipeline::execute(&spec, ctx).await
    }

    pub fn data(reply: Reply) -> serde_json::Value {
        match reply {
            Reply::Data(v) => v,
            Reply::File(_) => panic!("expected data reply"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_exports_a_namespace_with_unique_routes() {
        let node = server().unwrap();
        let routes = node.as_namespace().unwrap().flatten().unwrap();
        let keys: Vec<_> = routes.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "assets.list",
                "assets.get",
                "assets.balance",
                "assets.create",
                "transactions.list",
                "transactions.get",
                "transactions.create",
                "transactions.attach_receipt",
                "transactions.receipt",
                "exports.transactions",
            ]
        );
    }
}
