//! Per-endpoint middlewares, run in declaration order before validation.

use async_trait::async_trait;

use routeforge_auth::Role;

use crate::context::RequestContext;
use crate::error::ApiError;

#[async_trait]
pub trait Middleware: Send + Sync {
    /// Short name, recorded in the mounted handler chain.
    fn name(&self) -> &str;

    /// Inspect or enrich the context; an error rejects the request.
    async fn handle(&self, ctx: &mut RequestContext) -> Result<(), ApiError>;
}

/// Rejects anonymous callers with 401.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequireAuth;

#[async_trait]
impl Middleware for RequireAuth {
    fn name(&self) -> &str {
        "require_auth"
    }

    async fn handle(&self, ctx: &mut RequestContext) -> Result<(), ApiError> {
        ctx.principal().map(|_| ())
    }
}

/// 401 for anonymous callers, 403 when the role is missing.
#[derive(Debug, Clone)]
pub struct RequireRole {
    role: Role,
}

impl RequireRole {
    pub fn new(role: Role) -> Self {
        Self { role }
    }
}

#[async_trait]
impl Middleware for RequireRole {
    fn name(&self) -> &str {
        "require_role"
    }

    async fn handle(&self, ctx: &mut RequestContext) -> Result<(), ApiError> {
        let principal = ctx.principal()?;
        if principal.has_role(self.role.as_str()) {
            Ok(())
        } else {
            Err(ApiError::forbidden(format!("missing role '{}'", self.role)))
        }
    }
}
