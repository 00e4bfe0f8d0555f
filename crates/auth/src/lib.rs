//! `routeforge-auth`: authentication capabilities handed to request pipelines.
//!
//! This crate is decoupled from HTTP and storage: token mechanics live behind
//! [`SessionResolver`] and [`SessionRefresher`], which deployments implement.

pub mod error;
pub mod principal;
pub mod resolver;
pub mod roles;
pub mod session;

pub use error::AuthError;
pub use principal::{Principal, PrincipalId};
pub use resolver::{SessionResolver, StaticTokenResolver};
pub use roles::Role;
pub use session::{PrivilegedSession, SessionGrant, SessionRefresher, validate_window};
