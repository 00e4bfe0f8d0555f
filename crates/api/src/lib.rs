//! HTTP API: module loading, route mounting, introspection and request/response mapping.

pub mod app;
pub mod introspect;
pub mod loader;
pub mod middleware;
pub mod mount;
