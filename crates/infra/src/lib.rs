//! Infrastructure layer: datastores and configuration.

pub mod config;
pub mod datastore;

pub use config::{ConfigError, ServerConfig};
pub use datastore::{InMemoryDatastore, PostgresDatastore};
