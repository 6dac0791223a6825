//! Infrastructure layer implementations.

pub mod database;
pub mod observability;

pub use database::{
    DatabaseClientFactory, DatabaseConfig, DynamoDbClient, PoolConfig, PostgresClient,
};
pub use observability::{LogFormat, PrometheusHandle, init_metrics_handle, init_tracing};
