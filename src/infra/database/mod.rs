//! Concrete database client implementations.
//!
//! Every adapter implements the `DatabaseClient` trait defined in the domain
//! layer; [`DatabaseClientFactory`] picks one from the deployment environment.

pub mod config;
pub mod dynamodb;
pub mod factory;
pub mod postgres;

pub use config::{DatabaseConfig, PoolConfig};
pub use dynamodb::DynamoDbClient;
pub use factory::DatabaseClientFactory;
pub use postgres::PostgresClient;
