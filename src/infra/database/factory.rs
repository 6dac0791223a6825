//! Environment-driven construction of database clients.

use std::sync::Arc;

use tracing::info;

use super::config::DatabaseConfig;
use super::dynamodb::DynamoDbClient;
use super::postgres::PostgresClient;
use crate::domain::{AppError, BackendKind, DatabaseClient, Environment};

/// Builds the database client matching a deployment environment.
///
/// Clients are returned unconnected; the caller owns the `connect` /
/// `disconnect` lifecycle.
pub struct DatabaseClientFactory;

impl DatabaseClientFactory {
    /// Resolve `environment` and build the client for its backend.
    ///
    /// `development` and `local` select the relational backend, `staging` and
    /// `production` the managed one. Labels are matched exactly; anything else
    /// fails with `ConfigError::UnsupportedEnvironment` naming the label.
    pub fn create(
        environment: &str,
        config: &DatabaseConfig,
    ) -> Result<Arc<dyn DatabaseClient>, AppError> {
        let environment: Environment = environment.parse()?;
        Ok(Self::for_environment(environment, config))
    }

    pub fn for_environment(
        environment: Environment,
        config: &DatabaseConfig,
    ) -> Arc<dyn DatabaseClient> {
        let backend = environment.backend();
        info!(environment = %environment, backend = %backend, "Selecting database backend");
        Self::for_backend(backend, config)
    }

    pub fn for_backend(backend: BackendKind, config: &DatabaseConfig) -> Arc<dyn DatabaseClient> {
        match backend {
            BackendKind::Relational => Arc::new(PostgresClient::new(config)),
            BackendKind::Managed => Arc::new(DynamoDbClient::new(config)),
        }
    }
}
