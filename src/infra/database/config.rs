//! Backend-selection configuration shared by every database adapter.

use std::time::Duration;

use secrecy::SecretString;

/// Connection parameters for whichever backend the factory selects.
///
/// The relational adapter reads `host`, `port`, `database`, `username`,
/// `password`, `pool` and `run_migrations`; the managed adapter reads
/// `region`, `endpoint` and the optional static credentials. Fields the
/// selected backend does not use are ignored.
#[derive(Debug, Default)]
pub struct DatabaseConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<SecretString>,
    pub pool: PoolConfig,
    pub run_migrations: bool,
}

impl DatabaseConfig {
    /// Relational connection parameters.
    pub fn relational(
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: Some(host.into()),
            port: Some(port),
            database: Some(database.into()),
            username: Some(username.into()),
            password: Some(SecretString::from(password.into())),
            ..Self::default()
        }
    }

    /// Managed-store parameters with an optional endpoint override.
    pub fn managed(region: impl Into<String>, endpoint: Option<String>) -> Self {
        Self {
            region: Some(region.into()),
            endpoint,
            ..Self::default()
        }
    }

    /// Static credentials for the managed store, used instead of the default chain.
    #[must_use]
    pub fn with_static_credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.access_key_id = Some(access_key_id.into());
        self.secret_access_key = Some(SecretString::from(secret_access_key.into()));
        self
    }

    #[must_use]
    pub fn with_migrations(mut self) -> Self {
        self.run_migrations = true;
        self
    }
}

/// Relational connection pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 2,
            acquire_timeout: Duration::from_secs(3),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
        }
    }
}
