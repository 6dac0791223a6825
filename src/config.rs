//! Process configuration read from environment variables.

use std::net::SocketAddr;
use std::str::FromStr;

use secrecy::SecretString;

use crate::domain::ConfigError;
use crate::infra::{DatabaseConfig, LogFormat};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_USERS_TABLE: &str = "users";

/// Everything `main` needs to assemble the service.
#[derive(Debug)]
pub struct AppConfig {
    /// Raw deployment label; resolved by `DatabaseClientFactory`.
    pub environment: String,
    pub bind_addr: SocketAddr,
    pub users_table: String,
    pub log_format: LogFormat,
    pub database: DatabaseConfig,
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, which returns the value of a
    /// variable or `None` when it is unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment =
            lookup("APP_ENV").ok_or_else(|| ConfigError::MissingEnvVar("APP_ENV".to_string()))?;

        let bind_addr = parse_or(&lookup, "BIND_ADDR", DEFAULT_BIND_ADDR)?;
        let log_format = match lookup("LOG_FORMAT") {
            Some(raw) => raw.parse()?,
            None => LogFormat::default(),
        };

        let mut database = DatabaseConfig {
            host: lookup("DB_HOST"),
            port: parse_opt(&lookup, "DB_PORT")?,
            database: lookup("DB_NAME"),
            username: lookup("DB_USER"),
            password: lookup("DB_PASSWORD").map(SecretString::from),
            region: lookup("AWS_REGION"),
            endpoint: lookup("DYNAMODB_ENDPOINT"),
            run_migrations: parse_opt::<_, bool>(&lookup, "DB_RUN_MIGRATIONS")?.unwrap_or(false),
            ..DatabaseConfig::default()
        };
        if let Some(max) = parse_opt(&lookup, "DB_MAX_CONNECTIONS")? {
            database.pool.max_connections = max;
        }

        Ok(Self {
            environment,
            bind_addr,
            users_table: lookup("USERS_TABLE").unwrap_or_else(|| DEFAULT_USERS_TABLE.to_string()),
            log_format,
            database,
        })
    }
}

fn parse_opt<F, T>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })
        })
        .transpose()
}

fn parse_or<F, T>(lookup: &F, key: &str, default: &str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = lookup(key).unwrap_or_else(|| default.to_string());
    raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[("APP_ENV", "local")]).unwrap();
        assert_eq!(config.environment, "local");
        assert_eq!(config.bind_addr, "0.0.0.0:3000".parse().unwrap());
        assert_eq!(config.users_table, "users");
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.database.host.is_none());
        assert!(!config.database.run_migrations);
        assert_eq!(config.database.pool.max_connections, 10);
    }

    #[test]
    fn test_missing_app_env() {
        let err = config_from(&[]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "APP_ENV"));
    }

    #[test]
    fn test_database_variables() {
        let config = config_from(&[
            ("APP_ENV", "production"),
            ("DB_HOST", "db"),
            ("DB_PORT", "5433"),
            ("DB_NAME", "jobs"),
            ("DB_MAX_CONNECTIONS", "25"),
            ("DB_RUN_MIGRATIONS", "true"),
            ("AWS_REGION", "eu-central-1"),
            ("DYNAMODB_ENDPOINT", "http://localhost:8000"),
            ("LOG_FORMAT", "json"),
        ])
        .unwrap();

        assert_eq!(config.database.host.as_deref(), Some("db"));
        assert_eq!(config.database.port, Some(5433));
        assert_eq!(config.database.database.as_deref(), Some("jobs"));
        assert_eq!(config.database.pool.max_connections, 25);
        assert!(config.database.run_migrations);
        assert_eq!(config.database.region.as_deref(), Some("eu-central-1"));
        assert_eq!(
            config.database.endpoint.as_deref(),
            Some("http://localhost:8000")
        );
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_values_name_the_variable() {
        let err = config_from(&[("APP_ENV", "local"), ("DB_PORT", "not-a-port")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "DB_PORT"));

        let err = config_from(&[("APP_ENV", "local"), ("BIND_ADDR", "nowhere")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "BIND_ADDR"));

        let err = config_from(&[("APP_ENV", "local"), ("DB_RUN_MIGRATIONS", "yes")]).unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "DB_RUN_MIGRATIONS")
        );
    }

    #[test]
    fn test_environment_label_is_not_validated_here() {
        let config = config_from(&[("APP_ENV", "qa")]).unwrap();
        assert_eq!(config.environment, "qa");
    }
}
