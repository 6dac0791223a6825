//! Application error types with proper error chaining.

use thiserror::Error;

/// Underlying driver or SDK error kept as the `source()` of a [`DatabaseError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection failed: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Constraint violated: {0}")]
    Validation(String),
    #[error("Query execution failed: {message}")]
    Query {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
    #[error("Migration failed: {0}")]
    Migration(String),
}

impl DatabaseError {
    pub fn connection(message: impl Into<String>) -> Self {
        DatabaseError::Connection {
            message: message.into(),
            source: None,
        }
    }

    pub fn query(message: impl Into<String>) -> Self {
        DatabaseError::Query {
            message: message.into(),
            source: None,
        }
    }

    /// Attaches the driver error that caused a `Connection` or `Query` failure.
    /// Other variants are returned unchanged.
    #[must_use]
    pub fn with_source(mut self, cause: impl Into<BoxError>) -> Self {
        if let DatabaseError::Connection { source, .. } | DatabaseError::Query { source, .. } =
            &mut self
        {
            *source = Some(cause.into());
        }
        self
    }

    /// Error returned by adapters when a data operation runs before `connect()`.
    pub fn not_connected(backend: &str) -> Self {
        DatabaseError::connection(format!("{backend} client is not connected"))
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
    #[error(
        "Unsupported environment '{0}': expected one of development, local, staging, production"
    )]
    UnsupportedEnvironment(String),
}

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),
    #[error("Validation failed: {0}")]
    Multiple(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Operation not supported: {0}")]
    NotSupported(String),
}

impl AppError {
    /// True when the error means the addressed record does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::Database(DatabaseError::NotFound(_)))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(ValidationError::Multiple(err.to_string()))
    }
}

/// Postgres SQLSTATE codes that indicate the written data broke a constraint.
const CONSTRAINT_SQLSTATES: &[&str] = &[
    "23505", // unique_violation
    "23502", // not_null_violation
    "23503", // foreign_key_violation
    "23514", // check_violation
    "22P02", // invalid_text_representation
    "42703", // undefined_column
];

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed => DatabaseError::connection(err.to_string()).with_source(err),
            sqlx::Error::Database(db_err) => {
                let message = db_err.message().to_string();
                let code = db_err.code().map(|code| code.into_owned());
                if code
                    .as_deref()
                    .is_some_and(|code| CONSTRAINT_SQLSTATES.contains(&code))
                {
                    return DatabaseError::Validation(message);
                }
                if code.is_some_and(|code| code == "28P01" || code == "28000") {
                    return DatabaseError::connection(message).with_source(err);
                }
                DatabaseError::query(message).with_source(err)
            }
            _ => DatabaseError::query(err.to_string()).with_source(err),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(DatabaseError::from(err))
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::Database(DatabaseError::Migration(err.to_string()))
    }
}
