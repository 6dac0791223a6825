//! Domain layer containing core business types, traits, and error definitions.

pub mod error;
pub mod traits;
pub mod types;
pub mod user;

pub use error::{AppError, ConfigError, DatabaseError, ValidationError};
pub use traits::DatabaseClient;
pub use types::{
    BackendCapabilities, BackendKind, CREATED_AT_FIELD, Condition, EntityId, Environment,
    ErrorDetail, ErrorResponse, FilterOp, FilterQuery, HealthResponse, HealthStatus, ID_FIELD,
    QueryExpr, Record, UPDATED_AT_FIELD, format_timestamp, timestamp_now,
};
pub use user::{CreateUserRequest, ListUsersParams, UpdateUserRequest, User};
