//! Application service layer.
//!
//! `UserService` turns user-management use cases into calls on the injected
//! `DatabaseClient`. It never knows which backend is behind the trait.

use std::sync::Arc;

use metrics::counter;
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::domain::{
    AppError, BackendKind, Condition, CreateUserRequest, DatabaseClient, FilterQuery,
    HealthResponse, HealthStatus, ListUsersParams, Record, UpdateUserRequest, User,
    ValidationError,
};

/// Table used when none is configured.
pub const DEFAULT_USERS_TABLE: &str = "users";

/// User-management service over a single table.
///
/// # Example
///
/// ```ignore
/// let db = DatabaseClientFactory::create("local", &config)?;
/// db.connect().await?;
/// let service = UserService::new(db);
///
/// let user = service.create_user(&CreateUserRequest::new("a@b.com", "A")).await?;
/// ```
pub struct UserService {
    db_client: Arc<dyn DatabaseClient>,
    table: String,
}

impl UserService {
    /// Creates a service writing to the default `users` table.
    #[must_use]
    pub fn new(db_client: Arc<dyn DatabaseClient>) -> Self {
        Self::with_table(db_client, DEFAULT_USERS_TABLE)
    }

    #[must_use]
    pub fn with_table(db_client: Arc<dyn DatabaseClient>, table: impl Into<String>) -> Self {
        Self {
            db_client,
            table: table.into(),
        }
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    #[must_use]
    pub fn backend(&self) -> BackendKind {
        self.db_client.backend()
    }

    /// Validates and stores a new user.
    ///
    /// # Errors
    ///
    /// Returns an `AppError` if:
    /// - Validation fails (nothing is written)
    /// - The store rejects the record, e.g. a duplicate email
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn create_user(&self, request: &CreateUserRequest) -> Result<User, AppError> {
        validate(request, "create user")?;

        let record = Record::from_serializable(request)?;
        let stored = self.db_client.create(&self.table, record).await?;
        let user: User = stored.into_typed()?;

        counter!("user_operations_total", "operation" => "create").increment(1);
        info!(user_id = %user.id, "User created");
        Ok(user)
    }

    /// Gets a user by ID; `None` when it does not exist.
    #[instrument(skip(self))]
    pub async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        counter!("user_operations_total", "operation" => "get").increment(1);
        self.db_client
            .get(&self.table, id)
            .await?
            .map(Record::into_typed)
            .transpose()
    }

    /// Applies the fields present in `request` to an existing user.
    ///
    /// # Errors
    ///
    /// `DatabaseError::NotFound` when `id` does not exist.
    #[instrument(skip(self, request))]
    pub async fn update_user(
        &self,
        id: &str,
        request: &UpdateUserRequest,
    ) -> Result<User, AppError> {
        if request.is_empty() {
            warn!(user_id = %id, "Rejected update request without changes");
            return Err(ValidationError::MissingField("email or name".to_string()).into());
        }
        validate(request, "update user")?;

        let changes = Record::from_serializable(request)?;
        let stored = self.db_client.update(&self.table, id, changes).await?;
        let user: User = stored.into_typed()?;

        counter!("user_operations_total", "operation" => "update").increment(1);
        info!(user_id = %user.id, "User updated");
        Ok(user)
    }

    /// Deletes a user. Deleting an unknown ID succeeds.
    #[instrument(skip(self))]
    pub async fn delete_user(&self, id: &str) -> Result<(), AppError> {
        self.db_client.delete(&self.table, id).await?;

        counter!("user_operations_total", "operation" => "delete").increment(1);
        info!(user_id = %id, "User deleted");
        Ok(())
    }

    /// Lists users, optionally restricted to an exact email.
    #[instrument(skip(self))]
    pub async fn list_users(&self, params: &ListUsersParams) -> Result<Vec<User>, AppError> {
        let mut query = FilterQuery::new(self.table.clone());
        if let Some(email) = &params.email {
            query = query.filter(Condition::eq("email", email.clone()));
        }

        counter!("user_operations_total", "operation" => "list").increment(1);
        self.db_client
            .query(&query.into())
            .await?
            .into_iter()
            .map(Record::into_typed)
            .collect()
    }

    /// Performs a health check on the database.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> HealthResponse {
        let db_health = match self.db_client.health_check().await {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => {
                warn!(error = ?e, "Database health check failed");
                HealthStatus::Unhealthy
            }
        };

        HealthResponse::new(db_health, self.db_client.backend())
    }
}

fn validate(request: &impl Validate, action: &str) -> Result<(), AppError> {
    request.validate().map_err(|e| {
        warn!(error = %e, "Validation failed for {action} request");
        AppError::Validation(ValidationError::Multiple(e.to_string()))
    })
}
