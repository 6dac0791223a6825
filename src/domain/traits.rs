//! Domain traits defining contracts for external systems.

use async_trait::async_trait;

use super::error::AppError;
use super::types::{BackendCapabilities, BackendKind, QueryExpr, Record};

/// Backend-independent data access used by every record-oriented service.
///
/// Implementations are constructed unconnected; `connect` must succeed
/// before any data operation, otherwise those operations fail with
/// `DatabaseError::Connection`. No implementation caches or retries.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Storage family this client talks to
    fn backend(&self) -> BackendKind;

    /// Optional query features honored by this client
    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities::default()
    }

    /// Establish the backend session. Calling it again once connected is a no-op.
    async fn connect(&self) -> Result<(), AppError>;

    /// Release backend resources. Safe to call when never connected.
    async fn disconnect(&self) -> Result<(), AppError>;

    /// Check backend connectivity
    async fn health_check(&self) -> Result<(), AppError>;

    /// Run a query; an empty result is an empty vector, never an error.
    ///
    /// `QueryExpr::Filter` results are ordered by `createdAt`, then `id`, on
    /// every backend. `QueryExpr::Raw` rows keep the order the SQL asks for.
    async fn query(&self, query: &QueryExpr) -> Result<Vec<Record>, AppError>;

    /// Store a new record and return it with `id`, `createdAt` and `updatedAt`
    async fn create(&self, table: &str, record: Record) -> Result<Record, AppError>;

    /// Merge `changes` into an existing record.
    ///
    /// Fails with `DatabaseError::NotFound` when `id` does not exist.
    async fn update(&self, table: &str, id: &str, changes: Record) -> Result<Record, AppError>;

    /// Delete a record. Deleting a missing id succeeds.
    async fn delete(&self, table: &str, id: &str) -> Result<(), AppError>;

    /// Fetch a record; absence is `Ok(None)`, not an error
    async fn get(&self, table: &str, id: &str) -> Result<Option<Record>, AppError>;
}
