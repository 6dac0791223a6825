//! Mock implementations for testing.
//!
//! `MockDatabaseClient` is an in-memory implementation of the full
//! `DatabaseClient` contract that can be configured to simulate failures,
//! latency, an unhealthy backend and uniqueness constraints.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::domain::{AppError, BackendKind, DatabaseClient, DatabaseError, QueryExpr, Record};

/// Configuration for mock behavior.
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// If true, operations will fail.
    pub should_fail: bool,
    /// Custom error message for failures.
    pub error_message: Option<String>,
    /// Simulated latency in milliseconds.
    pub latency_ms: Option<u64>,
}

impl MockConfig {
    /// Creates a config that always succeeds.
    #[must_use]
    pub fn success() -> Self {
        Self::default()
    }

    /// Creates a config that always fails.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            should_fail: true,
            error_message: Some(message.into()),
            latency_ms: None,
        }
    }

    /// Adds simulated latency.
    #[must_use]
    pub fn with_latency(mut self, ms: u64) -> Self {
        self.latency_ms = Some(ms);
        self
    }
}

/// In-memory database client for testing.
///
/// Tables are created on first write. `query` orders results by `createdAt`
/// then `id`, like the real adapters. A fresh mock is already connected; use
/// [`MockDatabaseClient::disconnected`] to exercise the connection lifecycle.
///
/// # Example
///
/// ```
/// use jobapp_backend::test_utils::{MockDatabaseClient, mocks::MockConfig};
///
/// // Create a mock that succeeds
/// let mock = MockDatabaseClient::new();
///
/// // Create a mock that fails
/// let failing_mock = MockDatabaseClient::with_config(MockConfig::failure("DB error"));
/// ```
pub struct MockDatabaseClient {
    tables: Arc<Mutex<HashMap<String, Vec<Record>>>>,
    config: MockConfig,
    backend: BackendKind,
    unique_fields: Vec<String>,
    call_count: AtomicU64,
    is_healthy: AtomicBool,
    connected: AtomicBool,
}

impl MockDatabaseClient {
    /// Creates a new mock with default (success) configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(MockConfig::success())
    }

    /// Creates a new mock with the given configuration.
    #[must_use]
    pub fn with_config(config: MockConfig) -> Self {
        Self {
            tables: Arc::new(Mutex::new(HashMap::new())),
            config,
            backend: BackendKind::Relational,
            unique_fields: Vec::new(),
            call_count: AtomicU64::new(0),
            is_healthy: AtomicBool::new(true),
            connected: AtomicBool::new(true),
        }
    }

    /// Creates a mock that always fails.
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_config(MockConfig::failure(message))
    }

    /// Creates a mock that rejects data operations until `connect` is called.
    #[must_use]
    pub fn disconnected() -> Self {
        let mock = Self::new();
        mock.connected.store(false, Ordering::Relaxed);
        mock
    }

    /// Reports `backend` instead of the relational default.
    #[must_use]
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Rejects creates and updates that would duplicate `field` within a table.
    #[must_use]
    pub fn with_unique_field(mut self, field: impl Into<String>) -> Self {
        self.unique_fields.push(field.into());
        self
    }

    /// Gets the number of times any method was called.
    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Sets the health status.
    pub fn set_healthy(&self, healthy: bool) {
        self.is_healthy.store(healthy, Ordering::Relaxed);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Gets all records stored in `table`, in insertion order.
    pub fn records(&self, table: &str) -> Vec<Record> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    async fn begin_call(&self) -> Result<(), AppError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);

        if let Some(ms) = self.config.latency_ms {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }

        if !self.is_connected() {
            return Err(DatabaseError::not_connected("mock").into());
        }

        if self.config.should_fail {
            let msg = self
                .config
                .error_message
                .clone()
                .unwrap_or_else(|| "Mock database error".to_string());
            return Err(AppError::Database(DatabaseError::query(msg)));
        }
        Ok(())
    }

    fn check_unique(
        &self,
        rows: &[Record],
        candidate: &Record,
        skip_id: Option<&str>,
    ) -> Result<(), AppError> {
        for field in &self.unique_fields {
            let Some(value) = candidate.get(field) else {
                continue;
            };
            let duplicate = rows
                .iter()
                .filter(|row| skip_id.is_none_or(|id| row.id() != Some(id)))
                .any(|row| row.get(field) == Some(value));
            if duplicate {
                return Err(DatabaseError::Validation(format!(
                    "duplicate value for unique field '{field}'"
                ))
                .into());
            }
        }
        Ok(())
    }
}

impl Default for MockDatabaseClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    fn backend(&self) -> BackendKind {
        self.backend
    }

    async fn connect(&self) -> Result<(), AppError> {
        self.connected.store(true, Ordering::Relaxed);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), AppError> {
        self.connected.store(false, Ordering::Relaxed);
        Ok(())
    }

    async fn health_check(&self) -> Result<(), AppError> {
        self.begin_call().await?;

        if !self.is_healthy.load(Ordering::Relaxed) {
            return Err(AppError::Database(DatabaseError::connection(
                "Mock database unhealthy",
            )));
        }
        Ok(())
    }

    async fn query(&self, query: &QueryExpr) -> Result<Vec<Record>, AppError> {
        self.begin_call().await?;

        let QueryExpr::Filter(filter) = query else {
            return Err(AppError::NotSupported(
                "raw SQL queries are not supported by the mock backend".to_string(),
            ));
        };

        let tables = self.tables.lock().unwrap();
        let matches = tables
            .get(&filter.table)
            .into_iter()
            .flatten()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect();
        Ok(filter.order_and_limit(matches))
    }

    async fn create(&self, table: &str, record: Record) -> Result<Record, AppError> {
        self.begin_call().await?;

        let record = record.prepare_new();
        let mut tables = self.tables.lock().unwrap();
        let rows = tables.entry(table.to_string()).or_default();
        self.check_unique(rows, &record, None)?;
        rows.push(record.clone());
        Ok(record)
    }

    async fn update(&self, table: &str, id: &str, changes: Record) -> Result<Record, AppError> {
        self.begin_call().await?;

        let changes = changes.prepare_changes();
        let mut tables = self.tables.lock().unwrap();
        let rows = tables.entry(table.to_string()).or_default();
        let index = rows
            .iter()
            .position(|row| row.id() == Some(id))
            .ok_or_else(|| DatabaseError::NotFound(format!("{table}/{id}")))?;
        self.check_unique(rows, &changes, Some(id))?;

        let row = &mut rows[index];
        row.merge(changes);
        Ok(row.clone())
    }

    async fn delete(&self, table: &str, id: &str) -> Result<(), AppError> {
        self.begin_call().await?;

        if let Some(rows) = self.tables.lock().unwrap().get_mut(table) {
            rows.retain(|row| row.id() != Some(id));
        }
        Ok(())
    }

    async fn get(&self, table: &str, id: &str) -> Result<Option<Record>, AppError> {
        self.begin_call().await?;

        let tables = self.tables.lock().unwrap();
        Ok(tables
            .get(table)
            .and_then(|rows| rows.iter().find(|row| row.id() == Some(id)))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CREATED_AT_FIELD, Condition, FilterQuery, ID_FIELD, UPDATED_AT_FIELD};
    use serde_json::json;

    fn person(name: &str, email: &str) -> Record {
        Record::new().with("name", name).with("email", email)
    }

    #[tokio::test]
    async fn test_create_then_get_round_trip() {
        let db = MockDatabaseClient::new();

        let created = db.create("users", person("A", "a@b.com")).await.unwrap();
        let id = created.id().unwrap().to_string();
        assert_eq!(created.get(CREATED_AT_FIELD), created.get(UPDATED_AT_FIELD));

        let fetched = db.get("users", &id).await.unwrap().unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.get("name"), Some(&json!("A")));
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let db = MockDatabaseClient::new();
        assert!(db.get("users", "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let db = MockDatabaseClient::new();
        let created = db.create("users", person("A", "a@b.com")).await.unwrap();
        let id = created.id().unwrap();

        db.delete("users", id).await.unwrap();
        db.delete("users", id).await.unwrap();
        db.delete("users", "never-existed").await.unwrap();
        assert!(db.get("users", id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_merges_and_preserves_identity() {
        let db = MockDatabaseClient::new();
        let created = db.create("users", person("A", "a@b.com")).await.unwrap();
        let id = created.id().unwrap();

        let changes = Record::new()
            .with("name", "B")
            .with(ID_FIELD, "hijack")
            .with(CREATED_AT_FIELD, "1970-01-01T00:00:00Z");
        let updated = db.update("users", id, changes).await.unwrap();

        assert_eq!(updated.id(), Some(id));
        assert_eq!(updated.get("name"), Some(&json!("B")));
        assert_eq!(updated.get("email"), Some(&json!("a@b.com")));
        assert_eq!(updated.get(CREATED_AT_FIELD), created.get(CREATED_AT_FIELD));
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let db = MockDatabaseClient::new();
        let err = db
            .update("users", "missing", Record::new().with("name", "B"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_update_missing_with_duplicate_unique_value_is_not_found() {
        let db = MockDatabaseClient::new().with_unique_field("email");
        db.create("users", person("A", "a@b.com")).await.unwrap();

        let err = db
            .update("users", "missing", Record::new().with("email", "a@b.com"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_update_to_duplicate_unique_value_is_validation_error() {
        let db = MockDatabaseClient::new().with_unique_field("email");
        db.create("users", person("A", "a@b.com")).await.unwrap();
        let other = db.create("users", person("B", "b@b.com")).await.unwrap();

        let err = db
            .update(
                "users",
                other.id().unwrap(),
                Record::new().with("email", "a@b.com"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Database(DatabaseError::Validation(_))));
    }

    #[tokio::test]
    async fn test_query_empty_table_returns_empty_vec() {
        let db = MockDatabaseClient::new();
        let rows = db.query(&QueryExpr::table("users")).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_query_filters_and_limits_in_creation_order() {
        let db = MockDatabaseClient::new();
        for (name, email) in [("C", "c@x.com"), ("B", "b@y.com"), ("A", "a@x.com")] {
            db.create("users", person(name, email)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let query = FilterQuery::new("users").filter(Condition::contains("email", "@x."));
        let rows = db.query(&query.clone().into()).await.unwrap();
        let names: Vec<_> = rows.iter().map(|r| r.get("name").unwrap().clone()).collect();
        assert_eq!(names, vec![json!("C"), json!("A")]);

        let rows = db.query(&query.limit(1).into()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("name"), Some(&json!("C")));
    }

    #[tokio::test]
    async fn test_raw_query_not_supported() {
        let db = MockDatabaseClient::new();
        let err = db
            .query(&QueryExpr::raw("SELECT 1", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotSupported(_)));
    }

    #[tokio::test]
    async fn test_unique_field_violation_is_validation_error() {
        let db = MockDatabaseClient::new().with_unique_field("email");
        db.create("users", person("A", "a@b.com")).await.unwrap();

        let err = db
            .create("users", person("B", "a@b.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Database(DatabaseError::Validation(_))));
        assert_eq!(db.records("users").len(), 1);
    }

    #[tokio::test]
    async fn test_disconnected_mock_rejects_operations() {
        let db = MockDatabaseClient::disconnected();
        let err = db.get("users", "1").await.unwrap_err();
        assert!(matches!(err, AppError::Database(DatabaseError::Connection { .. })));

        db.connect().await.unwrap();
        assert!(db.get("users", "1").await.unwrap().is_none());

        db.disconnect().await.unwrap();
        db.disconnect().await.unwrap();
        assert!(!db.is_connected());
    }

    #[tokio::test]
    async fn test_mock_database_failure() {
        let db = MockDatabaseClient::failing("Test error");
        let result = db.get("users", "test").await;
        assert!(matches!(
            result,
            Err(AppError::Database(DatabaseError::Query { ref message, .. })) if message == "Test error"
        ));
    }

    #[tokio::test]
    async fn test_mock_database_call_count() {
        let db = MockDatabaseClient::new();
        assert_eq!(db.call_count(), 0);

        let _ = db.get("users", "1").await;
        let _ = db.health_check().await;
        assert_eq!(db.call_count(), 2);
    }

    #[tokio::test]
    async fn test_latency_is_simulated() {
        let db = MockDatabaseClient::with_config(MockConfig::success().with_latency(20));
        let started = std::time::Instant::now();
        db.get("users", "1").await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_health_reflects_flag() {
        let db = MockDatabaseClient::new();
        assert!(db.health_check().await.is_ok());
        db.set_healthy(false);
        assert!(db.health_check().await.is_err());
    }
}
