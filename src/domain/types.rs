use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::{AppError, ConfigError};

/// Represents a unique identifier for persisted records.
pub type EntityId = String;

/// Name of the identifier field present on every persisted record.
pub const ID_FIELD: &str = "id";
/// Name of the creation timestamp stamped by `create`.
pub const CREATED_AT_FIELD: &str = "createdAt";
/// Name of the modification timestamp refreshed by `create` and `update`.
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// Current time rendered the way records store timestamps (RFC 3339, UTC, microseconds).
#[must_use]
pub fn timestamp_now() -> String {
    format_timestamp(Utc::now())
}

#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// An opaque, application-defined mapping from field name to value.
///
/// The storage layer only interprets the identifier and timestamp fields;
/// every other field is passed through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    #[must_use]
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builds a record from any value that serializes to a JSON object.
    pub fn from_serializable<T: Serialize>(value: &T) -> Result<Self, AppError> {
        match serde_json::to_value(value)? {
            Value::Object(map) => Ok(Self(map)),
            other => Err(AppError::Serialization(format!(
                "expected a JSON object, got {other}"
            ))),
        }
    }

    /// Converts the record into a typed domain value.
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<T, AppError> {
        Ok(serde_json::from_value(Value::Object(self.0))?)
    }

    /// The record identifier, when present and a string.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.0.get(ID_FIELD).and_then(Value::as_str)
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    #[must_use]
    pub fn contains_field(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Overwrites fields present in `changes`; fields absent from it are kept.
    pub fn merge(&mut self, changes: Record) {
        for (field, value) in changes.0 {
            self.0.insert(field, value);
        }
    }

    /// Stamps a freshly generated identifier and equal creation/modification
    /// timestamps, replacing whatever the caller supplied for those fields.
    #[must_use]
    pub fn prepare_new(mut self) -> Self {
        let now = timestamp_now();
        self.insert(ID_FIELD, uuid::Uuid::new_v4().to_string());
        self.insert(CREATED_AT_FIELD, now.clone());
        self.insert(UPDATED_AT_FIELD, now);
        self
    }

    /// Drops the immutable fields from a change set and refreshes `updatedAt`.
    #[must_use]
    pub fn prepare_changes(mut self) -> Self {
        self.remove(ID_FIELD);
        self.remove(CREATED_AT_FIELD);
        self.insert(UPDATED_AT_FIELD, timestamp_now());
        self
    }

    /// Sort key of query results: `createdAt`, then `id`.
    fn creation_key(&self) -> (Option<&str>, Option<&str>) {
        (
            self.get(CREATED_AT_FIELD).and_then(Value::as_str),
            self.id(),
        )
    }

    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    #[must_use]
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Object(record.0)
    }
}

impl TryFrom<Value> for Record {
    type Error = AppError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(AppError::Serialization(format!(
                "expected a JSON object, got {other}"
            ))),
        }
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Comparison applied by a [`Condition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    /// Substring match on strings, element match on arrays.
    Contains,
}

/// A backend-agnostic `field <op> value` predicate.
///
/// A condition on a field the record does not carry never matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Condition {
    pub fn new(field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Eq, value)
    }

    pub fn contains(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Contains, value)
    }

    /// Evaluates the condition against a record in process.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        let Some(actual) = record.get(&self.field) else {
            return false;
        };
        match self.op {
            FilterOp::Eq => actual == &self.value,
            FilterOp::Ne => actual != &self.value,
            FilterOp::Lt => compare_values(actual, &self.value) == Some(Ordering::Less),
            FilterOp::Lte => matches!(
                compare_values(actual, &self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            FilterOp::Gt => compare_values(actual, &self.value) == Some(Ordering::Greater),
            FilterOp::Gte => matches!(
                compare_values(actual, &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOp::Contains => match (actual, &self.value) {
                (Value::String(haystack), Value::String(needle)) => haystack.contains(needle),
                (Value::Array(items), needle) => items.contains(needle),
                _ => false,
            },
        }
    }
}

/// Orders two scalars of the same JSON type; mixed types are incomparable.
fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => l.as_f64()?.partial_cmp(&r.as_f64()?),
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        (Value::Bool(l), Value::Bool(r)) => Some(l.cmp(r)),
        _ => None,
    }
}

/// Scan of one table filtered by ANDed conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterQuery {
    pub table: String,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl FilterQuery {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            conditions: Vec::new(),
            limit: None,
        }
    }

    #[must_use]
    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        self.conditions.iter().all(|c| c.matches(record))
    }

    /// Puts matching records in result order (oldest `createdAt` first, ties
    /// broken by `id`) and applies the limit.
    #[must_use]
    pub fn order_and_limit(&self, mut records: Vec<Record>) -> Vec<Record> {
        records.sort_by(|a, b| a.creation_key().cmp(&b.creation_key()));
        if let Some(limit) = self.limit {
            records.truncate(limit);
        }
        records
    }
}

/// Query accepted by [`crate::domain::DatabaseClient::query`].
///
/// `Filter` is honored by every backend. `Raw` carries backend-native SQL and
/// is only accepted by clients whose capabilities report `raw_sql`.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryExpr {
    Filter(FilterQuery),
    Raw { sql: String, params: Vec<Value> },
}

impl QueryExpr {
    /// All records of a table.
    pub fn table(table: impl Into<String>) -> Self {
        QueryExpr::Filter(FilterQuery::new(table))
    }

    pub fn raw(sql: impl Into<String>, params: Vec<Value>) -> Self {
        QueryExpr::Raw {
            sql: sql.into(),
            params,
        }
    }
}

impl From<FilterQuery> for QueryExpr {
    fn from(query: FilterQuery) -> Self {
        QueryExpr::Filter(query)
    }
}

/// Storage technology family behind a database client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Connection-oriented SQL store.
    Relational,
    /// Key-addressed managed store.
    Managed,
}

impl BackendKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Relational => "relational",
            BackendKind::Managed => "managed",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional query features a backend may support.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendCapabilities {
    /// Accepts `QueryExpr::Raw`.
    pub raw_sql: bool,
}

/// Deployment stage. Parsed case-sensitively from an environment label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Environment {
    Development,
    Local,
    Staging,
    Production,
}

impl Environment {
    pub const ALL: [Environment; 4] = [
        Environment::Development,
        Environment::Local,
        Environment::Staging,
        Environment::Production,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Local => "local",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }

    /// Backend family used for this stage.
    #[must_use]
    pub fn backend(self) -> BackendKind {
        match self {
            Environment::Development | Environment::Local => BackendKind::Relational,
            Environment::Staging | Environment::Production => BackendKind::Managed,
        }
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        Environment::ALL
            .into_iter()
            .find(|env| env.as_str() == label)
            .ok_or_else(|| ConfigError::UnsupportedEnvironment(label.to_string()))
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error details in API responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub r#type: String,
    pub message: String,
}

/// Error envelope returned by the HTTP layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

/// Health check status for services.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Health check response for the application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub database: HealthStatus,
    pub backend: BackendKind,
    pub timestamp: DateTime<Utc>,
}

impl HealthResponse {
    pub fn new(database: HealthStatus, backend: BackendKind) -> Self {
        Self {
            status: database.clone(),
            database,
            backend,
            timestamp: Utc::now(),
        }
    }
}
