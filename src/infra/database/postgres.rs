//! PostgreSQL database client implementation.
//!
//! Records cross the wire as a single `jsonb` parameter expanded with
//! `jsonb_populate_record`, so Postgres applies the column types, and rows
//! come back as `to_jsonb(row)`. Table and field names are interpolated into
//! statements and therefore must be simple SQL identifiers.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPoolOptions};
use sqlx::query::QueryScalar;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres};
use tokio::sync::RwLock;
use tracing::{info, instrument};

use super::config::{DatabaseConfig, PoolConfig};
use crate::domain::{
    AppError, BackendCapabilities, BackendKind, CREATED_AT_FIELD, DatabaseClient, DatabaseError,
    FilterOp, FilterQuery, ID_FIELD, QueryExpr, Record,
};

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 5432;
/// Postgres truncates identifiers longer than this.
const MAX_IDENTIFIER_LEN: usize = 63;

type RecordQuery<'q> = QueryScalar<'q, Postgres, Json<Value>, PgArguments>;

/// PostgreSQL database client with connection pooling.
///
/// The pool is created by `connect()`; it is safe to share across tasks.
pub struct PostgresClient {
    options: PgConnectOptions,
    pool_config: PoolConfig,
    run_migrations: bool,
    pool: RwLock<Option<PgPool>>,
}

impl PostgresClient {
    /// Create an unconnected client from the relational part of `config`
    pub fn new(config: &DatabaseConfig) -> Self {
        let mut options = PgConnectOptions::new()
            .host(config.host.as_deref().unwrap_or(DEFAULT_HOST))
            .port(config.port.unwrap_or(DEFAULT_PORT));
        if let Some(database) = &config.database {
            options = options.database(database);
        }
        if let Some(username) = &config.username {
            options = options.username(username);
        }
        if let Some(password) = &config.password {
            options = options.password(password.expose_secret());
        }

        Self {
            options,
            pool_config: config.pool.clone(),
            run_migrations: config.run_migrations,
            pool: RwLock::new(None),
        }
    }

    async fn migrate(pool: &PgPool) -> Result<(), AppError> {
        info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(pool).await?;
        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get a handle to the connection pool
    pub async fn pool(&self) -> Result<PgPool, AppError> {
        self.pool
            .read()
            .await
            .clone()
            .ok_or_else(|| DatabaseError::not_connected("postgres").into())
    }

    async fn fetch_records(&self, query: RecordQuery<'_>) -> Result<Vec<Record>, AppError> {
        let pool = self.pool().await?;
        let rows = query
            .fetch_all(&pool)
            .await
            .map_err(DatabaseError::from)?;
        rows.into_iter()
            .map(|Json(value)| Record::try_from(value))
            .collect()
    }

    async fn query_filter(&self, query: &FilterQuery) -> Result<Vec<Record>, AppError> {
        let sql = filter_sql(query)?;
        let mut statement = record_query(&sql);
        for condition in &query.conditions {
            statement = statement
                .bind(condition.field.as_str())
                .bind(Json(&condition.value));
        }
        self.fetch_records(statement).await
    }

    async fn query_raw(&self, sql: &str, params: &[Value]) -> Result<Vec<Record>, AppError> {
        let sql = raw_sql(sql);
        let statement = params.iter().fold(record_query(&sql), bind_param);
        self.fetch_records(statement).await
    }
}

#[async_trait]
impl DatabaseClient for PostgresClient {
    fn backend(&self) -> BackendKind {
        BackendKind::Relational
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities { raw_sql: true }
    }

    #[instrument(skip(self))]
    async fn connect(&self) -> Result<(), AppError> {
        let mut guard = self.pool.write().await;
        if guard.is_some() {
            return Ok(());
        }

        info!(
            host = %self.options.get_host(),
            port = self.options.get_port(),
            "Connecting to PostgreSQL..."
        );
        let pool = PgPoolOptions::new()
            .max_connections(self.pool_config.max_connections)
            .min_connections(self.pool_config.min_connections)
            .acquire_timeout(self.pool_config.acquire_timeout)
            .idle_timeout(self.pool_config.idle_timeout)
            .max_lifetime(self.pool_config.max_lifetime)
            .connect_with(self.options.clone())
            .await
            .map_err(|e| DatabaseError::connection(e.to_string()).with_source(e))?;

        if self.run_migrations {
            Self::migrate(&pool).await?;
        }

        *guard = Some(pool);
        info!("Connected to PostgreSQL");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn disconnect(&self) -> Result<(), AppError> {
        let pool = self.pool.write().await.take();
        if let Some(pool) = pool {
            pool.close().await;
            info!("Disconnected from PostgreSQL");
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        let pool = self.pool().await?;
        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(|e| DatabaseError::connection(e.to_string()).with_source(e))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn query(&self, query: &QueryExpr) -> Result<Vec<Record>, AppError> {
        match query {
            QueryExpr::Filter(filter) => self.query_filter(filter).await,
            QueryExpr::Raw { sql, params } => self.query_raw(sql, params).await,
        }
    }

    #[instrument(skip(self, record))]
    async fn create(&self, table: &str, record: Record) -> Result<Record, AppError> {
        let record = record.prepare_new();
        let sql = insert_sql(table, &record)?;
        let pool = self.pool().await?;

        let Json(stored) = record_query(&sql)
            .bind(Json(record.as_map()))
            .fetch_one(&pool)
            .await
            .map_err(DatabaseError::from)?;

        let stored = Record::try_from(stored)?;
        info!(id = ?stored.id(), "Record created");
        Ok(stored)
    }

    #[instrument(skip(self, changes))]
    async fn update(&self, table: &str, id: &str, changes: Record) -> Result<Record, AppError> {
        let changes = changes.prepare_changes();
        let sql = update_sql(table, &changes)?;
        let pool = self.pool().await?;

        let row = record_query(&sql)
            .bind(Json(changes.as_map()))
            .bind(id)
            .fetch_optional(&pool)
            .await
            .map_err(DatabaseError::from)?;

        match row {
            Some(Json(updated)) => Record::try_from(updated),
            None => Err(DatabaseError::NotFound(format!("{table}/{id}")).into()),
        }
    }

    #[instrument(skip(self))]
    async fn delete(&self, table: &str, id: &str) -> Result<(), AppError> {
        let sql = delete_sql(table)?;
        let pool = self.pool().await?;

        let result = sqlx::query(&sql)
            .bind(id)
            .execute(&pool)
            .await
            .map_err(DatabaseError::from)?;

        info!(rows_affected = result.rows_affected(), "Delete executed");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, table: &str, id: &str) -> Result<Option<Record>, AppError> {
        let sql = select_by_id_sql(table)?;
        let pool = self.pool().await?;

        let row = record_query(&sql)
            .bind(id)
            .fetch_optional(&pool)
            .await
            .map_err(DatabaseError::from)?;

        row.map(|Json(value)| Record::try_from(value)).transpose()
    }
}

fn record_query(sql: &str) -> RecordQuery<'_> {
    sqlx::query_scalar(sql)
}

/// Binds a raw-query parameter with the closest native Postgres type.
fn bind_param<'q>(statement: RecordQuery<'q>, value: &'q Value) -> RecordQuery<'q> {
    match value {
        Value::Null => statement.bind(None::<String>),
        Value::Bool(b) => statement.bind(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => statement.bind(i),
            None => statement.bind(n.as_f64()),
        },
        Value::String(s) => statement.bind(s.as_str()),
        other => statement.bind(Json(other)),
    }
}

/// Validates and double-quotes a table or column name.
fn quote_identifier(name: &str) -> Result<String, DatabaseError> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !valid_start || !valid_rest || name.len() > MAX_IDENTIFIER_LEN {
        return Err(DatabaseError::Validation(format!(
            "'{name}' is not a valid table or field name"
        )));
    }
    Ok(format!("\"{name}\""))
}

fn quoted_columns(record: &Record) -> Result<Vec<String>, DatabaseError> {
    record
        .fields()
        .map(|(field, _)| quote_identifier(field))
        .collect()
}

fn insert_sql(table: &str, record: &Record) -> Result<String, DatabaseError> {
    let table = quote_identifier(table)?;
    let columns = quoted_columns(record)?.join(", ");
    Ok(format!(
        "INSERT INTO {table} AS t ({columns}) \
         SELECT {columns} FROM jsonb_populate_record(NULL::{table}, $1) \
         RETURNING to_jsonb(t) AS record"
    ))
}

fn update_sql(table: &str, changes: &Record) -> Result<String, DatabaseError> {
    let table = quote_identifier(table)?;
    let id = quote_identifier(ID_FIELD)?;
    let assignments = quoted_columns(changes)?
        .iter()
        .map(|column| format!("{column} = src.{column}"))
        .collect::<Vec<_>>()
        .join(", ");
    Ok(format!(
        "UPDATE {table} AS t SET {assignments} \
         FROM jsonb_populate_record(NULL::{table}, $1) AS src \
         WHERE t.{id}::text = $2 \
         RETURNING to_jsonb(t) AS record"
    ))
}

fn select_by_id_sql(table: &str) -> Result<String, DatabaseError> {
    let table = quote_identifier(table)?;
    let id = quote_identifier(ID_FIELD)?;
    Ok(format!(
        "SELECT to_jsonb(t) AS record FROM {table} AS t WHERE t.{id}::text = $1"
    ))
}

fn delete_sql(table: &str) -> Result<String, DatabaseError> {
    let table = quote_identifier(table)?;
    let id = quote_identifier(ID_FIELD)?;
    Ok(format!("DELETE FROM {table} WHERE {id}::text = $1"))
}

/// Renders the predicate for one condition; `field` and `value` are the
/// placeholders bound to the field name (text) and operand (jsonb).
fn condition_sql(op: FilterOp, field: &str, value: &str) -> String {
    let actual = format!("(r.doc -> {field})");
    let ordered =
        |symbol: &str| format!("(jsonb_typeof({actual}) = jsonb_typeof({value}) AND {actual} {symbol} {value})");
    match op {
        FilterOp::Eq => format!("{actual} = {value}"),
        FilterOp::Ne => format!("{actual} <> {value}"),
        FilterOp::Lt => ordered("<"),
        FilterOp::Lte => ordered("<="),
        FilterOp::Gt => ordered(">"),
        FilterOp::Gte => ordered(">="),
        FilterOp::Contains => format!(
            "(CASE jsonb_typeof({actual}) \
             WHEN 'array' THEN {actual} @> jsonb_build_array({value}) \
             WHEN 'string' THEN jsonb_typeof({value}) = 'string' \
             AND strpos(r.doc ->> {field}, {value} #>> '{{}}') > 0 \
             ELSE false END)"
        ),
    }
}

fn filter_sql(query: &FilterQuery) -> Result<String, DatabaseError> {
    let table = quote_identifier(&query.table)?;
    let mut sql = format!("SELECT r.doc AS record FROM (SELECT to_jsonb(t) AS doc FROM {table} AS t) AS r");

    let predicates: Vec<String> = query
        .conditions
        .iter()
        .enumerate()
        .map(|(i, condition)| {
            let field = format!("${}", 2 * i + 1);
            let value = format!("${}", 2 * i + 2);
            condition_sql(condition.op, &field, &value)
        })
        .collect();
    if !predicates.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&predicates.join(" AND "));
    }
    // Byte order, matching `FilterQuery::order_and_limit`.
    sql.push_str(&format!(
        " ORDER BY (r.doc ->> '{CREATED_AT_FIELD}') COLLATE \"C\" NULLS FIRST, \
         (r.doc ->> '{ID_FIELD}') COLLATE \"C\" NULLS FIRST"
    ));
    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }
    Ok(sql)
}

fn raw_sql(sql: &str) -> String {
    let inner = sql.trim().trim_end_matches(';');
    format!("SELECT to_jsonb(q) AS record FROM ({inner}) AS q")
}
