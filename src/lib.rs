//! User-management backend for a job-application platform.
//!
//! Persistence goes through a single backend-independent trait,
//! [`domain::DatabaseClient`], with two adapters: PostgreSQL for
//! `development`/`local` and DynamoDB for `staging`/`production`.
//! [`infra::DatabaseClientFactory`] is the only place that knows which
//! environment uses which backend.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                   API Layer                  │
//! │  HTTP handlers, routing, error translation   │
//! ├─────────────────────────────────────────────┤
//! │               Application Layer              │
//! │      UserService, shared request state       │
//! ├─────────────────────────────────────────────┤
//! │                 Domain Layer                 │
//! │   DatabaseClient trait, records, errors      │
//! ├─────────────────────────────────────────────┤
//! │             Infrastructure Layer             │
//! │  Postgres / DynamoDB adapters, factory, logs │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use jobapp_backend::api::create_router;
//! use jobapp_backend::app::AppState;
//! use jobapp_backend::infra::{DatabaseClientFactory, DatabaseConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = DatabaseConfig::relational("localhost", 5432, "jobapp", "app", "secret");
//!     let db = DatabaseClientFactory::create("local", &config)?;
//!     db.connect().await?;
//!
//!     let router = create_router(Arc::new(AppState::new(db)));
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, router).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod app;
pub mod config;
pub mod domain;
pub mod infra;

// Test utilities are available in tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
