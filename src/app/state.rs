//! Application state management.
//!
//! This module provides the shared application state that is
//! accessible to all request handlers via Axum's State extractor.

use std::sync::Arc;

use crate::domain::DatabaseClient;
use crate::infra::PrometheusHandle;

use super::service::UserService;

/// Shared application state for the Axum web server.
///
/// All contained types are wrapped in `Arc` and implement `Send + Sync`,
/// making `AppState` safe to share across async tasks.
#[derive(Clone)]
pub struct AppState {
    /// User-management use cases.
    pub service: Arc<UserService>,

    /// The client the service writes through; owned for `disconnect` at shutdown.
    pub db_client: Arc<dyn DatabaseClient>,

    /// Renders `/metrics`; `None` when no recorder is installed.
    pub metrics_handle: Option<Arc<PrometheusHandle>>,
}

impl AppState {
    /// Creates a new `AppState` with a `UserService` on the default table.
    #[must_use]
    pub fn new(db_client: Arc<dyn DatabaseClient>) -> Self {
        let service = Arc::new(UserService::new(Arc::clone(&db_client)));
        Self::with_service(service, db_client)
    }

    /// Creates a new `AppState` with a custom service.
    ///
    /// This is useful for testing when you want to inject a pre-configured service.
    #[must_use]
    pub fn with_service(service: Arc<UserService>, db_client: Arc<dyn DatabaseClient>) -> Self {
        Self {
            service,
            db_client,
            metrics_handle: None,
        }
    }

    #[must_use]
    pub fn with_metrics(mut self, handle: Option<Arc<PrometheusHandle>>) -> Self {
        self.metrics_handle = handle;
        self
    }
}
