//! Application state shared across all handlers.

use std::sync::Arc;

use previewd_core::config::AppConfig;
use previewd_engine::PreviewCoordinator;

/// Application state containing all shared dependencies.
///
/// Passed to every Axum handler via `State<AppState>`. Both fields are
/// cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Derivative generation coordinator.
    pub coordinator: PreviewCoordinator,
}
