//! # previewd-api
//!
//! HTTP surface for the derivative engine: route definitions, request
//! handlers, and the `AppError` → HTTP response mapping.

pub mod error;
pub mod handlers;
pub mod router;
pub mod state;

pub use error::ApiError;
pub use router::build_router;
pub use state::AppState;
