//! # previewd-engine
//!
//! The on-demand derivative generation engine. Turns an already-authorized
//! source file (image, HEIC photo, video, PDF, 3D mesh) into a small,
//! browser-displayable artifact by orchestrating external converters under
//! bounded concurrency, with an on-disk cache.
//!
//! Entry point is [`coordinator::PreviewCoordinator`]; everything else is
//! a supporting component it composes:
//!
//! - [`classify`] — extension → source kind
//! - [`cache`] — deterministic cache keys and the artifact store
//! - [`limiter`] — process-wide conversion slot semaphore
//! - [`supervisor`] — external process invocation with timeout/kill
//! - [`probe`] — startup tool availability checks
//! - [`strategies`] — per-source-kind conversion logic

pub mod cache;
pub mod classify;
pub mod coordinator;
pub mod error;
pub mod jobs;
pub mod limiter;
pub mod probe;
pub mod request;
pub mod scratch;
pub mod strategies;
pub mod supervisor;

pub use cache::{Artifact, CacheKey, DerivativeCache};
pub use classify::SourceKind;
pub use coordinator::PreviewCoordinator;
pub use error::PreviewError;
pub use jobs::{JobRecord, JobState};
pub use limiter::ConversionLimiter;
pub use request::{CacheScope, DerivativeKind, DerivativeRequest, PreviewParams};
