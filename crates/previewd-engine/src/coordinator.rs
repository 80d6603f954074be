//! Request coordination: cache lookup, in-flight deduplication, limiter
//! admission, strategy dispatch, and persistence.
//!
//! The coordinator is the only entry point callers use. Ordering per
//! request: existence check, classification, compatibility check, cache
//! probe, then conversion under a permit. Cheap rejections never touch
//! the limiter or spawn a process.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use previewd_core::error::AppError;
use previewd_core::result::AppResult;

use crate::cache::{self, Artifact, CacheKey, DerivativeCache};
use crate::classify::{self, SourceKind};
use crate::error::PreviewError;
use crate::jobs::{JobRecord, JobRegistry};
use crate::limiter::ConversionLimiter;
use crate::request::{DerivativeKind, DerivativeRequest};
use crate::strategies::ConverterStrategy;

type InflightCell = Arc<OnceCell<Result<Artifact, AppError>>>;

/// Coordinates derivative generation across the cache, the limiter, and
/// the per-kind strategies. Cheap to clone; all state is shared.
#[derive(Clone)]
pub struct PreviewCoordinator {
    cache: DerivativeCache,
    limiter: ConversionLimiter,
    strategies: Arc<HashMap<SourceKind, Arc<dyn ConverterStrategy>>>,
    /// One cell per cache key currently being produced. Later arrivals
    /// for the same key await the cell instead of converting again.
    inflight: Arc<DashMap<String, InflightCell>>,
    jobs: JobRegistry,
}

impl PreviewCoordinator {
    pub fn new(
        cache: DerivativeCache,
        limiter: ConversionLimiter,
        strategies: HashMap<SourceKind, Arc<dyn ConverterStrategy>>,
    ) -> Self {
        Self {
            cache,
            limiter,
            strategies: Arc::new(strategies),
            inflight: Arc::new(DashMap::new()),
            jobs: JobRegistry::new(),
        }
    }

    /// Produce (or fetch) the requested derivative, blocking until it is
    /// ready or the conversion fails.
    pub async fn get_derivative(&self, req: &DerivativeRequest) -> AppResult<Artifact> {
        if !tokio::fs::try_exists(&req.source_path).await.unwrap_or(false) {
            return Err(PreviewError::SourceMissing {
                path: req.source_path.clone(),
            }
            .into());
        }

        let source = SourceKind::from_file_name(&req.file_name);
        if source == SourceKind::Unsupported {
            return Err(PreviewError::Unsupported {
                extension: req.extension().unwrap_or_default(),
            }
            .into());
        }
        if !compatible(req.kind, source) {
            return Err(PreviewError::IncompatibleDerivative {
                derivative: req.kind.name(),
                source_kind: source.name(),
            }
            .into());
        }

        // GLB/glTF sources are already web-viewable: serve the file
        // directly, no permit and no cache entry.
        if source == SourceKind::Model3D {
            if let Some(ext) = req.extension() {
                if classify::is_web_native_model(&ext) {
                    let data = tokio::fs::read(&req.source_path)
                        .await
                        .map_err(PreviewError::from)?;
                    return Ok(Artifact {
                        data: data.into(),
                        content_type: cache::content_type_for(&ext).to_string(),
                        modified: Utc::now(),
                    });
                }
            }
        }

        let key = CacheKey::for_request(req);
        if let Some(artifact) = self.cache.read(req.kind, &key).await? {
            debug!(key = %key, "Derivative cache hit");
            return Ok(artifact);
        }

        // Deduplicate concurrent conversions of the same key. The first
        // arrival runs the conversion inside the cell; others await it.
        // The entry guard must not be held across an await point.
        let cell: InflightCell = self
            .inflight
            .entry(key.as_str().to_string())
            .or_default()
            .clone();

        let result = cell
            .get_or_init(|| self.run_conversion(req, source, &key))
            .await
            .clone();

        // Evict only this request's own cell. A stale waiter resuming
        // after a failed conversion must not remove a newer in-flight
        // entry that another request has since created under the key.
        self.inflight
            .remove_if(key.as_str(), |_, v| Arc::ptr_eq(v, &cell));
        result
    }

    /// Return the cached artifact if present, without converting.
    pub async fn cached(&self, req: &DerivativeRequest) -> AppResult<Option<Artifact>> {
        let key = CacheKey::for_request(req);
        Ok(self.cache.read(req.kind, &key).await?)
    }

    /// Accept a warm-up conversion and return immediately with a pending
    /// job record. The conversion runs in the background; its terminal
    /// state is observable through [`PreviewCoordinator::job`].
    pub fn enqueue(&self, req: DerivativeRequest) -> JobRecord {
        let key = CacheKey::for_request(&req);
        let record = self.jobs.mark_pending(key.as_str());

        let coordinator = self.clone();
        tokio::spawn(async move {
            match coordinator.get_derivative(&req).await {
                Ok(_) => coordinator.jobs.mark_done(key.as_str()),
                Err(e) => {
                    warn!(key = %key, error = %e, "Background conversion failed");
                    coordinator.jobs.mark_failed(key.as_str(), e.message.clone());
                }
            }
        });

        record
    }

    /// Look up a warm-up job by cache key.
    pub fn job(&self, key: &str) -> Option<JobRecord> {
        self.jobs.get(key)
    }

    /// Read a model companion blob by file name.
    pub async fn blob(&self, file_name: &str) -> AppResult<Option<Artifact>> {
        Ok(self.cache.read_blob(file_name).await?)
    }

    async fn run_conversion(
        &self,
        req: &DerivativeRequest,
        source: SourceKind,
        key: &CacheKey,
    ) -> Result<Artifact, AppError> {
        let strategy = self
            .strategies
            .get(&source)
            .ok_or_else(|| PreviewError::Unsupported {
                extension: req.extension().unwrap_or_default(),
            })?;

        let _permit = self.limiter.acquire().await?;
        let started = std::time::Instant::now();

        let outcome = strategy.convert(req, key).await?;

        self.cache.migrate_legacy(req.kind, key).await?;
        for companion in &outcome.companions {
            self.cache
                .write_blob(&companion.file_name, &companion.data)
                .await?;
        }
        self.cache
            .write(req.kind, key, outcome.extension, &outcome.data)
            .await?;

        info!(
            key = %key,
            kind = req.kind.name(),
            source = source.name(),
            size = outcome.data.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Derivative generated"
        );

        Ok(Artifact {
            data: outcome.data,
            content_type: cache::content_type_for(outcome.extension).to_string(),
            modified: Utc::now(),
        })
    }
}

/// Which derivative kinds each source kind can produce.
fn compatible(kind: DerivativeKind, source: SourceKind) -> bool {
    match kind {
        DerivativeKind::Thumbnail => matches!(
            source,
            SourceKind::RasterImage | SourceKind::HeicImage | SourceKind::Video | SourceKind::Pdf
        ),
        DerivativeKind::OptimizedImage => {
            matches!(source, SourceKind::RasterImage | SourceKind::HeicImage)
        }
        DerivativeKind::WebModel => source == SourceKind::Model3D,
    }
}
