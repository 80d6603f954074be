//! Coordinator behavior tests with a scripted in-memory strategy, covering
//! cache idempotence, concurrent deduplication, cheap-rejection ordering,
//! permit release on failure, and the async warm-up path.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use previewd_core::error::ErrorKind;
use previewd_engine::cache::{CacheKey, DerivativeCache};
use previewd_engine::error::PreviewError;
use previewd_engine::jobs::JobState;
use previewd_engine::strategies::{ConvertOutcome, ConverterStrategy};
use previewd_engine::{
    CacheScope, ConversionLimiter, DerivativeKind, DerivativeRequest, PreviewCoordinator,
    PreviewParams, SourceKind,
};

/// Strategy that returns fixed bytes after an optional delay, counting
/// how many times it actually ran.
struct ScriptedStrategy {
    invocations: Arc<AtomicUsize>,
    delay: Duration,
    fail: bool,
}

impl ScriptedStrategy {
    fn new(invocations: Arc<AtomicUsize>) -> Self {
        Self {
            invocations,
            delay: Duration::ZERO,
            fail: false,
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

#[async_trait]
impl ConverterStrategy for ScriptedStrategy {
    async fn convert(
        &self,
        _req: &DerivativeRequest,
        _key: &CacheKey,
    ) -> Result<ConvertOutcome, PreviewError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(PreviewError::ToolFailed {
                tool: "scripted".to_string(),
                code: 1,
                stderr: "scripted failure".to_string(),
            });
        }
        Ok(ConvertOutcome::single(
            Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xE0]),
            "jpg",
        ))
    }
}

struct Harness {
    coordinator: PreviewCoordinator,
    limiter: ConversionLimiter,
    files: tempfile::TempDir,
    _cache_dir: tempfile::TempDir,
}

async fn harness(kind: SourceKind, strategy: ScriptedStrategy) -> Harness {
    let files = tempfile::tempdir().expect("files dir");
    let cache_dir = tempfile::tempdir().expect("cache dir");
    let cache = DerivativeCache::open(cache_dir.path()).await.expect("open cache");
    let limiter = ConversionLimiter::new(4);

    let mut strategies: HashMap<SourceKind, Arc<dyn ConverterStrategy>> = HashMap::new();
    strategies.insert(kind, Arc::new(strategy));

    Harness {
        coordinator: PreviewCoordinator::new(cache, limiter.clone(), strategies),
        limiter,
        files,
        _cache_dir: cache_dir,
    }
}

fn request(dir: &Path, file_name: &str, kind: DerivativeKind) -> DerivativeRequest {
    DerivativeRequest {
        source_path: dir.join(file_name),
        scope: CacheScope::User("alice".to_string()),
        rel_path: "docs".to_string(),
        file_name: file_name.to_string(),
        kind,
        params: PreviewParams {
            quality: 70,
            max_width: 150,
            max_height: 150,
        },
    }
}

#[tokio::test]
async fn second_request_is_served_from_cache() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let h = harness(
        SourceKind::RasterImage,
        ScriptedStrategy::new(Arc::clone(&invocations)),
    )
    .await;
    std::fs::write(h.files.path().join("pic.png"), b"png bytes").expect("seed");

    let req = request(h.files.path(), "pic.png", DerivativeKind::Thumbnail);
    let first = h.coordinator.get_derivative(&req).await.expect("first");
    let second = h.coordinator.get_derivative(&req).await.expect("second");

    assert_eq!(invocations.load(Ordering::SeqCst), 1);
    assert_eq!(first.data, second.data);
    assert_eq!(first.content_type, "image/jpeg");
}

#[tokio::test]
async fn missing_source_is_not_found() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let h = harness(
        SourceKind::RasterImage,
        ScriptedStrategy::new(Arc::clone(&invocations)),
    )
    .await;

    let req = request(h.files.path(), "absent.png", DerivativeKind::Thumbnail);
    let err = h.coordinator.get_derivative(&req).await.expect_err("missing");

    assert_eq!(err.kind, ErrorKind::NotFound);
    assert_eq!(invocations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unsupported_extension_short_circuits() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let h = harness(
        SourceKind::RasterImage,
        ScriptedStrategy::new(Arc::clone(&invocations)),
    )
    .await;
    std::fs::write(h.files.path().join("data.xyz"), b"???").expect("seed");

    let req = request(h.files.path(), "data.xyz", DerivativeKind::Thumbnail);
    let err = h.coordinator.get_derivative(&req).await.expect_err("unsupported");

    assert_eq!(err.kind, ErrorKind::UnsupportedMedia);
    assert_eq!(invocations.load(Ordering::SeqCst), 0);
    // No permit was touched on the rejection path.
    assert_eq!(h.limiter.available_permits(), h.limiter.max_permits());
}

#[tokio::test]
async fn incompatible_derivative_is_rejected() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let h = harness(
        SourceKind::Video,
        ScriptedStrategy::new(Arc::clone(&invocations)),
    )
    .await;
    std::fs::write(h.files.path().join("clip.mp4"), b"mp4").expect("seed");

    // A video can produce a thumbnail but not an optimized web image.
    let req = request(h.files.path(), "clip.mp4", DerivativeKind::OptimizedImage);
    let err = h.coordinator.get_derivative(&req).await.expect_err("incompatible");

    assert_eq!(err.kind, ErrorKind::UnsupportedMedia);
    assert_eq!(invocations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn concurrent_requests_for_same_key_convert_once() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let h = harness(
        SourceKind::RasterImage,
        ScriptedStrategy::new(Arc::clone(&invocations)).with_delay(Duration::from_millis(50)),
    )
    .await;
    std::fs::write(h.files.path().join("pic.png"), b"png bytes").expect("seed");

    let req = request(h.files.path(), "pic.png", DerivativeKind::Thumbnail);
    let mut handles = Vec::new();
    for _ in 0..8 {
        let coordinator = h.coordinator.clone();
        let req = req.clone();
        handles.push(tokio::spawn(
            async move { coordinator.get_derivative(&req).await },
        ));
    }

    for handle in handles {
        handle.await.expect("join").expect("derivative");
    }

    assert_eq!(invocations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_conversion_releases_permit_and_is_retryable() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let h = harness(
        SourceKind::RasterImage,
        ScriptedStrategy::new(Arc::clone(&invocations)).failing(),
    )
    .await;
    std::fs::write(h.files.path().join("pic.png"), b"png bytes").expect("seed");

    let req = request(h.files.path(), "pic.png", DerivativeKind::Thumbnail);
    let err = h.coordinator.get_derivative(&req).await.expect_err("fails");
    assert_eq!(err.kind, ErrorKind::ExternalTool);
    assert_eq!(h.limiter.available_permits(), h.limiter.max_permits());

    // Failures are not cached; the next request converts again.
    let _ = h.coordinator.get_derivative(&req).await.expect_err("fails again");
    assert_eq!(invocations.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn gltf_source_is_served_without_conversion() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let h = harness(
        SourceKind::Model3D,
        ScriptedStrategy::new(Arc::clone(&invocations)),
    )
    .await;
    std::fs::write(h.files.path().join("scene.glb"), b"glTF-binary").expect("seed");

    let req = request(h.files.path(), "scene.glb", DerivativeKind::WebModel);
    let artifact = h.coordinator.get_derivative(&req).await.expect("passthrough");

    assert_eq!(&artifact.data[..], b"glTF-binary");
    assert_eq!(artifact.content_type, "model/gltf-binary");
    assert_eq!(invocations.load(Ordering::SeqCst), 0);
}

/// Strategy that fails its first run and succeeds afterwards, tracking
/// how many conversions overlap in time.
struct FlakyStrategy {
    invocations: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

#[async_trait]
impl ConverterStrategy for FlakyStrategy {
    async fn convert(
        &self,
        _req: &DerivativeRequest,
        _key: &CacheKey,
    ) -> Result<ConvertOutcome, PreviewError> {
        let run = self.invocations.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        if run == 0 {
            Err(PreviewError::ToolFailed {
                tool: "flaky".to_string(),
                code: 1,
                stderr: "first run fails".to_string(),
            })
        } else {
            Ok(ConvertOutcome::single(
                Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xE0]),
                "jpg",
            ))
        }
    }
}

#[tokio::test]
async fn dedup_holds_across_a_failed_conversion_and_retry() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let files = tempfile::tempdir().expect("files dir");
    let cache_dir = tempfile::tempdir().expect("cache dir");
    let cache = DerivativeCache::open(cache_dir.path()).await.expect("open cache");
    let mut strategies: HashMap<SourceKind, Arc<dyn ConverterStrategy>> = HashMap::new();
    strategies.insert(
        SourceKind::RasterImage,
        Arc::new(FlakyStrategy {
            invocations: Arc::clone(&invocations),
            active: Arc::clone(&active),
            peak: Arc::clone(&peak),
        }),
    );
    let coordinator = PreviewCoordinator::new(cache, ConversionLimiter::new(4), strategies);

    std::fs::write(files.path().join("pic.png"), b"png bytes").expect("seed");
    let req = request(files.path(), "pic.png", DerivativeKind::Thumbnail);

    // First wave shares the failing conversion.
    let mut handles = Vec::new();
    for _ in 0..4 {
        let coordinator = coordinator.clone();
        let req = req.clone();
        handles.push(tokio::spawn(
            async move { coordinator.get_derivative(&req).await },
        ));
    }
    for handle in handles {
        assert!(handle.await.expect("join").is_err());
    }
    assert_eq!(invocations.load(Ordering::SeqCst), 1);

    // Second wave shares the retry, which succeeds.
    let mut handles = Vec::new();
    for _ in 0..4 {
        let coordinator = coordinator.clone();
        let req = req.clone();
        handles.push(tokio::spawn(
            async move { coordinator.get_derivative(&req).await },
        ));
    }
    for handle in handles {
        handle.await.expect("join").expect("derivative");
    }
    assert_eq!(invocations.load(Ordering::SeqCst), 2);

    // At no point did two conversions for the key overlap.
    assert_eq!(peak.load(Ordering::SeqCst), 1);
}

/// Strategy producing a glTF scene with one external buffer companion.
struct FallbackModelStrategy {
    invocations: Arc<AtomicUsize>,
}

#[async_trait]
impl ConverterStrategy for FallbackModelStrategy {
    async fn convert(
        &self,
        _req: &DerivativeRequest,
        key: &CacheKey,
    ) -> Result<ConvertOutcome, PreviewError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        Ok(ConvertOutcome {
            data: Bytes::from_static(b"{\"asset\":{\"version\":\"2.0\"}}"),
            extension: "gltf",
            companions: vec![previewd_engine::strategies::Companion {
                file_name: format!("{key}.0.bin"),
                data: Bytes::from_static(&[0x01, 0x02, 0x03]),
            }],
        })
    }
}

#[tokio::test]
async fn model_companions_are_cached_and_served_without_reconversion() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let files = tempfile::tempdir().expect("files dir");
    let cache_dir = tempfile::tempdir().expect("cache dir");
    let cache = DerivativeCache::open(cache_dir.path()).await.expect("open cache");
    let limiter = ConversionLimiter::new(4);

    let mut strategies: HashMap<SourceKind, Arc<dyn ConverterStrategy>> = HashMap::new();
    strategies.insert(
        SourceKind::Model3D,
        Arc::new(FallbackModelStrategy {
            invocations: Arc::clone(&invocations),
        }),
    );
    let coordinator = PreviewCoordinator::new(cache, limiter, strategies);

    std::fs::write(files.path().join("part.stl"), b"solid").expect("seed");
    let req = request(files.path(), "part.stl", DerivativeKind::WebModel);

    let artifact = coordinator.get_derivative(&req).await.expect("scene");
    assert_eq!(artifact.content_type, "model/gltf+json");

    let blob_name = format!("{}.0.bin", CacheKey::for_request(&req));
    let blob = coordinator
        .blob(&blob_name)
        .await
        .expect("blob lookup")
        .expect("blob present");
    assert_eq!(&blob.data[..], &[0x01, 0x02, 0x03]);
    // Serving the blob did not re-run the converter.
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn warm_up_job_completes_in_background() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let h = harness(
        SourceKind::RasterImage,
        ScriptedStrategy::new(Arc::clone(&invocations)).with_delay(Duration::from_millis(20)),
    )
    .await;
    std::fs::write(h.files.path().join("pic.png"), b"png bytes").expect("seed");

    let req = request(h.files.path(), "pic.png", DerivativeKind::Thumbnail);
    let record = h.coordinator.enqueue(req.clone());
    assert_eq!(record.state, JobState::Pending);

    let mut state = record.state;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        state = h.coordinator.job(&record.key).expect("record").state;
        if state != JobState::Pending {
            break;
        }
    }
    assert_eq!(state, JobState::Done);

    let cached = h.coordinator.cached(&req).await.expect("cached lookup");
    assert!(cached.is_some());
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn warm_up_job_records_failure_reason() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let h = harness(
        SourceKind::RasterImage,
        ScriptedStrategy::new(Arc::clone(&invocations)).failing(),
    )
    .await;
    std::fs::write(h.files.path().join("pic.png"), b"png bytes").expect("seed");

    let req = request(h.files.path(), "pic.png", DerivativeKind::Thumbnail);
    let record = h.coordinator.enqueue(req);

    let mut job = record;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        job = h.coordinator.job(&job.key).expect("record");
        if job.state != JobState::Pending {
            break;
        }
    }
    assert_eq!(job.state, JobState::Failed);
    assert!(job.message.expect("message").contains("scripted"));
}
