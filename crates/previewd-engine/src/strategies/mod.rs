//! Per-source-kind conversion strategies.
//!
//! Each strategy turns one [`DerivativeRequest`] into a complete artifact
//! (plus companion blobs for glTF fallback scenes) or fails with a typed
//! [`PreviewError`]. Strategies own their external tool knowledge: which
//! command to run, with which arguments, under which timeout.

pub mod heic;
pub mod model3d;
pub mod pdf;
pub mod raster;
pub mod video;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use previewd_core::config::preview::PreviewConfig;

use crate::cache::CacheKey;
use crate::classify::SourceKind;
use crate::error::PreviewError;
use crate::probe::ToolCapabilities;
use crate::request::DerivativeRequest;
use crate::supervisor::ProcessSupervisor;

/// A produced derivative before it is cached.
#[derive(Debug)]
pub struct ConvertOutcome {
    /// Artifact bytes.
    pub data: Bytes,
    /// Artifact file extension (`jpg`, `glb`, `gltf`), which determines
    /// the content type.
    pub extension: &'static str,
    /// Companion files that must land in the cache next to the artifact
    /// (glTF external buffers).
    pub companions: Vec<Companion>,
}

impl ConvertOutcome {
    /// A single-file outcome.
    pub fn single(data: Bytes, extension: &'static str) -> Self {
        Self {
            data,
            extension,
            companions: Vec::new(),
        }
    }
}

/// A cache-resident file referenced by the main artifact.
#[derive(Debug)]
pub struct Companion {
    /// File name inside the model cache directory.
    pub file_name: String,
    /// Blob bytes.
    pub data: Bytes,
}

/// Conversion logic for one source kind.
#[async_trait]
pub trait ConverterStrategy: Send + Sync {
    /// Produce the requested derivative.
    async fn convert(
        &self,
        req: &DerivativeRequest,
        key: &CacheKey,
    ) -> Result<ConvertOutcome, PreviewError>;
}

/// Build the production strategy set from configuration.
pub fn default_strategies(
    preview: &PreviewConfig,
    scratch_root: PathBuf,
    blob_url_base: String,
    capabilities: Arc<ToolCapabilities>,
) -> HashMap<SourceKind, Arc<dyn ConverterStrategy>> {
    let supervisor = ProcessSupervisor::new();

    let mut strategies: HashMap<SourceKind, Arc<dyn ConverterStrategy>> = HashMap::new();
    strategies.insert(
        SourceKind::RasterImage,
        Arc::new(raster::RasterImageStrategy::new()),
    );
    strategies.insert(
        SourceKind::HeicImage,
        Arc::new(heic::HeicImageStrategy::new(
            supervisor.clone(),
            Arc::clone(&capabilities),
            preview.tools.heif_convert.clone(),
            Duration::from_secs(preview.timeouts.image_seconds),
            scratch_root.clone(),
        )),
    );
    strategies.insert(
        SourceKind::Video,
        Arc::new(video::VideoStrategy::new(
            supervisor.clone(),
            Arc::clone(&capabilities),
            preview.tools.ffmpeg.clone(),
            Duration::from_secs(preview.timeouts.video_seconds),
            scratch_root.clone(),
            preview.video_seek_seconds,
            preview.video_frame_quality,
        )),
    );
    strategies.insert(
        SourceKind::Pdf,
        Arc::new(pdf::PdfStrategy::new(
            supervisor.clone(),
            Arc::clone(&capabilities),
            preview.tools.magick.clone(),
            Duration::from_secs(preview.timeouts.pdf_seconds),
            scratch_root.clone(),
            preview.pdf_density,
        )),
    );
    strategies.insert(
        SourceKind::Model3D,
        Arc::new(model3d::Model3DStrategy::new(
            supervisor,
            capabilities,
            preview.tools.assimp.clone(),
            Duration::from_secs(preview.timeouts.model_seconds),
            scratch_root,
            blob_url_base,
        )),
    );

    strategies
}
