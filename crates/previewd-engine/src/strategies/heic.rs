//! HEIC/HEIF photo strategy.
//!
//! Two stages: the proprietary container is decoded to an intermediate
//! JPEG in a scratch workspace by an external decoder, then that buffer
//! goes through the in-process raster pipeline. A decode-stage failure
//! surfaces as an external tool error, distinct from raster failures.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::cache::CacheKey;
use crate::error::PreviewError;
use crate::probe::ToolCapabilities;
use crate::request::DerivativeRequest;
use crate::scratch::ScratchWorkspace;
use crate::strategies::raster;
use crate::strategies::{ConvertOutcome, ConverterStrategy};
use crate::supervisor::{ProcessSupervisor, ToolJob};

/// Intermediate decode quality; the raster stage re-encodes at the
/// requested quality afterwards.
const DECODE_QUALITY: &str = "90";

/// Strategy for HEIC/HEIF images.
#[derive(Debug, Clone)]
pub struct HeicImageStrategy {
    supervisor: ProcessSupervisor,
    capabilities: Arc<ToolCapabilities>,
    command: String,
    timeout: Duration,
    scratch_root: PathBuf,
}

impl HeicImageStrategy {
    /// Create the strategy.
    pub fn new(
        supervisor: ProcessSupervisor,
        capabilities: Arc<ToolCapabilities>,
        command: String,
        timeout: Duration,
        scratch_root: PathBuf,
    ) -> Self {
        Self {
            supervisor,
            capabilities,
            command,
            timeout,
            scratch_root,
        }
    }

    async fn decode_to_jpeg(
        &self,
        req: &DerivativeRequest,
        scratch: &ScratchWorkspace,
    ) -> Result<Vec<u8>, PreviewError> {
        let decoded_path = scratch.file("decoded.jpg");
        let job = ToolJob {
            tool: self.command.clone(),
            args: vec![
                "-q".to_string(),
                DECODE_QUALITY.to_string(),
                req.source_path.to_string_lossy().to_string(),
                decoded_path.to_string_lossy().to_string(),
            ],
            timeout: self.timeout,
            expected_output: Some(decoded_path.clone()),
        };
        self.supervisor.run(&job).await?;
        Ok(tokio::fs::read(&decoded_path).await?)
    }
}

#[async_trait]
impl ConverterStrategy for HeicImageStrategy {
    async fn convert(
        &self,
        req: &DerivativeRequest,
        _key: &CacheKey,
    ) -> Result<ConvertOutcome, PreviewError> {
        self.capabilities.require(&self.command)?;

        let scratch = ScratchWorkspace::create(&self.scratch_root).await?;
        let decoded = self.decode_to_jpeg(req, &scratch).await;
        scratch.cleanup().await;
        let decoded = decoded?;

        let params = req.params.clamped();
        let encoded =
            tokio::task::spawn_blocking(move || raster::process_image(&decoded, params)).await??;
        Ok(ConvertOutcome::single(Bytes::from(encoded), "jpg"))
    }
}
