//! Video thumbnail strategy.
//!
//! One ffmpeg invocation: seek a few seconds in, extract exactly one
//! frame, scale it to fit the requested box, encode JPEG at a fixed
//! quality. Video gets a longer timeout than images — seeking into large
//! media files dominates the runtime.

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
use crate::strategies::{ConvertOutcome, ConverterStrategy};
use crate::supervisor::{ProcessSupervisor, ToolJob};

/// Strategy for video frame extraction.
#[derive(Debug, Clone)]
pub struct VideoStrategy {
    supervisor: ProcessSupervisor,
    capabilities: Arc<ToolCapabilities>,
    command: String,
    timeout: Duration,
    scratch_root: PathBuf,
    seek_seconds: u32,
    frame_quality: u8,
}

impl VideoStrategy {
    /// Create the strategy.
    pub fn new(
        supervisor: ProcessSupervisor,
        capabilities: Arc<ToolCapabilities>,
        command: String,
        timeout: Duration,
        scratch_root: PathBuf,
        seek_seconds: u32,
        frame_quality: u8,
    ) -> Self {
        Self {
            supervisor,
            capabilities,
            command,
            timeout,
            scratch_root,
            seek_seconds,
            frame_quality,
        }
    }

    fn frame_job(&self, req: &DerivativeRequest, frame_path: PathBuf) -> ToolJob {
        let params = req.params;
        ToolJob {
            tool: self.command.clone(),
            args: vec![
                "-y".to_string(),
                "-ss".to_string(),
                self.seek_seconds.to_string(),
                "-i".to_string(),
                req.source_path.to_string_lossy().to_string(),
                "-frames:v".to_string(),
                "1".to_string(),
                "-vf".to_string(),
                format!(
                    "scale={}:{}:force_original_aspect_ratio=decrease",
                    params.max_width, params.max_height
                ),
                "-q:v".to_string(),
                self.frame_quality.to_string(),
                frame_path.to_string_lossy().to_string(),
            ],
            timeout: self.timeout,
            expected_output: Some(frame_path),
        }
    }
}

#[async_trait]
impl ConverterStrategy for VideoStrategy {
    async fn convert(
        &self,
        req: &DerivativeRequest,
        _key: &CacheKey,
    ) -> Result<ConvertOutcome, PreviewError> {
        self.capabilities.require(&self.command)?;

        let scratch = ScratchWorkspace::create(&self.scratch_root).await?;
        let frame_path = scratch.file("frame.jpg");

        let job = self.frame_job(req, frame_path.clone());
        let result = self.supervisor.run(&job).await;
        let frame = match result {
            Ok(_) => tokio::fs::read(&frame_path).await.map_err(PreviewError::from),
            Err(e) => Err(e),
        };
        scratch.cleanup().await;

        Ok(ConvertOutcome::single(Bytes::from(frame?), "jpg"))
    }
}
