//! PDF thumbnail strategy.
//!
//! ImageMagick renders page 1 only, at a fixed density, directly into the
//! target box. ImageMagick delegates actual PDF interpretation to
//! Ghostscript; the binary probes fine while the delegate is absent, so a
//! nonzero exit gets its stderr inspected for Ghostscript markers and is
//! surfaced as an actionable `ToolMissing` instead of a bare exit code.

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

/// Strategy for PDF page rasterization.
#[derive(Debug, Clone)]
pub struct PdfStrategy {
    supervisor: ProcessSupervisor,
    capabilities: Arc<ToolCapabilities>,
    command: String,
    timeout: Duration,
    scratch_root: PathBuf,
    density: u32,
}

impl PdfStrategy {
    /// Create the strategy.
    pub fn new(
        supervisor: ProcessSupervisor,
        capabilities: Arc<ToolCapabilities>,
        command: String,
        timeout: Duration,
        scratch_root: PathBuf,
        density: u32,
    ) -> Self {
        Self {
            supervisor,
            capabilities,
            command,
            timeout,
            scratch_root,
            density,
        }
    }

    fn page_job(&self, req: &DerivativeRequest, page_path: PathBuf) -> ToolJob {
        let params = req.params.clamped();
        ToolJob {
            tool: self.command.clone(),
            args: vec![
                "-density".to_string(),
                self.density.to_string(),
                // Page 1 only.
                format!("{}[0]", req.source_path.to_string_lossy()),
                "-resize".to_string(),
                format!("{}x{}", params.max_width, params.max_height),
                "-quality".to_string(),
                params.quality.to_string(),
                page_path.to_string_lossy().to_string(),
            ],
            timeout: self.timeout,
            expected_output: Some(page_path),
        }
    }
}

#[async_trait]
impl ConverterStrategy for PdfStrategy {
    async fn convert(
        &self,
        req: &DerivativeRequest,
        _key: &CacheKey,
    ) -> Result<ConvertOutcome, PreviewError> {
        self.capabilities.require(&self.command)?;

        let scratch = ScratchWorkspace::create(&self.scratch_root).await?;
        let page_path = scratch.file("page1.jpg");

        let result = self.supervisor.run(&self.page_job(req, page_path.clone())).await;
        let page = match result {
            Ok(_) => tokio::fs::read(&page_path).await.map_err(PreviewError::from),
            Err(PreviewError::ToolFailed { stderr, code, tool }) => {
                if ghostscript_missing(&stderr) {
                    Err(PreviewError::ToolMissing {
                        tool: "ghostscript".to_string(),
                        hint: "PDF previews need the Ghostscript delegate; install the \
                               'ghostscript' package"
                            .to_string(),
                    })
                } else {
                    Err(PreviewError::ToolFailed { stderr, code, tool })
                }
            }
            Err(e) => Err(e),
        };
        scratch.cleanup().await;

        Ok(ConvertOutcome::single(Bytes::from(page?), "jpg"))
    }
}

/// Secondary missing-dependency signal: markers ImageMagick emits when
/// its PDF delegate is absent.
fn ghostscript_missing(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("ghostscript")
        || lower.contains("gs: not found")
        || lower.contains("gs: no such file")
        || (lower.contains("delegate") && lower.contains("pdf"))
}
