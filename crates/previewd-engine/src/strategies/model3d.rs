//! 3D mesh strategy.
//!
//! The mesh converter first attempts a single-file binary scene export
//! (GLB). If that fails, it falls back to a JSON scene plus external
//! binary buffers (glTF + .bin). The JSON's buffer references are
//! rewritten to this service's blob endpoint before caching: the scene is
//! served to a remote viewer that cannot read local paths. Sources that
//! already are GLB/glTF never reach this strategy; the coordinator serves
//! them directly.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::warn;

use crate::cache::CacheKey;
use crate::error::PreviewError;
use crate::probe::ToolCapabilities;
use crate::request::DerivativeRequest;
use crate::scratch::ScratchWorkspace;
use crate::strategies::{Companion, ConvertOutcome, ConverterStrategy};
use crate::supervisor::{ProcessSupervisor, ToolJob};

/// Strategy for 3D mesh conversion to web-viewable glTF scenes.
#[derive(Debug, Clone)]
pub struct Model3DStrategy {
    supervisor: ProcessSupervisor,
    capabilities: Arc<ToolCapabilities>,
    command: String,
    timeout: Duration,
    scratch_root: PathBuf,
    /// URL prefix the rewritten buffer references point at.
    blob_url_base: String,
}

impl Model3DStrategy {
    /// Create the strategy.
    pub fn new(
        supervisor: ProcessSupervisor,
        capabilities: Arc<ToolCapabilities>,
        command: String,
        timeout: Duration,
        scratch_root: PathBuf,
        blob_url_base: String,
    ) -> Self {
        Self {
            supervisor,
            capabilities,
            command,
            timeout,
            scratch_root,
            blob_url_base,
        }
    }

    fn export_job(&self, req: &DerivativeRequest, output: PathBuf) -> ToolJob {
        ToolJob {
            tool: self.command.clone(),
            args: vec![
                "export".to_string(),
                req.source_path.to_string_lossy().to_string(),
                output.to_string_lossy().to_string(),
            ],
            timeout: self.timeout,
            expected_output: Some(output),
        }
    }

    /// Attempt 1: single-file binary scene.
    async fn export_binary(
        &self,
        req: &DerivativeRequest,
        scratch: &ScratchWorkspace,
    ) -> Result<ConvertOutcome, PreviewError> {
        let glb_path = scratch.file("scene.glb");
        self.supervisor.run(&self.export_job(req, glb_path.clone())).await?;
        let data = tokio::fs::read(&glb_path).await?;
        Ok(ConvertOutcome::single(Bytes::from(data), "glb"))
    }

    /// Attempt 2: JSON scene plus external buffers, with buffer URIs
    /// rewritten to the blob endpoint.
    async fn export_json(
        &self,
        req: &DerivativeRequest,
        key: &CacheKey,
        scratch: &ScratchWorkspace,
    ) -> Result<ConvertOutcome, PreviewError> {
        let gltf_path = scratch.file("scene.gltf");
        self.supervisor.run(&self.export_job(req, gltf_path.clone())).await?;

        let raw = tokio::fs::read(&gltf_path).await?;
        let mut scene: serde_json::Value = serde_json::from_slice(&raw)?;

        let mut companions = Vec::new();
        for (companion_name, original_uri) in
            rewrite_buffer_uris(&mut scene, key, &self.blob_url_base)
        {
            let data = tokio::fs::read(scratch.file(&original_uri)).await?;
            companions.push(Companion {
                file_name: companion_name,
                data: Bytes::from(data),
            });
        }

        Ok(ConvertOutcome {
            data: Bytes::from(serde_json::to_vec(&scene)?),
            extension: "gltf",
            companions,
        })
    }
}

#[async_trait]
impl ConverterStrategy for Model3DStrategy {
    async fn convert(
        &self,
        req: &DerivativeRequest,
        key: &CacheKey,
    ) -> Result<ConvertOutcome, PreviewError> {
        self.capabilities.require(&self.command)?;

        let scratch = ScratchWorkspace::create(&self.scratch_root).await?;
        let outcome = match self.export_binary(req, &scratch).await {
            Ok(outcome) => Ok(outcome),
            // A second run against the same tool cannot fix a timeout or
            // a missing binary; only converter failures fall back.
            Err(e @ (PreviewError::ToolFailed { .. } | PreviewError::PartialOutput { .. })) => {
                warn!(
                    file = %req.file_name,
                    error = %e,
                    "Binary scene export failed, falling back to JSON scene"
                );
                self.export_json(req, key, &scratch).await
            }
            Err(e) => Err(e),
        };
        scratch.cleanup().await;
        outcome
    }
}

/// Rewrite every relative buffer URI in a glTF scene to point at the
/// service's blob endpoint. Returns `(companion file name, original
/// relative URI)` pairs so the caller can pick the buffer files up from
/// the scratch workspace. Embedded (`data:`) and absolute URIs are left
/// untouched.
fn rewrite_buffer_uris(
    scene: &mut serde_json::Value,
    key: &CacheKey,
    blob_url_base: &str,
) -> Vec<(String, String)> {
    let mut rewritten = Vec::new();

    let Some(buffers) = scene.get_mut("buffers").and_then(|b| b.as_array_mut()) else {
        return rewritten;
    };

    for (index, buffer) in buffers.iter_mut().enumerate() {
        let Some(uri) = buffer.get("uri").and_then(|u| u.as_str()) else {
            continue;
        };
        if uri.starts_with("data:") || uri.contains("://") {
            continue;
        }

        let companion_name = format!("{key}.{index}.bin");
        let original = uri.to_string();
        buffer["uri"] = serde_json::Value::String(format!(
            "{}/{companion_name}",
            blob_url_base.trim_end_matches('/')
        ));
        rewritten.push((companion_name, original));
    }

    rewritten
}
