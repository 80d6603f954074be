//! Startup capability probes for external tools.
//!
//! Each configured converter is launched once with a cheap version flag;
//! the availability booleans are cached for the process lifetime so the
//! coordinator can fail fast with `ToolMissing` instead of discovering an
//! absent binary mid-request. Substring matching on converter stderr stays
//! as a secondary signal for dependencies the binary itself does not
//! reveal (ImageMagick's Ghostscript delegate).

use std::collections::HashMap;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{info, warn};

use previewd_core::config::preview::ToolCommands;

use crate::error::PreviewError;

/// Cached per-tool availability, detected once at startup.
#[derive(Debug, Clone, Default)]
pub struct ToolCapabilities {
    available: HashMap<String, bool>,
}

impl ToolCapabilities {
    /// Probe every configured tool.
    pub async fn detect(tools: &ToolCommands) -> Self {
        let candidates: [(&str, &str); 4] = [
            (tools.ffmpeg.as_str(), "-version"),
            (tools.heif_convert.as_str(), "--version"),
            (tools.magick.as_str(), "-version"),
            (tools.assimp.as_str(), "version"),
        ];

        let mut available = HashMap::new();
        for (command, version_arg) in candidates {
            let ok = probe_command(command, version_arg).await;
            if ok {
                info!(tool = command, "Converter available");
            } else {
                warn!(tool = command, "Converter not found; its previews will fail fast");
            }
            available.insert(command.to_string(), ok);
        }

        Self { available }
    }

    /// Capabilities that treat every tool as present. For wiring tests
    /// that never reach a real converter.
    pub fn assume_all() -> Self {
        Self {
            available: HashMap::new(),
        }
    }

    /// Whether a tool responded to its version probe. Tools that were
    /// never probed are assumed present; the supervisor still reports
    /// `ToolMissing` on spawn failure.
    pub fn is_available(&self, command: &str) -> bool {
        self.available.get(command).copied().unwrap_or(true)
    }

    /// Fail fast if the tool was probed and found missing.
    pub fn require(&self, command: &str) -> Result<(), PreviewError> {
        if self.is_available(command) {
            Ok(())
        } else {
            Err(PreviewError::ToolMissing {
                tool: command.to_string(),
                hint: format!("'{command}' was not found at startup; install it and restart"),
            })
        }
    }
}

/// A probe passes when the binary can be spawned at all; exit status is
/// ignored because version flags differ in exit conventions across tools.
async fn probe_command(command: &str, version_arg: &str) -> bool {
    let spawned = Command::new(command)
        .arg(version_arg)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status()
        .await;
    spawned.is_ok()
}
