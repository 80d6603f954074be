//! Scratch workspaces for multi-file conversions.

use std::path::{Path, PathBuf};

use tracing::warn;
use uuid::Uuid;

use crate::error::PreviewError;

/// A private temporary directory for one conversion attempt's intermediate
/// files. Call [`ScratchWorkspace::cleanup`] when the attempt resolves;
/// `Drop` removes the directory best-effort if cleanup was skipped
/// (early return, panic).
#[derive(Debug)]
pub struct ScratchWorkspace {
    dir: PathBuf,
    cleaned: bool,
}

impl ScratchWorkspace {
    /// Create a fresh workspace under the scratch root.
    pub async fn create(scratch_root: &Path) -> Result<Self, PreviewError> {
        let dir = scratch_root.join(format!("conv_{}", Uuid::now_v7().simple()));
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            cleaned: false,
        })
    }

    /// The workspace directory.
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// A file path inside the workspace.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Remove the workspace directory and everything in it.
    pub async fn cleanup(mut self) {
        self.cleaned = true;
        if let Err(e) = tokio::fs::remove_dir_all(&self.dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(dir = %self.dir.display(), error = %e, "Failed to clean up scratch workspace");
            }
        }
    }
}

impl Drop for ScratchWorkspace {
    fn drop(&mut self) {
        if !self.cleaned {
            let _ = std::fs::remove_dir_all(&self.dir);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cleanup_removes_directory() {
        let root = tempfile::tempdir().expect("tempdir");
        let ws = ScratchWorkspace::create(root.path()).await.expect("create");
        let dir = ws.path().to_path_buf();
        tokio::fs::write(ws.file("intermediate.jpg"), b"data")
            .await
            .expect("write");
        assert!(dir.exists());

        ws.cleanup().await;
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn drop_removes_directory() {
        let root = tempfile::tempdir().expect("tempdir");
        let dir = {
            let ws = ScratchWorkspace::create(root.path()).await.expect("create");
            ws.path().to_path_buf()
        };
        assert!(!dir.exists());
    }
}
