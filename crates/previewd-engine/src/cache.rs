//! Deterministic cache keys and the on-disk derivative store.
//!
//! Artifacts are never expired: created once by a successful conversion,
//! read many times. There is no content-hash invalidation — if a source
//! file changes in place, its cached derivatives go stale until removed
//! out of band.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::debug;

use crate::error::PreviewError;
use crate::request::{DerivativeKind, DerivativeRequest};

/// A generated derivative: bytes plus serving metadata.
#[derive(Debug, Clone)]
pub struct Artifact {
    /// Artifact bytes.
    pub data: Bytes,
    /// MIME type for serving.
    pub content_type: String,
    /// When the artifact was produced.
    pub modified: DateTime<Utc>,
}

/// Deterministic identifier for one logical derivative.
///
/// Two requests describing the same logical derivative produce the same
/// key; any difference in scope, path, name, or an output-changing
/// parameter produces a different key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build the key for a request.
    pub fn for_request(req: &DerivativeRequest) -> Self {
        let mut key = format!(
            "{}_{}_{}",
            sanitize(&req.scope.tag()),
            sanitize(&req.rel_path.replace('/', "_")),
            sanitize(&req.file_name),
        );

        // Image derivatives embed the params that change output bytes.
        // Model scenes do not vary by quality or box size.
        match req.kind {
            DerivativeKind::Thumbnail | DerivativeKind::OptimizedImage => {
                let p = req.params;
                key.push_str(&format!("_{}x{}_q{}", p.max_width, p.max_height, p.quality));
            }
            DerivativeKind::WebModel => {}
        }

        Self(key)
    }

    /// The key as a path-safe string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Replace anything outside `[A-Za-z0-9._-]` with `_`, collapsing nothing.
fn sanitize(part: &str) -> String {
    let cleaned: String = part
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .take(200)
        .collect();

    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

/// MIME type for a derivative file extension.
pub fn content_type_for(ext: &str) -> &'static str {
    match ext {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "glb" => "model/gltf-binary",
        "gltf" => "model/gltf+json",
        "bin" => "application/octet-stream",
        _ => "application/octet-stream",
    }
}

/// On-disk store for derivative artifacts, one directory per kind.
#[derive(Debug, Clone)]
pub struct DerivativeCache {
    /// Cache root directory.
    root: PathBuf,
}

impl DerivativeCache {
    /// Directory names per derivative kind. `streams` is reserved for the
    /// stream-transcode cache and not written by this engine.
    const DIRS: [&'static str; 4] = ["thumbs", "images", "models", "streams"];

    /// Open (and create) the cache directory tree.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, PreviewError> {
        let root = root.into();
        for dir in Self::DIRS {
            fs::create_dir_all(root.join(dir)).await?;
        }
        Ok(Self { root })
    }

    /// Directory for a derivative kind.
    fn dir_for(&self, kind: DerivativeKind) -> PathBuf {
        let name = match kind {
            DerivativeKind::Thumbnail => "thumbs",
            DerivativeKind::OptimizedImage => "images",
            DerivativeKind::WebModel => "models",
        };
        self.root.join(name)
    }

    /// Candidate artifact extensions per kind, checked in order on lookup.
    fn candidate_exts(kind: DerivativeKind) -> &'static [&'static str] {
        match kind {
            DerivativeKind::Thumbnail | DerivativeKind::OptimizedImage => &["jpg"],
            DerivativeKind::WebModel => &["glb", "gltf"],
        }
    }

    /// Whether an artifact exists for this key.
    pub async fn exists(&self, kind: DerivativeKind, key: &CacheKey) -> bool {
        for ext in Self::candidate_exts(kind) {
            let path = self.dir_for(kind).join(format!("{key}.{ext}"));
            if fs::try_exists(&path).await.unwrap_or(false) {
                return true;
            }
        }
        false
    }

    /// Read the artifact for a key, if present.
    pub async fn read(
        &self,
        kind: DerivativeKind,
        key: &CacheKey,
    ) -> Result<Option<Artifact>, PreviewError> {
        for ext in Self::candidate_exts(kind) {
            let path = self.dir_for(kind).join(format!("{key}.{ext}"));
            match fs::read(&path).await {
                Ok(data) => {
                    let modified = file_modified(&path).await;
                    return Ok(Some(Artifact {
                        data: Bytes::from(data),
                        content_type: content_type_for(ext).to_string(),
                        modified,
                    }));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(None)
    }

    /// Persist an artifact. A single complete buffer write: concurrent
    /// writers to the same key race benignly, last writer wins.
    pub async fn write(
        &self,
        kind: DerivativeKind,
        key: &CacheKey,
        ext: &str,
        data: &[u8],
    ) -> Result<PathBuf, PreviewError> {
        let path = self.dir_for(kind).join(format!("{key}.{ext}"));
        fs::write(&path, data).await?;
        debug!(key = %key, path = %path.display(), size = data.len(), "Cached derivative");
        Ok(path)
    }

    /// Delete artifacts stored under the superseded naming convention for
    /// the same logical key. Image derivatives were historically encoded
    /// as PNG; the current convention is JPEG.
    pub async fn migrate_legacy(
        &self,
        kind: DerivativeKind,
        key: &CacheKey,
    ) -> Result<(), PreviewError> {
        if !matches!(
            kind,
            DerivativeKind::Thumbnail | DerivativeKind::OptimizedImage
        ) {
            return Ok(());
        }
        let legacy = self.dir_for(kind).join(format!("{key}.png"));
        match fs::remove_file(&legacy).await {
            Ok(()) => {
                debug!(path = %legacy.display(), "Removed legacy derivative");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist a model companion blob (glTF external buffer) by name.
    pub async fn write_blob(&self, file_name: &str, data: &[u8]) -> Result<(), PreviewError> {
        let path = self
            .dir_for(DerivativeKind::WebModel)
            .join(sanitize(file_name));
        fs::write(&path, data).await?;
        Ok(())
    }

    /// Read a model companion blob by name, if present.
    pub async fn read_blob(&self, file_name: &str) -> Result<Option<Artifact>, PreviewError> {
        let path = self
            .dir_for(DerivativeKind::WebModel)
            .join(sanitize(file_name));
        match fs::read(&path).await {
            Ok(data) => {
                let modified = file_modified(&path).await;
                Ok(Some(Artifact {
                    data: Bytes::from(data),
                    content_type: content_type_for("bin").to_string(),
                    modified,
                }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

async fn file_modified(path: &Path) -> DateTime<Utc> {
    match fs::metadata(path).await.and_then(|m| m.modified()) {
        Ok(t) => DateTime::<Utc>::from(t),
        Err(_) => Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{CacheScope, PreviewParams};

    fn request(scope: CacheScope, rel: &str, name: &str, quality: u8) -> DerivativeRequest {
        DerivativeRequest {
            source_path: PathBuf::from("/srv/files").join(rel).join(name),
            scope,
            rel_path: rel.to_string(),
            file_name: name.to_string(),
            kind: DerivativeKind::Thumbnail,
            params: PreviewParams {
                quality,
                max_width: 150,
                max_height: 150,
            },
        }
    }

    #[test]
    fn key_is_deterministic() {
        let a = CacheKey::for_request(&request(
            CacheScope::User("alice".into()),
            "docs/img",
            "photo.heic",
            70,
        ));
        let b = CacheKey::for_request(&request(
            CacheScope::User("alice".into()),
            "docs/img",
            "photo.heic",
            70,
        ));
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "u_alice_docs_img_photo.heic_150x150_q70");
    }

    #[test]
    fn key_differs_per_scope_path_and_params() {
        let base = request(CacheScope::User("alice".into()), "docs/img", "photo.heic", 70);
        let key = CacheKey::for_request(&base);

        let other_scope = CacheKey::for_request(&request(
            CacheScope::Share("tok123".into()),
            "docs/img",
            "photo.heic",
            70,
        ));
        let other_path = CacheKey::for_request(&request(
            CacheScope::User("alice".into()),
            "docs/other",
            "photo.heic",
            70,
        ));
        let other_quality = CacheKey::for_request(&request(
            CacheScope::User("alice".into()),
            "docs/img",
            "photo.heic",
            80,
        ));

        assert_ne!(key, other_scope);
        assert_ne!(key, other_path);
        assert_ne!(key, other_quality);
    }

    #[test]
    fn model_keys_ignore_image_params() {
        let mut a = request(CacheScope::User("alice".into()), "cad", "part.stl", 70);
        a.kind = DerivativeKind::WebModel;
        let mut b = a.clone();
        b.params.quality = 90;
        assert_eq!(CacheKey::for_request(&a), CacheKey::for_request(&b));
    }

    #[test]
    fn sanitize_strips_separators() {
        assert_eq!(sanitize("a b/c:d"), "a_b_c_d");
        assert_eq!(sanitize(""), "_");
    }

    #[tokio::test]
    async fn write_read_roundtrip_and_legacy_migration() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = DerivativeCache::open(dir.path()).await.expect("open");

        let req = request(CacheScope::User("alice".into()), "docs", "pic.jpg", 70);
        let key = CacheKey::for_request(&req);

        assert!(!cache.exists(DerivativeKind::Thumbnail, &key).await);

        // Seed a legacy PNG artifact for the same key.
        let legacy = dir.path().join("thumbs").join(format!("{key}.png"));
        std::fs::write(&legacy, b"old png").expect("seed legacy");

        cache
            .migrate_legacy(DerivativeKind::Thumbnail, &key)
            .await
            .expect("migrate");
        cache
            .write(DerivativeKind::Thumbnail, &key, "jpg", b"new jpeg")
            .await
            .expect("write");

        assert!(!legacy.exists());
        let artifact = cache
            .read(DerivativeKind::Thumbnail, &key)
            .await
            .expect("read")
            .expect("present");
        assert_eq!(&artifact.data[..], b"new jpeg");
        assert_eq!(artifact.content_type, "image/jpeg");
    }

    #[tokio::test]
    async fn blobs_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = DerivativeCache::open(dir.path()).await.expect("open");

        cache.write_blob("scene.0.bin", b"\x00\x01").await.expect("write");
        let blob = cache.read_blob("scene.0.bin").await.expect("read").expect("present");
        assert_eq!(&blob.data[..], b"\x00\x01");
        assert!(cache.read_blob("missing.bin").await.expect("read").is_none());
    }
}
