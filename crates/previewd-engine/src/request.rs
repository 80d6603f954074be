//! Request value types for the derivative pipeline.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The kind of artifact a request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DerivativeKind {
    /// Small preview image for listings.
    Thumbnail,
    /// Resized, re-encoded web display image.
    OptimizedImage,
    /// Web-viewable glTF scene.
    WebModel,
}

impl DerivativeKind {
    /// Display name used in error messages and cache paths.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Thumbnail => "thumbnail",
            Self::OptimizedImage => "optimized image",
            Self::WebModel => "web model",
        }
    }
}

/// Logical scope a derivative belongs to: the owner of the file or the
/// share token it was accessed through. Consumed as an opaque cache key
/// component; validation happens upstream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheScope {
    /// Derivative generated for an authenticated owner.
    User(String),
    /// Derivative generated through a public share link.
    Share(String),
}

impl CacheScope {
    /// Stable string form used in cache keys.
    pub fn tag(&self) -> String {
        match self {
            Self::User(id) => format!("u_{id}"),
            Self::Share(token) => format!("s_{token}"),
        }
    }
}

/// Output parameters that change derivative bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PreviewParams {
    /// JPEG quality, 1-100.
    pub quality: u8,
    /// Bounding box width in pixels.
    pub max_width: u32,
    /// Bounding box height in pixels.
    pub max_height: u32,
}

impl PreviewParams {
    /// Clamp quality into the valid 1-100 range.
    pub fn clamped(self) -> Self {
        Self {
            quality: self.quality.clamp(1, 100),
            ..self
        }
    }
}

/// One immutable derivative request, constructed fresh per call.
///
/// `source_path` is a resolved, already-authorized absolute path; the
/// engine performs no permission checks of its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DerivativeRequest {
    /// Absolute path to the source file.
    pub source_path: PathBuf,
    /// Logical scope (owner or share token) for cache keying.
    pub scope: CacheScope,
    /// Normalized path of the file relative to its scope root, without
    /// the file name.
    pub rel_path: String,
    /// The file name, extension included.
    pub file_name: String,
    /// The artifact kind to produce.
    pub kind: DerivativeKind,
    /// Output parameters.
    pub params: PreviewParams,
}

impl DerivativeRequest {
    /// The lowercased source extension, if any.
    pub fn extension(&self) -> Option<String> {
        crate::classify::extension_of(&self.file_name)
    }
}
