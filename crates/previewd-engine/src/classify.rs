//! Extension → source kind classification.
//!
//! Membership lists are explicit, not heuristic. Anything outside every
//! list is `Unsupported` and short-circuits the coordinator with no permit
//! acquisition and no process invocation.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// The kind of source file a derivative is generated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    /// Browser-decodable raster images (JPEG, PNG, GIF, WebP, BMP, TIFF).
    RasterImage,
    /// HEIC/HEIF photos requiring an external decode stage.
    HeicImage,
    /// Video containers a frame can be extracted from.
    Video,
    /// PDF documents (page 1 is rasterized).
    Pdf,
    /// 3D meshes convertible to a web-viewable glTF scene.
    Model3D,
    /// No known strategy applies.
    Unsupported,
}

impl SourceKind {
    /// Classify a file name by its extension.
    pub fn from_file_name(file_name: &str) -> Self {
        match extension_of(file_name) {
            Some(ext) => Self::from_extension(&ext),
            None => Self::Unsupported,
        }
    }

    /// Classify a lowercased extension.
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            "jpg" | "jpeg" | "png" | "gif" | "webp" | "bmp" | "tif" | "tiff" => Self::RasterImage,
            "heic" | "heif" => Self::HeicImage,
            "mp4" | "mov" | "avi" | "mkv" | "webm" | "m4v" | "mpg" | "mpeg" | "wmv" => Self::Video,
            "pdf" => Self::Pdf,
            "stl" | "obj" | "fbx" | "dae" | "3ds" | "ply" | "off" | "glb" | "gltf" => Self::Model3D,
            _ => Self::Unsupported,
        }
    }

    /// Display name used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RasterImage => "raster image",
            Self::HeicImage => "HEIC image",
            Self::Video => "video",
            Self::Pdf => "PDF",
            Self::Model3D => "3D model",
            Self::Unsupported => "unsupported",
        }
    }
}

/// Whether the extension is already a web-viewable glTF scene that can be
/// served as-is, bypassing conversion.
pub fn is_web_native_model(ext: &str) -> bool {
    matches!(ext, "glb" | "gltf")
}

/// Extract the lowercased extension from a file name.
pub fn extension_of(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}
