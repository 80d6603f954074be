//! Derivative generation configuration.
//!
//! Covers the conversion limiter, per-kind tool commands, timeouts, and
//! default output parameters.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Configuration for the derivative generation engine.
#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Whether derivative generation is enabled.
    pub enabled: bool,

    /// Process-wide limit for concurrently running external converters.
    #[validate(range(min = 1, max = 64))]
    pub max_concurrent: usize,

    /// Default JPEG quality for thumbnails (1-100).
    #[validate(range(min = 1, max = 100))]
    pub thumbnail_quality: u8,

    /// Default thumbnail bounding box width in pixels.
    #[validate(range(min = 16, max = 1024))]
    pub thumbnail_max_width: u32,

    /// Default thumbnail bounding box height in pixels.
    #[validate(range(min = 16, max = 1024))]
    pub thumbnail_max_height: u32,

    /// Default JPEG quality for optimized web images (1-100).
    #[validate(range(min = 1, max = 100))]
    pub image_quality: u8,

    /// Default optimized-image bounding box width in pixels.
    #[validate(range(min = 64, max = 8192))]
    pub image_max_width: u32,

    /// Default optimized-image bounding box height in pixels.
    #[validate(range(min = 64, max = 8192))]
    pub image_max_height: u32,

    /// Seek offset in seconds before grabbing a video frame.
    pub video_seek_seconds: u32,

    /// Fixed ffmpeg JPEG quality scale (`-q:v`, lower is better).
    #[validate(range(min = 1, max = 31))]
    pub video_frame_quality: u8,

    /// Rasterization density (DPI) for PDF page renders.
    #[validate(range(min = 36, max = 600))]
    pub pdf_density: u32,

    /// External tool commands.
    pub tools: ToolCommands,

    /// Per-kind conversion timeouts.
    pub timeouts: TimeoutConfig,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_concurrent: 10,
            thumbnail_quality: 70,
            thumbnail_max_width: 150,
            thumbnail_max_height: 150,
            image_quality: 80,
            image_max_width: 1920,
            image_max_height: 1080,
            video_seek_seconds: 3,
            video_frame_quality: 7,
            pdf_density: 150,
            tools: ToolCommands::default(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

/// Commands for the external converters.
///
/// Each entry is the executable name (resolved through `PATH`) or an
/// absolute path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolCommands {
    /// Video frame extractor.
    pub ffmpeg: String,
    /// HEIC/HEIF to JPEG decoder.
    pub heif_convert: String,
    /// PDF rasterizer (ImageMagick; needs the Ghostscript delegate for PDFs).
    pub magick: String,
    /// 3D mesh converter producing glTF scenes.
    pub assimp: String,
}

impl Default for ToolCommands {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            heif_convert: "heif-convert".to_string(),
            magick: "magick".to_string(),
            assimp: "assimp".to_string(),
        }
    }
}

/// Wall-clock timeouts per conversion kind, in seconds.
///
/// Video gets a longer budget than images and PDFs: seeking into large
/// media files dominates the runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Image conversions (HEIC decode included).
    pub image_seconds: u64,
    /// PDF page rasterization.
    pub pdf_seconds: u64,
    /// Video frame extraction.
    pub video_seconds: u64,
    /// 3D mesh export.
    pub model_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            image_seconds: 15,
            pdf_seconds: 15,
            video_seconds: 30,
            model_seconds: 60,
        }
    }
}
