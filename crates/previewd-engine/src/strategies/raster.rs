//! In-process raster image resizing and re-encoding.
//!
//! No external tool involved: the source is decoded, auto-rotated using
//! its embedded orientation metadata, scaled to fit inside the requested
//! box, and re-encoded as JPEG at the requested quality. The pixel work
//! runs on the blocking thread pool.

use std::io::Cursor;

use async_trait::async_trait;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageReader};

use crate::cache::CacheKey;
use crate::error::PreviewError;
use crate::request::{DerivativeRequest, PreviewParams};
use crate::strategies::{ConvertOutcome, ConverterStrategy};

/// Strategy for browser-decodable raster images.
#[derive(Debug, Clone, Default)]
pub struct RasterImageStrategy;

impl RasterImageStrategy {
    /// Create the strategy.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ConverterStrategy for RasterImageStrategy {
    async fn convert(
        &self,
        req: &DerivativeRequest,
        _key: &CacheKey,
    ) -> Result<ConvertOutcome, PreviewError> {
        let source = tokio::fs::read(&req.source_path).await?;
        let params = req.params.clamped();
        let encoded =
            tokio::task::spawn_blocking(move || process_image(&source, params)).await??;
        Ok(ConvertOutcome::single(Bytes::from(encoded), "jpg"))
    }
}

/// Decode, orient, fit-inside scale, and JPEG-encode one image buffer.
///
/// Shared with the HEIC strategy, which feeds its intermediate JPEG
/// through the same pipeline.
pub(crate) fn process_image(data: &[u8], params: PreviewParams) -> Result<Vec<u8>, PreviewError> {
    let reader = ImageReader::new(Cursor::new(data)).with_guessed_format()?;
    let mut decoder = reader.into_decoder()?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let img = DynamicImage::from_decoder(decoder)?;
    let img = apply_exif_orientation(img, orientation);

    // Fit inside the box, never upscale.
    let img = if img.width() > params.max_width || img.height() > params.max_height {
        img.resize(params.max_width, params.max_height, FilterType::Lanczos3)
    } else {
        img
    };

    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());

    let mut buf = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buf, params.quality);
    rgb.write_with_encoder(encoder)?;
    Ok(buf.into_inner())
}

/// The 8 EXIF orientation values mapped to rotate/flip operations.
pub(crate) fn apply_exif_orientation(img: DynamicImage, orientation: Orientation) -> DynamicImage {
    match orientation {
        Orientation::NoTransforms => img,                        // 1
        Orientation::FlipHorizontal => img.fliph(),              // 2
        Orientation::Rotate180 => img.rotate180(),               // 3
        Orientation::FlipVertical => img.flipv(),                // 4
        Orientation::Rotate90FlipH => img.rotate90().fliph(),    // 5
        Orientation::Rotate90 => img.rotate90(),                 // 6
        Orientation::Rotate270FlipH => img.rotate270().fliph(),  // 7
        Orientation::Rotate270 => img.rotate270(),               // 8
    }
}
