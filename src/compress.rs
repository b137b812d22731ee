//! Conditional image compression.
//!
//! Re-encodes large raster images in their original format after clamping the
//! longest side. Compression is an optimization only: every failure keeps the
//! original file, and the result is kept only when it is strictly smaller.
//! [`CompressionReport::skipped`] tells callers why the original was kept.

use crate::config::CompressionConfig;
use crate::media::{essence, SourceFile};
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageDecoder, ImageFormat, ImageReader};
use std::io::Cursor;
use serde::Serialize;

/// Why the original bytes were uploaded instead of a re-encoded version
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    Disabled,
    BelowThreshold,
    UnsupportedFormat,
    NotSmaller,
    Failed(String),
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Disabled => "disabled",
            SkipReason::BelowThreshold => "below_threshold",
            SkipReason::UnsupportedFormat => "unsupported_format",
            SkipReason::NotSmaller => "not_smaller",
            SkipReason::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompressionReport {
    pub original_bytes: u64,
    pub final_bytes: u64,
    /// `None` when the compressed bytes were kept
    pub skipped: Option<SkipReason>,
}

impl CompressionReport {
    pub fn compressed(&self) -> bool {
        self.skipped.is_none()
    }
}

/// Image compressor
#[derive(Debug, Clone)]
pub struct Compressor {
    enabled: bool,
    threshold_bytes: u64,
    max_dimension: u32,
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new(&CompressionConfig::default())
    }
}

impl Compressor {
    pub fn new(config: &CompressionConfig) -> Self {
        Self {
            enabled: config.enabled,
            threshold_bytes: config.threshold_bytes,
            max_dimension: config.max_dimension.max(1),
        }
    }

    /// Compress `file` at `quality` (1..=100).
    ///
    /// Returns the file to upload and a report. Below the threshold the
    /// returned file shares the input's buffer.
    pub fn compress(&self, file: &SourceFile, quality: u8) -> (SourceFile, CompressionReport) {
        let original_bytes = file.byte_len();
        let keep = |reason: SkipReason| {
            (
                file.clone(),
                CompressionReport {
                    original_bytes,
                    final_bytes: original_bytes,
                    skipped: Some(reason),
                },
            )
        };

        if !self.enabled {
            return keep(SkipReason::Disabled);
        }
        if original_bytes < self.threshold_bytes {
            return keep(SkipReason::BelowThreshold);
        }

        let Some(format) = compressible_format(&file.mime_type) else {
            tracing::debug!(mime_type = %file.mime_type, "No re-encoder for this format");
            return keep(SkipReason::UnsupportedFormat);
        };

        let encoded = match self.reencode(&file.bytes, format, quality) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    file = %file.name,
                    "Image compression failed, uploading original"
                );
                return keep(SkipReason::Failed(e.to_string()));
            }
        };

        if encoded.len() as u64 >= original_bytes {
            tracing::debug!(
                original_bytes,
                encoded_bytes = encoded.len(),
                "Re-encoded image is not smaller, uploading original"
            );
            return keep(SkipReason::NotSmaller);
        }

        let final_bytes = encoded.len() as u64;
        tracing::info!(
            file = %file.name,
            original_bytes,
            final_bytes,
            "Image compressed"
        );

        (
            file.with_bytes(encoded),
            CompressionReport {
                original_bytes,
                final_bytes,
                skipped: None,
            },
        )
    }

    fn reencode(&self, data: &[u8], format: ImageFormat, quality: u8) -> image::ImageResult<Bytes> {
        let img = decode_oriented(data, format)?;
        let (width, height) = img.dimensions();
        let (target_w, target_h) = target_dimensions(width, height, self.max_dimension);

        let img = if (target_w, target_h) != (width, height) {
            img.resize_exact(target_w, target_h, FilterType::Lanczos3)
        } else {
            img
        };

        let mut buffer = Vec::with_capacity(data.len() / 2);
        match format {
            ImageFormat::Jpeg => {
                let encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
                DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder)?;
            }
            ImageFormat::Png => {
                let encoder = PngEncoder::new_with_quality(
                    &mut buffer,
                    CompressionType::Best,
                    PngFilter::Adaptive,
                );
                img.write_with_encoder(encoder)?;
            }
            _ => {
                // WebP: the bundled encoder is lossless only
                let encoder = WebPEncoder::new_lossless(&mut buffer);
                DynamicImage::ImageRgba8(img.to_rgba8()).write_with_encoder(encoder)?;
            }
        }

        Ok(Bytes::from(buffer))
    }
}

/// Decode and apply the EXIF orientation. The re-encoded file carries no
/// EXIF, so the rotation has to be baked into the pixels.
fn decode_oriented(data: &[u8], format: ImageFormat) -> image::ImageResult<DynamicImage> {
    let mut decoder = ImageReader::with_format(Cursor::new(data), format).into_decoder()?;
    let orientation = decoder.orientation()?;
    let mut img = DynamicImage::from_decoder(decoder)?;
    img.apply_orientation(orientation);
    Ok(img)
}

/// Formats we can decode and re-encode in place. GIF is excluded because
/// re-encoding would drop animation frames.
fn compressible_format(mime_type: &str) -> Option<ImageFormat> {
    match essence(mime_type).as_str() {
        "image/jpeg" | "image/jpg" => Some(ImageFormat::Jpeg),
        "image/png" => Some(ImageFormat::Png),
        "image/webp" => Some(ImageFormat::WebP),
        _ => None,
    }
}

/// Scale `(width, height)` down so the longest side is at most `max_dimension`,
/// preserving aspect ratio. Never scales up.
pub fn target_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= max_dimension || longest == 0 {
        return (width, height);
    }

    let scale = max_dimension as f64 / longest as f64;
    let scaled = |side: u32| ((side as f64 * scale).round() as u32).clamp(1, max_dimension);
    (scaled(width), scaled(height))
}
