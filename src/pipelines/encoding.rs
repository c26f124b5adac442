// SPDX-License-Identifier: GPL-3.0-only

//! Async panorama encoding
//!
//! Stitched panoramas are flattened to RGB and written as:
//! - JPEG (with quality control)
//! - PNG (lossless)
//!
//! Encoding and file writes run on the blocking pool.

use crate::backends::PanoramaImage;
use crate::config::{OutputFormat, OutputQuality};
use crate::constants::output::FILE_PREFIX;
use crate::errors::{AppError, AppResult};
use image::{DynamicImage, RgbImage};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Supported encoding formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingFormat {
    /// JPEG format (lossy compression)
    Jpeg,
    /// PNG format (lossless compression)
    Png,
}

impl EncodingFormat {
    /// Get file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            EncodingFormat::Jpeg => "jpg",
            EncodingFormat::Png => "png",
        }
    }
}

impl From<OutputFormat> for EncodingFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Jpeg => EncodingFormat::Jpeg,
            OutputFormat::Png => EncodingFormat::Png,
        }
    }
}

/// Encoding quality settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingQuality {
    Low,
    Medium,
    High,
    Maximum,
}

impl EncodingQuality {
    /// Get JPEG quality value (0-100)
    pub fn jpeg_quality(&self) -> u8 {
        match self {
            EncodingQuality::Low => 60,
            EncodingQuality::Medium => 80,
            EncodingQuality::High => 92,
            EncodingQuality::Maximum => 98,
        }
    }
}

impl From<OutputQuality> for EncodingQuality {
    fn from(quality: OutputQuality) -> Self {
        match quality {
            OutputQuality::Low => EncodingQuality::Low,
            OutputQuality::Medium => EncodingQuality::Medium,
            OutputQuality::High => EncodingQuality::High,
            OutputQuality::Maximum => EncodingQuality::Maximum,
        }
    }
}

/// Encoded panorama ready for saving
pub struct EncodedPanorama {
    pub data: Vec<u8>,
    pub format: EncodingFormat,
    pub width: u32,
    pub height: u32,
}

/// Panorama encoder
pub struct PanoramaEncoder {
    format: EncodingFormat,
    quality: EncodingQuality,
}

impl PanoramaEncoder {
    /// Create a new encoder with JPEG format and high quality
    pub fn new() -> Self {
        Self {
            format: EncodingFormat::Jpeg,
            quality: EncodingQuality::High,
        }
    }

    pub fn with_format(mut self, format: EncodingFormat) -> Self {
        self.format = format;
        self
    }

    /// Set encoding quality (only affects JPEG)
    pub fn with_quality(mut self, quality: EncodingQuality) -> Self {
        self.quality = quality;
        self
    }

    pub fn format(&self) -> EncodingFormat {
        self.format
    }

    /// Encode a panorama on the blocking pool
    pub async fn encode(&self, panorama: PanoramaImage) -> AppResult<EncodedPanorama> {
        let (width, height) = (panorama.width(), panorama.height());
        info!(width, height, format = ?self.format, "Starting encoding");

        let format = self.format;
        let quality = self.quality;

        tokio::task::spawn_blocking(move || {
            let rgb = DynamicImage::ImageRgba8(panorama.image).into_rgb8();
            let data = match format {
                EncodingFormat::Jpeg => encode_jpeg(&rgb, quality)?,
                EncodingFormat::Png => encode_png(&rgb)?,
            };

            debug!(size = data.len(), "Encoding complete");

            Ok(EncodedPanorama {
                data,
                format,
                width,
                height,
            })
        })
        .await
        .map_err(|e| AppError::Other(format!("Encoding task error: {}", e)))?
    }

    /// Write an encoded panorama into `output_dir` under a timestamped name
    pub async fn save(&self, encoded: EncodedPanorama, output_dir: &Path) -> AppResult<PathBuf> {
        let filepath = output_dir.join(panorama_filename(encoded.format));

        info!(path = %filepath.display(), "Saving panorama");

        let target = filepath.clone();
        tokio::task::spawn_blocking(move || std::fs::write(&target, &encoded.data))
            .await
            .map_err(|e| AppError::Other(format!("Save task error: {}", e)))?
            .map_err(|e| AppError::Storage(format!("Failed to save panorama: {}", e)))?;

        info!(path = %filepath.display(), "Panorama saved successfully");
        Ok(filepath)
    }
}

impl Default for PanoramaEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// `PANO_<local timestamp>.<ext>`
pub fn panorama_filename(format: EncodingFormat) -> String {
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    format!("{}_{}.{}", FILE_PREFIX, timestamp, format.extension())
}

fn encode_jpeg(image: &RgbImage, quality: EncodingQuality) -> AppResult<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut buffer);

    let mut encoder =
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut cursor, quality.jpeg_quality());

    encoder
        .encode(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| AppError::Other(format!("JPEG encoding failed: {}", e)))?;

    Ok(buffer)
}

fn encode_png(image: &RgbImage) -> AppResult<Vec<u8>> {
    let mut buffer = Vec::new();

    image
        .write_to(
            &mut std::io::Cursor::new(&mut buffer),
            image::ImageFormat::Png,
        )
        .map_err(|e| AppError::Other(format!("PNG encoding failed: {}", e)))?;

    Ok(buffer)
}
