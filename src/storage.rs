// SPDX-License-Identifier: GPL-3.0-only

//! Storage utilities for saved panoramas

use crate::backends::PanoramaImage;
use crate::config::{OutputFormat, OutputQuality};
use crate::constants::output::PICTURES_SUBDIR;
use crate::errors::{AppError, AppResult};
use crate::pipelines::PanoramaEncoder;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// `~/Pictures/panoramas`, or `./panoramas` when there is no pictures directory
pub fn default_output_dir() -> PathBuf {
    match dirs::picture_dir() {
        Some(dir) => dir.join(PICTURES_SUBDIR),
        None => {
            warn!("No pictures directory, saving next to the working directory");
            PathBuf::from(PICTURES_SUBDIR)
        }
    }
}

/// Encode and write a panorama, creating `output_dir` if needed
pub async fn save_panorama(
    panorama: PanoramaImage,
    output_dir: &Path,
    format: OutputFormat,
    quality: OutputQuality,
) -> AppResult<PathBuf> {
    tokio::fs::create_dir_all(output_dir).await.map_err(|e| {
        AppError::Storage(format!(
            "Cannot create {}: {}",
            output_dir.display(),
            e
        ))
    })?;
    debug!(dir = %output_dir.display(), "Output directory ready");

    let encoder = PanoramaEncoder::new()
        .with_format(format.into())
        .with_quality(quality.into());
    let encoded = encoder.encode(panorama).await?;
    encoder.save(encoded, output_dir).await
}
