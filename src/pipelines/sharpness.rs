// SPDX-License-Identifier: GPL-3.0-only

//! Focus-quality scoring

use crate::backends::RawImage;

/// Scores how well focused a frame is; higher is sharper
///
/// Implementations must be deterministic and free of side effects: the
/// same image always yields the same score.
pub trait BlurDetector: Send + Sync {
    fn score(&self, image: &RawImage) -> f64;
}

/// Variance of the Laplacian of the luma plane
///
/// Uses the 4-neighbour kernel
///
/// ```text
/// 0  1  0
/// 1 -4  1
/// 0  1  0
/// ```
///
/// over interior pixels, in 0..255 luma units. Well-focused frames have
/// strong, localized second derivatives and therefore a large variance;
/// defocus spreads edges out and drives the variance towards zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct LaplacianVarianceDetector;

impl BlurDetector for LaplacianVarianceDetector {
    fn score(&self, image: &RawImage) -> f64 {
        let (width, height) = (image.width as usize, image.height as usize);
        if width < 3 || height < 3 || image.data.len() < width * height * 4 {
            return 0.0;
        }

        let luma = image.luma();
        let mut sum = 0.0f64;
        let mut sum_sq = 0.0f64;

        for y in 1..height - 1 {
            let row = y * width;
            for x in 1..width - 1 {
                let i = row + x;
                let lap = luma[i - width] + luma[i + width] + luma[i - 1] + luma[i + 1]
                    - 4.0 * luma[i];
                let lap = lap as f64;
                sum += lap;
                sum_sq += lap * lap;
            }
        }

        let n = ((width - 2) * (height - 2)) as f64;
        let mean = sum / n;
        (sum_sq / n - mean * mean).max(0.0)
    }
}
