// SPDX-License-Identifier: GPL-3.0-only

//! Batch stitching
//!
//! The orchestrator only depends on the [`Stitcher`] contract. The
//! bundled [`StripStitcher`] covers the pure-rotation case produced by
//! guided capture: neighbouring frames differ by a horizontal shift, which
//! is estimated by exhaustive normalized cross-correlation and then
//! feather-blended. It does no projection, vertical alignment or exposure
//! compensation.

use crate::backends::{PanoramaImage, RawImage};
use crate::config::StitcherSettings;
use crate::constants::capture::MIN_STITCH_FRAMES;
use crate::errors::StitchError;
use image::{Rgba, RgbaImage};
use tracing::{debug, info, warn};

/// Combines an ordered frame sequence into one panorama
///
/// Long-running and CPU-bound; callers run it off the event loop. Frames
/// are passed by value: the batch belongs to the stitcher once submitted.
pub trait Stitcher: Send + Sync {
    fn stitch(&self, frames: Vec<RawImage>) -> Result<PanoramaImage, StitchError>;
}

/// Seam blending quality derived from the blending strength setting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendLevel {
    Low,
    Medium,
    High,
}

impl BlendLevel {
    pub fn from_strength(strength: f64) -> Self {
        if strength < 5.0 {
            BlendLevel::Low
        } else if strength <= 10.0 {
            BlendLevel::Medium
        } else {
            BlendLevel::High
        }
    }

    /// Number of blend bands
    pub fn bands(self) -> u32 {
        match self {
            BlendLevel::Low => 3,
            BlendLevel::Medium => 7,
            BlendLevel::High => 12,
        }
    }

    /// Width of the feathered seam in pixels
    pub fn feather_width(self) -> u32 {
        self.bands() * 2
    }
}

/// Alignment of one frame against its predecessor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeamEstimate {
    /// Horizontal offset of the next frame in pixels
    pub shift: u32,
    /// Normalized cross-correlation over the overlap (−1..1)
    pub confidence: f64,
}

/// Shift-and-feather stitcher for horizontally rotating captures
pub struct StripStitcher {
    settings: StitcherSettings,
}

impl StripStitcher {
    pub fn new(settings: StitcherSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &StitcherSettings {
        &self.settings
    }

    /// Find the shift of `next` relative to `prev` that best explains the overlap
    ///
    /// Both planes are `width × height` luma. Shifts from 1 up to
    /// `width − min_overlap` are tried; every second row and column is
    /// sampled.
    pub fn estimate_seam(&self, prev: &[f32], next: &[f32], width: u32, height: u32) -> SeamEstimate {
        let width = width as usize;
        let height = height as usize;
        let min_overlap = ((width as f64 * self.settings.min_overlap_fraction).ceil() as usize)
            .clamp(1, width.max(1));
        let max_shift = width.saturating_sub(min_overlap);

        let mut best = SeamEstimate {
            shift: 1,
            confidence: f64::NEG_INFINITY,
        };

        for shift in 1..=max_shift {
            let overlap = width - shift;
            let confidence = correlate(prev, next, width, height, shift, overlap);
            if confidence > best.confidence {
                best = SeamEstimate {
                    shift: shift as u32,
                    confidence,
                };
            }
        }

        if best.confidence == f64::NEG_INFINITY {
            best.confidence = 0.0;
        }
        best
    }
}

impl Default for StripStitcher {
    fn default() -> Self {
        Self::new(StitcherSettings::default())
    }
}

impl Stitcher for StripStitcher {
    fn stitch(&self, frames: Vec<RawImage>) -> Result<PanoramaImage, StitchError> {
        if frames.len() < MIN_STITCH_FRAMES {
            return Err(StitchError::InvalidInput(format!(
                "need at least {} frames, got {}",
                MIN_STITCH_FRAMES,
                frames.len()
            )));
        }

        let (width, height) = (frames[0].width, frames[0].height);
        if width < 2 || height == 0 {
            return Err(StitchError::InvalidInput(format!(
                "frame size {}x{} too small",
                width, height
            )));
        }
        if let Some((index, frame)) = frames
            .iter()
            .enumerate()
            .find(|(_, f)| f.width != width || f.height != height)
        {
            return Err(StitchError::InvalidInput(format!(
                "frame {} is {}x{}, expected {}x{}",
                index, frame.width, frame.height, width, height
            )));
        }
        // Padded or truncated buffers would be misread by the seam search
        if let Some((index, frame)) = frames
            .iter()
            .enumerate()
            .find(|(_, f)| !f.is_well_formed())
        {
            return Err(StitchError::InvalidInput(format!(
                "frame {} has {} bytes, expected {}",
                index,
                frame.data.len(),
                frame.pixel_count() * 4
            )));
        }

        info!(frames = frames.len(), width, height, "Stitching panorama");

        // Align every neighbour pair
        let lumas: Vec<Vec<f32>> = frames.iter().map(RawImage::luma).collect();
        let mut offsets = Vec::with_capacity(frames.len());
        offsets.push(0u64);
        for (index, pair) in lumas.windows(2).enumerate() {
            let seam = self.estimate_seam(&pair[0], &pair[1], width, height);
            debug!(
                seam = index,
                shift = seam.shift,
                confidence = seam.confidence,
                "Seam estimated"
            );
            if seam.confidence < self.settings.pano_confidence_thresh {
                warn!(
                    seam = index,
                    confidence = seam.confidence,
                    threshold = self.settings.pano_confidence_thresh,
                    "Seam below confidence threshold"
                );
                return Err(StitchError::StitchingFailed(format!(
                    "frames {} and {} overlap with confidence {:.2} (< {:.2})",
                    index,
                    index + 1,
                    seam.confidence,
                    self.settings.pano_confidence_thresh
                )));
            }
            let last = offsets[offsets.len() - 1];
            offsets.push(last + seam.shift as u64);
        }

        let total_width = offsets[offsets.len() - 1] + width as u64;
        let total_width = u32::try_from(total_width).map_err(|_| {
            StitchError::StitchingFailed(format!("panorama width {} too large", total_width))
        })?;

        let feather = BlendLevel::from_strength(self.settings.blending_strength).feather_width();
        let mut canvas = RgbaImage::new(total_width, height);

        for (index, frame) in frames.iter().enumerate() {
            let image = frame.to_rgba_image().ok_or_else(|| {
                StitchError::InvalidInput(format!("frame {} has a malformed pixel buffer", index))
            })?;
            let origin = offsets[index] as u32;
            let seam_width = if index == 0 {
                0
            } else {
                let overlap = width - (offsets[index] - offsets[index - 1]) as u32;
                feather.min(overlap)
            };

            for x in 0..width {
                let weight = if x < seam_width {
                    (x + 1) as f32 / (seam_width + 1) as f32
                } else {
                    1.0
                };
                for y in 0..height {
                    let src = image.get_pixel(x, y);
                    let dst = canvas.get_pixel_mut(origin + x, y);
                    *dst = if weight >= 1.0 { *src } else { mix(dst, src, weight) };
                }
            }
        }

        info!(
            width = total_width,
            height,
            frames = frames.len(),
            "Panorama stitched"
        );

        Ok(PanoramaImage {
            image: canvas,
            frame_count: frames.len(),
        })
    }
}

/// NCC between `prev[x + shift]` and `next[x]` for x in 0..overlap
fn correlate(prev: &[f32], next: &[f32], width: usize, height: usize, shift: usize, overlap: usize) -> f64 {
    let (mut sa, mut sb, mut saa, mut sbb, mut sab) = (0.0f64, 0.0f64, 0.0f64, 0.0f64, 0.0f64);
    let mut n = 0.0f64;

    for y in (0..height).step_by(2) {
        let row = y * width;
        for x in (0..overlap).step_by(2) {
            let a = prev[row + x + shift] as f64;
            let b = next[row + x] as f64;
            sa += a;
            sb += b;
            saa += a * a;
            sbb += b * b;
            sab += a * b;
            n += 1.0;
        }
    }

    if n == 0.0 {
        return 0.0;
    }
    let cov = sab / n - (sa / n) * (sb / n);
    let var_a = saa / n - (sa / n).powi(2);
    let var_b = sbb / n - (sb / n).powi(2);
    if var_a <= f64::EPSILON || var_b <= f64::EPSILON {
        return 0.0;
    }
    cov / (var_a * var_b).sqrt()
}

fn mix(under: &Rgba<u8>, over: &Rgba<u8>, weight: f32) -> Rgba<u8> {
    let mut out = [0u8; 4];
    for (channel, value) in out.iter_mut().enumerate() {
        let blended = under.0[channel] as f32 * (1.0 - weight) + over.0[channel] as f32 * weight;
        *value = blended.round().clamp(0.0, 255.0) as u8;
    }
    Rgba(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::virtual_camera::{pixels_per_radian, render_view};

    const WIDTH: u32 = 128;
    const HEIGHT: u32 = 64;
    const SHIFT_PX: u32 = 24;

    fn sweep_frames(count: usize) -> Vec<RawImage> {
        let step = SHIFT_PX as f64 / pixels_per_radian(WIDTH);
        (0..count)
            .map(|i| RawImage::from_rgba(render_view(0.3 + step * i as f64, WIDTH, HEIGHT)))
            .collect()
    }

    #[test]
    fn test_blend_levels() {
        assert_eq!(BlendLevel::from_strength(2.0).bands(), 3);
        assert_eq!(BlendLevel::from_strength(8.0).bands(), 7);
        assert_eq!(BlendLevel::from_strength(10.0), BlendLevel::Medium);
        assert_eq!(BlendLevel::from_strength(12.0).bands(), 12);
    }

    #[test]
    fn test_estimates_known_shift() {
        let frames = sweep_frames(2);
        let stitcher = StripStitcher::default();
        let seam = stitcher.estimate_seam(&frames[0].luma(), &frames[1].luma(), WIDTH, HEIGHT);
        assert!(
            (seam.shift as i64 - SHIFT_PX as i64).abs() <= 1,
            "estimated shift {}",
            seam.shift
        );
        assert!(seam.confidence > 0.9);
    }

    #[test]
    fn test_stitches_sweep() {
        let frames = sweep_frames(5);
        let panorama = StripStitcher::default().stitch(frames).unwrap();

        assert_eq!(panorama.frame_count, 5);
        assert_eq!(panorama.height(), HEIGHT);
        let expected = WIDTH + 4 * SHIFT_PX;
        assert!(
            (panorama.width() as i64 - expected as i64).abs() <= 4,
            "width {} expected about {}",
            panorama.width(),
            expected
        );
    }

    #[test]
    fn test_rejects_single_frame() {
        let frames = sweep_frames(1);
        assert!(matches!(
            StripStitcher::default().stitch(frames),
            Err(StitchError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_rejects_mismatched_sizes() {
        let mut frames = sweep_frames(2);
        frames.push(RawImage::from_rgba(render_view(0.0, WIDTH / 2, HEIGHT)));
        assert!(matches!(
            StripStitcher::default().stitch(frames),
            Err(StitchError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_rejects_malformed_buffer() {
        let mut frames = sweep_frames(2);
        frames.push(RawImage {
            width: WIDTH,
            height: HEIGHT,
            data: std::sync::Arc::from(vec![0u8; 256]),
            captured_at: std::time::Instant::now(),
        });
        match StripStitcher::default().stitch(frames) {
            Err(StitchError::InvalidInput(msg)) => assert!(msg.contains("frame 2"), "{}", msg),
            other => panic!("expected InvalidInput, got {:?}", other.map(|p| p.frame_count)),
        }
    }

    #[test]
    fn test_rejects_unrelated_views() {
        let frames = vec![
            RawImage::from_rgba(render_view(0.0, WIDTH, HEIGHT)),
            RawImage::from_rgba(render_view(std::f64::consts::PI, WIDTH, HEIGHT)),
        ];
        assert!(matches!(
            StripStitcher::default().stitch(frames),
            Err(StitchError::StitchingFailed(_))
        ));
    }

    #[test]
    fn test_uniform_frames_have_no_confidence() {
        let flat = RawImage::from_rgba(RgbaImage::from_pixel(WIDTH, HEIGHT, Rgba([50, 50, 50, 255])));
        let luma = flat.luma();
        let seam = StripStitcher::default().estimate_seam(&luma, &luma, WIDTH, HEIGHT);
        assert_eq!(seam.confidence, 0.0);
    }
}
