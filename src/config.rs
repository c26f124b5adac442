// SPDX-License-Identifier: GPL-3.0-only

use crate::constants::{capture, output, stitching};
use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// What to do with a target once every retry produced an unusable frame
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum ExhaustedRetryPolicy {
    /// Drop the frame, move on to the next target and shrink the batch by one
    #[default]
    SkipTarget,
    /// Drop the frame and wait at the same target for another attempt
    HoldTarget,
}

/// Output image format for saved panoramas
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
}

/// JPEG quality of saved panoramas; PNG output ignores it
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum OutputQuality {
    Low,
    Medium,
    #[default]
    High,
    Maximum,
}

/// Tuning of the guided capture state machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Rotation between shots (radians)
    pub target_step: f64,
    /// Trigger window half-width around a target (radians)
    pub capture_tolerance: f64,
    /// Minimum sharpness score for a frame to be kept
    pub sharpness_threshold: f64,
    /// Re-captures allowed per target
    pub max_retries: u32,
    /// Frames expected in a full turn
    pub expected_shots: usize,
    /// Orientation sampling period in milliseconds
    pub sample_period_ms: u64,
    /// Deadline for one capture request in milliseconds (None = wait forever)
    pub capture_timeout_ms: Option<u64>,
    /// Behaviour once retries at a target are used up
    pub exhausted_retry_policy: ExhaustedRetryPolicy,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            target_step: capture::TARGET_ANGLE_STEP,
            capture_tolerance: capture::CAPTURE_TOLERANCE,
            sharpness_threshold: capture::SHARPNESS_THRESHOLD,
            max_retries: capture::MAX_RETRIES,
            expected_shots: capture::EXPECTED_SHOTS,
            sample_period_ms: capture::SAMPLE_PERIOD.as_millis() as u64,
            capture_timeout_ms: Some(capture::CAPTURE_TIMEOUT.as_millis() as u64),
            exhausted_retry_policy: ExhaustedRetryPolicy::default(),
        }
    }
}

impl CaptureSettings {
    /// Settings for a full turn split into `shots` equal steps
    pub fn for_shot_count(shots: usize) -> Self {
        let shots = shots.max(1);
        Self {
            target_step: TAU / shots as f64,
            expected_shots: shots,
            ..Self::default()
        }
    }

    pub fn sample_period(&self) -> Duration {
        Duration::from_millis(self.sample_period_ms)
    }

    pub fn capture_timeout(&self) -> Option<Duration> {
        self.capture_timeout_ms.map(Duration::from_millis)
    }

    /// Reject settings the state machine cannot run with
    pub fn validate(&self) -> AppResult<()> {
        if !(self.target_step.is_finite() && self.target_step > 0.0) {
            return Err(AppError::Config(format!(
                "target_step must be positive, got {}",
                self.target_step
            )));
        }
        if !(self.capture_tolerance.is_finite() && self.capture_tolerance > 0.0) {
            return Err(AppError::Config(format!(
                "capture_tolerance must be positive, got {}",
                self.capture_tolerance
            )));
        }
        // A window wider than half a step would let one sample match two targets
        if self.capture_tolerance >= self.target_step / 2.0 {
            return Err(AppError::Config(format!(
                "capture_tolerance {} must be smaller than half the step {}",
                self.capture_tolerance, self.target_step
            )));
        }
        if self.expected_shots < capture::MIN_STITCH_FRAMES {
            return Err(AppError::Config(format!(
                "expected_shots must be at least {}, got {}",
                capture::MIN_STITCH_FRAMES,
                self.expected_shots
            )));
        }
        if self.sample_period_ms == 0 {
            return Err(AppError::Config("sample_period_ms must be non-zero".into()));
        }
        if self.capture_timeout_ms == Some(0) {
            return Err(AppError::Config(
                "capture_timeout_ms must be non-zero (use null to disable)".into(),
            ));
        }

        let turn = self.target_step * self.expected_shots as f64;
        if (turn - TAU).abs() > self.target_step / 2.0 {
            warn!(
                step = self.target_step,
                shots = self.expected_shots,
                "Configured shots do not close a full turn"
            );
        }

        Ok(())
    }
}

/// Knobs passed to the stitching service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StitcherSettings {
    /// Minimum confidence for a seam between neighbouring frames (0..1)
    pub pano_confidence_thresh: f64,
    /// Blending strength; <5 low, 5..=10 medium, >10 high
    pub blending_strength: f64,
    /// Smallest neighbour overlap considered during alignment (0..1)
    pub min_overlap_fraction: f64,
}

impl Default for StitcherSettings {
    fn default() -> Self {
        Self {
            pano_confidence_thresh: stitching::PANO_CONFIDENCE_THRESH,
            blending_strength: stitching::BLENDING_STRENGTH,
            min_overlap_fraction: stitching::MIN_OVERLAP_FRACTION,
        }
    }
}

impl StitcherSettings {
    pub fn validate(&self) -> AppResult<()> {
        if !(0.0..=1.0).contains(&self.pano_confidence_thresh) {
            return Err(AppError::Config(format!(
                "pano_confidence_thresh must be within 0..=1, got {}",
                self.pano_confidence_thresh
            )));
        }
        if !(self.min_overlap_fraction > 0.0 && self.min_overlap_fraction < 1.0) {
            return Err(AppError::Config(format!(
                "min_overlap_fraction must be within (0, 1), got {}",
                self.min_overlap_fraction
            )));
        }
        if self.blending_strength < 0.0 {
            return Err(AppError::Config(format!(
                "blending_strength must not be negative, got {}",
                self.blending_strength
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Capture state machine tuning
    pub capture: CaptureSettings,
    /// Stitching service settings
    pub stitcher: StitcherSettings,
    /// Format of saved panoramas
    pub output_format: OutputFormat,
    /// JPEG quality of saved panoramas
    pub output_quality: OutputQuality,
    /// Where panoramas are written (default: ~/Pictures/panoramas)
    pub output_dir: Option<PathBuf>,
}

impl Config {
    /// Default location of the config file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| {
            dir.join(output::CONFIG_DIR_NAME)
                .join(output::CONFIG_FILE_NAME)
        })
    }

    /// Load from the default location, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::default_path() else {
            warn!("No config directory available, using defaults");
            return Self::default();
        };

        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Self::default();
        }

        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unusable config file");
                Self::default()
            }
        }
    }

    /// Load and validate a config file
    pub fn load_from(path: &Path) -> AppResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Write as pretty JSON, creating parent directories
    pub fn save_to(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        info!(path = %path.display(), "Saved configuration");
        Ok(())
    }

    pub fn validate(&self) -> AppResult<()> {
        self.capture.validate()?;
        self.stitcher.validate()
    }

    /// Directory panoramas are saved to
    pub fn resolved_output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(crate::storage::default_output_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_shot_count_closes_turn() {
        let settings = CaptureSettings::for_shot_count(8);
        assert_eq!(settings.expected_shots, 8);
        assert!((settings.target_step * 8.0 - TAU).abs() < 1e-12);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_rejects_wide_tolerance() {
        let settings = CaptureSettings {
            capture_tolerance: 0.2,
            ..CaptureSettings::default()
        };
        assert!(matches!(settings.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_rejects_single_shot() {
        let settings = CaptureSettings::for_shot_count(1);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{ "capture": { "max_retries": 5 } }"#).unwrap();
        assert_eq!(config.capture.max_retries, 5);
        assert_eq!(config.capture.expected_shots, capture::EXPECTED_SHOTS);
        assert_eq!(config.output_format, OutputFormat::Jpeg);
    }
}
