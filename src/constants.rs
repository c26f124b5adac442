// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Guided capture defaults
pub mod capture {
    use super::Duration;
    use std::f64::consts::PI;

    /// Rotation between consecutive shots (15°)
    pub const TARGET_ANGLE_STEP: f64 = PI / 12.0;

    /// Yaw window around a target inside which a shot is requested (radians)
    pub const CAPTURE_TOLERANCE: f64 = 0.05;

    /// Minimum sharpness score for a frame to be kept
    ///
    /// Unit is whatever the scorer reports; for the Laplacian-variance
    /// detector this is the variance of the filtered luma plane.
    pub const SHARPNESS_THRESHOLD: f64 = 100.0;

    /// Re-captures allowed at one target before the frame is dropped
    pub const MAX_RETRIES: u32 = 2;

    /// Frames in a full turn (24 × 15° = 360°)
    pub const EXPECTED_SHOTS: usize = 24;

    /// Orientation sampling period (20 Hz)
    pub const SAMPLE_PERIOD: Duration = Duration::from_millis(50);

    /// Deadline for a single capture request
    pub const CAPTURE_TIMEOUT: Duration = Duration::from_secs(5);

    /// The stitcher needs at least this many frames
    pub const MIN_STITCH_FRAMES: usize = 2;
}

/// Stitcher defaults
pub mod stitching {
    /// Minimum seam confidence accepted between neighbouring frames
    pub const PANO_CONFIDENCE_THRESH: f64 = 0.8;

    /// Blending strength; <5 low, 5..=10 medium, >10 high
    pub const BLENDING_STRENGTH: f64 = 8.0;

    /// Smallest overlap between neighbouring frames tried during alignment,
    /// as a share of the frame width
    pub const MIN_OVERLAP_FRACTION: f64 = 0.25;
}

/// Simulation defaults used by the CLI
pub mod simulation {
    use super::Duration;

    /// Sweep rate of the scripted orientation source (degrees per second)
    pub const SWEEP_RATE_DEG_PER_SEC: f64 = 60.0;

    /// Frame size rendered by the virtual camera
    pub const FRAME_WIDTH: u32 = 320;
    pub const FRAME_HEIGHT: u32 = 240;

    /// Simulated shutter latency
    pub const SHUTTER_LATENCY: Duration = Duration::from_millis(30);

    /// Gaussian sigma applied to frames the virtual camera renders out of focus
    pub const DEFOCUS_SIGMA: f32 = 6.0;
}

/// Output file handling
pub mod output {
    /// Filename prefix for saved panoramas
    pub const FILE_PREFIX: &str = "PANO";

    /// Subdirectory created under the user's pictures directory
    pub const PICTURES_SUBDIR: &str = "panoramas";

    /// Directory name under the user's config directory
    pub const CONFIG_DIR_NAME: &str = "pano-capture";

    /// Config file name
    pub const CONFIG_FILE_NAME: &str = "config.json";
}

/// Application information utilities
pub mod app_info {
    /// Get the application version from build-time environment
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }
}
