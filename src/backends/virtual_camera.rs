// SPDX-License-Identifier: GPL-3.0-only

//! Virtual camera rendering a synthetic cylindrical scene
//!
//! Each capture renders the part of a procedurally textured 360° scene
//! that lies in front of the current heading. Individual capture requests
//! can be scripted to come out defocused or to fail, which is how the CLI
//! and the tests exercise the focus gate and the retry path.

use super::orientation::SharedHeading;
use super::types::RawImage;
use super::{CameraCapturePort, CaptureReply};
use crate::constants::simulation;
use crate::errors::CaptureError;
use image::{Rgba, RgbaImage};
use std::collections::HashSet;
use std::f64::consts::TAU;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Horizontal field of view of the virtual lens
const HORIZONTAL_FOV: f64 = std::f64::consts::FRAC_PI_3;
/// Texture cells around the full circle
const SCENE_COLUMNS: u64 = 180;
/// Texture cell height in pixels
const SCENE_ROW_HEIGHT: u32 = 8;
/// Scene rotation per request when the scene is set moving (golden angle)
const SCENE_DRIFT: f64 = 2.399_963_229_728_653;

/// Simulated camera
pub struct VirtualCamera {
    width: u32,
    height: u32,
    latency: Duration,
    heading: Option<SharedHeading>,
    defocused: HashSet<usize>,
    failing: HashSet<usize>,
    scene_drift: f64,
    access: Result<(), CaptureError>,
    requests: AtomicUsize,
}

impl VirtualCamera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            latency: simulation::SHUTTER_LATENCY,
            heading: None,
            defocused: HashSet::new(),
            failing: HashSet::new(),
            scene_drift: 0.0,
            access: Ok(()),
            requests: AtomicUsize::new(0),
        }
    }

    /// Render from the heading published by the orientation source
    pub fn with_heading(mut self, heading: SharedHeading) -> Self {
        self.heading = Some(heading);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Zero-based request indices whose frame comes out blurred
    pub fn with_defocused(mut self, requests: impl IntoIterator<Item = usize>) -> Self {
        self.defocused.extend(requests);
        self
    }

    /// Zero-based request indices that fail with a hardware error
    pub fn with_failures(mut self, requests: impl IntoIterator<Item = usize>) -> Self {
        self.failing.extend(requests);
        self
    }

    /// Rotate the scene between shots so neighbouring frames share no content
    pub fn with_moving_scene(mut self) -> Self {
        self.scene_drift = SCENE_DRIFT;
        self
    }

    /// Simulate a refused camera permission
    pub fn with_access_denied(mut self) -> Self {
        self.access = Err(CaptureError::PermissionDenied);
        self
    }

    /// Number of capture requests received so far
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl CameraCapturePort for VirtualCamera {
    fn check_access(&self) -> Result<(), CaptureError> {
        self.access.clone()
    }

    fn capture_one_photo(&self, reply: CaptureReply) {
        let index = self.requests.fetch_add(1, Ordering::SeqCst);

        if let Err(e) = &self.access {
            warn!(index, "Capture requested without camera access");
            reply(Err(e.clone()));
            return;
        }

        let fails = self.failing.contains(&index);
        let defocus = self.defocused.contains(&index);
        let heading = self.heading.as_ref().map(SharedHeading::get).unwrap_or(0.0)
            + self.scene_drift * index as f64;
        let (width, height, latency) = (self.width, self.height, self.latency);

        // Shutter + readout happen off the caller's thread, like a real device
        std::thread::spawn(move || {
            std::thread::sleep(latency);
            if fails {
                debug!(index, "Virtual camera simulating a hardware fault");
                reply(Err(CaptureError::Hardware(format!(
                    "simulated sensor fault on request {}",
                    index
                ))));
                return;
            }

            let mut frame = render_view(heading, width, height);
            if defocus {
                debug!(index, "Virtual camera rendering a defocused frame");
                frame = image::imageops::blur(&frame, simulation::DEFOCUS_SIGMA);
            }
            reply(Ok(RawImage::from_rgba(frame)));
        });
    }
}

/// Render the scene as seen when facing `heading`
///
/// The scene is a cylinder of flat-coloured cells with hard edges, so
/// frames are sharp unless deliberately blurred and neighbouring views
/// share recognisable content.
pub fn render_view(heading: f64, width: u32, height: u32) -> RgbaImage {
    let pixels_per_radian = width as f64 / HORIZONTAL_FOV;
    let half_width = width as f64 / 2.0;

    RgbaImage::from_fn(width, height, |x, y| {
        let bearing = (heading + (x as f64 + 0.5 - half_width) / pixels_per_radian).rem_euclid(TAU);
        let column = ((bearing / TAU) * SCENE_COLUMNS as f64) as u64 % SCENE_COLUMNS;
        let row = (y / SCENE_ROW_HEIGHT) as u64;
        let h = cell_hash(column, row);
        Rgba([h as u8, (h >> 8) as u8, (h >> 16) as u8, 255])
    })
}

/// Pixels per radian of the virtual lens at the given frame width
pub fn pixels_per_radian(width: u32) -> f64 {
    width as f64 / HORIZONTAL_FOV
}

fn cell_hash(column: u64, row: u64) -> u64 {
    // splitmix64 finalizer over the packed cell coordinates
    let mut z = column
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add(row.wrapping_mul(0xBF58_476D_1CE4_E5B9));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
