// SPDX-License-Identifier: GPL-3.0-only

//! Image pipelines behind the capture session
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Camera Frame │ ──▶ │  Sharpness Score  │ ──▶ │   Stitcher   │ ──▶ │  JPEG / PNG  │
//! │   (RGBA)     │     │  (per frame)      │     │  (per batch) │     │              │
//! └──────────────┘     └───────────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! Everything here is CPU-bound and synchronous except the encoder, which
//! hops onto the blocking pool itself. The session runner moves scoring and
//! stitching off its event loop.
//!
//! # Modules
//!
//! - [`sharpness`]: [`BlurDetector`] contract and Laplacian-variance scoring
//! - [`stitch`]: [`Stitcher`] contract and the shift-and-feather stitcher
//! - [`encoding`]: panorama encoding and saving

pub mod encoding;
pub mod sharpness;
pub mod stitch;

pub use encoding::{EncodedPanorama, EncodingFormat, EncodingQuality, PanoramaEncoder};
pub use sharpness::{BlurDetector, LaplacianVarianceDetector};
pub use stitch::{BlendLevel, SeamEstimate, Stitcher, StripStitcher};
