// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! This module provides command-line functionality for:
//! - Running a guided capture against simulated hardware
//! - Showing and writing the configuration

use pano_capture::backends::{ScriptedOrientation, SharedHeading, VirtualCamera};
use pano_capture::config::Config;
use pano_capture::constants::{app_info, simulation};
use pano_capture::errors::AppError;
use pano_capture::pipelines::{LaplacianVarianceDetector, StripStitcher};
use pano_capture::session::{
    ChannelObserver, SessionPorts, SessionRunner, SessionUpdate, ShotCounter,
};
use pano_capture::storage;
use std::f64::consts::TAU;
use std::path::PathBuf;
use std::sync::Arc;

/// Width of the progress bar in characters
const BAR_WIDTH: usize = 20;

pub struct SimulateOptions {
    pub rate: f64,
    pub blurry: Vec<usize>,
    pub failing: Vec<usize>,
    pub shots: Option<usize>,
    pub fail_stitch: bool,
    pub output: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

/// Run one guided capture end to end and save the panorama
pub fn simulate(options: SimulateOptions) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &options.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };
    if let Some(shots) = options.shots {
        config.capture.target_step = TAU / shots as f64;
        config.capture.expected_shots = shots;
    }
    config.validate()?;

    let output_dir = options
        .output
        .clone()
        .unwrap_or_else(|| config.resolved_output_dir());

    println!("pano-capture {}", app_info::version());
    println!(
        "Capturing {} shots, {:.1}° apart, sweeping at {}°/s",
        config.capture.expected_shots,
        config.capture.target_step.to_degrees(),
        options.rate
    );
    if !options.blurry.is_empty() {
        println!("Blurred requests: {:?}", options.blurry);
    }
    if !options.failing.is_empty() {
        println!("Failing requests: {:?}", options.failing);
    }
    println!();

    // Camera renders whatever the simulated sensor is pointing at
    let heading = SharedHeading::new(0.0);
    let orientation = ScriptedOrientation::sweep(0.0, options.rate).with_heading(heading.clone());
    let mut camera = VirtualCamera::new(simulation::FRAME_WIDTH, simulation::FRAME_HEIGHT)
        .with_heading(heading)
        .with_defocused(options.blurry.iter().copied())
        .with_failures(options.failing.iter().copied());
    if options.fail_stitch {
        camera = camera.with_moving_scene();
    }

    let ports = SessionPorts {
        orientation: Box::new(orientation),
        camera: Arc::new(camera),
        detector: Arc::new(LaplacianVarianceDetector),
        stitcher: Arc::new(StripStitcher::new(config.stitcher.clone())),
    };

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let (observer, mut updates) = ChannelObserver::channel();
        let (runner, handle) = SessionRunner::new(config.capture.clone(), ports, observer);
        let task = runner.spawn();

        // Ctrl+C abandons the session and stops the runner
        let interrupt = handle.clone();
        ctrlc::set_handler(move || {
            let _ = interrupt.cancel_session();
            interrupt.shutdown();
        })?;

        handle.start_session()?;

        let mut counter = ShotCounter {
            accepted: 0,
            expected: config.capture.expected_shots,
        };
        let mut progress = 0.0;

        let outcome = loop {
            match updates.recv().await {
                Some(SessionUpdate::Progress(fraction)) => {
                    progress = fraction;
                    print_status(progress, counter)?;
                }
                Some(SessionUpdate::FrameCountChanged(update)) => {
                    counter = update;
                    print_status(progress, counter)?;
                }
                Some(SessionUpdate::FrameRejected {
                    rejection,
                    retrying,
                }) => {
                    println!();
                    if retrying {
                        println!("{}, retrying", rejection);
                    } else {
                        println!("{}, skipping this angle", rejection);
                    }
                }
                Some(SessionUpdate::FrameAccepted(_)) => {}
                Some(SessionUpdate::Completed(panorama)) => break Ok(panorama),
                Some(SessionUpdate::Failed(reason)) => break Err(AppError::Session(reason)),
                None => break Err(AppError::Other("Capture cancelled".into())),
            }
        };
        println!();

        handle.shutdown();
        let _ = task.await;

        let panorama = outcome?;
        println!(
            "Panorama: {}x{} from {} frames",
            panorama.width(),
            panorama.height(),
            panorama.frame_count
        );

        let path = storage::save_panorama(
            panorama,
            &output_dir,
            config.output_format,
            config.output_quality,
        )
        .await?;
        println!("Panorama saved: {}", path.display());

        Ok::<_, Box<dyn std::error::Error>>(())
    })
}

/// Print the effective configuration, optionally writing it to disk
pub fn show_config(write: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load();
    println!("{}", serde_json::to_string_pretty(&config)?);

    if write {
        let path = Config::default_path().ok_or("No config directory available")?;
        config.save_to(&path)?;
        println!();
        println!("Configuration written to {}", path.display());
    }

    Ok(())
}

fn print_status(progress: f64, counter: ShotCounter) -> std::io::Result<()> {
    let filled = ((progress.clamp(0.0, 1.0) * BAR_WIDTH as f64).round() as usize).min(BAR_WIDTH);
    print!(
        "\r[{}{}] shots {:>7}",
        "#".repeat(filled),
        ".".repeat(BAR_WIDTH - filled),
        counter.to_string()
    );
    std::io::Write::flush(&mut std::io::stdout())
}
