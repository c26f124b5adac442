// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use pano_capture::constants::simulation;
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "pano-capture")]
#[command(about = "Guided panoramic capture with focus gating and batch stitching")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full guided capture against a simulated sensor and camera
    Simulate {
        /// Rotation speed of the simulated sweep (degrees per second)
        #[arg(short, long, default_value_t = simulation::SWEEP_RATE_DEG_PER_SEC)]
        rate: f64,

        /// Capture requests (zero-based) that come out blurred, e.g. 3,4,5
        #[arg(short, long, value_delimiter = ',')]
        blurry: Vec<usize>,

        /// Capture requests (zero-based) that fail with a hardware error
        #[arg(long, value_delimiter = ',')]
        failing: Vec<usize>,

        /// Shots per full turn (default: from config)
        #[arg(short, long)]
        shots: Option<usize>,

        /// Move the scene between shots so frames cannot be stitched
        #[arg(long)]
        fail_stitch: bool,

        /// Output directory (default: ~/Pictures/panoramas)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Config file to use instead of the default location
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the effective configuration
    Config {
        /// Also write it to the default config file
        #[arg(short, long)]
        write: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=pano_capture=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            rate,
            blurry,
            failing,
            shots,
            fail_stitch,
            output,
            config,
        } => cli::simulate(cli::SimulateOptions {
            rate,
            blurry,
            failing,
            shots,
            fail_stitch,
            output,
            config,
        }),
        Commands::Config { write } => cli::show_config(write),
    }
}
