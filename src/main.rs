// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "camera-effects")]
#[command(about = "Apply real-time video effects to camera frames")]
#[command(version = camera_effects::constants::app_info::version())]
struct Cli {
    /// Config file (default: ~/.config/camera-effects/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run effects over a single image
    Process {
        /// Input image (PNG, JPEG, ...)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (default: ~/Pictures/Camera Effects/effects_TIMESTAMP.png)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Background blur power, 0.0 to 1.0
        #[arg(long)]
        blur: Option<f32>,

        /// Beautification level, 0.0 to 1.0
        #[arg(long)]
        beautify: Option<f32>,

        /// Replace the background with a packed 0xAARRGGBB color
        #[arg(long, value_parser = cli::parse_color)]
        background_color: Option<u32>,

        /// Replace the background with an image
        #[arg(long, conflicts_with = "background_color")]
        background_image: Option<PathBuf>,
    },

    /// Measure throughput over synthetic frames
    Bench {
        /// Number of frames to process
        #[arg(short, long, default_value = "300")]
        frames: u64,

        /// Background blur power applied during the run
        #[arg(long, default_value = "0.5")]
        blur: f32,
    },

    /// Show version and configuration
    Info,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=camera_effects=trace, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let config = cli::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Process {
            input,
            output,
            blur,
            beautify,
            background_color,
            background_image,
        } => cli::process_image(
            &config,
            &input,
            output,
            cli::EffectArgs {
                blur,
                beautify,
                background_color,
                background_image,
            },
        ),
        Commands::Bench { frames, blur } => cli::bench(&config, frames, blur),
        Commands::Info => cli::info(&config, cli.config.as_deref()),
    }
}
