// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! This module provides command-line functionality for:
//! - Running effects over a still image
//! - Benchmarking the pipeline on a worker thread
//! - Showing version and configuration

use camera_effects::constants::app_info;
use camera_effects::frame::swap_red_blue;
use camera_effects::{
    Config, EffectsPipeline, FrameView, LoopAction, OwnedFrame, PipelineError, ProcessingWorker,
};
use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Instant;

/// Default folder name for processed images
const DEFAULT_SAVE_FOLDER: &str = "Camera Effects";

/// Effects requested on the command line
pub struct EffectArgs {
    pub blur: Option<f32>,
    pub beautify: Option<f32>,
    pub background_color: Option<u32>,
    pub background_image: Option<PathBuf>,
}

/// Parse a packed color given as `0xAARRGGBB`, `#AARRGGBB` or bare hex
pub fn parse_color(value: &str) -> Result<u32, String> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .or_else(|| value.strip_prefix('#'))
        .unwrap_or(value);
    if digits.is_empty() || digits.len() > 8 {
        return Err(format!("'{}' is not a 32-bit hex color", value));
    }
    u32::from_str_radix(digits, 16).map_err(|e| format!("'{}': {}", value, e))
}

/// Load config from `path` or the default location
pub fn load_config(path: Option<&Path>) -> Result<Config, PipelineError> {
    match path {
        Some(path) => Config::load(path),
        None => Config::load_default(),
    }
}

/// Run the requested effects over one image and save the result
pub fn process_image(
    config: &Config,
    input: &Path,
    output: Option<PathBuf>,
    effects: EffectArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let image = image::open(input)
        .map_err(|e| format!("Failed to open {}: {}", input.display(), e))?
        .to_rgba8();
    let (width, height) = image.dimensions();
    println!("Input: {} ({}x{})", input.display(), width, height);

    let mut pixels = image.into_raw();
    swap_red_blue(&mut pixels);

    // The pipeline is sized to the image, other settings come from config
    let pipeline = EffectsPipeline::from_config(&Config {
        width,
        height,
        ..config.clone()
    })?;

    if let Some(power) = effects.blur {
        pipeline.set_blur(power)?;
        println!("Blur: {:.2}", power);
    }
    if let Some(level) = effects.beautify {
        pipeline.set_beautification(level)?;
        println!("Beautification: {:.2}", level);
    }
    if let Some(color) = effects.background_color {
        pipeline.set_background_color(color)?;
        println!("Background color: {:#010x}", color);
    }
    if let Some(path) = effects.background_image {
        pipeline.set_background_image(&path)?;
        println!("Background image: {}", path.display());
    }
    if !pipeline.any_effect_active() {
        println!("No effects requested, output will match input");
    }

    let start = Instant::now();
    let view = pipeline.process(FrameView::bgra(&pixels, width, height))?;
    let elapsed = start.elapsed();

    let mut result = view.to_vec();
    swap_red_blue(&mut result);

    let output_path = match output {
        Some(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            path
        }
        None => {
            let dir = get_default_output_dir();
            std::fs::create_dir_all(&dir)?;
            let timestamp = Local::now().format("%Y%m%d_%H%M%S");
            dir.join(format!("effects_{}.png", timestamp))
        }
    };

    let image = image::RgbaImage::from_raw(width, height, result)
        .ok_or("Output buffer does not match image size")?;
    image.save(&output_path)?;

    println!("Processed in {:.1} ms", elapsed.as_secs_f64() * 1000.0);
    println!("Saved to: {}", output_path.display());

    Ok(())
}

/// Drive the worker over synthetic frames and report throughput
pub fn bench(config: &Config, frames: u64, blur: f32) -> Result<(), Box<dyn std::error::Error>> {
    let pipeline = Arc::new(EffectsPipeline::from_config(config)?);
    pipeline.set_blur(blur)?;

    let (width, height) = (config.width, config.height);
    println!(
        "Benchmark: {} frames at {}x{} ({} surfaces), blur {:.2}",
        frames, width, height, config.surface_backend, blur
    );
    println!("Press Ctrl+C to stop early");

    let mut next_index = 0u64;
    let source = move || {
        let index = next_index;
        next_index += 1;
        (index < frames).then(|| synthetic_frame(width, height, index))
    };

    let start = Instant::now();
    let mut worker = ProcessingWorker::start(
        &config.worker_name,
        Arc::clone(&pipeline),
        source,
        |result| {
            if let Err(e) = result {
                eprintln!("Frame failed: {}", e);
            }
            LoopAction::Continue
        },
    )?;

    // Set up Ctrl+C handler
    let stop_signal = worker.stop_signal();
    ctrlc::set_handler(move || {
        stop_signal.store(true, Ordering::SeqCst);
    })?;

    worker.join();
    let elapsed = start.elapsed().as_secs_f64();
    let stats = worker.stats();

    println!();
    println!("Processed: {}", stats.processed);
    println!("Failed:    {}", stats.failed);
    if elapsed > 0.0 && stats.processed > 0 {
        println!(
            "Throughput: {:.1} fps ({:.2} ms/frame)",
            stats.processed as f64 / elapsed,
            elapsed * 1000.0 / stats.processed as f64
        );
    }

    Ok(())
}

/// Print version and effective configuration
pub fn info(config: &Config, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = path.map(Path::to_path_buf).or_else(Config::default_path);

    println!("camera-effects {}", app_info::version());
    println!();
    match config_path {
        Some(path) => {
            let state = if path.exists() { "" } else { " (not found, defaults)" };
            println!("Config: {}{}", path.display(), state);
        }
        None => println!("Config: none (defaults)"),
    }
    println!("  Frame size:      {}x{}", config.width, config.height);
    println!("  Surface backend: {}", config.surface_backend);
    println!("  Worker name:     {}", config.worker_name);
    println!(
        "  Backgrounds:     {}",
        if config.fit_background { "scaled to fit" } else { "must match frame size" }
    );

    Ok(())
}

/// Diagonal gradient that shifts each frame
fn synthetic_frame(width: u32, height: u32, index: u64) -> OwnedFrame {
    let mut frame = OwnedFrame::solid_bgra(width, height, [0, 0, 0, 255]);
    let shift = index as usize;
    for (i, px) in frame.data.chunks_exact_mut(4).enumerate() {
        let x = i % width as usize;
        let y = i / width as usize;
        px[0] = (x + shift) as u8;
        px[1] = (y + shift) as u8;
        px[2] = (x + y) as u8;
    }
    frame
}

/// Get default output directory
fn get_default_output_dir() -> PathBuf {
    dirs::picture_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join(DEFAULT_SAVE_FOLDER)
}
