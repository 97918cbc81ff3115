// SPDX-License-Identifier: GPL-3.0-only

//! Background image loading with the `image` crate

use super::{EngineFrame, ImageLoader};
use crate::constants::bgra_stride;
use crate::errors::{EngineError, EngineResult};
use crate::frame::{PixelFormat, swap_red_blue};
use image::imageops::FilterType;
use std::path::Path;
use tracing::{debug, info};

/// Decode failed or file missing
pub const LOADER_ERROR_DECODE: i32 = 1;
/// Image size differs from the pipeline and fitting is disabled
pub const LOADER_ERROR_SIZE: i32 = 2;

/// Loads background images from disk as BGRA32 engine frames
#[derive(Debug, Clone)]
pub struct FileImageLoader {
    /// Scale images to the pipeline size instead of rejecting them
    fit_to_pipeline: bool,
}

impl FileImageLoader {
    pub fn new() -> Self {
        Self {
            fit_to_pipeline: true,
        }
    }

    /// Reject images whose size differs from the pipeline
    pub fn strict() -> Self {
        Self {
            fit_to_pipeline: false,
        }
    }
}

impl Default for FileImageLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageLoader for FileImageLoader {
    fn load(&self, path: &Path, width: u32, height: u32) -> EngineResult<EngineFrame<'static>> {
        info!(path = %path.display(), "Loading background image");

        let img = image::open(path).map_err(|e| {
            EngineError::new(
                LOADER_ERROR_DECODE,
                format!("Failed to load image '{}': {}", path.display(), e),
            )
        })?;

        let mut rgba = img.to_rgba8();
        if rgba.width() != width || rgba.height() != height {
            if !self.fit_to_pipeline {
                return Err(EngineError::new(
                    LOADER_ERROR_SIZE,
                    format!(
                        "Image is {}x{}, pipeline is {}x{}",
                        rgba.width(),
                        rgba.height(),
                        width,
                        height
                    ),
                ));
            }
            debug!(
                from_width = rgba.width(),
                from_height = rgba.height(),
                width,
                height,
                "Scaling background image to pipeline size"
            );
            rgba = image::imageops::resize(&rgba, width, height, FilterType::Triangle);
        }

        let mut data = rgba.into_raw();
        swap_red_blue(&mut data);

        Ok(EngineFrame::from_vec(
            data,
            width,
            height,
            bgra_stride(width) as u32,
            PixelFormat::Bgra32,
        ))
    }
}
