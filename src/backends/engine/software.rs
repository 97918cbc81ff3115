// SPDX-License-Identifier: MPL-2.0

//! CPU effect engine (fallback when no vendor engine is available)
//!
//! Implements blur and beautification on BGRA32 frames. Background
//! replacement needs a segmentation model, which this engine does not
//! have, so enabling it is rejected with an engine error.

use super::{EffectEngine, EngineFrame};
use crate::constants::{BYTES_PER_PIXEL, software};
use crate::errors::{EngineError, EngineResult};
use crate::frame::{FrameView, PixelFormat};
use tracing::{debug, warn};

/// Software implementation of [`EffectEngine`]
#[derive(Debug, Default)]
pub struct SoftwareEngine {
    blur_power: Option<f32>,
    beautification_level: f32,
    beautification_enabled: bool,
}

impl SoftwareEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_passthrough(&self) -> bool {
        self.blur_power.is_none() && !self.beautification_enabled
    }
}

impl EffectEngine for SoftwareEngine {
    fn ingest<'a>(&self, view: FrameView<'a>) -> EngineResult<EngineFrame<'a>> {
        if view.format() != PixelFormat::Bgra32 {
            return Err(EngineError::new(
                software::ERROR_INVALID_FRAME,
                format!("Unsupported input format {}", view.format()),
            ));
        }
        view.validate()
            .map_err(|msg| EngineError::new(software::ERROR_INVALID_FRAME, msg))?;
        Ok(EngineFrame::borrowed(view))
    }

    fn transform<'a>(&mut self, frame: EngineFrame<'a>) -> EngineResult<EngineFrame<'a>> {
        // No effects: hand back the input untouched (still borrowed)
        if self.is_passthrough() {
            return Ok(frame);
        }

        let view = frame.pixels().ok_or_else(|| {
            EngineError::new(software::ERROR_INVALID_FRAME, "Frame data is truncated")
        })?;
        let width = frame.width as usize;
        let height = frame.height as usize;
        let row_bytes = width * BYTES_PER_PIXEL;

        // Normalize stride so the filters can work on a flat pixel grid
        let mut data = vec![0u8; row_bytes * height];
        for y in 0..frame.height {
            if let Some(row) = view.row(y) {
                let dst_start = y as usize * row_bytes;
                data[dst_start..dst_start + row_bytes].copy_from_slice(row);
            }
        }

        {
            let pixels = bytemuck::cast_slice_mut::<u8, [u8; 4]>(&mut data);

            if self.beautification_enabled {
                let level = self.beautification_level.clamp(0.0, 1.0);
                smooth_skin(pixels, width, height, level);
            }

            if let Some(power) = self.blur_power {
                let radius = blur_radius(power);
                debug!(radius, "Software blur");
                box_blur(pixels, width, height, radius);
            }
        }

        Ok(EngineFrame::from_vec(
            data,
            frame.width,
            frame.height,
            row_bytes as u32,
            PixelFormat::Bgra32,
        ))
    }

    fn enable_blur(&mut self, power: f32) {
        self.blur_power = Some(power);
    }

    fn disable_blur(&mut self) {
        self.blur_power = None;
    }

    fn set_beautification_level(&mut self, level: f32) {
        self.beautification_level = level;
    }

    fn enable_beautification(&mut self) {
        self.beautification_enabled = true;
    }

    fn disable_beautification(&mut self) {
        self.beautification_enabled = false;
    }

    fn enable_replace_background(&mut self) -> EngineResult<()> {
        Err(EngineError::new(
            software::ERROR_UNSUPPORTED,
            "Background replacement requires a segmentation engine",
        ))
    }

    fn set_background(&mut self, _background: EngineFrame<'static>) {
        warn!("Software engine ignores background content");
    }

    fn disable_replace_background(&mut self) {}
}

/// Blur radius in pixels for a power in [0, 1]
fn blur_radius(power: f32) -> usize {
    (power.clamp(0.0, 1.0) * software::MAX_BLUR_RADIUS as f32).round() as usize
}

/// Separable box blur over B, G and R; alpha is preserved
fn box_blur(pixels: &mut [[u8; 4]], width: usize, height: usize, radius: usize) {
    if radius == 0 || width == 0 || height == 0 {
        return;
    }
    let mut scratch = vec![[0u8; 4]; pixels.len()];
    // Horizontal: lines are rows
    blur_pass(pixels, &mut scratch, height, width, 1, width, radius);
    // Vertical: lines are columns
    blur_pass(&scratch, pixels, width, height, width, 1, radius);
}

/// One box blur pass along `lines` lines of `len` pixels
///
/// `along` is the index step between neighbours on a line and `across` the
/// step between line starts. Edges are clamped.
fn blur_pass(
    src: &[[u8; 4]],
    dst: &mut [[u8; 4]],
    lines: usize,
    len: usize,
    along: usize,
    across: usize,
    radius: usize,
) {
    let window = (2 * radius + 1) as u32;
    let r = radius as isize;
    let last = len as isize - 1;

    for line in 0..lines {
        let at = |i: isize| line * across + i.clamp(0, last) as usize * along;

        let mut sum = [0u32; 3];
        for j in -r..=r {
            let p = src[at(j)];
            for c in 0..3 {
                sum[c] += p[c] as u32;
            }
        }

        for i in 0..len as isize {
            let alpha = src[at(i)][3];
            dst[at(i)] = [
                (sum[0] / window) as u8,
                (sum[1] / window) as u8,
                (sum[2] / window) as u8,
                alpha,
            ];
            let add = src[at(i + r + 1)];
            let sub = src[at(i - r)];
            for c in 0..3 {
                sum[c] = sum[c] + add[c] as u32 - sub[c] as u32;
            }
        }
    }
}

/// Blend each pixel toward a lightly blurred copy by `level`
fn smooth_skin(pixels: &mut [[u8; 4]], width: usize, height: usize, level: f32) {
    if level <= 0.0 {
        return;
    }
    let mut smoothed = pixels.to_vec();
    box_blur(&mut smoothed, width, height, software::BEAUTIFY_RADIUS);

    for (px, soft) in pixels.iter_mut().zip(&smoothed) {
        for c in 0..3 {
            let a = px[c] as f32;
            let b = soft[c] as f32;
            px[c] = (a + (b - a) * level).round().clamp(0.0, 255.0) as u8;
        }
    }
}
