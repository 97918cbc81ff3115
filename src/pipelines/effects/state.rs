// SPDX-License-Identifier: GPL-3.0-only

//! Effect state and the controller that keeps the engine in sync with it
//!
//! `enable` and `disable` are the only mutators. Both are idempotent: a
//! request for the state an effect is already in does nothing, keeping the
//! previously stored parameter.

use crate::backends::engine::{EffectEngine, ImageLoader};
use crate::constants::{BYTES_PER_PIXEL, PARAMETER_UNSET, bgra_size};
use crate::errors::{PipelineError, PipelineResult};
use crate::frame::FrameView;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Effect kinds managed by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectKind {
    Blur,
    Beautification,
    Background,
}

impl EffectKind {
    pub const ALL: [EffectKind; 3] = [
        EffectKind::Blur,
        EffectKind::Beautification,
        EffectKind::Background,
    ];
}

/// Order in which effects are switched off at teardown
pub const TEARDOWN_ORDER: [EffectKind; 3] = [
    EffectKind::Blur,
    EffectKind::Background,
    EffectKind::Beautification,
];

impl std::fmt::Display for EffectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EffectKind::Blur => write!(f, "blur"),
            EffectKind::Beautification => write!(f, "beautification"),
            EffectKind::Background => write!(f, "background"),
        }
    }
}

/// Background replacement content
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BackgroundMode {
    #[default]
    None,
    /// Image file decoded by the image loader
    Image(PathBuf),
    /// Packed 0xAARRGGBB color
    SolidColor(u32),
}

/// A request to switch an effect on
#[derive(Debug, Clone, PartialEq)]
pub enum EffectRequest {
    Blur { power: f32 },
    Beautification { level: f32 },
    BackgroundImage(PathBuf),
    BackgroundColor(u32),
}

impl EffectRequest {
    pub fn kind(&self) -> EffectKind {
        match self {
            EffectRequest::Blur { .. } => EffectKind::Blur,
            EffectRequest::Beautification { .. } => EffectKind::Beautification,
            EffectRequest::BackgroundImage(_) | EffectRequest::BackgroundColor(_) => {
                EffectKind::Background
            }
        }
    }
}

/// Enabled flags and parameters of every effect
///
/// Parameters are only meaningful while their effect is enabled; a disabled
/// effect carries [`PARAMETER_UNSET`] or [`BackgroundMode::None`].
#[derive(Debug, Clone, PartialEq)]
pub struct EffectState {
    blur_enabled: bool,
    blur_power: f32,
    beautification_enabled: bool,
    beautification_level: f32,
    background_enabled: bool,
    background: BackgroundMode,
}

impl Default for EffectState {
    fn default() -> Self {
        Self {
            blur_enabled: false,
            blur_power: PARAMETER_UNSET,
            beautification_enabled: false,
            beautification_level: PARAMETER_UNSET,
            background_enabled: false,
            background: BackgroundMode::None,
        }
    }
}

impl EffectState {
    pub fn is_enabled(&self, kind: EffectKind) -> bool {
        match kind {
            EffectKind::Blur => self.blur_enabled,
            EffectKind::Beautification => self.beautification_enabled,
            EffectKind::Background => self.background_enabled,
        }
    }

    /// True iff at least one effect is enabled
    pub fn any_active(&self) -> bool {
        self.blur_enabled || self.beautification_enabled || self.background_enabled
    }

    pub fn blur_power(&self) -> f32 {
        self.blur_power
    }

    pub fn beautification_level(&self) -> f32 {
        self.beautification_level
    }

    pub fn background(&self) -> &BackgroundMode {
        &self.background
    }

    /// Kinds that are currently enabled
    pub fn active_kinds(&self) -> Vec<EffectKind> {
        EffectKind::ALL
            .into_iter()
            .filter(|kind| self.is_enabled(*kind))
            .collect()
    }
}

/// Tile a packed color across a `width` x `height` BGRA32 buffer
///
/// The packed value is split in little-endian order, so `0xAARRGGBB` yields
/// the byte sequence B, G, R, A for every pixel.
pub fn synthesize_solid_color(color: u32, width: u32, height: u32) -> Vec<u8> {
    let swatch = color.to_le_bytes();
    let mut data = vec![0u8; bgra_size(width, height)];
    for px in bytemuck::cast_slice_mut::<u8, [u8; BYTES_PER_PIXEL]>(&mut data) {
        *px = swatch;
    }
    data
}

/// Owns effect state and issues the matching engine calls
#[derive(Debug)]
pub struct EffectStateController {
    state: EffectState,
    width: u32,
    height: u32,
}

impl EffectStateController {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            state: EffectState::default(),
            width,
            height,
        }
    }

    pub fn state(&self) -> &EffectState {
        &self.state
    }

    pub fn any_active(&self) -> bool {
        self.state.any_active()
    }

    /// Switch an effect on
    ///
    /// Returns `Ok(false)` when the effect was already enabled. Background
    /// content is prepared before the engine is asked to enable replacement,
    /// and a rejection leaves the background disabled.
    pub fn enable(
        &mut self,
        engine: &mut dyn EffectEngine,
        loader: &dyn ImageLoader,
        request: EffectRequest,
    ) -> PipelineResult<bool> {
        let kind = request.kind();
        if self.state.is_enabled(kind) {
            debug!(%kind, "Effect already enabled, ignoring");
            return Ok(false);
        }

        match request {
            EffectRequest::Blur { power } => {
                engine.enable_blur(power);
                self.state.blur_power = power;
                self.state.blur_enabled = true;
                info!(power, "Blur enabled");
            }
            EffectRequest::Beautification { level } => {
                engine.set_beautification_level(level);
                engine.enable_beautification();
                self.state.beautification_level = level;
                self.state.beautification_enabled = true;
                info!(level, "Beautification enabled");
            }
            EffectRequest::BackgroundImage(path) => {
                let content = loader
                    .load(&path, self.width, self.height)
                    .map_err(|e| PipelineError::BackgroundLoadFailure(e.to_string()))?;
                Self::enable_background(engine)?;
                engine.set_background(content);
                info!(path = %path.display(), "Background image enabled");
                self.state.background = BackgroundMode::Image(path);
                self.state.background_enabled = true;
            }
            EffectRequest::BackgroundColor(color) => {
                let data = synthesize_solid_color(color, self.width, self.height);
                let view = FrameView::bgra(&data, self.width, self.height);
                let content = engine.ingest_copy(view).map_err(|e| {
                    PipelineError::BackgroundLoadFailure(format!(
                        "Engine could not ingest color background: {}",
                        e
                    ))
                })?;
                Self::enable_background(engine)?;
                engine.set_background(content);
                info!(color = %format!("{:#010x}", color), "Background color enabled");
                self.state.background = BackgroundMode::SolidColor(color);
                self.state.background_enabled = true;
            }
        }

        Ok(true)
    }

    fn enable_background(engine: &mut dyn EffectEngine) -> PipelineResult<()> {
        engine.enable_replace_background().map_err(|e| {
            warn!(code = e.code, error = %e.message, "Engine rejected background replacement");
            PipelineError::BackgroundEnableFailure {
                code: e.code,
                message: e.message,
            }
        })
    }

    /// Switch an effect off; returns false when it was already disabled
    pub fn disable(&mut self, engine: &mut dyn EffectEngine, kind: EffectKind) -> bool {
        if !self.state.is_enabled(kind) {
            debug!(%kind, "Effect already disabled, ignoring");
            return false;
        }

        match kind {
            EffectKind::Blur => {
                engine.disable_blur();
                self.state.blur_power = PARAMETER_UNSET;
                self.state.blur_enabled = false;
            }
            EffectKind::Beautification => {
                engine.disable_beautification();
                self.state.beautification_level = PARAMETER_UNSET;
                self.state.beautification_enabled = false;
            }
            EffectKind::Background => {
                engine.disable_replace_background();
                self.state.background = BackgroundMode::None;
                self.state.background_enabled = false;
            }
        }

        info!(%kind, "Effect disabled");
        true
    }

    /// Disable every enabled effect, returning how many were switched off
    ///
    /// Effects go down in [`TEARDOWN_ORDER`], background before
    /// beautification.
    pub fn disable_all(&mut self, engine: &mut dyn EffectEngine) -> usize {
        TEARDOWN_ORDER
            .into_iter()
            .filter(|kind| self.disable(engine, *kind))
            .count()
    }
}
