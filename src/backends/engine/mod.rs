// SPDX-License-Identifier: GPL-3.0-only

//! Effect engine collaborators
//!
//! The actual effect algorithms (segmentation, blur, beautification) live in
//! an opaque engine. The pipeline only talks to it through [`EffectEngine`]
//! and loads replacement backgrounds through an [`ImageLoader`].
//!
//! ```text
//! FrameView ──ingest──▶ EngineFrame ──transform──▶ EngineFrame ──▶ output surface
//!                            ▲
//!               enable_* / disable_* (effect toggles)
//! ```

mod image_loader;
mod software;

pub use image_loader::FileImageLoader;
pub use software::SoftwareEngine;

use crate::errors::EngineResult;
use crate::frame::{FrameData, FrameView, PixelFormat, required_len};
use std::path::Path;

/// Engine-native frame
///
/// Holds either a borrowed view of the caller's input (zero-copy ingestion)
/// or owned bytes produced by the engine.
#[derive(Debug, Clone)]
pub struct EngineFrame<'a> {
    pub width: u32,
    pub height: u32,
    /// Row stride in bytes (may include padding)
    pub stride: u32,
    pub format: PixelFormat,
    pub data: FrameData<'a>,
}

impl<'a> EngineFrame<'a> {
    /// Wrap a frame view without copying
    pub fn borrowed(view: FrameView<'a>) -> Self {
        Self {
            width: view.width(),
            height: view.height(),
            stride: view.stride(),
            format: view.format(),
            data: FrameData::Borrowed(view.data()),
        }
    }

    /// Pixel view of this frame, if the buffer can hold what it describes
    pub fn pixels(&self) -> Option<FrameView<'_>> {
        if self.data.len() < required_len(self.width, self.height, self.stride) {
            return None;
        }
        Some(FrameView::new(
            &self.data,
            self.width,
            self.height,
            self.stride,
            self.format,
        ))
    }

    /// Detach from caller memory
    pub fn into_owned(self) -> EngineFrame<'static> {
        EngineFrame {
            width: self.width,
            height: self.height,
            stride: self.stride,
            format: self.format,
            data: self.data.into_shared(),
        }
    }
}

impl EngineFrame<'static> {
    /// Build an owned frame from raw bytes
    pub fn from_vec(
        data: Vec<u8>,
        width: u32,
        height: u32,
        stride: u32,
        format: PixelFormat,
    ) -> Self {
        Self {
            width,
            height,
            stride,
            format,
            data: FrameData::from(data),
        }
    }
}

/// Opaque effect-transform engine
///
/// Calls are serialized by the owning pipeline, so implementations need not
/// be internally synchronized. Toggles take effect on the next `transform`.
pub trait EffectEngine: Send {
    /// Adapt caller pixels into an engine frame, without copying when possible
    fn ingest<'a>(&self, view: FrameView<'a>) -> EngineResult<EngineFrame<'a>>;

    /// Adapt caller pixels into an engine frame that owns its bytes
    fn ingest_copy(&self, view: FrameView<'_>) -> EngineResult<EngineFrame<'static>> {
        self.ingest(view).map(EngineFrame::into_owned)
    }

    /// Apply every enabled effect. With nothing enabled this is a passthrough.
    fn transform<'a>(&mut self, frame: EngineFrame<'a>) -> EngineResult<EngineFrame<'a>>;

    fn enable_blur(&mut self, power: f32);
    fn disable_blur(&mut self);

    fn set_beautification_level(&mut self, level: f32);
    fn enable_beautification(&mut self);
    fn disable_beautification(&mut self);

    /// Switch on background replacement; content is supplied by `set_background`
    fn enable_replace_background(&mut self) -> EngineResult<()>;
    fn set_background(&mut self, background: EngineFrame<'static>);
    fn disable_replace_background(&mut self);
}

/// Decodes background images into engine frames
pub trait ImageLoader: Send {
    /// Load `path` for a pipeline of `width` x `height`
    fn load(&self, path: &Path, width: u32, height: u32) -> EngineResult<EngineFrame<'static>>;
}
