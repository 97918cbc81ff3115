// SPDX-License-Identifier: GPL-3.0-only

//! Effects pipeline
//!
//! Wraps each camera frame for the effect engine, runs the engine's
//! transform with whatever effects are enabled, and republishes the result
//! into persistent output surfaces.
//!
//! ```text
//! FrameView ──ingest──▶ engine.transform ──adapt──▶ row copy ──▶ OutputSurfaceView
//!                             ▲
//!            EffectStateController (enable / disable between frames)
//! ```
//!
//! Effect changes and frame processing share one mutex, so an effect can
//! never be toggled in the middle of a transform. `process` blocks for as
//! long as the engine does; run it on a dedicated worker
//! ([`crate::pipelines::worker::ProcessingWorker`]) rather than the capture thread.

mod output;
mod state;

pub use output::{OutputSurfaceManager, OutputSurfaceView, SurfacePixels, SurfaceWriteGuard};
pub use state::{
    BackgroundMode, EffectKind, EffectRequest, EffectState, EffectStateController,
    synthesize_solid_color,
};

use crate::backends::engine::{
    EffectEngine, EngineFrame, FileImageLoader, ImageLoader, SoftwareEngine,
};
use crate::backends::surface::{HeapAllocator, SurfaceAllocator};
use crate::config::Config;
use crate::constants::checked_bgra_size;
use crate::errors::{PipelineError, PipelineResult};
use crate::frame::{FrameView, PixelFormat};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// State guarded by the pipeline mutex
struct PipelineInner {
    engine: Box<dyn EffectEngine>,
    loader: Box<dyn ImageLoader>,
    controller: EffectStateController,
    frames_processed: u64,
    frames_failed: u64,
    torn_down: bool,
}

/// Counters for processed frames
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames_processed: u64,
    pub frames_failed: u64,
}

/// A pipeline for one fixed frame size
///
/// Created once per (width, height); a size change means building a new
/// pipeline. [`EffectsPipeline::destroy`] (or dropping it) disables every
/// active effect before the engine and surfaces are released.
pub struct EffectsPipeline {
    width: u32,
    height: u32,
    inner: Mutex<PipelineInner>,
    output: OutputSurfaceManager,
}

impl EffectsPipeline {
    /// Build a pipeline with the software engine and heap surfaces
    pub fn new(width: u32, height: u32) -> PipelineResult<Self> {
        Self::with_collaborators(
            width,
            height,
            Box::new(SoftwareEngine::new()),
            Box::new(FileImageLoader::new()),
            &HeapAllocator,
        )
    }

    /// Build a pipeline from configuration, using the software engine
    pub fn from_config(config: &Config) -> PipelineResult<Self> {
        config.validate()?;
        let allocator = config.surface_backend.allocator();
        let loader = if config.fit_background {
            FileImageLoader::new()
        } else {
            FileImageLoader::strict()
        };
        Self::with_collaborators(
            config.width,
            config.height,
            Box::new(SoftwareEngine::new()),
            Box::new(loader),
            allocator.as_ref(),
        )
    }

    /// Build a pipeline around explicit collaborators
    ///
    /// Fails without returning a partial pipeline if any surface cannot be
    /// allocated.
    pub fn with_collaborators(
        width: u32,
        height: u32,
        engine: Box<dyn EffectEngine>,
        loader: Box<dyn ImageLoader>,
        allocator: &dyn SurfaceAllocator,
    ) -> PipelineResult<Self> {
        if width == 0 || height == 0 || checked_bgra_size(width, height).is_none() {
            return Err(PipelineError::InitializationFailure(format!(
                "Invalid pipeline size {}x{}",
                width, height
            )));
        }

        let output = OutputSurfaceManager::allocate(allocator, width, height)?;

        info!(
            width,
            height,
            allocator = allocator.name(),
            "Effects pipeline created"
        );

        Ok(Self {
            width,
            height,
            inner: Mutex::new(PipelineInner {
                engine,
                loader,
                controller: EffectStateController::new(width, height),
                frames_processed: 0,
                frames_failed: 0,
                torn_down: false,
            }),
            output,
        })
    }

    fn lock_inner(&self) -> MutexGuard<'_, PipelineInner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            warn!("Pipeline mutex poisoned, recovering");
            PoisonError::into_inner(poisoned)
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Switch an effect on; `Ok(false)` if it was already on
    pub fn enable(&self, request: EffectRequest) -> PipelineResult<bool> {
        let mut inner = self.lock_inner();
        let PipelineInner {
            engine,
            loader,
            controller,
            ..
        } = &mut *inner;
        controller.enable(engine.as_mut(), loader.as_ref(), request)
    }

    /// Switch an effect off; false if it was already off
    pub fn disable(&self, kind: EffectKind) -> bool {
        let mut inner = self.lock_inner();
        let PipelineInner {
            engine, controller, ..
        } = &mut *inner;
        controller.disable(engine.as_mut(), kind)
    }

    pub fn set_blur(&self, power: f32) -> PipelineResult<bool> {
        self.enable(EffectRequest::Blur { power })
    }

    pub fn clear_blur(&self) -> bool {
        self.disable(EffectKind::Blur)
    }

    pub fn set_beautification(&self, level: f32) -> PipelineResult<bool> {
        self.enable(EffectRequest::Beautification { level })
    }

    pub fn clear_beautification(&self) -> bool {
        self.disable(EffectKind::Beautification)
    }

    pub fn set_background_image(&self, path: impl Into<PathBuf>) -> PipelineResult<bool> {
        self.enable(EffectRequest::BackgroundImage(path.into()))
    }

    /// Replace the background with a packed 0xAARRGGBB color
    pub fn set_background_color(&self, packed_color: u32) -> PipelineResult<bool> {
        self.enable(EffectRequest::BackgroundColor(packed_color))
    }

    pub fn clear_background(&self) -> bool {
        self.disable(EffectKind::Background)
    }

    /// True iff at least one effect is enabled
    ///
    /// Callers may use this to skip `process` entirely; `process` itself
    /// always runs the engine.
    pub fn any_effect_active(&self) -> bool {
        self.lock_inner().controller.any_active()
    }

    /// Snapshot of the current effect state
    pub fn effect_state(&self) -> EffectState {
        self.lock_inner().controller.state().clone()
    }

    pub fn stats(&self) -> PipelineStats {
        let inner = self.lock_inner();
        PipelineStats {
            frames_processed: inner.frames_processed,
            frames_failed: inner.frames_failed,
        }
    }

    /// Most recently published output
    pub fn latest_output(&self) -> OutputSurfaceView {
        self.output.view_for_read()
    }

    /// Run one frame through the enabled effects
    ///
    /// A failure only affects this frame; the previous output stays
    /// published and the pipeline remains usable.
    pub fn process(&self, input: FrameView<'_>) -> PipelineResult<OutputSurfaceView> {
        let mut inner = self.lock_inner();
        let result = self.process_locked(&mut inner, input);
        match &result {
            Ok(view) => {
                inner.frames_processed += 1;
                debug!(sequence = view.sequence(), "Frame processed");
            }
            Err(e) => {
                inner.frames_failed += 1;
                warn!(error = %e, "Frame processing failed");
            }
        }
        result
    }

    fn process_locked(
        &self,
        inner: &mut PipelineInner,
        input: FrameView<'_>,
    ) -> PipelineResult<OutputSurfaceView> {
        self.check_input(&input)?;

        let ingested = inner
            .engine
            .ingest(input)
            .map_err(|e| PipelineError::FrameIngestFailure(e.to_string()))?;

        let transformed =
            inner
                .engine
                .transform(ingested)
                .map_err(|e| PipelineError::TransformFailure {
                    code: e.code,
                    message: e.message,
                })?;

        let pixels = self.adapt_output(&transformed)?;

        let mut guard = self.output.acquire_for_write()?;
        guard.copy_rows_from(&pixels)?;
        Ok(guard.publish())
    }

    fn check_input(&self, input: &FrameView<'_>) -> PipelineResult<()> {
        if input.format() != PixelFormat::Bgra32 {
            return Err(PipelineError::FrameIngestFailure(format!(
                "Expected BGRA32 input, got {}",
                input.format()
            )));
        }
        if input.width() != self.width || input.height() != self.height {
            return Err(PipelineError::FrameIngestFailure(format!(
                "Input is {}x{}, pipeline is {}x{}",
                input.width(),
                input.height(),
                self.width,
                self.height
            )));
        }
        input.validate().map_err(PipelineError::FrameIngestFailure)
    }

    /// Pixel view of the engine's output, if it matches the surface layout
    fn adapt_output<'f>(&self, frame: &'f EngineFrame<'_>) -> PipelineResult<FrameView<'f>> {
        if frame.format != PixelFormat::Bgra32 {
            return Err(PipelineError::OutputAdaptFailure(format!(
                "Engine returned {} instead of BGRA32",
                frame.format
            )));
        }
        if frame.width != self.width || frame.height != self.height {
            return Err(PipelineError::OutputAdaptFailure(format!(
                "Engine returned {}x{}, pipeline is {}x{}",
                frame.width, frame.height, self.width, self.height
            )));
        }
        let view = frame.pixels().ok_or_else(|| {
            PipelineError::OutputAdaptFailure("Engine output buffer is truncated".into())
        })?;
        view.validate().map_err(PipelineError::OutputAdaptFailure)?;
        Ok(view)
    }

    /// Disable all effects, then release the engine and surfaces
    pub fn destroy(self) {
        // Teardown runs in Drop
    }

    fn teardown(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if inner.torn_down {
            return;
        }
        inner.torn_down = true;

        let active = inner.controller.state().active_kinds();
        let disabled = inner.controller.disable_all(inner.engine.as_mut());
        info!(
            ?active,
            disabled,
            frames_processed = inner.frames_processed,
            frames_failed = inner.frames_failed,
            "Effects pipeline destroyed"
        );
    }
}

impl Drop for EffectsPipeline {
    fn drop(&mut self) {
        self.teardown();
    }
}
