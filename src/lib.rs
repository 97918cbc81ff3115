// SPDX-License-Identifier: MPL-2.0

//! Camera Effects - real-time video effects for camera frames
//!
//! Applies background blur, beautification and background replacement to
//! BGRA32 frames through an effect engine, publishing results into
//! persistent output surfaces.
//!
//! # Architecture
//!
//! - [`frame`]: Borrowed and owned frame buffers
//! - [`backends`]: Effect engine and surface allocator interfaces
//! - [`pipelines`]: The effects pipeline and its processing worker
//! - [`config`]: User configuration handling
//!
//! # Example
//!
//! ```no_run
//! use camera_effects::{EffectsPipeline, FrameView};
//!
//! let pipeline = EffectsPipeline::new(640, 480)?;
//! pipeline.set_blur(0.6)?;
//!
//! let pixels = vec![0u8; 640 * 480 * 4];
//! let output = pipeline.process(FrameView::bgra(&pixels, 640, 480))?;
//! assert_eq!(output.stride(), 640 * 4);
//! # Ok::<(), camera_effects::PipelineError>(())
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod frame;
pub mod pipelines;
pub mod testing;

// Re-export commonly used types
pub use config::{Config, SurfaceBackend};
pub use errors::{EngineError, PipelineError, PipelineResult};
pub use frame::{FrameView, OwnedFrame, PixelFormat};
pub use pipelines::effects::{
    BackgroundMode, EffectKind, EffectRequest, EffectState, EffectsPipeline, OutputSurfaceView,
};
pub use pipelines::worker::{LoopAction, ProcessingWorker};
