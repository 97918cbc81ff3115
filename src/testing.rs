// SPDX-License-Identifier: GPL-3.0-only

//! Test doubles for the pipeline's collaborators
//!
//! Each double hands out a cloneable log so a test can keep inspecting calls
//! after the double has been moved into a pipeline.

use crate::backends::engine::{EffectEngine, EngineFrame, ImageLoader};
use crate::backends::surface::{SharedHandle, SurfaceAllocator, SurfaceMemory, SurfaceSpec};
use crate::errors::{EngineError, EngineResult, PipelineError, PipelineResult};
use crate::frame::{FrameView, PixelFormat};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// One call received by a [`RecordingEngine`]
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Ingest,
    Transform,
    EnableBlur(f32),
    DisableBlur,
    SetBeautificationLevel(f32),
    EnableBeautification,
    DisableBeautification,
    EnableReplaceBackground,
    SetBackground,
    DisableReplaceBackground,
}

#[derive(Default)]
struct LogInner {
    calls: Vec<EngineCall>,
    last_background: Option<EngineFrame<'static>>,
    dropped: bool,
}

/// Shared view of everything a [`RecordingEngine`] received
#[derive(Clone, Default)]
pub struct EngineLog {
    inner: Arc<Mutex<LogInner>>,
}

impl EngineLog {
    fn lock(&self) -> MutexGuard<'_, LogInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, call: EngineCall) {
        self.lock().calls.push(call);
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.lock().calls.clone()
    }

    /// Number of calls matching `pred`
    pub fn count(&self, pred: impl Fn(&EngineCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn last_background(&self) -> Option<EngineFrame<'static>> {
        self.lock().last_background.clone()
    }

    /// Whether the engine has been released
    pub fn engine_dropped(&self) -> bool {
        self.lock().dropped
    }
}

/// Engine double that records calls and transforms by rule
///
/// By default `transform` is a passthrough. A marker frame replaces every
/// output while any effect is enabled.
pub struct RecordingEngine {
    log: EngineLog,
    background_error: Option<i32>,
    transform_error: Option<i32>,
    marker: Option<EngineFrame<'static>>,
    active: [bool; 3],
}

impl RecordingEngine {
    pub fn new() -> (Self, EngineLog) {
        let log = EngineLog::default();
        let engine = Self {
            log: log.clone(),
            background_error: None,
            transform_error: None,
            marker: None,
            active: [false; 3],
        };
        (engine, log)
    }

    /// Reject `enable_replace_background` with `code`
    pub fn reject_background(&mut self, code: i32) {
        self.background_error = Some(code);
    }

    /// Fail every `transform` with `code`
    pub fn fail_transform(&mut self, code: i32) {
        self.transform_error = Some(code);
    }

    /// Return `marker` from `transform` whenever an effect is active
    pub fn with_marker(mut self, marker: EngineFrame<'static>) -> Self {
        self.marker = Some(marker);
        self
    }
}

impl EffectEngine for RecordingEngine {
    fn ingest<'a>(&self, view: FrameView<'a>) -> EngineResult<EngineFrame<'a>> {
        self.log.push(EngineCall::Ingest);
        view.validate().map_err(|msg| EngineError::new(1, msg))?;
        Ok(EngineFrame::borrowed(view))
    }

    fn transform<'a>(&mut self, frame: EngineFrame<'a>) -> EngineResult<EngineFrame<'a>> {
        self.log.push(EngineCall::Transform);
        if let Some(code) = self.transform_error {
            return Err(EngineError::new(code, "scripted transform failure"));
        }
        match &self.marker {
            Some(marker) if self.active.iter().any(|on| *on) => Ok(marker.clone()),
            _ => Ok(frame),
        }
    }

    fn enable_blur(&mut self, power: f32) {
        self.active[0] = true;
        self.log.push(EngineCall::EnableBlur(power));
    }

    fn disable_blur(&mut self) {
        self.active[0] = false;
        self.log.push(EngineCall::DisableBlur);
    }

    fn set_beautification_level(&mut self, level: f32) {
        self.log.push(EngineCall::SetBeautificationLevel(level));
    }

    fn enable_beautification(&mut self) {
        self.active[1] = true;
        self.log.push(EngineCall::EnableBeautification);
    }

    fn disable_beautification(&mut self) {
        self.active[1] = false;
        self.log.push(EngineCall::DisableBeautification);
    }

    fn enable_replace_background(&mut self) -> EngineResult<()> {
        self.log.push(EngineCall::EnableReplaceBackground);
        if let Some(code) = self.background_error {
            return Err(EngineError::new(code, "scripted background rejection"));
        }
        self.active[2] = true;
        Ok(())
    }

    fn set_background(&mut self, background: EngineFrame<'static>) {
        self.log.push(EngineCall::SetBackground);
        self.log.lock().last_background = Some(background);
    }

    fn disable_replace_background(&mut self) {
        self.active[2] = false;
        self.log.push(EngineCall::DisableReplaceBackground);
    }
}

impl Drop for RecordingEngine {
    fn drop(&mut self) {
        self.log.lock().dropped = true;
    }
}

/// Image loader that returns a fixed frame or a fixed error
pub struct StaticImageLoader {
    frame: Option<EngineFrame<'static>>,
}

impl StaticImageLoader {
    /// Opaque gray frame of the given size
    pub fn solid(width: u32, height: u32) -> Self {
        let data = [0x80, 0x80, 0x80, 0xFF].repeat(width as usize * height as usize);
        Self {
            frame: Some(EngineFrame::from_vec(
                data,
                width,
                height,
                width * 4,
                PixelFormat::Bgra32,
            )),
        }
    }

    /// Every load fails
    pub fn failing() -> Self {
        Self { frame: None }
    }
}

impl ImageLoader for StaticImageLoader {
    fn load(&self, path: &Path, _width: u32, _height: u32) -> EngineResult<EngineFrame<'static>> {
        self.frame
            .clone()
            .ok_or_else(|| EngineError::new(1, format!("cannot load {}", path.display())))
    }
}

/// Live and total allocation counters of a [`CountingAllocator`]
#[derive(Clone, Default)]
pub struct AllocationCounter {
    live: Arc<AtomicUsize>,
    total: Arc<AtomicUsize>,
}

impl AllocationCounter {
    /// Surfaces allocated and not yet released
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Surfaces ever allocated
    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

/// Heap allocator that counts live surfaces, optionally failing after a budget
pub struct CountingAllocator {
    counter: AllocationCounter,
    budget: Option<usize>,
}

impl CountingAllocator {
    pub fn new() -> (Self, AllocationCounter) {
        let counter = AllocationCounter::default();
        let allocator = Self {
            counter: counter.clone(),
            budget: None,
        };
        (allocator, counter)
    }

    /// Fail every allocation after the first `budget`
    pub fn with_budget(mut self, budget: usize) -> Self {
        self.budget = Some(budget);
        self
    }
}

struct CountedSurface {
    data: Box<[u8]>,
    id: Uuid,
    live: Arc<AtomicUsize>,
}

impl SurfaceMemory for CountedSurface {
    fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn shared_handle(&self) -> SharedHandle {
        SharedHandle::Heap { id: self.id }
    }
}

impl Drop for CountedSurface {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SurfaceAllocator for CountingAllocator {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn allocate(&self, spec: &SurfaceSpec) -> PipelineResult<Box<dyn SurfaceMemory>> {
        if let Some(budget) = self.budget
            && self.counter.total() >= budget
        {
            return Err(PipelineError::InitializationFailure(
                "allocation budget exhausted".into(),
            ));
        }
        self.counter.total.fetch_add(1, Ordering::SeqCst);
        self.counter.live.fetch_add(1, Ordering::SeqCst);
        // Non-zero fill so tests notice regions that were never written
        Ok(Box::new(CountedSurface {
            data: vec![0xCD; spec.size()].into_boxed_slice(),
            id: Uuid::new_v4(),
            live: Arc::clone(&self.counter.live),
        }))
    }
}
