// SPDX-License-Identifier: GPL-3.0-only

//! Persistent output surfaces
//!
//! Two fixed-size BGRA32 buffers are allocated once and reused for every
//! frame. A frame is written into the back buffer under that buffer's write
//! lock, then published by swapping the front index.
//!
//! ```text
//!   process(N)   ──write──▶ [ back ]   publish ──▶ front = back
//!   view of N-1  ──read───▶ [ front ]  (untouched while N is written)
//! ```
//!
//! A view pins the buffer it was created for. It stays valid until that
//! buffer is reused two frames later. A writer that laps a reader still
//! holding [`SurfacePixels`] never waits for it: the write is refused with
//! `OutputAdaptFailure` and that frame is skipped, so a slow consumer can
//! not stall the pipeline or tear the frame it is reading.

use crate::backends::surface::{SharedHandle, SurfaceAllocator, SurfaceMemory, SurfaceSpec};
use crate::constants::OUTPUT_BUFFER_COUNT;
use crate::errors::{PipelineError, PipelineResult};
use crate::frame::{FrameView, PixelFormat};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError};
use tracing::{debug, trace};

/// One persistent output buffer
struct OutputSurface {
    memory: RwLock<Box<dyn SurfaceMemory>>,
    spec: SurfaceSpec,
    /// Sequence number of the frame currently held (0 = never written)
    sequence: AtomicU64,
}

impl OutputSurface {
    fn read(&self) -> RwLockReadGuard<'_, Box<dyn SurfaceMemory>> {
        self.memory.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write lock, or `None` while a reader still holds the pixels
    fn try_write(&self) -> Option<RwLockWriteGuard<'_, Box<dyn SurfaceMemory>>> {
        match self.memory.try_write() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }
}

/// Owns the output buffers for the pipeline's lifetime
pub struct OutputSurfaceManager {
    buffers: [Arc<OutputSurface>; OUTPUT_BUFFER_COUNT],
    front: AtomicUsize,
    next_sequence: AtomicU64,
    spec: SurfaceSpec,
}

impl OutputSurfaceManager {
    /// Allocate every buffer up front; no resize exists
    pub fn allocate(
        allocator: &dyn SurfaceAllocator,
        width: u32,
        height: u32,
    ) -> PipelineResult<Self> {
        let spec = SurfaceSpec::bgra(width, height)?;
        let allocate_one = || -> PipelineResult<Arc<OutputSurface>> {
            let memory = allocator.allocate(&spec)?;
            if memory.as_bytes().len() < spec.size() {
                return Err(PipelineError::InitializationFailure(format!(
                    "{} allocator returned {} bytes, need {}",
                    allocator.name(),
                    memory.as_bytes().len(),
                    spec.size()
                )));
            }
            Ok(Arc::new(OutputSurface {
                memory: RwLock::new(memory),
                spec,
                sequence: AtomicU64::new(0),
            }))
        };
        let buffers = [allocate_one()?, allocate_one()?];

        debug!(
            allocator = allocator.name(),
            width,
            height,
            stride = spec.stride,
            "Output surfaces allocated"
        );

        Ok(Self {
            buffers,
            front: AtomicUsize::new(0),
            next_sequence: AtomicU64::new(1),
            spec,
        })
    }

    /// Exclusive access to the back buffer
    ///
    /// Dropping the guard releases it without publishing; call
    /// [`SurfaceWriteGuard::publish`] once the frame is complete. Fails
    /// without blocking if a consumer is still reading the back buffer.
    pub fn acquire_for_write(&self) -> PipelineResult<SurfaceWriteGuard<'_>> {
        let back = (self.front.load(Ordering::Acquire) + 1) % OUTPUT_BUFFER_COUNT;
        let surface = &self.buffers[back];
        trace!(back, "Acquiring output surface for write");
        let memory = surface.try_write().ok_or_else(|| {
            debug!(back, "Back buffer is still being read, skipping frame");
            PipelineError::OutputAdaptFailure(format!(
                "output buffer {} is still being read",
                back
            ))
        })?;
        Ok(SurfaceWriteGuard {
            manager: self,
            index: back,
            memory,
        })
    }

    /// Read view of the most recently published frame
    pub fn view_for_read(&self) -> OutputSurfaceView {
        let front = self.front.load(Ordering::Acquire);
        OutputSurfaceView::new(Arc::clone(&self.buffers[front]))
    }
}

/// Scoped write lock on the back buffer
pub struct SurfaceWriteGuard<'a> {
    manager: &'a OutputSurfaceManager,
    index: usize,
    memory: RwLockWriteGuard<'a, Box<dyn SurfaceMemory>>,
}

impl SurfaceWriteGuard<'_> {
    /// Copy `source` row by row, honoring both strides
    pub fn copy_rows_from(&mut self, source: &FrameView<'_>) -> PipelineResult<()> {
        let spec = self.manager.spec;
        if source.width() != spec.width || source.height() != spec.height {
            return Err(PipelineError::OutputAdaptFailure(format!(
                "frame is {}x{}, surface is {}x{}",
                source.width(),
                source.height(),
                spec.width,
                spec.height
            )));
        }

        let dst = self.memory.as_bytes_mut();
        let dst_stride = spec.stride as usize;
        for y in 0..spec.height {
            let row = source.row(y).ok_or_else(|| {
                PipelineError::OutputAdaptFailure(format!("row {} is out of bounds", y))
            })?;
            let start = y as usize * dst_stride;
            dst[start..start + row.len()].copy_from_slice(row);
        }
        Ok(())
    }

    /// Release the lock and make this buffer the front buffer
    pub fn publish(self) -> OutputSurfaceView {
        let manager = self.manager;
        let index = self.index;
        let sequence = manager.next_sequence.fetch_add(1, Ordering::Relaxed);
        manager.buffers[index]
            .sequence
            .store(sequence, Ordering::Release);
        drop(self.memory);

        manager.front.store(index, Ordering::Release);
        trace!(index, sequence, "Output surface published");
        OutputSurfaceView::new(Arc::clone(&manager.buffers[index]))
    }
}

/// Read-only handle to one output buffer
///
/// Aliases persistent memory: it never owns a copy of the frame.
#[derive(Clone)]
pub struct OutputSurfaceView {
    surface: Arc<OutputSurface>,
    sequence: u64,
}

impl OutputSurfaceView {
    fn new(surface: Arc<OutputSurface>) -> Self {
        let sequence = surface.sequence.load(Ordering::Acquire);
        Self { surface, sequence }
    }

    pub fn width(&self) -> u32 {
        self.surface.spec.width
    }

    pub fn height(&self) -> u32 {
        self.surface.spec.height
    }

    /// Row stride in bytes
    pub fn stride(&self) -> u32 {
        self.surface.spec.stride
    }

    pub fn format(&self) -> PixelFormat {
        self.surface.spec.format
    }

    /// Sequence number of the frame this view was created for
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// False once the buffer has been overwritten by a later frame
    pub fn is_current(&self) -> bool {
        self.surface.sequence.load(Ordering::Acquire) == self.sequence
    }

    /// Handle for GPU or cross-process import
    pub fn shared_handle(&self) -> SharedHandle {
        self.surface.read().shared_handle()
    }

    /// Lock the pixels for reading
    pub fn pixels(&self) -> SurfacePixels<'_> {
        SurfacePixels {
            guard: self.surface.read(),
            len: self.surface.spec.size(),
        }
    }

    /// Copy the pixels out (tightly packed, stride == width * 4)
    pub fn to_vec(&self) -> Vec<u8> {
        self.pixels().to_vec()
    }
}

impl std::fmt::Debug for OutputSurfaceView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputSurfaceView")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("stride", &self.stride())
            .field("sequence", &self.sequence)
            .finish()
    }
}

/// Shared lock on an output buffer's pixels
pub struct SurfacePixels<'a> {
    guard: RwLockReadGuard<'a, Box<dyn SurfaceMemory>>,
    len: usize,
}

impl std::ops::Deref for SurfacePixels<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.guard.as_bytes()[..self.len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::surface::HeapAllocator;
    use crate::frame::OwnedFrame;
    use crate::testing::CountingAllocator;

    #[test]
    fn test_allocates_two_buffers_once() {
        let (allocator, counter) = CountingAllocator::new();
        let manager = OutputSurfaceManager::allocate(&allocator, 4, 4).unwrap();
        assert_eq!(counter.total(), OUTPUT_BUFFER_COUNT);

        for _ in 0..5 {
            let frame = OwnedFrame::solid_bgra(4, 4, [1, 2, 3, 4]);
            let mut guard = manager.acquire_for_write().unwrap();
            guard.copy_rows_from(&frame.as_view()).unwrap();
            guard.publish();
        }
        assert_eq!(counter.total(), OUTPUT_BUFFER_COUNT);

        drop(manager);
        assert_eq!(counter.live(), 0);
    }

    #[test]
    fn test_allocation_failure_releases_partial_buffers() {
        let (allocator, counter) = CountingAllocator::new();
        let allocator = allocator.with_budget(1);
        let result = OutputSurfaceManager::allocate(&allocator, 4, 4);
        assert!(matches!(
            result,
            Err(PipelineError::InitializationFailure(_))
        ));
        assert_eq!(counter.live(), 0);
    }

    #[test]
    fn test_copy_normalizes_source_stride() {
        let manager = OutputSurfaceManager::allocate(&HeapAllocator, 2, 2).unwrap();

        // Source rows padded to 12 bytes with junk
        let mut data = vec![0xEEu8; 24];
        data[0..8].copy_from_slice(&[1, 1, 1, 1, 2, 2, 2, 2]);
        data[12..20].copy_from_slice(&[3, 3, 3, 3, 4, 4, 4, 4]);
        let source = FrameView::new(&data, 2, 2, 12, PixelFormat::Bgra32);

        let mut guard = manager.acquire_for_write().unwrap();
        guard.copy_rows_from(&source).unwrap();
        let view = guard.publish();

        assert_eq!(view.stride(), 8);
        assert_eq!(
            view.to_vec(),
            vec![1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4]
        );
    }

    #[test]
    fn test_copy_rejects_wrong_dimensions() {
        let manager = OutputSurfaceManager::allocate(&HeapAllocator, 4, 4).unwrap();
        let frame = OwnedFrame::solid_bgra(2, 2, [0; 4]);
        let mut guard = manager.acquire_for_write().unwrap();
        let err = guard.copy_rows_from(&frame.as_view()).unwrap_err();
        assert!(matches!(err, PipelineError::OutputAdaptFailure(_)));
    }

    #[test]
    fn test_unpublished_write_keeps_front() {
        let manager = OutputSurfaceManager::allocate(&HeapAllocator, 2, 1).unwrap();
        let first = OwnedFrame::solid_bgra(2, 1, [7; 4]);
        let mut guard = manager.acquire_for_write().unwrap();
        guard.copy_rows_from(&first.as_view()).unwrap();
        let published = guard.publish();

        // Write without publishing
        let second = OwnedFrame::solid_bgra(2, 1, [9; 4]);
        let mut guard = manager.acquire_for_write().unwrap();
        guard.copy_rows_from(&second.as_view()).unwrap();
        drop(guard);

        let front = manager.view_for_read();
        assert_eq!(front.sequence(), published.sequence());
        assert_eq!(front.to_vec(), vec![7; 8]);
    }

    #[test]
    fn test_views_are_stable_snapshots() {
        let manager = OutputSurfaceManager::allocate(&HeapAllocator, 2, 1).unwrap();

        let write = |value: u8| {
            let frame = OwnedFrame::solid_bgra(2, 1, [value; 4]);
            let mut guard = manager.acquire_for_write().unwrap();
            guard.copy_rows_from(&frame.as_view()).unwrap();
            guard.publish()
        };

        let a = write(1);
        let b = write(2);
        // a is untouched by b
        assert!(a.is_current());
        assert_eq!(a.to_vec(), vec![1; 8]);
        assert_eq!(b.to_vec(), vec![2; 8]);
        assert_ne!(a.shared_handle(), b.shared_handle());

        // The third frame reuses a's buffer
        let c = write(3);
        assert!(!a.is_current());
        assert!(b.is_current());
        assert_eq!(c.shared_handle(), a.shared_handle());
        assert!(c.sequence() > b.sequence());
    }

    #[test]
    fn test_lapping_writer_is_refused_while_pixels_are_held() {
        let manager = OutputSurfaceManager::allocate(&HeapAllocator, 2, 1).unwrap();
        let publish = |value: u8| -> PipelineResult<OutputSurfaceView> {
            let frame = OwnedFrame::solid_bgra(2, 1, [value; 4]);
            let mut guard = manager.acquire_for_write()?;
            guard.copy_rows_from(&frame.as_view())?;
            Ok(guard.publish())
        };

        let a = publish(1).unwrap();
        let pixels = a.pixels();
        let b = publish(2).unwrap();

        // The next back buffer is a's, which is still locked for reading
        let err = publish(3).unwrap_err();
        assert!(matches!(err, PipelineError::OutputAdaptFailure(_)));
        assert!(err.is_recoverable());
        assert_eq!(&*pixels, &[1; 8]);
        assert!(b.is_current());
        assert_eq!(manager.view_for_read().sequence(), b.sequence());

        drop(pixels);
        let c = publish(3).unwrap();
        assert_eq!(c.shared_handle(), a.shared_handle());
        assert!(!a.is_current());
    }

    #[test]
    fn test_reader_of_front_buffer_does_not_block_writer() {
        let manager = OutputSurfaceManager::allocate(&HeapAllocator, 2, 1).unwrap();
        let frame = OwnedFrame::solid_bgra(2, 1, [4; 4]);
        let mut guard = manager.acquire_for_write().unwrap();
        guard.copy_rows_from(&frame.as_view()).unwrap();
        let front = guard.publish();

        let pixels = front.pixels();
        assert!(manager.acquire_for_write().is_ok());
        assert_eq!(&*pixels, &[4; 8]);
    }
}
