// SPDX-License-Identifier: GPL-3.0-only

//! Platform surface allocation
//!
//! Output surfaces are fixed-size BGRA32 buffers that consumers can import
//! (GPU upload, another process). The pipeline asks a [`SurfaceAllocator`]
//! for them once at construction and never resizes them.

#[cfg(target_os = "linux")]
mod memfd;

#[cfg(target_os = "linux")]
pub use memfd::MemfdAllocator;

use crate::constants::{checked_bgra_size, checked_bgra_stride};
use crate::errors::{PipelineError, PipelineResult};
use crate::frame::PixelFormat;
use uuid::Uuid;

/// Geometry of a surface to allocate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceSpec {
    pub width: u32,
    pub height: u32,
    /// Row stride in bytes
    pub stride: u32,
    pub format: PixelFormat,
}

impl SurfaceSpec {
    /// Tightly packed BGRA32 surface
    ///
    /// Fails if the stride does not fit in `u32` or the size in `usize`.
    pub fn bgra(width: u32, height: u32) -> PipelineResult<Self> {
        let stride = checked_bgra_stride(width)
            .filter(|_| checked_bgra_size(width, height).is_some())
            .ok_or_else(|| {
                PipelineError::InitializationFailure(format!(
                    "Surface size {}x{} overflows",
                    width, height
                ))
            })?;
        Ok(Self {
            width,
            height,
            stride,
            format: PixelFormat::Bgra32,
        })
    }

    /// Total allocation size in bytes
    pub fn size(&self) -> usize {
        self.stride as usize * self.height as usize
    }
}

/// Handle a consumer can use to import a surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SharedHandle {
    /// Process-local heap memory, identified for logging and bookkeeping
    Heap { id: Uuid },
    /// Shareable file descriptor (memfd), importable by GPU APIs or other processes
    Fd(i32),
}

impl std::fmt::Display for SharedHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SharedHandle::Heap { id } => write!(f, "heap:{}", id),
            SharedHandle::Fd(fd) => write!(f, "fd:{}", fd),
        }
    }
}

/// Backing memory of one surface
pub trait SurfaceMemory: Send + Sync {
    fn as_bytes(&self) -> &[u8];
    fn as_bytes_mut(&mut self) -> &mut [u8];
    fn shared_handle(&self) -> SharedHandle;
}

/// Allocates surface memory
pub trait SurfaceAllocator {
    /// Short name for logs
    fn name(&self) -> &'static str;

    fn allocate(&self, spec: &SurfaceSpec) -> PipelineResult<Box<dyn SurfaceMemory>>;
}

/// Plain heap allocation, usable everywhere
#[derive(Debug, Clone, Copy, Default)]
pub struct HeapAllocator;

struct HeapSurface {
    data: Box<[u8]>,
    id: Uuid,
}

impl SurfaceMemory for HeapSurface {
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

impl SurfaceAllocator for HeapAllocator {
    fn name(&self) -> &'static str {
        "heap"
    }

    fn allocate(&self, spec: &SurfaceSpec) -> PipelineResult<Box<dyn SurfaceMemory>> {
        let size = spec.size();
        let mut data = Vec::new();
        data.try_reserve_exact(size).map_err(|e| {
            PipelineError::InitializationFailure(format!(
                "Cannot allocate {} byte surface: {}",
                size, e
            ))
        })?;
        data.resize(size, 0u8);

        Ok(Box::new(HeapSurface {
            data: data.into_boxed_slice(),
            id: Uuid::new_v4(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_size() {
        let spec = SurfaceSpec::bgra(1920, 1080).unwrap();
        assert_eq!(spec.stride, 1920 * 4);
        assert_eq!(spec.size(), 1920 * 1080 * 4);
    }

    #[test]
    fn test_spec_rejects_overflowing_width() {
        assert!(matches!(
            SurfaceSpec::bgra(1 << 30, 1),
            Err(PipelineError::InitializationFailure(_))
        ));
    }

    #[test]
    fn test_heap_allocation_failure_is_reported() {
        // Valid geometry, but no allocator can satisfy it
        let spec = SurfaceSpec::bgra(u32::MAX / 4, u32::MAX).unwrap();
        assert!(matches!(
            HeapAllocator.allocate(&spec),
            Err(PipelineError::InitializationFailure(_))
        ));
    }

    #[test]
    fn test_heap_surfaces_are_distinct() {
        let spec = SurfaceSpec::bgra(4, 4).unwrap();
        let a = HeapAllocator.allocate(&spec).unwrap();
        let b = HeapAllocator.allocate(&spec).unwrap();
        assert_eq!(a.as_bytes().len(), 64);
        assert!(a.as_bytes().iter().all(|&b| b == 0));
        assert_ne!(a.shared_handle(), b.shared_handle());
    }
}
