// SPDX-License-Identifier: GPL-3.0-only

//! memfd-backed surfaces
//!
//! The buffer lives in an anonymous memory file mapped into this process.
//! Its descriptor can be passed to another process or imported as external
//! memory by a GPU API, so consumers read frames without a copy.

use super::{SharedHandle, SurfaceAllocator, SurfaceMemory, SurfaceSpec};
use crate::errors::{PipelineError, PipelineResult};
use std::ffi::CString;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::ptr::NonNull;
use tracing::debug;

/// Allocates surfaces in anonymous memfd files
#[derive(Debug, Clone, Copy, Default)]
pub struct MemfdAllocator;

struct MemfdSurface {
    fd: OwnedFd,
    ptr: NonNull<u8>,
    len: usize,
}

// The mapping is exclusively owned by this struct; access goes through &self/&mut self.
unsafe impl Send for MemfdSurface {}
unsafe impl Sync for MemfdSurface {}

impl SurfaceMemory for MemfdSurface {
    fn as_bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    fn shared_handle(&self) -> SharedHandle {
        SharedHandle::Fd(self.fd.as_raw_fd())
    }
}

impl Drop for MemfdSurface {
    fn drop(&mut self) {
        // fd is closed by OwnedFd
        unsafe {
            libc::munmap(self.ptr.as_ptr().cast(), self.len);
        }
    }
}

fn os_error(what: &str) -> PipelineError {
    PipelineError::InitializationFailure(format!(
        "{} failed: {}",
        what,
        std::io::Error::last_os_error()
    ))
}

impl SurfaceAllocator for MemfdAllocator {
    fn name(&self) -> &'static str {
        "memfd"
    }

    fn allocate(&self, spec: &SurfaceSpec) -> PipelineResult<Box<dyn SurfaceMemory>> {
        let len = spec.size();
        if len == 0 {
            return Err(PipelineError::InitializationFailure(
                "Cannot map an empty surface".into(),
            ));
        }

        let name = CString::new("camera-effects-surface")
            .map_err(|e| PipelineError::InitializationFailure(e.to_string()))?;

        let raw = unsafe { libc::memfd_create(name.as_ptr(), libc::MFD_CLOEXEC) };
        if raw < 0 {
            return Err(os_error("memfd_create"));
        }
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        if unsafe { libc::ftruncate(fd.as_raw_fd(), len as libc::off_t) } != 0 {
            return Err(os_error("ftruncate"));
        }

        let addr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd.as_raw_fd(),
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(os_error("mmap"));
        }
        let ptr = NonNull::new(addr.cast::<u8>()).ok_or_else(|| os_error("mmap"))?;

        debug!(fd = fd.as_raw_fd(), len, "Mapped memfd surface");
        Ok(Box::new(MemfdSurface { fd, ptr, len }))
    }
}
