// SPDX-License-Identifier: GPL-3.0-only

//! Pipeline-wide constants

/// Bytes per BGRA32 pixel
pub const BYTES_PER_PIXEL: usize = 4;

/// Reserved parameter value meaning "unset" (effect disabled)
pub const PARAMETER_UNSET: f32 = -1.0;

/// Number of output buffers kept by the surface manager (front + back)
pub const OUTPUT_BUFFER_COUNT: usize = 2;

/// Default pipeline dimensions when no config is present
pub const DEFAULT_WIDTH: u32 = 1280;
pub const DEFAULT_HEIGHT: u32 = 720;

/// Tight row stride for a BGRA32 buffer of the given width
pub fn bgra_stride(width: u32) -> usize {
    width as usize * BYTES_PER_PIXEL
}

/// Total byte size of a tightly packed BGRA32 buffer
pub fn bgra_size(width: u32, height: u32) -> usize {
    bgra_stride(width) * height as usize
}

/// Row stride as stored in surface and frame descriptors, if it fits in `u32`
pub fn checked_bgra_stride(width: u32) -> Option<u32> {
    width.checked_mul(BYTES_PER_PIXEL as u32)
}

/// Buffer size for `width` x `height`, if the stride fits in `u32` and the
/// total fits in `usize`
pub fn checked_bgra_size(width: u32, height: u32) -> Option<usize> {
    let stride = checked_bgra_stride(width)?;
    (stride as usize).checked_mul(height as usize)
}

/// Software engine tuning
pub mod software {
    /// Box blur radius at power 1.0, in pixels
    pub const MAX_BLUR_RADIUS: usize = 24;
    /// Box blur radius used for beautification smoothing
    pub const BEAUTIFY_RADIUS: usize = 3;
    /// Error code reported when background replacement is requested
    pub const ERROR_UNSUPPORTED: i32 = 2;
    /// Error code reported for malformed frames
    pub const ERROR_INVALID_FRAME: i32 = 3;
}

/// Application information utilities
pub mod app_info {
    /// Get the application version from build-time environment
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bgra_sizes() {
        assert_eq!(bgra_stride(1920), 7680);
        assert_eq!(bgra_size(4, 4), 64);
        assert_eq!(bgra_size(1920, 1080), 1920 * 1080 * 4);
    }

    #[test]
    fn test_checked_sizes_reject_overflow() {
        assert_eq!(checked_bgra_stride(1920), Some(7680));
        assert_eq!(checked_bgra_size(1920, 1080), Some(1920 * 1080 * 4));
        assert_eq!(checked_bgra_stride(1 << 30), None);
        assert_eq!(checked_bgra_size(1 << 30, 1), None);
        assert_eq!(checked_bgra_stride(u32::MAX / 4), Some(u32::MAX / 4 * 4));
    }
}
