// SPDX-License-Identifier: GPL-3.0-only

//! Frame descriptors shared by the pipeline and its collaborators

use crate::constants::BYTES_PER_PIXEL;
use std::sync::Arc;

/// Pixel format of a frame
///
/// The pipeline itself only accepts BGRA32. RGBA32 exists so loaders and
/// the CLI can describe decoded images before swizzling them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    /// BGRA - 32-bit with alpha (B G R A byte order)
    #[default]
    Bgra32,
    /// RGBA - 32-bit with alpha (R G B A byte order)
    Rgba32,
}

impl PixelFormat {
    /// Bytes per pixel
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            Self::Bgra32 | Self::Rgba32 => BYTES_PER_PIXEL,
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PixelFormat::Bgra32 => write!(f, "BGRA32"),
            PixelFormat::Rgba32 => write!(f, "RGBA32"),
        }
    }
}

/// Minimum buffer length for a strided image
///
/// The last row only needs its visible pixels, so padding after it is optional.
pub fn required_len(width: u32, height: u32, stride: u32) -> usize {
    if width == 0 || height == 0 {
        return 0;
    }
    stride as usize * (height as usize - 1) + width as usize * BYTES_PER_PIXEL
}

/// Non-owning descriptor of a raw pixel buffer
///
/// Used to pass camera input into the pipeline without copying. The borrow
/// is the read lock on the caller's memory: it lasts as long as the view.
#[derive(Clone, Copy)]
pub struct FrameView<'a> {
    data: &'a [u8],
    width: u32,
    height: u32,
    stride: u32,
    format: PixelFormat,
}

impl<'a> FrameView<'a> {
    /// Describe a strided buffer
    pub fn new(data: &'a [u8], width: u32, height: u32, stride: u32, format: PixelFormat) -> Self {
        Self {
            data,
            width,
            height,
            stride,
            format,
        }
    }

    /// Describe a tightly packed BGRA32 buffer
    ///
    /// A width whose stride does not fit in `u32` gets a saturated stride,
    /// which [`FrameView::validate`] then rejects.
    pub fn bgra(data: &'a [u8], width: u32, height: u32) -> Self {
        Self::new(
            data,
            width,
            height,
            width.saturating_mul(BYTES_PER_PIXEL as u32),
            PixelFormat::Bgra32,
        )
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Visible bytes of one row (without stride padding)
    pub fn row(&self, y: u32) -> Option<&'a [u8]> {
        if y >= self.height {
            return None;
        }
        let start = y as usize * self.stride as usize;
        let end = start + self.width as usize * self.format.bytes_per_pixel();
        self.data.get(start..end)
    }

    /// Check that stride and buffer length can hold the described image
    pub fn validate(&self) -> Result<(), String> {
        let row_bytes = self.width as usize * self.format.bytes_per_pixel();
        if (self.stride as usize) < row_bytes {
            return Err(format!(
                "stride {} is smaller than a {}px row ({} bytes)",
                self.stride, self.width, row_bytes
            ));
        }
        let needed = required_len(self.width, self.height, self.stride);
        if self.data.len() < needed {
            return Err(format!(
                "buffer holds {} bytes, {}x{} at stride {} needs {}",
                self.data.len(),
                self.width,
                self.height,
                self.stride,
                needed
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for FrameView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameView")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("format", &self.format)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Frame data storage - either borrowed from the caller or shared owned bytes
///
/// Borrowed data is the zero-copy path for ingested camera frames. Owned
/// data is reference counted so engines can hand out the same background
/// or marker frame repeatedly without copying.
#[derive(Clone)]
pub enum FrameData<'a> {
    /// Caller memory, valid for the frame's lifetime
    Borrowed(&'a [u8]),
    /// Owned bytes
    Shared(Arc<[u8]>),
}

impl FrameData<'_> {
    /// Whether the data still aliases caller memory
    pub fn is_borrowed(&self) -> bool {
        matches!(self, FrameData::Borrowed(_))
    }

    /// Detach from caller memory, copying only when borrowed
    pub fn into_shared(self) -> FrameData<'static> {
        match self {
            FrameData::Borrowed(bytes) => FrameData::Shared(Arc::from(bytes)),
            FrameData::Shared(bytes) => FrameData::Shared(bytes),
        }
    }
}

impl std::fmt::Debug for FrameData<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameData::Borrowed(data) => write!(f, "FrameData::Borrowed({} bytes)", data.len()),
            FrameData::Shared(data) => write!(f, "FrameData::Shared({} bytes)", data.len()),
        }
    }
}

impl std::ops::Deref for FrameData<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            FrameData::Borrowed(data) => data,
            FrameData::Shared(data) => data,
        }
    }
}

impl From<Vec<u8>> for FrameData<'static> {
    fn from(data: Vec<u8>) -> Self {
        FrameData::Shared(Arc::from(data.into_boxed_slice()))
    }
}

/// An owned frame, for sources that produce their own buffers
#[derive(Debug, Clone)]
pub struct OwnedFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub format: PixelFormat,
}

impl OwnedFrame {
    /// Tightly packed BGRA32 frame filled with one color swatch
    pub fn solid_bgra(width: u32, height: u32, bgra: [u8; 4]) -> Self {
        let data = bgra.repeat(width as usize * height as usize);
        Self {
            data,
            width,
            height,
            stride: width.saturating_mul(BYTES_PER_PIXEL as u32),
            format: PixelFormat::Bgra32,
        }
    }

    /// Borrow as a frame view
    pub fn as_view(&self) -> FrameView<'_> {
        FrameView::new(
            &self.data,
            self.width,
            self.height,
            self.stride,
            self.format,
        )
    }
}

/// Swap the first and third byte of every pixel (RGBA <-> BGRA)
pub fn swap_red_blue(pixels: &mut [u8]) {
    let whole = pixels.len() - pixels.len() % BYTES_PER_PIXEL;
    for px in bytemuck::cast_slice_mut::<u8, [u8; 4]>(&mut pixels[..whole]) {
        px.swap(0, 2);
    }
}
