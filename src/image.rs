//! Opaque image buffer carried by slots.
//!
//! The engine never interprets pixels: an [`Image`] is an owned byte buffer
//! plus the metadata (width, height, sample depth, channel count) that
//! modules need to agree on a layout.

use crate::error::{KernelError, Result};
use serde::{Deserialize, Serialize};

/// Sample depth of a single channel value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Depth {
    /// 8-bit unsigned
    #[default]
    U8,
    /// 16-bit unsigned
    U16,
    /// 32-bit floating point
    F32,
}

impl Depth {
    /// Returns the size in bytes of one channel value
    pub fn size_bytes(&self) -> usize {
        match self {
            Depth::U8 => 1,
            Depth::U16 => 2,
            Depth::F32 => 4,
        }
    }
}

/// An owned image buffer with its layout metadata.
#[derive(Clone, PartialEq)]
pub struct Image {
    width: u32,
    height: u32,
    depth: Depth,
    channels: u8,
    data: Vec<u8>,
}

impl Image {
    /// Allocate a zero-filled image.
    pub fn new(width: u32, height: u32, depth: Depth, channels: u8) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(KernelError::InvalidSizeDimension(format!(
                "{}x{} has an empty dimension",
                width, height
            )));
        }
        if !matches!(channels, 1 | 3 | 4) {
            return Err(KernelError::InvalidColorComponent(format!(
                "{} channels (expected 1, 3 or 4)",
                channels
            )));
        }
        let len = width as usize * height as usize * channels as usize * depth.size_bytes();
        Ok(Self {
            width,
            height,
            depth,
            channels,
            data: vec![0; len],
        })
    }

    /// Allocate an image with the same layout as `other`.
    pub fn like(other: &Image) -> Self {
        Self {
            width: other.width,
            height: other.height,
            depth: other.depth,
            channels: other.channels,
            data: vec![0; other.data.len()],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn depth(&self) -> Depth {
        self.depth
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// Number of bytes in one row.
    #[inline]
    pub fn row_stride(&self) -> usize {
        self.width as usize * self.channels as usize * self.depth.size_bytes()
    }

    /// Total buffer length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Whether `other` has identical dimensions, depth and channel count.
    pub fn same_layout(&self, other: &Image) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.depth == other.depth
            && self.channels == other.channels
    }
}

impl std::fmt::Debug for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Image")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("depth", &self.depth)
            .field("channels", &self.channels)
            .field("len", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_image_layout() {
        let img = Image::new(4, 2, Depth::U16, 3).unwrap();
        assert_eq!(img.row_stride(), 4 * 3 * 2);
        assert_eq!(img.len(), 4 * 2 * 3 * 2);
        assert!(img.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_image_rejects_empty_dimension() {
        let err = Image::new(0, 10, Depth::U8, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSizeDimension);
    }

    #[test]
    fn test_image_rejects_bad_channels() {
        let err = Image::new(8, 8, Depth::U8, 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidColorComponent);
    }

    #[test]
    fn test_image_like_copies_layout() {
        let a = Image::new(3, 3, Depth::F32, 4).unwrap();
        let b = Image::like(&a);
        assert!(a.same_layout(&b));
        assert_eq!(a.len(), b.len());
    }
}
