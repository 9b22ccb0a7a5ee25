use image::RgbImage;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Bytes per pixel of the packed RGB layout every frame uses
pub const BYTES_PER_PIXEL: usize = 3;

/// Immutable 8-bit RGB frame with row stride
#[derive(Debug, Clone)]
pub struct Frame {
    /// Sequence id assigned by the source
    pub id: u64,
    /// Timestamp when frame was captured
    pub timestamp: SystemTime,
    data: Arc<Vec<u8>>,
    width: u32,
    height: u32,
    stride: usize,
}

impl Frame {
    /// Create a tightly packed frame (stride == width * 3)
    pub fn new(id: u64, timestamp: SystemTime, data: Vec<u8>, width: u32, height: u32) -> Self {
        Self::with_stride(id, timestamp, data, width, height, width as usize * BYTES_PER_PIXEL)
    }

    /// Create a frame whose rows are `stride` bytes apart
    pub fn with_stride(
        id: u64,
        timestamp: SystemTime,
        data: Vec<u8>,
        width: u32,
        height: u32,
        stride: usize,
    ) -> Self {
        Self {
            id,
            timestamp,
            data: Arc::new(data),
            width,
            height,
            stride,
        }
    }

    /// Wrap an RGB image, keeping the id and timestamp of `origin`
    pub fn from_rgb_image(origin: &Frame, image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self::new(origin.id, origin.timestamp, image.into_raw(), width, height)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Bytes of visible pixels in one row
    pub fn row_bytes(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    /// Check the buffer holds `height` rows of `stride` bytes
    pub fn validate_size(&self) -> bool {
        if self.stride < self.row_bytes() {
            return false;
        }
        // The last row may omit its padding
        let required = match self.height as usize {
            0 => 0,
            h => self.stride * (h - 1) + self.row_bytes(),
        };
        self.data.len() >= required
    }

    /// Iterate the visible bytes of each row, skipping stride padding
    pub fn rows(&self) -> impl Iterator<Item = &[u8]> + '_ {
        let row_bytes = self.row_bytes();
        (0..self.height as usize).filter_map(move |y| {
            let start = y * self.stride;
            self.data.get(start..start + row_bytes)
        })
    }

    /// Copy pixels into a packed RGB image
    pub fn to_rgb_image(&self) -> Option<RgbImage> {
        if !self.validate_size() {
            return None;
        }
        if self.stride == self.row_bytes() {
            let packed = self.data[..self.row_bytes() * self.height as usize].to_vec();
            return RgbImage::from_raw(self.width, self.height, packed);
        }
        let mut packed = Vec::with_capacity(self.row_bytes() * self.height as usize);
        for row in self.rows() {
            packed.extend_from_slice(row);
        }
        RgbImage::from_raw(self.width, self.height, packed)
    }

    /// FNV-1a hash over visible pixels, independent of stride padding
    pub fn checksum(&self) -> u64 {
        const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const PRIME: u64 = 0x0000_0100_0000_01b3;

        let mut hash = OFFSET;
        for row in self.rows() {
            for byte in row {
                hash ^= *byte as u64;
                hash = hash.wrapping_mul(PRIME);
            }
        }
        hash
    }

    /// Time elapsed between `earlier` and this frame's capture
    pub fn elapsed_since(&self, earlier: SystemTime) -> Duration {
        self.timestamp.duration_since(earlier).unwrap_or_default()
    }

    /// True when both frames share the same pixel allocation
    pub fn shares_pixels_with(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}
