//! Canonical RGB pixel storage owned by a canvas.
//!
//! The bytes live behind an `Arc` so an in-flight encode can hold a
//! snapshot while the owner keeps pushing. The owner is the only writer:
//! [`PixelBuffer::pixels_mut`] detaches from any outstanding snapshot
//! before handing out the slice, so a snapshot never changes underneath
//! its reader.

use std::sync::Arc;

use crate::convert::{CANONICAL_BYTES_PER_PIXEL, PixelFormat};
use crate::error::{StackError, StackResult};

/// Allocate `len` zeroed bytes, reporting failure instead of aborting.
pub(crate) fn try_alloc_zeroed(len: usize) -> StackResult<Vec<u8>> {
    let mut data = Vec::new();
    data.try_reserve_exact(len)
        .map_err(|_| StackError::AllocationFailed { bytes: len })?;
    data.resize(len, 0);
    Ok(data)
}

fn rgb_len(width: usize, height: usize) -> StackResult<usize> {
    PixelFormat::Rgb.buffer_len(width, height)
}

#[derive(Clone)]
pub struct PixelBuffer {
    data: Arc<Vec<u8>>,
    width: usize,
    height: usize,
}

impl PixelBuffer {
    /// A `width` x `height` buffer with every pixel black.
    pub fn zeroed(width: usize, height: usize) -> StackResult<Self> {
        let len = rgb_len(width, height)?;
        Ok(Self {
            data: Arc::new(try_alloc_zeroed(len)?),
            width,
            height,
        })
    }

    /// Wrap bytes that are already in canonical RGB order.
    pub fn from_rgb(width: usize, height: usize, data: Vec<u8>) -> StackResult<Self> {
        let expected = rgb_len(width, height)?;
        if data.len() != expected {
            return Err(StackError::InvalidArgument(format!(
                "RGB buffer length mismatch: got {}, expected {} for {}x{}",
                data.len(),
                expected,
                width,
                height
            )));
        }
        Ok(Self {
            data: Arc::new(data),
            width,
            height,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Bytes per row.
    pub fn stride(&self) -> usize {
        self.width * CANONICAL_BYTES_PER_PIXEL
    }

    pub fn as_rgb_bytes(&self) -> &[u8] {
        self.data.as_slice()
    }

    /// Whether a snapshot taken by an encode task still references these
    /// bytes.
    pub fn is_shared(&self) -> bool {
        Arc::strong_count(&self.data) > 1
    }

    /// Cheap read-only copy sharing the same bytes.
    pub(crate) fn snapshot(&self) -> PixelBuffer {
        self.clone()
    }

    /// Mutable access for the owning canvas. Copies the bytes first when a
    /// snapshot still shares them.
    pub(crate) fn pixels_mut(&mut self) -> StackResult<&mut [u8]> {
        if Arc::get_mut(&mut self.data).is_none() {
            let mut detached = try_alloc_zeroed(self.data.len())?;
            detached.copy_from_slice(&self.data);
            self.data = Arc::new(detached);
        }
        Arc::get_mut(&mut self.data)
            .map(|data| data.as_mut_slice())
            .ok_or(StackError::BufferOverflow)
    }
}

impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("data_len", &self.data.len())
            .field("shared", &self.is_shared())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeroed_buffer_has_canonical_length() -> StackResult<()> {
        let buffer = PixelBuffer::zeroed(7, 3)?;
        assert_eq!(buffer.as_rgb_bytes().len(), 7 * 3 * 3);
        assert!(buffer.as_rgb_bytes().iter().all(|b| *b == 0));
        assert_eq!(buffer.stride(), 21);
        Ok(())
    }

    #[test]
    fn zero_sized_buffer_is_valid() -> StackResult<()> {
        let buffer = PixelBuffer::zeroed(0, 0)?;
        assert!(buffer.as_rgb_bytes().is_empty());
        Ok(())
    }

    #[test]
    fn overflowing_dimensions_are_rejected() {
        let err = PixelBuffer::zeroed(usize::MAX, 2).unwrap_err();
        assert!(matches!(err, StackError::BufferOverflow));
    }

    #[test]
    fn writes_after_snapshot_leave_the_snapshot_untouched() -> StackResult<()> {
        let mut buffer = PixelBuffer::zeroed(2, 2)?;
        let snapshot = buffer.snapshot();
        assert!(buffer.is_shared());

        buffer.pixels_mut()?[0] = 0xFF;

        assert_eq!(buffer.as_rgb_bytes()[0], 0xFF);
        assert_eq!(snapshot.as_rgb_bytes()[0], 0);
        assert!(!buffer.is_shared());
        Ok(())
    }

    #[test]
    fn from_rgb_checks_length() {
        let err = PixelBuffer::from_rgb(2, 2, vec![0; 11]).unwrap_err();
        assert!(err.to_string().contains("expected 12"), "{err}");
    }
}
