use crate::buffer::{PixelBuffer, try_alloc_zeroed};
use crate::convert::{self, PixelFormat};
use crate::encoder::EncodeParams;
use crate::error::{StackError, StackResult};
use crate::rect::{DirtyRectTracker, Rect};
use crate::task::{EncodeTicket, TaskSpawner};

use super::{encode_region, validate_push, validate_size, validate_source};

/// Output of a background dirty-region encode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DynamicEncoded {
    pub jpeg: Vec<u8>,
    /// Region the JPEG covers, as tracked when the encode was scheduled.
    pub rect: Rect,
}

/// A canvas sized by its background that encodes only the region touched
/// since the last [`reset`](Self::reset).
#[derive(Debug)]
pub struct DynamicCanvas {
    pixels: Option<PixelBuffer>,
    format: PixelFormat,
    params: EncodeParams,
    tracker: DirtyRectTracker,
}

impl DynamicCanvas {
    pub fn new(format: PixelFormat) -> Self {
        Self {
            pixels: None,
            format,
            params: EncodeParams::default(),
            tracker: DirtyRectTracker::new(),
        }
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn quality(&self) -> u8 {
        self.params.quality()
    }

    pub fn set_quality(&mut self, quality: i32) -> StackResult<()> {
        self.params.set_quality(quality)
    }

    pub fn has_background(&self) -> bool {
        self.pixels.is_some()
    }

    /// Current background dimensions, `(0, 0)` before any background.
    pub fn background_size(&self) -> (usize, usize) {
        self.pixels.as_ref().map_or((0, 0), PixelBuffer::dimensions)
    }

    /// Canonical RGB contents, empty before any background.
    pub fn as_rgb_bytes(&self) -> &[u8] {
        match &self.pixels {
            Some(pixels) => pixels.as_rgb_bytes(),
            None => &[],
        }
    }

    /// Replace the canvas with a packed `width` x `height` image in the
    /// canvas format. The dirty region is cleared.
    pub fn set_background(&mut self, data: &[u8], width: i32, height: i32) -> StackResult<()> {
        let (width, height) = validate_size(width, height)?;
        validate_source(self.format, data, width, height)?;

        let rgb = convert::convert_to_rgb(self.format, data, width, height)?;
        self.install_background(PixelBuffer::from_rgb(width, height, rgb)?);
        Ok(())
    }

    /// Replace the canvas with a `width` x `height` frame of one color.
    pub fn set_solid_background(&mut self, width: i32, height: i32, rgb: [u8; 3]) -> StackResult<()> {
        let (width, height) = validate_size(width, height)?;
        let mut data = try_alloc_zeroed(PixelFormat::Rgb.buffer_len(width, height)?)?;
        for pixel in data.chunks_exact_mut(3) {
            pixel.copy_from_slice(&rgb);
        }
        self.install_background(PixelBuffer::from_rgb(width, height, data)?);
        Ok(())
    }

    fn install_background(&mut self, pixels: PixelBuffer) {
        log::debug!(
            "dynamic canvas background set to {}x{}",
            pixels.width(),
            pixels.height()
        );
        self.pixels = Some(pixels);
        self.tracker.reset();
    }

    /// Write a packed `width` x `height` rectangle of `data` at `(x, y)` and
    /// grow the dirty region to cover it.
    pub fn push(&mut self, data: &[u8], x: i32, y: i32, width: i32, height: i32) -> StackResult<()> {
        let format = self.format;
        let pixels = self.pixels.as_mut().ok_or(StackError::NoBackground)?;
        let region = validate_push(pixels.width(), pixels.height(), x, y, width, height)?;
        validate_source(format, data, region.width, region.height)?;

        let canvas_width = pixels.width();
        log::trace!(
            "dynamic push {}x{} {format} at ({}, {})",
            region.width,
            region.height,
            region.x,
            region.y
        );
        convert::write_rect(
            format,
            data,
            pixels.pixels_mut()?,
            canvas_width,
            region.x,
            region.y,
            region.width,
            region.height,
        );
        self.tracker.accumulate(x, y, width, height);
        Ok(())
    }

    /// Forget the dirty region. Pixels are kept.
    pub fn reset(&mut self) {
        self.tracker.reset();
    }

    /// The dirty region, or [`Rect::EMPTY`] when nothing was pushed since
    /// the last reset. Zero-area pushes never leave the empty state.
    pub fn dimensions(&self) -> Rect {
        self.tracker.current()
    }

    fn encode_target(&self) -> StackResult<(&PixelBuffer, Rect)> {
        let pixels = self.pixels.as_ref().ok_or(StackError::NoBackground)?;
        if self.tracker.is_empty() {
            return Err(StackError::EmptyDirtyRegion);
        }
        Ok((pixels, self.tracker.current()))
    }

    /// Encode the dirty region.
    pub fn encode_sync(&self) -> StackResult<Vec<u8>> {
        let (pixels, rect) = self.encode_target()?;
        encode_region(pixels, rect, self.params)
    }

    /// Encode the dirty region on a worker. Missing background and empty
    /// dirty region are reported here rather than through `handler`.
    pub fn encode_async<H>(&self, spawner: &TaskSpawner, handler: H) -> StackResult<EncodeTicket>
    where
        H: FnOnce(StackResult<DynamicEncoded>) + Send + 'static,
    {
        let (pixels, rect) = self.encode_target()?;
        let params = self.params;
        Ok(spawner.spawn(
            pixels.snapshot(),
            move |pixels| {
                encode_region(pixels, rect, params).map(|jpeg| DynamicEncoded { jpeg, rect })
            },
            handler,
        ))
    }
}

impl Default for DynamicCanvas {
    fn default() -> Self {
        Self::new(PixelFormat::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{EncodeExecutor, ExecutorConfig};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::sync::{Arc, Mutex};

    fn executor() -> EncodeExecutor {
        EncodeExecutor::with_config(ExecutorConfig {
            workers: 2,
            thread_name: "dynamic-canvas-test".to_string(),
        })
        .expect("pool")
    }

    fn rgba_canvas_8x8() -> StackResult<DynamicCanvas> {
        let mut canvas = DynamicCanvas::new(PixelFormat::Rgba);
        canvas.set_background(&[40u8, 80, 120, 255].repeat(64), 8, 8)?;
        Ok(canvas)
    }

    #[test]
    fn push_then_reset_tracks_dirty_rect() -> StackResult<()> {
        let mut canvas = rgba_canvas_8x8()?;
        canvas.push(&[255u8, 0, 0, 255].repeat(4), 3, 3, 2, 2)?;
        assert_eq!(canvas.dimensions(), Rect::new(3, 3, 2, 2));

        canvas.reset();
        assert_eq!(canvas.dimensions(), Rect::EMPTY);
        assert_eq!(canvas.as_rgb_bytes()[(3 * 8 + 3) * 3], 255);
        Ok(())
    }

    #[test]
    fn single_push_after_reset_is_exact() -> StackResult<()> {
        let mut canvas = rgba_canvas_8x8()?;
        canvas.push(&[0u8; 4], 0, 0, 1, 1)?;
        canvas.push(&[0u8; 4], 7, 7, 1, 1)?;
        canvas.reset();
        canvas.push(&[0u8; 6 * 4], 2, 5, 3, 2)?;
        assert_eq!(canvas.dimensions(), Rect::new(2, 5, 3, 2));
        Ok(())
    }

    #[test]
    fn zero_area_push_keeps_empty_dimensions() -> StackResult<()> {
        let mut canvas = rgba_canvas_8x8()?;
        canvas.push(&[], 2, 2, 0, 3)?;
        canvas.push(&[], 5, 1, 2, 0)?;
        assert_eq!(canvas.dimensions(), Rect::EMPTY);
        assert!(matches!(canvas.encode_sync(), Err(StackError::EmptyDirtyRegion)));
        Ok(())
    }

    #[test]
    fn operations_before_background_fail() {
        let mut canvas = DynamicCanvas::new(PixelFormat::Rgb);
        assert!(matches!(canvas.push(&[0; 3], 0, 0, 1, 1), Err(StackError::NoBackground)));
        assert!(matches!(canvas.encode_sync(), Err(StackError::NoBackground)));
        assert!(!canvas.has_background());
        assert_eq!(canvas.background_size(), (0, 0));
        assert_eq!(canvas.dimensions(), Rect::EMPTY);
    }

    #[test]
    fn encoding_a_clean_canvas_fails() -> StackResult<()> {
        let canvas = rgba_canvas_8x8()?;
        assert!(matches!(canvas.encode_sync(), Err(StackError::EmptyDirtyRegion)));
        let executor = executor();
        let scheduled = canvas.encode_async(executor.spawner(), |_| {});
        assert!(matches!(scheduled, Err(StackError::EmptyDirtyRegion)));
        assert_eq!(executor.pending(), 0);
        Ok(())
    }

    #[test]
    fn push_boundaries() -> StackResult<()> {
        let mut canvas = DynamicCanvas::new(PixelFormat::Rgb);
        canvas.set_solid_background(4, 4, [0, 0, 0])?;
        canvas.push(&[1u8; 2 * 2 * 3], 2, 2, 2, 2)?;

        canvas.reset();
        let err = canvas.push(&[1u8; 3 * 3], 2, 0, 3, 1).unwrap_err();
        assert!(matches!(err, StackError::OutOfRange { argument: "width", .. }));
        assert_eq!(canvas.dimensions(), Rect::EMPTY);
        Ok(())
    }

    #[test]
    fn new_background_clears_dirty_region() -> StackResult<()> {
        let mut canvas = rgba_canvas_8x8()?;
        canvas.push(&[0u8; 4], 6, 6, 1, 1)?;
        canvas.set_solid_background(2, 2, [9, 9, 9])?;
        assert_eq!(canvas.dimensions(), Rect::EMPTY);
        assert_eq!(canvas.background_size(), (2, 2));
        assert_eq!(canvas.as_rgb_bytes(), [9u8; 12].as_slice());
        Ok(())
    }

    #[test]
    fn rejected_background_keeps_previous_one() -> StackResult<()> {
        let mut canvas = rgba_canvas_8x8()?;
        assert!(canvas.set_background(&[0u8; 10], 4, 4).is_err());
        assert!(canvas.set_background(&[], -1, 4).is_err());
        assert_eq!(canvas.background_size(), (8, 8));
        Ok(())
    }

    #[test]
    fn encode_covers_only_dirty_region() -> StackResult<()> {
        let mut canvas = rgba_canvas_8x8()?;
        canvas.push(&[200u8, 10, 10, 255].repeat(6), 1, 2, 3, 2)?;
        let jpeg = canvas.encode_sync()?;
        let image = image::load_from_memory_with_format(&jpeg, image::ImageFormat::Jpeg)
            .expect("valid jpeg");
        assert_eq!((image.width(), image.height()), (3, 2));
        Ok(())
    }

    #[test]
    fn async_result_carries_scheduled_rect() -> StackResult<()> {
        let executor = executor();
        let mut canvas = rgba_canvas_8x8()?;
        canvas.push(&[0u8; 4 * 4], 4, 4, 2, 2)?;

        let delivered = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&delivered);
        canvas.encode_async(executor.spawner(), move |result| {
            *slot.lock().unwrap() = Some(result);
        })?;
        canvas.push(&[0u8; 4], 0, 0, 1, 1)?;

        executor.drain();
        let encoded = delivered.lock().unwrap().take().expect("handler ran")?;
        assert_eq!(encoded.rect, Rect::new(4, 4, 2, 2));
        assert_eq!(&encoded.jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!(canvas.dimensions(), Rect::new(0, 0, 6, 6));
        Ok(())
    }

    #[test]
    fn random_disjoint_pushes_track_bounding_box() -> StackResult<()> {
        let mut rng = StdRng::seed_from_u64(0x5eed_0001);
        for _ in 0..64 {
            let mut canvas = DynamicCanvas::new(PixelFormat::Bgr);
            canvas.set_solid_background(64, 64, [0, 0, 0])?;

            // Disjoint cells of an 8x8 grid of 8x8 tiles.
            let mut cells: Vec<(i32, i32)> = (0..8).flat_map(|r| (0..8).map(move |c| (c, r))).collect();
            let count = rng.gen_range(1..=6);
            let mut expected = Rect::EMPTY;
            for _ in 0..count {
                let (cx, cy) = cells.swap_remove(rng.gen_range(0..cells.len()));
                let w = rng.gen_range(1..=8);
                let h = rng.gen_range(1..=8);
                let rect = Rect::new(cx * 8, cy * 8, w, h);
                let before = canvas.dimensions();

                canvas.push(&vec![7u8; (w * h * 3) as usize], rect.x, rect.y, w, h)?;
                expected = expected.union(&rect);

                let after = canvas.dimensions();
                assert!(after.contains(&rect));
                assert!(after.area() >= before.area());
            }
            assert_eq!(canvas.dimensions(), expected);
        }
        Ok(())
    }
}
