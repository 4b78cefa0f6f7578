use crate::buffer::PixelBuffer;
use crate::convert::{self, PixelFormat};
use crate::encoder::EncodeParams;
use crate::error::StackResult;
use crate::rect::Rect;
use crate::task::{EncodeTicket, TaskSpawner};

use super::{encode_region, validate_push, validate_size, validate_source};

/// A canvas with dimensions fixed at construction. Every encode covers the
/// whole frame.
#[derive(Debug)]
pub struct FixedCanvas {
    pixels: PixelBuffer,
    format: PixelFormat,
    params: EncodeParams,
}

impl FixedCanvas {
    /// Allocate a black `width` x `height` canvas accepting pushes in
    /// `format`.
    pub fn new(width: i32, height: i32, format: PixelFormat) -> StackResult<Self> {
        let (width, height) = validate_size(width, height)?;
        Ok(Self {
            pixels: PixelBuffer::zeroed(width, height)?,
            format,
            params: EncodeParams::default(),
        })
    }

    pub fn width(&self) -> usize {
        self.pixels.width()
    }

    pub fn height(&self) -> usize {
        self.pixels.height()
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

    /// Canonical RGB contents, row-major.
    pub fn as_rgb_bytes(&self) -> &[u8] {
        self.pixels.as_rgb_bytes()
    }

    /// Write a packed `width` x `height` rectangle of `data` at `(x, y)`.
    pub fn push(&mut self, data: &[u8], x: i32, y: i32, width: i32, height: i32) -> StackResult<()> {
        let region = validate_push(self.width(), self.height(), x, y, width, height)?;
        validate_source(self.format, data, region.width, region.height)?;

        let canvas_width = self.width();
        let format = self.format;
        log::trace!(
            "fixed push {}x{} {format} at ({}, {})",
            region.width,
            region.height,
            region.x,
            region.y
        );
        convert::write_rect(
            format,
            data,
            self.pixels.pixels_mut()?,
            canvas_width,
            region.x,
            region.y,
            region.width,
            region.height,
        );
        Ok(())
    }

    fn full_rect(&self) -> Rect {
        // Dimensions beyond i32 are caught by the encoder's size check.
        Rect::full(
            i32::try_from(self.width()).unwrap_or(i32::MAX),
            i32::try_from(self.height()).unwrap_or(i32::MAX),
        )
    }

    pub fn encode_sync(&self) -> StackResult<Vec<u8>> {
        encode_region(&self.pixels, self.full_rect(), self.params)
    }

    /// Encode on a worker. The pixels are captured now, so pushes made
    /// while the task runs do not affect its output.
    pub fn encode_async<H>(&self, spawner: &TaskSpawner, handler: H) -> EncodeTicket
    where
        H: FnOnce(StackResult<Vec<u8>>) + Send + 'static,
    {
        let rect = self.full_rect();
        let params = self.params;
        spawner.spawn(
            self.pixels.snapshot(),
            move |pixels| encode_region(pixels, rect, params),
            handler,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StackError;
    use crate::task::{EncodeExecutor, ExecutorConfig};
    use std::sync::{Arc, Mutex};

    fn decode_dimensions(jpeg: &[u8]) -> (u32, u32) {
        let image = image::load_from_memory_with_format(jpeg, image::ImageFormat::Jpeg)
            .expect("valid jpeg");
        (image.width(), image.height())
    }

    fn executor() -> EncodeExecutor {
        EncodeExecutor::with_config(ExecutorConfig {
            workers: 2,
            thread_name: "fixed-canvas-test".to_string(),
        })
        .expect("pool")
    }

    #[test]
    fn new_canvas_is_black() -> StackResult<()> {
        let canvas = FixedCanvas::new(3, 2, PixelFormat::Rgb)?;
        assert_eq!(canvas.width(), 3);
        assert_eq!(canvas.height(), 2);
        assert!(canvas.as_rgb_bytes().iter().all(|b| *b == 0));
        assert_eq!(canvas.quality(), 60);
        Ok(())
    }

    #[test]
    fn negative_size_is_rejected() {
        let err = FixedCanvas::new(-1, 4, PixelFormat::Rgb).unwrap_err();
        assert!(matches!(err, StackError::OutOfRange { argument: "width", .. }));
    }

    #[test]
    fn red_frame_encodes_to_jpeg() -> StackResult<()> {
        let mut canvas = FixedCanvas::new(4, 4, PixelFormat::Rgb)?;
        let red: Vec<u8> = [255u8, 0, 0].repeat(16);
        canvas.push(&red, 0, 0, 4, 4)?;
        canvas.set_quality(80)?;

        let jpeg = canvas.encode_sync()?;
        assert!(!jpeg.is_empty());
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!(decode_dimensions(&jpeg), (4, 4));
        Ok(())
    }

    #[test]
    fn same_color_in_every_format_gives_same_pixels() -> StackResult<()> {
        let expected = [10u8, 20, 30].repeat(4);
        let inputs = [
            (PixelFormat::Rgb, vec![10u8, 20, 30]),
            (PixelFormat::Bgr, vec![30, 20, 10]),
            (PixelFormat::Rgba, vec![10, 20, 30, 255]),
            (PixelFormat::Bgra, vec![30, 20, 10, 0]),
        ];
        for (format, pixel) in inputs {
            let mut canvas = FixedCanvas::new(2, 2, format)?;
            canvas.push(&pixel.repeat(4), 0, 0, 2, 2)?;
            assert_eq!(canvas.as_rgb_bytes(), expected.as_slice(), "{format}");
        }
        Ok(())
    }

    #[test]
    fn rejected_push_leaves_canvas_untouched() -> StackResult<()> {
        let mut canvas = FixedCanvas::new(4, 4, PixelFormat::Rgb)?;
        let patch = vec![0xAB; 5 * 3];
        let err = canvas.push(&patch, 0, 0, 5, 1).unwrap_err();
        assert!(matches!(err, StackError::OutOfRange { argument: "width", .. }));
        assert!(canvas.as_rgb_bytes().iter().all(|b| *b == 0));

        canvas.push(&patch[..4 * 3], 0, 3, 4, 1)?;
        assert_eq!(canvas.as_rgb_bytes()[3 * 4 * 3], 0xAB);
        Ok(())
    }

    #[test]
    fn quality_out_of_range_keeps_previous_value() -> StackResult<()> {
        let mut canvas = FixedCanvas::new(1, 1, PixelFormat::Rgb)?;
        canvas.set_quality(90)?;
        assert!(canvas.set_quality(101).is_err());
        assert!(canvas.set_quality(-1).is_err());
        assert_eq!(canvas.quality(), 90);
        Ok(())
    }

    #[test]
    fn empty_canvas_fails_to_encode() -> StackResult<()> {
        let canvas = FixedCanvas::new(0, 0, PixelFormat::Rgb)?;
        let err = canvas.encode_sync().unwrap_err();
        assert!(matches!(err, StackError::Encode(_)));
        Ok(())
    }

    #[test]
    fn async_encode_ignores_later_pushes() -> StackResult<()> {
        let executor = executor();
        let mut canvas = FixedCanvas::new(8, 8, PixelFormat::Rgb)?;
        let expected = canvas.encode_sync()?;

        let result = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&result);
        let ticket = canvas.encode_async(executor.spawner(), move |jpeg| {
            *slot.lock().unwrap() = Some(jpeg);
        });
        canvas.push(&vec![255; 8 * 8 * 3], 0, 0, 8, 8)?;

        assert_eq!(executor.drain(), 1);
        assert!(ticket.is_finished());
        let jpeg = result.lock().unwrap().take().expect("handler ran")?;
        assert_eq!(jpeg, expected);
        Ok(())
    }

    #[test]
    fn async_failure_reaches_the_handler() -> StackResult<()> {
        let executor = executor();
        let canvas = FixedCanvas::new(0, 0, PixelFormat::Rgb)?;
        let failed = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&failed);
        canvas.encode_async(executor.spawner(), move |result| {
            *flag.lock().unwrap() = matches!(result, Err(StackError::Encode(_)));
        });
        executor.drain();
        assert!(*failed.lock().unwrap());
        Ok(())
    }

    #[test]
    fn concurrent_schedules_both_complete() -> StackResult<()> {
        let executor = executor();
        let mut canvas = FixedCanvas::new(16, 16, PixelFormat::Bgra)?;
        let gradient: Vec<u8> = (0..16 * 16)
            .flat_map(|i| [(i % 256) as u8, (i / 16 * 16) as u8, 128, 255])
            .collect();
        canvas.push(&gradient, 0, 0, 16, 16)?;
        let expected = canvas.encode_sync()?;

        let results = Arc::new(Mutex::new(Vec::new()));
        std::thread::scope(|scope| {
            for _ in 0..2 {
                let spawner = executor.spawner().clone();
                let results = Arc::clone(&results);
                let canvas = &canvas;
                scope.spawn(move || {
                    canvas.encode_async(&spawner, move |jpeg| {
                        results.lock().unwrap().push(jpeg);
                    });
                });
            }
        });

        assert_eq!(executor.drain(), 2);
        let results = std::mem::take(&mut *results.lock().unwrap());
        assert_eq!(results.len(), 2);
        for jpeg in results {
            let jpeg = jpeg?;
            assert_eq!(decode_dimensions(&jpeg), (16, 16));
            assert_eq!(jpeg, expected);
        }
        Ok(())
    }
}
