//! JPEG compression of a borrowed pixel buffer.
//!
//! [`Encoder`] never owns the pixels it reads. It converts (and crops)
//! them into canonical RGB when the input is not already a full RGB
//! frame, applies the optional smoothing prefilter, then hands the result
//! to the baseline JPEG encoder from the `image` crate.

mod smoothing;

use std::borrow::Cow;

use anyhow::Context;
use image::codecs::jpeg::JpegEncoder;

use crate::buffer::try_alloc_zeroed;
use crate::convert::{self, CANONICAL_BYTES_PER_PIXEL, PixelFormat, SurfaceLayout};
use crate::error::{StackError, StackResult};
use crate::rect::Rect;

/// Quality used when the caller never sets one.
pub const DEFAULT_QUALITY: u8 = 60;

/// Largest edge length a baseline JPEG frame header can carry.
pub const MAX_JPEG_DIMENSION: usize = 65_535;

/// Check that `value` is a percentage in `[0, 100]`.
pub(crate) fn validate_percent(argument: &'static str, value: i32) -> StackResult<u8> {
    if value < 0 {
        return Err(StackError::out_of_range(
            argument,
            format!("must be greater than or equal to 0, got {value}"),
        ));
    }
    if value > 100 {
        return Err(StackError::out_of_range(
            argument,
            format!("must be less than or equal to 100, got {value}"),
        ));
    }
    Ok(value as u8)
}

/// Compression knobs shared by every encode entry point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncodeParams {
    quality: u8,
    smoothing: u8,
}

impl EncodeParams {
    pub fn new(quality: i32, smoothing: i32) -> StackResult<Self> {
        Ok(Self {
            quality: validate_percent("quality", quality)?,
            smoothing: validate_percent("smoothing", smoothing)?,
        })
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn smoothing(&self) -> u8 {
        self.smoothing
    }

    pub fn set_quality(&mut self, quality: i32) -> StackResult<()> {
        self.quality = validate_percent("quality", quality)?;
        Ok(())
    }

    pub fn set_smoothing(&mut self, smoothing: i32) -> StackResult<()> {
        self.smoothing = validate_percent("smoothing", smoothing)?;
        Ok(())
    }
}

impl Default for EncodeParams {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
            smoothing: 0,
        }
    }
}

/// One-frame JPEG encoder over a borrowed, tightly packed pixel buffer.
pub struct Encoder<'a> {
    data: &'a [u8],
    format: PixelFormat,
    width: usize,
    height: usize,
    params: EncodeParams,
    rect: Rect,
    jpeg: Option<Vec<u8>>,
}

impl<'a> Encoder<'a> {
    pub fn new(data: &'a [u8], width: usize, height: usize, format: PixelFormat) -> StackResult<Self> {
        let expected = format.buffer_len(width, height)?;
        if data.len() < expected {
            return Err(StackError::InvalidArgument(format!(
                "{format} buffer too small for {width}x{height}: got {} bytes, need {expected}",
                data.len()
            )));
        }
        let rect = Rect::full(dimension_to_i32("width", width)?, dimension_to_i32("height", height)?);
        Ok(Self {
            data,
            format,
            width,
            height,
            params: EncodeParams::default(),
            rect,
            jpeg: None,
        })
    }

    pub fn with_params(mut self, params: EncodeParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_rect(mut self, rect: Rect) -> StackResult<Self> {
        self.set_rect(rect)?;
        Ok(self)
    }

    pub fn params(&self) -> EncodeParams {
        self.params
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn set_quality(&mut self, quality: i32) -> StackResult<()> {
        self.params.set_quality(quality)
    }

    pub fn set_smoothing(&mut self, smoothing: i32) -> StackResult<()> {
        self.params.set_smoothing(smoothing)
    }

    /// Restrict encoding to `rect`, which must lie inside the frame.
    pub fn set_rect(&mut self, rect: Rect) -> StackResult<()> {
        if rect.x < 0 || rect.y < 0 {
            return Err(StackError::out_of_range(
                "rect",
                format!("origin ({}, {}) must not be negative", rect.x, rect.y),
            ));
        }
        if rect.width < 0 || rect.height < 0 {
            return Err(StackError::out_of_range(
                "rect",
                format!("size {}x{} must not be negative", rect.width, rect.height),
            ));
        }
        if rect.right() > self.width as i64 || rect.bottom() > self.height as i64 {
            return Err(StackError::out_of_range(
                "rect",
                format!(
                    "{}x{}+{}+{} exceeds the {}x{} frame",
                    rect.width, rect.height, rect.x, rect.y, self.width, self.height
                ),
            ));
        }
        self.rect = rect;
        Ok(())
    }

    /// Compress the selected region. On success the output is available
    /// through [`jpeg`](Self::jpeg) until the next call.
    pub fn encode(&mut self) -> StackResult<()> {
        self.jpeg = None;
        let width = self.rect.width as usize;
        let height = self.rect.height as usize;
        check_jpeg_dimensions(width, height)?;

        let rgb = self.region_rgb()?;
        let rgb = if self.params.smoothing > 0 {
            Cow::Owned(smoothing::smooth_rgb(&rgb, width, height, self.params.smoothing)?)
        } else {
            rgb
        };

        self.jpeg = Some(compress_rgb(&rgb, width, height, self.params.quality)?);
        Ok(())
    }

    /// Compressed bytes from the last successful [`encode`](Self::encode).
    pub fn jpeg(&self) -> Option<&[u8]> {
        self.jpeg.as_deref()
    }

    pub fn jpeg_len(&self) -> usize {
        self.jpeg.as_ref().map_or(0, Vec::len)
    }

    pub fn into_jpeg(self) -> Option<Vec<u8>> {
        self.jpeg
    }

    fn region_rgb(&self) -> StackResult<Cow<'a, [u8]>> {
        let full = self.rect == Rect::full(self.width as i32, self.height as i32);
        if full && self.format == PixelFormat::Rgb {
            let len = PixelFormat::Rgb.buffer_len(self.width, self.height)?;
            return Ok(Cow::Borrowed(&self.data[..len]));
        }

        let width = self.rect.width as usize;
        let height = self.rect.height as usize;
        let bpp = self.format.bytes_per_pixel();
        let mut out = try_alloc_zeroed(PixelFormat::Rgb.buffer_len(width, height)?)?;
        let src_start = (self.rect.y as usize * self.width + self.rect.x as usize) * bpp;
        let layout = SurfaceLayout {
            src_pitch: self.width * bpp,
            dst_pitch: width * CANONICAL_BYTES_PER_PIXEL,
            width,
            height,
        };
        convert::convert_surface(self.format, &self.data[src_start..], &mut out, layout);
        Ok(Cow::Owned(out))
    }
}

fn dimension_to_i32(argument: &'static str, value: usize) -> StackResult<i32> {
    i32::try_from(value)
        .map_err(|_| StackError::out_of_range(argument, format!("{value} does not fit in i32")))
}

fn check_jpeg_dimensions(width: usize, height: usize) -> StackResult<()> {
    if width == 0 || height == 0 {
        return Err(StackError::encode(format!(
            "image dimensions must be non-zero, got {width}x{height}"
        )));
    }
    if width > MAX_JPEG_DIMENSION || height > MAX_JPEG_DIMENSION {
        return Err(StackError::encode(format!(
            "image dimensions {width}x{height} exceed the JPEG limit of {MAX_JPEG_DIMENSION}"
        )));
    }
    Ok(())
}

/// Baseline JPEG compression of a tightly packed canonical RGB buffer.
pub(crate) fn compress_rgb(rgb: &[u8], width: usize, height: usize, quality: u8) -> StackResult<Vec<u8>> {
    check_jpeg_dimensions(width, height)?;
    // libjpeg treats quality 0 as 1.
    let quality = quality.clamp(1, 100);
    let mut out = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut out, quality);
        encoder
            .encode(rgb, width as u32, height as u32, image::ColorType::Rgb8)
            .with_context(|| format!("compressing {width}x{height} RGB frame at quality {quality}"))
            .map_err(StackError::Encode)?;
    }
    Ok(out)
}
