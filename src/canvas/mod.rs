//! Persistent canvases that accept incremental pushes and encode to JPEG.

mod dynamic;
mod fixed;

pub use dynamic::{DynamicCanvas, DynamicEncoded};
pub use fixed::FixedCanvas;

use crate::buffer::PixelBuffer;
use crate::convert::PixelFormat;
use crate::encoder::{EncodeParams, Encoder};
use crate::error::{StackError, StackResult};
use crate::rect::Rect;

/// A push rectangle that passed validation against the canvas bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct PushRegion {
    pub(crate) x: usize,
    pub(crate) y: usize,
    pub(crate) width: usize,
    pub(crate) height: usize,
}

fn non_negative(argument: &'static str, value: i32) -> StackResult<usize> {
    usize::try_from(value)
        .map_err(|_| StackError::out_of_range(argument, format!("must be >= 0, got {value}")))
}

/// Check `(x, y, width, height)` against a `canvas_width` x `canvas_height`
/// canvas. The first violated bound is named in the error.
pub(crate) fn validate_push(
    canvas_width: usize,
    canvas_height: usize,
    x: i32,
    y: i32,
    width: i32,
    height: i32,
) -> StackResult<PushRegion> {
    let x = non_negative("x", x)?;
    let y = non_negative("y", y)?;
    let width = non_negative("width", width)?;
    let height = non_negative("height", height)?;

    if x >= canvas_width {
        return Err(StackError::out_of_range(
            "x",
            format!("must be < canvas width {canvas_width}, got {x}"),
        ));
    }
    if y >= canvas_height {
        return Err(StackError::out_of_range(
            "y",
            format!("must be < canvas height {canvas_height}, got {y}"),
        ));
    }
    if x + width > canvas_width {
        return Err(StackError::out_of_range(
            "width",
            format!("x + width must be <= canvas width {canvas_width}, got {}", x + width),
        ));
    }
    if y + height > canvas_height {
        return Err(StackError::out_of_range(
            "height",
            format!("y + height must be <= canvas height {canvas_height}, got {}", y + height),
        ));
    }

    Ok(PushRegion {
        x,
        y,
        width,
        height,
    })
}

/// Reject a source buffer shorter than a packed `width` x `height` frame.
pub(crate) fn validate_source(
    format: PixelFormat,
    data: &[u8],
    width: usize,
    height: usize,
) -> StackResult<()> {
    let expected = format.buffer_len(width, height)?;
    if data.len() < expected {
        return Err(StackError::InvalidArgument(format!(
            "{format} buffer too small for a {width}x{height} push: got {} bytes, need {expected}",
            data.len()
        )));
    }
    Ok(())
}

pub(crate) fn validate_size(width: i32, height: i32) -> StackResult<(usize, usize)> {
    Ok((non_negative("width", width)?, non_negative("height", height)?))
}

/// Encode `rect` of a canonical RGB buffer. Shared by the synchronous and
/// background paths so both produce identical bytes.
pub(crate) fn encode_region(
    pixels: &PixelBuffer,
    rect: Rect,
    params: EncodeParams,
) -> StackResult<Vec<u8>> {
    let mut encoder = Encoder::new(
        pixels.as_rgb_bytes(),
        pixels.width(),
        pixels.height(),
        PixelFormat::Rgb,
    )?
    .with_params(params)
    .with_rect(rect)?;
    encoder.encode()?;
    encoder
        .into_jpeg()
        .ok_or_else(|| StackError::encode("encoder finished without output"))
}
