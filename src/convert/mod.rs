//! Pixel-format conversion into the canonical 3-channel RGB layout.
//!
//! Callers describe source and destination with a [`SurfaceLayout`]
//! (row pitches plus the rectangle size) and hand over slices that start
//! at the first pixel of the rectangle. Bounds are the caller's job: the
//! canvas and encoder validate every rectangle before it gets here, so
//! the kernels only carry debug assertions.

mod parallel;
mod scalar;

use std::fmt;
use std::str::FromStr;

use parallel::{install_conversion_pool, parallel_chunk_rows, should_parallelize};

use crate::error::{StackError, StackResult};

/// Bytes per pixel of the canonical canvas layout.
pub const CANONICAL_BYTES_PER_PIXEL: usize = 3;

const SWIZZLE_PARALLEL_MIN_PIXELS: usize = 262_144;
const SWIZZLE_PARALLEL_MIN_CHUNK_PIXELS: usize = 65_536;
const SWIZZLE_PARALLEL_MAX_WORKERS: usize = 8;

/// Channel layout of an input buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    #[default]
    Rgb,
    Bgr,
    Rgba,
    Bgra,
}

impl PixelFormat {
    pub const ALL: [PixelFormat; 4] = [Self::Rgb, Self::Bgr, Self::Rgba, Self::Bgra];

    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgb | Self::Bgr => 3,
            Self::Rgba | Self::Bgra => 4,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rgb => "rgb",
            Self::Bgr => "bgr",
            Self::Rgba => "rgba",
            Self::Bgra => "bgra",
        }
    }

    /// Bytes a tightly packed `width` x `height` buffer in this format needs.
    pub fn buffer_len(self, width: usize, height: usize) -> StackResult<usize> {
        width
            .checked_mul(height)
            .and_then(|px| px.checked_mul(self.bytes_per_pixel()))
            .ok_or(StackError::BufferOverflow)
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PixelFormat {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rgb" => Ok(Self::Rgb),
            "bgr" => Ok(Self::Bgr),
            "rgba" => Ok(Self::Rgba),
            "bgra" => Ok(Self::Bgra),
            other => Err(StackError::InvalidArgument(format!(
                "buffer type must be 'rgb', 'bgr', 'rgba' or 'bgra', got '{other}'"
            ))),
        }
    }
}

type RowKernel = fn(&[u8], &mut [u8]);

#[derive(Clone, Copy)]
struct ParallelConfig {
    min_pixels: usize,
    min_chunk_pixels: usize,
    max_workers: usize,
}

#[derive(Clone, Copy)]
struct FormatPlan {
    src_bytes_per_pixel: usize,
    kernel: RowKernel,
    parallel: ParallelConfig,
}

fn format_plan(format: PixelFormat) -> FormatPlan {
    let swizzle_parallel = ParallelConfig {
        min_pixels: SWIZZLE_PARALLEL_MIN_PIXELS,
        min_chunk_pixels: SWIZZLE_PARALLEL_MIN_CHUNK_PIXELS,
        max_workers: SWIZZLE_PARALLEL_MAX_WORKERS,
    };
    match format {
        PixelFormat::Rgb => FormatPlan {
            src_bytes_per_pixel: 3,
            kernel: scalar::copy_rgb_row,
            parallel: ParallelConfig {
                min_pixels: usize::MAX, // never parallelise a plain memcpy
                min_chunk_pixels: usize::MAX,
                max_workers: 1,
            },
        },
        PixelFormat::Bgr => FormatPlan {
            src_bytes_per_pixel: 3,
            kernel: scalar::swap_bgr_row,
            parallel: swizzle_parallel,
        },
        PixelFormat::Rgba => FormatPlan {
            src_bytes_per_pixel: 4,
            kernel: scalar::strip_rgba_row,
            parallel: swizzle_parallel,
        },
        PixelFormat::Bgra => FormatPlan {
            src_bytes_per_pixel: 4,
            kernel: scalar::swap_strip_bgra_row,
            parallel: swizzle_parallel,
        },
    }
}

/// Geometry of one conversion: the rectangle size and the byte distance
/// between consecutive rows in source and destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct SurfaceLayout {
    pub(crate) src_pitch: usize,
    pub(crate) dst_pitch: usize,
    pub(crate) width: usize,
    pub(crate) height: usize,
}

impl SurfaceLayout {
    /// Tightly packed source rectangle written into a canvas whose rows
    /// are `canvas_width` pixels wide.
    pub(crate) fn packed_into_canvas(
        format: PixelFormat,
        width: usize,
        height: usize,
        canvas_width: usize,
    ) -> Self {
        Self {
            src_pitch: width * format.bytes_per_pixel(),
            dst_pitch: canvas_width * CANONICAL_BYTES_PER_PIXEL,
            width,
            height,
        }
    }

    fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    fn is_contiguous(self, src_row_bytes: usize, dst_row_bytes: usize) -> bool {
        self.src_pitch == src_row_bytes && self.dst_pitch == dst_row_bytes
    }
}

/// Canonical RGB offset of pixel `(x, y)` in a canvas `canvas_width` wide.
#[inline]
pub(crate) fn canonical_offset(x: usize, y: usize, canvas_width: usize) -> usize {
    (y * canvas_width + x) * CANONICAL_BYTES_PER_PIXEL
}

/// Convert the rectangle described by `layout` from `src` into `dst`.
///
/// `src` starts at the rectangle's first source pixel and `dst` at the
/// first destination pixel. Only the rectangle's bytes in `dst` change.
pub(crate) fn convert_surface(
    format: PixelFormat,
    src: &[u8],
    dst: &mut [u8],
    layout: SurfaceLayout,
) {
    if layout.is_empty() {
        return;
    }

    let plan = format_plan(format);
    let src_row_bytes = layout.width * plan.src_bytes_per_pixel;
    let dst_row_bytes = layout.width * CANONICAL_BYTES_PER_PIXEL;
    debug_assert!(layout.src_pitch >= src_row_bytes);
    debug_assert!(layout.dst_pitch >= dst_row_bytes);
    debug_assert!(src.len() >= (layout.height - 1) * layout.src_pitch + src_row_bytes);
    debug_assert!(dst.len() >= (layout.height - 1) * layout.dst_pitch + dst_row_bytes);

    let total_pixels = layout.width * layout.height;
    let chunk_rows = if should_parallelize(
        total_pixels,
        plan.parallel.min_pixels,
        plan.parallel.min_chunk_pixels,
        plan.parallel.max_workers,
    ) {
        parallel_chunk_rows(
            layout.width,
            layout.height,
            plan.parallel.min_chunk_pixels,
            plan.parallel.max_workers,
        )
    } else {
        None
    };

    match chunk_rows {
        Some(chunk_rows) => {
            log::trace!(
                "converting {}x{} {format} rect in parallel, {chunk_rows} rows per chunk",
                layout.width,
                layout.height
            );
            run_rows_parallel(plan, src, dst, layout, chunk_rows);
        }
        None if layout.is_contiguous(src_row_bytes, dst_row_bytes) => {
            (plan.kernel)(
                &src[..src_row_bytes * layout.height],
                &mut dst[..dst_row_bytes * layout.height],
            );
        }
        None => run_rows_serial(plan, src, dst, layout),
    }
}

fn run_rows_serial(plan: FormatPlan, src: &[u8], dst: &mut [u8], layout: SurfaceLayout) {
    let src_row_bytes = layout.width * plan.src_bytes_per_pixel;
    let dst_row_bytes = layout.width * CANONICAL_BYTES_PER_PIXEL;
    for row in 0..layout.height {
        let src_start = row * layout.src_pitch;
        let dst_start = row * layout.dst_pitch;
        (plan.kernel)(
            &src[src_start..src_start + src_row_bytes],
            &mut dst[dst_start..dst_start + dst_row_bytes],
        );
    }
}

fn run_rows_parallel(
    plan: FormatPlan,
    src: &[u8],
    dst: &mut [u8],
    layout: SurfaceLayout,
    chunk_rows: usize,
) {
    use rayon::prelude::*;

    let src_row_bytes = layout.width * plan.src_bytes_per_pixel;
    let dst_row_bytes = layout.width * CANONICAL_BYTES_PER_PIXEL;
    install_conversion_pool(plan.parallel.max_workers, || {
        dst.par_chunks_mut(layout.dst_pitch)
            .take(layout.height)
            .enumerate()
            .with_min_len(chunk_rows)
            .for_each(|(row, dst_row)| {
                let src_start = row * layout.src_pitch;
                (plan.kernel)(
                    &src[src_start..src_start + src_row_bytes],
                    &mut dst_row[..dst_row_bytes],
                );
            });
    });
}

/// Write a tightly packed `width` x `height` source rectangle into a
/// canonical canvas buffer at `(x, y)`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn write_rect(
    format: PixelFormat,
    src: &[u8],
    canvas: &mut [u8],
    canvas_width: usize,
    x: usize,
    y: usize,
    width: usize,
    height: usize,
) {
    let layout = SurfaceLayout::packed_into_canvas(format, width, height, canvas_width);
    let start = canonical_offset(x, y, canvas_width);
    convert_surface(format, src, &mut canvas[start..], layout);
}

/// Convert a whole tightly packed frame into a new canonical RGB buffer.
pub fn convert_to_rgb(
    format: PixelFormat,
    src: &[u8],
    width: usize,
    height: usize,
) -> StackResult<Vec<u8>> {
    let expected = format.buffer_len(width, height)?;
    if src.len() < expected {
        return Err(StackError::InvalidArgument(format!(
            "{format} buffer too small for {width}x{height}: got {} bytes, need {expected}",
            src.len()
        )));
    }
    let len = PixelFormat::Rgb.buffer_len(width, height)?;
    let mut out = crate::buffer::try_alloc_zeroed(len)?;
    write_rect(format, src, &mut out, width, 0, 0, width, height);
    Ok(out)
}
