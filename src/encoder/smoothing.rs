//! 3x3 smoothing prefilter with libjpeg's weighting.
//!
//! Each sample becomes `(1 - 8*SF) * self + SF * (sum of 8 neighbours)`
//! with `SF = factor / 1024`, computed in 16.16 fixed point. Edge rows and
//! columns are replicated.

use rayon::prelude::*;

use crate::buffer::try_alloc_zeroed;
use crate::error::StackResult;

pub(crate) fn smooth_rgb(
    src: &[u8],
    width: usize,
    height: usize,
    factor: u8,
) -> StackResult<Vec<u8>> {
    let mut out = try_alloc_zeroed(src.len())?;
    if width == 0 || height == 0 || factor == 0 {
        out.copy_from_slice(src);
        return Ok(out);
    }

    let sf = i64::from(factor);
    let member_scale = 65_536 - sf * 512;
    let neighbour_scale = sf * 64;
    let stride = width * 3;

    out.par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, out_row)| {
            let above = &src[y.saturating_sub(1) * stride..][..stride];
            let row = &src[y * stride..][..stride];
            let below = &src[(y + 1).min(height - 1) * stride..][..stride];

            for x in 0..width {
                let left = x.saturating_sub(1);
                let right = (x + 1).min(width - 1);
                for c in 0..3 {
                    let column = |i: usize| {
                        i64::from(above[i * 3 + c])
                            + i64::from(row[i * 3 + c])
                            + i64::from(below[i * 3 + c])
                    };
                    let member = i64::from(row[x * 3 + c]);
                    let neighbours = column(left) + (column(x) - member) + column(right);
                    let value = (member * member_scale + neighbours * neighbour_scale + 32_768) >> 16;
                    out_row[x * 3 + c] = value.clamp(0, 255) as u8;
                }
            }
        });

    Ok(out)
}
