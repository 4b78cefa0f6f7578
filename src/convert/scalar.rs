//! Row kernels. Each converts one row of `src` pixels into canonical RGB
//! in `dst`; both slices hold exactly the row's pixels.

#[inline]
pub(crate) fn copy_rgb_row(src: &[u8], dst: &mut [u8]) {
    dst.copy_from_slice(src);
}

#[inline]
pub(crate) fn swap_bgr_row(src: &[u8], dst: &mut [u8]) {
    for (out, px) in dst.chunks_exact_mut(3).zip(src.chunks_exact(3)) {
        out[0] = px[2];
        out[1] = px[1];
        out[2] = px[0];
    }
}

#[inline]
pub(crate) fn strip_rgba_row(src: &[u8], dst: &mut [u8]) {
    for (out, px) in dst.chunks_exact_mut(3).zip(src.chunks_exact(4)) {
        out.copy_from_slice(&px[..3]);
    }
}

#[inline]
pub(crate) fn swap_strip_bgra_row(src: &[u8], dst: &mut [u8]) {
    for (out, px) in dst.chunks_exact_mut(3).zip(src.chunks_exact(4)) {
        out[0] = px[2];
        out[1] = px[1];
        out[2] = px[0];
    }
}
