use std::sync::OnceLock;

use crate::env_config::{DISABLE_PARALLEL_CONVERT_VAR, define_env_flag};

define_env_flag!(enabled_unless(parallel_convert_enabled, DISABLE_PARALLEL_CONVERT_VAR));

/// Row chunks handed to rayon are never smaller than this many pixels.
const PARALLEL_CHUNK_ALIGNMENT_PIXELS: usize = 256;

#[inline(always)]
pub(crate) fn should_parallelize(
    pixel_count: usize,
    min_pixels: usize,
    min_chunk_pixels: usize,
    max_workers: usize,
) -> bool {
    if !parallel_convert_enabled() {
        return false;
    }
    let workers = conversion_workers(max_workers);
    if workers <= 1 {
        return false;
    }
    let min_chunk_total = min_chunk_pixels.saturating_mul(workers);
    pixel_count >= min_pixels.max(min_chunk_total)
}

/// Rows per parallel chunk for a `width`-pixel wide rectangle, or `None`
/// when splitting would produce fewer than two chunks.
#[inline]
pub(crate) fn parallel_chunk_rows(
    width: usize,
    height: usize,
    min_chunk_pixels: usize,
    max_workers: usize,
) -> Option<usize> {
    if width == 0 || height < 2 {
        return None;
    }
    let pixel_count = width.checked_mul(height)?;
    let workers = conversion_workers(max_workers);
    let mut chunk_pixels = pixel_count / workers;
    if chunk_pixels < min_chunk_pixels {
        return None;
    }

    chunk_pixels -= chunk_pixels % PARALLEL_CHUNK_ALIGNMENT_PIXELS;
    let chunk_rows = (chunk_pixels / width).max(1);
    if height.div_ceil(chunk_rows) < 2 {
        return None;
    }
    Some(chunk_rows)
}

#[inline]
pub(crate) fn conversion_workers(max_workers: usize) -> usize {
    static WORKERS: OnceLock<usize> = OnceLock::new();
    (*WORKERS.get_or_init(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }))
    .min(max_workers.max(1))
}

/// Run `job` inside the dedicated conversion pool, or inline when the
/// machine has a single core or the pool could not be built.
#[inline]
pub(crate) fn install_conversion_pool<F>(max_workers: usize, job: F)
where
    F: FnOnce() + Send,
{
    static POOL: OnceLock<Option<rayon::ThreadPool>> = OnceLock::new();
    if let Some(pool) = POOL
        .get_or_init(|| {
            let workers = conversion_workers(max_workers);
            if workers <= 1 {
                return None;
            }
            rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .thread_name(|idx| format!("jpeg-stack-convert-{idx}"))
                .build()
                .ok()
        })
        .as_ref()
    {
        pool.install(job);
    } else {
        job();
    }
}
