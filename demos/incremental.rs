use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use jpeg_stack::{DynamicCanvas, EncodeExecutor, PixelFormat};

const WIDTH: i32 = 1920;
const HEIGHT: i32 = 1080;
const TILE: i32 = 64;

fn main() -> Result<()> {
    env_logger::init();

    let executor = EncodeExecutor::new().context("failed to start encode workers")?;
    let mut canvas = DynamicCanvas::new(PixelFormat::Rgba);
    canvas.set_solid_background(WIDTH, HEIGHT, [16, 16, 24])?;
    canvas.set_quality(75)?;

    let encoded_bytes = Arc::new(AtomicU64::new(0));
    let tile_count = (TILE * TILE) as usize;
    let start = Instant::now();

    println!("Updating {WIDTH}x{HEIGHT} canvas in {TILE}x{TILE} tiles...");

    for frame in 0..120i32 {
        // A tile sweeping left to right plus a fixed status tile.
        let x = (frame * 16) % (WIDTH - TILE);
        let shade = (frame * 2 % 256) as u8;
        canvas.push(&[shade, 255 - shade, 96, 255].repeat(tile_count), x, 200, TILE, TILE)?;
        canvas.push(&[255, 255, 255, 255].repeat(tile_count), 0, 0, TILE, TILE)?;

        let total = Arc::clone(&encoded_bytes);
        canvas.encode_async(executor.spawner(), move |result| match result {
            Ok(encoded) => {
                total.fetch_add(encoded.jpeg.len() as u64, Ordering::Relaxed);
                if frame % 30 == 0 {
                    let r = encoded.rect;
                    println!(
                        "  frame #{frame}: {}x{}+{}+{} -> {} bytes",
                        r.width,
                        r.height,
                        r.x,
                        r.y,
                        encoded.jpeg.len()
                    );
                }
            }
            Err(e) => eprintln!("  frame #{frame}: encode failed: {e}"),
        })?;
        canvas.reset();

        executor.dispatch_pending();
    }

    while executor.pending() > 0 {
        if !executor.wait_one_timeout(Duration::from_secs(5)) {
            anyhow::bail!("timed out waiting for {} encodes", executor.pending());
        }
    }

    let stats = executor.stats();
    println!(
        "Done in {:.1} ms: {} scheduled, {} completed, {} failed, {} bytes total",
        start.elapsed().as_secs_f64() * 1000.0,
        stats.scheduled,
        stats.completed,
        stats.failed,
        encoded_bytes.load(Ordering::Relaxed)
    );
    Ok(())
}
