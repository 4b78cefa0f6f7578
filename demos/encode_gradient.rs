use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use jpeg_stack::{Jpeg, PixelFormat};

fn gradient_bgra(width: usize, height: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(width * height * 4);
    for y in 0..height {
        for x in 0..width {
            let r = (x * 255 / width.max(1)) as u8;
            let g = (y * 255 / height.max(1)) as u8;
            data.extend_from_slice(&[128, g, r, 255]);
        }
    }
    data
}

fn encode_to_file(quality: i32, smoothing: i32, output_path: &str) -> Result<()> {
    let (width, height) = (1280, 720);
    let mut jpeg = Jpeg::new(
        gradient_bgra(width, height),
        width as i32,
        height as i32,
        quality,
        PixelFormat::Bgra,
    )?;
    jpeg.set_smoothing(smoothing)?;

    let begin = Instant::now();
    let bytes = jpeg
        .encode_sync()
        .with_context(|| format!("failed to encode at quality {quality}"))?;
    let elapsed = begin.elapsed();

    std::fs::write(Path::new(output_path), &bytes)
        .with_context(|| format!("failed to write {output_path}"))?;
    println!(
        "q={quality} s={smoothing}: {} bytes in {:.3} ms -> {output_path}",
        bytes.len(),
        elapsed.as_secs_f64() * 1000.0
    );
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    encode_to_file(30, 0, "./gradient-q30.jpg")?;
    encode_to_file(60, 0, "./gradient-q60.jpg")?;
    encode_to_file(90, 0, "./gradient-q90.jpg")?;
    encode_to_file(90, 50, "./gradient-q90-smooth50.jpg")?;

    Ok(())
}
