//! Three-channel compressed pictures: red holds the block maximum, green the
//! block minimum and blue the block mean.

use image::{Rgb, RgbImage};
use ndarray::{Array2, ArrayView2};

use super::SnrScale;
use super::spectrum::power_to_db;
use crate::compress::{CompressionFactors, EncodingError, compress};

pub(crate) fn render_compressed(
    power: ArrayView2<'_, f32>,
    factors: CompressionFactors,
    noise_db: f32,
    scale: SnrScale,
) -> Result<RgbImage, EncodingError> {
    let blocks = compress(power, factors)?;
    let (height, width) = blocks.dim();
    // Whole dB steps, truncated toward zero.
    let to_snr = |grid: &Array2<f32>| grid.mapv(|p| (power_to_db(p) - noise_db).trunc());
    let (max, min, mean) = (to_snr(&blocks.max), to_snr(&blocks.min), to_snr(&blocks.mean));
    let mut image = RgbImage::new(width as u32, height as u32);
    for line in 0..height {
        let y = (height - 1 - line) as u32;
        for x in 0..width {
            let pixel = Rgb([
                scale.pixel(max[[line, x]]),
                scale.pixel(min[[line, x]]),
                scale.pixel(mean[[line, x]]),
            ]);
            image.put_pixel(x as u32, y, pixel);
        }
    }
    Ok(image)
}
