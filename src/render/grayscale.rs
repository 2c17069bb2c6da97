//! Single-channel SNR pictures.

use image::{GrayImage, Luma};
use ndarray::ArrayView2;

use super::SnrScale;
use super::spectrum::power_to_db;
use crate::compress::{EncodingError, average_rows};

/// Render `power` frames as an SNR picture.
///
/// Each frame is converted to dB above `noise_db`, then runs of
/// `frames_per_line` frames are averaged (mean of dB) into one line. The
/// latest line is the top row.
pub(crate) fn render_grayscale(
    power: ArrayView2<'_, f32>,
    frames_per_line: usize,
    noise_db: f32,
    scale: SnrScale,
) -> Result<GrayImage, EncodingError> {
    let snr = power.mapv(|p| power_to_db(p) - noise_db);
    let lines = average_rows(snr.view(), frames_per_line)?;
    let (height, width) = lines.dim();
    let mut image = GrayImage::new(width as u32, height as u32);
    for (line, row) in lines.outer_iter().enumerate() {
        let y = (height - 1 - line) as u32;
        for (x, &value) in row.iter().enumerate() {
            image.put_pixel(x as u32, y, Luma([scale.pixel(value)]));
        }
    }
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn lines_average_frames_and_flip() {
        // Frames 0..2 at 20 dB above noise, frames 2..4 at the noise floor.
        let mut power = Array2::<f32>::from_elem((4, 3), 1e-3);
        power.slice_mut(ndarray::s![2.., ..]).fill(1e-5);
        let scale = SnrScale::new(-10.0, 50.0);
        let image = render_grayscale(power.view(), 2, -50.0, scale).unwrap();
        assert_eq!(image.dimensions(), (3, 2));
        // Earliest line (20 dB) is the bottom row.
        assert_eq!(image.get_pixel(0, 1)[0], scale.pixel(20.0));
        assert_eq!(image.get_pixel(0, 0)[0], scale.pixel(0.0));
    }
}
