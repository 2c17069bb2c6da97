use std::f32::consts::PI;
use std::sync::Arc;

use ndarray::Array2;
use rustfft::{Fft, FftPlanner, num_complex::Complex32};

/// Power below this is treated as this, keeping empty bins finite in dB.
pub(crate) const POWER_FLOOR: f32 = 1e-20;

/// 4-term Blackman-Harris window.
pub(crate) fn blackman_harris(length: usize) -> Vec<f32> {
    if length <= 1 {
        return vec![1.0_f32; length.max(1)];
    }
    const A: [f32; 4] = [0.35875, 0.48829, 0.14128, 0.01168];
    let denom = (length - 1) as f32;
    (0..length)
        .map(|n| {
            let phase = 2.0 * PI * n as f32 / denom;
            A[0] - A[1] * phase.cos() + A[2] * (2.0 * phase).cos() - A[3] * (3.0 * phase).cos()
        })
        .collect()
}

pub(crate) fn power_to_db(power: f32) -> f32 {
    10.0 * power.max(POWER_FLOOR).log10()
}

/// Windowed, frequency-shifted power spectra of consecutive sample frames.
pub(crate) struct Spectrogram {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    fft_size: usize,
}

impl Spectrogram {
    pub(crate) fn new(fft_size: usize) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        Self {
            fft: planner.plan_fft_forward(fft_size),
            window: blackman_harris(fft_size),
            fft_size,
        }
    }

    /// `frames` rows of linear power starting at sample `start`, lowest
    /// frequency in column 0. Samples past the end of `samples` count as zero.
    pub(crate) fn power_frames(&self, samples: &[Complex32], start: usize, frames: usize) -> Array2<f32> {
        let n = self.fft_size;
        let mut grid = Array2::<f32>::zeros((frames, n));
        let mut buffer = vec![Complex32::default(); n];
        let mut scratch = vec![Complex32::default(); self.fft.get_inplace_scratch_len()];
        for (frame, mut row) in grid.outer_iter_mut().enumerate() {
            let offset = start.saturating_add(frame * n);
            for (idx, slot) in buffer.iter_mut().enumerate() {
                let sample = samples.get(offset + idx).copied().unwrap_or_default();
                *slot = sample * self.window[idx];
            }
            self.fft.process_with_scratch(&mut buffer, &mut scratch);
            buffer.rotate_right(n / 2);
            for (cell, bin) in row.iter_mut().zip(buffer.iter()) {
                *cell = bin.norm_sqr();
            }
        }
        grid
    }
}
