//! Headerless `.32fc` sample files: little-endian `f32` real/imaginary pairs.

use rustfft::num_complex::Complex32;

/// Bytes per complex sample.
pub const BYTES_PER_SAMPLE: usize = 8;

/// Decode complex samples. A trailing partial sample is ignored.
pub fn decode_iq(bytes: &[u8]) -> Vec<Complex32> {
    bytes
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|chunk| {
            let re = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            let im = f32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]);
            Complex32::new(re, im)
        })
        .collect()
}

pub fn encode_iq(samples: &[Complex32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * BYTES_PER_SAMPLE);
    for sample in samples {
        bytes.extend_from_slice(&sample.re.to_le_bytes());
        bytes.extend_from_slice(&sample.im.to_le_bytes());
    }
    bytes
}

/// Sample count implied by a file size.
pub fn sample_count(file_size_bytes: u64) -> u64 {
    file_size_bytes / BYTES_PER_SAMPLE as u64
}
