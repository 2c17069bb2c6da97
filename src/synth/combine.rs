use rustfft::num_complex::Complex32;

use super::CombineError;
use super::plan::CombinePlan;

/// Build output samples from `plan`; `sources` pairs positionally with its placements.
///
/// Sources are summed as complex values without clipping.
pub fn apply_plan(plan: &CombinePlan, sources: &[&[Complex32]]) -> Result<Vec<Complex32>, CombineError> {
    if sources.len() != plan.placements.len() {
        return Err(CombineError::ArgumentMismatch(format!(
            "plan places {} sources but {} were given",
            plan.placements.len(),
            sources.len()
        )));
    }
    let output_len = usize::try_from(plan.output_len)
        .map_err(|_| CombineError::InvalidRange(format!("output length {} too large", plan.output_len)))?;
    let mut output = vec![Complex32::default(); output_len];
    for (placement, samples) in plan.placements.iter().zip(sources) {
        let crop_end = placement.crop_start + placement.crop_len;
        if crop_end > samples.len() as u64 {
            return Err(CombineError::InvalidRange(format!(
                "{} has {} samples but the plan reads up to {crop_end}",
                placement.source,
                samples.len()
            )));
        }
        let amplitude = placement.amplitude();
        let source = &samples[placement.crop_start as usize..crop_end as usize];
        let offset = placement.offset as usize;
        if offset >= output_len {
            continue;
        }
        for (slot, sample) in output[offset..].iter_mut().zip(source) {
            *slot += *sample * amplitude;
        }
    }
    Ok(output)
}

/// Hex blake3 digest of the sample file bytes.
pub fn samples_digest(samples: &[Complex32]) -> String {
    let mut hasher = blake3::Hasher::new();
    for sample in samples {
        hasher.update(&sample.re.to_le_bytes());
        hasher.update(&sample.im.to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}
