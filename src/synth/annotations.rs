//! AnnotationSynthesizer: annotations of a synthetic recording from its plan.

use crate::recording::{Annotation, Emission};

use super::CombineError;
use super::plan::CombinePlan;

/// Annotation inputs of one plan source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceAnnotations {
    pub annotations: Vec<Annotation>,
    /// Emissions of the source, used when it has no annotations.
    pub emissions: Vec<Emission>,
}

/// Re-times source annotations with the decisions of a [`CombinePlan`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AnnotationSynthesizer;

impl AnnotationSynthesizer {
    /// Annotations of the output, ordered by source then by source annotation.
    ///
    /// Each annotation is clipped to the cropped part of its source, moved by
    /// the placement offset and clipped to the output. Annotations with nothing
    /// left are dropped. A source without annotations contributes one
    /// full-band annotation per emission spanning its placed samples.
    pub fn synthesize(
        &self,
        plan: &CombinePlan,
        sources: &[SourceAnnotations],
    ) -> Result<Vec<Annotation>, CombineError> {
        if sources.len() != plan.placements.len() {
            return Err(CombineError::ArgumentMismatch(format!(
                "plan places {} sources but annotations of {} were given",
                plan.placements.len(),
                sources.len()
            )));
        }
        let mut output = Vec::new();
        for (placement, source) in plan.placements.iter().zip(sources) {
            let crop_end = placement.crop_start + placement.crop_len;
            let adjust = |annotation: &Annotation| {
                let mut placed = annotation
                    .clipped(placement.crop_start, crop_end)?
                    .shifted(placement.shift())
                    .clipped(0, plan.output_len)?;
                placed.snr = placed.snr.map(|snr| snr + placement.snr_delta_db);
                Some(placed)
            };
            if source.annotations.is_empty() {
                let span = Annotation {
                    label: String::new(),
                    time_start: placement.crop_start,
                    time_end: crop_end,
                    freq_low: 0.0,
                    freq_high: 1.0,
                    snr: None,
                };
                output.extend(source.emissions.iter().filter_map(|emission| {
                    adjust(&Annotation {
                        label: emission.label.clone(),
                        snr: emission.snr_db,
                        ..span.clone()
                    })
                }));
            } else {
                output.extend(source.annotations.iter().filter_map(adjust));
            }
        }
        Ok(output)
    }
}
