//! Metadata of synthetic recordings.

use serde_json::Value;
use time::{OffsetDateTime, format_description::FormatItem, macros::format_description};

use crate::recording::{Emission, RecordingMetadata};

use super::CombineError;
use super::plan::{CombineKind, CombinePlan};

const DATE_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]_[hour]:[minute]:[second]");

/// Keys produced by synthesis rather than carried over from sources.
const SYNTHESIZED_KEYS: [&str; 12] = [
    "date_recorded",
    "classes",
    "snr",
    "noise_db",
    "combined_noise_db",
    "synthetic",
    "sources",
    "rec_name",
    "duration",
    "combination",
    "samples_blake3",
    "snr_range",
];

/// Source keys that describe a single capture and are not carried over.
const DROPPED_KEYS: [&str; 3] = ["freq_sweep", "no_of_pictures", "file_size"];

/// Inputs of [`synthetic_metadata`] besides the sources.
pub struct SyntheticFacts<'a> {
    pub name: &'a str,
    pub plan: &'a CombinePlan,
    pub emissions: &'a [Emission],
    pub sample_rate_hz: f64,
    pub samples_digest: String,
    pub recorded_at: OffsetDateTime,
}

/// Metadata of a synthetic recording built from `sources` (name, metadata)
/// in plan order.
///
/// A crop copies the descriptive fields of its source. A merge prefixes each
/// source value with the source classes, except `tx` which is joined as is.
pub fn synthetic_metadata(
    facts: &SyntheticFacts<'_>,
    sources: &[(&str, &RecordingMetadata)],
    noise_levels_db: &[f32],
) -> Result<RecordingMetadata, CombineError> {
    let mut metadata = match facts.plan.kind {
        CombineKind::Crop => sources
            .first()
            .map(|(_, source)| (*source).clone())
            .unwrap_or_default(),
        CombineKind::Merge => merged_descriptive_fields(sources),
    };
    for key in DROPPED_KEYS {
        metadata.remove(key);
    }
    metadata.remove("snr_range");

    let recorded_at = facts
        .recorded_at
        .format(DATE_FORMAT)
        .map_err(CombineError::Date)?;
    if facts.plan.kind == CombineKind::Merge || metadata.get("date_recorded").is_none() {
        metadata.insert("date_recorded", recorded_at);
    }
    metadata.set_emissions(facts.emissions);
    if facts.plan.kind == CombineKind::Merge {
        if let Some(reference) = noise_levels_db.first() {
            metadata.insert("noise_db", f64::from(*reference));
        }
        let combined = add_noise_levels(
            facts
                .plan
                .placements
                .iter()
                .zip(noise_levels_db)
                .map(|(placement, noise)| noise + placement.gain_db),
        );
        metadata.insert("combined_noise_db", f64::from(combined));
    }
    metadata.insert("synthetic", true);
    metadata.insert(
        "sources",
        sources
            .iter()
            .map(|(name, _)| *name)
            .collect::<Vec<_>>()
            .join(","),
    );
    metadata.insert("rec_name", facts.name);
    metadata.insert(
        "duration",
        facts.plan.output_len as f64 / facts.sample_rate_hz,
    );
    let plan = serde_json::to_value(facts.plan).map_err(|source| CombineError::Plan {
        name: facts.name.to_string(),
        source,
    })?;
    metadata.insert("combination", plan);
    metadata.insert("samples_blake3", facts.samples_digest.clone());
    Ok(metadata)
}

/// Stored plan of a synthetic recording.
pub fn stored_plan(name: &str, metadata: &RecordingMetadata) -> Result<CombinePlan, CombineError> {
    let value = metadata
        .get("combination")
        .cloned()
        .ok_or_else(|| CombineError::MissingPlan(name.to_string()))?;
    serde_json::from_value(value).map_err(|source| CombineError::Plan {
        name: name.to_string(),
        source,
    })
}

/// Power sum of noise levels, in dB.
pub fn add_noise_levels(levels_db: impl IntoIterator<Item = f32>) -> f32 {
    let total: f64 = levels_db
        .into_iter()
        .map(|level| 10f64.powf(f64::from(level) / 10.0))
        .sum();
    (10.0 * total.log10()) as f32
}

fn merged_descriptive_fields(sources: &[(&str, &RecordingMetadata)]) -> RecordingMetadata {
    let mut merged = RecordingMetadata::new();
    for (_, source) in sources {
        let classes = source.classes().join(",");
        for (key, value) in source.iter() {
            if SYNTHESIZED_KEYS.contains(&key.as_str()) || DROPPED_KEYS.contains(&key.as_str()) {
                continue;
            }
            let text = match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            let entry = if key == "tx" {
                text
            } else {
                format!("{classes}_{text}")
            };
            let joined = match merged.field_as_string(key) {
                Some(existing) => format!("{existing},{entry}"),
                None => entry,
            };
            merged.insert(key.clone(), joined);
        }
    }
    merged
}
