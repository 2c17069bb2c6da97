//! Per-recording JSON metadata.
//!
//! The map is kept as free-form JSON so descriptive fields survive a round
//! trip. `classes` and `snr` are comma separated and positionally aligned:
//! entry *i* of `snr` is `"<label>_<value>"` for entry *i* of `classes`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Keys written by older dataset versions and their current names.
pub(crate) const LEGACY_KEYS: [(&str, &str); 4] = [
    ("class", "classes"),
    ("channel", "channels"),
    ("cfreq", "fc"),
    ("noise_pwr_db", "noise_db"),
];

/// Errors raised while interpreting recording metadata.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("metadata is not a JSON object")]
    NotAnObject,
    #[error("invalid metadata JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// `classes` and `snr` do not split into the same number of entries.
    #[error("classes has {classes} entries but snr has {snr}")]
    Misaligned { classes: usize, snr: usize },
}

/// One emission of a recording: its label and measured SNR, if known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Emission {
    pub label: String,
    pub snr_db: Option<f32>,
}

impl Emission {
    pub fn new(label: impl Into<String>, snr_db: Option<f32>) -> Self {
        Self {
            label: label.into(),
            snr_db,
        }
    }
}

/// Descriptive metadata of one recording.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordingMetadata {
    fields: Map<String, Value>,
}

impl RecordingMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse metadata text, repairing a doubled closing brace left by
    /// interrupted writers.
    pub fn parse(text: &str) -> Result<Self, MetadataError> {
        let value = match serde_json::from_str::<Value>(text) {
            Ok(value) => value,
            Err(err) => {
                let trimmed = text.trim();
                match trimmed.strip_suffix('}') {
                    Some(repaired) if trimmed.ends_with("}}") => {
                        tracing::warn!("Repaired metadata with a trailing extra brace");
                        serde_json::from_str(repaired)?
                    }
                    _ => return Err(err.into()),
                }
            }
        };
        Self::from_value(value)
    }

    /// Build metadata from a JSON value, renaming legacy keys.
    pub fn from_value(value: Value) -> Result<Self, MetadataError> {
        let Value::Object(mut fields) = value else {
            return Err(MetadataError::NotAnObject);
        };
        for (old, new) in LEGACY_KEYS {
            if let Some(value) = fields.remove(old) {
                fields.insert(new.to_string(), value);
            }
        }
        Ok(Self { fields })
    }

    pub fn to_json_pretty(&self) -> Result<String, MetadataError> {
        Ok(serde_json::to_string_pretty(&self.fields)?)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Field rendered as a plain string, the way filters compare it.
    pub fn field_as_string(&self, key: &str) -> Option<String> {
        match self.fields.get(key)? {
            Value::Null => None,
            Value::String(text) => Some(text.clone()),
            other => Some(other.to_string()),
        }
    }

    fn field_as_f64(&self, key: &str) -> Option<f64> {
        match self.fields.get(key)? {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    /// Emission labels in order, duplicates kept.
    pub fn classes(&self) -> Vec<String> {
        self.field_as_string("classes")
            .map(|text| split_list(&text))
            .unwrap_or_default()
    }

    /// Emissions with their SNR, pairing `classes` and `snr` by position.
    ///
    /// A missing or empty `snr` yields emissions without SNR. An `snr` entry
    /// whose value part is not numeric is an emission with unknown SNR.
    pub fn emissions(&self) -> Result<Vec<Emission>, MetadataError> {
        let classes = self.classes();
        let snr = self
            .field_as_string("snr")
            .map(|text| split_list(&text))
            .unwrap_or_default();
        if snr.is_empty() {
            return Ok(classes
                .into_iter()
                .map(|label| Emission::new(label, None))
                .collect());
        }
        if snr.len() != classes.len() {
            return Err(MetadataError::Misaligned {
                classes: classes.len(),
                snr: snr.len(),
            });
        }
        Ok(classes
            .into_iter()
            .zip(snr)
            .map(|(label, entry)| {
                let snr_db = entry
                    .rsplit_once('_')
                    .and_then(|(_, value)| value.trim().parse::<f32>().ok())
                    .filter(|value| value.is_finite());
                Emission::new(label, snr_db)
            })
            .collect())
    }

    /// Rewrite `classes` and `snr` from `emissions`, preserving their order.
    pub fn set_emissions(&mut self, emissions: &[Emission]) {
        let classes = emissions
            .iter()
            .map(|emission| emission.label.as_str())
            .collect::<Vec<_>>()
            .join(",");
        self.insert("classes", classes);
        if emissions.iter().all(|emission| emission.snr_db.is_none()) {
            self.remove("snr");
            return;
        }
        let snr = emissions
            .iter()
            .map(|emission| match emission.snr_db {
                Some(value) => format!("{}_{}", emission.label, format_db(value)),
                None => format!("{}_", emission.label),
            })
            .collect::<Vec<_>>()
            .join(",");
        self.insert("snr", snr);
    }

    /// Noise floor in dB, numeric or numeric string.
    pub fn noise_db(&self) -> Option<f32> {
        self.field_as_f64("noise_db").map(|value| value as f32)
    }

    /// Duration in seconds.
    pub fn duration(&self) -> Option<f64> {
        self.field_as_f64("duration")
    }

    /// Names of the recordings a synthetic recording was built from.
    pub fn sources(&self) -> Vec<String> {
        self.field_as_string("sources")
            .map(|text| split_list(&text))
            .unwrap_or_default()
    }

    pub fn is_synthetic(&self) -> bool {
        match self.fields.get("synthetic") {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::String(text)) => text.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }
}

fn split_list(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

/// Compact dB text: integers without decimals, otherwise two decimals trimmed.
fn format_db(value: f32) -> String {
    if value.fract() == 0.0 {
        return format!("{}", value as i64);
    }
    let text = format!("{value:.2}");
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}
