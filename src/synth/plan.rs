//! Placement decisions of a combination, drawn once and stored.
//!
//! Every random choice (crop lengths and starts, alignment offsets) lives in
//! a [`CombinePlan`]. Sample synthesis and annotation synthesis both read the
//! plan and never draw again.

use std::str::FromStr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::CombineError;

/// Admissible output lengths `min + k * step`, in samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthRange {
    pub min: u64,
    pub max: u64,
    pub step: u64,
}

impl LengthRange {
    pub fn new(min: u64, max: u64, step: u64) -> Result<Self, CombineError> {
        if min == 0 || step == 0 {
            return Err(CombineError::InvalidRange(format!(
                "length minimum ({min}) and step ({step}) must be positive"
            )));
        }
        if min > max {
            return Err(CombineError::InvalidRange(format!(
                "length minimum {min} exceeds maximum {max}"
            )));
        }
        Ok(Self { min, max, step })
    }

    /// Pick a length that fits a source of `source_len` samples.
    pub fn choose(&self, source_len: u64, rng: &mut StdRng) -> Result<u64, CombineError> {
        let upper = self.max.min(source_len);
        if self.min > upper {
            return Err(CombineError::InvalidRange(format!(
                "requested length {}..={} does not fit a source of {source_len} samples",
                self.min, self.max
            )));
        }
        let choices = (upper - self.min) / self.step + 1;
        Ok(self.min + rng.random_range(0..choices) * self.step)
    }
}

/// Where shorter merge sources are placed in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    /// Every source starts at zero; output spans the longest source.
    #[default]
    Start,
    /// Shorter sources are centred within the longest.
    Center,
    /// Shorter sources start at a seeded random offset.
    Random,
    /// Every source starts at zero; output ends with the shortest source.
    Truncate,
}

impl FromStr for Alignment {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "start" => Ok(Self::Start),
            "center" | "centre" => Ok(Self::Center),
            "random" => Ok(Self::Random),
            "truncate" => Ok(Self::Truncate),
            other => Err(format!("Unknown alignment: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombineKind {
    Crop,
    Merge,
}

/// How one source contributes to the output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcePlacement {
    pub source: String,
    /// First source sample used.
    pub crop_start: u64,
    /// Number of source samples used.
    pub crop_len: u64,
    /// Output sample receiving `crop_start`.
    pub offset: u64,
    /// Power gain applied to the source.
    pub gain_db: f32,
    /// Change of every emission SNR of this source.
    pub snr_delta_db: f32,
}

impl SourcePlacement {
    /// Amplitude factor of `gain_db`.
    pub fn amplitude(&self) -> f32 {
        10.0_f32.powf(self.gain_db / 20.0)
    }

    /// Distance from a source sample index to its output sample index.
    pub fn shift(&self) -> i64 {
        self.offset as i64 - self.crop_start as i64
    }
}

/// All decisions of one combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinePlan {
    pub kind: CombineKind,
    pub seed: u64,
    pub output_len: u64,
    pub placements: Vec<SourcePlacement>,
}

/// What the planner needs to know about a source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceProfile {
    pub name: String,
    pub len: u64,
    pub noise_db: f32,
    /// SNR of the first emission that has one.
    pub reference_snr_db: Option<f32>,
}

/// Crop `source` to a length drawn from `length`, or keep it whole.
pub fn plan_crop(
    source: &SourceProfile,
    length: Option<LengthRange>,
    seed: u64,
) -> Result<CombinePlan, CombineError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let (crop_start, crop_len) = draw_crop(source, length, &mut rng)?;
    Ok(CombinePlan {
        kind: CombineKind::Crop,
        seed,
        output_len: crop_len,
        placements: vec![SourcePlacement {
            source: source.name.clone(),
            crop_start,
            crop_len,
            offset: 0,
            gain_db: 0.0,
            snr_delta_db: 0.0,
        }],
    })
}

/// Superimpose `sources`, scaling each so its reference emission reaches the
/// paired target SNR over the first source's noise floor.
///
/// Without targets every source keeps its own SNR and is only levelled to
/// the first source's noise floor.
pub fn plan_merge(
    sources: &[SourceProfile],
    snr_targets: Option<&[f32]>,
    length: Option<LengthRange>,
    alignment: Alignment,
    seed: u64,
) -> Result<CombinePlan, CombineError> {
    if sources.len() < 2 {
        return Err(CombineError::ArgumentMismatch(format!(
            "merge needs at least two sources, got {}",
            sources.len()
        )));
    }
    if let Some(targets) = snr_targets {
        if targets.len() != sources.len() {
            return Err(CombineError::ArgumentMismatch(format!(
                "{} sources but {} SNR targets",
                sources.len(),
                targets.len()
            )));
        }
    }

    let reference_noise = sources[0].noise_db;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut placements = Vec::with_capacity(sources.len());
    for (idx, source) in sources.iter().enumerate() {
        let snr_delta_db = match snr_targets {
            Some(targets) => {
                let measured = source.reference_snr_db.ok_or_else(|| {
                    CombineError::InvalidRange(format!(
                        "{} has no measured SNR to scale from",
                        source.name
                    ))
                })?;
                targets[idx] - measured
            }
            None => 0.0,
        };
        let (crop_start, crop_len) = draw_crop(source, length, &mut rng)?;
        placements.push(SourcePlacement {
            source: source.name.clone(),
            crop_start,
            crop_len,
            offset: 0,
            gain_db: reference_noise - source.noise_db + snr_delta_db,
            snr_delta_db,
        });
    }

    let longest = placements.iter().map(|p| p.crop_len).max().unwrap_or(0);
    let shortest = placements.iter().map(|p| p.crop_len).min().unwrap_or(0);
    let output_len = match alignment {
        Alignment::Truncate => shortest,
        _ => longest,
    };
    for placement in &mut placements {
        let slack = longest - placement.crop_len;
        match alignment {
            Alignment::Start => {}
            Alignment::Center => placement.offset = slack / 2,
            Alignment::Random => placement.offset = rng.random_range(0..=slack),
            Alignment::Truncate => placement.crop_len = shortest,
        }
    }

    Ok(CombinePlan {
        kind: CombineKind::Merge,
        seed,
        output_len,
        placements,
    })
}

fn draw_crop(
    source: &SourceProfile,
    length: Option<LengthRange>,
    rng: &mut StdRng,
) -> Result<(u64, u64), CombineError> {
    let Some(range) = length else {
        return Ok((0, source.len));
    };
    let crop_len = range.choose(source.len, rng)?;
    let crop_start = rng.random_range(0..=source.len - crop_len);
    Ok((crop_start, crop_len))
}

/// Seed derived from the output name and its sources.
pub fn default_seed(output: &str, sources: &[String]) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(output.as_bytes());
    for source in sources {
        hasher.update(b"\0");
        hasher.update(source.as_bytes());
    }
    let hash = hasher.finalize();
    let bytes = hash.as_bytes();
    u64::from_le_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(name: &str, len: u64, noise_db: f32, snr: Option<f32>) -> SourceProfile {
        SourceProfile {
            name: name.to_string(),
            len,
            noise_db,
            reference_snr_db: snr,
        }
    }

    #[test]
    fn crop_lengths_stay_on_the_grid_and_inside_the_source() {
        let source = profile("rec_1", 10_000, -50.0, Some(10.0));
        let range = LengthRange::new(1_000, 20_000, 750).unwrap();
        for seed in 0..200 {
            let plan = plan_crop(&source, Some(range), seed).unwrap();
            let placement = &plan.placements[0];
            assert!(placement.crop_len >= 1_000);
            assert!(placement.crop_len <= 10_000);
            assert_eq!((placement.crop_len - 1_000) % 750, 0);
            assert!(placement.crop_start + placement.crop_len <= 10_000);
            assert_eq!(plan.output_len, placement.crop_len);
        }
    }

    #[test]
    fn crop_longer_than_source_is_invalid() {
        let source = profile("rec_1", 500, -50.0, None);
        let range = LengthRange::new(1_000, 2_000, 10).unwrap();
        assert!(matches!(
            plan_crop(&source, Some(range), 1),
            Err(CombineError::InvalidRange(_))
        ));
    }

    #[test]
    fn merge_gain_reaches_target_over_reference_noise() {
        let sources = [
            profile("a", 100, -50.0, Some(20.0)),
            profile("b", 80, -40.0, Some(5.0)),
        ];
        let plan = plan_merge(&sources, Some(&[10.0, 0.0]), None, Alignment::Start, 7).unwrap();
        assert_eq!(plan.output_len, 100);
        assert_eq!(plan.placements[0].gain_db, -10.0);
        assert_eq!(plan.placements[0].snr_delta_db, -10.0);
        // b: (-50 + 0) - (-40 + 5) = -15
        assert_eq!(plan.placements[1].gain_db, -15.0);
        assert_eq!(plan.placements[1].snr_delta_db, -5.0);
    }

    #[test]
    fn merge_argument_mismatches_are_rejected() {
        let sources = [profile("a", 10, -50.0, Some(1.0)), profile("b", 10, -50.0, Some(1.0))];
        assert!(matches!(
            plan_merge(&sources, Some(&[1.0]), None, Alignment::Start, 0),
            Err(CombineError::ArgumentMismatch(_))
        ));
        assert!(matches!(
            plan_merge(&sources[..1], None, None, Alignment::Start, 0),
            Err(CombineError::ArgumentMismatch(_))
        ));
        let unmeasured = [profile("a", 10, -50.0, Some(1.0)), profile("b", 10, -50.0, None)];
        assert!(matches!(
            plan_merge(&unmeasured, Some(&[1.0, 2.0]), None, Alignment::Start, 0),
            Err(CombineError::InvalidRange(_))
        ));
    }

    #[test]
    fn alignment_policies_place_shorter_sources() {
        let sources = [profile("a", 100, -50.0, None), profile("b", 40, -50.0, None)];
        let center = plan_merge(&sources, None, None, Alignment::Center, 0).unwrap();
        assert_eq!(center.placements[1].offset, 30);
        let truncate = plan_merge(&sources, None, None, Alignment::Truncate, 0).unwrap();
        assert_eq!(truncate.output_len, 40);
        assert_eq!(truncate.placements[0].crop_len, 40);
        for seed in 0..50 {
            let random = plan_merge(&sources, None, None, Alignment::Random, seed).unwrap();
            assert_eq!(random.placements[0].offset, 0);
            assert!(random.placements[1].offset <= 60);
        }
    }

    #[test]
    fn plans_are_reproducible_from_the_seed() {
        let sources = [profile("a", 5_000, -50.0, None), profile("b", 4_000, -45.0, None)];
        let range = LengthRange::new(1_000, 3_000, 100).unwrap();
        let first = plan_merge(&sources, None, Some(range), Alignment::Random, 42).unwrap();
        let second = plan_merge(&sources, None, Some(range), Alignment::Random, 42).unwrap();
        assert_eq!(first, second);
        let stored = serde_json::to_string(&first).unwrap();
        let restored: CombinePlan = serde_json::from_str(&stored).unwrap();
        assert_eq!(restored, first);
    }

    #[test]
    fn default_seed_depends_on_names() {
        let sources = vec!["rec_1".to_string(), "rec_2".to_string()];
        assert_eq!(default_seed("syn_1", &sources), default_seed("syn_1", &sources));
        assert_ne!(default_seed("syn_1", &sources), default_seed("syn_2", &sources));
    }
}
