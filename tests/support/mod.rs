#![allow(dead_code)]

use std::f32::consts::TAU;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use spread::config::DatasetConfig;
use spread::recording::{Annotation, Complex32, Emission, Recording, RecordingMetadata};
use spread::store::SampleStore;
use tempfile::TempDir;

/// A complex tone at `cycles_per_sample` over seeded uniform noise.
pub fn tone_over_noise(len: usize, cycles_per_sample: f32, amplitude: f32, seed: u64) -> Vec<Complex32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len)
        .map(|i| {
            let phase = TAU * cycles_per_sample * i as f32;
            let noise = Complex32::new(rng.random_range(-1e-3..1e-3), rng.random_range(-1e-3..1e-3));
            Complex32::from_polar(amplitude, phase) + noise
        })
        .collect()
}

pub fn annotation(label: &str, start: u64, end: u64) -> Annotation {
    Annotation {
        label: label.to_string(),
        time_start: start,
        time_end: end,
        freq_low: 0.2,
        freq_high: 0.4,
        snr: None,
    }
}

/// Recording with one tone per emission, all at the same frequency.
pub fn recording(name: &str, len: usize, emissions: &[(&str, Option<f32>)], seed: u64) -> Recording {
    let mut metadata = RecordingMetadata::new();
    let emissions: Vec<Emission> = emissions
        .iter()
        .map(|(label, snr)| Emission::new(*label, *snr))
        .collect();
    metadata.set_emissions(&emissions);
    metadata.insert("noise_db", -60.0);
    metadata.insert("channels", 3);
    metadata.insert("tx", "ap");
    Recording::new(name, tone_over_noise(len, 0.05, 0.1, seed), metadata)
}

/// A dataset under a temporary root, deleted on drop.
pub struct TestDataset {
    _dir: TempDir,
    pub config: DatasetConfig,
}

impl TestDataset {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create dataset dir");
        let config = DatasetConfig::with_defaults(dir.path());
        Self { _dir: dir, config }
    }

    pub fn store(&self) -> SampleStore {
        SampleStore::new(&self.config)
    }

    pub fn add(&self, recording: &Recording) {
        self.store().save_recording(recording).expect("save recording");
    }
}
