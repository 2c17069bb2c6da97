//! SignalCombiner: synthetic recordings from existing ones.
//!
//! A combination is planned first ([`plan`]), then the plan is applied to
//! the source samples ([`combine`]) and to the source annotations
//! ([`AnnotationSynthesizer`]). The plan is stored in the synthetic metadata
//! so annotations can be regenerated later without drawing again.

mod annotations;
mod combine;
mod metadata;
mod plan;

use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::batch::{BatchReport, run_batch};
use crate::config::DatasetConfig;
use crate::recording::{Emission, MetadataError, PropertyFilter, Recording, RecordingMetadata};
use crate::store::{SampleStore, StoreError};

pub use annotations::{AnnotationSynthesizer, SourceAnnotations};
pub use combine::{apply_plan, samples_digest};
pub use metadata::{SyntheticFacts, add_noise_levels, stored_plan, synthetic_metadata};
pub use plan::{
    Alignment, CombineKind, CombinePlan, LengthRange, SourcePlacement, SourceProfile, default_seed,
    plan_crop, plan_merge,
};

#[derive(Debug, Error)]
pub enum CombineError {
    #[error("Failed to load source {name}: {source}")]
    SourceLoad { name: String, source: StoreError },
    #[error("Argument mismatch: {0}")]
    ArgumentMismatch(String),
    #[error("Invalid range: {0}")]
    InvalidRange(String),
    #[error("Invalid metadata of {name}: {source}")]
    Metadata { name: String, source: MetadataError },
    #[error("Failed to write synthetic recording: {0}")]
    Store(#[from] StoreError),
    #[error("Invalid combination plan of {name}: {source}")]
    Plan {
        name: String,
        source: serde_json::Error,
    },
    #[error("{0} has no stored combination plan")]
    MissingPlan(String),
    #[error("Failed to format recording date: {0}")]
    Date(#[from] time::error::Format),
}

/// How the sources of a combination are chosen.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceSpec {
    /// Recordings by name, in order.
    Named(Vec<String>),
    /// One random recording per filter group, in group order.
    Filtered(Vec<PropertyFilter>),
}

impl SourceSpec {
    pub fn len(&self) -> usize {
        match self {
            Self::Named(names) => names.len(),
            Self::Filtered(groups) => groups.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CombineMode {
    Crop {
        length: Option<LengthRange>,
    },
    Merge {
        /// Target SNR per source; `None` keeps every source SNR.
        snr_targets: Option<Vec<f32>>,
        length: Option<LengthRange>,
        alignment: Alignment,
    },
}

/// One synthetic recording to produce.
#[derive(Debug, Clone, PartialEq)]
pub struct CombineRequest {
    pub sources: SourceSpec,
    /// Output name; the next free `syn_<n>` when absent.
    pub output: Option<String>,
    pub mode: CombineMode,
    /// Seed of every random decision; derived from the names when absent.
    pub seed: Option<u64>,
    /// Also synthesize the output annotations.
    pub with_annotations: bool,
    /// Plan and build metadata without writing anything.
    pub dry_run: bool,
}

impl CombineRequest {
    /// Shape checks that need no I/O.
    pub fn validate(&self) -> Result<(), CombineError> {
        if self.sources.is_empty() {
            return Err(CombineError::ArgumentMismatch(
                "no sources given".to_string(),
            ));
        }
        match &self.mode {
            CombineMode::Crop { .. } if self.sources.len() != 1 => {
                Err(CombineError::ArgumentMismatch(format!(
                    "crop takes exactly one source, got {}",
                    self.sources.len()
                )))
            }
            CombineMode::Crop { .. } => Ok(()),
            CombineMode::Merge { snr_targets, .. } => {
                if self.sources.len() < 2 {
                    return Err(CombineError::ArgumentMismatch(format!(
                        "merge needs at least two sources, got {}",
                        self.sources.len()
                    )));
                }
                match snr_targets {
                    Some(targets) if targets.len() != self.sources.len() => {
                        Err(CombineError::ArgumentMismatch(format!(
                            "{} sources but {} SNR targets",
                            self.sources.len(),
                            targets.len()
                        )))
                    }
                    _ => Ok(()),
                }
            }
        }
    }
}

/// A synthesized recording together with the plan that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticRecording {
    pub recording: Recording,
    pub plan: CombinePlan,
}

/// Result of one combination request.
#[derive(Debug, Clone, PartialEq)]
pub struct CombineOutcome {
    pub name: String,
    pub sources: Vec<String>,
    pub samples: usize,
    pub annotations: usize,
    pub metadata: RecordingMetadata,
    pub written: bool,
}

/// Builds synthetic recordings of one dataset.
pub struct SignalCombiner<'a> {
    config: &'a DatasetConfig,
    store: SampleStore,
}

impl<'a> SignalCombiner<'a> {
    pub fn new(config: &'a DatasetConfig) -> Self {
        Self {
            config,
            store: SampleStore::new(config),
        }
    }

    pub fn store(&self) -> &SampleStore {
        &self.store
    }

    /// Cut one contiguous piece out of `source`.
    pub fn crop(
        &self,
        name: &str,
        source: &Recording,
        length: Option<LengthRange>,
        seed: u64,
    ) -> Result<SyntheticRecording, CombineError> {
        let profile = self.profile(source)?;
        let plan = plan_crop(&profile, length, seed)?;
        self.materialize(name, &plan, &[source])
    }

    /// Superimpose `sources` at `snr_targets`, keeping their order.
    pub fn merge(
        &self,
        name: &str,
        sources: &[Recording],
        snr_targets: Option<&[f32]>,
        length: Option<LengthRange>,
        alignment: Alignment,
        seed: u64,
    ) -> Result<SyntheticRecording, CombineError> {
        let profiles = sources
            .iter()
            .map(|source| self.profile(source))
            .collect::<Result<Vec<_>, _>>()?;
        let plan = plan_merge(&profiles, snr_targets, length, alignment, seed)?;
        let refs: Vec<&Recording> = sources.iter().collect();
        self.materialize(name, &plan, &refs)
    }

    /// Resolve sources, combine them and persist the result.
    ///
    /// Filtered sources are picked from the recordings on disk, never from
    /// the output itself. Overwriting an existing output drops its pictures,
    /// and its annotations too unless new ones are synthesized.
    pub fn run(&self, request: &CombineRequest) -> Result<CombineOutcome, CombineError> {
        self.run_with_catalog(request, None)
    }

    fn run_with_catalog(
        &self,
        request: &CombineRequest,
        catalog: Option<&[CatalogEntry]>,
    ) -> Result<CombineOutcome, CombineError> {
        request.validate()?;
        let name = match &request.output {
            Some(name) => name.clone(),
            None => self.store.next_synthetic_name()?,
        };
        let source_names = match (&request.sources, catalog) {
            (SourceSpec::Named(names), _) => names.clone(),
            (SourceSpec::Filtered(groups), Some(catalog)) => {
                pick_sources(&name, request.seed, groups, catalog)?
            }
            (SourceSpec::Filtered(groups), None) => {
                let catalog = self.catalog(&BTreeSet::from([name.clone()]))?;
                pick_sources(&name, request.seed, groups, &catalog)?
            }
        };
        let sources = source_names
            .iter()
            .map(|source| self.load_source(source))
            .collect::<Result<Vec<_>, _>>()?;
        let seed = request
            .seed
            .unwrap_or_else(|| default_seed(&name, &source_names));
        debug!("Combining {name} from {} with seed {seed}", source_names.join(","));

        let mut synthetic = match &request.mode {
            CombineMode::Crop { length } => self.crop(&name, &sources[0], *length, seed)?,
            CombineMode::Merge {
                snr_targets,
                length,
                alignment,
            } => self.merge(
                &name,
                &sources,
                snr_targets.as_deref(),
                *length,
                *alignment,
                seed,
            )?,
        };
        if request.with_annotations {
            let inputs = sources
                .iter()
                .map(|source| self.source_annotations(source))
                .collect::<Result<Vec<_>, _>>()?;
            synthetic.recording.annotations = AnnotationSynthesizer.synthesize(&synthetic.plan, &inputs)?;
        }

        let outcome = CombineOutcome {
            name: name.clone(),
            sources: source_names,
            samples: synthetic.recording.samples.len(),
            annotations: synthetic.recording.annotations.len(),
            metadata: synthetic.recording.metadata.clone(),
            written: !request.dry_run,
        };
        if request.dry_run {
            info!("Dry run for {name}: {} samples planned", outcome.samples);
            return Ok(outcome);
        }
        if self.store.exists(&name) {
            let removed = self.store.remove_pictures(&self.config.pictures_dir(&name), &name)?
                + self
                    .store
                    .remove_pictures(&self.config.compressed_pictures_dir(&name), &name)?;
            info!("Overwriting {name}; removed {removed} stale pictures");
        }
        if request.with_annotations {
            self.store.save_recording(&synthetic.recording)?;
        } else {
            self.store.save_samples(&name, &synthetic.recording.samples)?;
            self.store.save_metadata(&name, &synthetic.recording.metadata)?;
            if self.store.remove_annotations(&name)? {
                debug!("Removed stale annotations of {name}");
            }
        }
        info!(
            "Created {name} ({} samples, {} annotations) from {}",
            outcome.samples,
            outcome.annotations,
            outcome.sources.join(",")
        );
        Ok(outcome)
    }

    /// Rebuild the annotations of an existing synthetic recording from its
    /// stored plan and the current source annotations.
    pub fn regenerate_annotations(&self, name: &str) -> Result<usize, CombineError> {
        let metadata = self
            .store
            .load_metadata(name)
            .map_err(|source| CombineError::SourceLoad {
                name: name.to_string(),
                source,
            })?;
        let plan = stored_plan(name, &metadata)?;
        let mut inputs = Vec::with_capacity(plan.placements.len());
        for placement in &plan.placements {
            let load_error = |source: StoreError| CombineError::SourceLoad {
                name: placement.source.clone(),
                source,
            };
            if !self.store.exists(&placement.source) {
                return Err(load_error(StoreError::MissingRecording {
                    name: placement.source.clone(),
                    dir: self.store.recordings_dir().to_path_buf(),
                }));
            }
            let annotations = self
                .store
                .load_annotations(&placement.source)
                .map_err(load_error)?;
            let source_metadata = self
                .store
                .load_metadata(&placement.source)
                .map_err(load_error)?;
            let emissions = source_metadata
                .emissions()
                .map_err(|source| CombineError::Metadata {
                    name: placement.source.clone(),
                    source,
                })?;
            inputs.push(SourceAnnotations {
                annotations,
                emissions,
            });
        }
        let annotations = AnnotationSynthesizer.synthesize(&plan, &inputs)?;
        self.store.save_annotations(name, &annotations)?;
        info!("Regenerated {} annotations for {name}", annotations.len());
        Ok(annotations.len())
    }

    /// Synthetic recordings of the dataset.
    pub fn synthetic_names(&self) -> Result<Vec<String>, CombineError> {
        let mut names = Vec::new();
        for name in self.store.list_recordings()? {
            let metadata = self
                .store
                .load_metadata_or_empty(&name)
                .map_err(|source| CombineError::SourceLoad {
                    name: name.clone(),
                    source,
                })?;
            if metadata.is_synthetic() {
                names.push(name);
            }
        }
        Ok(names)
    }

    fn materialize(
        &self,
        name: &str,
        plan: &CombinePlan,
        sources: &[&Recording],
    ) -> Result<SyntheticRecording, CombineError> {
        let slices: Vec<&[_]> = sources.iter().map(|source| source.samples.as_slice()).collect();
        let samples = apply_plan(plan, &slices)?;

        let mut emissions = Vec::new();
        let mut noise_levels = Vec::with_capacity(sources.len());
        for (source, placement) in sources.iter().zip(&plan.placements) {
            for emission in self.emissions_of(source)? {
                emissions.push(Emission::new(
                    emission.label,
                    emission.snr_db.map(|snr| snr + placement.snr_delta_db),
                ));
            }
            noise_levels.push(self.noise_of(source));
        }
        let named: Vec<(&str, &RecordingMetadata)> = sources
            .iter()
            .map(|source| (source.name.as_str(), &source.metadata))
            .collect();
        let facts = SyntheticFacts {
            name,
            plan,
            emissions: &emissions,
            sample_rate_hz: self.config.settings.sample_rate_hz,
            samples_digest: samples_digest(&samples),
            recorded_at: OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc()),
        };
        let metadata = synthetic_metadata(&facts, &named, &noise_levels)?;
        Ok(SyntheticRecording {
            recording: Recording::new(name, samples, metadata),
            plan: plan.clone(),
        })
    }

    fn profile(&self, source: &Recording) -> Result<SourceProfile, CombineError> {
        let reference_snr_db = self
            .emissions_of(source)?
            .iter()
            .find_map(|emission| emission.snr_db);
        Ok(SourceProfile {
            name: source.name.clone(),
            len: source.samples.len() as u64,
            noise_db: self.noise_of(source),
            reference_snr_db,
        })
    }

    fn emissions_of(&self, source: &Recording) -> Result<Vec<Emission>, CombineError> {
        source
            .metadata
            .emissions()
            .map_err(|err| CombineError::Metadata {
                name: source.name.clone(),
                source: err,
            })
    }

    fn noise_of(&self, source: &Recording) -> f32 {
        source.metadata.noise_db().unwrap_or_else(|| {
            let fallback = self.config.settings.default_noise_db;
            warn!("{} has no noise_db; assuming {fallback} dB", source.name);
            fallback
        })
    }

    fn source_annotations(&self, source: &Recording) -> Result<SourceAnnotations, CombineError> {
        Ok(SourceAnnotations {
            annotations: source.annotations.clone(),
            emissions: self.emissions_of(source)?,
        })
    }

    fn load_source(&self, name: &str) -> Result<Recording, CombineError> {
        self.store
            .load_recording(name)
            .map_err(|source| CombineError::SourceLoad {
                name: name.to_string(),
                source,
            })
    }

    /// Metadata of every recording on disk except `excluded`. Recordings
    /// without a metadata file match only empty filters.
    fn catalog(&self, excluded: &BTreeSet<String>) -> Result<Vec<CatalogEntry>, CombineError> {
        self.store
            .list_recordings()?
            .into_iter()
            .filter(|name| !excluded.contains(name))
            .map(|name| {
                let metadata = self
                    .store
                    .load_metadata_or_empty(&name)
                    .map_err(|source| CombineError::SourceLoad {
                        name: name.clone(),
                        source,
                    })?;
                Ok((name, metadata))
            })
            .collect()
    }
}

type CatalogEntry = (String, RecordingMetadata);

/// One random catalog entry per filter group, drawn from a generator seeded
/// by `seed` or the output name.
fn pick_sources(
    output: &str,
    seed: Option<u64>,
    groups: &[PropertyFilter],
    catalog: &[CatalogEntry],
) -> Result<Vec<String>, CombineError> {
    let mut rng = StdRng::seed_from_u64(seed.unwrap_or_else(|| default_seed(output, &[])));
    groups
        .iter()
        .map(|group| {
            let matching: Vec<&String> = catalog
                .iter()
                .filter(|(_, metadata)| group.matches(metadata))
                .map(|(name, _)| name)
                .collect();
            if matching.is_empty() {
                return Err(CombineError::InvalidRange(format!(
                    "no recording satisfies {}",
                    describe_filter(group)
                )));
            }
            Ok(matching[rng.random_range(0..matching.len())].clone())
        })
        .collect()
}

/// Run `requests` on a worker pool after validating all of them.
///
/// Shape errors, duplicate output names and sources that another request
/// of the batch writes fail the whole batch before any I/O. Missing output
/// names are allocated up front so workers never race for the same
/// `syn_<n>`, and filtered sources are picked from one listing taken before
/// the workers start, so picks never depend on what the batch itself wrote.
pub fn run_combinations(
    combiner: &SignalCombiner<'_>,
    mut requests: Vec<CombineRequest>,
    workers: usize,
) -> Result<BatchReport<CombineOutcome>, CombineError> {
    let mut seen = BTreeSet::new();
    for request in &requests {
        request.validate()?;
        if let Some(name) = &request.output {
            if !seen.insert(name.clone()) {
                return Err(CombineError::ArgumentMismatch(format!(
                    "output {name} requested more than once"
                )));
            }
        }
    }
    let unnamed = requests.iter().filter(|request| request.output.is_none()).count();
    if unnamed > 0 {
        let next = combiner
            .store
            .next_synthetic_name()?
            .trim_start_matches("syn_")
            .parse::<u64>()
            .unwrap_or(1);
        let mut allocated = (next..).map(|index| format!("syn_{index}")).filter(|name| !seen.contains(name));
        for request in requests.iter_mut().filter(|request| request.output.is_none()) {
            request.output = allocated.next();
        }
    }
    let outputs: BTreeSet<String> = requests.iter().filter_map(|request| request.output.clone()).collect();
    for request in &requests {
        if let SourceSpec::Named(names) = &request.sources {
            if let Some(name) = names
                .iter()
                .find(|name| outputs.contains(*name) && request.output.as_ref() != Some(*name))
            {
                return Err(CombineError::ArgumentMismatch(format!(
                    "source {name} is also an output of this batch"
                )));
            }
        }
    }
    let filtered = requests
        .iter()
        .any(|request| matches!(request.sources, SourceSpec::Filtered(_)));
    let catalog = if filtered {
        combiner.catalog(&outputs)?
    } else {
        Vec::new()
    };
    Ok(run_batch(
        requests,
        workers,
        |request| request.output.clone().unwrap_or_default(),
        |request| combiner.run_with_catalog(request, Some(catalog.as_slice())),
    ))
}

/// Regenerate annotations of `names` (all synthetics when empty).
pub fn regenerate_annotations(
    combiner: &SignalCombiner<'_>,
    names: Vec<String>,
    workers: usize,
) -> Result<BatchReport<usize>, CombineError> {
    let names = if names.is_empty() {
        combiner.synthetic_names()?
    } else {
        names
    };
    Ok(run_batch(
        names,
        workers,
        |name| name.clone(),
        |name| combiner.regenerate_annotations(name),
    ))
}

fn describe_filter(group: &PropertyFilter) -> String {
    group
        .predicates()
        .iter()
        .map(|predicate| format!("{}={}", predicate.key, predicate.value))
        .collect::<Vec<_>>()
        .join(",")
}
