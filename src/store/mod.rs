//! SampleStore: file layout of recordings and their pictures.
//!
//! Each recording lives in `recordings/` as `<name>.32fc` (samples),
//! `<name>.json` (metadata) and optionally `<name>.annotations.json`.
//! Writes go through a temporary file in the same directory and are
//! persisted atomically.

mod errors;
pub mod iq;

use std::io::Write;
use std::path::{Path, PathBuf};

use regex::Regex;
use rustfft::num_complex::Complex32;
use tracing::debug;

use crate::config::DatasetConfig;
use crate::recording::{Annotation, Recording, RecordingMetadata};

pub use errors::StoreError;

const SAMPLES_EXT: &str = "32fc";
const METADATA_EXT: &str = "json";
const ANNOTATIONS_SUFFIX: &str = ".annotations.json";
const SYNTHETIC_PREFIX: &str = "syn_";

/// Loads and saves recordings of one dataset.
#[derive(Debug, Clone)]
pub struct SampleStore {
    recordings_dir: PathBuf,
}

impl SampleStore {
    pub fn new(config: &DatasetConfig) -> Self {
        Self {
            recordings_dir: config.recordings_dir(),
        }
    }

    pub fn recordings_dir(&self) -> &Path {
        &self.recordings_dir
    }

    pub fn samples_path(&self, name: &str) -> PathBuf {
        self.recordings_dir.join(format!("{name}.{SAMPLES_EXT}"))
    }

    pub fn metadata_path(&self, name: &str) -> PathBuf {
        self.recordings_dir.join(format!("{name}.{METADATA_EXT}"))
    }

    pub fn annotations_path(&self, name: &str) -> PathBuf {
        self.recordings_dir.join(format!("{name}{ANNOTATIONS_SUFFIX}"))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.samples_path(name).is_file()
    }

    pub fn load_samples(&self, name: &str) -> Result<Vec<Complex32>, StoreError> {
        let path = self.samples_path(name);
        if !path.is_file() {
            return Err(StoreError::MissingRecording {
                name: name.to_string(),
                dir: self.recordings_dir.clone(),
            });
        }
        let bytes = std::fs::read(&path).map_err(|source| StoreError::Read {
            path: path.clone(),
            source,
        })?;
        let whole = iq::sample_count(bytes.len() as u64) as usize * iq::BYTES_PER_SAMPLE;
        if whole != bytes.len() {
            return Err(StoreError::PartialSample {
                path,
                trailing: bytes.len() - whole,
            });
        }
        Ok(iq::decode_iq(&bytes))
    }

    pub fn save_samples(&self, name: &str, samples: &[Complex32]) -> Result<(), StoreError> {
        write_atomic(&self.samples_path(name), &iq::encode_iq(samples))
    }

    pub fn load_metadata(&self, name: &str) -> Result<RecordingMetadata, StoreError> {
        let path = self.metadata_path(name);
        if !path.is_file() {
            return Err(StoreError::MissingMetadata {
                name: name.to_string(),
                path,
            });
        }
        let text = std::fs::read_to_string(&path).map_err(|source| StoreError::Read {
            path: path.clone(),
            source,
        })?;
        RecordingMetadata::parse(&text).map_err(|source| StoreError::Metadata { path, source })
    }

    /// Metadata of `name` for catalog filtering; a missing file yields empty
    /// metadata, a corrupt one is still an error.
    pub fn load_metadata_or_empty(&self, name: &str) -> Result<RecordingMetadata, StoreError> {
        match self.load_metadata(name) {
            Err(StoreError::MissingMetadata { .. }) => {
                debug!("No metadata file for {name}");
                Ok(RecordingMetadata::new())
            }
            other => other,
        }
    }

    pub fn save_metadata(&self, name: &str, metadata: &RecordingMetadata) -> Result<(), StoreError> {
        let path = self.metadata_path(name);
        let text = metadata
            .to_json_pretty()
            .map_err(|source| StoreError::Metadata {
                path: path.clone(),
                source,
            })?;
        write_atomic(&path, text.as_bytes())
    }

    /// Annotations of `name`; a missing file yields none.
    pub fn load_annotations(&self, name: &str) -> Result<Vec<Annotation>, StoreError> {
        let path = self.annotations_path(name);
        if !path.is_file() {
            return Ok(Vec::new());
        }
        let bytes = std::fs::read(&path).map_err(|source| StoreError::Read {
            path: path.clone(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| StoreError::Annotations { path, source })
    }

    pub fn save_annotations(&self, name: &str, annotations: &[Annotation]) -> Result<(), StoreError> {
        let path = self.annotations_path(name);
        let text = serde_json::to_string_pretty(annotations).map_err(|source| {
            StoreError::Serialize {
                path: path.clone(),
                source,
            }
        })?;
        write_atomic(&path, text.as_bytes())
    }

    /// Delete the annotations file of `name`, if any.
    pub fn remove_annotations(&self, name: &str) -> Result<bool, StoreError> {
        let path = self.annotations_path(name);
        if !path.is_file() {
            return Ok(false);
        }
        remove_file(&path)?;
        Ok(true)
    }

    pub fn load_recording(&self, name: &str) -> Result<Recording, StoreError> {
        let samples = self.load_samples(name)?;
        let metadata = self.load_metadata(name)?;
        let annotations = self.load_annotations(name)?;
        Ok(Recording::new(name, samples, metadata).with_annotations(annotations))
    }

    /// Persist samples, metadata and annotations of `recording`.
    pub fn save_recording(&self, recording: &Recording) -> Result<(), StoreError> {
        create_dir(&self.recordings_dir)?;
        self.save_samples(&recording.name, &recording.samples)?;
        self.save_metadata(&recording.name, &recording.metadata)?;
        self.save_annotations(&recording.name, &recording.annotations)?;
        debug!(
            "Saved {} ({} samples, {} annotations)",
            recording.name,
            recording.samples.len(),
            recording.annotations.len()
        );
        Ok(())
    }

    /// Recording names ordered by prefix, then numeric id.
    pub fn list_recordings(&self) -> Result<Vec<String>, StoreError> {
        if !self.recordings_dir.is_dir() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&self.recordings_dir).map_err(|source| StoreError::Read {
            path: self.recordings_dir.clone(),
            source,
        })?;
        let mut names = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some(SAMPLES_EXT))
            .filter_map(|path| {
                path.file_stem()
                    .and_then(|stem| stem.to_str())
                    .map(str::to_string)
            })
            .collect::<Vec<_>>();
        names.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
        Ok(names)
    }

    /// Next free `syn_<n>` name, one past the highest existing index.
    pub fn next_synthetic_name(&self) -> Result<String, StoreError> {
        let highest = self
            .list_recordings()?
            .iter()
            .filter_map(|name| name.strip_prefix(SYNTHETIC_PREFIX))
            .filter_map(|index| index.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        Ok(format!("{SYNTHETIC_PREFIX}{}", highest + 1))
    }

    /// Existing `<name>_pic_<index>.jpg` files in `dir`, ordered by index.
    pub fn existing_pictures(&self, dir: &Path, name: &str) -> Result<Vec<(usize, PathBuf)>, StoreError> {
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        indexed_files(dir, &file_pattern(name, "jpg")?)
    }

    /// Delete every picture and label file of `name` in `dir`.
    ///
    /// Returns the number of pictures removed. Label files without a picture
    /// are removed too.
    pub fn remove_pictures(&self, dir: &Path, name: &str) -> Result<usize, StoreError> {
        if !dir.is_dir() {
            return Ok(0);
        }
        let pictures = self.existing_pictures(dir, name)?;
        for (_, path) in indexed_files(dir, &file_pattern(name, "txt")?)?
            .into_iter()
            .chain(pictures.iter().cloned())
        {
            remove_file(&path)?;
        }
        let removed = pictures.len();
        if removed > 0 {
            debug!("Removed {removed} pictures of {name} from {}", dir.display());
        }
        Ok(removed)
    }
}

/// File name of picture `index` of `name`.
pub fn picture_file_name(name: &str, index: usize) -> String {
    format!("{name}_pic_{index}.jpg")
}

/// File name of the label sidecar of picture `index` of `name`.
pub fn label_file_name(name: &str, index: usize) -> String {
    format!("{name}_pic_{index}.txt")
}

/// `<name>_pic_<index>.<ext>`, capturing the index.
fn file_pattern(name: &str, ext: &str) -> Result<Regex, StoreError> {
    Regex::new(&format!(r"^{}_pic_(\d+)\.{ext}$", regex::escape(name))).map_err(StoreError::Pattern)
}

fn indexed_files(dir: &Path, pattern: &Regex) -> Result<Vec<(usize, PathBuf)>, StoreError> {
    let entries = std::fs::read_dir(dir).map_err(|source| StoreError::Read {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut files = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let file_name = entry.file_name();
            let index = pattern
                .captures(file_name.to_str()?)?
                .get(1)?
                .as_str()
                .parse::<usize>()
                .ok()?;
            Some((index, entry.path()))
        })
        .collect::<Vec<_>>();
    files.sort();
    Ok(files)
}

fn sort_key(name: &str) -> (String, u64, String) {
    let prefix = name.trim_end_matches(|c: char| c.is_ascii_digit());
    let id = name[prefix.len()..].parse::<u64>().unwrap_or(0);
    (prefix.to_string(), id, name.to_string())
}

pub(crate) fn create_dir(path: &Path) -> Result<(), StoreError> {
    std::fs::create_dir_all(path).map_err(|source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn remove_file(path: &Path) -> Result<(), StoreError> {
    std::fs::remove_file(path).map_err(|source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Write `bytes` to `path` through a temporary sibling file.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let write_err = |source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    };
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    create_dir(dir)?;
    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    file.write_all(bytes).map_err(write_err)?;
    file.flush().map_err(write_err)?;
    file.persist(path).map_err(|err| write_err(err.error))?;
    Ok(())
}
