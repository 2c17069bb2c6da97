use std::path::PathBuf;

use thiserror::Error;

use crate::recording::MetadataError;

/// Errors raised while reading or writing dataset files.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The recording has no sample file.
    #[error("Recording {name} not found in {dir}")]
    MissingRecording { name: String, dir: PathBuf },
    #[error("Recording {name} has no metadata file at {path}")]
    MissingMetadata { name: String, path: PathBuf },
    /// The sample file ends inside a sample.
    #[error("{path} ends with {trailing} bytes of a partial sample")]
    PartialSample { path: PathBuf, trailing: usize },
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid metadata in {path}: {source}")]
    Metadata {
        path: PathBuf,
        source: MetadataError,
    },
    #[error("Invalid annotations in {path}: {source}")]
    Annotations {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Invalid picture name pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("Failed to serialize {path}: {source}")]
    Serialize {
        path: PathBuf,
        source: serde_json::Error,
    },
}
