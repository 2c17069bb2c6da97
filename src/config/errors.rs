use std::path::PathBuf;

use thiserror::Error;

/// Errors that may occur while loading dataset configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The dataset root does not exist or is not a directory.
    #[error("Dataset root {path} is not a directory")]
    MissingRoot {
        /// Root path that was requested.
        path: PathBuf,
    },
    /// Failed to read a config file.
    #[error("Failed to read {path}: {source}")]
    Read {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Failed to parse the TOML tool settings.
    #[error("Invalid settings at {path}: {source}")]
    ParseToml {
        /// TOML file path.
        path: PathBuf,
        /// TOML parse error.
        source: toml::de::Error,
    },
    /// Failed to parse the JSON class taxonomy.
    #[error("Invalid class taxonomy at {path}: {source}")]
    ParseJson {
        /// JSON file path.
        path: PathBuf,
        /// JSON parse error.
        source: serde_json::Error,
    },
    /// A setting holds a value the tools cannot work with.
    #[error("Invalid setting: {0}")]
    Invalid(String),
}
