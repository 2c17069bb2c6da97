//! Dataset configuration passed explicitly into every component.
//!
//! A dataset root holds `recordings/`, `annotations/` and `metadata/`. The
//! class taxonomy and tool settings are read from `metadata/` when present.

mod errors;
mod settings;
mod taxonomy;

use std::path::{Path, PathBuf};

pub use errors::ConfigError;
pub use settings::{SETTINGS_FILE_NAME, ToolSettings};
pub use taxonomy::{ClassTaxonomy, TAXONOMY_FILE_NAME};

const RECORDINGS_DIR: &str = "recordings";
const ANNOTATIONS_DIR: &str = "annotations";
const METADATA_DIR: &str = "metadata";
const COMPRESSED_DIR: &str = "compressed";

/// Resolved dataset layout plus the settings the tools run with.
#[derive(Debug, Clone)]
pub struct DatasetConfig {
    root: PathBuf,
    /// Label to class-index mapping used for picture label files.
    pub taxonomy: ClassTaxonomy,
    /// Numeric defaults for synthesis and rendering.
    pub settings: ToolSettings,
}

impl DatasetConfig {
    /// Load the configuration of the dataset rooted at `root`.
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        if !root.is_dir() {
            return Err(ConfigError::MissingRoot {
                path: root.to_path_buf(),
            });
        }
        let metadata_dir = root.join(METADATA_DIR);
        let taxonomy = ClassTaxonomy::load(&metadata_dir.join(TAXONOMY_FILE_NAME))?;
        let settings = ToolSettings::load(&metadata_dir.join(SETTINGS_FILE_NAME))?;
        tracing::debug!(
            "Loaded dataset config at {} ({} classes)",
            root.display(),
            taxonomy.len()
        );
        Ok(Self {
            root: root.to_path_buf(),
            taxonomy,
            settings,
        })
    }

    /// Configuration with default taxonomy and settings, without touching disk.
    pub fn with_defaults(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            taxonomy: ClassTaxonomy::default(),
            settings: ToolSettings::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding `<name>.32fc`, `<name>.json` and `<name>.annotations.json`.
    pub fn recordings_dir(&self) -> PathBuf {
        self.root.join(RECORDINGS_DIR)
    }

    pub fn annotations_dir(&self) -> PathBuf {
        self.root.join(ANNOTATIONS_DIR)
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.root.join(METADATA_DIR)
    }

    /// Grayscale picture directory of one recording.
    pub fn pictures_dir(&self, recording: &str) -> PathBuf {
        self.annotations_dir().join(recording)
    }

    /// Compressed picture directory of one recording.
    pub fn compressed_pictures_dir(&self, recording: &str) -> PathBuf {
        self.pictures_dir(recording).join(COMPRESSED_DIR)
    }
}
