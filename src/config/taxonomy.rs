use std::collections::BTreeMap;
use std::path::Path;

use super::ConfigError;

/// File name of the class taxonomy inside `<root>/metadata/`.
pub const TAXONOMY_FILE_NAME: &str = "classes.json";

const DEFAULT_CLASSES: [(&str, u32); 5] = [
    ("wifi", 0),
    ("bluetooth", 1),
    ("zigbee", 2),
    ("lightbridge", 3),
    ("wmic", 4),
];

/// Maps emission labels to picture-label class indices.
///
/// Labels are opaque strings; lookups ignore ASCII case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassTaxonomy {
    indices: BTreeMap<String, u32>,
}

impl Default for ClassTaxonomy {
    fn default() -> Self {
        Self::from_pairs(
            DEFAULT_CLASSES
                .iter()
                .map(|(label, index)| (label.to_string(), *index)),
        )
    }
}

impl ClassTaxonomy {
    /// Build a taxonomy from `(label, index)` pairs.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, u32)>) -> Self {
        let indices = pairs
            .into_iter()
            .map(|(label, index)| (label.trim().to_ascii_lowercase(), index))
            .collect();
        Self { indices }
    }

    /// Load `{"label": index, ...}` from `path`, or the default taxonomy when missing.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let bytes = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let parsed: BTreeMap<String, u32> =
            serde_json::from_slice(&bytes).map_err(|source| ConfigError::ParseJson {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::from_pairs(parsed))
    }

    /// Class index for `label`, if known.
    pub fn index_of(&self, label: &str) -> Option<u32> {
        self.indices.get(&label.trim().to_ascii_lowercase()).copied()
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_taxonomy_is_case_insensitive() {
        let taxonomy = ClassTaxonomy::default();
        assert_eq!(taxonomy.index_of("wifi"), Some(0));
        assert_eq!(taxonomy.index_of("WMIC"), Some(4));
        assert_eq!(taxonomy.index_of("radar"), None);
    }

    #[test]
    fn load_reads_custom_mapping() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(TAXONOMY_FILE_NAME);
        std::fs::write(&path, r#"{"Radar": 7, "wifi": 1}"#).unwrap();
        let taxonomy = ClassTaxonomy::load(&path).unwrap();
        assert_eq!(taxonomy.len(), 2);
        assert_eq!(taxonomy.index_of("radar"), Some(7));
        assert_eq!(taxonomy.index_of("bluetooth"), None);
    }
}
