//! Property filters over recording metadata.
//!
//! A group such as `class=wifi,channel=3` matches when every predicate holds.
//! A filter set matches when any of its groups does.

use thiserror::Error;

use super::metadata::{LEGACY_KEYS, RecordingMetadata};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("filter entry '{0}' is not of the form key=value")]
    Malformed(String),
    #[error("empty filter group")]
    Empty,
}

/// One `key=value` equality predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub key: String,
    pub value: String,
}

impl Predicate {
    fn matches(&self, metadata: &RecordingMetadata) -> bool {
        match self.key.as_str() {
            "classes" => match self.value.parse::<usize>() {
                Ok(count) => metadata.classes().len() == count,
                Err(_) => metadata
                    .classes()
                    .iter()
                    .any(|label| label.eq_ignore_ascii_case(&self.value)),
            },
            "sources" => metadata.sources().iter().any(|source| source == &self.value),
            key => metadata
                .field_as_string(key)
                .is_some_and(|field| field.trim() == self.value),
        }
    }
}

/// Predicates combined with logical AND.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyFilter {
    predicates: Vec<Predicate>,
}

impl PropertyFilter {
    /// Parse `key=value[,key=value...]`. Legacy key names are accepted.
    pub fn parse(text: &str) -> Result<Self, FilterError> {
        let mut predicates = Vec::new();
        for entry in text.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
            let (key, value) = entry
                .split_once('=')
                .ok_or_else(|| FilterError::Malformed(entry.to_string()))?;
            let key = key.trim();
            let value = value.trim();
            if key.is_empty() || value.is_empty() {
                return Err(FilterError::Malformed(entry.to_string()));
            }
            predicates.push(Predicate {
                key: canonical_key(key).to_string(),
                value: value.to_string(),
            });
        }
        if predicates.is_empty() {
            return Err(FilterError::Empty);
        }
        Ok(Self { predicates })
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn matches(&self, metadata: &RecordingMetadata) -> bool {
        self.predicates
            .iter()
            .all(|predicate| predicate.matches(metadata))
    }
}

/// Filter groups combined with logical OR.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet {
    groups: Vec<PropertyFilter>,
}

impl FilterSet {
    pub fn new(groups: Vec<PropertyFilter>) -> Self {
        Self { groups }
    }

    pub fn parse_groups<S: AsRef<str>>(groups: &[S]) -> Result<Self, FilterError> {
        groups
            .iter()
            .map(|group| PropertyFilter::parse(group.as_ref()))
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// An empty set matches everything.
    pub fn matches(&self, metadata: &RecordingMetadata) -> bool {
        self.groups.is_empty() || self.groups.iter().any(|group| group.matches(metadata))
    }
}

fn canonical_key(key: &str) -> &str {
    LEGACY_KEYS
        .iter()
        .find(|(old, _)| *old == key)
        .map(|(_, new)| *new)
        .unwrap_or(key)
}
