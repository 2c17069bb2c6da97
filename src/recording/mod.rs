//! Recordings, their metadata and annotations.

mod annotation;
mod filter;
mod metadata;

pub use annotation::{Annotation, YoloBox};
pub use filter::{FilterError, FilterSet, Predicate, PropertyFilter};
pub use metadata::{Emission, MetadataError, RecordingMetadata};

pub use rustfft::num_complex::Complex32;

/// A named sample stream with its metadata and annotations.
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    pub name: String,
    pub samples: Vec<Complex32>,
    pub metadata: RecordingMetadata,
    pub annotations: Vec<Annotation>,
}

impl Recording {
    pub fn new(name: impl Into<String>, samples: Vec<Complex32>, metadata: RecordingMetadata) -> Self {
        Self {
            name: name.into(),
            samples,
            metadata,
            annotations: Vec::new(),
        }
    }

    pub fn with_annotations(mut self, annotations: Vec<Annotation>) -> Self {
        self.annotations = annotations;
        self
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
