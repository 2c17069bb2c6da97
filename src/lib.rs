//! Library exports for reuse in the command line tools, benchmarks and tests.
/// Tool directory resolution.
pub mod app_dirs;
/// Worker pool for per-recording jobs.
pub mod batch;
/// Time-axis compression of spectrogram power.
pub mod compress;
/// Dataset layout, taxonomy and tool settings.
pub mod config;
/// Tracing setup.
pub mod logging;
/// Recording model: samples, metadata, annotations, filters.
pub mod recording;
/// Spectrogram pictures and YOLO labels.
pub mod render;
/// On-disk sample store.
pub mod store;
/// Synthetic recordings by crop and merge.
pub mod synth;
