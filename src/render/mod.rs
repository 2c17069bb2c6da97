//! PictureRenderer: spectrogram pictures of recordings.
//!
//! A picture covers `fft_size * lines * avg * proc` samples. Recordings with
//! annotations get one picture per annotation (the frame-aligned window that
//! contains the annotation start); recordings without annotations are cut into
//! consecutive frames. The last frame is zero padded.

mod compressed;
mod grayscale;
mod image_io;
mod spectrum;

use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::batch::{BatchReport, run_batch};
use crate::compress::{CompressionFactors, EncodingError, LabeledBox, compress_labels};
use crate::config::{DatasetConfig, ToolSettings};
use crate::recording::Recording;
use crate::store::{self, SampleStore, StoreError};

pub use image_io::PictureImage;
use spectrum::Spectrogram;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Failed to load recording {name}: {source}")]
    SourceLoad { name: String, source: StoreError },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Cannot encode picture: {0}")]
    Encoding(#[from] EncodingError),
    #[error("Failed to encode JPEG for {path}: {source}")]
    Image {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("Invalid render parameters: {0}")]
    InvalidRange(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    #[default]
    Grayscale,
    Compressed,
}

impl FromStr for RenderMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "grayscale" => Ok(Self::Grayscale),
            "compressed" => Ok(Self::Compressed),
            other => Err(format!("Unknown render mode: {other}")),
        }
    }
}

/// Linear map from a clipped SNR range to pixel values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnrScale {
    pub floor: f32,
    pub ceiling: f32,
}

impl SnrScale {
    pub fn new(floor: f32, ceiling: f32) -> Self {
        Self { floor, ceiling }
    }

    pub fn pixel(&self, snr_db: f32) -> u8 {
        let clipped = snr_db.clamp(self.floor, self.ceiling);
        ((clipped - self.floor) / (self.ceiling - self.floor) * 255.0) as u8
    }
}

/// Options of one rendering request.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderParams {
    pub mode: RenderMode,
    pub fft_size: usize,
    /// Picture height in lines.
    pub lines: usize,
    pub factors: CompressionFactors,
    /// Noise reference overriding the recording's `noise_db`.
    pub log_noise: Option<f32>,
    /// Keep only the first N pictures.
    pub img_limit: Option<usize>,
    pub overwrite: bool,
    pub write_pictures: bool,
    pub write_labels: bool,
    pub scale: SnrScale,
    pub jpeg_quality: u8,
}

impl RenderParams {
    /// Parameters seeded from the dataset settings.
    pub fn from_settings(settings: &ToolSettings, mode: RenderMode) -> Self {
        Self {
            mode,
            fft_size: settings.fft_size,
            lines: settings.lines,
            factors: CompressionFactors {
                avg: settings.compr_avg,
                proc: settings.compr_proc,
            },
            log_noise: None,
            img_limit: None,
            overwrite: false,
            write_pictures: true,
            write_labels: true,
            scale: SnrScale::new(settings.snr_floor_db, settings.snr_ceiling_db),
            jpeg_quality: settings.jpeg_quality,
        }
    }

    /// Spectrogram frames behind one picture.
    pub fn frames_per_picture(&self) -> usize {
        self.lines * self.factors.combined()
    }

    /// Samples covered by one picture.
    pub fn window_len(&self) -> usize {
        self.fft_size * self.frames_per_picture()
    }

    fn validate(&self) -> Result<(), RenderError> {
        if self.fft_size == 0 || self.lines == 0 {
            return Err(RenderError::InvalidRange(format!(
                "fft_size ({}) and lines ({}) must be positive",
                self.fft_size, self.lines
            )));
        }
        CompressionFactors::new(self.factors.avg, self.factors.proc)?;
        if self.scale.floor >= self.scale.ceiling {
            return Err(RenderError::InvalidRange(format!(
                "SNR floor {} must be below ceiling {}",
                self.scale.floor, self.scale.ceiling
            )));
        }
        Ok(())
    }
}

/// One picture of a recording.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPicture {
    pub index: usize,
    pub window_start: u64,
    pub window_len: u64,
    pub image: PictureImage,
    /// YOLO label lines of the annotations visible in the picture.
    pub labels: Vec<String>,
}

/// What a rendering request did for one recording.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RenderSummary {
    pub recording: String,
    pub pictures_written: usize,
    pub labels_written: usize,
    pub removed: usize,
    /// Pictures already existed and overwrite was not requested.
    pub skipped: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PictureWindow {
    index: usize,
    start: u64,
    len: u64,
}

/// Renders recordings of one dataset.
pub struct PictureRenderer<'a> {
    config: &'a DatasetConfig,
    store: SampleStore,
}

impl<'a> PictureRenderer<'a> {
    pub fn new(config: &'a DatasetConfig) -> Self {
        Self {
            config,
            store: SampleStore::new(config),
        }
    }

    /// Render pictures of `recording` in memory, in annotation order.
    pub fn render(
        &self,
        recording: &Recording,
        params: &RenderParams,
    ) -> Result<Vec<RenderedPicture>, RenderError> {
        params.validate()?;
        let noise_db = self.noise_reference(recording, params);
        let spectrogram = Spectrogram::new(params.fft_size);
        let frames = params.frames_per_picture();
        picture_windows(recording, params)
            .into_iter()
            .map(|window| -> Result<RenderedPicture, RenderError> {
                let start = usize::try_from(window.start).unwrap_or(usize::MAX);
                let power = spectrogram.power_frames(&recording.samples, start, frames);
                let image = match params.mode {
                    RenderMode::Grayscale => PictureImage::Gray(grayscale::render_grayscale(
                        power.view(),
                        params.factors.combined(),
                        noise_db,
                        params.scale,
                    )?),
                    RenderMode::Compressed => PictureImage::Rgb(compressed::render_compressed(
                        power.view(),
                        params.factors,
                        noise_db,
                        params.scale,
                    )?),
                };
                Ok(RenderedPicture {
                    index: window.index,
                    window_start: window.start,
                    window_len: window.len,
                    image,
                    labels: self.label_lines(recording, window, params),
                })
            })
            .collect()
    }

    /// Load `name`, render it and write pictures and label files.
    pub fn render_to_disk(&self, name: &str, params: &RenderParams) -> Result<RenderSummary, RenderError> {
        params.validate()?;
        let recording = self
            .store
            .load_recording(name)
            .map_err(|source| RenderError::SourceLoad {
                name: name.to_string(),
                source,
            })?;
        let dir = self.output_dir(name, params.mode);
        let mut summary = RenderSummary {
            recording: name.to_string(),
            ..RenderSummary::default()
        };

        if params.write_pictures {
            let existing = self.store.existing_pictures(&dir, name)?;
            if !existing.is_empty() {
                if !params.overwrite {
                    info!(
                        "Skipping {name}: {} pictures already in {}",
                        existing.len(),
                        dir.display()
                    );
                    summary.skipped = true;
                    return Ok(summary);
                }
                summary.removed = self.store.remove_pictures(&dir, name)?;
            }
            store::create_dir(&dir)?;
            for picture in self.render(&recording, params)? {
                let path = dir.join(store::picture_file_name(name, picture.index));
                let bytes = picture
                    .image
                    .encode_jpeg(params.jpeg_quality)
                    .map_err(|source| RenderError::Image {
                        path: path.clone(),
                        source,
                    })?;
                store::write_atomic(&path, &bytes)?;
                summary.pictures_written += 1;
                if params.write_labels && !recording.annotations.is_empty() {
                    self.write_labels(&dir, name, picture.index, &picture.labels)?;
                    summary.labels_written += 1;
                }
            }
        } else if params.write_labels && !recording.annotations.is_empty() {
            store::create_dir(&dir)?;
            for window in picture_windows(&recording, params) {
                let labels = self.label_lines(&recording, window, params);
                self.write_labels(&dir, name, window.index, &labels)?;
                summary.labels_written += 1;
            }
        }

        info!(
            "Rendered {name}: {} pictures, {} label files in {}",
            summary.pictures_written,
            summary.labels_written,
            dir.display()
        );
        Ok(summary)
    }

    /// Picture directory of `name` for `mode`.
    pub fn output_dir(&self, name: &str, mode: RenderMode) -> PathBuf {
        match mode {
            RenderMode::Grayscale => self.config.pictures_dir(name),
            RenderMode::Compressed => self.config.compressed_pictures_dir(name),
        }
    }

    /// Recordings that have no pictures yet for `mode`.
    pub fn pending_recordings(&self, mode: RenderMode) -> Result<Vec<String>, RenderError> {
        let mut pending = Vec::new();
        for name in self.store.list_recordings()? {
            let dir = self.output_dir(&name, mode);
            if self.store.existing_pictures(&dir, &name)?.is_empty() {
                pending.push(name);
            }
        }
        Ok(pending)
    }

    fn noise_reference(&self, recording: &Recording, params: &RenderParams) -> f32 {
        if let Some(noise) = params.log_noise {
            return noise;
        }
        if let Some(noise) = recording.metadata.noise_db() {
            return noise;
        }
        let fallback = self.config.settings.default_noise_db;
        warn!(
            "{} has no noise_db; using {fallback} dB",
            recording.name
        );
        fallback
    }

    fn label_lines(&self, recording: &Recording, window: PictureWindow, params: &RenderParams) -> Vec<String> {
        let mut boxes = Vec::new();
        for annotation in &recording.annotations {
            let Some(bbox) = annotation.yolo_box(window.start, window.len) else {
                continue;
            };
            let Some(class_index) = self.config.taxonomy.index_of(&annotation.label) else {
                warn!(
                    "Label {} of {} is not in the class taxonomy; leaving it out",
                    annotation.label, recording.name
                );
                continue;
            };
            boxes.push(LabeledBox { class_index, bbox });
        }
        if params.mode == RenderMode::Compressed {
            boxes = compress_labels(&boxes, params.lines);
        }
        boxes
            .iter()
            .map(|labeled| labeled.bbox.label_line(labeled.class_index))
            .collect()
    }

    fn write_labels(
        &self,
        dir: &Path,
        name: &str,
        index: usize,
        labels: &[String],
    ) -> Result<(), RenderError> {
        let path = dir.join(store::label_file_name(name, index));
        debug!("Writing {} labels to {}", labels.len(), path.display());
        store::write_atomic(&path, labels.join("\n").as_bytes())?;
        Ok(())
    }
}

/// Render `names` to disk on `workers` threads, isolating failures.
pub fn render_recordings(
    renderer: &PictureRenderer<'_>,
    names: Vec<String>,
    params: &RenderParams,
    workers: usize,
) -> BatchReport<RenderSummary> {
    run_batch(
        names,
        workers,
        |name| name.clone(),
        |name| renderer.render_to_disk(name, params),
    )
}

fn picture_windows(recording: &Recording, params: &RenderParams) -> Vec<PictureWindow> {
    let len = params.window_len() as u64;
    let starts: Vec<u64> = if recording.annotations.is_empty() {
        (0..recording.samples.len() as u64).step_by(len as usize).collect()
    } else {
        recording
            .annotations
            .iter()
            .map(|annotation| annotation.time_start / len * len)
            .collect()
    };
    let limit = params.img_limit.unwrap_or(usize::MAX);
    starts
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(index, start)| PictureWindow { index, start, len })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{Annotation, Complex32, RecordingMetadata};
    use tempfile::tempdir;

    fn small_params(mode: RenderMode) -> RenderParams {
        let mut params = RenderParams::from_settings(&ToolSettings::default(), mode);
        params.fft_size = 16;
        params.lines = 4;
        params.factors = CompressionFactors::new(2, 2).unwrap();
        params
    }

    fn annotation(start: u64, end: u64) -> Annotation {
        Annotation {
            label: "wifi".to_string(),
            time_start: start,
            time_end: end,
            freq_low: 0.25,
            freq_high: 0.5,
            snr: None,
        }
    }

    fn noise_recording(len: usize) -> Recording {
        let samples = (0..len)
            .map(|i| Complex32::new(((i * 7) % 13) as f32 * 1e-3, ((i * 5) % 11) as f32 * 1e-3))
            .collect();
        let mut metadata = RecordingMetadata::new();
        metadata.insert("noise_db", -60.0);
        Recording::new("rec_1", samples, metadata)
    }

    #[test]
    fn window_covers_all_compression_frames() {
        let params = small_params(RenderMode::Grayscale);
        assert_eq!(params.frames_per_picture(), 16);
        assert_eq!(params.window_len(), 256);
    }

    #[test]
    fn frames_without_annotations_cover_recording() {
        let params = small_params(RenderMode::Grayscale);
        let windows = picture_windows(&noise_recording(600), &params);
        let starts: Vec<u64> = windows.iter().map(|window| window.start).collect();
        assert_eq!(starts, vec![0, 256, 512]);
    }

    #[test]
    fn annotation_windows_keep_annotation_order_and_limit() {
        let mut params = small_params(RenderMode::Grayscale);
        let recording = noise_recording(2048).with_annotations(vec![
            annotation(700, 800),
            annotation(10, 20),
            annotation(300, 400),
        ]);
        params.img_limit = Some(2);
        let windows = picture_windows(&recording, &params);
        let starts: Vec<u64> = windows.iter().map(|window| window.start).collect();
        assert_eq!(starts, vec![512, 0]);
        assert_eq!(windows[1].index, 1);
    }

    #[test]
    fn grayscale_and_compressed_pictures_have_expected_shapes() {
        let dir = tempdir().unwrap();
        let config = DatasetConfig::with_defaults(dir.path());
        let renderer = PictureRenderer::new(&config);
        let recording = noise_recording(300).with_annotations(vec![annotation(0, 128)]);

        let gray = renderer
            .render(&recording, &small_params(RenderMode::Grayscale))
            .unwrap();
        assert_eq!(gray.len(), 1);
        assert!(matches!(gray[0].image, PictureImage::Gray(_)));
        assert_eq!(gray[0].image.dimensions(), (16, 4));
        assert_eq!(gray[0].labels, vec!["0 0.375000 0.750000 0.250000 0.500000"]);

        let rgb = renderer
            .render(&recording, &small_params(RenderMode::Compressed))
            .unwrap();
        assert!(matches!(rgb[0].image, PictureImage::Rgb(_)));
        assert_eq!(rgb[0].image.dimensions(), (16, 4));
    }

    #[test]
    fn unknown_labels_are_left_out() {
        let dir = tempdir().unwrap();
        let config = DatasetConfig::with_defaults(dir.path());
        let renderer = PictureRenderer::new(&config);
        let mut unknown = annotation(0, 64);
        unknown.label = "radar".to_string();
        let recording = noise_recording(256).with_annotations(vec![unknown, annotation(0, 64)]);
        let pictures = renderer
            .render(&recording, &small_params(RenderMode::Grayscale))
            .unwrap();
        assert_eq!(pictures.len(), 2);
        assert_eq!(pictures[0].labels.len(), 1);
    }

    #[test]
    fn zero_factor_is_an_encoding_error() {
        let dir = tempdir().unwrap();
        let config = DatasetConfig::with_defaults(dir.path());
        let renderer = PictureRenderer::new(&config);
        let mut params = small_params(RenderMode::Compressed);
        params.factors = CompressionFactors { avg: 0, proc: 2 };
        let err = renderer.render(&noise_recording(64), &params).unwrap_err();
        assert!(matches!(err, RenderError::Encoding(_)));
    }

    #[test]
    fn render_mode_parses_case_insensitively() {
        assert_eq!("Compressed".parse::<RenderMode>(), Ok(RenderMode::Compressed));
        assert!("color".parse::<RenderMode>().is_err());
    }

    #[test]
    fn pending_recordings_lose_entries_once_rendered() {
        let dir = tempdir().unwrap();
        let config = DatasetConfig::with_defaults(dir.path());
        let renderer = PictureRenderer::new(&config);
        let store = SampleStore::new(&config);
        let mut second = noise_recording(300);
        second.name = "rec_2".to_string();
        store.save_recording(&noise_recording(300)).unwrap();
        store.save_recording(&second).unwrap();

        let params = small_params(RenderMode::Compressed);
        let report = render_recordings(&renderer, vec!["rec_1".to_string(), "rec_9".to_string()], &params, 2);
        assert_eq!(report.completed.len(), 1);
        assert_eq!(report.failed[0].item, "rec_9");
        assert_eq!(report.completed[0].1.pictures_written, 2);
        assert_eq!(
            renderer.pending_recordings(RenderMode::Compressed).unwrap(),
            vec!["rec_2".to_string()]
        );
        assert_eq!(renderer.pending_recordings(RenderMode::Grayscale).unwrap().len(), 2);
    }
}
