use serde::{Deserialize, Serialize};

/// One labelled time/frequency region of a recording.
///
/// Time is measured in samples over the half-open range
/// `[time_start, time_end)`. Frequency bounds are fractions of the captured
/// band, `0.0` being its lowest frequency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub label: String,
    pub time_start: u64,
    pub time_end: u64,
    pub freq_low: f32,
    pub freq_high: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snr: Option<f32>,
}

/// Normalized YOLO box: centre, width and height as fractions of the picture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YoloBox {
    pub x_center: f32,
    pub y_center: f32,
    pub width: f32,
    pub height: f32,
}

impl YoloBox {
    /// `"<class> x y w h"` with six decimals.
    pub fn label_line(&self, class_index: u32) -> String {
        format!(
            "{} {:.6} {:.6} {:.6} {:.6}",
            class_index, self.x_center, self.y_center, self.width, self.height
        )
    }
}

impl Annotation {
    pub fn duration(&self) -> u64 {
        self.time_end.saturating_sub(self.time_start)
    }

    /// True when the annotation shares at least one sample with `[start, end)`.
    pub fn overlaps(&self, start: u64, end: u64) -> bool {
        self.time_start < end && start < self.time_end
    }

    /// Restrict the annotation to `[start, end)`; `None` when nothing is left.
    pub fn clipped(&self, start: u64, end: u64) -> Option<Self> {
        if !self.overlaps(start, end) {
            return None;
        }
        Some(Self {
            time_start: self.time_start.max(start),
            time_end: self.time_end.min(end),
            ..self.clone()
        })
    }

    /// Move the annotation by `offset` samples. Offsets that would go below
    /// zero saturate at the start of the recording.
    pub fn shifted(&self, offset: i64) -> Self {
        let shift = |value: u64| {
            if offset >= 0 {
                value.saturating_add(offset as u64)
            } else {
                value.saturating_sub(offset.unsigned_abs())
            }
        };
        Self {
            time_start: shift(self.time_start),
            time_end: shift(self.time_end),
            ..self.clone()
        }
    }

    /// Box of this annotation inside a picture covering
    /// `[window_start, window_start + window_len)`.
    ///
    /// Pictures draw time bottom-to-top, so later samples sit nearer the top.
    pub fn yolo_box(&self, window_start: u64, window_len: u64) -> Option<YoloBox> {
        if window_len == 0 || !self.overlaps(window_start, window_start + window_len) {
            return None;
        }
        let to_fraction = |value: u64| {
            let relative = value.saturating_sub(window_start).min(window_len);
            relative as f64 / window_len as f64
        };
        let t0 = to_fraction(self.time_start);
        let t1 = to_fraction(self.time_end);
        let f0 = f64::from(self.freq_low.clamp(0.0, 1.0));
        let f1 = f64::from(self.freq_high.clamp(0.0, 1.0));
        let (f0, f1) = if f0 <= f1 { (f0, f1) } else { (f1, f0) };
        Some(YoloBox {
            x_center: ((f0 + f1) / 2.0) as f32,
            y_center: (1.0 - (t0 + t1) / 2.0) as f32,
            width: (f1 - f0) as f32,
            height: (t1 - t0) as f32,
        })
    }
}
