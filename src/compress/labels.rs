//! Label boxes of compressed pictures.
//!
//! A compressed picture squeezes `avg * proc` times more time into the same
//! height, so short emissions shrink below a pixel and neighbouring bursts of
//! one emitter collapse together. Thin boxes are dropped and touching boxes of
//! the same class are merged.

use crate::recording::YoloBox;

/// A YOLO box with its class index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabeledBox {
    pub class_index: u32,
    pub bbox: YoloBox,
}

impl LabeledBox {
    fn left(&self) -> f32 {
        self.bbox.x_center - self.bbox.width / 2.0
    }

    fn right(&self) -> f32 {
        self.bbox.x_center + self.bbox.width / 2.0
    }

    fn top(&self) -> f32 {
        self.bbox.y_center - self.bbox.height / 2.0
    }

    fn bottom(&self) -> f32 {
        self.bbox.y_center + self.bbox.height / 2.0
    }

    fn touches(&self, other: &Self, row_height: f32) -> bool {
        let shares_band = self.left() <= other.right() && other.left() <= self.right();
        let gap = (other.top() - self.bottom()).max(self.top() - other.bottom());
        self.class_index == other.class_index && shares_band && gap <= row_height
    }

    fn union(&self, other: &Self) -> Self {
        let left = self.left().min(other.left());
        let right = self.right().max(other.right());
        let top = self.top().min(other.top());
        let bottom = self.bottom().max(other.bottom());
        Self {
            class_index: self.class_index,
            bbox: YoloBox {
                x_center: (left + right) / 2.0,
                y_center: (top + bottom) / 2.0,
                width: right - left,
                height: bottom - top,
            },
        }
    }
}

/// Drop boxes thinner than one of `rows` picture rows, then merge boxes of the
/// same class whose bands overlap and whose time gap is at most one row.
///
/// The result is ordered by class, then by top edge.
pub fn compress_labels(boxes: &[LabeledBox], rows: usize) -> Vec<LabeledBox> {
    let row_height = 1.0 / rows.max(1) as f32;
    let mut kept: Vec<LabeledBox> = boxes
        .iter()
        .copied()
        .filter(|labeled| labeled.bbox.height >= row_height)
        .collect();
    'merge: loop {
        for i in 0..kept.len() {
            for j in (i + 1)..kept.len() {
                if kept[i].touches(&kept[j], row_height) {
                    let merged = kept[i].union(&kept[j]);
                    kept.swap_remove(j);
                    kept[i] = merged;
                    continue 'merge;
                }
            }
        }
        break;
    }
    kept.sort_by(|a, b| {
        a.class_index
            .cmp(&b.class_index)
            .then_with(|| a.top().total_cmp(&b.top()))
    });
    kept
}
