//! Averaging/decimation kernel behind compressed pictures.
//!
//! Both factors apply along the time axis (rows). Stage one averages runs of
//! `avg` rows of linear power. Stage two reduces runs of `proc` averaged rows
//! to their maximum, minimum and mean. The frequency axis is left intact.
//! Trailing rows that do not fill a whole block are dropped.

mod labels;

use ndarray::{Array2, ArrayView2, Axis};
use thiserror::Error;

pub use labels::{LabeledBox, compress_labels};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodingError {
    #[error("compression factors must be positive (avg {avg}, proc {proc})")]
    ZeroFactor { avg: usize, proc: usize },
    #[error("grid has {rows} rows but one compressed row needs {needed}")]
    TooFewRows { rows: usize, needed: usize },
}

/// The two compounding compression factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionFactors {
    pub avg: usize,
    pub proc: usize,
}

impl CompressionFactors {
    pub fn new(avg: usize, proc: usize) -> Result<Self, EncodingError> {
        if avg == 0 || proc == 0 {
            return Err(EncodingError::ZeroFactor { avg, proc });
        }
        Ok(Self { avg, proc })
    }

    /// Input rows folded into one output row.
    pub fn combined(&self) -> usize {
        self.avg * self.proc
    }

    pub fn output_rows(&self, rows: usize) -> usize {
        rows / self.combined()
    }
}

/// Per-block statistics of a compressed grid, all of the same shape.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressedBlocks {
    pub max: Array2<f32>,
    pub min: Array2<f32>,
    pub mean: Array2<f32>,
}

impl CompressedBlocks {
    pub fn dim(&self) -> (usize, usize) {
        self.mean.dim()
    }
}

/// Mean of each run of `factor` consecutive rows.
pub fn average_rows(grid: ArrayView2<'_, f32>, factor: usize) -> Result<Array2<f32>, EncodingError> {
    let (rows, cols) = grid.dim();
    if factor == 0 {
        return Err(EncodingError::ZeroFactor { avg: factor, proc: 1 });
    }
    if rows < factor {
        return Err(EncodingError::TooFewRows { rows, needed: factor });
    }
    let mut out = Array2::<f32>::zeros((rows / factor, cols));
    for (mut row, block) in out
        .outer_iter_mut()
        .zip(grid.axis_chunks_iter(Axis(0), factor))
    {
        row.assign(&(block.sum_axis(Axis(0)) / factor as f32));
    }
    Ok(out)
}

/// Compress a `(time, frequency)` grid of linear power.
pub fn compress(
    grid: ArrayView2<'_, f32>,
    factors: CompressionFactors,
) -> Result<CompressedBlocks, EncodingError> {
    let CompressionFactors { avg, proc } = factors;
    if avg == 0 || proc == 0 {
        return Err(EncodingError::ZeroFactor { avg, proc });
    }
    let rows = grid.nrows();
    if rows < factors.combined() {
        return Err(EncodingError::TooFewRows {
            rows,
            needed: factors.combined(),
        });
    }
    let averaged = average_rows(grid, avg)?;
    let out_rows = averaged.nrows() / proc;
    let cols = averaged.ncols();
    let mut blocks = CompressedBlocks {
        max: Array2::zeros((out_rows, cols)),
        min: Array2::zeros((out_rows, cols)),
        mean: Array2::zeros((out_rows, cols)),
    };
    for (index, block) in averaged
        .axis_chunks_iter(Axis(0), proc)
        .take(out_rows)
        .enumerate()
    {
        blocks
            .max
            .row_mut(index)
            .assign(&block.fold_axis(Axis(0), f32::NEG_INFINITY, |&acc, &v| acc.max(v)));
        blocks
            .min
            .row_mut(index)
            .assign(&block.fold_axis(Axis(0), f32::INFINITY, |&acc, &v| acc.min(v)));
        blocks
            .mean
            .row_mut(index)
            .assign(&(block.sum_axis(Axis(0)) / proc as f32));
    }
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn output_dims_divide_rows_by_combined_factor() {
        let grid = Array2::<f32>::ones((24, 5));
        let factors = CompressionFactors::new(3, 4).unwrap();
        let blocks = compress(grid.view(), factors).unwrap();
        assert_eq!(blocks.dim(), (2, 5));
        assert_eq!(factors.output_rows(24), 2);
    }

    #[test]
    fn statistics_follow_two_stages() {
        // Rows 0..4 averaged in pairs: [1, 3] -> 2 and [5, 7] -> 6.
        let grid = array![[1.0f32], [3.0], [5.0], [7.0]];
        let blocks = compress(grid.view(), CompressionFactors::new(2, 2).unwrap()).unwrap();
        assert_eq!(blocks.max, array![[6.0f32]]);
        assert_eq!(blocks.min, array![[2.0f32]]);
        assert_eq!(blocks.mean, array![[4.0f32]]);
    }

    #[test]
    fn trailing_partial_blocks_are_dropped() {
        let grid = Array2::from_shape_fn((7, 2), |(row, _)| row as f32);
        let averaged = average_rows(grid.view(), 3).unwrap();
        assert_eq!(averaged, array![[1.0f32, 1.0], [4.0, 4.0]]);
        let blocks = compress(grid.view(), CompressionFactors::new(1, 3).unwrap()).unwrap();
        assert_eq!(blocks.dim(), (2, 2));
        assert_eq!(blocks.max, array![[2.0f32, 2.0], [5.0, 5.0]]);
    }

    #[test]
    fn invalid_inputs_are_encoding_errors() {
        assert_eq!(
            CompressionFactors::new(0, 4),
            Err(EncodingError::ZeroFactor { avg: 0, proc: 4 })
        );
        let grid = Array2::<f32>::zeros((11, 3));
        let err = compress(grid.view(), CompressionFactors::new(3, 4).unwrap()).unwrap_err();
        assert_eq!(err, EncodingError::TooFewRows { rows: 11, needed: 12 });
    }
}
