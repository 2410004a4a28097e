//! Per-cell dissimilarity between a proxy source and a proxy oracle output.
//!
//! The proxy is partitioned into square cells of [`CELL_SIZE`] pixels. Each
//! cell's score is the mean over its in-bounds pixels of
//! `max(|dR|, |dG|, |dB|)`, so scores live in `[0, 255]`.

use image::RgbaImage;

use crate::raster;

/// Edge length of a grid cell, in proxy pixels.
pub const CELL_SIZE: u32 = 16;

/// A coarse score grid over the proxy image, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffGrid {
    /// Number of cell columns (`ceil(proxy_width / CELL_SIZE)`).
    pub cols: usize,
    /// Number of cell rows (`ceil(proxy_height / CELL_SIZE)`).
    pub rows: usize,
    /// One non-negative score per cell.
    pub scores: Vec<f32>,
}

impl DiffGrid {
    /// Grid built directly from precomputed scores.
    ///
    /// # Panics
    ///
    /// Panics if `scores.len() != cols * rows`.
    #[must_use]
    pub fn from_scores(cols: usize, rows: usize, scores: Vec<f32>) -> Self {
        assert_eq!(scores.len(), cols * rows, "score count must match grid size");
        Self { cols, rows, scores }
    }

    /// Score of the cell at `(col, row)`.
    #[must_use]
    pub fn score(&self, col: usize, row: usize) -> f32 {
        self.scores[row * self.cols + col]
    }

    /// Whether the grid has no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

/// Number of cells covering `len` pixels.
#[must_use]
pub fn cell_count(len: u32) -> usize {
    len.div_ceil(CELL_SIZE) as usize
}

/// Score every cell of `source` against `edited`.
///
/// `edited` is resampled to the proxy's size first if the oracle returned a
/// different resolution. Neither input is modified.
#[must_use]
pub fn analyze(source: &RgbaImage, edited: &RgbaImage) -> DiffGrid {
    let (w, h) = source.dimensions();
    let resized;
    let edited = if edited.dimensions() == (w, h) {
        edited
    } else {
        log::debug!(
            "resampling oracle output {}x{} to proxy {w}x{h}",
            edited.width(),
            edited.height()
        );
        resized = raster::resample(edited, w, h);
        &resized
    };

    let cols = cell_count(w);
    let rows = cell_count(h);
    let mut scores = vec![0.0_f32; cols * rows];
    if scores.is_empty() {
        return DiffGrid { cols, rows, scores };
    }

    let score_row = |(row, out): (usize, &mut [f32])| {
        for (col, slot) in out.iter_mut().enumerate() {
            *slot = cell_score(source, edited, col, row);
        }
    };

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        scores.par_chunks_mut(cols).enumerate().for_each(score_row);
    }

    #[cfg(not(feature = "parallel"))]
    {
        scores.chunks_mut(cols).enumerate().for_each(score_row);
    }

    DiffGrid { cols, rows, scores }
}

/// Mean channel-max absolute difference over one cell, clipped to the image.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn cell_score(a: &RgbaImage, b: &RgbaImage, col: usize, row: usize) -> f32 {
    let x0 = col as u32 * CELL_SIZE;
    let y0 = row as u32 * CELL_SIZE;
    let x1 = (x0 + CELL_SIZE).min(a.width());
    let y1 = (y0 + CELL_SIZE).min(a.height());

    let mut total = 0_u64;
    for y in y0..y1 {
        for x in x0..x1 {
            let pa = a.get_pixel(x, y);
            let pb = b.get_pixel(x, y);
            let d = (0..3).map(|c| pa[c].abs_diff(pb[c])).max().unwrap_or(0);
            total += u64::from(d);
        }
    }

    let count = u64::from(x1 - x0) * u64::from(y1 - y0);
    if count == 0 {
        0.0
    } else {
        (total as f64 / count as f64) as f32
    }
}
