//! Turn a [`DiffGrid`] into full-resolution regions.
//!
//! Four steps, applied in order:
//! 1. **Threshold**: `max(25, median + 15)`; cells strictly above it are flagged
//! 2. **Dilate**: square structuring element of radius 2 (Chebyshev distance)
//! 3. **Components**: 4-neighbour flood fill, one bounding box per component
//! 4. **Map**: grid → proxy pixels → source pixels, pad, clamp, drop noise

use std::collections::VecDeque;

use crate::diff::{DiffGrid, CELL_SIZE};
use crate::region::Region;

/// Lowest threshold ever applied to cell scores.
pub const MIN_THRESHOLD: f32 = 25.0;
/// Margin added to the median score.
pub const MEDIAN_MARGIN: f32 = 15.0;
/// Dilation radius, in cells.
pub const DILATE_RADIUS: usize = 2;
/// Minimum padding around a detected region, in source pixels.
pub const MIN_PAD: u32 = 40;
/// Padding as a fraction of the longest source edge.
pub const PAD_FRACTION: f64 = 0.05;
/// Regions whose width or height is at most this are treated as noise.
pub const NOISE_EDGE: u32 = 20;

/// A component's bounding box in grid coordinates (inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellBox {
    /// First column.
    pub col0: usize,
    /// First row.
    pub row0: usize,
    /// Last column.
    pub col1: usize,
    /// Last row.
    pub row1: usize,
}

impl CellBox {
    fn new(col: usize, row: usize) -> Self {
        Self {
            col0: col,
            row0: row,
            col1: col,
            row1: row,
        }
    }

    fn expand(&mut self, col: usize, row: usize) {
        self.col0 = self.col0.min(col);
        self.row0 = self.row0.min(row);
        self.col1 = self.col1.max(col);
        self.row1 = self.row1.max(row);
    }
}

/// Geometry needed to map grid boxes back to the source image.
#[derive(Debug, Clone, Copy)]
pub struct Mapping {
    /// `source_width / proxy_width`.
    pub scale_x: f64,
    /// `source_height / proxy_height`.
    pub scale_y: f64,
    /// Source width.
    pub width: u32,
    /// Source height.
    pub height: u32,
}

/// Median of `scores`; the mean of the two middle values for even counts.
#[must_use]
pub fn median(scores: &[f32]) -> f32 {
    if scores.is_empty() {
        return 0.0;
    }
    let mut sorted = scores.to_vec();
    sorted.sort_by(f32::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Cell threshold: `max(25, median + 15)`.
#[must_use]
pub fn threshold(scores: &[f32]) -> f32 {
    MIN_THRESHOLD.max(median(scores) + MEDIAN_MARGIN)
}

/// Flag every cell scoring strictly above `threshold`.
#[must_use]
pub fn flag_cells(grid: &DiffGrid, threshold: f32) -> Vec<bool> {
    grid.scores.iter().map(|&s| s > threshold).collect()
}

/// Binary dilation with a `(2 * radius + 1)` square, clipped at grid edges.
#[must_use]
pub fn dilate(flags: &[bool], cols: usize, rows: usize, radius: usize) -> Vec<bool> {
    let mut out = vec![false; flags.len()];
    for (idx, _) in flags.iter().enumerate().filter(|&(_, &f)| f) {
        let (col, row) = (idx % cols, idx / cols);
        let c0 = col.saturating_sub(radius);
        let c1 = (col + radius).min(cols - 1);
        let r0 = row.saturating_sub(radius);
        let r1 = (row + radius).min(rows - 1);
        for r in r0..=r1 {
            out[r * cols + c0..=r * cols + c1].fill(true);
        }
    }
    out
}

/// Bounding boxes of the 4-connected components of `flags`, in row-major
/// discovery order.
#[must_use]
pub fn components(flags: &[bool], cols: usize, rows: usize) -> Vec<CellBox> {
    let mut visited = vec![false; flags.len()];
    let mut boxes = Vec::new();
    let mut queue = VecDeque::new();

    for (start, &flag) in flags.iter().enumerate() {
        if !flag || visited[start] {
            continue;
        }
        let mut bbox = CellBox::new(start % cols, start / cols);
        visited[start] = true;
        queue.push_back(start);

        while let Some(idx) = queue.pop_front() {
            let (col, row) = (idx % cols, idx / cols);
            bbox.expand(col, row);

            let mut neighbors = [None; 4];
            if col > 0 {
                neighbors[0] = Some(idx - 1);
            }
            if col + 1 < cols {
                neighbors[1] = Some(idx + 1);
            }
            if row > 0 {
                neighbors[2] = Some(idx - cols);
            }
            if row + 1 < rows {
                neighbors[3] = Some(idx + cols);
            }

            for n in neighbors.into_iter().flatten() {
                if flags[n] && !visited[n] {
                    visited[n] = true;
                    queue.push_back(n);
                }
            }
        }

        boxes.push(bbox);
    }

    boxes
}

/// Padding applied around detected regions: `max(40, round(0.05 * longest edge))`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn detection_padding(width: u32, height: u32) -> u32 {
    let scaled = (PAD_FRACTION * f64::from(width.max(height))).round() as u32;
    MIN_PAD.max(scaled)
}

/// Map a grid box to a padded, clamped source-space region.
///
/// Returns `None` for boxes that end up empty or no larger than the noise floor.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn map_box(cell_box: CellBox, mapping: &Mapping) -> Option<Region> {
    let cell = f64::from(CELL_SIZE);
    let pad = f64::from(detection_padding(mapping.width, mapping.height));

    let x0 = cell_box.col0 as f64 * cell * mapping.scale_x - pad;
    let y0 = cell_box.row0 as f64 * cell * mapping.scale_y - pad;
    let x1 = (cell_box.col1 + 1) as f64 * cell * mapping.scale_x + pad;
    let y1 = (cell_box.row1 + 1) as f64 * cell * mapping.scale_y + pad;

    Region::from_bounds(x0, y0, x1, y1, mapping.width, mapping.height)
        .filter(|r| r.w > NOISE_EDGE && r.h > NOISE_EDGE)
}

/// Run the full extraction: threshold, dilate, merge, map, filter.
///
/// An empty result means nothing rose above the threshold and the caller must
/// fall back to processing the whole frame.
#[must_use]
pub fn extract_regions(grid: &DiffGrid, mapping: &Mapping) -> Vec<Region> {
    if grid.is_empty() {
        return Vec::new();
    }

    let threshold = threshold(&grid.scores);
    let flags = flag_cells(grid, threshold);
    let flagged = flags.iter().filter(|&&f| f).count();
    log::debug!(
        "diff grid {}x{}: threshold {threshold:.1}, {flagged} cells flagged",
        grid.cols,
        grid.rows
    );
    if flagged == 0 {
        return Vec::new();
    }

    let dilated = dilate(&flags, grid.cols, grid.rows, DILATE_RADIUS);
    let boxes = components(&dilated, grid.cols, grid.rows);
    let regions: Vec<Region> = boxes
        .iter()
        .filter_map(|b| {
            let mapped = map_box(*b, mapping);
            if mapped.is_none() {
                log::debug!("dropping component {b:?}: below noise floor");
            }
            mapped
        })
        .collect();

    log::debug!(
        "{} components merged into {} regions",
        boxes.len(),
        regions.len()
    );
    regions
}
