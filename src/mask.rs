//! Manual entry point: a user-painted mask becomes one source-space region.
//!
//! The mask is painted over a *display* canvas, which need not match the
//! source resolution. Painted pixels are those whose alpha exceeds
//! [`ALPHA_FLOOR`] (about 4% of full opacity).

use image::RgbaImage;

use crate::error::{Error, Result};
use crate::region::Region;

/// Alpha values at or below this are treated as unpainted.
pub const ALPHA_FLOOR: u8 = 10;
/// Minimum padding around a painted box, in source pixels.
pub const MIN_MASK_PAD: u32 = 50;
/// Padding as a fraction of the source edge along the same axis.
pub const MASK_PAD_FRACTION: f64 = 0.12;

/// Bounding box of painted pixels in display space, half-open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaintedBox {
    /// Left edge (inclusive).
    pub x0: u32,
    /// Top edge (inclusive).
    pub y0: u32,
    /// Right edge (exclusive).
    pub x1: u32,
    /// Bottom edge (exclusive).
    pub y1: u32,
}

/// Find the bounding box of all painted pixels.
///
/// # Errors
///
/// Returns [`Error::NoMask`] if no pixel's alpha exceeds [`ALPHA_FLOOR`].
pub fn painted_bounds(mask: &RgbaImage) -> Result<PaintedBox> {
    let mut bounds: Option<PaintedBox> = None;
    for (x, y, px) in mask.enumerate_pixels() {
        if px[3] <= ALPHA_FLOOR {
            continue;
        }
        let b = bounds.get_or_insert(PaintedBox {
            x0: x,
            y0: y,
            x1: x + 1,
            y1: y + 1,
        });
        b.x0 = b.x0.min(x);
        b.y0 = b.y0.min(y);
        b.x1 = b.x1.max(x + 1);
        b.y1 = b.y1.max(y + 1);
    }
    bounds.ok_or(Error::NoMask)
}

/// Padding along one axis: `max(50, round(0.12 * edge))`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn mask_padding(edge: u32) -> u32 {
    let scaled = (MASK_PAD_FRACTION * f64::from(edge)).round() as u32;
    MIN_MASK_PAD.max(scaled)
}

/// Convert a painted mask into a single padded source-space region.
///
/// `mask` must have the display canvas's dimensions; `source` gives the
/// resolution the region is mapped into.
///
/// # Errors
///
/// Returns [`Error::MaskSize`] if the mask does not match the display canvas,
/// [`Error::Config`] if the source frame is empty, and [`Error::NoMask`] if
/// nothing is painted.
pub fn mask_to_region(
    mask: &RgbaImage,
    display: (u32, u32),
    source: (u32, u32),
) -> Result<Region> {
    let (display_width, display_height) = display;
    if mask.dimensions() != display || display_width == 0 || display_height == 0 {
        return Err(Error::MaskSize {
            mask_width: mask.width(),
            mask_height: mask.height(),
            display_width,
            display_height,
        });
    }

    let (width, height) = source;
    if width == 0 || height == 0 {
        return Err(Error::Config(format!(
            "cannot map a mask onto an empty {width}x{height} source"
        )));
    }
    let painted = painted_bounds(mask)?;
    let scale_x = f64::from(width) / f64::from(display_width);
    let scale_y = f64::from(height) / f64::from(display_height);
    let pad_x = f64::from(mask_padding(width));
    let pad_y = f64::from(mask_padding(height));

    let region = Region::from_bounds(
        f64::from(painted.x0) * scale_x - pad_x,
        f64::from(painted.y0) * scale_y - pad_y,
        f64::from(painted.x1) * scale_x + pad_x,
        f64::from(painted.y1) * scale_y + pad_y,
        width,
        height,
    )
    .ok_or(Error::NoMask)?;

    log::debug!("mask {painted:?} on {display_width}x{display_height} canvas -> region {region}");
    Ok(region)
}
