//! Bounded-size proxy images for cheap detection.

use image::RgbaImage;

use crate::raster;

/// Largest edge of a detection proxy, in pixels.
pub const MAX_PROXY_EDGE: u32 = 768;

/// A downscaled working copy of a source image.
#[derive(Debug, Clone)]
pub struct Proxy {
    /// The proxy pixels.
    pub image: RgbaImage,
    /// `source_width / proxy_width`.
    pub scale_x: f64,
    /// `source_height / proxy_height`.
    pub scale_y: f64,
}

/// Produce a proxy whose larger edge is at most [`MAX_PROXY_EDGE`].
///
/// Images that already fit are copied unchanged with a scale of 1. Otherwise
/// the aspect ratio is preserved and both edges are rounded to the nearest
/// integer (never below 1).
#[must_use]
pub fn sample(source: &RgbaImage) -> Proxy {
    let (w, h) = source.dimensions();
    let (pw, ph) = proxy_dimensions(w, h);
    if (pw, ph) == (w, h) {
        return Proxy {
            image: source.clone(),
            scale_x: 1.0,
            scale_y: 1.0,
        };
    }

    Proxy {
        image: raster::resample(source, pw, ph),
        scale_x: f64::from(w) / f64::from(pw),
        scale_y: f64::from(h) / f64::from(ph),
    }
}

/// Proxy size for a `width`x`height` source.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn proxy_dimensions(width: u32, height: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= MAX_PROXY_EDGE {
        return (width, height);
    }
    let ratio = f64::from(MAX_PROXY_EDGE) / f64::from(longest);
    let pw = (f64::from(width) * ratio).round().max(1.0) as u32;
    let ph = (f64::from(height) * ratio).round().max(1.0) as u32;
    (pw, ph)
}
