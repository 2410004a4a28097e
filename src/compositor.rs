//! The composite buffer: a full-resolution copy of the source that is only
//! ever changed by pasting processed regions into it.

use image::RgbaImage;

use crate::error::Result;
use crate::raster;
use crate::region::Region;

/// Owns the mutable output image for one pipeline invocation.
#[derive(Debug, Clone)]
pub struct Compositor {
    canvas: RgbaImage,
}

impl Compositor {
    /// Start from an exact copy of `source`.
    #[must_use]
    pub fn new(source: &RgbaImage) -> Self {
        Self {
            canvas: source.clone(),
        }
    }

    /// The current composite.
    #[must_use]
    pub fn image(&self) -> &RgbaImage {
        &self.canvas
    }

    /// Crop `region` out of the current composite (used by the refinement pass).
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if the region does not fit.
    pub fn crop(&self, region: Region) -> Result<RgbaImage> {
        raster::crop(&self.canvas, region)
    }

    /// Paste `patch` over `region`, resampling it to the region's size first.
    ///
    /// Only the pixels inside `region` are written.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if the region does not fit.
    pub fn apply(&mut self, region: Region, patch: &RgbaImage) -> Result<()> {
        if patch.dimensions() != (region.w, region.h) {
            log::debug!(
                "resampling {}x{} oracle crop to {region}",
                patch.width(),
                patch.height()
            );
        }
        let fitted = raster::resample(patch, region.w, region.h);
        raster::paste(&mut self.canvas, &fitted, region.x, region.y)
    }

    /// Apply every `(region, patch)` pair in order; later pairs win on overlap.
    ///
    /// # Errors
    ///
    /// Stops at the first region that does not fit.
    pub fn apply_all<'a>(
        &mut self,
        pairs: impl IntoIterator<Item = (Region, &'a RgbaImage)>,
    ) -> Result<()> {
        for (region, patch) in pairs {
            self.apply(region, patch)?;
        }
        Ok(())
    }

    /// Consume the compositor and return the final image.
    #[must_use]
    pub fn into_image(self) -> RgbaImage {
        self.canvas
    }
}

/// Paste processed crops onto a copy of `source`.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if any region does not fit `source`.
pub fn composite(source: &RgbaImage, pairs: &[(Region, RgbaImage)]) -> Result<RgbaImage> {
    let mut compositor = Compositor::new(source);
    compositor.apply_all(pairs.iter().map(|(r, p)| (*r, p)))?;
    Ok(compositor.into_image())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn checker(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| {
            if (x / 4 + y / 4) % 2 == 0 {
                Rgba([240, 240, 240, 255])
            } else {
                Rgba([20, 20, 20, 255])
            }
        })
    }

    #[test]
    fn untouched_pixels_stay_identical() {
        let source = checker(64, 48);
        let region = Region { x: 10, y: 12, w: 20, h: 8 };
        let patch = RgbaImage::from_pixel(20, 8, Rgba([1, 2, 3, 255]));
        let out = composite(&source, &[(region, patch)]).unwrap();

        for (x, y, px) in out.enumerate_pixels() {
            if region.contains(x, y) {
                assert_eq!(*px, Rgba([1, 2, 3, 255]));
            } else {
                assert_eq!(px, source.get_pixel(x, y));
            }
        }
    }

    #[test]
    fn mismatched_patch_is_resampled_to_region() {
        let source = checker(64, 64);
        let region = Region { x: 8, y: 8, w: 16, h: 16 };
        let patch = RgbaImage::from_pixel(33, 9, Rgba([9, 9, 9, 255]));
        let out = composite(&source, &[(region, patch)]).unwrap();
        assert_eq!(out.dimensions(), (64, 64));
        assert_eq!(*out.get_pixel(8, 8), Rgba([9, 9, 9, 255]));
        assert_eq!(*out.get_pixel(23, 23), Rgba([9, 9, 9, 255]));
        assert_eq!(out.get_pixel(24, 24), source.get_pixel(24, 24));
    }

    #[test]
    fn later_pastes_win_on_overlap() {
        let source = checker(32, 32);
        let a = Region { x: 0, y: 0, w: 20, h: 20 };
        let b = Region { x: 10, y: 10, w: 20, h: 20 };
        let red = RgbaImage::from_pixel(20, 20, Rgba([255, 0, 0, 255]));
        let blue = RgbaImage::from_pixel(20, 20, Rgba([0, 0, 255, 255]));
        let out = composite(&source, &[(a, red), (b, blue)]).unwrap();
        assert_eq!(*out.get_pixel(5, 5), Rgba([255, 0, 0, 255]));
        assert_eq!(*out.get_pixel(15, 15), Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn refinement_crop_reads_current_composite() {
        let source = checker(32, 32);
        let region = Region { x: 4, y: 4, w: 8, h: 8 };
        let mut compositor = Compositor::new(&source);
        assert_eq!(compositor.image(), &source);

        compositor
            .apply(region, &RgbaImage::from_pixel(8, 8, Rgba([7, 7, 7, 255])))
            .unwrap();
        assert_eq!(*compositor.image().get_pixel(4, 4), Rgba([7, 7, 7, 255]));
        assert_eq!(compositor.image().get_pixel(0, 0), source.get_pixel(0, 0));
        assert_eq!(
            compositor.crop(region).unwrap(),
            RgbaImage::from_pixel(8, 8, Rgba([7, 7, 7, 255]))
        );
    }

    #[test]
    fn region_outside_source_is_rejected() {
        let source = checker(32, 32);
        let mut compositor = Compositor::new(&source);
        let patch = RgbaImage::new(10, 10);
        assert!(compositor
            .apply(Region { x: 30, y: 0, w: 10, h: 10 }, &patch)
            .is_err());
        assert_eq!(compositor.into_image(), source);
    }

    #[test]
    fn crop_reads_current_composite() {
        let source = checker(32, 32);
        let mut compositor = Compositor::new(&source);
        let region = Region { x: 4, y: 4, w: 8, h: 8 };
        let patch = RgbaImage::from_pixel(8, 8, Rgba([7, 7, 7, 255]));
        compositor.apply(region, &patch).unwrap();
        assert_eq!(compositor.crop(region).unwrap(), patch);
    }
}
