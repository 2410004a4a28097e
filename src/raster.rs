//! Pure buffer operations: crop, resample, paste, encode, decode.
//!
//! Every function here is side-effect free except for the explicit
//! destination buffer passed to [`paste`].

use std::io::Cursor;

use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbaImage};

use crate::error::{Error, Result};
use crate::region::Region;

/// Filter used whenever a buffer has to change size (bilinear).
pub const RESAMPLE_FILTER: FilterType = FilterType::Triangle;

/// Copy the pixels of `region` out of `src`.
///
/// # Errors
///
/// Returns [`Error::OutOfBounds`] if the region does not fit inside `src`.
pub fn crop(src: &RgbaImage, region: Region) -> Result<RgbaImage> {
    if !region.fits(src.width(), src.height()) {
        return Err(out_of_bounds(src, region));
    }
    Ok(imageops::crop_imm(src, region.x, region.y, region.w, region.h).to_image())
}

/// Resample `src` to exactly `width`x`height`.
///
/// Returns a plain copy when the size already matches.
#[must_use]
pub fn resample(src: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    if src.dimensions() == (width, height) {
        return src.clone();
    }
    imageops::resize(src, width, height, RESAMPLE_FILTER)
}

/// Overwrite the pixels of `dst` at `(x, y)` with `src`.
///
/// # Errors
///
/// Returns [`Error::OutOfBounds`] if `src` would extend past `dst`. Nothing is
/// written in that case.
pub fn paste(dst: &mut RgbaImage, src: &RgbaImage, x: u32, y: u32) -> Result<()> {
    let target = Region {
        x,
        y,
        w: src.width(),
        h: src.height(),
    };
    if !target.fits(dst.width(), dst.height()) {
        return Err(out_of_bounds(dst, target));
    }

    let src_stride = src.width() as usize * 4;
    let dst_stride = dst.width() as usize * 4;
    let src_raw = src.as_raw();
    let dst_raw: &mut [u8] = dst;
    for (row, line) in src_raw.chunks_exact(src_stride).enumerate() {
        let start = (y as usize + row) * dst_stride + x as usize * 4;
        dst_raw[start..start + src_stride].copy_from_slice(line);
    }
    Ok(())
}

/// Encode an image as PNG bytes.
///
/// # Errors
///
/// Returns [`Error::Image`] if encoding fails.
pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

/// Decode any supported raster into RGBA.
///
/// # Errors
///
/// Returns [`Error::Decode`] if the bytes are not a readable image.
pub fn decode(bytes: &[u8]) -> Result<RgbaImage> {
    image::load_from_memory(bytes)
        .map(|img| img.to_rgba8())
        .map_err(Error::Decode)
}

fn out_of_bounds(dst: &RgbaImage, target: Region) -> Error {
    Error::OutOfBounds {
        x: target.x,
        y: target.y,
        src_width: target.w,
        src_height: target.h,
        dst_width: dst.width(),
        dst_height: dst.height(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn gradient(w: u32, h: u32) -> RgbaImage {
        #[allow(clippy::cast_possible_truncation)]
        RgbaImage::from_fn(w, h, |x, y| Rgba([(x % 256) as u8, (y % 256) as u8, 7, 255]))
    }

    #[test]
    fn crop_copies_exact_rectangle() {
        let img = gradient(40, 30);
        let region = Region { x: 5, y: 7, w: 10, h: 4 };
        let out = crop(&img, region).unwrap();
        assert_eq!(out.dimensions(), (10, 4));
        assert_eq!(out.get_pixel(0, 0), img.get_pixel(5, 7));
        assert_eq!(out.get_pixel(9, 3), img.get_pixel(14, 10));
    }

    #[test]
    fn crop_rejects_region_outside_image() {
        let img = gradient(40, 30);
        let region = Region { x: 35, y: 0, w: 10, h: 4 };
        assert!(matches!(crop(&img, region), Err(Error::OutOfBounds { .. })));
    }

    #[test]
    fn resample_is_identity_for_same_size() {
        let img = gradient(16, 9);
        assert_eq!(resample(&img, 16, 9), img);
        assert_eq!(resample(&img, 8, 3).dimensions(), (8, 3));
    }

    #[test]
    fn paste_only_touches_target_rectangle() {
        let mut dst = gradient(20, 20);
        let original = dst.clone();
        let patch = RgbaImage::from_pixel(4, 3, Rgba([255, 0, 255, 255]));
        paste(&mut dst, &patch, 6, 8).unwrap();

        for (x, y, px) in dst.enumerate_pixels() {
            let inside = (6..10).contains(&x) && (8..11).contains(&y);
            if inside {
                assert_eq!(*px, Rgba([255, 0, 255, 255]));
            } else {
                assert_eq!(px, original.get_pixel(x, y));
            }
        }
    }

    #[test]
    fn paste_out_of_bounds_leaves_destination_untouched() {
        let mut dst = gradient(20, 20);
        let original = dst.clone();
        let patch = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        assert!(paste(&mut dst, &patch, 18, 0).is_err());
        assert_eq!(dst, original);
    }

    #[test]
    fn paste_at_huge_offset_is_out_of_bounds() {
        let mut dst = gradient(100, 100);
        let original = dst.clone();
        let patch = RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 255]));
        assert!(matches!(
            paste(&mut dst, &patch, u32::MAX - 5, 0),
            Err(Error::OutOfBounds { .. })
        ));
        assert!(matches!(
            paste(&mut dst, &patch, 0, u32::MAX - 5),
            Err(Error::OutOfBounds { .. })
        ));
        assert_eq!(dst, original);
    }

    #[test]
    fn crop_at_huge_offset_is_out_of_bounds() {
        let img = gradient(100, 100);
        let region = Region { x: u32::MAX - 5, y: 0, w: 10, h: 10 };
        assert!(matches!(crop(&img, region), Err(Error::OutOfBounds { .. })));
    }

    #[test]
    fn png_encode_decode_preserves_pixels() {
        let img = gradient(12, 12);
        let bytes = encode_png(&img).unwrap();
        assert_eq!(decode(&bytes).unwrap(), img);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(decode(b"not an image"), Err(Error::Decode(_))));
    }
}
