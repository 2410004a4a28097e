//! Crop a full-resolution region, run it through the oracle, decode the result.

use image::RgbaImage;

use crate::error::{Error, Result};
use crate::oracle::{EditRequest, Oracle};
use crate::raster;
use crate::region::Region;
use crate::state::RunState;

/// Send `image` to the oracle once and decode the answer.
///
/// Cancellation is checked before the call is issued and again after it
/// returns; a result that arrives after cancellation is discarded.
///
/// # Errors
///
/// Returns [`Error::Cancelled`], any oracle error, or [`Error::Decode`] if the
/// oracle's bytes are not an image.
pub fn call_oracle<O: Oracle + ?Sized>(
    oracle: &O,
    image: &RgbaImage,
    request: &EditRequest,
    state: &mut RunState,
) -> Result<RgbaImage> {
    if state.is_cancelled() {
        return Err(Error::Cancelled);
    }
    let encoded = raster::encode_png(image)?;
    state.record_call();
    let output = oracle.edit(&encoded, request)?;
    if state.is_cancelled() {
        log::debug!("discarding oracle result: cancelled while in flight");
        return Err(Error::Cancelled);
    }
    raster::decode(&output)
}

/// Process one region of `image`.
///
/// The crop is always taken from the full-resolution buffer passed in. The
/// returned patch may differ in size from `region`; the compositor resamples it.
///
/// # Errors
///
/// See [`call_oracle`]; also fails if `region` does not fit `image`.
pub fn process_region<O: Oracle + ?Sized>(
    oracle: &O,
    image: &RgbaImage,
    region: Region,
    request: &EditRequest,
    state: &mut RunState,
) -> Result<RgbaImage> {
    let crop = raster::crop(image, region)?;
    log::debug!("processing region {region}");
    call_oracle(oracle, &crop, request, state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::MANUAL_PARAMS;
    use crate::state::CancelToken;
    use image::Rgba;
    use std::cell::RefCell;

    struct Recorder {
        seen: RefCell<Vec<(u32, u32, u32)>>,
    }

    impl Oracle for Recorder {
        fn edit(&self, image: &[u8], request: &EditRequest) -> Result<Vec<u8>> {
            let img = raster::decode(image)?;
            self.seen
                .borrow_mut()
                .push((img.width(), img.height(), request.steps));
            Ok(image.to_vec())
        }
    }

    struct Garbage;

    impl Oracle for Garbage {
        fn edit(&self, _image: &[u8], _request: &EditRequest) -> Result<Vec<u8>> {
            Ok(b"definitely not a png".to_vec())
        }
    }

    #[test]
    fn crops_exact_region_at_full_resolution() {
        let img = RgbaImage::from_pixel(2000, 1500, Rgba([10, 20, 30, 255]));
        let oracle = Recorder {
            seen: RefCell::new(Vec::new()),
        };
        let mut state = RunState::default();
        let region = Region { x: 100, y: 200, w: 321, h: 123 };
        let req = EditRequest::new("p", MANUAL_PARAMS);
        let out = process_region(&oracle, &img, region, &req, &mut state).unwrap();
        assert_eq!(out.dimensions(), (321, 123));
        assert_eq!(*oracle.seen.borrow(), vec![(321, 123, 75)]);
        assert_eq!(state.oracle_calls(), 1);
    }

    #[test]
    fn cancelled_state_issues_no_call() {
        let img = RgbaImage::new(64, 64);
        let oracle = Recorder {
            seen: RefCell::new(Vec::new()),
        };
        let token = CancelToken::new();
        token.cancel();
        let mut state = RunState::new(token);
        let req = EditRequest::new("p", MANUAL_PARAMS);
        let out = process_region(&oracle, &img, Region::full(64, 64), &req, &mut state);
        assert!(matches!(out, Err(Error::Cancelled)));
        assert!(oracle.seen.borrow().is_empty());
        assert_eq!(state.oracle_calls(), 0);
    }

    #[test]
    fn undecodable_output_is_decode_error() {
        let img = RgbaImage::new(32, 32);
        let mut state = RunState::default();
        let req = EditRequest::new("p", MANUAL_PARAMS);
        let out = call_oracle(&Garbage, &img, &req, &mut state);
        assert!(matches!(out, Err(Error::Decode(_))));
    }
}
