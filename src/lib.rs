//! Apply a whole-image watermark removal service surgically.
//!
//! An external image-editing service (the *oracle*) can remove watermarks but
//! only returns a fully re-rendered image, with no hint of where it changed
//! anything. This crate localizes those edits and composites only the
//! watermark-bearing regions back onto the untouched source, so every other
//! pixel stays byte-identical.
//!
//! # Automatic mode
//!
//! A bounded-size proxy of the source is sent to the oracle once. The proxy and
//! the oracle's answer are compared on a 16 px grid, the hot cells are
//! thresholded, dilated and merged into connected components, and each
//! component becomes a padded full-resolution [`Region`]. Every region is then
//! cropped from the full-resolution source, processed on its own, and pasted
//! back.
//!
//! ```no_run
//! use region_watermark_removal::{PipelineOptions, RegionEngine, RunState};
//! # fn demo(oracle: impl region_watermark_removal::Oracle) -> region_watermark_removal::Result<()> {
//! let engine = RegionEngine::new(oracle);
//! let source = image::open("photo.png").unwrap().to_rgba8();
//! let mut state = RunState::default();
//! let outcome = engine.run_auto(&source, &PipelineOptions::default(), &mut state)?;
//! println!("{} regions, fallback: {}", outcome.regions.len(), outcome.fallback);
//! outcome.image.save("cleaned.png").unwrap();
//! # Ok(())
//! # }
//! ```
//!
//! # Manual mode
//!
//! [`RegionEngine::run_manual`] turns a user-painted mask into a single padded
//! region and skips detection entirely.

#![deny(missing_docs)]

pub mod compositor;
pub mod diff;
mod engine;
pub mod error;
pub mod extract;
#[cfg(feature = "http")]
pub mod http;
pub mod mask;
pub mod oracle;
pub mod processor;
pub mod raster;
pub mod region;
pub mod retry;
pub mod sampler;
pub mod state;

pub use engine::{
    default_output_path, is_supported_image, load_image, save_image, Detection, Mode,
    PipelineOptions, PipelineOutcome, ProcessResult, RegionEngine,
};
pub use error::{Error, Result};
pub use oracle::{EditRequest, Oracle, Quality};
pub use region::Region;
pub use state::{CancelToken, Phase, RunState};
