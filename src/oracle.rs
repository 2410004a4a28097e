//! Boundary to the external image-editing service.
//!
//! The oracle takes an encoded image plus a prompt and sampling parameters and
//! returns a whole re-rendered image. It says nothing about *where* it changed
//! anything; localization is done by [`crate::diff`] and [`crate::extract`].

use crate::error::Result;

/// Prompt used for the detection pass and the first processing pass.
pub const REMOVE_PROMPT: &str = "Remove all watermarks, logos, text overlays, and semi-transparent marks \
from this image. Restore the background naturally. Keep the original image content, colors, and details intact.";

/// Prompt used by the second refinement pass.
pub const REFINE_PROMPT: &str = "Remove any remaining watermark artifacts, faint text residue, and \
semi-transparent traces from this image. Do not change anything else.";

/// Parameters for one oracle call.
#[derive(Debug, Clone, PartialEq)]
pub struct EditRequest {
    /// Instruction for the editing model.
    pub prompt: String,
    /// Number of inference steps.
    pub steps: u32,
    /// Classifier-free guidance scale.
    pub guidance: f32,
}

impl EditRequest {
    /// Request with the given prompt and `(steps, guidance)` pair.
    #[must_use]
    pub fn new(prompt: impl Into<String>, params: EditParams) -> Self {
        Self {
            prompt: prompt.into(),
            steps: params.steps,
            guidance: params.guidance,
        }
    }
}

/// A `(steps, guidance)` pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EditParams {
    /// Number of inference steps.
    pub steps: u32,
    /// Guidance scale.
    pub guidance: f32,
}

/// Fixed parameters for manual (mask-driven) mode.
pub const MANUAL_PARAMS: EditParams = EditParams {
    steps: 75,
    guidance: 9.0,
};

/// Quality preset for automatic mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum Quality {
    /// 40 steps, guidance 7.
    Fast,
    /// 65 steps, guidance 9.
    #[default]
    Standard,
    /// 80 steps, guidance 10.
    High,
}

impl Quality {
    /// The `(steps, guidance)` pair for this preset.
    #[must_use]
    pub fn params(self) -> EditParams {
        match self {
            Quality::Fast => EditParams {
                steps: 40,
                guidance: 7.0,
            },
            Quality::Standard => EditParams {
                steps: 65,
                guidance: 9.0,
            },
            Quality::High => EditParams {
                steps: 80,
                guidance: 10.0,
            },
        }
    }
}

/// An opaque whole-image editing service.
///
/// Calls block until the oracle answers or fails. The pipeline never issues
/// two calls at once.
pub trait Oracle {
    /// Send `image` (an encoded raster) and return the edited image bytes.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Oracle`] when the call fails and
    /// [`crate::Error::MissingResult`] when it succeeds without an image.
    fn edit(&self, image: &[u8], request: &EditRequest) -> Result<Vec<u8>>;
}

impl<T: Oracle + ?Sized> Oracle for &T {
    fn edit(&self, image: &[u8], request: &EditRequest) -> Result<Vec<u8>> {
        (**self).edit(image, request)
    }
}

impl<T: Oracle + ?Sized> Oracle for Box<T> {
    fn edit(&self, image: &[u8], request: &EditRequest) -> Result<Vec<u8>> {
        (**self).edit(image, request)
    }
}
