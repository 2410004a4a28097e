//! Pipeline orchestration: detection, per-region processing, compositing.

use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat, RgbaImage};

use crate::compositor::Compositor;
use crate::diff::{self, DiffGrid};
use crate::error::{Error, Result};
use crate::extract::{self, Mapping};
use crate::mask;
use crate::oracle::{EditParams, EditRequest, Oracle, Quality, MANUAL_PARAMS, REFINE_PROMPT, REMOVE_PROMPT};
use crate::processor;
use crate::region::Region;
use crate::sampler;
use crate::state::{band, CancelToken, Phase, RunState};

/// Options controlling one pipeline invocation.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Sampling preset for automatic mode.
    pub quality: Quality,
    /// Run a second sweep over the same regions with the refinement prompt.
    pub two_pass: bool,
    /// Override for the removal prompt.
    pub prompt: Option<String>,
    /// Override for the refinement prompt.
    pub refine_prompt: Option<String>,
}

impl PipelineOptions {
    fn remove_prompt(&self) -> &str {
        self.prompt.as_deref().unwrap_or(REMOVE_PROMPT)
    }

    fn refine_prompt(&self) -> &str {
        self.refine_prompt.as_deref().unwrap_or(REFINE_PROMPT)
    }
}

/// Output of the detection pass.
#[derive(Debug, Clone)]
pub struct Detection {
    /// Proxy width and height used for scoring.
    pub proxy_size: (u32, u32),
    /// Per-cell scores.
    pub grid: DiffGrid,
    /// Regions in discovery order. Empty means nothing could be localized.
    pub regions: Vec<Region>,
}

/// Result of a successful pipeline invocation.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// The final composite.
    pub image: RgbaImage,
    /// Regions that were processed, in paste order.
    pub regions: Vec<Region>,
    /// Whether detection found nothing and the whole frame was replaced.
    pub fallback: bool,
    /// Total oracle calls, including detection.
    pub oracle_calls: usize,
}

/// Which entry point a file job uses.
#[derive(Debug, Clone)]
pub enum Mode {
    /// Detect regions with a whole-image oracle pass.
    Auto,
    /// Use a painted mask.
    Manual {
        /// Mask raster; painted pixels are those with non-trivial alpha.
        mask: PathBuf,
        /// Size of the canvas the mask was painted on. Defaults to the mask's size.
        display: Option<(u32, u32)>,
    },
}

/// Result of processing a single image file.
#[derive(Debug)]
pub struct ProcessResult {
    /// Path of the processed file.
    pub path: PathBuf,
    /// Whether processing succeeded.
    pub success: bool,
    /// Whether the whole frame was replaced because nothing was localized.
    pub fallback: bool,
    /// Number of regions processed.
    pub regions: usize,
    /// Oracle calls issued.
    pub oracle_calls: usize,
    /// Human-readable status message.
    pub message: String,
}

impl ProcessResult {
    fn failed(path: &Path, message: String) -> Self {
        Self {
            path: path.to_path_buf(),
            success: false,
            fallback: false,
            regions: 0,
            oracle_calls: 0,
            message,
        }
    }
}

/// Drives an [`Oracle`] through detection and region-wise compositing.
///
/// The engine holds no per-invocation state; every call gets its own
/// [`RunState`], proxy, and composite buffer.
pub struct RegionEngine<O> {
    oracle: O,
}

impl<O: Oracle> RegionEngine<O> {
    /// Wrap an oracle.
    pub fn new(oracle: O) -> Self {
        Self { oracle }
    }

    /// The wrapped oracle.
    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Localize the oracle's edits on `source` with one call on a proxy.
    ///
    /// # Errors
    ///
    /// Propagates oracle, decode, and cancellation errors.
    pub fn detect(
        &self,
        source: &RgbaImage,
        request: &EditRequest,
        state: &mut RunState,
    ) -> Result<Detection> {
        state.advance(Phase::Sampling, 5);
        let proxy = sampler::sample(source);
        let proxy_size = proxy.image.dimensions();
        log::debug!(
            "proxy {}x{} for {}x{} source",
            proxy_size.0,
            proxy_size.1,
            source.width(),
            source.height()
        );

        state.advance(Phase::Detecting, 10);
        let edited = processor::call_oracle(&self.oracle, &proxy.image, request, state)?;

        state.advance(Phase::Localizing, 35);
        let grid = diff::analyze(&proxy.image, &edited);
        let mapping = Mapping {
            scale_x: proxy.scale_x,
            scale_y: proxy.scale_y,
            width: source.width(),
            height: source.height(),
        };
        let regions = extract::extract_regions(&grid, &mapping);
        Ok(Detection {
            proxy_size,
            grid,
            regions,
        })
    }

    /// Automatic mode: detect, then process and paste each region.
    ///
    /// Falls back to a single full-frame call when nothing is detected.
    ///
    /// # Errors
    ///
    /// Any failure aborts the invocation; no partial composite is returned.
    pub fn run_auto(
        &self,
        source: &RgbaImage,
        opts: &PipelineOptions,
        state: &mut RunState,
    ) -> Result<PipelineOutcome> {
        let params = opts.quality.params();
        let request = EditRequest::new(opts.remove_prompt(), params);
        let detection = self.detect(source, &request, state)?;

        if detection.regions.is_empty() {
            log::warn!("no regions localized, replacing the whole frame");
            let full = Region::full(source.width(), source.height());
            state.advance(Phase::Processing, 40);
            let patch = processor::process_region(&self.oracle, source, full, &request, state)?;
            let mut compositor = Compositor::new(source);
            compositor.apply(full, &patch)?;
            state.advance(Phase::Done, 100);
            return Ok(PipelineOutcome {
                image: compositor.into_image(),
                regions: vec![full],
                fallback: true,
                oracle_calls: state.oracle_calls(),
            });
        }

        log::info!("{} regions localized", detection.regions.len());
        let image = self.composite_regions(source, &detection.regions, params, opts, state)?;
        Ok(PipelineOutcome {
            image,
            regions: detection.regions,
            fallback: false,
            oracle_calls: state.oracle_calls(),
        })
    }

    /// Manual mode: one region derived from a painted mask, no detection pass.
    ///
    /// `display` is the size of the canvas the mask was painted on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoMask`] before any oracle call if nothing is painted.
    pub fn run_manual(
        &self,
        source: &RgbaImage,
        mask: &RgbaImage,
        display: (u32, u32),
        opts: &PipelineOptions,
        state: &mut RunState,
    ) -> Result<PipelineOutcome> {
        let region = mask::mask_to_region(mask, display, source.dimensions())?;
        log::info!("manual region {region}");
        let regions = vec![region];
        let image = self.composite_regions(source, &regions, MANUAL_PARAMS, opts, state)?;
        Ok(PipelineOutcome {
            image,
            regions,
            fallback: false,
            oracle_calls: state.oracle_calls(),
        })
    }

    /// Crop/process/paste every region in order, then optionally refine.
    fn composite_regions(
        &self,
        source: &RgbaImage,
        regions: &[Region],
        params: EditParams,
        opts: &PipelineOptions,
        state: &mut RunState,
    ) -> Result<RgbaImage> {
        let (start, split) = (40, if opts.two_pass { 70 } else { 95 });
        let mut compositor = Compositor::new(source);

        let request = EditRequest::new(opts.remove_prompt(), params);
        state.advance(Phase::Processing, start);
        for (i, &region) in regions.iter().enumerate() {
            let patch = processor::process_region(&self.oracle, source, region, &request, state)?;
            compositor.apply(region, &patch)?;
            state.advance(Phase::Processing, band(start, split, i + 1, regions.len()));
        }

        if opts.two_pass {
            let refine = EditRequest::new(opts.refine_prompt(), params);
            state.advance(Phase::Refining, split);
            for (i, &region) in regions.iter().enumerate() {
                let crop = compositor.crop(region)?;
                let patch = processor::call_oracle(&self.oracle, &crop, &refine, state)?;
                compositor.apply(region, &patch)?;
                state.advance(Phase::Refining, band(split, 95, i + 1, regions.len()));
            }
        }

        state.advance(Phase::Done, 100);
        Ok(compositor.into_image())
    }

    /// Process a single image file: load, run the pipeline, save.
    ///
    /// Returns a [`ProcessResult`] indicating success or failure.
    #[must_use]
    pub fn process_file(
        &self,
        input: &Path,
        output: &Path,
        mode: &Mode,
        opts: &PipelineOptions,
        cancel: &CancelToken,
    ) -> ProcessResult {
        match self.try_process_file(input, output, mode, opts, cancel) {
            Ok(outcome) => {
                let message = if outcome.fallback {
                    "No regions localized; whole image replaced".to_string()
                } else {
                    format!("{} region(s) cleaned", outcome.regions.len())
                };
                ProcessResult {
                    path: input.to_path_buf(),
                    success: true,
                    fallback: outcome.fallback,
                    regions: outcome.regions.len(),
                    oracle_calls: outcome.oracle_calls,
                    message,
                }
            }
            Err(e) => ProcessResult::failed(input, e.to_string()),
        }
    }

    fn try_process_file(
        &self,
        input: &Path,
        output: &Path,
        mode: &Mode,
        opts: &PipelineOptions,
        cancel: &CancelToken,
    ) -> Result<PipelineOutcome> {
        let source = load_image(input)?;
        let mut state = RunState::new(cancel.clone());
        let outcome = match mode {
            Mode::Auto => self.run_auto(&source, opts, &mut state)?,
            Mode::Manual { mask, display } => {
                let mask = load_image(mask)?;
                let display = display.unwrap_or_else(|| mask.dimensions());
                self.run_manual(&source, &mask, display, opts, &mut state)?
            }
        };

        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        save_image(&outcome.image, output)?;
        Ok(outcome)
    }

    /// Process all supported images in a directory in automatic mode.
    ///
    /// Files are handled one after another; the oracle is never called
    /// concurrently. Stops early if `cancel` fires.
    #[must_use]
    pub fn process_directory(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        opts: &PipelineOptions,
        cancel: &CancelToken,
    ) -> Vec<ProcessResult> {
        let mut entries: Vec<PathBuf> = match std::fs::read_dir(input_dir) {
            Ok(rd) => rd
                .filter_map(std::result::Result::ok)
                .filter(|e| e.file_type().map(|ft| ft.is_file()).unwrap_or(false))
                .map(|e| e.path())
                .filter(|p| is_supported_image(p))
                .collect(),
            Err(e) => {
                return vec![ProcessResult::failed(
                    input_dir,
                    format!("Failed to read directory: {e}"),
                )];
            }
        };
        entries.sort();

        if !output_dir.exists() {
            if let Err(e) = std::fs::create_dir_all(output_dir) {
                return vec![ProcessResult::failed(
                    output_dir,
                    format!("Failed to create output directory: {e}"),
                )];
            }
        }

        let mut results = Vec::with_capacity(entries.len());
        for input_path in entries {
            if cancel.is_cancelled() {
                break;
            }
            let Some(filename) = input_path.file_name() else {
                continue;
            };
            let output_path = output_dir.join(filename);
            results.push(self.process_file(&input_path, &output_path, &Mode::Auto, opts, cancel));
        }
        results
    }
}

/// Load any supported raster as RGBA.
///
/// # Errors
///
/// Returns [`Error::Decode`] if the file cannot be read as an image.
pub fn load_image(path: &Path) -> Result<RgbaImage> {
    image::open(path)
        .map(|img| img.to_rgba8())
        .map_err(Error::Decode)
}

/// Check if a file has a supported image extension.
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => matches!(
            ext.to_lowercase().as_str(),
            "jpg" | "jpeg" | "png" | "webp" | "bmp"
        ),
        None => false,
    }
}

/// Save an RGBA image with format-specific settings.
///
/// JPEG output drops the alpha channel and is written at quality 100.
///
/// # Errors
///
/// Returns an error if the format is unsupported or writing fails.
pub fn save_image(img: &RgbaImage, path: &Path) -> Result<()> {
    let format =
        ImageFormat::from_path(path).map_err(|e| Error::UnsupportedFormat(e.to_string()))?;

    match format {
        ImageFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgba8(img.clone()).to_rgb8();
            let file = std::fs::File::create(path)?;
            let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(file, 100);
            encoder.encode_image(&rgb)?;
        }
        ImageFormat::Png | ImageFormat::WebP | ImageFormat::Bmp => {
            img.save_with_format(path, format)?;
        }
        _ => {
            return Err(Error::UnsupportedFormat(format!("{format:?}")));
        }
    }

    Ok(())
}

/// Generate a default output path from an input path.
///
/// Example: `"photo.jpg"` becomes `"photo_cleaned.jpg"`.
#[must_use]
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    let ext = input.extension().unwrap_or_default().to_string_lossy();
    let parent = input.parent().unwrap_or(Path::new("."));
    parent.join(format!("{stem}_cleaned.{ext}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::cell::RefCell;

    /// Returns the input untouched and records the size of each call.
    struct Identity {
        calls: RefCell<Vec<(u32, u32)>>,
    }

    impl Identity {
        fn new() -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl Oracle for Identity {
        fn edit(&self, image: &[u8], _request: &EditRequest) -> Result<Vec<u8>> {
            let img = crate::raster::decode(image)?;
            self.calls.borrow_mut().push(img.dimensions());
            Ok(image.to_vec())
        }
    }

    #[test]
    fn unchanged_image_falls_back_to_full_frame() {
        let engine = RegionEngine::new(Identity::new());
        let source = RgbaImage::from_pixel(300, 200, Rgba([80, 90, 100, 255]));
        let mut state = RunState::default();
        let outcome = engine
            .run_auto(&source, &PipelineOptions::default(), &mut state)
            .unwrap();
        assert!(outcome.fallback);
        assert_eq!(outcome.regions, vec![Region::full(300, 200)]);
        assert_eq!(outcome.oracle_calls, 2);
        assert_eq!(*engine.oracle().calls.borrow(), vec![(300, 200), (300, 200)]);
        assert_eq!(outcome.image, source);
        assert_eq!(state.progress(), 100);
        assert_eq!(state.phase(), Phase::Done);
    }

    #[test]
    fn manual_mode_skips_detection() {
        let engine = RegionEngine::new(Identity::new());
        let source = RgbaImage::from_pixel(1000, 1000, Rgba([1, 1, 1, 255]));
        let mut mask = RgbaImage::new(500, 500);
        for y in 100..130 {
            for x in 100..150 {
                mask.put_pixel(x, y, Rgba([255, 255, 255, 255]));
            }
        }
        let mut state = RunState::default();
        let outcome = engine
            .run_manual(&source, &mask, (500, 500), &PipelineOptions::default(), &mut state)
            .unwrap();
        assert_eq!(outcome.regions, vec![Region { x: 80, y: 80, w: 340, h: 300 }]);
        assert_eq!(*engine.oracle().calls.borrow(), vec![(340, 300)]);
        assert!(!outcome.fallback);
    }

    #[test]
    fn empty_mask_makes_no_oracle_calls() {
        let engine = RegionEngine::new(Identity::new());
        let source = RgbaImage::new(100, 100);
        let mask = RgbaImage::new(100, 100);
        let mut state = RunState::default();
        let err = engine
            .run_manual(&source, &mask, (100, 100), &PipelineOptions::default(), &mut state)
            .unwrap_err();
        assert!(matches!(err, Error::NoMask));
        assert!(engine.oracle().calls.borrow().is_empty());
    }

    #[test]
    fn options_fall_back_to_default_prompts() {
        let opts = PipelineOptions::default();
        assert_eq!(opts.remove_prompt(), REMOVE_PROMPT);
        assert_eq!(opts.refine_prompt(), REFINE_PROMPT);

        let custom = PipelineOptions {
            prompt: Some("erase the logo".to_string()),
            ..PipelineOptions::default()
        };
        assert_eq!(custom.remove_prompt(), "erase the logo");
    }

    #[test]
    fn default_output_path_appends_cleaned_suffix() {
        let p = default_output_path(Path::new("/tmp/photo.jpg"));
        assert_eq!(p, PathBuf::from("/tmp/photo_cleaned.jpg"));

        let p = default_output_path(Path::new("image.png"));
        assert_eq!(
            p.file_name().unwrap().to_str().unwrap(),
            "image_cleaned.png"
        );
    }

    #[test]
    fn is_supported_image_accepts_common_formats() {
        assert!(is_supported_image(Path::new("photo.jpg")));
        assert!(is_supported_image(Path::new("photo.JPEG")));
        assert!(is_supported_image(Path::new("photo.png")));
        assert!(is_supported_image(Path::new("photo.webp")));
        assert!(is_supported_image(Path::new("photo.bmp")));
    }

    #[test]
    fn is_supported_image_rejects_unsupported_formats() {
        assert!(!is_supported_image(Path::new("photo.gif")));
        assert!(!is_supported_image(Path::new("photo.txt")));
        assert!(!is_supported_image(Path::new("photo")));
    }
}
