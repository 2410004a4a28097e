//! Error types for the region-watermark-removal crate.

/// Errors that can occur while detecting, processing, or compositing regions.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The oracle call failed or returned unusable data.
    #[error("oracle request failed{}: {detail}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Oracle {
        /// Upstream HTTP status, if the failure came from a response.
        status: Option<u16>,
        /// Upstream error detail.
        detail: String,
    },

    /// The oracle reported success but returned no image.
    #[error("oracle response contained no result image")]
    MissingResult,

    /// Manual mode was invoked with a mask that has no painted pixels.
    #[error("mask contains no painted pixels")]
    NoMask,

    /// The mask raster does not match the declared display canvas.
    #[error("mask is {mask_width}x{mask_height} but display canvas is {display_width}x{display_height}")]
    MaskSize {
        /// Mask width in pixels.
        mask_width: u32,
        /// Mask height in pixels.
        mask_height: u32,
        /// Display canvas width in pixels.
        display_width: u32,
        /// Display canvas height in pixels.
        display_height: u32,
    },

    /// Input image or oracle output could not be read as a raster.
    #[error("failed to decode image: {0}")]
    Decode(image::ImageError),

    /// A paste would write outside the destination buffer.
    #[error("{src_width}x{src_height} patch at ({x},{y}) exceeds {dst_width}x{dst_height} destination")]
    OutOfBounds {
        /// Paste x offset.
        x: u32,
        /// Paste y offset.
        y: u32,
        /// Patch width.
        src_width: u32,
        /// Patch height.
        src_height: u32,
        /// Destination width.
        dst_width: u32,
        /// Destination height.
        dst_height: u32,
    },

    /// The invocation was cancelled before it completed.
    #[error("pipeline cancelled")]
    Cancelled,

    /// Invalid or incomplete configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The image format is not supported.
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// An error occurred during image processing (load, save, encode).
    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),
}

impl Error {
    /// Whether the upstream rejected the call for rate limiting (HTTP 429).
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Error::Oracle { status: Some(429), .. })
    }
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let io_err = Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(io_err.to_string().contains("gone"));

        let unsupported = Error::UnsupportedFormat("tiff".to_string());
        assert!(unsupported.to_string().contains("tiff"));

        let oracle = Error::Oracle {
            status: Some(503),
            detail: "overloaded".to_string(),
        };
        let msg = oracle.to_string();
        assert!(msg.contains("HTTP 503"));
        assert!(msg.contains("overloaded"));

        let transport = Error::Oracle {
            status: None,
            detail: "connection reset".to_string(),
        };
        assert!(!transport.to_string().contains("HTTP"));

        let oob = Error::OutOfBounds {
            x: 90,
            y: 0,
            src_width: 20,
            src_height: 10,
            dst_width: 100,
            dst_height: 100,
        };
        let msg = oob.to_string();
        assert!(msg.contains("20x10"));
        assert!(msg.contains("100x100"));
    }

    #[test]
    fn only_429_counts_as_rate_limited() {
        let limited = Error::Oracle {
            status: Some(429),
            detail: String::new(),
        };
        assert!(limited.is_rate_limited());

        let server = Error::Oracle {
            status: Some(500),
            detail: String::new(),
        };
        assert!(!server.is_rate_limited());
        assert!(!Error::MissingResult.is_rate_limited());
    }
}
