//! Error types for notifier control operations and still-image encoding.

use thiserror::Error;

/// Errors returned by notifier control operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NotifierError {
    /// The requested mode is not supported by this camera.
    #[error("Operation not supported: {0}")]
    UnsupportedOperation(&'static str),

    /// Recording was requested with a frame rate that yields no interval.
    #[error("Invalid frame rate: {0} fps")]
    InvalidFrameRate(i32),
}

/// Errors raised while building EXIF data, thumbnails or JPEG images.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The raw frame holds fewer bytes than its dimensions require.
    #[error("Frame too small: expected {expected} bytes, got {actual}")]
    FrameTooSmall {
        /// Bytes required by the frame dimensions.
        expected: usize,
        /// Bytes actually supplied.
        actual: usize,
    },

    /// Zero-sized or odd dimensions for a 4:2:0 frame.
    #[error("Invalid dimensions: {width}x{height}")]
    InvalidDimensions {
        /// Frame width in pixels.
        width: u32,
        /// Frame height in pixels.
        height: u32,
    },

    /// The JPEG encoder rejected the image.
    #[error("JPEG encoding failed: {0}")]
    Jpeg(#[from] image::ImageError),

    /// The EXIF block does not fit in a single APP1 segment.
    #[error("EXIF block too large: {0} bytes")]
    ExifTooLarge(usize),
}

/// Result type for encoding operations.
pub type EncodeResult<T> = std::result::Result<T, EncodeError>;
