//! Frame producer abstractions.
//!
//! The notifier only needs to know how large a frame is and its pixel
//! dimensions ([`FrameGeometry`]); the device traits describe where frames
//! come from so real and mock producers can drive it the same way.

use std::time::Duration;
use thiserror::Error;

/// Pixel format representation (e.g., NV21, YUYV, RGB3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Create a new `FourCC` from a 4-byte array.
    #[must_use]
    pub const fn new(code: &[u8; 4]) -> Self {
        Self(*code)
    }

    /// NV21 pixel format (4:2:0, Y plane then interleaved V/U).
    pub const NV21: Self = Self::new(b"NV21");
    /// YUYV pixel format (4:2:2 packed).
    pub const YUYV: Self = Self::new(b"YUYV");
    /// RGB3 pixel format (24-bit RGB).
    pub const RGB3: Self = Self::new(b"RGB3");

    /// Bytes per line and total frame size for the given dimensions.
    #[must_use]
    pub const fn layout(self, width: u32, height: u32) -> (u32, u32) {
        match self.0 {
            [b'N', b'V', b'2', b'1'] => (width, width * height * 3 / 2),
            [b'R', b'G', b'B', b'3'] => (width * 3, width * height * 3),
            _ => (width * 2, width * height * 2),
        }
    }
}

impl From<v4l::FourCC> for FourCC {
    fn from(fourcc: v4l::FourCC) -> Self {
        Self(fourcc.repr)
    }
}

impl From<FourCC> for v4l::FourCC {
    fn from(fourcc: FourCC) -> Self {
        Self::new(&fourcc.0)
    }
}

/// Video format specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel format.
    pub fourcc: FourCC,
    /// Bytes per line (stride) of the first plane.
    pub stride: u32,
    /// Total frame size in bytes.
    pub size: u32,
}

impl Format {
    /// Create a new format specification.
    #[must_use]
    pub const fn new(width: u32, height: u32, fourcc: FourCC) -> Self {
        let (stride, size) = fourcc.layout(width, height);
        Self {
            width,
            height,
            fourcc,
            stride,
            size,
        }
    }
}

/// Size and dimensions of the frames a producer emits.
pub trait FrameGeometry {
    /// Bytes in one frame buffer.
    fn frame_buffer_size(&self) -> usize;
    /// Frame width in pixels.
    fn frame_width(&self) -> u32;
    /// Frame height in pixels.
    fn frame_height(&self) -> u32;
    /// Pixel format of each frame.
    fn frame_fourcc(&self) -> FourCC;
}

impl FrameGeometry for Format {
    fn frame_buffer_size(&self) -> usize {
        self.size as usize
    }

    fn frame_width(&self) -> u32 {
        self.width
    }

    fn frame_height(&self) -> u32 {
        self.height
    }

    fn frame_fourcc(&self) -> FourCC {
        self.fourcc
    }
}

/// Device capability flags.
#[derive(Debug, Clone, Default)]
pub struct DeviceCapabilities {
    /// Driver name.
    pub driver: String,
    /// Card/device name.
    pub card: String,
    /// Bus information.
    pub bus_info: String,
    /// Whether the device can capture video.
    pub can_capture: bool,
    /// Whether the device supports streaming.
    pub can_stream: bool,
}

/// Metadata for a captured frame.
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    /// Frame sequence number.
    pub sequence: u32,
    /// Capture timestamp.
    pub timestamp: Duration,
    /// Actual bytes used in the frame buffer.
    pub bytes_used: u32,
}

impl FrameMetadata {
    /// Capture timestamp in nanoseconds, saturating at `i64::MAX`.
    #[must_use]
    pub fn timestamp_nanos(&self) -> i64 {
        i64::try_from(self.timestamp.as_nanos()).unwrap_or(i64::MAX)
    }
}

/// A captured video frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw frame data.
    pub data: Vec<u8>,
    /// Frame metadata.
    pub metadata: FrameMetadata,
}

/// Error type for camera device operations.
#[derive(Debug, Error)]
pub enum CameraError {
    /// Device with given index was not found.
    #[error("Device {0} not found")]
    DeviceNotFound(u32),
    /// Failed to open device.
    #[error("Failed to open device: {0}")]
    DeviceOpenFailed(String),
    /// Requested format is not supported.
    #[error("Format not supported: {0:?}")]
    FormatNotSupported(Format),
    /// Error during streaming operation.
    #[error("Stream error: {0}")]
    StreamError(String),
    /// Operation timed out.
    #[error("Operation timed out")]
    Timeout,
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for camera operations.
pub type Result<T> = std::result::Result<T, CameraError>;

/// Abstraction over camera device operations.
pub trait CameraDevice {
    /// The stream type returned by `create_stream`.
    type Stream<'a>: CaptureStream
    where
        Self: 'a;

    /// Get device capabilities.
    fn capabilities(&self) -> &DeviceCapabilities;

    /// Get current format.
    fn format(&self) -> Result<Format>;

    /// Set capture format. Returns the actual format set by the driver.
    fn set_format(&mut self, format: &Format) -> Result<Format>;

    /// Create a capture stream with the specified number of buffers.
    fn create_stream(&mut self, buffer_count: u32) -> Result<Self::Stream<'_>>;
}

/// Abstraction over capture stream operations.
pub trait CaptureStream {
    /// Capture the next frame from the stream.
    fn next_frame(&mut self) -> Result<Frame>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_layout_per_fourcc() {
        let nv21 = Format::new(640, 480, FourCC::NV21);
        assert_eq!(nv21.stride, 640);
        assert_eq!(nv21.frame_buffer_size(), 460_800);

        let yuyv = Format::new(640, 480, FourCC::YUYV);
        assert_eq!(yuyv.stride, 1280);
        assert_eq!(yuyv.size, 614_400);

        let rgb = Format::new(4, 2, FourCC::RGB3);
        assert_eq!((rgb.stride, rgb.size), (12, 24));
    }

    #[test]
    fn test_timestamp_nanos() {
        let meta = FrameMetadata {
            sequence: 0,
            timestamp: Duration::from_millis(40),
            bytes_used: 0,
        };
        assert_eq!(meta.timestamp_nanos(), 40_000_000);
    }
}
