//! Mock frame producer for testing without hardware.

use crate::traits::{
    CameraDevice, CaptureStream, DeviceCapabilities, Format, FourCC, Frame, FrameMetadata, Result,
};
use std::time::Duration;

/// Mock device for testing without hardware.
pub struct MockDevice {
    capabilities: DeviceCapabilities,
    format: Format,
    frame_count: u32,
    frame_interval: Duration,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDevice {
    /// Create a new mock device producing small NV21 frames at ~30fps.
    #[must_use]
    pub fn new() -> Self {
        Self {
            capabilities: DeviceCapabilities {
                driver: "mock".to_owned(),
                card: "Mock Camera".to_owned(),
                bus_info: "mock:0".to_owned(),
                can_capture: true,
                can_stream: true,
            },
            format: Format::new(32, 24, FourCC::NV21),
            frame_count: 0,
            frame_interval: Duration::from_nanos(33_333_333),
        }
    }

    /// Set the format for this mock device.
    #[must_use]
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Set the spacing between consecutive frame timestamps.
    #[must_use]
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }
}

impl CameraDevice for MockDevice {
    type Stream<'a> = MockStream<'a>;

    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn format(&self) -> Result<Format> {
        Ok(self.format.clone())
    }

    fn set_format(&mut self, format: &Format) -> Result<Format> {
        self.format = format.clone();
        Ok(self.format.clone())
    }

    fn create_stream(&mut self, _buffer_count: u32) -> Result<Self::Stream<'_>> {
        Ok(MockStream {
            device: self,
            pattern: TestPattern::ColorBars,
        })
    }
}

/// Test pattern types for mock frame generation.
#[derive(Debug, Clone, Copy)]
pub enum TestPattern {
    /// Eight vertical color bars.
    ColorBars,
    /// Solid color with specified Y, U, V values.
    Solid(u8, u8, u8),
}

/// Mock capture stream for testing.
pub struct MockStream<'a> {
    device: &'a mut MockDevice,
    pattern: TestPattern,
}

impl MockStream<'_> {
    /// Set the test pattern for frame generation.
    #[must_use]
    pub fn with_pattern(mut self, pattern: TestPattern) -> Self {
        self.pattern = pattern;
        self
    }
}

impl CaptureStream for MockStream<'_> {
    fn next_frame(&mut self) -> Result<Frame> {
        let format = &self.device.format;
        let data = generate_nv21_frame(format, self.pattern);

        let seq = self.device.frame_count;
        self.device.frame_count += 1;

        Ok(Frame {
            data,
            metadata: FrameMetadata {
                sequence: seq,
                timestamp: self.device.frame_interval * seq,
                bytes_used: format.size,
            },
        })
    }
}

/// Generate an NV21 frame for the given pattern.
pub fn generate_nv21_frame(format: &Format, pattern: TestPattern) -> Vec<u8> {
    // YUV values for White, Yellow, Cyan, Green, Magenta, Red, Blue, Black
    let bars: [(u8, u8, u8); 8] = [
        (235, 128, 128),
        (210, 16, 146),
        (170, 166, 16),
        (145, 54, 34),
        (106, 202, 222),
        (81, 90, 240),
        (41, 240, 110),
        (16, 128, 128),
    ];
    let width = format.width as usize;
    let height = format.height as usize;
    let bar_width = (width / 8).max(1);
    let color_at = |x: usize| match pattern {
        TestPattern::ColorBars => bars[(x / bar_width).min(7)],
        TestPattern::Solid(y, u, v) => (y, u, v),
    };

    let mut data = Vec::with_capacity(format.size as usize);
    for _ in 0..height {
        data.extend((0..width).map(|x| color_at(x).0));
    }
    for _ in 0..height / 2 {
        for x in (0..width).step_by(2) {
            let (_, u, v) = color_at(x);
            data.extend_from_slice(&[v, u]);
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_device_creation() {
        let device = MockDevice::new();
        assert_eq!(device.capabilities().driver, "mock");
        assert!(device.capabilities().can_capture);
    }

    #[test]
    fn test_mock_stream_timestamps() {
        let mut device = MockDevice::new().with_frame_interval(Duration::from_millis(10));
        let mut stream = device.create_stream(4).expect("create_stream should succeed");

        let frame1 = stream.next_frame().expect("next_frame should succeed");
        let frame2 = stream.next_frame().expect("next_frame should succeed");
        assert_eq!(frame1.metadata.sequence, 0);
        assert_eq!(frame2.metadata.timestamp_nanos(), 10_000_000);
    }

    #[test]
    fn test_nv21_frame_matches_format_size() {
        let format = Format::new(64, 48, FourCC::NV21);
        let data = generate_nv21_frame(&format, TestPattern::ColorBars);
        assert_eq!(data.len(), format.size as usize);
        // First bar is white, last is black.
        assert_eq!(data[0], 235);
        assert_eq!(data[63], 16);
    }

    #[test]
    fn test_solid_pattern_chroma_order() {
        let format = Format::new(4, 2, FourCC::NV21);
        let data = generate_nv21_frame(&format, TestPattern::Solid(128, 64, 192));
        assert_eq!(&data[..8], &[128; 8]);
        assert_eq!(&data[8..], &[192, 64, 192, 64]);
    }
}
