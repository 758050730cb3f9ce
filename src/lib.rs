//! Camera-Notifier: callback notification and frame dispatch for virtual cameras
//!
//! This library sits between a camera frame producer and a client that
//! consumes camera events through registered callbacks. It fans frames out to
//! preview, video and still-capture channels under a live message mask,
//! throttles video to the recording frame rate, and runs the still-capture
//! pipeline (shutter, raw notify, EXIF, thumbnail, JPEG) once per request.

pub mod callbacks;
pub mod device;
pub mod error;
pub mod exif;
pub mod jpeg;
pub mod memory;
pub mod message;
pub mod notifier;
pub mod parameters;
pub mod traits;

#[cfg(test)]
pub mod mock;

pub use callbacks::{Callbacks, DataCallback, DataTimestampCallback, NotifyCallback, UserContext};
pub use device::V4L2Device;
pub use error::{EncodeError, NotifierError};
pub use exif::{ExifData, GpsInfo};
pub use jpeg::{JpegCompressor, Nv21JpegCompressor, Nv21Thumbnailer, ThumbnailGenerator};
pub use memory::{HeapAllocator, MemoryAllocator, MemoryHandle};
pub use message::MessageType;
pub use notifier::{CallbackNotifier, DEFAULT_JPEG_QUALITY};
pub use parameters::CameraParameters;
pub use traits::{
    CameraDevice, CaptureStream, DeviceCapabilities, Format, FourCC, Frame, FrameGeometry,
    FrameMetadata,
};
