//! Callback notifier: dispatches device frames and events to client callbacks.
//!
//! A single [`CallbackNotifier`] lives for one camera session. The device
//! pushes every produced frame into [`CallbackNotifier::on_frame_ready`], which
//! fans it out to the enabled channels:
//!
//! - **video**: rate-limited by the recording frame interval, delivered via the
//!   timestamped data callback. The buffer stays owned by the client until it
//!   is handed back through [`CallbackNotifier::release_recording_frame`].
//! - **preview**: every frame, delivered via the data callback and released
//!   as soon as the callback returns.
//! - **still capture**: once per [`CallbackNotifier::set_taking_picture`],
//!   running shutter, raw notify and JPEG delivery on the next frame.
//!
//! The state lock is never held while a client callback or the host
//! allocator runs, so callbacks may call back into the notifier.

use crate::callbacks::Callbacks;
use crate::error::NotifierError;
use crate::exif::ExifData;
use crate::jpeg::{JpegCompressor, Nv21JpegCompressor, Nv21Thumbnailer, ThumbnailGenerator};
use crate::memory::MemoryHandle;
use crate::message::MessageType;
use crate::parameters::{CameraParameters, KEY_JPEG_THUMBNAIL_QUALITY};
use crate::traits::{FourCC, FrameGeometry};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

/// JPEG quality used for still captures until changed.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Frame-rate gate for video delivery.
#[derive(Debug, Clone, Copy, Default)]
struct VideoGate {
    enabled: bool,
    /// `None` right after the gate was reset: the next frame always passes.
    last_frame_timestamp: Option<i64>,
    frame_interval_nanos: i64,
}

impl VideoGate {
    fn enable(&mut self, frame_interval_nanos: i64) {
        *self = Self {
            enabled: true,
            last_frame_timestamp: None,
            frame_interval_nanos,
        };
    }

    fn disable(&mut self) {
        *self = Self::default();
    }

    /// Whether a frame at `timestamp` is due; records it if so.
    fn admit(&mut self, timestamp: i64) -> bool {
        if !self.enabled {
            return false;
        }
        let due = match self.last_frame_timestamp {
            None => true,
            Some(last) => timestamp.saturating_sub(last) >= self.frame_interval_nanos,
        };
        if due {
            self.last_frame_timestamp = Some(timestamp);
        }
        due
    }
}

struct State {
    callbacks: Callbacks,
    enabled: MessageType,
    gate: VideoGate,
    /// Video buffers handed to the client and not yet released, oldest first.
    recording_buffers: Vec<Box<dyn MemoryHandle>>,
    /// Video buffers whose timestamped callback is still running.
    delivering: Vec<Delivering>,
    parameters: CameraParameters,
    jpeg_quality: u8,
    compressor: Arc<dyn JpegCompressor>,
    thumbnailer: Arc<dyn ThumbnailGenerator>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            callbacks: Callbacks::default(),
            enabled: MessageType::empty(),
            gate: VideoGate::default(),
            recording_buffers: Vec::new(),
            delivering: Vec::new(),
            parameters: CameraParameters::default(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            compressor: Arc::new(Nv21JpegCompressor),
            thumbnailer: Arc::new(Nv21Thumbnailer),
        }
    }
}

/// A video buffer between allocation and the end of its delivery callback.
#[derive(Debug, Clone, Copy)]
struct Delivering {
    addr: usize,
    released: bool,
}

/// What one still capture needs, copied out of the lock.
struct StillSettings {
    parameters: CameraParameters,
    quality: u8,
    compressor: Arc<dyn JpegCompressor>,
    thumbnailer: Arc<dyn ThumbnailGenerator>,
}

/// Multiplexes device frames and events onto registered client callbacks.
#[derive(Default)]
pub struct CallbackNotifier {
    state: Mutex<State>,
    taking_picture: AtomicBool,
}

impl CallbackNotifier {
    /// Create a notifier with no callbacks and no enabled messages.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all callback handles and the user context at once.
    pub fn register_callbacks(&self, callbacks: Callbacks) {
        debug!(?callbacks, "Registering callbacks");
        let previous = std::mem::replace(&mut self.state.lock().callbacks, callbacks);
        drop(previous);
    }

    /// Enable delivery of the given message kinds.
    pub fn enable_message(&self, kinds: MessageType) {
        let mut state = self.state.lock();
        state.enabled |= kinds;
        debug!(enabled = %kinds, current = %state.enabled, "Enabled messages");
    }

    /// Disable delivery of the given message kinds.
    pub fn disable_message(&self, kinds: MessageType) {
        let mut state = self.state.lock();
        state.enabled &= !kinds;
        debug!(disabled = %kinds, current = %state.enabled, "Disabled messages");
    }

    /// Whether every kind in `kinds` is currently enabled.
    ///
    /// An empty set of kinds is never enabled.
    pub fn is_message_enabled(&self, kinds: MessageType) -> bool {
        !kinds.is_empty() && self.state.lock().enabled.contains(kinds)
    }

    /// Currently enabled message kinds.
    pub fn enabled_messages(&self) -> MessageType {
        self.state.lock().enabled
    }

    /// Start recording at `fps` frames per second.
    ///
    /// Resets the frame-rate gate, so the next video frame is always
    /// delivered.
    pub fn set_video_recording(&self, fps: i32) -> Result<(), NotifierError> {
        if fps <= 0 {
            warn!(fps, "Rejecting video recording with non-positive frame rate");
            return Err(NotifierError::InvalidFrameRate(fps));
        }
        let interval = NANOS_PER_SECOND / i64::from(fps);
        self.state.lock().gate.enable(interval);
        debug!(fps, interval, "Video recording enabled");
        Ok(())
    }

    /// Stop recording and reset the frame-rate gate.
    pub fn clear_video_recording(&self) {
        self.state.lock().gate.disable();
        debug!("Video recording disabled");
    }

    /// Whether video recording is enabled.
    pub fn is_video_recording_enabled(&self) -> bool {
        self.state.lock().gate.enabled
    }

    /// Return a video buffer the client is done with.
    ///
    /// `opaque` is the data pointer of a buffer previously delivered with
    /// [`MessageType::VIDEO_FRAME`]. Unknown pointers are ignored. Returns
    /// whether a buffer was released.
    pub fn release_recording_frame(&self, opaque: *const u8) -> bool {
        let buffer = {
            let mut state = self.state.lock();
            let tracked = state
                .recording_buffers
                .iter()
                .position(|buffer| std::ptr::eq(buffer.data_ptr(), opaque));
            match tracked {
                Some(index) => Some(state.recording_buffers.remove(index)),
                None => {
                    // Released while its callback runs: deliver_video drops it afterwards.
                    let addr = opaque as usize;
                    if let Some(pending) = state
                        .delivering
                        .iter_mut()
                        .find(|pending| pending.addr == addr && !pending.released)
                    {
                        pending.released = true;
                        return true;
                    }
                    None
                }
            }
        };
        match buffer {
            Some(buffer) => {
                buffer.release();
                true
            }
            None => {
                debug!(?opaque, "Release of untracked recording frame ignored");
                false
            }
        }
    }

    /// Number of video buffers delivered and not yet released.
    pub fn recording_buffers_outstanding(&self) -> usize {
        self.state.lock().recording_buffers.len()
    }

    /// Report auto-focus completion.
    ///
    /// Always notifies focus success, whether or not focus messages are
    /// enabled.
    pub fn auto_focus_complete(&self) {
        let callbacks = self.state.lock().callbacks.clone();
        if !callbacks.notify(MessageType::FOCUS, 1, 0) {
            warn!("Auto-focus complete but no notify callback registered");
        }
    }

    /// Metadata-in-buffers mode is not supported; only `false` succeeds.
    pub fn set_store_metadata_in_buffers(&self, enable: bool) -> Result<(), NotifierError> {
        if enable {
            return Err(NotifierError::UnsupportedOperation(
                "metadata in video buffers",
            ));
        }
        Ok(())
    }

    /// Request a still capture from the next frame.
    pub fn set_taking_picture(&self, taking: bool) {
        self.taking_picture.store(taking, Ordering::Release);
    }

    /// Whether a still capture is pending.
    pub fn is_taking_picture(&self) -> bool {
        self.taking_picture.load(Ordering::Acquire)
    }

    /// Set the JPEG quality for still captures, clamped to 1..=100.
    pub fn set_jpeg_quality(&self, quality: u8) {
        self.state.lock().jpeg_quality = quality.clamp(1, 100);
    }

    /// JPEG quality for still captures.
    pub fn jpeg_quality(&self) -> u8 {
        self.state.lock().jpeg_quality
    }

    /// Replace the camera parameters used for EXIF and thumbnails.
    pub fn set_camera_parameters(&self, parameters: CameraParameters) {
        self.state.lock().parameters = parameters;
    }

    /// Current camera parameters.
    pub fn camera_parameters(&self) -> CameraParameters {
        self.state.lock().parameters.clone()
    }

    /// Replace the JPEG compressor and thumbnail generator.
    pub fn set_encoders(
        &self,
        compressor: Arc<dyn JpegCompressor>,
        thumbnailer: Arc<dyn ThumbnailGenerator>,
    ) {
        let mut state = self.state.lock();
        state.compressor = compressor;
        state.thumbnailer = thumbnailer;
    }

    /// Reset callbacks, enabled messages, recording, capture flag and JPEG
    /// quality to their initial values.
    ///
    /// Video buffers still held by the client stay tracked and can be
    /// released afterwards.
    pub fn cleanup(&self) {
        let previous = {
            let mut state = self.state.lock();
            state.enabled = MessageType::empty();
            state.gate.disable();
            state.jpeg_quality = DEFAULT_JPEG_QUALITY;
            self.taking_picture.store(false, Ordering::Release);
            std::mem::take(&mut state.callbacks)
        };
        drop(previous);
        debug!("Callback notifier reset");
    }

    /// Report a device error to the client.
    pub fn on_device_error(&self, code: i32) {
        let (callbacks, enabled) = {
            let state = self.state.lock();
            (state.callbacks.clone(), state.enabled)
        };
        if enabled.contains(MessageType::ERROR) {
            callbacks.notify(MessageType::ERROR, code, 0);
        } else {
            trace!(code, "Device error dropped, error messages disabled");
        }
    }

    /// Dispatch one produced frame to every enabled channel.
    ///
    /// `frame` must hold at least `geometry.frame_buffer_size()` bytes for the
    /// video and preview channels. Still captures compress NV21 frames only.
    pub fn on_frame_ready(&self, frame: &[u8], timestamp: i64, geometry: &dyn FrameGeometry) {
        let (callbacks, enabled, video_due) = {
            let mut state = self.state.lock();
            let enabled = state.enabled;
            let video_due =
                enabled.contains(MessageType::VIDEO_FRAME) && state.gate.admit(timestamp);
            (state.callbacks.clone(), enabled, video_due)
        };
        trace!(timestamp, video_due, "Frame ready");

        let size = geometry.frame_buffer_size();
        let payload = frame.get(..size);
        let buffered = MessageType::VIDEO_FRAME | MessageType::PREVIEW_FRAME;
        if payload.is_none() && enabled.intersects(buffered) {
            error!(size, actual = frame.len(), "Frame shorter than frame buffer size");
        }

        if let (true, Some(payload)) = (video_due, payload) {
            self.deliver_video(&callbacks, payload, timestamp);
        }

        if let (true, Some(payload)) = (enabled.contains(MessageType::PREVIEW_FRAME), payload) {
            deliver_transient(&callbacks, MessageType::PREVIEW_FRAME, payload);
        }

        if self.taking_picture.swap(false, Ordering::AcqRel) {
            self.take_picture(&callbacks, enabled, frame, geometry);
        }
    }

    fn deliver_video(&self, callbacks: &Callbacks, payload: &[u8], timestamp: i64) {
        if callbacks.data_timestamp.is_none() {
            warn!("Video frame dropped, no timestamped data callback registered");
            return;
        }
        let Some(buffer) = copy_to_buffer(callbacks, MessageType::VIDEO_FRAME, payload) else {
            return;
        };
        let addr = buffer.data_ptr() as usize;
        self.state.lock().delivering.push(Delivering {
            addr,
            released: false,
        });

        callbacks.deliver_timestamped(timestamp, MessageType::VIDEO_FRAME, buffer.as_ref());

        // Ownership passes to the client until release_recording_frame.
        let released_early = {
            let mut state = self.state.lock();
            let slot = state
                .delivering
                .iter()
                .position(|pending| pending.addr == addr);
            let released = slot.is_some_and(|index| state.delivering.swap_remove(index).released);
            if !released {
                state.recording_buffers.push(buffer);
                return;
            }
            buffer
        };
        trace!(addr, "Video frame released during delivery");
        released_early.release();
    }

    fn take_picture(
        &self,
        callbacks: &Callbacks,
        enabled: MessageType,
        frame: &[u8],
        geometry: &dyn FrameGeometry,
    ) {
        debug!("Taking picture");
        if enabled.contains(MessageType::SHUTTER) {
            callbacks.notify(MessageType::SHUTTER, 0, 0);
        }
        // Raw image bytes are never delivered, only the notification.
        if enabled.contains(MessageType::RAW_IMAGE_NOTIFY) {
            callbacks.notify(MessageType::RAW_IMAGE_NOTIFY, 0, 0);
        }
        if !enabled.contains(MessageType::COMPRESSED_IMAGE) {
            return;
        }
        if callbacks.data.is_none() {
            warn!("Compressed image dropped, no data callback registered");
            return;
        }
        let fourcc = geometry.frame_fourcc();
        if fourcc != FourCC::NV21 {
            warn!(
                fourcc = %String::from_utf8_lossy(&fourcc.0),
                "Compressed image dropped, still frames must be NV21"
            );
            return;
        }

        let settings = {
            let state = self.state.lock();
            StillSettings {
                parameters: state.parameters.clone(),
                quality: state.jpeg_quality,
                compressor: Arc::clone(&state.compressor),
                thumbnailer: Arc::clone(&state.thumbnailer),
            }
        };
        let width = geometry.frame_width();
        let height = geometry.frame_height();

        let mut exif = ExifData::from_parameters(&settings.parameters);
        if let Some((thumb_width, thumb_height)) = settings.parameters.thumbnail_size() {
            let quality = settings
                .parameters
                .get_int(KEY_JPEG_THUMBNAIL_QUALITY)
                .and_then(|q| u8::try_from(q).ok())
                .filter(|q| (1..=100).contains(q))
                .unwrap_or(settings.quality);
            let thumbnail = settings
                .thumbnailer
                .generate(frame, width, height, thumb_width, thumb_height, quality)
                .and_then(|thumbnail| exif.set_thumbnail(thumbnail));
            if let Err(err) = thumbnail {
                error!(%err, "Failed to create thumbnail for image");
            }
        }

        match settings
            .compressor
            .compress(frame, width, height, settings.quality, Some(&exif))
        {
            Ok(jpeg) => {
                deliver_transient(callbacks, MessageType::COMPRESSED_IMAGE, &jpeg);
            }
            Err(err) => {
                error!(%err, "Compression failure, compressed image dropped");
            }
        }
    }
}

/// Copy `payload` into a fresh buffer, deliver it and release it right away.
fn deliver_transient(callbacks: &Callbacks, kind: MessageType, payload: &[u8]) {
    if callbacks.data.is_none() {
        trace!(%kind, "No data callback registered");
        return;
    }
    if let Some(buffer) = copy_to_buffer(callbacks, kind, payload) {
        callbacks.deliver(kind, buffer.as_ref());
        buffer.release();
    }
}

/// Obtain a buffer from the host allocator and fill it with `payload`.
fn copy_to_buffer(
    callbacks: &Callbacks,
    kind: MessageType,
    payload: &[u8],
) -> Option<Box<dyn MemoryHandle>> {
    let Some(allocator) = &callbacks.allocator else {
        warn!(%kind, "No memory allocator registered");
        return None;
    };
    let Some(mut buffer) = allocator.request(payload.len(), 1) else {
        error!(%kind, size = payload.len(), "Memory failure");
        return None;
    };
    match buffer.data_mut().and_then(|data| data.get_mut(..payload.len())) {
        Some(data) => {
            data.copy_from_slice(payload);
            Some(buffer)
        }
        None => {
            error!(%kind, size = payload.len(), "Memory failure, buffer has no storage");
            buffer.release();
            None
        }
    }
}

impl fmt::Debug for CallbackNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CallbackNotifier")
            .field("callbacks", &state.callbacks)
            .field("enabled", &state.enabled)
            .field("gate", &state.gate)
            .field("recording_buffers", &state.recording_buffers.len())
            .field("delivering", &state.delivering.len())
            .field("jpeg_quality", &state.jpeg_quality)
            .field("taking_picture", &self.is_taking_picture())
            .finish_non_exhaustive()
    }
}
