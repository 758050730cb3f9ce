//! Integration tests driving the notifier from the vivid virtual camera.
//!
//! These tests require:
//! - The `integration` feature flag: `cargo test --features integration`
//! - The vivid kernel module loaded (`sudo modprobe vivid`)
//! - Access to /dev/video* devices (may require sudo or video group membership)
//!
//! Tests will fail if vivid is not available.

#![cfg(feature = "integration")]

use camera_notifier::{
    CallbackNotifier, Callbacks, CameraDevice, CaptureStream, Format, FourCC, HeapAllocator,
    MemoryHandle, MessageType, UserContext, V4L2Device,
};
use parking_lot::Mutex;
use serial_test::serial;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Find all available vivid virtual camera devices.
///
/// Uses sysfs to check device driver name before opening, avoiding
/// unnecessary device opens on real cameras.
fn find_vivid_devices() -> Vec<u32> {
    let video4linux = Path::new("/sys/class/video4linux");
    if !video4linux.exists() {
        return Vec::new();
    }

    let mut devices = Vec::new();
    for index in 0..10 {
        let name_path = video4linux.join(format!("video{index}")).join("name");
        let Ok(name) = fs::read_to_string(&name_path) else {
            continue;
        };

        if !name.to_lowercase().contains("vivid") {
            continue;
        }

        if V4L2Device::open(index).is_ok() {
            devices.push(index);
        }
    }
    devices
}

/// Fail the test if vivid is not available; returns the first device index.
macro_rules! require_vivid {
    () => {
        match find_vivid_devices().first().copied() {
            Some(idx) => idx,
            None => {
                panic!(
                    "vivid virtual camera not available.\n\
                     Load vivid with: sudo modprobe vivid\n\
                     Or run unit tests only: cargo test --lib"
                );
            }
        }
    };
}

#[derive(Default)]
struct Deliveries {
    previews: Mutex<usize>,
    video: Mutex<Vec<(i64, usize)>>,
    notifications: Mutex<Vec<MessageType>>,
    compressed: Mutex<Vec<Vec<u8>>>,
}

fn register(notifier: &CallbackNotifier, allocator: &HeapAllocator) -> Arc<Deliveries> {
    let deliveries = Arc::new(Deliveries::default());
    let notify_sink = Arc::clone(&deliveries);
    let data_sink = Arc::clone(&deliveries);
    let video_sink = Arc::clone(&deliveries);
    notifier.register_callbacks(Callbacks {
        notify: Some(Arc::new(
            move |kind: MessageType, _: i32, _: i32, _: &UserContext| {
                notify_sink.notifications.lock().push(kind);
            },
        )),
        data: Some(Arc::new(
            move |kind: MessageType, buffer: &dyn MemoryHandle, _: u32, _: &UserContext| {
                if kind == MessageType::COMPRESSED_IMAGE {
                    let bytes = buffer.data().unwrap_or_default().to_vec();
                    data_sink.compressed.lock().push(bytes);
                } else {
                    *data_sink.previews.lock() += 1;
                }
            },
        )),
        data_timestamp: Some(Arc::new(
            move |ts: i64, _: MessageType, buffer: &dyn MemoryHandle, _: u32, _: &UserContext| {
                video_sink
                    .video
                    .lock()
                    .push((ts, buffer.data_ptr() as usize));
            },
        )),
        allocator: Some(Arc::new(allocator.clone())),
        user: None,
    });
    deliveries
}

#[test]
#[serial]
fn test_vivid_device_open() {
    let device_index = require_vivid!();

    let device = V4L2Device::open(device_index).expect("Failed to open vivid device");
    let caps = device.capabilities();

    assert!(caps.driver.contains("vivid"), "Expected vivid driver");
    assert!(caps.can_capture, "vivid should support capture");
    assert!(caps.can_stream, "vivid should support streaming");
}

#[test]
#[serial]
fn test_vivid_preview_every_frame() {
    let device_index = require_vivid!();

    let mut device = V4L2Device::open(device_index).expect("Failed to open vivid device");
    let format = device
        .set_format(&Format::new(640, 480, FourCC::YUYV))
        .expect("Failed to set format");

    let notifier = CallbackNotifier::new();
    let allocator = HeapAllocator::new();
    let deliveries = register(&notifier, &allocator);
    notifier.enable_message(MessageType::PREVIEW_FRAME);

    let mut stream = device.create_stream(4).expect("Failed to create stream");
    let frame_count = 10;
    for _ in 0..frame_count {
        let frame = stream.next_frame().expect("Failed to capture frame");
        notifier.on_frame_ready(&frame.data, frame.metadata.timestamp_nanos(), &format);
    }

    assert_eq!(*deliveries.previews.lock(), frame_count);
    assert_eq!(allocator.outstanding(), 0, "preview buffers must be released");
}

#[test]
#[serial]
fn test_vivid_video_rate_gate() {
    let device_index = require_vivid!();

    let mut device = V4L2Device::open(device_index).expect("Failed to open vivid device");
    let format = device
        .set_format(&Format::new(640, 480, FourCC::YUYV))
        .expect("Failed to set format");

    let notifier = CallbackNotifier::new();
    let allocator = HeapAllocator::new();
    let deliveries = register(&notifier, &allocator);
    notifier.enable_message(MessageType::VIDEO_FRAME);
    notifier
        .set_video_recording(5)
        .expect("Failed to enable recording");

    let mut stream = device.create_stream(4).expect("Failed to create stream");
    for _ in 0..30 {
        let frame = stream.next_frame().expect("Failed to capture frame");
        notifier.on_frame_ready(&frame.data, frame.metadata.timestamp_nanos(), &format);
    }

    let video = deliveries.video.lock().clone();
    assert!(!video.is_empty(), "first frame after enabling must be delivered");
    for pair in video.windows(2) {
        let gap = pair[1].0 - pair[0].0;
        assert!(gap >= 200_000_000, "video frames {gap}ns apart at 5 fps");
    }

    assert_eq!(allocator.outstanding(), video.len());
    for (_, opaque) in &video {
        assert!(notifier.release_recording_frame(*opaque as *const u8));
    }
    assert_eq!(allocator.outstanding(), 0);
}

#[test]
#[serial]
fn test_vivid_still_capture() {
    let device_index = require_vivid!();

    let mut device = V4L2Device::open(device_index).expect("Failed to open vivid device");
    let format = device.negotiate(640, 480).expect("Failed to negotiate format");
    assert_eq!(format.fourcc, FourCC::NV21, "vivid should offer NV21");

    let notifier = CallbackNotifier::new();
    let allocator = HeapAllocator::new();
    let deliveries = register(&notifier, &allocator);
    notifier.enable_message(MessageType::SHUTTER | MessageType::COMPRESSED_IMAGE);
    notifier.set_taking_picture(true);

    let mut stream = device.create_stream(4).expect("Failed to create stream");
    for _ in 0..3 {
        let frame = stream.next_frame().expect("Failed to capture frame");
        notifier.on_frame_ready(&frame.data, frame.metadata.timestamp_nanos(), &format);
    }

    assert_eq!(*deliveries.notifications.lock(), vec![MessageType::SHUTTER]);
    let compressed = deliveries.compressed.lock();
    assert_eq!(compressed.len(), 1);
    assert_eq!(compressed[0][..2], [0xFF, 0xD8]);
}
