//! Camera-notifier binary: streams a V4L2 device through the callback notifier.
//!
//! Usage: `camera-notifier [device-index] [frame-count]`

use camera_notifier::{
    CallbackNotifier, Callbacks, CameraDevice, CaptureStream, HeapAllocator, MemoryHandle,
    MessageType, UserContext, V4L2Device,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_FRAME_COUNT: u32 = 90;
const RECORDING_FPS: i32 = 15;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run() {
        error!("{err}");
        std::process::exit(1);
    }
}

fn run() -> camera_notifier::traits::Result<()> {
    let mut args = std::env::args().skip(1);
    let index = args.next().and_then(|arg| arg.parse().ok()).unwrap_or(0);
    let frame_count = args
        .next()
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(DEFAULT_FRAME_COUNT);

    let mut device = V4L2Device::open(index)?;
    let format = device.negotiate(640, 480)?;
    info!(
        width = format.width,
        height = format.height,
        size = format.size,
        "Streaming"
    );

    let notifier = CallbackNotifier::new();
    let allocator = HeapAllocator::new();
    // Video buffers are handed back after each frame, outside the callback.
    let pending_release = Arc::new(Mutex::new(Vec::<usize>::new()));
    let video_pending = Arc::clone(&pending_release);

    notifier.register_callbacks(Callbacks {
        notify: Some(Arc::new(
            |kind: MessageType, ext1: i32, ext2: i32, _: &UserContext| {
                info!(%kind, ext1, ext2, "Notify");
            },
        )),
        data: Some(Arc::new(
            |kind: MessageType, buffer: &dyn MemoryHandle, _: u32, _: &UserContext| {
                info!(%kind, size = buffer.size(), "Data");
            },
        )),
        data_timestamp: Some(Arc::new(
            move |timestamp: i64,
                  kind: MessageType,
                  buffer: &dyn MemoryHandle,
                  _: u32,
                  _: &UserContext| {
                info!(%kind, timestamp, size = buffer.size(), "Timestamped data");
                video_pending.lock().push(buffer.data_ptr() as usize);
            },
        )),
        allocator: Some(Arc::new(allocator.clone())),
        user: None,
    });
    notifier.enable_message(
        MessageType::ERROR
            | MessageType::VIDEO_FRAME
            | MessageType::SHUTTER
            | MessageType::RAW_IMAGE_NOTIFY
            | MessageType::COMPRESSED_IMAGE,
    );
    if let Err(err) = notifier.set_video_recording(RECORDING_FPS) {
        error!(%err, "Could not start recording");
    }

    let mut stream = device.create_stream(4)?;
    for n in 0..frame_count {
        let frame = stream.next_frame()?;
        if n == frame_count / 2 {
            notifier.set_taking_picture(true);
        }
        notifier.on_frame_ready(&frame.data, frame.metadata.timestamp_nanos(), &format);

        for opaque in pending_release.lock().drain(..) {
            notifier.release_recording_frame(opaque as *const u8);
        }
    }

    notifier.clear_video_recording();
    notifier.cleanup();
    info!(outstanding = allocator.outstanding(), "Done");
    Ok(())
}
