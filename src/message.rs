//! Camera message kinds and the enabled-message bitmask.

use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Set of camera message kinds.
    ///
    /// A single flag names the kind of one notification or data delivery;
    /// a union of flags is used as the enabled-message mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MessageType: u32 {
        /// Device error notification.
        const ERROR = 0x0001;
        /// Shutter notification at the start of a still capture.
        const SHUTTER = 0x0002;
        /// Auto-focus result notification.
        const FOCUS = 0x0004;
        /// Zoom change notification.
        const ZOOM = 0x0008;
        /// Preview frame data.
        const PREVIEW_FRAME = 0x0010;
        /// Video (recording) frame data.
        const VIDEO_FRAME = 0x0020;
        /// Post-view frame data.
        const POSTVIEW_FRAME = 0x0040;
        /// Uncompressed still image data.
        const RAW_IMAGE = 0x0080;
        /// Compressed (JPEG) still image data.
        const COMPRESSED_IMAGE = 0x0100;
        /// Notification that a raw image is available, without payload.
        const RAW_IMAGE_NOTIFY = 0x0200;
        /// Preview metadata delivery.
        const PREVIEW_METADATA = 0x0400;
    }
}

const LABELS: [(MessageType, &str); 11] = [
    (MessageType::ERROR, "CAMERA_MSG_ERROR"),
    (MessageType::SHUTTER, "CAMERA_MSG_SHUTTER"),
    (MessageType::FOCUS, "CAMERA_MSG_FOCUS"),
    (MessageType::ZOOM, "CAMERA_MSG_ZOOM"),
    (MessageType::PREVIEW_FRAME, "CAMERA_MSG_PREVIEW_FRAME"),
    (MessageType::VIDEO_FRAME, "CAMERA_MSG_VIDEO_FRAME"),
    (MessageType::POSTVIEW_FRAME, "CAMERA_MSG_POSTVIEW_FRAME"),
    (MessageType::RAW_IMAGE, "CAMERA_MSG_RAW_IMAGE"),
    (MessageType::COMPRESSED_IMAGE, "CAMERA_MSG_COMPRESSED_IMAGE"),
    (MessageType::RAW_IMAGE_NOTIFY, "CAMERA_MSG_RAW_IMAGE_NOTIFY"),
    (MessageType::PREVIEW_METADATA, "CAMERA_MSG_PREVIEW_METADATA"),
];

impl MessageType {
    /// Diagnostic label of a single message kind.
    ///
    /// Returns `None` for an empty set or a union of several kinds.
    #[must_use]
    pub fn label(self) -> Option<&'static str> {
        LABELS
            .iter()
            .find(|(kind, _)| *kind == self)
            .map(|(_, label)| *label)
    }

    /// Labels of every known kind contained in this set, in bit order.
    pub fn labels(self) -> impl Iterator<Item = &'static str> {
        LABELS
            .iter()
            .filter(move |(kind, _)| self.contains(*kind))
            .map(|(_, label)| *label)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x} [", self.bits())?;
        for (i, label) in self.labels().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(label)?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_kind_label() {
        assert_eq!(MessageType::SHUTTER.label(), Some("CAMERA_MSG_SHUTTER"));
        assert_eq!(
            MessageType::PREVIEW_METADATA.label(),
            Some("CAMERA_MSG_PREVIEW_METADATA")
        );
    }

    #[test]
    fn test_union_has_no_single_label() {
        let mask = MessageType::SHUTTER | MessageType::FOCUS;
        assert_eq!(mask.label(), None);
        assert_eq!(MessageType::empty().label(), None);
    }

    #[test]
    fn test_labels_in_bit_order() {
        let mask = MessageType::COMPRESSED_IMAGE | MessageType::ERROR | MessageType::VIDEO_FRAME;
        let labels: Vec<_> = mask.labels().collect();
        assert_eq!(
            labels,
            vec![
                "CAMERA_MSG_ERROR",
                "CAMERA_MSG_VIDEO_FRAME",
                "CAMERA_MSG_COMPRESSED_IMAGE"
            ]
        );
    }

    #[test]
    fn test_unknown_bits_are_dropped() {
        let mask = MessageType::from_bits_truncate(0xF000 | 0x0002);
        assert_eq!(mask, MessageType::SHUTTER);
    }

    #[test]
    fn test_display() {
        let mask = MessageType::ERROR | MessageType::FOCUS;
        assert_eq!(
            mask.to_string(),
            "0x0005 [CAMERA_MSG_ERROR, CAMERA_MSG_FOCUS]"
        );
        assert_eq!(MessageType::empty().to_string(), "0x0000 []");
    }

    #[test]
    fn test_enable_disable_is_inverse() {
        let prior = MessageType::ERROR | MessageType::ZOOM;
        let mut mask = prior;
        mask |= MessageType::SHUTTER;
        mask &= !MessageType::SHUTTER;
        assert_eq!(mask, prior);
    }
}
