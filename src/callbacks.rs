//! Client callback handles.

use crate::memory::{MemoryAllocator, MemoryHandle};
use crate::message::MessageType;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Opaque client context passed back on every callback invocation.
pub type UserContext = Option<Arc<dyn Any + Send + Sync>>;

/// Event notification: `(kind, ext1, ext2, user)`.
pub type NotifyCallback = Arc<dyn Fn(MessageType, i32, i32, &UserContext) + Send + Sync>;

/// Data delivery: `(kind, buffer, index, user)`.
pub type DataCallback = Arc<dyn Fn(MessageType, &dyn MemoryHandle, u32, &UserContext) + Send + Sync>;

/// Timestamped data delivery: `(timestamp_nanos, kind, buffer, index, user)`.
pub type DataTimestampCallback =
    Arc<dyn Fn(i64, MessageType, &dyn MemoryHandle, u32, &UserContext) + Send + Sync>;

/// The set of client callbacks, registered as a unit.
///
/// Any handle may be absent; dispatch paths that depend on a missing handle
/// do nothing.
#[derive(Clone, Default)]
pub struct Callbacks {
    /// Event notification handle.
    pub notify: Option<NotifyCallback>,
    /// Plain data delivery handle.
    pub data: Option<DataCallback>,
    /// Timestamped data delivery handle, used for video frames.
    pub data_timestamp: Option<DataTimestampCallback>,
    /// Host buffer allocator.
    pub allocator: Option<Arc<dyn MemoryAllocator>>,
    /// Opaque context passed to every invocation.
    pub user: UserContext,
}

impl Callbacks {
    pub(crate) fn notify(&self, kind: MessageType, ext1: i32, ext2: i32) -> bool {
        let Some(cb) = &self.notify else {
            return false;
        };
        cb(kind, ext1, ext2, &self.user);
        true
    }

    pub(crate) fn deliver(&self, kind: MessageType, buffer: &dyn MemoryHandle) -> bool {
        let Some(cb) = &self.data else {
            return false;
        };
        cb(kind, buffer, 0, &self.user);
        true
    }

    pub(crate) fn deliver_timestamped(
        &self,
        timestamp: i64,
        kind: MessageType,
        buffer: &dyn MemoryHandle,
    ) -> bool {
        let Some(cb) = &self.data_timestamp else {
            return false;
        };
        cb(timestamp, kind, buffer, 0, &self.user);
        true
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("notify", &self.notify.is_some())
            .field("data", &self.data.is_some())
            .field("data_timestamp", &self.data_timestamp.is_some())
            .field("allocator", &self.allocator.is_some())
            .field("user", &self.user.is_some())
            .finish()
    }
}
