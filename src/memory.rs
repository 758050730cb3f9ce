//! Host memory allocator boundary.
//!
//! Buffers handed to client callbacks are obtained from a host-supplied
//! [`MemoryAllocator`]. The notifier never frees buffer memory itself: every
//! handle is returned to its owner through [`MemoryHandle::release`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A buffer handle obtained from a [`MemoryAllocator`].
pub trait MemoryHandle: Send {
    /// Backing storage, or `None` if the handle has no storage attached.
    fn data(&self) -> Option<&[u8]>;

    /// Mutable access to the backing storage.
    fn data_mut(&mut self) -> Option<&mut [u8]>;

    /// Return the handle to its allocator.
    fn release(self: Box<Self>);

    /// Address of the backing storage, used to identify the handle.
    ///
    /// Returns a null pointer when no storage is attached.
    fn data_ptr(&self) -> *const u8 {
        self.data().map_or(std::ptr::null(), <[u8]>::as_ptr)
    }

    /// Size of the backing storage in bytes.
    fn size(&self) -> usize {
        self.data().map_or(0, <[u8]>::len)
    }
}

/// Host callback that hands out buffers for client delivery.
pub trait MemoryAllocator: Send + Sync {
    /// Request `count` contiguous buffers of `size` bytes each.
    ///
    /// Returns `None` when the host cannot satisfy the request.
    fn request(&self, size: usize, count: usize) -> Option<Box<dyn MemoryHandle>>;
}

impl<F> MemoryAllocator for F
where
    F: Fn(usize, usize) -> Option<Box<dyn MemoryHandle>> + Send + Sync,
{
    fn request(&self, size: usize, count: usize) -> Option<Box<dyn MemoryHandle>> {
        self(size, count)
    }
}

/// Heap-backed allocator that tracks how many handles are outstanding.
#[derive(Debug, Clone, Default)]
pub struct HeapAllocator {
    outstanding: Arc<AtomicUsize>,
}

impl HeapAllocator {
    /// Create an allocator with no outstanding handles.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of handles allocated and not yet released.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }
}

impl MemoryAllocator for HeapAllocator {
    fn request(&self, size: usize, count: usize) -> Option<Box<dyn MemoryHandle>> {
        let total = size.checked_mul(count)?;
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        Some(Box::new(HeapMemory {
            data: vec![0u8; total],
            outstanding: Arc::clone(&self.outstanding),
        }))
    }
}

/// Buffer handed out by [`HeapAllocator`].
#[derive(Debug)]
pub struct HeapMemory {
    data: Vec<u8>,
    outstanding: Arc<AtomicUsize>,
}

impl MemoryHandle for HeapMemory {
    fn data(&self) -> Option<&[u8]> {
        Some(&self.data)
    }

    fn data_mut(&mut self) -> Option<&mut [u8]> {
        Some(&mut self.data)
    }

    fn release(self: Box<Self>) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_allocator_counts_handles() {
        let allocator = HeapAllocator::new();
        let first = allocator.request(16, 1).expect("allocation should succeed");
        let second = allocator.request(8, 2).expect("allocation should succeed");
        assert_eq!(allocator.outstanding(), 2);
        assert_eq!(first.size(), 16);
        assert_eq!(second.size(), 16);

        first.release();
        assert_eq!(allocator.outstanding(), 1);
        second.release();
        assert_eq!(allocator.outstanding(), 0);
    }

    #[test]
    fn test_heap_allocator_rejects_overflow() {
        let allocator = HeapAllocator::new();
        assert!(allocator.request(usize::MAX, 2).is_none());
        assert_eq!(allocator.outstanding(), 0);
    }

    #[test]
    fn test_handles_have_distinct_pointers() {
        let allocator = HeapAllocator::new();
        let a = allocator.request(4, 1).expect("allocation should succeed");
        let b = allocator.request(4, 1).expect("allocation should succeed");
        assert_ne!(a.data_ptr(), b.data_ptr());
        a.release();
        b.release();
    }

    #[test]
    fn test_closure_allocator() {
        let allocator = |_size: usize, _count: usize| -> Option<Box<dyn MemoryHandle>> { None };
        assert!(allocator.request(4, 1).is_none());
    }
}
