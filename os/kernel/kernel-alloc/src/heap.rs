//! # Kernel heap bootstrap
//!
//! The heap is a single raw byte range split into a metadata prefix and the
//! allocatable remainder:
//!
//! ```text
//! base                                                          base + size
//! ├──────────────── HEAP_METADATA_SIZE ──────────┬─────────────────────────┤
//! │ BumpAllocator bookkeeping │ PoolAllocator    │ bump-managed bytes      │
//! └───────────────────────────┴──────────────────┴─────────────────────────┘
//! ```
//!
//! The bump allocator manages everything after the prefix; the pool allocator
//! sits on top and becomes the default allocator through [`KERNEL_HEAP`].

use crate::{Allocator, BumpAllocator, PoolAllocator};
use core::alloc::{GlobalAlloc, Layout};
use core::ptr::{self, NonNull};
use kernel_memory_addresses::VirtualAddress;
use kernel_sync::{SpinLock, SyncOnceCell};

/// The default allocator of the kernel: pools over a bump parent.
pub type HeapAllocator = PoolAllocator<BumpAllocator>;

/// Bytes at the start of the heap range reserved for allocator bookkeeping.
pub const HEAP_METADATA_SIZE: usize = size_of::<BumpAllocator>() + size_of::<HeapAllocator>();

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum HeapError {
    #[error("heap of {size} bytes cannot hold {required} bytes of allocator metadata")]
    TooSmall { size: usize, required: usize },
    #[error("a default heap is already installed")]
    AlreadyInstalled,
}

/// Raw bytes backing a heap.
pub struct HeapArena {
    bytes: &'static mut [u8],
}

impl HeapArena {
    /// Wrap the memory at `base..base + size`.
    ///
    /// # Safety
    /// The range must be mapped, writable, and not referenced by anything
    /// else for the rest of the kernel's lifetime.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub unsafe fn from_raw(base: VirtualAddress, size: usize) -> Self {
        let ptr = base.as_u64() as usize as *mut u8;
        // SAFETY: upheld by the caller.
        let bytes = unsafe { core::slice::from_raw_parts_mut(ptr, size) };
        Self { bytes }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl From<&'static mut [u8]> for HeapArena {
    fn from(bytes: &'static mut [u8]) -> Self {
        Self { bytes }
    }
}

/// A constructed, not yet installed heap.
pub struct Heap {
    allocator: HeapAllocator,
}

impl Heap {
    /// Zero `arena`, reserve the metadata prefix, and build the allocator
    /// stack over the rest.
    ///
    /// # Errors
    /// [`HeapError::TooSmall`] if the arena is not larger than
    /// [`HEAP_METADATA_SIZE`].
    pub fn new(arena: HeapArena) -> Result<Self, HeapError> {
        let bytes = arena.bytes;
        if bytes.len() <= HEAP_METADATA_SIZE {
            return Err(HeapError::TooSmall {
                size: bytes.len(),
                required: HEAP_METADATA_SIZE,
            });
        }

        bytes.fill(0);
        // The prefix only reserves the footprint of the allocator headers;
        // the headers themselves live inside `KERNEL_HEAP`.
        let (_metadata, data) = bytes.split_at_mut(HEAP_METADATA_SIZE);
        let bump = BumpAllocator::new(data);

        log::debug!(
            "heap: {} bytes usable, {} bytes metadata",
            bump.capacity(),
            HEAP_METADATA_SIZE
        );

        Ok(Self {
            allocator: PoolAllocator::new(bump),
        })
    }

    pub const fn allocator(&mut self) -> &mut HeapAllocator {
        &mut self.allocator
    }
}

/// Process-wide default allocator; empty until [`install_heap`] runs.
pub struct KernelHeap {
    heap: SyncOnceCell<SpinLock<Heap>>,
}

impl KernelHeap {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            heap: SyncOnceCell::new(),
        }
    }

    /// Make `heap` the backing store of this allocator.
    ///
    /// # Errors
    /// [`HeapError::AlreadyInstalled`] on every call after the first.
    pub fn install(&self, heap: Heap) -> Result<(), HeapError> {
        self.heap
            .set(SpinLock::new(heap))
            .map_err(|_| HeapError::AlreadyInstalled)
    }

    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.heap.is_initialized()
    }

    /// Bytes currently handed out from the size-class pools.
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.heap
            .get()
            .map_or(0, |h| h.with_lock(|h| h.allocator.in_use()))
    }
}

impl Default for KernelHeap {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: blocks come from the pool allocator, which never hands out
// overlapping blocks; all access is serialized by the spin lock.
unsafe impl GlobalAlloc for KernelHeap {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.heap.get().map_or(ptr::null_mut(), |heap| {
            heap.with_lock(|h| {
                h.allocator
                    .allocate(layout)
                    .map_or(ptr::null_mut(), NonNull::as_ptr)
            })
        })
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        let (Some(heap), Some(ptr)) = (self.heap.get(), NonNull::new(ptr)) else {
            return;
        };
        // SAFETY: GlobalAlloc guarantees ptr/layout came from `alloc`.
        unsafe { heap.lock().allocator.release(ptr, layout) };
    }
}

/// The kernel's default allocator.
#[cfg_attr(all(not(test), feature = "global-allocator"), global_allocator)]
pub static KERNEL_HEAP: KernelHeap = KernelHeap::new();

/// Build a heap over `arena` and install it as [`KERNEL_HEAP`].
///
/// Runs once during bootstrap.
///
/// # Errors
/// [`HeapError::TooSmall`] or [`HeapError::AlreadyInstalled`]. Both are fatal
/// configuration errors for the caller.
pub fn install_heap(arena: HeapArena) -> Result<(), HeapError> {
    let heap = Heap::new(arena)?;
    KERNEL_HEAP.install(heap)?;
    log::info!("heap: installed default allocator");
    Ok(())
}
