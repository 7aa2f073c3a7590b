//! # Kernel Bootstrap Memory Allocation
//!
//! Allocators the kernel brings up before any process exists:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │ KernelHeap (GlobalAlloc)                             │
//! │   └─ PoolAllocator   size classes 8 B ..= 4 KiB      │
//! │        └─ BumpAllocator   linear, never reuses       │
//! │             └─ HeapArena   raw bytes of the heap     │
//! └──────────────────────────────────────────────────────┘
//!
//! ┌──────────────────────────────────────────────────────┐
//! │ RegionAllocator   bitmap over physical pages         │
//! │   + kernel data window (phys <-> virt translation)   │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Region Allocator ([`region`])
//! Tracks which physical pages are in use. It owns no dynamic memory; the
//! bitmap storage is handed in by the caller. Bootstrap marks the known
//! regions (low memory, kernel image, boot image, heap, core channel) used
//! through [`RegionAllocator::reserve`](region::RegionAllocator::reserve).
//!
//! ## Heap ([`heap`])
//! [`install_heap`](heap::install_heap) carves a raw byte range into a bump
//! allocator (parent) and a pool allocator (child), and installs the pool as
//! the process-wide default allocator. The first
//! [`HEAP_METADATA_SIZE`](heap::HEAP_METADATA_SIZE) bytes of the range are
//! reserved for allocator bookkeeping.
//!
//! ## Physical Memory Access ([`phys_mapper`])
//! [`PhysMemory`](phys_mapper::PhysMemory) borrows physical memory as byte
//! slices; [`DirectMap`](phys_mapper::DirectMap) implements it over a fixed
//! offset window such as the higher-half direct map.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod bump;
pub mod heap;
pub mod phys_mapper;
pub mod pool;
pub mod region;

use core::alloc::Layout;
use core::ptr::NonNull;

pub use bump::BumpAllocator;
pub use heap::{
    HEAP_METADATA_SIZE, Heap, HeapArena, HeapError, KERNEL_HEAP, KernelHeap, install_heap,
};
pub use phys_mapper::{DirectMap, PhysMemory};
pub use pool::PoolAllocator;
pub use region::{RegionAllocator, RegionError};

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum AllocError {
    #[error("out of memory allocating {size} bytes (align {align})")]
    OutOfMemory { size: usize, align: usize },
}

impl AllocError {
    #[must_use]
    pub const fn out_of_memory(layout: Layout) -> Self {
        Self::OutOfMemory {
            size: layout.size(),
            align: layout.align(),
        }
    }
}

/// A byte allocator that can be stacked under another one.
///
/// Implementations are not synchronized; wrap them in a lock when shared.
pub trait Allocator {
    /// Allocate a block satisfying `layout`.
    ///
    /// # Errors
    /// [`AllocError::OutOfMemory`] when no block can be provided.
    fn allocate(&mut self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// Return a block to the allocator.
    ///
    /// # Safety
    /// `ptr` must have been returned by [`Allocator::allocate`] on this
    /// allocator with the same `layout`, and must not be used afterwards.
    unsafe fn release(&mut self, ptr: NonNull<u8>, layout: Layout);
}

/// Round `addr` up to `align` (a power of two).
#[inline]
const fn align_up(addr: usize, align: usize) -> Option<usize> {
    match addr.checked_add(align - 1) {
        Some(v) => Some(v & !(align - 1)),
        None => None,
    }
}
