//! # Size-class pool allocator
//!
//! Requests up to [`MAX_CLASS`] bytes are rounded up to the next power of two
//! and served from per-class free lists. An empty list is refilled with a
//! [`CHUNK_SIZE`] chunk from the parent allocator, carved into equal blocks.
//! Larger requests are forwarded to the parent unchanged.
//!
//! Free blocks store the free-list link in their first word:
//!
//! ```text
//! class list ─▶ ┌──────┬─────────┐   ┌──────┬─────────┐
//!               │ next │ unused  │ ─▶│ next │ unused  │ ─▶ None
//!               └──────┴─────────┘   └──────┴─────────┘
//! ```

use crate::{AllocError, Allocator};
use core::alloc::Layout;
use core::ptr::NonNull;

/// Smallest block size; must hold a free-list link.
pub const MIN_CLASS: usize = 8;

/// Largest block size served from the pools.
pub const MAX_CLASS: usize = 4096;

/// Size of a refill chunk requested from the parent.
pub const CHUNK_SIZE: usize = 4096;

const CLASS_COUNT: usize = (MAX_CLASS.trailing_zeros() - MIN_CLASS.trailing_zeros()) as usize + 1;

const _: () = assert!(MIN_CLASS >= size_of::<Option<NonNull<FreeBlock>>>());
const _: () = assert!(CHUNK_SIZE >= MAX_CLASS);

/// Link stored in the first word of a free block.
struct FreeBlock {
    next: Option<NonNull<FreeBlock>>,
}

pub struct PoolAllocator<P> {
    parent: P,
    free: [Option<NonNull<FreeBlock>>; CLASS_COUNT],
    /// Bytes currently handed out from the pools (block granularity).
    in_use: usize,
}

// SAFETY: the free lists only point into memory owned through `parent`.
unsafe impl<P: Send> Send for PoolAllocator<P> {}

/// Class index and block size for `layout`, or `None` if it is too large.
const fn class_of(layout: Layout) -> Option<(usize, usize)> {
    let mut size = layout.size();
    if size < layout.align() {
        size = layout.align();
    }
    if size < MIN_CLASS {
        size = MIN_CLASS;
    }
    if size > MAX_CLASS {
        return None;
    }
    let block = size.next_power_of_two();
    let index = (block.trailing_zeros() - MIN_CLASS.trailing_zeros()) as usize;
    Some((index, block))
}

impl<P: Allocator> PoolAllocator<P> {
    #[must_use]
    pub const fn new(parent: P) -> Self {
        Self {
            parent,
            free: [None; CLASS_COUNT],
            in_use: 0,
        }
    }

    #[must_use]
    pub const fn parent(&self) -> &P {
        &self.parent
    }

    /// Bytes currently allocated from the size-class pools.
    #[must_use]
    pub const fn in_use(&self) -> usize {
        self.in_use
    }

    /// Carve a fresh chunk from the parent into blocks of class `index`.
    fn refill(&mut self, index: usize, block: usize) -> Result<(), AllocError> {
        let oom = AllocError::OutOfMemory {
            size: CHUNK_SIZE,
            align: CHUNK_SIZE,
        };
        let chunk_layout = Layout::from_size_align(CHUNK_SIZE, CHUNK_SIZE).map_err(|_| oom)?;
        let chunk = self.parent.allocate(chunk_layout)?;

        // Push in reverse so blocks are handed out in address order.
        for i in (0..CHUNK_SIZE / block).rev() {
            // SAFETY: i * block < CHUNK_SIZE; the block is aligned to `block`
            // because the chunk is aligned to CHUNK_SIZE.
            let node = unsafe { chunk.add(i * block) }.cast::<FreeBlock>();
            // SAFETY: the block is unused and large enough for a link.
            unsafe {
                node.write(FreeBlock {
                    next: self.free[index],
                });
            }
            self.free[index] = Some(node);
        }
        Ok(())
    }
}

impl<P: Allocator> Allocator for PoolAllocator<P> {
    fn allocate(&mut self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let Some((index, block)) = class_of(layout) else {
            return self.parent.allocate(layout);
        };

        if self.free[index].is_none() {
            self.refill(index, block)?;
        }

        let node = self.free[index].ok_or_else(|| AllocError::out_of_memory(layout))?;
        // SAFETY: nodes on a free list were written by `refill` or `release`.
        self.free[index] = unsafe { node.read().next };
        self.in_use += block;
        Ok(node.cast())
    }

    unsafe fn release(&mut self, ptr: NonNull<u8>, layout: Layout) {
        let Some((index, block)) = class_of(layout) else {
            // SAFETY: large blocks came from the parent with this layout.
            unsafe { self.parent.release(ptr, layout) };
            return;
        };

        let node = ptr.cast::<FreeBlock>();
        // SAFETY: the caller hands the block back; it is at least MIN_CLASS
        // bytes and aligned to its class.
        unsafe {
            node.write(FreeBlock {
                next: self.free[index],
            });
        }
        self.free[index] = Some(node);
        self.in_use -= block;
    }
}
