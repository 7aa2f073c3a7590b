//! # Linear (bump) allocator
//!
//! Hands out memory by advancing a cursor through a fixed byte range. Released
//! blocks are never reused, which makes it suitable as the parent of the pool
//! allocator: the pool asks for large chunks once and recycles them itself.

use crate::{AllocError, Allocator, align_up};
use core::alloc::Layout;
use core::marker::PhantomData;
use core::ptr::NonNull;

pub struct BumpAllocator {
    base: NonNull<u8>,
    size: usize,
    /// Offset of the first unused byte.
    next: usize,
    _range: PhantomData<&'static mut [u8]>,
}

// SAFETY: the allocator exclusively owns its range; callers serialize access.
unsafe impl Send for BumpAllocator {}

impl BumpAllocator {
    /// Manage all of `range`.
    #[must_use]
    pub fn new(range: &'static mut [u8]) -> Self {
        let size = range.len();
        Self {
            base: NonNull::from(range).cast(),
            size,
            next: 0,
            _range: PhantomData,
        }
    }

    /// Total size of the managed range.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.size
    }

    /// Bytes consumed so far, including alignment padding.
    #[must_use]
    pub const fn used(&self) -> usize {
        self.next
    }

    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.size - self.next
    }
}

impl Allocator for BumpAllocator {
    fn allocate(&mut self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let oom = || AllocError::out_of_memory(layout);

        let start = self.base.as_ptr() as usize;
        let cursor = start.checked_add(self.next).ok_or_else(oom)?;
        let aligned = align_up(cursor, layout.align()).ok_or_else(oom)?;
        let offset = aligned - start;
        let end = offset
            .checked_add(layout.size().max(1))
            .ok_or_else(oom)?;
        if end > self.size {
            return Err(oom());
        }

        self.next = end;
        // SAFETY: offset < end <= size, so the pointer stays inside the range.
        Ok(unsafe { self.base.add(offset) })
    }

    unsafe fn release(&mut self, _ptr: NonNull<u8>, _layout: Layout) {}
}
