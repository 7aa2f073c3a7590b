//! # Physical memory access
//!
//! Code can only dereference virtual addresses. [`PhysMemory`] hides how a
//! physical range becomes visible (higher-half direct map, identity map, or a
//! host buffer in tests) and hands it out as a byte slice.

use kernel_info::memory::HHDM_BASE;
use kernel_memory_addresses::{PhysicalAddress, PhysicalRange, VirtualAddress};

/// Borrow physical memory as bytes.
pub trait PhysMemory {
    /// `len` bytes starting at `pa`, or `None` if the range is not reachable.
    fn bytes(&self, pa: PhysicalAddress, len: usize) -> Option<&[u8]>;

    /// Mutable variant of [`PhysMemory::bytes`].
    fn bytes_mut(&mut self, pa: PhysicalAddress, len: usize) -> Option<&mut [u8]>;
}

/// [`PhysMemory`] over a window where every physical address in `phys` is
/// visible at `window + (pa - phys.base)`.
#[derive(Debug, Clone, Copy)]
pub struct DirectMap {
    phys: PhysicalRange,
    window: VirtualAddress,
}

impl DirectMap {
    /// # Safety
    /// The whole of `phys` must be mapped readable and writable at `window`
    /// for as long as the `DirectMap` is used, and nothing else may hold
    /// references into that memory while slices from this map are alive.
    #[must_use]
    pub const unsafe fn new(phys: PhysicalRange, window: VirtualAddress) -> Self {
        Self { phys, window }
    }

    /// A map over the higher-half direct map at [`HHDM_BASE`].
    ///
    /// # Safety
    /// See [`DirectMap::new`].
    #[must_use]
    pub const unsafe fn hhdm(phys: PhysicalRange) -> Self {
        Self {
            phys,
            window: VirtualAddress::new(HHDM_BASE + phys.base.as_u64()),
        }
    }

    /// Physical range covered by the map.
    #[must_use]
    pub const fn range(&self) -> PhysicalRange {
        self.phys
    }

    /// Virtual address of `pa`, if `pa..pa + len` lies within the map.
    #[must_use]
    pub fn translate(&self, pa: PhysicalAddress, len: usize) -> Option<VirtualAddress> {
        let offset = pa.checked_offset_from(self.phys.base)?;
        let end = offset.checked_add(len as u64)?;
        if end > self.phys.size {
            return None;
        }
        self.window.checked_add(offset)
    }
}

impl PhysMemory for DirectMap {
    #[allow(clippy::cast_possible_truncation)]
    fn bytes(&self, pa: PhysicalAddress, len: usize) -> Option<&[u8]> {
        let ptr = self.translate(pa, len)?.as_u64() as usize as *const u8;
        // SAFETY: in range and mapped per the constructor contract.
        Some(unsafe { core::slice::from_raw_parts(ptr, len) })
    }

    #[allow(clippy::cast_possible_truncation)]
    fn bytes_mut(&mut self, pa: PhysicalAddress, len: usize) -> Option<&mut [u8]> {
        let ptr = self.translate(pa, len)?.as_u64() as usize as *mut u8;
        // SAFETY: in range and mapped per the constructor contract; `&mut self`
        // keeps other slices from this map from coexisting.
        Some(unsafe { core::slice::from_raw_parts_mut(ptr, len) })
    }
}
