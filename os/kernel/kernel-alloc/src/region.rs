//! # Region allocator
//!
//! A bitmap over the physical pages of the machine, one bit per
//! [`PAGE_SIZE`] page (`1` = used). Alongside it the allocator knows the
//! kernel data window through which allocated pages are reachable, so it can
//! translate between the two address kinds.
//!
//! The bitmap storage is provided by the caller; the allocator itself never
//! allocates.

use kernel_memory_addresses::{
    PAGE_SIZE, PhysicalAddress, PhysicalRange, VirtualAddress, VirtualRange,
};

const BITS: u64 = 64;

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum RegionError {
    #[error("address {0} is not page aligned")]
    Unaligned(PhysicalAddress),
    #[error("address {0} is outside physical memory")]
    OutOfRange(PhysicalAddress),
    #[error("page {0} is already in use")]
    AlreadyUsed(PhysicalAddress),
    #[error("page {0} is not allocated")]
    NotAllocated(PhysicalAddress),
    #[error("zero-sized allocation")]
    InvalidSize,
    #[error("no free run of {size} bytes")]
    OutOfMemory { size: u64 },
    #[error("bitmap needs {required} words, got {provided}")]
    BitmapTooSmall { required: usize, provided: usize },
}

pub struct RegionAllocator {
    phys: PhysicalRange,
    virt: VirtualRange,
    bitmap: &'static mut [u64],
    free_pages: u64,
}

impl RegionAllocator {
    /// Number of `u64` bitmap words needed to track `memory_size` bytes.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn bitmap_words(memory_size: u64) -> usize {
        memory_size.div_ceil(PAGE_SIZE).div_ceil(BITS) as usize
    }

    /// Track `phys`, with all pages free.
    ///
    /// `virt` is the kernel data window: `phys.base` is visible at `virt.base`.
    ///
    /// # Errors
    /// [`RegionError::Unaligned`] if `phys` is not page aligned, and
    /// [`RegionError::BitmapTooSmall`] if `bitmap` cannot cover it.
    pub fn new(
        phys: PhysicalRange,
        virt: VirtualRange,
        bitmap: &'static mut [u64],
    ) -> Result<Self, RegionError> {
        if !phys.is_page_aligned() {
            return Err(RegionError::Unaligned(phys.base));
        }
        let required = Self::bitmap_words(phys.size);
        if bitmap.len() < required {
            return Err(RegionError::BitmapTooSmall {
                required,
                provided: bitmap.len(),
            });
        }

        bitmap.fill(0);
        Ok(Self {
            phys,
            virt,
            bitmap,
            free_pages: phys.page_count(),
        })
    }

    /// Total bytes of physical memory tracked.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.phys.size
    }

    /// Bytes of physical memory still free.
    #[must_use]
    pub const fn available(&self) -> u64 {
        self.free_pages * PAGE_SIZE
    }

    #[must_use]
    pub const fn physical_range(&self) -> PhysicalRange {
        self.phys
    }

    #[must_use]
    pub const fn kernel_window(&self) -> VirtualRange {
        self.virt
    }

    fn page_index(&self, pa: PhysicalAddress) -> Result<u64, RegionError> {
        if !pa.is_page_aligned() {
            return Err(RegionError::Unaligned(pa));
        }
        if !self.phys.contains(pa) {
            return Err(RegionError::OutOfRange(pa));
        }
        Ok((pa - self.phys.base) / PAGE_SIZE)
    }

    /// Bitmap word holding page `index`; indices are bounded by the bitmap length.
    #[allow(clippy::cast_possible_truncation)]
    const fn word(index: u64) -> usize {
        (index / BITS) as usize
    }

    fn is_set(&self, index: u64) -> bool {
        self.bitmap[Self::word(index)] & (1 << (index % BITS)) != 0
    }

    fn set(&mut self, index: u64, used: bool) {
        let word = &mut self.bitmap[Self::word(index)];
        let mask = 1 << (index % BITS);
        if used {
            *word |= mask;
            self.free_pages -= 1;
        } else {
            *word &= !mask;
            self.free_pages += 1;
        }
    }

    /// Whether the page at `pa` is marked used.
    ///
    /// # Errors
    /// [`RegionError::Unaligned`] or [`RegionError::OutOfRange`].
    pub fn is_used(&self, pa: PhysicalAddress) -> Result<bool, RegionError> {
        Ok(self.is_set(self.page_index(pa)?))
    }

    /// Mark the single page at `pa` used.
    ///
    /// # Errors
    /// [`RegionError::AlreadyUsed`] if the page is taken, or the errors of
    /// [`RegionAllocator::is_used`].
    pub fn allocate_at(&mut self, pa: PhysicalAddress) -> Result<(), RegionError> {
        let index = self.page_index(pa)?;
        if self.is_set(index) {
            return Err(RegionError::AlreadyUsed(pa));
        }
        self.set(index, true);
        Ok(())
    }

    /// Mark every page of `range` used.
    ///
    /// Pages that are already used stay used; reserving overlapping ranges is
    /// harmless.
    ///
    /// # Errors
    /// [`RegionError::Unaligned`] or [`RegionError::OutOfRange`] for the first
    /// offending page. Pages before it remain marked.
    pub fn reserve(&mut self, range: PhysicalRange) -> Result<(), RegionError> {
        for page in range.pages() {
            match self.allocate_at(page) {
                Ok(()) | Err(RegionError::AlreadyUsed(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Allocate `size` bytes (rounded up to whole pages) of contiguous,
    /// free physical memory whose base is aligned to `align`.
    ///
    /// `align` below [`PAGE_SIZE`] is raised to it. First fit.
    ///
    /// # Errors
    /// [`RegionError::InvalidSize`] for `size == 0`, otherwise
    /// [`RegionError::OutOfMemory`] when no suitable run exists.
    pub fn allocate(&mut self, size: u64, align: u64) -> Result<PhysicalRange, RegionError> {
        if size == 0 {
            return Err(RegionError::InvalidSize);
        }
        let pages = size.div_ceil(PAGE_SIZE);
        let align = align.max(PAGE_SIZE).next_power_of_two();
        let total = self.phys.page_count();

        let mut start = 0;
        while start + pages <= total {
            let base = self.phys.base + start * PAGE_SIZE;
            if !base.as_u64().is_multiple_of(align) {
                start += 1;
                continue;
            }

            if let Some(used) = (start..start + pages).find(|&i| self.is_set(i)) {
                start = used + 1;
                continue;
            }

            for i in start..start + pages {
                self.set(i, true);
            }
            log::trace!("region: allocated {pages} page(s) at {base}");
            return Ok(PhysicalRange::new(base, pages * PAGE_SIZE));
        }

        Err(RegionError::OutOfMemory { size })
    }

    /// Return the page at `pa` to the free pool.
    ///
    /// # Errors
    /// [`RegionError::NotAllocated`] if the page is free, or the errors of
    /// [`RegionAllocator::is_used`].
    pub fn release(&mut self, pa: PhysicalAddress) -> Result<(), RegionError> {
        let index = self.page_index(pa)?;
        if !self.is_set(index) {
            return Err(RegionError::NotAllocated(pa));
        }
        self.set(index, false);
        Ok(())
    }

    /// Kernel virtual address of `pa` in the kernel data window.
    #[must_use]
    pub fn to_virtual(&self, pa: PhysicalAddress) -> Option<VirtualAddress> {
        let offset = pa.checked_offset_from(self.phys.base)?;
        if offset >= self.phys.size || offset >= self.virt.size {
            return None;
        }
        self.virt.base.checked_add(offset)
    }

    /// Physical address behind `va` in the kernel data window.
    #[must_use]
    pub fn to_physical(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        let offset = va.checked_offset_from(self.virt.base)?;
        if offset >= self.phys.size || offset >= self.virt.size {
            return None;
        }
        self.phys.base.checked_add(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    fn allocator(base: u64, size: u64) -> RegionAllocator {
        let words = RegionAllocator::bitmap_words(size);
        let bitmap = Box::leak(vec![u64::MAX; words].into_boxed_slice());
        RegionAllocator::new(
            PhysicalRange::new(PhysicalAddress::new(base), size),
            VirtualRange::new(VirtualAddress::new(0xffff_8880_0000_0000 + base), size),
            bitmap,
        )
        .unwrap()
    }

    fn range(base: u64, size: u64) -> PhysicalRange {
        PhysicalRange::new(PhysicalAddress::new(base), size)
    }

    fn page(index: u64) -> PhysicalAddress {
        PhysicalAddress::new(index * PAGE_SIZE)
    }

    #[test]
    fn starts_empty() {
        let alloc = allocator(0, 16 * MIB);
        assert_eq!(alloc.size(), 16 * MIB);
        assert_eq!(alloc.available(), 16 * MIB);
    }

    #[test]
    fn bitmap_must_cover_memory() {
        let bitmap = Box::leak(vec![0u64; 1].into_boxed_slice());
        let err = RegionAllocator::new(range(0, 65 * PAGE_SIZE), VirtualRange::default(), bitmap);
        assert!(matches!(
            err,
            Err(RegionError::BitmapTooSmall {
                required: 2,
                provided: 1
            })
        ));
    }

    #[test]
    fn overlapping_reservations_block_allocation() {
        let mut alloc = allocator(0, 16 * MIB);
        let first = 4 * MIB / PAGE_SIZE;
        alloc.reserve(range(4 * MIB, 8 * PAGE_SIZE)).unwrap();
        let overlapping = range(4 * MIB + 4 * PAGE_SIZE, 8 * PAGE_SIZE);
        alloc.reserve(overlapping).unwrap();
        assert_eq!(alloc.available(), 16 * MIB - 12 * PAGE_SIZE);

        for offset in [0, 5, 11] {
            let pa = page(first + offset);
            assert_eq!(alloc.allocate_at(pa), Err(RegionError::AlreadyUsed(pa)));
        }
        assert!(alloc.allocate_at(page(first + 12)).is_ok());
    }

    #[test]
    fn reservation_outside_memory_fails() {
        let mut alloc = allocator(0, 4 * MIB);
        let err = alloc.reserve(range(4 * MIB - PAGE_SIZE, 2 * PAGE_SIZE));
        let end = PhysicalAddress::new(4 * MIB);
        assert_eq!(err, Err(RegionError::OutOfRange(end)));
    }

    #[test]
    fn allocate_skips_used_pages_and_honors_alignment() {
        let mut alloc = allocator(0, 4 * MIB);
        alloc.reserve(range(0, 3 * PAGE_SIZE)).unwrap();

        let a = alloc.allocate(1, PAGE_SIZE).unwrap();
        assert_eq!(a, range(3 * PAGE_SIZE, PAGE_SIZE));

        let b = alloc.allocate(2 * PAGE_SIZE, 4 * PAGE_SIZE).unwrap();
        assert_eq!(b, range(4 * PAGE_SIZE, 2 * PAGE_SIZE));

        let c = alloc.allocate(PAGE_SIZE, 0).unwrap();
        assert_eq!(c.base.as_u64(), 6 * PAGE_SIZE);
    }

    #[test]
    fn allocation_restarts_past_used_page_inside_run() {
        let mut alloc = allocator(0, 128 * PAGE_SIZE);
        alloc.allocate_at(page(2)).unwrap();
        alloc.allocate_at(page(70)).unwrap();

        let a = alloc.allocate(3 * PAGE_SIZE, PAGE_SIZE).unwrap();
        assert_eq!(a, range(3 * PAGE_SIZE, 3 * PAGE_SIZE));

        let b = alloc.allocate(64 * PAGE_SIZE, PAGE_SIZE).unwrap();
        assert_eq!(b, range(6 * PAGE_SIZE, 64 * PAGE_SIZE));
        assert!(alloc.is_used(page(69)).unwrap());
        assert_eq!(alloc.available(), 128 * PAGE_SIZE - 69 * PAGE_SIZE);
    }

    #[test]
    fn allocate_reports_exhaustion() {
        let mut alloc = allocator(0, 4 * PAGE_SIZE);
        assert_eq!(alloc.allocate(0, PAGE_SIZE), Err(RegionError::InvalidSize));
        alloc.allocate(4 * PAGE_SIZE, PAGE_SIZE).unwrap();
        assert_eq!(
            alloc.allocate(PAGE_SIZE, PAGE_SIZE),
            Err(RegionError::OutOfMemory { size: PAGE_SIZE })
        );
    }

    #[test]
    fn release_returns_pages() {
        let mut alloc = allocator(0, 4 * PAGE_SIZE);
        let r = alloc.allocate(PAGE_SIZE, PAGE_SIZE).unwrap();
        alloc.release(r.base).unwrap();
        let again = alloc.release(r.base);
        assert_eq!(again, Err(RegionError::NotAllocated(r.base)));
        assert_eq!(alloc.available(), 4 * PAGE_SIZE);
    }

    #[test]
    fn translation_round_trips_within_window() {
        let alloc = allocator(MIB, 2 * MIB);
        let pa = PhysicalAddress::new(MIB + 0x1234);
        let va = alloc.to_virtual(pa).unwrap();
        assert_eq!(va.as_u64(), 0xffff_8880_0000_0000 + MIB + 0x1234);
        assert_eq!(alloc.to_physical(va), Some(pa));

        assert_eq!(alloc.to_virtual(PhysicalAddress::new(0)), None);
        assert_eq!(alloc.to_virtual(PhysicalAddress::new(3 * MIB)), None);
    }
}
