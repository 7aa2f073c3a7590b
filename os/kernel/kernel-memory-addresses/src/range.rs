use crate::{Address, PAGE_SIZE, PhysicalAddress, VirtualAddress, is_page_aligned};
use core::fmt;
use core::iter::FusedIterator;

/// A contiguous `(base, size)` span of addresses.
///
/// Ranges used for allocation bookkeeping are expected to be page-aligned in
/// both base and size; [`AddressRange::is_page_aligned`] checks that.
#[derive(Copy, Clone, Default, Eq, PartialEq, Hash)]
pub struct AddressRange<A> {
    /// First address in the range.
    pub base: A,
    /// Length in bytes.
    pub size: u64,
}

/// A range of physical addresses.
pub type PhysicalRange = AddressRange<PhysicalAddress>;

/// A range of virtual addresses.
pub type VirtualRange = AddressRange<VirtualAddress>;

impl<A: Address> AddressRange<A> {
    #[inline]
    #[must_use]
    pub const fn new(base: A, size: u64) -> Self {
        Self { base, size }
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// One past the last address, saturating at the top of the address space.
    #[inline]
    #[must_use]
    pub fn end(&self) -> u64 {
        self.base.as_u64().saturating_add(self.size)
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, addr: A) -> bool {
        addr >= self.base && addr.as_u64() < self.end()
    }

    /// Whether the two ranges share at least one byte.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.base.as_u64() < other.end()
            && other.base.as_u64() < self.end()
    }

    #[inline]
    #[must_use]
    pub fn is_page_aligned(&self) -> bool {
        is_page_aligned(self.base.as_u64()) && is_page_aligned(self.size)
    }

    /// Number of pages touched by the range when walked in [`PAGE_SIZE`] strides.
    #[inline]
    #[must_use]
    pub const fn page_count(&self) -> u64 {
        self.size.div_ceil(PAGE_SIZE)
    }

    /// Iterate the range in [`PAGE_SIZE`] strides, starting at `base`.
    ///
    /// A trailing partial page is visited once.
    #[inline]
    #[must_use]
    pub const fn pages(&self) -> PageIter<A> {
        PageIter {
            next: self.base,
            remaining: self.page_count(),
        }
    }
}

impl<A: Address> fmt::Debug for AddressRange<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}..0x{:016X} ({} bytes)",
            self.base,
            self.end(),
            self.size
        )
    }
}

/// Page-stride iterator returned by [`AddressRange::pages`].
#[derive(Clone)]
pub struct PageIter<A> {
    next: A,
    remaining: u64,
}

impl<A: Address> Iterator for PageIter<A> {
    type Item = A;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let current = self.next;
        self.remaining -= 1;
        if self.remaining > 0 {
            self.next = self.next + PAGE_SIZE;
        }
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = usize::try_from(self.remaining).unwrap_or(usize::MAX);
        (n, Some(n))
    }
}

impl<A: Address> FusedIterator for PageIter<A> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_trailing_page_is_visited() {
        let r = VirtualRange::new(VirtualAddress::new(0x1000), PAGE_SIZE + 1);
        assert_eq!(r.page_count(), 2);
        assert_eq!(r.pages().count(), 2);
    }

    #[test]
    fn empty_range_has_no_pages() {
        let r = PhysicalRange::new(PhysicalAddress::new(0x1000), 0);
        assert!(r.is_empty());
        assert_eq!(r.pages().next(), None);
    }

    #[test]
    fn overlap_detection() {
        let a = PhysicalRange::new(PhysicalAddress::new(0x0000), 0x2000);
        let b = PhysicalRange::new(PhysicalAddress::new(0x1000), 0x2000);
        let c = PhysicalRange::new(PhysicalAddress::new(0x2000), 0x1000);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert!(b.overlaps(&c));
    }

    #[test]
    fn top_of_address_space_does_not_overflow() {
        let r = PhysicalRange::new(PhysicalAddress::new(u64::MAX - 0xFFF), PAGE_SIZE);
        assert_eq!(r.pages().count(), 1);
        assert!(r.contains(PhysicalAddress::new(u64::MAX - 1)));
    }
}
