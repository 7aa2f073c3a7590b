//! # Physical and Virtual Memory Address Types
//!
//! Strongly typed wrappers for raw memory addresses and page-granular ranges
//! used by the bootstrap allocators and the process loader.
//!
//! ## Overview
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`PhysicalAddress`] | A CPU physical address (RAM or MMIO). |
//! | [`VirtualAddress`] | An address in some (kernel or process) address space. |
//! | [`AddressRange<A>`] | A `(base, size)` span of either kind of address. |
//!
//! All bookkeeping in the kernel bootstrap happens at [`PAGE_SIZE`]
//! granularity. [`AddressRange::pages`] walks a range in page strides, which
//! is how reservations and segment mappings are performed.
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let range = PhysicalRange::new(PhysicalAddress::new(0x10_0000), 3 * PAGE_SIZE);
//! let pages: Vec<_> = range.pages().map(PhysicalAddress::as_u64).collect();
//! assert_eq!(pages, [0x10_0000, 0x10_1000, 0x10_2000]);
//! ```
//!
//! The wrappers are `#[repr(transparent)]` and zero-cost; they exist only so
//! physical and virtual values cannot be mixed by accident.

#![cfg_attr(not(any(test, doctest)), no_std)]

mod range;

use core::fmt;
use core::ops::{Add, AddAssign, Sub};

pub use range::{AddressRange, PageIter, PhysicalRange, VirtualRange};

/// Size of the smallest mappable page in bytes.
pub const PAGE_SIZE: u64 = 4096;

/// log2([`PAGE_SIZE`]).
pub const PAGE_SHIFT: u32 = 12;

const _: () = assert!(1 << PAGE_SHIFT == PAGE_SIZE);

/// Round `value` up to the next multiple of `align` (a power of two).
///
/// Returns `None` on overflow.
#[inline]
#[must_use]
pub const fn checked_align_up(value: u64, align: u64) -> Option<u64> {
    debug_assert!(align.is_power_of_two());
    match value.checked_add(align - 1) {
        Some(v) => Some(v & !(align - 1)),
        None => None,
    }
}

/// Round `value` down to a multiple of `align` (a power of two).
#[inline]
#[must_use]
pub const fn align_down(value: u64, align: u64) -> u64 {
    debug_assert!(align.is_power_of_two());
    value & !(align - 1)
}

/// Whether `value` is a multiple of [`PAGE_SIZE`].
#[inline]
#[must_use]
pub const fn is_page_aligned(value: u64) -> bool {
    value & (PAGE_SIZE - 1) == 0
}

/// Common behavior of the two address kinds.
///
/// Sealed; only [`PhysicalAddress`] and [`VirtualAddress`] implement it.
pub trait Address:
    sealed::Sealed + Copy + Eq + Ord + fmt::Debug + fmt::Display + Add<u64, Output = Self>
{
    /// Wrap a raw value.
    fn new(value: u64) -> Self;

    /// The raw value.
    fn as_u64(self) -> u64;
}

mod sealed {
    pub trait Sealed {}
}

macro_rules! address_type {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[repr(transparent)]
        #[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
        pub struct $name(u64);

        impl $name {
            #[inline]
            #[must_use]
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            #[inline]
            #[must_use]
            pub const fn zero() -> Self {
                Self(0)
            }

            #[inline]
            #[must_use]
            pub const fn as_u64(self) -> u64 {
                self.0
            }

            /// Whether the address sits on a page boundary.
            #[inline]
            #[must_use]
            pub const fn is_page_aligned(self) -> bool {
                is_page_aligned(self.0)
            }

            /// The base of the page containing this address.
            #[inline]
            #[must_use]
            pub const fn page_base(self) -> Self {
                Self(align_down(self.0, PAGE_SIZE))
            }

            /// Offset of this address within its page.
            #[inline]
            #[must_use]
            pub const fn page_offset(self) -> u64 {
                self.0 & (PAGE_SIZE - 1)
            }

            /// Checked addition of a byte offset.
            #[inline]
            #[must_use]
            pub const fn checked_add(self, rhs: u64) -> Option<Self> {
                match self.0.checked_add(rhs) {
                    Some(v) => Some(Self(v)),
                    None => None,
                }
            }

            /// Byte distance from `origin` to `self`, if `self >= origin`.
            #[inline]
            #[must_use]
            pub const fn checked_offset_from(self, origin: Self) -> Option<u64> {
                self.0.checked_sub(origin.0)
            }
        }

        impl sealed::Sealed for $name {}

        impl Address for $name {
            #[inline]
            fn new(value: u64) -> Self {
                Self(value)
            }

            #[inline]
            fn as_u64(self) -> u64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "(0x{:016X})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{:016X}", self.0)
            }
        }

        impl Add<u64> for $name {
            type Output = Self;

            #[inline]
            fn add(self, rhs: u64) -> Self::Output {
                Self(self.0 + rhs)
            }
        }

        impl AddAssign<u64> for $name {
            #[inline]
            fn add_assign(&mut self, rhs: u64) {
                self.0 += rhs;
            }
        }

        impl Sub<$name> for $name {
            type Output = u64;

            #[inline]
            fn sub(self, rhs: $name) -> Self::Output {
                self.0 - rhs.0
            }
        }

        impl From<$name> for u64 {
            #[inline]
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

address_type!(
    /// Physical memory address.
    ///
    /// Refers to RAM or MMIO as seen by the memory controller. It cannot be
    /// dereferenced directly; translate it through a direct map first.
    PhysicalAddress,
    "PhysicalAddress"
);

address_type!(
    /// Virtual memory address.
    ///
    /// Carries no canonicality check; it only marks the *kind* of address.
    VirtualAddress,
    "VirtualAddress"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_helpers() {
        let pa = PhysicalAddress::new(0x1234_5678);
        assert_eq!(pa.page_base().as_u64(), 0x1234_5000);
        assert_eq!(pa.page_offset(), 0x678);
        assert!(!pa.is_page_aligned());
        assert!(pa.page_base().is_page_aligned());
    }

    #[test]
    fn align_up_overflows_to_none() {
        assert_eq!(checked_align_up(1, PAGE_SIZE), Some(PAGE_SIZE));
        assert_eq!(checked_align_up(PAGE_SIZE, PAGE_SIZE), Some(PAGE_SIZE));
        assert_eq!(checked_align_up(u64::MAX, PAGE_SIZE), None);
    }

    #[test]
    fn offsets_between_addresses() {
        let base = VirtualAddress::new(0x40_0000);
        let va = base + 0x2000;
        assert_eq!(va - base, 0x2000);
        assert_eq!(va.checked_offset_from(base), Some(0x2000));
        assert_eq!(base.checked_offset_from(va), None);
    }

    #[test]
    fn display_is_hex() {
        let va = VirtualAddress::new(0x40_0000);
        assert_eq!(format!("{va}"), "0x0000000000400000");
        assert_eq!(format!("{va:?}"), "VirtualAddress(0x0000000000400000)");
    }
}
