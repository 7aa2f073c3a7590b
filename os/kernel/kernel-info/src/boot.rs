//! # Kernel Boot Information

use kernel_memory_addresses::{PhysicalAddress, PhysicalRange};

/// Description of the memory a core starts with, handed over by the platform
/// bring-up code before the kernel is constructed.
///
/// All ranges are physical and page-granular.
/// Keep this `#[repr(C)]`; it crosses the boot loader / kernel boundary.
#[repr(C)]
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CoreInfo {
    /// Index of the core this information belongs to.
    pub core_id: u32,

    /// All physical memory managed by the kernel.
    pub memory: PhysicalRange,

    /// The kernel's own load image (text, data, BSS).
    pub kernel: PhysicalRange,

    /// The embedded boot image describing the initial programs.
    pub boot_image: PhysicalRange,

    /// Backing memory of the kernel heap.
    pub heap: PhysicalRange,

    /// Shared memory used for inter-core messaging.
    pub core_channel: PhysicalRange,
}

impl CoreInfo {
    /// The regions the kernel must mark as used before handing out memory,
    /// paired with a short label for diagnostics.
    ///
    /// The unconditional low-memory reservation is not part of this list;
    /// see [`LOW_MEMORY_RESERVED`](crate::memory::LOW_MEMORY_RESERVED).
    #[must_use]
    pub const fn reserved_regions(&self) -> [(&'static str, PhysicalRange); 4] {
        [
            ("kernel", self.kernel),
            ("boot image", self.boot_image),
            ("heap", self.heap),
            ("core channel", self.core_channel),
        ]
    }

    /// Physical address of the boot image.
    #[inline]
    #[must_use]
    pub const fn boot_image_address(&self) -> PhysicalAddress {
        self.boot_image.base
    }
}
