//! # Memory Layout

use bitfield_struct::bitfield;
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, VirtualAddress, VirtualRange};

/// End of userspace VA range after which Kernel space begins.
pub const LAST_USERSPACE_ADDRESS: u64 = 0xffff_0000_0000_0000;

/// A simple Higher Half Direct Map (HHDM) base.
/// Anything you map at [`HHDM_BASE`] + `pa` lets the kernel
/// access physical memory via a fixed offset.
pub const HHDM_BASE: u64 = 0xffff_8880_0000_0000;

/// Size of the kernel data window starting at [`HHDM_BASE`].
pub const KERNEL_DATA_SIZE: u64 = 0x0000_0040_0000_0000; // 256 GiB

/// Where the kernel executes (VMA).
pub const KERNEL_BASE: u64 = 0xffff_ffff_8000_0000;

/// Physical memory below this boundary is always marked used during bootstrap
/// (firmware tables, legacy BIOS areas, early loader structures).
pub const LOW_MEMORY_RESERVED: u64 = 4 * 1024 * 1024;

/// Start of the per-process program arguments page.
pub const USER_ARGS_BASE: u64 = 0x0000_7fff_ffff_0000;

/// Size of the per-process program arguments region.
pub const USER_ARGS_SIZE: u64 = PAGE_SIZE;

/// Top-of-stack region for the initial user thread, right below the arguments.
pub const USER_STACK_BASE: u64 = 0x0000_7fff_fff0_0000;

/// Size of the initial user stack region.
pub const USER_STACK_SIZE: u64 = 0x0008_0000; // 512 KiB

/// Start of the private (heap/mmap) region of a process.
pub const USER_PRIVATE_BASE: u64 = 0x0000_0001_0000_0000;

/// Size of the private region of a process.
pub const USER_PRIVATE_SIZE: u64 = 0x0000_7000_0000_0000;

/// Vector of the first hardware IRQ after the PIC/APIC remap; vectors below
/// are CPU exceptions.
pub const IRQ_VECTOR_BASE: u32 = 32;

const _: () = {
    assert!(HHDM_BASE >= LAST_USERSPACE_ADDRESS);
    assert!(KERNEL_BASE > HHDM_BASE + KERNEL_DATA_SIZE);
    assert!(USER_ARGS_SIZE.is_multiple_of(PAGE_SIZE));
    assert!(USER_STACK_BASE + USER_STACK_SIZE <= USER_ARGS_BASE);
    assert!(USER_PRIVATE_BASE + USER_PRIVATE_SIZE <= USER_STACK_BASE);
    assert!(LOW_MEMORY_RESERVED.is_multiple_of(PAGE_SIZE));
};

/// Access permissions of a mapping.
///
/// Collaborators implementing a `MemoryContext` translate these bits into
/// their page table format.
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct MemoryAccess {
    /// Mapping may be read.
    pub readable: bool,

    /// Mapping may be written.
    pub writable: bool,

    /// Instructions may be fetched from the mapping.
    pub executable: bool,

    /// Mapping is accessible from user mode.
    pub user: bool,

    /// Caching disabled.
    pub uncached: bool,

    /// Device (MMIO) memory.
    pub device: bool,

    #[bits(2)]
    __reserved: u8,
}

impl MemoryAccess {
    /// User read/write/execute, used for boot program segments.
    pub const USER_RWX: Self = Self::new()
        .with_user(true)
        .with_readable(true)
        .with_writable(true)
        .with_executable(true);

    /// User read/write, used for the arguments page.
    pub const USER_RW: Self = Self::new()
        .with_user(true)
        .with_readable(true)
        .with_writable(true);
}

/// A virtual range backed by a physical range, with access permissions.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MappedRange {
    pub virt: VirtualAddress,
    pub phys: PhysicalAddress,
    pub size: u64,
    pub access: MemoryAccess,
}

/// Symbolic names of the architecture-defined virtual regions.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum MemoryRegion {
    /// Kernel window through which all physical memory is reachable.
    KernelData,
    /// Per-process program arguments page.
    UserArgs,
    /// Initial user stack.
    UserStack,
    /// Per-process private heap/mmap region.
    UserPrivate,
}

/// Architecture memory map: resolves a [`MemoryRegion`] to its virtual range.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MemoryMap {
    kernel_data: VirtualRange,
    user_args: VirtualRange,
    user_stack: VirtualRange,
    user_private: VirtualRange,
}

impl MemoryMap {
    /// The x86-64 layout described in the crate documentation.
    pub const DEFAULT: Self = Self {
        kernel_data: VirtualRange::new(VirtualAddress::new(HHDM_BASE), KERNEL_DATA_SIZE),
        user_args: VirtualRange::new(VirtualAddress::new(USER_ARGS_BASE), USER_ARGS_SIZE),
        user_stack: VirtualRange::new(VirtualAddress::new(USER_STACK_BASE), USER_STACK_SIZE),
        user_private: VirtualRange::new(
            VirtualAddress::new(USER_PRIVATE_BASE),
            USER_PRIVATE_SIZE,
        ),
    };

    /// A map with a custom kernel data window, e.g. a host-side test arena.
    ///
    /// User regions keep their default placement.
    #[must_use]
    pub const fn with_kernel_data(kernel_data: VirtualRange) -> Self {
        Self {
            kernel_data,
            ..Self::DEFAULT
        }
    }

    /// The virtual range of the given region.
    #[must_use]
    pub const fn range(&self, region: MemoryRegion) -> VirtualRange {
        match region {
            MemoryRegion::KernelData => self.kernel_data,
            MemoryRegion::UserArgs => self.user_args,
            MemoryRegion::UserStack => self.user_stack,
            MemoryRegion::UserPrivate => self.user_private,
        }
    }
}

impl Default for MemoryMap {
    fn default() -> Self {
        Self::DEFAULT
    }
}
