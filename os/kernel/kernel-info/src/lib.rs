//! # Kernel Configuration and Boot Interface
//!
//! This crate defines the data structures and layout constants shared between
//! the platform bring-up code and the kernel bootstrap. It is the single source
//! of truth for *what memory exists* and *where named regions live*.
//!
//! ## Architecture
//!
//! ### Boot Information ([`boot`])
//! The [`CoreInfo`](boot::CoreInfo) hand-off describes, at page granularity:
//! * the physical memory of the machine,
//! * the kernel's own load image,
//! * the embedded boot image blob,
//! * the kernel heap,
//! * the inter-core communication channel.
//!
//! ### Memory Layout ([`memory`])
//! * [`MemoryAccess`](memory::MemoryAccess) permission bits for mappings,
//! * [`MappedRange`](memory::MappedRange) (virtual, physical, size, access),
//! * the architecture [`MemoryMap`](memory::MemoryMap) of named virtual regions,
//! * fixed constants such as the unconditional low-memory reservation.
//!
//! ## Virtual Address Space Layout (x86-64 default)
//!
//! ```text
//! 0x0000_0000_0000_0000 ┌─────────────────────────────────┐
//!                       │        User Private             │
//! USER_ARGS_BASE        ├─────────────────────────────────┤ 0x0000_7FFF_FFFF_0000
//!                       │        User Arguments           │
//! LAST_USERSPACE_ADDRESS├─────────────────────────────────┤
//!                       │        Guard Region             │
//! HHDM_BASE             ├─────────────────────────────────┤ 0xFFFF_8880_0000_0000
//!                       │   Kernel Data (direct map)      │
//! KERNEL_BASE           ├─────────────────────────────────┤ 0xFFFF_FFFF_8000_0000
//!                       │       Kernel Text & Data        │
//! 0xFFFF_FFFF_FFFF_FFFF └─────────────────────────────────┘
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod boot;
pub mod memory;

pub use boot::CoreInfo;
pub use memory::{MappedRange, MemoryAccess, MemoryMap, MemoryRegion};
