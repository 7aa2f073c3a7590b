//! # Boot Image Layout
//!
//! The boot image is a flat, little-endian, packed blob placed in memory by the
//! boot loader. It lists the programs the kernel starts before anything else
//! runs, together with the memory layout of each program.
//!
//! ```text
//! offset 0                     ┌──────────────────────────────┐
//!                              │ header (25 bytes)            │
//! symbol_table_offset          ├──────────────────────────────┤
//!                              │ BootSymbol × symbol_count    │
//! segments_table_offset        ├──────────────────────────────┤
//!                              │ BootSegment × segments_count │
//!                              ├──────────────────────────────┤
//!                              │ segment payloads             │
//!                              └──────────────────────────────┘
//! ```
//!
//! All table offsets are byte offsets relative to the image base. A symbol
//! refers to its segments by *index* into the segment table. Segment offsets
//! are byte offsets from the image base, so the physical source of a segment is
//! `image_base + segment.offset`.
//!
//! The layout is produced by an external build tool and must stay bit-exact.

#![cfg_attr(not(any(test, doctest)), no_std)]

#[cfg(any(test, feature = "builder"))]
extern crate alloc;

#[cfg(any(test, feature = "builder"))]
pub mod builder;
mod parse;

#[cfg(any(test, feature = "builder"))]
pub use builder::BootImageBuilder;
pub use parse::{BootImage, BootImageError, Segments, Symbols};

/// First magic word; `"BOOT"` when the value is read as big-endian ASCII.
pub const BOOTIMAGE_MAGIC0: u32 = 0x424f_4f54;

/// Second magic word; `"IMAG"` when the value is read as big-endian ASCII.
pub const BOOTIMAGE_MAGIC1: u32 = 0x494d_4147;

/// Layout revision understood by this crate.
pub const BOOTIMAGE_REVISION: u8 = 1;

/// Fixed length of a symbol name, including zero padding.
pub const BOOTIMAGE_NAMELEN: usize = 32;

/// Size of the packed header in bytes.
pub const HEADER_SIZE: usize = 25;

/// Size of a packed [`BootSymbol`] entry in bytes.
pub const SYMBOL_SIZE: usize = 44;

/// Size of a packed [`BootSegment`] entry in bytes.
pub const SEGMENT_SIZE: usize = 12;

/// Packed header at the start of every boot image.
///
/// | offset | field |
/// |-------:|-------|
/// | 0  | `magic0: u32` |
/// | 4  | `magic1: u32` |
/// | 8  | `layout_revision: u8` |
/// | 9  | `image_size: u32` |
/// | 13 | `symbol_table_offset: u16` |
/// | 15 | `symbol_table_count: u16` |
/// | 17 | `segments_table_offset: u32` |
/// | 21 | `segments_table_count: u32` |
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct BootImageHeader {
    pub magic0: u32,
    pub magic1: u32,
    pub layout_revision: u8,
    /// Total size of the image in bytes.
    pub image_size: u32,
    pub symbol_table_offset: u16,
    pub symbol_table_count: u16,
    pub segments_table_offset: u32,
    pub segments_table_count: u32,
}

impl BootImageHeader {
    /// A header with valid signature and all tables empty.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            magic0: BOOTIMAGE_MAGIC0,
            magic1: BOOTIMAGE_MAGIC1,
            layout_revision: BOOTIMAGE_REVISION,
            image_size: 0,
            symbol_table_offset: 0,
            symbol_table_count: 0,
            segments_table_offset: 0,
            segments_table_count: 0,
        }
    }

    /// Whether both magic words and the layout revision match.
    #[must_use]
    pub const fn has_valid_signature(&self) -> bool {
        self.magic0 == BOOTIMAGE_MAGIC0
            && self.magic1 == BOOTIMAGE_MAGIC1
            && self.layout_revision == BOOTIMAGE_REVISION
    }
}

impl Default for BootImageHeader {
    fn default() -> Self {
        Self::new()
    }
}

/// Program-type tag of a [`BootSymbol`].
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum BootSymbolType {
    /// An ordinary user program.
    Program,
    /// A program started with elevated privileges (drivers, servers).
    PrivilegedProgram,
    /// A data blob; never started.
    Data,
    /// A tag this revision does not know; skipped by the loader.
    Unknown(u32),
}

impl BootSymbolType {
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::Program,
            1 => Self::PrivilegedProgram,
            2 => Self::Data,
            other => Self::Unknown(other),
        }
    }

    #[must_use]
    pub const fn as_raw(self) -> u32 {
        match self {
            Self::Program => 0,
            Self::PrivilegedProgram => 1,
            Self::Data => 2,
            Self::Unknown(raw) => raw,
        }
    }

    /// Whether the loader starts a process for this symbol.
    #[must_use]
    pub const fn is_program(self) -> bool {
        matches!(self, Self::Program | Self::PrivilegedProgram)
    }

    #[must_use]
    pub const fn is_privileged(self) -> bool {
        matches!(self, Self::PrivilegedProgram)
    }
}

/// Symbol table entry: one program (or data blob) in the image.
///
/// | offset | field |
/// |-------:|-------|
/// | 0  | `name: [u8; 32]` |
/// | 32 | `entry: u32` |
/// | 36 | `type: u32` |
/// | 40 | `segments_count: u16` |
/// | 42 | `segments_offset: u16` (index into the segment table) |
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct BootSymbol {
    pub name: [u8; BOOTIMAGE_NAMELEN],
    pub entry: u32,
    pub kind: BootSymbolType,
    pub segments_count: u16,
    pub segments_offset: u16,
}

impl BootSymbol {
    /// The name up to the first NUL byte, if it is valid UTF-8.
    #[must_use]
    pub fn name_str(&self) -> Option<&str> {
        let len = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(BOOTIMAGE_NAMELEN);
        core::str::from_utf8(&self.name[..len]).ok()
    }
}

/// Segment table entry: a contiguous piece of a program's memory.
///
/// | offset | field |
/// |-------:|-------|
/// | 0 | `virtual_address: u32` |
/// | 4 | `offset: u32` (from image base) |
/// | 8 | `size: u32` |
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct BootSegment {
    pub virtual_address: u32,
    pub offset: u32,
    pub size: u32,
}
