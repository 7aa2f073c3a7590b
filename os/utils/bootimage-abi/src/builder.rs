//! In-memory boot image writer.
//!
//! Produces images in exactly the layout [`BootImage`](crate::BootImage)
//! parses. Segment payloads are placed on 4 KiB boundaries so the kernel can
//! map them page by page straight out of the image.

use crate::{
    BOOTIMAGE_MAGIC0, BOOTIMAGE_MAGIC1, BOOTIMAGE_NAMELEN, BOOTIMAGE_REVISION, BootSymbolType,
    HEADER_SIZE, SEGMENT_SIZE, SYMBOL_SIZE,
};
use alloc::vec;
use alloc::vec::Vec;

const PAYLOAD_ALIGN: usize = 4096;
const SYMBOL_TABLE_OFFSET: usize = HEADER_SIZE.next_multiple_of(8);

struct Symbol {
    name: [u8; BOOTIMAGE_NAMELEN],
    entry: u32,
    kind: BootSymbolType,
    segments: Vec<(u32, Vec<u8>)>,
}

/// Builder for boot image blobs.
///
/// ```rust,ignore
/// use bootimage_abi::{BootImage, builder::BootImageBuilder};
///
/// let blob = BootImageBuilder::new()
///     .program("init", 0x1000, false)
///     .segment(0x40_0000, &[0x90; 64])
///     .build();
///
/// let image = BootImage::parse(&blob).unwrap();
/// assert_eq!(image.symbol(0).unwrap().name_str(), Some("init"));
/// ```
pub struct BootImageBuilder {
    magic0: u32,
    magic1: u32,
    revision: u8,
    symbols: Vec<Symbol>,
}

impl Default for BootImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn put_u16(buf: &mut [u8], off: usize, v: u16) {
    buf[off..off + 2].copy_from_slice(&v.to_le_bytes());
}

fn put_u32(buf: &mut [u8], off: usize, v: u32) {
    buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

fn clamp_u16(v: usize) -> u16 {
    u16::try_from(v).unwrap_or(u16::MAX)
}

fn clamp_u32(v: usize) -> u32 {
    u32::try_from(v).unwrap_or(u32::MAX)
}

impl BootImageBuilder {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            magic0: BOOTIMAGE_MAGIC0,
            magic1: BOOTIMAGE_MAGIC1,
            revision: BOOTIMAGE_REVISION,
            symbols: Vec::new(),
        }
    }

    /// Override the magic words (to produce deliberately broken images).
    #[must_use]
    pub const fn magic(mut self, magic0: u32, magic1: u32) -> Self {
        self.magic0 = magic0;
        self.magic1 = magic1;
        self
    }

    /// Override the layout revision.
    #[must_use]
    pub const fn revision(mut self, revision: u8) -> Self {
        self.revision = revision;
        self
    }

    /// Append a symbol of arbitrary type. Names longer than
    /// [`BOOTIMAGE_NAMELEN`] are truncated.
    #[must_use]
    pub fn symbol(mut self, name: &str, entry: u32, kind: BootSymbolType) -> Self {
        let mut raw = [0u8; BOOTIMAGE_NAMELEN];
        let len = name.len().min(BOOTIMAGE_NAMELEN);
        raw[..len].copy_from_slice(&name.as_bytes()[..len]);
        self.symbols.push(Symbol {
            name: raw,
            entry,
            kind,
            segments: Vec::new(),
        });
        self
    }

    /// Append an ordinary or privileged program.
    #[must_use]
    pub fn program(self, name: &str, entry: u32, privileged: bool) -> Self {
        let kind = if privileged {
            BootSymbolType::PrivilegedProgram
        } else {
            BootSymbolType::Program
        };
        self.symbol(name, entry, kind)
    }

    /// Append a data symbol.
    #[must_use]
    pub fn data(self, name: &str) -> Self {
        self.symbol(name, 0, BootSymbolType::Data)
    }

    /// Add a segment to the most recently added symbol.
    ///
    /// Segments added before any symbol are dropped.
    #[must_use]
    pub fn segment(mut self, virtual_address: u32, bytes: &[u8]) -> Self {
        if let Some(last) = self.symbols.last_mut() {
            last.segments.push((virtual_address, bytes.to_vec()));
        }
        self
    }

    /// Serialize the image.
    #[must_use]
    pub fn build(&self) -> Vec<u8> {
        let segment_count: usize = self.symbols.iter().map(|s| s.segments.len()).sum();
        let segments_table_offset = SYMBOL_TABLE_OFFSET + self.symbols.len() * SYMBOL_SIZE;
        let tables_end = segments_table_offset + segment_count * SEGMENT_SIZE;

        // Payload placement, one page-aligned slot per segment.
        let mut payload_offsets = Vec::with_capacity(segment_count);
        let mut cursor = tables_end;
        for (_, bytes) in self.symbols.iter().flat_map(|s| s.segments.iter()) {
            cursor = cursor.next_multiple_of(PAYLOAD_ALIGN);
            payload_offsets.push(cursor);
            cursor += bytes.len();
        }

        let mut blob = vec![0u8; cursor];

        put_u32(&mut blob, 0, self.magic0);
        put_u32(&mut blob, 4, self.magic1);
        blob[8] = self.revision;
        put_u32(&mut blob, 9, clamp_u32(cursor));
        put_u16(&mut blob, 13, clamp_u16(SYMBOL_TABLE_OFFSET));
        put_u16(&mut blob, 15, clamp_u16(self.symbols.len()));
        put_u32(&mut blob, 17, clamp_u32(segments_table_offset));
        put_u32(&mut blob, 21, clamp_u32(segment_count));

        let mut seg_index = 0;
        for (i, sym) in self.symbols.iter().enumerate() {
            let off = SYMBOL_TABLE_OFFSET + i * SYMBOL_SIZE;
            blob[off..off + BOOTIMAGE_NAMELEN].copy_from_slice(&sym.name);
            put_u32(&mut blob, off + 32, sym.entry);
            put_u32(&mut blob, off + 36, sym.kind.as_raw());
            put_u16(&mut blob, off + 40, clamp_u16(sym.segments.len()));
            put_u16(&mut blob, off + 42, clamp_u16(seg_index));

            for (va, bytes) in &sym.segments {
                let entry = segments_table_offset + seg_index * SEGMENT_SIZE;
                let payload = payload_offsets[seg_index];
                put_u32(&mut blob, entry, *va);
                put_u32(&mut blob, entry + 4, clamp_u32(payload));
                put_u32(&mut blob, entry + 8, clamp_u32(bytes.len()));
                blob[payload..payload + bytes.len()].copy_from_slice(bytes);
                seg_index += 1;
            }
        }

        blob
    }
}
