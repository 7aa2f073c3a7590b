use crate::{
    BOOTIMAGE_NAMELEN, BootImageHeader, BootSegment, BootSymbol, BootSymbolType, HEADER_SIZE,
    SEGMENT_SIZE, SYMBOL_SIZE,
};
use core::iter::FusedIterator;

/// Validated, zero-copy view over an in-memory boot image.
#[derive(Debug, Clone, Copy)]
pub struct BootImage<'a> {
    blob: &'a [u8],
    header: BootImageHeader,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum BootImageError {
    #[error("boot image is shorter than its header")]
    TooShort,
    #[error("invalid boot image signature: {magic0:#x}, {magic1:#x}")]
    BadMagic { magic0: u32, magic1: u32 },
    #[error("unsupported boot image layout revision {0}")]
    BadRevision(u8),
    #[error("boot image table entry lies outside the image")]
    OutOfBounds,
}

#[inline]
fn read_u16_le(buf: &[u8], off: usize) -> Result<u16, BootImageError> {
    let end = off.checked_add(2).ok_or(BootImageError::OutOfBounds)?;
    let s = buf.get(off..end).ok_or(BootImageError::OutOfBounds)?;
    Ok(u16::from_le_bytes([s[0], s[1]]))
}

#[inline]
fn read_u32_le(buf: &[u8], off: usize) -> Result<u32, BootImageError> {
    let end = off.checked_add(4).ok_or(BootImageError::OutOfBounds)?;
    let s = buf.get(off..end).ok_or(BootImageError::OutOfBounds)?;
    Ok(u32::from_le_bytes([s[0], s[1], s[2], s[3]]))
}

/// Ensure `count` entries of `entry_size` bytes starting at `off` fit into `len`.
fn check_table(
    len: usize,
    off: usize,
    count: usize,
    entry_size: usize,
) -> Result<(), BootImageError> {
    let bytes = count
        .checked_mul(entry_size)
        .ok_or(BootImageError::OutOfBounds)?;
    let end = off.checked_add(bytes).ok_or(BootImageError::OutOfBounds)?;
    if end > len {
        return Err(BootImageError::OutOfBounds);
    }
    Ok(())
}

impl<'a> BootImage<'a> {
    /// Decode the header without validating the signature.
    ///
    /// # Errors
    /// [`BootImageError::TooShort`] if the blob cannot hold a header.
    pub fn read_header(blob: &[u8]) -> Result<BootImageHeader, BootImageError> {
        if blob.len() < HEADER_SIZE {
            return Err(BootImageError::TooShort);
        }

        Ok(BootImageHeader {
            magic0: read_u32_le(blob, 0)?,
            magic1: read_u32_le(blob, 4)?,
            layout_revision: blob[8],
            image_size: read_u32_le(blob, 9)?,
            symbol_table_offset: read_u16_le(blob, 13)?,
            symbol_table_count: read_u16_le(blob, 15)?,
            segments_table_offset: read_u32_le(blob, 17)?,
            segments_table_count: read_u32_le(blob, 21)?,
        })
    }

    /// Parse and validate a boot image blob.
    ///
    /// Checks both magic words, the layout revision, and that the symbol and
    /// segment tables lie within `blob`. The contents of the entries are not
    /// validated further.
    ///
    /// # Errors
    /// Any [`BootImageError`].
    pub fn parse(blob: &'a [u8]) -> Result<Self, BootImageError> {
        let header = Self::read_header(blob)?;

        if header.magic0 != crate::BOOTIMAGE_MAGIC0 || header.magic1 != crate::BOOTIMAGE_MAGIC1 {
            return Err(BootImageError::BadMagic {
                magic0: header.magic0,
                magic1: header.magic1,
            });
        }
        if header.layout_revision != crate::BOOTIMAGE_REVISION {
            return Err(BootImageError::BadRevision(header.layout_revision));
        }

        check_table(
            blob.len(),
            usize::from(header.symbol_table_offset),
            usize::from(header.symbol_table_count),
            SYMBOL_SIZE,
        )?;
        check_table(
            blob.len(),
            header.segments_table_offset as usize,
            header.segments_table_count as usize,
            SEGMENT_SIZE,
        )?;

        Ok(Self { blob, header })
    }

    #[must_use]
    pub const fn header(&self) -> &BootImageHeader {
        &self.header
    }

    /// Total image size as recorded in the header.
    #[must_use]
    pub const fn image_size(&self) -> u32 {
        self.header.image_size
    }

    /// Number of entries in the symbol table.
    #[must_use]
    pub const fn symbol_count(&self) -> usize {
        self.header.symbol_table_count as usize
    }

    /// Decode symbol `index`.
    ///
    /// # Errors
    /// [`BootImageError::OutOfBounds`] if `index >= symbol_count()`.
    pub fn symbol(&self, index: usize) -> Result<BootSymbol, BootImageError> {
        if index >= self.symbol_count() {
            return Err(BootImageError::OutOfBounds);
        }
        let off = usize::from(self.header.symbol_table_offset) + index * SYMBOL_SIZE;

        let mut name = [0u8; BOOTIMAGE_NAMELEN];
        name.copy_from_slice(
            self.blob
                .get(off..off + BOOTIMAGE_NAMELEN)
                .ok_or(BootImageError::OutOfBounds)?,
        );

        Ok(BootSymbol {
            name,
            entry: read_u32_le(self.blob, off + 32)?,
            kind: BootSymbolType::from_raw(read_u32_le(self.blob, off + 36)?),
            segments_count: read_u16_le(self.blob, off + 40)?,
            segments_offset: read_u16_le(self.blob, off + 42)?,
        })
    }

    /// Iterate over all symbols in table order.
    #[must_use]
    pub const fn symbols(&self) -> Symbols<'_, 'a> {
        Symbols {
            image: self,
            idx: 0,
        }
    }

    /// The segments of `symbol`.
    ///
    /// # Errors
    /// [`BootImageError::OutOfBounds`] if the symbol's segment sub-range
    /// exceeds the segment table.
    pub fn segments(&self, symbol: &BootSymbol) -> Result<Segments<'a>, BootImageError> {
        let first = usize::from(symbol.segments_offset);
        let count = usize::from(symbol.segments_count);
        let end = first + count;
        if end > self.header.segments_table_count as usize {
            return Err(BootImageError::OutOfBounds);
        }

        Ok(Segments {
            blob: self.blob,
            next: self.header.segments_table_offset as usize + first * SEGMENT_SIZE,
            remaining: count,
        })
    }
}

/// Iterator over the symbol table; yields one `Result` per entry.
pub struct Symbols<'i, 'a> {
    image: &'i BootImage<'a>,
    idx: usize,
}

impl Iterator for Symbols<'_, '_> {
    type Item = Result<BootSymbol, BootImageError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.idx >= self.image.symbol_count() {
            return None;
        }
        let i = self.idx;
        self.idx += 1;
        Some(self.image.symbol(i))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let r = self.image.symbol_count().saturating_sub(self.idx);
        (r, Some(r))
    }
}

impl FusedIterator for Symbols<'_, '_> {}

/// Iterator over a symbol's segments.
///
/// The sub-range was bounds-checked by [`BootImage::segments`].
pub struct Segments<'a> {
    blob: &'a [u8],
    next: usize,
    remaining: usize,
}

impl Iterator for Segments<'_> {
    type Item = BootSegment;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let off = self.next;
        let segment = BootSegment {
            virtual_address: read_u32_le(self.blob, off).ok()?,
            offset: read_u32_le(self.blob, off + 4).ok()?,
            size: read_u32_le(self.blob, off + 8).ok()?,
        };
        self.next += SEGMENT_SIZE;
        self.remaining -= 1;
        Some(segment)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl FusedIterator for Segments<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::BootImageBuilder;

    #[test]
    fn short_blob_is_rejected() {
        assert_eq!(
            BootImage::parse(&[0u8; HEADER_SIZE - 1]).unwrap_err(),
            BootImageError::TooShort
        );
    }

    #[test]
    fn bad_magic_reports_both_words() {
        let blob = BootImageBuilder::new().magic(0xdead_beef, 0).build();
        assert_eq!(
            BootImage::parse(&blob).unwrap_err(),
            BootImageError::BadMagic {
                magic0: 0xdead_beef,
                magic1: 0
            }
        );
    }

    #[test]
    fn bad_revision() {
        let blob = BootImageBuilder::new().revision(9).build();
        assert_eq!(
            BootImage::parse(&blob).unwrap_err(),
            BootImageError::BadRevision(9)
        );
    }

    #[test]
    fn symbols_and_segments() {
        let blob = BootImageBuilder::new()
            .program("init", 0x1000, false)
            .segment(0x40_0000, &[0xAA; 16])
            .data("config")
            .program("drv", 0x2000, true)
            .segment(0x40_0000, &[1])
            .segment(0x50_0000, &[2])
            .build();

        let image = BootImage::parse(&blob).unwrap();
        assert_eq!(image.symbol_count(), 3);
        assert_eq!(image.image_size() as usize, blob.len());

        let syms: Vec<_> = image.symbols().map(Result::unwrap).collect();
        assert_eq!(syms[0].name_str(), Some("init"));
        assert_eq!(syms[0].kind, BootSymbolType::Program);
        assert_eq!(syms[1].kind, BootSymbolType::Data);
        assert_eq!(syms[2].kind, BootSymbolType::PrivilegedProgram);

        let segs: Vec<_> = image.segments(&syms[2]).unwrap().collect();
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[1].virtual_address, 0x50_0000);
        assert_eq!(blob[segs[1].offset as usize], 2);

        let init = image.segments(&syms[0]).unwrap().next().unwrap();
        assert_eq!(init.size, 16);
        assert_eq!(&blob[init.offset as usize..][..16], &[0xAA; 16]);
    }

    #[test]
    fn segment_range_beyond_table_is_rejected() {
        let blob = BootImageBuilder::new()
            .program("a", 0, false)
            .segment(0x1000, &[0])
            .build();
        let image = BootImage::parse(&blob).unwrap();
        let mut sym = image.symbol(0).unwrap();
        sym.segments_count = 2;
        assert!(matches!(
            image.segments(&sym),
            Err(BootImageError::OutOfBounds)
        ));
    }

    #[test]
    fn truncated_symbol_table_is_rejected() {
        let blob = BootImageBuilder::new().program("a", 0, false).build();
        let header = BootImage::read_header(&blob).unwrap();
        let cut = usize::from(header.symbol_table_offset) + SYMBOL_SIZE - 1;
        assert_eq!(
            BootImage::parse(&blob[..cut]).unwrap_err(),
            BootImageError::OutOfBounds
        );
    }
}
