use core::fmt;

/// Fixed-capacity, append-only text buffer.
///
/// Writes that do not fit are truncated at a character boundary and reported
/// as [`fmt::Error`]; [`BufferSink::truncated`] remembers that it happened.
pub struct BufferSink<const N: usize> {
    buf: [u8; N],
    len: usize,
    truncated: bool,
}

impl<const N: usize> BufferSink<N> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buf: [0; N],
            len: 0,
            truncated: false,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        // Only whole `str` prefixes are ever copied in.
        core::str::from_utf8(&self.buf[..self.len]).unwrap_or_default()
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub const fn truncated(&self) -> bool {
        self.truncated
    }

    pub const fn clear(&mut self) {
        self.len = 0;
        self.truncated = false;
    }
}

impl<const N: usize> Default for BufferSink<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> fmt::Write for BufferSink<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = N - self.len;
        let mut take = s.len().min(room);
        while !s.is_char_boundary(take) {
            take -= 1;
        }

        let end = self.len + take;
        let bytes = &s.as_bytes()[..take];
        self.buf[self.len..end].copy_from_slice(bytes);
        self.len = end;

        if take < s.len() {
            self.truncated = true;
            return Err(fmt::Error);
        }
        Ok(())
    }
}
