//! The structural-tag-driven codec core.
//!
//! Each wire struct hand-codes an inherent `encode`/`decode` pair
//! directly against a [`Writer`]/[`Reader`], whose methods are the
//! annotation vocabulary (`len_prefix`, `count_prefix`, `nullterm`, the
//! final-field-only optional tail) as compile-time calls rather than a
//! runtime reflection pass. Getting one wrong is a compile error (wrong
//! method called), not a runtime reflection failure; the one case that
//! stays a runtime error is marshalling a nil payload ([`WireError`]).

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::WireError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Big,
    Little,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixWidth {
    U8,
    U16,
}

impl PrefixWidth {
    fn encode_len(self, len: usize) -> Result<(), WireError> {
        let max = match self {
            PrefixWidth::U8 => u8::MAX as usize,
            PrefixWidth::U16 => u16::MAX as usize,
        };
        if len > max {
            return Err(WireError::PrefixOverflow(len));
        }
        Ok(())
    }
}

/// A cursor over an immutable byte slice, endian-aware.
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    endian: Endian,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8], endian: Endian) -> Reader<'a> {
        Reader { data, pos: 0, endian }
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Switch endianness for the remainder of this reader, so the
    /// `ICQMessageReplyEnvelope` marker can flip decoding to
    /// little-endian as a property of the codec context rather than a
    /// runtime type check scattered through call sites.
    pub fn with_endian(&mut self, endian: Endian) -> EndianGuard<'_, 'a> {
        let previous = self.endian;
        self.endian = endian;
        EndianGuard { reader: self, previous }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    fn need(&self, n: usize) -> Result<(), WireError> {
        if self.remaining() < n {
            return Err(WireError::Truncated {
                need: n,
                have: self.remaining(),
            });
        }
        Ok(())
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        self.need(n)?;
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, WireError> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, WireError> {
        let b = self.read_bytes(2)?;
        Ok(match self.endian {
            Endian::Big => u16::from_be_bytes([b[0], b[1]]),
            Endian::Little => u16::from_le_bytes([b[0], b[1]]),
        })
    }

    pub fn read_u32(&mut self) -> Result<u32, WireError> {
        let b = self.read_bytes(4)?;
        Ok(match self.endian {
            Endian::Big => u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
            Endian::Little => u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
        })
    }

    pub fn read_u64(&mut self) -> Result<u64, WireError> {
        let b = self.read_bytes(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(match self.endian {
            Endian::Big => u64::from_be_bytes(arr),
            Endian::Little => u64::from_le_bytes(arr),
        })
    }

    fn read_prefix_len(&mut self, width: PrefixWidth) -> Result<usize, WireError> {
        Ok(match width {
            PrefixWidth::U8 => self.read_u8()? as usize,
            PrefixWidth::U16 => self.read_u16()? as usize,
        })
    }

    /// `len_prefix` byte field.
    pub fn read_len_prefixed_bytes(&mut self, width: PrefixWidth) -> Result<&'a [u8], WireError> {
        let len = self.read_prefix_len(width)?;
        self.read_bytes(len)
    }

    /// `len_prefix` string field, with optional `nullterm` semantics.
    pub fn read_len_prefixed_string(
        &mut self,
        width: PrefixWidth,
        nullterm: bool,
    ) -> Result<String, WireError> {
        let raw = self.read_len_prefixed_bytes(width)?;
        let body = if nullterm {
            if raw.is_empty() {
                raw
            } else if *raw.last().unwrap() == 0 {
                &raw[..raw.len() - 1]
            } else {
                return Err(WireError::NotNullTerminated);
            }
        } else {
            raw
        };
        String::from_utf8(body.to_vec()).map_err(|_| WireError::InvalidUtf8)
    }

    /// `count_prefix` list field: reads the count, then applies `item` that
    /// many times.
    pub fn read_count_prefixed<T>(
        &mut self,
        width: PrefixWidth,
        mut item: impl FnMut(&mut Reader<'a>) -> Result<T, WireError>,
    ) -> Result<Vec<T>, WireError> {
        let count = self.read_prefix_len(width)?;
        let mut out = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            out.push(item(self)?);
        }
        Ok(out)
    }
}

/// RAII endian switch: restores the previous endianness on drop.
pub struct EndianGuard<'r, 'a> {
    reader: &'r mut Reader<'a>,
    previous: Endian,
}

impl<'r, 'a> std::ops::Deref for EndianGuard<'r, 'a> {
    type Target = Reader<'a>;
    fn deref(&self) -> &Reader<'a> {
        self.reader
    }
}

impl<'r, 'a> std::ops::DerefMut for EndianGuard<'r, 'a> {
    fn deref_mut(&mut self) -> &mut Reader<'a> {
        self.reader
    }
}

impl<'r, 'a> Drop for EndianGuard<'r, 'a> {
    fn drop(&mut self) {
        self.reader.endian = self.previous;
    }
}

/// A growable buffer, endian-aware, used to build up a wire struct body
/// before it is emitted (possibly behind a length prefix written by the
/// caller once the body's length is known -- the "buffer first" rule).
pub struct Writer {
    buf: BytesMut,
    endian: Endian,
}

impl Writer {
    pub fn new(endian: Endian) -> Writer {
        Writer {
            buf: BytesMut::new(),
            endian,
        }
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    pub fn write_u16(&mut self, v: u16) {
        match self.endian {
            Endian::Big => self.buf.put_u16(v),
            Endian::Little => self.buf.put_u16_le(v),
        }
    }

    pub fn write_u32(&mut self, v: u32) {
        match self.endian {
            Endian::Big => self.buf.put_u32(v),
            Endian::Little => self.buf.put_u32_le(v),
        }
    }

    pub fn write_u64(&mut self, v: u64) {
        match self.endian {
            Endian::Big => self.buf.put_u64(v),
            Endian::Little => self.buf.put_u64_le(v),
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    fn write_prefix_len(&mut self, width: PrefixWidth, len: usize) -> Result<(), WireError> {
        width.encode_len(len)?;
        match width {
            PrefixWidth::U8 => self.write_u8(len as u8),
            PrefixWidth::U16 => self.write_u16(len as u16),
        }
        Ok(())
    }

    /// Writes `len_prefix` bytes: the prefix, then the body. The body is
    /// never buffered separately here since the caller already has it as
    /// a concrete slice; composite bodies should use
    /// [`Writer::write_len_prefixed_with`].
    pub fn write_len_prefixed_bytes(
        &mut self,
        width: PrefixWidth,
        bytes: &[u8],
    ) -> Result<(), WireError> {
        self.write_prefix_len(width, bytes.len())?;
        self.write_bytes(bytes);
        Ok(())
    }

    /// Writes a `len_prefix` string, optionally appending the `nullterm`
    /// byte before computing the prefix (so the terminator is counted).
    pub fn write_len_prefixed_string(
        &mut self,
        width: PrefixWidth,
        s: &str,
        nullterm: bool,
    ) -> Result<(), WireError> {
        if s.is_empty() && !nullterm {
            return self.write_prefix_len(width, 0);
        }
        let mut body = s.as_bytes().to_vec();
        if nullterm {
            body.push(0);
        }
        self.write_len_prefixed_bytes(width, &body)
    }

    /// Buffers the body built by `f` first, then emits the length prefix
    /// followed by the bytes -- the struct/list-body composite case.
    /// Elides emitting a zero-length body after a zero prefix.
    pub fn write_len_prefixed_with(
        &mut self,
        width: PrefixWidth,
        f: impl FnOnce(&mut Writer) -> Result<(), WireError>,
    ) -> Result<(), WireError> {
        let mut body = Writer::new(self.endian);
        f(&mut body)?;
        let body = body.into_bytes();
        self.write_prefix_len(width, body.len())?;
        if !body.is_empty() {
            self.write_bytes(&body);
        }
        Ok(())
    }

    /// `count_prefix` list field: writes the element count, then applies
    /// `item` to each element in order.
    pub fn write_count_prefixed<T>(
        &mut self,
        width: PrefixWidth,
        items: &[T],
        mut item: impl FnMut(&mut Writer, &T) -> Result<(), WireError>,
    ) -> Result<(), WireError> {
        width.encode_len(items.len())?;
        match width {
            PrefixWidth::U8 => self.write_u8(items.len() as u8),
            PrefixWidth::U16 => self.write_u16(items.len() as u16),
        }
        for it in items {
            item(self, it)?;
        }
        Ok(())
    }
}
