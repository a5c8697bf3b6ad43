use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};

use super::name::{split_display, Name, NameRegistry, SealedNameRegistry};
use super::name_table::{NameMode, NameTable};
use crate::error::{Error, Result};

/// Counters collected while decoding one archive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    /// Properties skipped because their kind is unknown or their payload
    /// did not decode.
    pub unreadable_properties: usize,
}

impl ReadStats {
    pub fn merge(&mut self, other: ReadStats) {
        self.unreadable_properties += other.unreadable_properties;
    }
}

/// Seekable reader over an archive buffer (heap or memory-mapped).
///
/// Reads are bounded by a movable limit so a length-prefixed payload can be
/// decoded in place without reading past its declared end.
pub struct ArchiveReader<'a> {
    data: &'a [u8],
    pos: usize,
    limit: usize,
    mode: NameMode,
    names: Option<Arc<NameTable>>,
    interner: NameRegistry,
    shared: Option<Arc<SealedNameRegistry>>,
    stats: ReadStats,
}

impl<'a> ArchiveReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            limit: data.len(),
            mode: NameMode::Legacy,
            names: None,
            interner: NameRegistry::new(),
            shared: None,
            stats: ReadStats::default(),
        }
    }

    pub fn with_names(data: &'a [u8], mode: NameMode, names: Option<Arc<NameTable>>) -> Self {
        let mut reader = Self::new(data);
        reader.set_names(mode, names);
        reader
    }

    pub fn set_names(&mut self, mode: NameMode, names: Option<Arc<NameTable>>) {
        self.mode = mode;
        self.names = names;
    }

    /// Names found in `shared` reuse its allocations instead of being
    /// interned per reader.
    pub fn set_shared_names(&mut self, shared: Option<Arc<SealedNameRegistry>>) {
        self.shared = shared;
    }

    pub fn mode(&self) -> NameMode {
        self.mode
    }

    pub fn name_table(&self) -> Option<&Arc<NameTable>> {
        self.names.as_ref()
    }

    pub fn stats(&self) -> ReadStats {
        self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut ReadStats {
        &mut self.stats
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.pos)
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn set_position(&mut self, pos: usize) -> Result<()> {
        if pos > self.limit {
            return Err(Error::Truncated { offset: pos, need: 0, have: 0 });
        }
        self.pos = pos;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Run `f` with reads confined to the next `len` bytes. Returns the
    /// result together with the number of bytes `f` left unread; the
    /// position always ends at the end of the window.
    pub fn bounded<T>(
        &mut self,
        len: usize,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<(T, usize)> {
        self.ensure(len)?;
        let outer = self.limit;
        let end = self.pos + len;
        self.limit = end;
        let result = f(self);
        let leftover = end.saturating_sub(self.pos);
        self.limit = outer;
        self.pos = end;
        result.map(|value| (value, leftover))
    }

    fn ensure(&self, n: usize) -> Result<()> {
        if self.remaining() < n {
            return Err(Error::Truncated { offset: self.pos, need: n, have: self.remaining() });
        }
        Ok(())
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.ensure(n)?;
        self.pos += n;
        Ok(())
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.ensure(n)?;
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Bytes between the current position and the limit.
    pub fn read_remaining(&mut self) -> &'a [u8] {
        let slice = &self.data[self.pos..self.limit];
        self.pos = self.limit;
        slice
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        let v = self.data[self.pos];
        self.pos += 1;
        Ok(v)
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    /// Boolean stored as one byte.
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    /// Boolean stored as a 32-bit integer (object table flags).
    pub fn read_bool32(&mut self) -> Result<bool> {
        let offset = self.pos;
        match self.read_i32()? {
            0 => Ok(false),
            1 => Ok(true),
            v => Err(Error::corrupt(offset, format!("invalid boolean value {v}"))),
        }
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.read_bytes(2)?))
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(LittleEndian::read_i16(self.read_bytes(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.read_bytes(4)?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(LittleEndian::read_i32(self.read_bytes(4)?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(LittleEndian::read_u64(self.read_bytes(8)?))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(LittleEndian::read_i64(self.read_bytes(8)?))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(LittleEndian::read_f32(self.read_bytes(4)?))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(LittleEndian::read_f64(self.read_bytes(8)?))
    }

    pub fn read_guid(&mut self) -> Result<[u8; 16]> {
        let mut guid = [0u8; 16];
        guid.copy_from_slice(self.read_bytes(16)?);
        Ok(guid)
    }

    /// Read an `i32` element count and check that `count * min_element_size`
    /// bytes can still follow.
    pub fn read_count(&mut self, min_element_size: usize) -> Result<usize> {
        let offset = self.pos;
        let count = self.read_i32()?;
        if count < 0 {
            return Err(Error::corrupt(offset, format!("negative element count {count}")));
        }
        let count = count as usize;
        let needed = count.saturating_mul(min_element_size);
        if needed > self.remaining() {
            return Err(Error::corrupt(
                offset,
                format!("element count {count} exceeds remaining {} bytes", self.remaining()),
            ));
        }
        Ok(count)
    }

    /// Read a length-prefixed string: positive lengths are single-byte
    /// text, negative lengths UTF-16; both include a trailing NUL.
    pub fn read_string(&mut self) -> Result<String> {
        let offset = self.pos;
        let len = self.read_i32()?;
        if len == 0 {
            return Ok(String::new());
        }

        let (units, wide) = (len.unsigned_abs() as usize, len < 0);
        let byte_len = if wide { units.checked_mul(2) } else { Some(units) };
        let byte_len = match byte_len {
            Some(n) if n <= self.remaining() => n,
            _ => {
                return Err(Error::corrupt(
                    offset,
                    format!("string length {len} exceeds remaining {} bytes", self.remaining()),
                ))
            }
        };
        let bytes = self.read_bytes(byte_len)?;

        if wide {
            let code_units: Vec<u16> = bytes.chunks_exact(2).map(LittleEndian::read_u16).collect();
            if code_units.last() != Some(&0) {
                return Err(Error::corrupt(offset, "string is not NUL-terminated"));
            }
            String::from_utf16(&code_units[..code_units.len() - 1])
                .map_err(|_| Error::corrupt(offset, "invalid UTF-16 string"))
        } else {
            if bytes.last() != Some(&0) {
                return Err(Error::corrupt(offset, "string is not NUL-terminated"));
            }
            Ok(bytes[..bytes.len() - 1].iter().map(|&b| b as char).collect())
        }
    }

    /// Read a fixed-size character buffer, cut at the first NUL.
    pub fn read_fixed_string(&mut self, len: usize) -> Result<String> {
        let bytes = self.read_bytes(len)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(bytes[..end].iter().map(|&b| b as char).collect())
    }

    /// Read a Name token in the current name mode.
    pub fn read_name(&mut self) -> Result<Name> {
        let offset = self.pos;
        match self.mode {
            NameMode::Legacy => {
                let display = self.read_string()?;
                Ok(self.intern_display(&display))
            }
            NameMode::Table => {
                let index = self.read_i32()?;
                let instance = self.read_u32()?;
                let text = self.table_entry(offset, index.checked_sub(1))?;
                Ok(Name::from_shared(text, instance))
            }
            NameMode::Hibernation => {
                let index = self.read_i32()?;
                let _padding = self.read_i32()?;
                let display = self.table_entry(offset, Some(index))?;
                Ok(self.intern_display(&display))
            }
        }
    }

    fn intern_display(&mut self, display: &str) -> Name {
        if let Some(shared) = &self.shared {
            let (text, instance) = split_display(display);
            if let Some(name) = shared.get(text, instance) {
                return name;
            }
        }
        self.interner.intern_display(display)
    }

    fn table_entry(&self, offset: usize, index: Option<i32>) -> Result<Arc<str>> {
        let table = self
            .names
            .as_ref()
            .ok_or_else(|| Error::corrupt(offset, "name token without a name table"))?;
        index
            .filter(|&i| i >= 0)
            .and_then(|i| table.get(i as usize))
            .cloned()
            .ok_or_else(|| {
                Error::corrupt(offset, format!("name index out of range (table has {})", table.len()))
            })
    }
}
