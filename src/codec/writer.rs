use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};

use super::name::Name;
use super::name_table::{NameMode, NameTable};
use crate::error::{Error, Result};

/// Encoded size of a length-prefixed string.
pub fn string_size(s: &str) -> usize {
    if s.is_empty() {
        4 + 1
    } else if s.is_ascii() {
        4 + s.len() + 1
    } else {
        4 + 2 * (s.encode_utf16().count() + 1)
    }
}

/// Supplies the encoded size of Name tokens, which depends on the archive's
/// name mode. Size calculations take this as a parameter so one value model
/// serves every mode.
pub trait NameSizer {
    fn name_size(&self, name: &Name) -> usize;

    /// Size of a type-tag token (a name with instance 0).
    fn tag_size(&self, tag: &str) -> usize;
}

impl NameSizer for NameMode {
    fn name_size(&self, name: &Name) -> usize {
        match self {
            NameMode::Legacy => {
                if name.text().is_ascii() {
                    4 + name.display_len() + 1
                } else {
                    let suffix = name.display_len() - name.text().len();
                    4 + 2 * (name.text().encode_utf16().count() + suffix + 1)
                }
            }
            NameMode::Table | NameMode::Hibernation => 8,
        }
    }

    fn tag_size(&self, tag: &str) -> usize {
        match self {
            NameMode::Legacy => string_size(tag),
            NameMode::Table | NameMode::Hibernation => 8,
        }
    }
}

/// Writer over an exactly pre-sized output buffer (heap or memory-mapped).
///
/// Writing past the end is an [`Error::Overflow`]; [`finish`](Self::finish)
/// checks that the buffer was filled completely.
pub struct ArchiveWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
    mode: NameMode,
    names: Option<Arc<NameTable>>,
}

impl<'a> ArchiveWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0, mode: NameMode::Legacy, names: None }
    }

    pub fn with_names(buf: &'a mut [u8], mode: NameMode, names: Option<Arc<NameTable>>) -> Self {
        Self { buf, pos: 0, mode, names }
    }

    /// Switch name encoding, returning the previous settings.
    pub fn replace_names(
        &mut self,
        mode: NameMode,
        names: Option<Arc<NameTable>>,
    ) -> (NameMode, Option<Arc<NameTable>>) {
        let previous = (self.mode, self.names.take());
        self.mode = mode;
        self.names = names;
        previous
    }

    pub fn mode(&self) -> NameMode {
        self.mode
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Fail unless every byte of the buffer has been written.
    pub fn finish(self) -> Result<usize> {
        if self.pos != self.buf.len() {
            return Err(Error::SizeMismatch { expected: self.buf.len(), actual: self.pos });
        }
        Ok(self.pos)
    }

    /// Check that the writer is at `expected`, the offset the size pass
    /// computed for the next block.
    pub fn expect_position(&self, expected: usize) -> Result<()> {
        if self.pos != expected {
            return Err(Error::SizeMismatch { expected, actual: self.pos });
        }
        Ok(())
    }

    fn reserve(&mut self, n: usize) -> Result<&mut [u8]> {
        if self.remaining() < n {
            return Err(Error::Overflow { need: self.pos + n, have: self.buf.len() });
        }
        let start = self.pos;
        self.pos += n;
        Ok(&mut self.buf[start..start + n])
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.reserve(bytes.len())?.copy_from_slice(bytes);
        Ok(())
    }

    pub fn write_u8(&mut self, v: u8) -> Result<()> {
        self.reserve(1)?[0] = v;
        Ok(())
    }

    pub fn write_i8(&mut self, v: i8) -> Result<()> {
        self.write_u8(v as u8)
    }

    pub fn write_bool(&mut self, v: bool) -> Result<()> {
        self.write_u8(u8::from(v))
    }

    pub fn write_bool32(&mut self, v: bool) -> Result<()> {
        self.write_i32(i32::from(v))
    }

    pub fn write_u16(&mut self, v: u16) -> Result<()> {
        LittleEndian::write_u16(self.reserve(2)?, v);
        Ok(())
    }

    pub fn write_i16(&mut self, v: i16) -> Result<()> {
        LittleEndian::write_i16(self.reserve(2)?, v);
        Ok(())
    }

    pub fn write_u32(&mut self, v: u32) -> Result<()> {
        LittleEndian::write_u32(self.reserve(4)?, v);
        Ok(())
    }

    pub fn write_i32(&mut self, v: i32) -> Result<()> {
        LittleEndian::write_i32(self.reserve(4)?, v);
        Ok(())
    }

    pub fn write_u64(&mut self, v: u64) -> Result<()> {
        LittleEndian::write_u64(self.reserve(8)?, v);
        Ok(())
    }

    pub fn write_i64(&mut self, v: i64) -> Result<()> {
        LittleEndian::write_i64(self.reserve(8)?, v);
        Ok(())
    }

    pub fn write_f32(&mut self, v: f32) -> Result<()> {
        LittleEndian::write_f32(self.reserve(4)?, v);
        Ok(())
    }

    pub fn write_f64(&mut self, v: f64) -> Result<()> {
        LittleEndian::write_f64(self.reserve(8)?, v);
        Ok(())
    }

    pub fn write_guid(&mut self, guid: &[u8; 16]) -> Result<()> {
        self.write_bytes(guid)
    }

    /// Write a length-prefixed string; see [`string_size`].
    pub fn write_string(&mut self, s: &str) -> Result<()> {
        if s.is_ascii() {
            self.write_i32(s.len() as i32 + 1)?;
            self.write_bytes(s.as_bytes())?;
            self.write_u8(0)
        } else {
            let units: Vec<u16> = s.encode_utf16().collect();
            self.write_i32(-(units.len() as i32 + 1))?;
            for unit in units {
                self.write_u16(unit)?;
            }
            self.write_u16(0)
        }
    }

    /// Write a Name token in the current name mode.
    pub fn write_name(&mut self, name: &Name) -> Result<()> {
        match self.mode {
            NameMode::Legacy => self.write_string(&name.to_string()),
            NameMode::Table => {
                let index = self.table_position(name.text())?;
                self.write_i32(index as i32 + 1)?;
                self.write_u32(name.instance())
            }
            NameMode::Hibernation => {
                let index = if name.instance() == 0 {
                    self.table_position(name.text())?
                } else {
                    self.table_position(&name.to_string())?
                };
                self.write_i32(index as i32)?;
                self.write_i32(0)
            }
        }
    }

    /// Write a type-tag token (instance 0).
    pub fn write_tag(&mut self, tag: &str) -> Result<()> {
        match self.mode {
            NameMode::Legacy => self.write_string(tag),
            NameMode::Table => {
                let index = self.table_position(tag)?;
                self.write_i32(index as i32 + 1)?;
                self.write_u32(0)
            }
            NameMode::Hibernation => {
                let index = self.table_position(tag)?;
                self.write_i32(index as i32)?;
                self.write_i32(0)
            }
        }
    }

    fn table_position(&self, text: &str) -> Result<usize> {
        self.names
            .as_ref()
            .and_then(|table| table.position(text))
            .ok_or_else(|| Error::MissingName(text.to_string()))
    }
}
