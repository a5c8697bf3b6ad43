//! Archive name tables and name-encoding modes

use std::sync::Arc;

use ahash::AHashMap;

use super::name::Name;
use super::{ArchiveReader, ArchiveWriter};
use crate::error::{Error, Result};

/// Version prefix of hibernation name tables.
pub const HIBERNATION_TABLE_VERSION: i32 = 3;

/// How Name tokens are encoded in an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NameMode {
    /// Display form written as a length-prefixed string.
    #[default]
    Legacy,
    /// One-based table index of the text, then the instance number.
    Table,
    /// Zero-based index of the display form, then 4 bytes of padding.
    Hibernation,
}

impl NameMode {
    pub fn uses_table(self) -> bool {
        !matches!(self, Self::Legacy)
    }
}

/// Ordered string table. Entries keep file order (duplicates included) so
/// a table read from disk is written back unchanged.
#[derive(Debug, Clone, Default)]
pub struct NameTable {
    entries: Vec<Arc<str>>,
    lookup: AHashMap<Arc<str>, usize>,
}

impl NameTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut table = Self::new();
        for entry in entries {
            table.push(entry.as_ref());
        }
        table
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&Arc<str>> {
        self.entries.get(position)
    }

    /// Position of the first entry equal to `text`.
    pub fn position(&self, text: &str) -> Option<usize> {
        self.lookup.get(text).copied()
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| &**e)
    }

    /// Append unconditionally (file order, duplicates allowed).
    fn push(&mut self, text: &str) {
        let shared: Arc<str> = Arc::from(text);
        let position = self.entries.len();
        self.lookup.entry(shared.clone()).or_insert(position);
        self.entries.push(shared);
    }

    /// Position of `text`, appending it when missing.
    pub fn insert(&mut self, text: &str) -> usize {
        if let Some(position) = self.position(text) {
            return position;
        }
        self.push(text);
        self.entries.len() - 1
    }

    /// Register a name the way `mode` will look it up when writing.
    pub fn register(&mut self, text: &str, instance: u32, mode: NameMode) {
        match mode {
            NameMode::Legacy => {}
            NameMode::Table => {
                self.insert(text);
            }
            NameMode::Hibernation => {
                if instance == 0 {
                    self.insert(text);
                } else {
                    self.insert(&Name::new(text, instance).to_string());
                }
            }
        }
    }

    pub fn read(reader: &mut ArchiveReader, versioned: bool) -> Result<Self> {
        if versioned {
            let offset = reader.position();
            let version = reader.read_i32()?;
            if version != HIBERNATION_TABLE_VERSION {
                return Err(Error::corrupt(offset, format!("unexpected name table version {version}")));
            }
        }
        let count = reader.read_count(4)?;
        let mut table = Self::new();
        table.entries.reserve(count);
        for _ in 0..count {
            let text = reader.read_string()?;
            table.push(&text);
        }
        Ok(table)
    }

    pub fn binary_size(&self, versioned: bool) -> usize {
        let header = if versioned { 8 } else { 4 };
        header + self.entries.iter().map(|e| super::string_size(e)).sum::<usize>()
    }

    pub fn write(&self, writer: &mut ArchiveWriter, versioned: bool) -> Result<()> {
        if versioned {
            writer.write_i32(HIBERNATION_TABLE_VERSION)?;
        }
        writer.write_i32(self.entries.len() as i32)?;
        for entry in &self.entries {
            writer.write_string(entry)?;
        }
        Ok(())
    }
}

impl PartialEq for NameTable {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}
