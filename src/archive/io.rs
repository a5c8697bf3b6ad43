//! File input and output, heap-buffered or memory-mapped

use std::fs::{self, File, OpenOptions};
use std::ops::Deref;
use std::path::Path;

use memmap2::{Mmap, MmapMut};
use tracing::{debug, warn};

use super::{Planned, SaveArchive, WriteOptions};
use crate::codec::ArchiveWriter;
use crate::error::Result;

/// Bytes of one input file. A mapping is released when this is dropped.
pub enum Input {
    Mapped(Mmap),
    Heap(Vec<u8>),
}

impl Input {
    pub fn open(path: &Path, memory_map: bool) -> Result<Self> {
        if !memory_map {
            return Ok(Self::Heap(fs::read(path)?));
        }
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            // Zero-length mappings are rejected on some platforms.
            return Ok(Self::Heap(Vec::new()));
        }
        // SAFETY: the mapping is read-only and lives no longer than this
        // operation; the file must not be truncated while it is open.
        let map = unsafe { Mmap::map(&file)? };
        debug!(path = %path.display(), len = map.len(), "mapped input");
        Ok(Self::Mapped(map))
    }
}

impl Deref for Input {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Self::Mapped(map) => map,
            Self::Heap(bytes) => bytes,
        }
    }
}

/// Encode `archive` to `path`. With `memory_map` the file is sized to the
/// planned length up front and written in place; it is removed again if
/// the write fails.
pub fn write_archive<A: SaveArchive + ?Sized>(archive: &A, path: &Path, options: WriteOptions) -> Result<usize> {
    let plan = archive.plan()?;
    if !options.memory_map || plan.size == 0 {
        let mut buf = vec![0u8; plan.size];
        let mut writer = ArchiveWriter::new(&mut buf);
        archive.write_planned(&plan, &mut writer)?;
        let written = writer.finish()?;
        fs::write(path, &buf)?;
        return Ok(written);
    }

    let file = OpenOptions::new().read(true).write(true).create(true).truncate(true).open(path)?;
    match write_mapped(archive, &plan, file) {
        Ok(written) => {
            debug!(path = %path.display(), len = written, "wrote mapped output");
            Ok(written)
        }
        Err(err) => {
            if let Err(cleanup) = fs::remove_file(path) {
                warn!(path = %path.display(), error = %cleanup, "could not remove partial output");
            }
            Err(err)
        }
    }
}

/// The mapping and the file are closed when this returns.
fn write_mapped<A: SaveArchive + ?Sized>(archive: &A, plan: &Planned<A::Layout>, file: File) -> Result<usize> {
    file.set_len(plan.size as u64)?;
    // SAFETY: the file was just created for this write and is exclusively
    // owned until the mapping is flushed and dropped below.
    let mut map = unsafe { MmapMut::map_mut(&file)? };
    let mut writer = ArchiveWriter::new(&mut map);
    archive.write_planned(plan, &mut writer)?;
    let written = writer.finish()?;
    map.flush()?;
    Ok(written)
}
