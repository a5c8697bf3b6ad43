//! Profile (`.arkprofile`) and tribe (`.arktribe`) files
//!
//! Both are a version integer followed by an object table with legacy
//! names and property blocks at absolute offsets.

use serde_json::{json, Map, Value};
use tracing::debug;

use super::{Planned, ReadOptions, SaveArchive};
use crate::codec::{ArchiveWriter, NameMode, ReadStats};
use crate::error::{Error, Result};
use crate::object::table::{read_blocks, read_table, table_size, write_blocks, write_table, BlockSource};
use crate::object::{BlockLayout, GameObjectContainer};
use crate::property::json::{as_object, as_str, field, hex_decode, hex_encode, int};
use crate::property::PropertyRegistry;

pub const OBJECT_FILE_VERSION: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectFileKind {
    Profile,
    Tribe,
}

impl ObjectFileKind {
    fn label(self) -> &'static str {
        match self {
            Self::Profile => "profile",
            Self::Tribe => "tribe",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectFile {
    pub kind: ObjectFileKind,
    pub version: i32,
    pub objects: GameObjectContainer,
    /// Bytes after the last property block.
    pub extra_data: Vec<u8>,
}

impl ObjectFile {
    pub fn new(kind: ObjectFileKind, objects: GameObjectContainer) -> Self {
        Self { kind, version: OBJECT_FILE_VERSION, objects, extra_data: Vec::new() }
    }

    pub fn read(data: &[u8], kind: ObjectFileKind, options: &ReadOptions) -> Result<Self> {
        Ok(Self::read_with_stats(data, kind, options)?.0)
    }

    pub fn read_with_stats(data: &[u8], kind: ObjectFileKind, options: &ReadOptions) -> Result<(Self, ReadStats)> {
        let mut reader = options.reader(data);
        let version = reader
            .read_i32()
            .map_err(|err| Error::header(format!("{} version: {err}", kind.label())))?;
        if version != OBJECT_FILE_VERSION {
            return Err(Error::UnsupportedVersion { format: kind.label(), version: i64::from(version) });
        }

        let entries = options.accept(read_table(&mut reader)?, "object table")?;
        let source = BlockSource {
            base: 0,
            start: reader.position(),
            end: data.len(),
            registry: options.property_registry(),
            filter: options.object_filter(),
        };
        let blocks = options.accept(read_blocks(&mut reader, entries, &source), "property blocks")?;

        let mut objects = GameObjectContainer::from_objects(blocks.objects);
        if options.is_build_tree() {
            objects.build_tree();
        }
        debug!(kind = kind.label(), objects = objects.len(), "read object file");
        let file = Self { kind, version, objects, extra_data: blocks.trailing };
        Ok((file, reader.stats()))
    }

    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        object.insert("version".into(), json!(self.version));
        object.insert("objects".into(), self.objects.to_json());
        if !self.extra_data.is_empty() {
            object.insert("extraData".into(), json!(hex_encode(&self.extra_data)));
        }
        Value::Object(object)
    }

    pub fn from_json(v: &Value, kind: ObjectFileKind, registry: &PropertyRegistry) -> Result<Self> {
        let object = as_object(v)?;
        let version: i32 = int(field(object, "version")?)?;
        if version != OBJECT_FILE_VERSION {
            return Err(Error::UnsupportedVersion { format: kind.label(), version: i64::from(version) });
        }
        let mut file = Self::new(kind, GameObjectContainer::from_json(field(object, "objects")?, registry)?);
        if let Some(extra) = object.get("extraData") {
            file.extra_data = hex_decode(as_str(extra)?)?;
        }
        Ok(file)
    }
}

impl SaveArchive for ObjectFile {
    type Layout = BlockLayout;

    fn plan(&self) -> Result<Planned<BlockLayout>> {
        let mode = NameMode::Legacy;
        let objects = self.objects.objects();
        let blocks_start = 4 + table_size(objects, &mode);
        let layout = BlockLayout::compute(objects, &mode, blocks_start)?;
        let size = blocks_start + layout.size() + self.extra_data.len();
        Ok(Planned { size, layout })
    }

    fn write_planned(&self, plan: &Planned<BlockLayout>, writer: &mut ArchiveWriter) -> Result<()> {
        let objects = self.objects.objects();
        writer.write_i32(self.version)?;
        write_table(writer, objects, &plan.layout)?;
        write_blocks(writer, objects, &plan.layout, 0)?;
        writer.write_bytes(&self.extra_data)
    }
}
