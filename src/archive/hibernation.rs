//! Hibernation islands stored inside world saves
//!
//! Each entry is a miniature archive: its own versioned name table (display
//! forms, hibernation name mode) and an object table whose block offsets
//! and object references are local to the entry.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::debug;

use super::ReadOptions;
use crate::codec::{string_size, ArchiveReader, ArchiveWriter, NameMode, NameTable};
use crate::error::{Error, Partial, Result};
use crate::object::table::{
    output_name_table, read_blocks, read_table, table_size, write_blocks, write_table, BlockSource,
};
use crate::object::{BlockLayout, GameObjectContainer};
use crate::property::json::{
    as_array, as_object, as_str, field, float_from_json, float_to_json, hex_decode, hex_encode, int, uint,
};
use crate::property::PropertyRegistry;

/// One island of hibernated objects.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HibernationEntry {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub unknown_byte: u8,
    pub unknown_float: f32,
    /// Name table as read; seeds the table written back.
    pub names: NameTable,
    pub objects: GameObjectContainer,
    /// Bytes after the last property block of the island.
    pub extra_data: Vec<u8>,
    pub zone_volumes: Vec<i32>,
    pub unknown_int: i32,
    pub class_index: i32,
}

/// Emit-pass data for one entry.
#[derive(Debug, Clone)]
pub struct EntryLayout {
    names: Arc<NameTable>,
    blocks: BlockLayout,
    archive_size: usize,
}

impl HibernationEntry {
    pub fn read(reader: &mut ArchiveReader, options: &ReadOptions) -> Result<Self> {
        let mut entry = Self {
            x: reader.read_f32()?,
            y: reader.read_f32()?,
            z: reader.read_f32()?,
            unknown_byte: reader.read_u8()?,
            unknown_float: reader.read_f32()?,
            ..Self::default()
        };

        let names_offset = reader.position();
        let names_size = reader.read_count(1)?;
        let (names, leftover) = reader.bounded(names_size, |r| NameTable::read(r, true))?;
        if leftover != 0 {
            return Err(Error::corrupt(names_offset, format!("{leftover} unread bytes after island name table")));
        }

        let archive_size = reader.read_count(1)?;
        let start = reader.position();
        let table = Arc::new(names);
        let previous = (reader.mode(), reader.name_table().cloned());
        reader.set_names(NameMode::Hibernation, Some(table.clone()));
        let read = reader.bounded(archive_size, |r| {
            let entries = read_table(r)?.into_result()?;
            let source = BlockSource {
                base: start,
                start: r.position(),
                end: start + archive_size,
                registry: options.property_registry(),
                filter: options.object_filter(),
            };
            read_blocks(r, entries, &source).into_result()
        });
        reader.set_names(previous.0, previous.1);
        let (blocks, _) = read?;

        entry.names = Arc::unwrap_or_clone(table);
        entry.objects = GameObjectContainer::from_objects(blocks.objects);
        entry.extra_data = blocks.trailing;

        let count = reader.read_count(4)?;
        entry.zone_volumes = (0..count).map(|_| reader.read_i32()).collect::<Result<_>>()?;
        entry.unknown_int = reader.read_i32()?;
        entry.class_index = reader.read_i32()?;
        Ok(entry)
    }

    /// Size pass for this entry.
    pub fn layout(&self) -> Result<EntryLayout> {
        let mode = NameMode::Hibernation;
        let objects = self.objects.objects();
        let names = output_name_table(&self.names, objects, mode);
        let table = table_size(objects, &mode);
        let blocks = BlockLayout::compute(objects, &mode, table)?;
        let archive_size = table + blocks.size() + self.extra_data.len();
        Ok(EntryLayout { names: Arc::new(names), blocks, archive_size })
    }

    pub fn binary_size(&self, layout: &EntryLayout) -> usize {
        4 * 3 + 1 + 4 + 4 + layout.names.binary_size(true) + 4 + layout.archive_size + 4 + 4 * self.zone_volumes.len() + 4 + 4
    }

    pub fn write(&self, writer: &mut ArchiveWriter, layout: &EntryLayout) -> Result<()> {
        writer.write_f32(self.x)?;
        writer.write_f32(self.y)?;
        writer.write_f32(self.z)?;
        writer.write_u8(self.unknown_byte)?;
        writer.write_f32(self.unknown_float)?;
        writer.write_i32(layout.names.binary_size(true) as i32)?;
        layout.names.write(writer, true)?;

        writer.write_i32(layout.archive_size as i32)?;
        let start = writer.position();
        let previous = writer.replace_names(NameMode::Hibernation, Some(layout.names.clone()));
        let objects = self.objects.objects();
        let written = write_table(writer, objects, &layout.blocks)
            .and_then(|()| write_blocks(writer, objects, &layout.blocks, start))
            .and_then(|()| writer.write_bytes(&self.extra_data));
        writer.replace_names(previous.0, previous.1);
        written?;
        writer.expect_position(start + layout.archive_size)?;

        writer.write_i32(self.zone_volumes.len() as i32)?;
        for volume in &self.zone_volumes {
            writer.write_i32(*volume)?;
        }
        writer.write_i32(self.unknown_int)?;
        writer.write_i32(self.class_index)
    }

    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        object.insert("x".into(), float_to_json(f64::from(self.x)));
        object.insert("y".into(), float_to_json(f64::from(self.y)));
        object.insert("z".into(), float_to_json(f64::from(self.z)));
        object.insert("unknownByte".into(), json!(self.unknown_byte));
        object.insert("unknownFloat".into(), float_to_json(f64::from(self.unknown_float)));
        object.insert("names".into(), json!(self.names.entries().collect::<Vec<_>>()));
        object.insert("objects".into(), self.objects.to_json());
        if !self.extra_data.is_empty() {
            object.insert("extraData".into(), json!(hex_encode(&self.extra_data)));
        }
        object.insert("zoneVolumes".into(), json!(self.zone_volumes));
        object.insert("unknownInt".into(), json!(self.unknown_int));
        object.insert("classIndex".into(), json!(self.class_index));
        Value::Object(object)
    }

    pub fn from_json(v: &Value, registry: &PropertyRegistry) -> Result<Self> {
        let object = as_object(v)?;
        let float = |key: &str| -> Result<f32> { Ok(float_from_json(field(object, key)?)? as f32) };
        let names = as_array(field(object, "names")?)?.iter().map(as_str).collect::<Result<Vec<_>>>()?;
        Ok(Self {
            x: float("x")?,
            y: float("y")?,
            z: float("z")?,
            unknown_byte: uint(field(object, "unknownByte")?)?,
            unknown_float: float("unknownFloat")?,
            names: NameTable::from_entries(names),
            objects: GameObjectContainer::from_json(field(object, "objects")?, registry)?,
            extra_data: match object.get("extraData") {
                Some(extra) => hex_decode(as_str(extra)?)?,
                None => Vec::new(),
            },
            zone_volumes: as_array(field(object, "zoneVolumes")?)?.iter().map(int).collect::<Result<_>>()?,
            unknown_int: int(field(object, "unknownInt")?)?,
            class_index: int(field(object, "classIndex")?)?,
        })
    }
}

/// Hibernation block of a world save.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HibernationSection {
    /// Leading values of version 8+ saves, kept verbatim.
    pub preserved: [i32; 4],
    pub classes: Vec<String>,
    pub indices: Vec<i32>,
    pub entries: Vec<HibernationEntry>,
}

impl HibernationSection {
    /// Read the section. Damage inside an entry keeps the entries before it.
    pub fn read(reader: &mut ArchiveReader, version: i16, options: &ReadOptions) -> Result<Partial<Self>> {
        let mut section = Self::default();
        if version > 7 {
            for value in &mut section.preserved {
                *value = reader.read_i32()?;
            }
        }
        let count = reader.read_count(4)?;
        section.classes = (0..count).map(|_| reader.read_string()).collect::<Result<_>>()?;
        let count = reader.read_count(4)?;
        section.indices = (0..count).map(|_| reader.read_i32()).collect::<Result<_>>()?;

        let count = reader.read_count(4)?;
        for _ in 0..count {
            match HibernationEntry::read(reader, options) {
                Ok(entry) => section.entries.push(entry),
                Err(err) => return Ok(Partial { value: section, damage: Some(err) }),
            }
        }
        debug!(
            entries = section.entries.len(),
            objects = section.object_count(),
            "read hibernation section"
        );
        Ok(Partial::complete(section))
    }

    pub fn object_count(&self) -> usize {
        self.entries.iter().map(|e| e.objects.len()).sum()
    }

    pub fn layout(&self) -> Result<Vec<EntryLayout>> {
        self.entries.iter().map(HibernationEntry::layout).collect()
    }

    pub fn binary_size(&self, version: i16, layouts: &[EntryLayout]) -> usize {
        let preserved = if version > 7 { 16 } else { 0 };
        preserved
            + 4
            + self.classes.iter().map(|c| string_size(c)).sum::<usize>()
            + 4
            + 4 * self.indices.len()
            + 4
            + self.entries.iter().zip(layouts).map(|(e, l)| e.binary_size(l)).sum::<usize>()
    }

    pub fn write(&self, writer: &mut ArchiveWriter, version: i16, layouts: &[EntryLayout]) -> Result<()> {
        if version > 7 {
            for value in self.preserved {
                writer.write_i32(value)?;
            }
        }
        writer.write_i32(self.classes.len() as i32)?;
        for class in &self.classes {
            writer.write_string(class)?;
        }
        writer.write_i32(self.indices.len() as i32)?;
        for index in &self.indices {
            writer.write_i32(*index)?;
        }
        writer.write_i32(self.entries.len() as i32)?;
        for (entry, layout) in self.entries.iter().zip(layouts) {
            entry.write(writer, layout)?;
        }
        Ok(())
    }

    pub fn to_json(&self) -> Value {
        json!({
            "preserved": self.preserved,
            "classes": self.classes,
            "indices": self.indices,
            "entries": self.entries.iter().map(HibernationEntry::to_json).collect::<Vec<_>>(),
        })
    }

    pub fn from_json(v: &Value, registry: &PropertyRegistry) -> Result<Self> {
        let object = as_object(v)?;
        let preserved: Vec<i32> = as_array(field(object, "preserved")?)?.iter().map(int).collect::<Result<_>>()?;
        let preserved = <[i32; 4]>::try_from(preserved)
            .map_err(|values| Error::json(format!("expected 4 preserved values, found {}", values.len())))?;
        Ok(Self {
            preserved,
            classes: as_array(field(object, "classes")?)?
                .iter()
                .map(|c| as_str(c).map(str::to_string))
                .collect::<Result<_>>()?,
            indices: as_array(field(object, "indices")?)?.iter().map(int).collect::<Result<_>>()?,
            entries: as_array(field(object, "entries")?)?
                .iter()
                .map(|e| HibernationEntry::from_json(e, registry))
                .collect::<Result<_>>()?,
        })
    }
}
