//! World saves (`.ark`), versions 5 through 9
//!
//! Layout: header, data-file list, embedded data, data-file object map,
//! object table, name table (version 6+), property blocks, trailing bytes,
//! hibernation section (version 7+). Version 5 stores names as strings and
//! block offsets as absolute positions; later versions index a name table
//! and make block offsets relative to the property region.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, trace};

use super::hibernation::{EntryLayout, HibernationSection};
use super::{Planned, ReadOptions, SaveArchive};
use crate::codec::{string_size, ArchiveReader, ArchiveWriter, Name, NameMode, NameTable, ReadStats};
use crate::error::{Error, Partial, Result};
use crate::object::container::count_classes;
use crate::object::table::{
    output_name_table, read_blocks, read_table, table_size, write_blocks, write_table, BlockSource,
};
use crate::object::{BlockLayout, GameObject, GameObjectContainer};
use crate::property::json::{as_array, as_object, as_str, field, float_from_json, float_to_json, hex_decode, hex_encode, int};
use crate::property::PropertyRegistry;

pub const MIN_VERSION: i16 = 5;
pub const MAX_VERSION: i16 = 9;

const FORMAT: &str = "world save";

/// Binary payload embedded in the save, grouped in parts of blobs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddedData {
    pub path: String,
    /// Each blob is a whole number of 32-bit words.
    pub parts: Vec<Vec<Vec<u8>>>,
}

impl EmbeddedData {
    fn read(reader: &mut ArchiveReader) -> Result<Self> {
        let path = reader.read_string()?;
        let part_count = reader.read_count(4)?;
        let mut parts = Vec::with_capacity(part_count);
        for _ in 0..part_count {
            let blob_count = reader.read_count(4)?;
            let mut blobs = Vec::with_capacity(blob_count);
            for _ in 0..blob_count {
                let words = reader.read_count(4)?;
                blobs.push(reader.read_bytes(words * 4)?.to_vec());
            }
            parts.push(blobs);
        }
        Ok(Self { path, parts })
    }

    fn binary_size(&self) -> usize {
        let blobs: usize = self.parts.iter().map(|part| 4 + part.iter().map(|b| 4 + b.len()).sum::<usize>()).sum();
        string_size(&self.path) + 4 + blobs
    }

    fn write(&self, writer: &mut ArchiveWriter) -> Result<()> {
        writer.write_string(&self.path)?;
        writer.write_i32(self.parts.len() as i32)?;
        for part in &self.parts {
            writer.write_i32(part.len() as i32)?;
            for blob in part {
                if blob.len() % 4 != 0 {
                    return Err(Error::corrupt(writer.position(), format!("embedded blob of {} bytes is not word aligned", blob.len())));
                }
                writer.write_i32((blob.len() / 4) as i32)?;
                writer.write_bytes(blob)?;
            }
        }
        Ok(())
    }

    fn to_json(&self) -> Value {
        let parts: Vec<Vec<String>> =
            self.parts.iter().map(|part| part.iter().map(|blob| hex_encode(blob)).collect()).collect();
        json!({ "path": self.path, "parts": parts })
    }

    fn from_json(v: &Value) -> Result<Self> {
        let object = as_object(v)?;
        let mut parts = Vec::new();
        for part in as_array(field(object, "parts")?)? {
            let blobs = as_array(part)?.iter().map(|b| as_str(b).and_then(hex_decode)).collect::<Result<_>>()?;
            parts.push(blobs);
        }
        Ok(Self { path: as_str(field(object, "path")?)?.to_string(), parts })
    }
}

/// Object names of one data-file level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFileObjects {
    pub level: i32,
    pub names: Vec<String>,
}

impl DataFileObjects {
    fn read(reader: &mut ArchiveReader) -> Result<Self> {
        let level = reader.read_i32()?;
        let count = reader.read_count(4)?;
        let names = (0..count).map(|_| reader.read_string()).collect::<Result<_>>()?;
        Ok(Self { level, names })
    }

    fn binary_size(&self) -> usize {
        8 + self.names.iter().map(|n| string_size(n)).sum::<usize>()
    }

    fn write(&self, writer: &mut ArchiveWriter) -> Result<()> {
        writer.write_i32(self.level)?;
        writer.write_i32(self.names.len() as i32)?;
        for name in &self.names {
            writer.write_string(name)?;
        }
        Ok(())
    }
}

/// Hibernation block of a world: decoded, or kept verbatim when the read
/// skipped it.
#[derive(Debug, Clone, PartialEq)]
pub enum Hibernation {
    Loaded(HibernationSection),
    Unloaded(Vec<u8>),
}

#[derive(Debug, Clone)]
pub struct WorldSave {
    pub version: i16,
    pub game_time: f32,
    pub save_count: i32,
    pub data_files: Vec<String>,
    pub embedded_data: Vec<EmbeddedData>,
    pub data_file_objects: Vec<DataFileObjects>,
    /// Name table as read (version 6+); seeds the table written back.
    pub names: NameTable,
    pub objects: GameObjectContainer,
    /// Bytes between the last property block and the hibernation section.
    pub extra_data: Vec<u8>,
    pub hibernation: Option<Hibernation>,
    /// Bytes after the hibernation section.
    pub tail: Vec<u8>,
    merged: Option<GameObjectContainer>,
}

/// The merged view is derived and does not take part in comparisons.
impl PartialEq for WorldSave {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.game_time.to_bits() == other.game_time.to_bits()
            && self.save_count == other.save_count
            && self.data_files == other.data_files
            && self.embedded_data == other.embedded_data
            && self.data_file_objects == other.data_file_objects
            && self.names == other.names
            && self.objects == other.objects
            && self.extra_data == other.extra_data
            && self.hibernation == other.hibernation
            && self.tail == other.tail
    }
}

/// Emit-pass data for a world.
#[derive(Debug, Clone)]
pub struct WorldLayout {
    names: Option<Arc<NameTable>>,
    blocks: BlockLayout,
    hibernation: Vec<EntryLayout>,
    name_table_offset: usize,
    properties_offset: usize,
    hibernation_offset: usize,
}

#[derive(Debug, Default)]
struct PreludeOffsets {
    hibernation: i32,
    name_table: i32,
    properties: i32,
}

fn header_error(err: Error) -> Error {
    match err {
        Error::Truncated { .. } | Error::CorruptData { .. } => Error::header(err.to_string()),
        other => other,
    }
}

fn offset_i32(offset: usize) -> Result<i32> {
    i32::try_from(offset).map_err(|_| Error::Overflow { need: offset, have: i32::MAX as usize })
}

fn offset_usize(offset: i32, what: &str, len: usize) -> Result<usize> {
    usize::try_from(offset)
        .ok()
        .filter(|&o| o <= len)
        .ok_or_else(|| Error::header(format!("{what} offset {offset} outside file of {len} bytes")))
}

impl WorldSave {
    pub fn new(version: i16) -> Self {
        Self {
            version,
            game_time: 0.0,
            save_count: 0,
            data_files: Vec::new(),
            embedded_data: Vec::new(),
            data_file_objects: Vec::new(),
            names: NameTable::new(),
            objects: GameObjectContainer::new(),
            extra_data: Vec::new(),
            hibernation: None,
            tail: Vec::new(),
            merged: None,
        }
    }

    pub fn read(data: &[u8], options: &ReadOptions) -> Result<Self> {
        Ok(Self::read_with_stats(data, options)?.0)
    }

    pub fn read_with_stats(data: &[u8], options: &ReadOptions) -> Result<(Self, ReadStats)> {
        let mut reader = options.reader(data);
        let version = reader.read_i16().map_err(header_error)?;
        if !(MIN_VERSION..=MAX_VERSION).contains(&version) {
            return Err(Error::UnsupportedVersion { format: FORMAT, version: i64::from(version) });
        }
        let mut world = Self::new(version);

        let offsets = world.read_prelude(&mut reader).map_err(header_error)?;

        if version > 5 {
            let table_offset = offset_usize(offsets.name_table, "name table", data.len())?;
            let resume = reader.position();
            reader.set_position(table_offset)?;
            world.names = NameTable::read(&mut reader, false).map_err(header_error)?;
            reader.set_position(resume)?;
            reader.set_names(NameMode::Table, Some(Arc::new(world.names.clone())));
        }

        let blocks_base = if version > 5 { offset_usize(offsets.properties, "property block", data.len())? } else { 0 };
        let hibernation_start = if version > 6 && offsets.hibernation > 0 {
            Some(offset_usize(offsets.hibernation, "hibernation", data.len())?)
        } else {
            None
        };

        let entries = options.accept(read_table(&mut reader)?, "object table")?;
        let source = BlockSource {
            base: blocks_base,
            start: if version > 5 { blocks_base } else { reader.position() },
            end: hibernation_start.unwrap_or(data.len()),
            registry: options.property_registry(),
            filter: options.object_filter(),
        };
        let blocks = options.accept(read_blocks(&mut reader, entries, &source), "property blocks")?;
        world.objects = GameObjectContainer::from_objects(blocks.objects);
        world.extra_data = blocks.trailing;

        if let Some(start) = hibernation_start {
            reader.set_names(NameMode::Legacy, None);
            reader.set_position(start)?;
            if options.is_load_hibernation() {
                let section = match HibernationSection::read(&mut reader, version, options) {
                    Ok(partial) => options.accept(partial, "hibernation section").map(Some)?,
                    Err(err) => options.accept(Partial { value: None, damage: Some(err) }, "hibernation section")?,
                };
                if let Some(section) = section {
                    world.hibernation = Some(Hibernation::Loaded(section));
                    world.tail = reader.read_remaining().to_vec();
                }
            } else {
                world.hibernation = Some(Hibernation::Unloaded(reader.read_remaining().to_vec()));
            }
        }

        if options.is_build_tree() {
            world.objects.build_tree();
            if let Some(section) = world.hibernation_section_mut() {
                for entry in &mut section.entries {
                    entry.objects.build_tree();
                }
            }
        }
        if options.is_merge_hibernation() {
            let mut merged = world.merged_container()?;
            if options.is_build_tree() {
                merged.build_tree();
            }
            world.merged = Some(merged);
        }

        info!(
            version,
            objects = world.objects.len(),
            hibernated = world.hibernation_section().map_or(0, HibernationSection::object_count),
            "read world save"
        );
        Ok((world, reader.stats()))
    }

    /// Header fields and the lists before the object table.
    fn read_prelude(&mut self, reader: &mut ArchiveReader) -> Result<PreludeOffsets> {
        let mut offsets = PreludeOffsets::default();
        if self.version > 6 {
            offsets.hibernation = reader.read_i32()?;
            let reserved = reader.read_i32()?;
            if reserved != 0 {
                trace!(reserved, "non-zero reserved header field");
            }
        }
        if self.version > 5 {
            offsets.name_table = reader.read_i32()?;
            offsets.properties = reader.read_i32()?;
        }
        self.game_time = reader.read_f32()?;
        if self.version > 8 {
            self.save_count = reader.read_i32()?;
        }
        let count = reader.read_count(4)?;
        self.data_files = (0..count).map(|_| reader.read_string()).collect::<Result<_>>()?;
        let count = reader.read_count(4)?;
        self.embedded_data = (0..count).map(|_| EmbeddedData::read(reader)).collect::<Result<_>>()?;
        let count = reader.read_count(4)?;
        self.data_file_objects = (0..count).map(|_| DataFileObjects::read(reader)).collect::<Result<_>>()?;
        Ok(offsets)
    }

    pub fn hibernation_section(&self) -> Option<&HibernationSection> {
        match &self.hibernation {
            Some(Hibernation::Loaded(section)) => Some(section),
            _ => None,
        }
    }

    pub fn hibernation_section_mut(&mut self) -> Option<&mut HibernationSection> {
        match &mut self.hibernation {
            Some(Hibernation::Loaded(section)) => Some(section),
            _ => None,
        }
    }

    /// Main objects followed by every hibernation island, with island
    /// references renumbered to their merged positions.
    pub fn merged_container(&self) -> Result<GameObjectContainer> {
        let mut merged = self.objects.clone();
        let mut islands = 0;
        if let Some(section) = self.hibernation_section() {
            for entry in &section.entries {
                merged.merge_island(entry.objects.clone())?;
                islands += 1;
            }
        }
        debug!(islands, objects = merged.len(), "merged hibernation islands");
        Ok(merged)
    }

    /// The merged container when the read merged hibernation, otherwise
    /// the main objects.
    pub fn container(&self) -> &GameObjectContainer {
        self.merged.as_ref().unwrap_or(&self.objects)
    }

    pub fn is_merged(&self) -> bool {
        self.merged.is_some()
    }

    /// Every object of the save, hibernated ones included.
    pub fn all_objects(&self) -> impl Iterator<Item = &GameObject> + '_ {
        let islands = self.hibernation_section().into_iter().flat_map(|s| s.entries.iter()).flat_map(|e| e.objects.iter());
        self.objects.iter().chain(islands)
    }

    pub fn class_counts(&self) -> Vec<(Name, usize)> {
        count_classes(self.all_objects())
    }

    fn name_mode(&self) -> NameMode {
        if self.version > 5 {
            NameMode::Table
        } else {
            NameMode::Legacy
        }
    }

    fn header_size(&self) -> usize {
        let mut size = 2 + 4;
        if self.version > 6 {
            size += 8;
        }
        if self.version > 5 {
            size += 8;
        }
        if self.version > 8 {
            size += 4;
        }
        size + 4
            + self.data_files.iter().map(|f| string_size(f)).sum::<usize>()
            + 4
            + self.embedded_data.iter().map(EmbeddedData::binary_size).sum::<usize>()
            + 4
            + self.data_file_objects.iter().map(DataFileObjects::binary_size).sum::<usize>()
    }

    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        object.insert("version".into(), json!(self.version));
        object.insert("gameTime".into(), float_to_json(f64::from(self.game_time)));
        if self.version > 8 {
            object.insert("saveCount".into(), json!(self.save_count));
        }
        object.insert("dataFiles".into(), json!(self.data_files));
        object.insert("embeddedData".into(), Value::Array(self.embedded_data.iter().map(EmbeddedData::to_json).collect()));
        object.insert("dataFileObjects".into(), json!(self.data_file_objects));
        if self.version > 5 {
            object.insert("names".into(), json!(self.names.entries().collect::<Vec<_>>()));
        }
        object.insert("objects".into(), self.objects.to_json());
        if !self.extra_data.is_empty() {
            object.insert("extraData".into(), json!(hex_encode(&self.extra_data)));
        }
        match &self.hibernation {
            Some(Hibernation::Loaded(section)) => {
                object.insert("hibernation".into(), section.to_json());
            }
            Some(Hibernation::Unloaded(raw)) => {
                object.insert("hibernation".into(), json!({ "raw": hex_encode(raw) }));
            }
            None => {}
        }
        if !self.tail.is_empty() {
            object.insert("tail".into(), json!(hex_encode(&self.tail)));
        }
        Value::Object(object)
    }

    pub fn from_json(v: &Value, registry: &PropertyRegistry) -> Result<Self> {
        let object = as_object(v)?;
        let version: i16 = int(field(object, "version")?)?;
        if !(MIN_VERSION..=MAX_VERSION).contains(&version) {
            return Err(Error::UnsupportedVersion { format: FORMAT, version: i64::from(version) });
        }
        let mut world = Self::new(version);
        world.game_time = float_from_json(field(object, "gameTime")?)? as f32;
        if let Some(count) = object.get("saveCount") {
            world.save_count = int(count)?;
        }
        world.data_files = serde_json::from_value(field(object, "dataFiles")?.clone())?;
        world.embedded_data =
            as_array(field(object, "embeddedData")?)?.iter().map(EmbeddedData::from_json).collect::<Result<_>>()?;
        world.data_file_objects = serde_json::from_value(field(object, "dataFileObjects")?.clone())?;
        if let Some(names) = object.get("names") {
            let names = as_array(names)?.iter().map(as_str).collect::<Result<Vec<_>>>()?;
            world.names = NameTable::from_entries(names);
        }
        world.objects = GameObjectContainer::from_json(field(object, "objects")?, registry)?;
        if let Some(extra) = object.get("extraData") {
            world.extra_data = hex_decode(as_str(extra)?)?;
        }
        world.hibernation = match object.get("hibernation") {
            None => None,
            Some(section) => match section.get("raw") {
                Some(raw) => Some(Hibernation::Unloaded(hex_decode(as_str(raw)?)?)),
                None => Some(Hibernation::Loaded(HibernationSection::from_json(section, registry)?)),
            },
        };
        if let Some(tail) = object.get("tail") {
            world.tail = hex_decode(as_str(tail)?)?;
        }
        Ok(world)
    }
}

impl SaveArchive for WorldSave {
    type Layout = WorldLayout;

    fn plan(&self) -> Result<Planned<WorldLayout>> {
        if self.hibernation.is_some() && self.version <= 6 {
            return Err(Error::UnsupportedVersion { format: "hibernation section", version: i64::from(self.version) });
        }
        let mode = self.name_mode();
        let objects = self.objects.objects();
        let names = (self.version > 5).then(|| Arc::new(output_name_table(&self.names, objects, mode)));

        let name_table_offset = self.header_size() + table_size(objects, &mode);
        let properties_offset = name_table_offset + names.as_ref().map_or(0, |n| n.binary_size(false));
        let first_block = if self.version > 5 { 0 } else { properties_offset };
        let blocks = BlockLayout::compute(objects, &mode, first_block)?;
        let hibernation_offset = properties_offset + blocks.size() + self.extra_data.len();

        let (hibernation, hibernation_size) = match &self.hibernation {
            Some(Hibernation::Loaded(section)) => {
                let layouts = section.layout()?;
                let size = section.binary_size(self.version, &layouts);
                (layouts, size)
            }
            Some(Hibernation::Unloaded(raw)) => (Vec::new(), raw.len()),
            None => (Vec::new(), 0),
        };

        let size = hibernation_offset + hibernation_size + self.tail.len();
        let layout = WorldLayout {
            names,
            blocks,
            hibernation,
            name_table_offset,
            properties_offset,
            hibernation_offset: if self.hibernation.is_some() { hibernation_offset } else { 0 },
        };
        Ok(Planned { size, layout })
    }

    fn write_planned(&self, plan: &Planned<WorldLayout>, writer: &mut ArchiveWriter) -> Result<()> {
        let layout = &plan.layout;
        let version = self.version;
        writer.write_i16(version)?;
        if version > 6 {
            writer.write_i32(offset_i32(layout.hibernation_offset)?)?;
            writer.write_i32(0)?;
        }
        if version > 5 {
            writer.write_i32(offset_i32(layout.name_table_offset)?)?;
            writer.write_i32(offset_i32(layout.properties_offset)?)?;
        }
        writer.write_f32(self.game_time)?;
        if version > 8 {
            writer.write_i32(self.save_count)?;
        }
        writer.write_i32(self.data_files.len() as i32)?;
        for file in &self.data_files {
            writer.write_string(file)?;
        }
        writer.write_i32(self.embedded_data.len() as i32)?;
        for data in &self.embedded_data {
            data.write(writer)?;
        }
        writer.write_i32(self.data_file_objects.len() as i32)?;
        for objects in &self.data_file_objects {
            objects.write(writer)?;
        }

        let objects = self.objects.objects();
        writer.replace_names(self.name_mode(), layout.names.clone());
        write_table(writer, objects, &layout.blocks)?;
        if let Some(names) = &layout.names {
            writer.expect_position(layout.name_table_offset)?;
            names.write(writer, false)?;
        }
        writer.expect_position(layout.properties_offset)?;
        let base = if version > 5 { layout.properties_offset } else { 0 };
        write_blocks(writer, objects, &layout.blocks, base)?;
        writer.write_bytes(&self.extra_data)?;
        writer.replace_names(NameMode::Legacy, None);

        match &self.hibernation {
            Some(Hibernation::Loaded(section)) => {
                writer.expect_position(layout.hibernation_offset)?;
                section.write(writer, version, &layout.hibernation)?;
            }
            Some(Hibernation::Unloaded(raw)) => {
                writer.expect_position(layout.hibernation_offset)?;
                writer.write_bytes(raw)?;
            }
            None => {}
        }
        writer.write_bytes(&self.tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::HibernationEntry;
    use crate::codec::CompositeName;
    use crate::property::{ObjectReference, Property, PropertyValue};

    fn foo_world(version: i16) -> WorldSave {
        let mut foo = GameObject::new(Name::new("Foo_C", 0), CompositeName::single(Name::new("Foo_C", 1)));
        foo.properties.push(Property::new("bFlag", PropertyValue::Bool(true)));
        foo.location = Some(crate::object::LocationData { x: 10.0, y: 20.0, z: 30.0, ..Default::default() });
        let component = GameObject::new(
            Name::new("FooComponent_C", 0),
            CompositeName::new(vec![Name::new("FooComponent_C", 0), Name::new("Foo_C", 1)]),
        );
        let mut world = WorldSave::new(version);
        world.game_time = 1234.5;
        world.save_count = 7;
        world.data_files = vec!["TheIsland".into()];
        world.embedded_data = vec![EmbeddedData { path: "Blob".into(), parts: vec![vec![vec![1, 2, 3, 4]]] }];
        world.data_file_objects = vec![DataFileObjects { level: 0, names: vec!["Foo_C".into()] }];
        world.objects = GameObjectContainer::from_objects(vec![foo, component]);
        world.extra_data = vec![0, 0, 0, 0];
        world
    }

    fn island(len: usize) -> HibernationEntry {
        let objects: Vec<GameObject> = (0..len)
            .map(|i| GameObject::new(Name::new("Dodo_C", 0), CompositeName::single(Name::new("Dodo_C", i as u32 + 1))))
            .collect();
        let mut entry = HibernationEntry { objects: GameObjectContainer::from_objects(objects), ..Default::default() };
        entry.objects[2].properties.push(Property::new("Target", PropertyValue::Object(ObjectReference::Id(0))));
        entry
    }

    #[test]
    fn test_world_roundtrip_every_version() {
        for version in MIN_VERSION..=MAX_VERSION {
            let world = foo_world(version);
            let bytes = world.to_bytes().unwrap();
            assert_eq!(bytes.len(), world.calculate_size().unwrap(), "version {version}");
            let back = WorldSave::read(&bytes, &ReadOptions::default()).unwrap();
            assert_eq!(back.objects, world.objects, "version {version}");
            assert_eq!(back.data_file_objects, world.data_file_objects);
            assert_eq!(back.embedded_data, world.embedded_data);
            assert_eq!(back.to_bytes().unwrap(), bytes, "version {version}");
        }
    }

    #[test]
    fn test_component_tree() {
        let bytes = foo_world(9).to_bytes().unwrap();
        let world = WorldSave::read(&bytes, &ReadOptions::default().build_tree(true)).unwrap();
        let foo = &world.objects[0];
        assert_eq!(foo.components().len(), 1);
        assert_eq!(foo.component("FooComponent_C"), Some(1));
        assert_eq!(foo.property_value::<bool>("bFlag", 0).unwrap(), Some(true));
    }

    #[test]
    fn test_unsupported_version() {
        let mut bytes = foo_world(9).to_bytes().unwrap();
        bytes[0] = 10;
        assert!(matches!(
            WorldSave::read(&bytes, &ReadOptions::default()),
            Err(Error::UnsupportedVersion { version: 10, .. })
        ));
        bytes[0] = 4;
        assert!(matches!(
            WorldSave::read(&bytes, &ReadOptions::default()),
            Err(Error::UnsupportedVersion { version: 4, .. })
        ));
    }

    #[test]
    fn test_hibernation_roundtrip_and_merge() {
        let mut world = foo_world(9);
        world.hibernation = Some(Hibernation::Loaded(HibernationSection {
            preserved: [0, 1, 0, 1],
            classes: vec!["Dodo_C".into()],
            indices: vec![0],
            entries: vec![island(3)],
        }));
        let bytes = world.to_bytes().unwrap();
        let back = WorldSave::read(&bytes, &ReadOptions::default()).unwrap();
        assert_eq!(back.to_bytes().unwrap(), bytes);
        assert_eq!(back.class_counts()[0], (Name::new("Dodo_C", 0), 3));

        let merged = WorldSave::read(&bytes, &ReadOptions::default().merge_hibernation(true)).unwrap();
        assert!(merged.is_merged());
        let container = merged.container();
        assert_eq!(container.len(), 5);
        let target = container[4].property_value::<ObjectReference>("Target", 0).unwrap().unwrap();
        assert_eq!(container.resolve_index(&target).unwrap(), Some(2));
        assert_eq!(merged, back);
    }

    #[test]
    fn test_unloaded_hibernation_is_preserved() {
        let mut world = foo_world(8);
        world.hibernation = Some(Hibernation::Loaded(HibernationSection { entries: vec![island(3)], ..Default::default() }));
        let bytes = world.to_bytes().unwrap();

        let skipped = WorldSave::read(&bytes, &ReadOptions::default().load_hibernation(false)).unwrap();
        assert!(matches!(skipped.hibernation, Some(Hibernation::Unloaded(_))));
        assert_eq!(skipped.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_truncated_world() {
        let bytes = foo_world(9).to_bytes().unwrap();
        let cut = &bytes[..bytes.len() - 6];
        assert!(WorldSave::read(cut, &ReadOptions::default()).is_err());
        let world = WorldSave::read(cut, &ReadOptions::default().allow_broken(true)).unwrap();
        assert_eq!(world.objects.len(), 2);
        assert!(world.objects[0].properties_loaded);
        assert!(!world.objects[1].properties_loaded);

        assert!(matches!(WorldSave::read(&bytes[..3], &ReadOptions::default()), Err(Error::CorruptHeader { .. })));
    }

    #[test]
    fn test_json_roundtrip() {
        let mut world = foo_world(9);
        world.hibernation = Some(Hibernation::Unloaded(vec![1, 2, 3]));
        let registry = PropertyRegistry::standard();
        let back = WorldSave::from_json(&world.to_json(), &registry).unwrap();
        assert_eq!(back, world);
    }
}
