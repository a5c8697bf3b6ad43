//! Object tables and property blocks
//!
//! A table is an `i32` count followed by fixed-shape entries, each carrying
//! the offset of the object's property block. Reading is two passes (all
//! entries, then every block at its offset); writing computes a
//! [`BlockLayout`] in the size pass and threads it into the emit pass.

use tracing::trace;

use super::{GameObject, LocationData};
use crate::codec::{ArchiveReader, ArchiveWriter, CompositeName, NameMode, NameSizer, NameTable};
use crate::error::{Error, Partial, Result};
use crate::property::{PropertyList, PropertyRegistry};

/// Object-table entry before its property block has been read.
#[derive(Debug, Clone)]
pub struct TableEntry {
    pub object: GameObject,
    pub properties_offset: i32,
}

pub fn read_entry(reader: &mut ArchiveReader) -> Result<TableEntry> {
    let guid = reader.read_guid()?;
    let class_name = reader.read_name()?;
    let mut object = GameObject::new(class_name, CompositeName::default());
    object.guid = guid;
    object.is_item = reader.read_bool32()?;

    let count = reader.read_count(4)?;
    let mut names = Vec::with_capacity(count);
    for _ in 0..count {
        names.push(reader.read_name()?);
    }
    object.names = CompositeName::new(names);

    object.from_data_file = reader.read_bool32()?;
    object.data_file_index = reader.read_i32()?;
    if reader.read_bool32()? {
        object.location = Some(LocationData {
            x: reader.read_f32()?,
            y: reader.read_f32()?,
            z: reader.read_f32()?,
            pitch: reader.read_f32()?,
            yaw: reader.read_f32()?,
            roll: reader.read_f32()?,
        });
    }
    let properties_offset = reader.read_i32()?;
    let reserved = reader.read_i32()?;
    if reserved != 0 {
        trace!(object = %object.names, reserved, "non-zero reserved table field");
    }
    Ok(TableEntry { object, properties_offset })
}

/// Read a table. A count that cannot fit is fatal; damage inside an entry
/// ends the read with the entries before it.
pub fn read_table(reader: &mut ArchiveReader) -> Result<Partial<Vec<TableEntry>>> {
    let count = reader.read_count(16)?;
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        match read_entry(reader) {
            Ok(entry) => entries.push(entry),
            Err(err) => return Ok(Partial { value: entries, damage: Some(err) }),
        }
    }
    Ok(Partial::complete(entries))
}

/// Where property blocks live and how they are decoded.
pub struct BlockSource<'r> {
    /// Absolute position that block offsets are relative to.
    pub base: usize,
    /// Absolute position of the block region; an archive without blocks
    /// has its trailing data here.
    pub start: usize,
    /// End of the block region; bytes after the furthest list up to here
    /// are the archive's trailing data.
    pub end: usize,
    pub registry: &'r PropertyRegistry,
    pub filter: Option<&'r (dyn Fn(&GameObject) -> bool + Send + Sync)>,
}

/// Objects with decoded properties, plus the archive's trailing bytes.
#[derive(Debug, Default)]
pub struct Blocks {
    pub objects: Vec<GameObject>,
    pub trailing: Vec<u8>,
}

/// Second pass: decode each entry's property block. On damage the
/// remaining objects keep their slots with `properties_loaded == false`
/// and the trailing data is not read.
///
/// Bytes between a list's end and the next block by position are that
/// object's extra data, so blocks may appear in any order.
pub fn read_blocks(reader: &mut ArchiveReader, entries: Vec<TableEntry>, source: &BlockSource) -> Partial<Blocks> {
    let starts: Vec<Option<usize>> = entries
        .iter()
        .map(|e| usize::try_from(e.properties_offset).ok().map(|offset| source.base + offset))
        .collect();
    let mut sorted: Vec<usize> = starts.iter().flatten().copied().collect();
    sorted.sort_unstable();
    sorted.dedup();

    let mut blocks = Blocks { objects: Vec::with_capacity(entries.len()), trailing: Vec::new() };
    let mut list_end = None;
    let mut damage = None;

    for (i, entry) in entries.into_iter().enumerate() {
        let mut object = entry.object;
        if damage.is_some() || source.filter.is_some_and(|keep| !keep(&object)) {
            object.properties_loaded = false;
            blocks.objects.push(object);
            continue;
        }

        let next = starts[i].and_then(|start| sorted.get(sorted.partition_point(|&s| s <= start)).copied());
        match read_block(reader, &mut object, starts[i], next, source) {
            Ok(end) => list_end = list_end.max(Some(end)),
            Err(err) => {
                object.properties_loaded = false;
                damage = Some(err);
            }
        }
        blocks.objects.push(object);
    }
    if damage.is_some() {
        return Partial { value: blocks, damage };
    }

    // The furthest block may have been filtered out; find where it ends.
    let furthest = sorted.last().copied();
    let trailing_start = match furthest {
        None => Some(source.start),
        Some(start) if list_end.is_some_and(|end| end > start) => list_end,
        Some(start) => skip_block(reader, start, source).map(|end| end.max(list_end.unwrap_or(0))),
    };
    match trailing_start.filter(|&from| from <= source.end) {
        Some(from) => match reader.set_position(from).and_then(|()| reader.read_bytes(source.end - from)) {
            Ok(bytes) => blocks.trailing = bytes.to_vec(),
            Err(err) => damage = Some(err),
        },
        None => trace!(end = source.end, "no trailing data after property blocks"),
    }
    Partial { value: blocks, damage }
}

/// Decode one block; returns the position where its list ends.
fn read_block(
    reader: &mut ArchiveReader,
    object: &mut GameObject,
    start: Option<usize>,
    next: Option<usize>,
    source: &BlockSource,
) -> Result<usize> {
    let start = start.ok_or_else(|| Error::corrupt(reader.position(), format!("negative property offset for {}", object.names)))?;
    if start > source.end {
        return Err(Error::corrupt(start, format!("property block of {} outside the archive", object.names)));
    }
    reader.set_position(start)?;
    object.properties = PropertyList::read(reader, source.registry)?;
    let list_end = reader.position();

    if let Some(next) = next.filter(|&next| next > list_end && next <= source.end) {
        object.extra_data = reader.read_bytes(next - list_end)?.to_vec();
    }
    Ok(list_end)
}

/// End of a block that was not decoded. Its contents are discarded and
/// leave no trace in the reader's counters.
fn skip_block(reader: &mut ArchiveReader, start: usize, source: &BlockSource) -> Option<usize> {
    let stats = reader.stats();
    let end = reader
        .set_position(start)
        .and_then(|()| PropertyList::read(reader, source.registry))
        .map(|_| reader.position());
    *reader.stats_mut() = stats;
    end.ok()
}

/// Encoded size of one table entry.
pub fn entry_size(object: &GameObject, names: &dyn NameSizer) -> usize {
    let location = if object.location.is_some() { 24 } else { 0 };
    16 + names.name_size(&object.class_name)
        + 4
        + 4
        + object.names.iter().map(|n| names.name_size(n)).sum::<usize>()
        + 4
        + 4
        + 4
        + location
        + 8
}

pub fn table_size(objects: &[GameObject], names: &dyn NameSizer) -> usize {
    4 + objects.iter().map(|o| entry_size(o, names)).sum::<usize>()
}

pub fn write_entry(writer: &mut ArchiveWriter, object: &GameObject, properties_offset: usize) -> Result<()> {
    let offset = i32::try_from(properties_offset)
        .map_err(|_| Error::Overflow { need: properties_offset, have: i32::MAX as usize })?;
    writer.write_guid(&object.guid)?;
    writer.write_name(&object.class_name)?;
    writer.write_bool32(object.is_item)?;
    writer.write_i32(object.names.len() as i32)?;
    for name in object.names.iter() {
        writer.write_name(name)?;
    }
    writer.write_bool32(object.from_data_file)?;
    writer.write_i32(object.data_file_index)?;
    writer.write_bool32(object.location.is_some())?;
    if let Some(l) = &object.location {
        for v in [l.x, l.y, l.z, l.pitch, l.yaw, l.roll] {
            writer.write_f32(v)?;
        }
    }
    writer.write_i32(offset)?;
    writer.write_i32(0)
}

/// Output name table: the `seed` entries in their original order, then
/// every name the objects use that the seed lacks.
pub fn output_name_table(seed: &NameTable, objects: &[GameObject], mode: NameMode) -> NameTable {
    let mut table = seed.clone();
    for object in objects {
        object.visit_names(&mut |text, instance| table.register(text, instance, mode));
    }
    table
}

/// Property-block offsets computed in the size pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockLayout {
    offsets: Vec<usize>,
    size: usize,
}

impl BlockLayout {
    /// Lay blocks out back to back in object order, the first one at
    /// offset `first`. Fails for objects whose properties were not loaded.
    pub fn compute(objects: &[GameObject], names: &dyn NameSizer, first: usize) -> Result<Self> {
        let mut offsets = Vec::with_capacity(objects.len());
        let mut offset = first;
        for (index, object) in objects.iter().enumerate() {
            if !object.properties_loaded {
                return Err(Error::IncompleteObject { index });
            }
            offsets.push(offset);
            offset += object.properties.binary_size(names) + object.extra_data.len();
        }
        Ok(Self { offsets, size: offset - first })
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// Total size of all blocks.
    pub fn size(&self) -> usize {
        self.size
    }
}

pub fn write_table(writer: &mut ArchiveWriter, objects: &[GameObject], layout: &BlockLayout) -> Result<()> {
    writer.write_i32(objects.len() as i32)?;
    for (object, &offset) in objects.iter().zip(layout.offsets()) {
        write_entry(writer, object, offset)?;
    }
    Ok(())
}

/// Emit every block at the position the layout assigned it; `base` is the
/// absolute position offsets are relative to.
pub fn write_blocks(
    writer: &mut ArchiveWriter,
    objects: &[GameObject],
    layout: &BlockLayout,
    base: usize,
) -> Result<()> {
    for (object, &offset) in objects.iter().zip(layout.offsets()) {
        writer.expect_position(base + offset)?;
        object.properties.write(writer)?;
        writer.write_bytes(&object.extra_data)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Name;
    use crate::property::{Property, PropertyValue};

    fn objects() -> Vec<GameObject> {
        let mut first = GameObject::new(Name::new("Foo_C", 0), CompositeName::single(Name::new("Foo_C", 1)));
        first.guid = [7; 16];
        first.location = Some(LocationData { x: 1.0, y: 2.0, z: 3.0, pitch: 0.0, yaw: 90.0, roll: 0.0 });
        first.properties.push(Property::new("bFlag", PropertyValue::Bool(true)));
        first.extra_data = vec![0, 0, 0, 0];

        let mut second = GameObject::new(
            Name::new("FooComponent_C", 0),
            CompositeName::new(vec![Name::new("FooComponent_C", 0), Name::new("Foo_C", 1)]),
        );
        second.from_data_file = true;
        second.data_file_index = 2;
        second.properties.push(Property::new("Level", PropertyValue::Int(5)));
        vec![first, second]
    }

    fn encode(objects: &[GameObject], trailing: &[u8]) -> Vec<u8> {
        let mode = NameMode::Legacy;
        let table = table_size(objects, &mode);
        let layout = BlockLayout::compute(objects, &mode, table).unwrap();
        let mut buf = vec![0u8; table + layout.size() + trailing.len()];
        let mut writer = ArchiveWriter::new(&mut buf);
        write_table(&mut writer, objects, &layout).unwrap();
        write_blocks(&mut writer, objects, &layout, 0).unwrap();
        writer.write_bytes(trailing).unwrap();
        writer.finish().unwrap();
        buf
    }

    fn decode(bytes: &[u8], filter: Option<&(dyn Fn(&GameObject) -> bool + Send + Sync)>) -> Partial<Blocks> {
        let registry = PropertyRegistry::standard();
        let mut reader = ArchiveReader::new(bytes);
        let entries = read_table(&mut reader).unwrap().into_result().unwrap();
        let source = BlockSource { base: 0, start: reader.position(), end: bytes.len(), registry: &registry, filter };
        read_blocks(&mut reader, entries, &source)
    }

    #[test]
    fn test_table_roundtrip_with_extra_data() {
        let objects = objects();
        let bytes = encode(&objects, &[9, 9]);
        let blocks = decode(&bytes, None).into_result().unwrap();
        assert_eq!(blocks.objects, objects);
        assert_eq!(blocks.trailing, vec![9, 9]);
    }

    #[test]
    fn test_filtered_objects_keep_slots() {
        let bytes = encode(&objects(), &[]);
        let keep_items = |o: &GameObject| o.class_name.text() == "Foo_C";
        let blocks = decode(&bytes, Some(&keep_items)).into_result().unwrap();
        assert_eq!(blocks.objects.len(), 2);
        assert!(blocks.objects[0].properties_loaded);
        assert!(!blocks.objects[1].properties_loaded);
        assert!(blocks.objects[1].properties.is_empty());

        let mode = NameMode::Legacy;
        assert!(matches!(
            BlockLayout::compute(&blocks.objects, &mode, 0),
            Err(Error::IncompleteObject { index: 1 })
        ));
    }

    #[test]
    fn test_empty_table_keeps_trailing() {
        let bytes = encode(&[], &[1, 2, 3, 4]);
        assert_eq!(bytes.len(), 8);
        let blocks = decode(&bytes, None).into_result().unwrap();
        assert!(blocks.objects.is_empty());
        assert_eq!(blocks.trailing, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_filtered_last_block_keeps_trailing() {
        let bytes = encode(&objects(), &[9, 9]);
        let keep_first = |o: &GameObject| o.class_name.text() == "Foo_C";
        let registry = PropertyRegistry::standard();
        let mut reader = ArchiveReader::new(&bytes);
        let entries = read_table(&mut reader).unwrap().into_result().unwrap();
        let source = BlockSource {
            base: 0,
            start: reader.position(),
            end: bytes.len(),
            registry: &registry,
            filter: Some(&keep_first),
        };
        let blocks = read_blocks(&mut reader, entries, &source).into_result().unwrap();
        assert!(!blocks.objects[1].properties_loaded);
        assert_eq!(blocks.trailing, vec![9, 9]);
        assert_eq!(reader.stats().unreadable_properties, 0);
    }

    #[test]
    fn test_out_of_order_blocks_are_normalised() {
        let mut objects = objects();
        objects[0].extra_data.clear();
        objects[1].extra_data = vec![5, 5];
        let mode = NameMode::Legacy;
        let table = table_size(&objects, &mode);

        // Second object's block first in the file.
        let reversed: Vec<GameObject> = objects.iter().rev().cloned().collect();
        let by_position = BlockLayout::compute(&reversed, &mode, table).unwrap();
        let swapped = BlockLayout {
            offsets: vec![by_position.offsets()[1], by_position.offsets()[0]],
            size: by_position.size(),
        };
        let mut bytes = vec![0u8; table + swapped.size() + 1];
        let mut writer = ArchiveWriter::new(&mut bytes);
        write_table(&mut writer, &objects, &swapped).unwrap();
        write_blocks(&mut writer, &reversed, &by_position, 0).unwrap();
        writer.write_bytes(&[9]).unwrap();
        writer.finish().unwrap();

        let blocks = decode(&bytes, None).into_result().unwrap();
        assert_eq!(blocks.objects, objects);
        assert_eq!(blocks.trailing, vec![9]);
        assert_eq!(encode(&blocks.objects, &blocks.trailing).len(), bytes.len());
    }

    #[test]
    fn test_reserved_field_is_written_as_zero() {
        let objects = objects();
        let mut bytes = encode(&objects, &[]);
        let reserved = 4 + entry_size(&objects[0], &NameMode::Legacy) - 4;
        bytes[reserved..reserved + 4].copy_from_slice(&7i32.to_le_bytes());

        let blocks = decode(&bytes, None).into_result().unwrap();
        assert_eq!(blocks.objects, objects);
        assert_eq!(encode(&blocks.objects, &blocks.trailing), encode(&objects, &[]));
    }

    #[test]
    fn test_damaged_block_keeps_prefix() {
        let objects = objects();
        let mut bytes = encode(&objects, &[]);
        let cut = bytes.len() - 6;
        bytes.truncate(cut);
        let partial = decode(&bytes, None);
        assert!(partial.damage.is_some());
        assert!(partial.value.objects[0].properties_loaded);
        assert!(!partial.value.objects[1].properties_loaded);
    }

    #[test]
    fn test_damaged_table_keeps_entries() {
        let bytes = encode(&objects(), &[]);
        let second_entry_end = table_size(&objects(), &NameMode::Legacy);
        let mut reader = ArchiveReader::new(&bytes[..second_entry_end - 3]);
        let partial = read_table(&mut reader).unwrap();
        assert_eq!(partial.value.len(), 1);
        assert!(matches!(partial.damage, Some(Error::Truncated { .. })));
    }

    #[test]
    fn test_output_name_table_keeps_seed_order() {
        let seed = NameTable::from_entries(["Zeta", "None"]);
        let table = output_name_table(&seed, &objects(), NameMode::Table);
        let entries: Vec<&str> = table.entries().collect();
        assert_eq!(&entries[..2], &["Zeta", "None"]);
        for expected in ["Foo_C", "FooComponent_C", "bFlag", "BoolProperty", "Level", "IntProperty"] {
            assert!(table.position(expected).is_some(), "{expected} missing");
        }
        assert_eq!(entries.iter().filter(|e| **e == "None").count(), 1);

        let hibernation = output_name_table(&NameTable::new(), &objects(), NameMode::Hibernation);
        assert!(hibernation.position("Foo_C_0").is_some());
    }
}
