//! Binary encoding of properties and property lists
//!
//! Every unit follows the same size-then-emit contract: `binary_size`
//! returns exactly the number of bytes `write` produces for the writer's
//! name mode.

use tracing::{debug, warn};

use super::structs::StructValue;
use super::{
    ArrayValue, ListEntry, ObjectReference, Property, PropertyKind, PropertyList, PropertyRegistry,
    PropertyValue, RawProperty, TypeArgument,
};
use crate::codec::{string_size, ArchiveReader, ArchiveWriter, Name, NameSizer};
use crate::error::{Error, Partial, Result};

const REF_INDEX: i32 = 0;
const REF_PATH: i32 = 1;

/// Outcome of decoding one property-list entry.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyRead {
    Property(Property),
    /// The `None` terminator.
    End,
    /// Skipped entry, preserved for write-back.
    Unreadable(RawProperty),
}

impl ObjectReference {
    pub fn read(reader: &mut ArchiveReader) -> Result<Self> {
        let offset = reader.position();
        match reader.read_i32()? {
            REF_INDEX => match reader.read_i32()? {
                -1 => Ok(Self::Null),
                id => Ok(Self::Id(id)),
            },
            REF_PATH => Ok(Self::Path(reader.read_name()?)),
            other => Err(Error::corrupt(offset, format!("invalid object reference type {other}"))),
        }
    }

    pub fn binary_size(&self, names: &dyn NameSizer) -> usize {
        match self {
            Self::Null | Self::Id(_) => 8,
            Self::Path(path) => 4 + names.name_size(path),
        }
    }

    pub fn write(&self, writer: &mut ArchiveWriter) -> Result<()> {
        match self {
            Self::Null => {
                writer.write_i32(REF_INDEX)?;
                writer.write_i32(-1)
            }
            Self::Id(id) => {
                writer.write_i32(REF_INDEX)?;
                writer.write_i32(*id)
            }
            Self::Path(path) => {
                writer.write_i32(REF_PATH)?;
                writer.write_name(path)
            }
        }
    }

    pub fn visit_names(&self, f: &mut dyn FnMut(&str, u32)) {
        if let Self::Path(path) = self {
            f(path.text(), path.instance());
        }
    }
}

impl TypeArgument {
    fn read(reader: &mut ArchiveReader, kind: PropertyKind) -> Result<Self> {
        Ok(match kind {
            PropertyKind::Bool => Self::Bool(reader.read_u8()?),
            PropertyKind::Byte | PropertyKind::Struct | PropertyKind::Array => {
                Self::Name(reader.read_name()?)
            }
            _ => Self::None,
        })
    }

    fn binary_size(&self, names: &dyn NameSizer) -> usize {
        match self {
            Self::None => 0,
            Self::Name(name) => names.name_size(name),
            Self::Bool(_) => 1,
        }
    }

    fn write(&self, writer: &mut ArchiveWriter) -> Result<()> {
        match self {
            Self::None => Ok(()),
            Self::Name(name) => writer.write_name(name),
            Self::Bool(value) => writer.write_u8(*value),
        }
    }

    fn as_name(&self) -> Option<&Name> {
        match self {
            Self::Name(name) => Some(name),
            _ => None,
        }
    }
}

impl Property {
    /// Decode the next list entry.
    ///
    /// Structural damage (a header or declared payload running past the
    /// input) is an error. An unknown tag, or a payload that does not decode
    /// within its declared size, yields [`PropertyRead::Unreadable`] and
    /// leaves the reader just past the payload.
    pub fn read(reader: &mut ArchiveReader, registry: &PropertyRegistry) -> Result<PropertyRead> {
        let name = reader.read_name()?;
        if name.is_none() {
            return Ok(PropertyRead::End);
        }
        let type_name = reader.read_name()?;
        let size_offset = reader.position();
        let data_size = reader.read_i32()?;
        if data_size < 0 {
            return Err(Error::corrupt(size_offset, format!("negative property size {data_size}")));
        }
        let data_size = data_size as usize;
        let index = reader.read_i32()?;

        let kind = match type_name.instance() {
            0 => registry.kind(type_name.text()),
            _ => None,
        };
        let type_argument = match kind {
            Some(kind) => TypeArgument::read(reader, kind)?,
            None => TypeArgument::None,
        };

        let payload_start = reader.position();
        if reader.remaining() < data_size {
            return Err(Error::Truncated {
                offset: payload_start,
                need: data_size,
                have: reader.remaining(),
            });
        }

        if let Some(kind) = kind {
            let decoded = reader.bounded(data_size, |r| {
                read_payload(r, registry, kind, &type_argument, data_size)
            });
            match decoded {
                Ok((value, 0)) => return Ok(PropertyRead::Property(Property { name, index, value })),
                Ok((_, leftover)) => {
                    debug!(property = %name, offset = payload_start, leftover, "payload not fully consumed");
                }
                Err(err) => {
                    debug!(property = %name, offset = payload_start, error = %err, "payload did not decode");
                }
            }
            reader.set_position(payload_start)?;
        }

        let data = reader.read_bytes(data_size)?.to_vec();
        Ok(PropertyRead::Unreadable(RawProperty { name, type_name, index, type_argument, data }))
    }

    /// Size of the payload counted by the header's size field.
    pub fn payload_size(&self, names: &dyn NameSizer) -> usize {
        match &self.value {
            PropertyValue::Bool(_) => 0,
            PropertyValue::Int8(_) | PropertyValue::Byte(_) => 1,
            PropertyValue::Enum { value, .. } => names.name_size(value),
            PropertyValue::Int16(_) | PropertyValue::UInt16(_) => 2,
            PropertyValue::Int(_) | PropertyValue::UInt32(_) | PropertyValue::Float(_) => 4,
            PropertyValue::Int64(_) | PropertyValue::UInt64(_) | PropertyValue::Double(_) => 8,
            PropertyValue::Str(s) => string_size(s),
            PropertyValue::Name(name) => names.name_size(name),
            PropertyValue::Object(reference) => reference.binary_size(names),
            PropertyValue::Struct { value, .. } => value.binary_size(names),
            PropertyValue::Array(array) => array.binary_size(names),
        }
    }

    fn header_argument_size(&self, names: &dyn NameSizer) -> usize {
        match &self.value {
            PropertyValue::Bool(_) => 1,
            PropertyValue::Byte(_) => names.name_size(&Name::none()),
            PropertyValue::Enum { enum_type, .. } => names.name_size(enum_type),
            PropertyValue::Struct { struct_type, .. } => names.name_size(struct_type),
            PropertyValue::Array(array) => names.tag_size(array.element_kind().tag()),
            _ => 0,
        }
    }

    pub fn binary_size(&self, names: &dyn NameSizer) -> usize {
        names.name_size(&self.name)
            + names.tag_size(self.kind().tag())
            + 8
            + self.header_argument_size(names)
            + self.payload_size(names)
    }

    pub fn write(&self, writer: &mut ArchiveWriter) -> Result<()> {
        let mode = writer.mode();
        writer.write_name(&self.name)?;
        writer.write_tag(self.kind().tag())?;
        writer.write_i32(self.payload_size(&mode) as i32)?;
        writer.write_i32(self.index)?;

        match &self.value {
            PropertyValue::Bool(v) => writer.write_bool(*v),
            PropertyValue::Int8(v) => writer.write_i8(*v),
            PropertyValue::Byte(v) => {
                writer.write_name(&Name::none())?;
                writer.write_u8(*v)
            }
            PropertyValue::Enum { enum_type, value } => {
                writer.write_name(enum_type)?;
                writer.write_name(value)
            }
            PropertyValue::Int16(v) => writer.write_i16(*v),
            PropertyValue::UInt16(v) => writer.write_u16(*v),
            PropertyValue::Int(v) => writer.write_i32(*v),
            PropertyValue::UInt32(v) => writer.write_u32(*v),
            PropertyValue::Int64(v) => writer.write_i64(*v),
            PropertyValue::UInt64(v) => writer.write_u64(*v),
            PropertyValue::Float(v) => writer.write_f32(*v),
            PropertyValue::Double(v) => writer.write_f64(*v),
            PropertyValue::Str(s) => writer.write_string(s),
            PropertyValue::Name(name) => writer.write_name(name),
            PropertyValue::Object(reference) => reference.write(writer),
            PropertyValue::Struct { struct_type, value } => {
                writer.write_name(struct_type)?;
                value.write(writer)
            }
            PropertyValue::Array(array) => {
                writer.write_tag(array.element_kind().tag())?;
                array.write(writer)
            }
        }
    }

    /// Report every name token the encoded form contains.
    pub fn visit_names(&self, f: &mut dyn FnMut(&str, u32)) {
        f(self.name.text(), self.name.instance());
        f(self.kind().tag(), 0);
        match &self.value {
            PropertyValue::Byte(_) => f(Name::none().text(), 0),
            PropertyValue::Enum { enum_type, value } => {
                f(enum_type.text(), enum_type.instance());
                f(value.text(), value.instance());
            }
            PropertyValue::Name(name) => f(name.text(), name.instance()),
            PropertyValue::Object(reference) => reference.visit_names(f),
            PropertyValue::Struct { struct_type, value } => {
                f(struct_type.text(), struct_type.instance());
                value.visit_names(f);
            }
            PropertyValue::Array(array) => {
                f(array.element_kind().tag(), 0);
                array.visit_names(f);
            }
            _ => {}
        }
    }
}

fn read_payload(
    reader: &mut ArchiveReader,
    registry: &PropertyRegistry,
    kind: PropertyKind,
    type_argument: &TypeArgument,
    data_size: usize,
) -> Result<PropertyValue> {
    let offset = reader.position();
    let missing = || Error::corrupt(offset, "missing type argument");
    Ok(match kind {
        PropertyKind::Bool => match type_argument {
            TypeArgument::Bool(v @ (0 | 1)) => PropertyValue::Bool(*v == 1),
            TypeArgument::Bool(v) => {
                return Err(Error::corrupt(offset, format!("invalid boolean value {v}")));
            }
            _ => return Err(missing()),
        },
        PropertyKind::Byte => {
            let enum_type = type_argument.as_name().ok_or_else(missing)?;
            if enum_type.is_none() {
                PropertyValue::Byte(reader.read_u8()?)
            } else {
                PropertyValue::Enum { enum_type: enum_type.clone(), value: reader.read_name()? }
            }
        }
        PropertyKind::Int8 => PropertyValue::Int8(reader.read_i8()?),
        PropertyKind::Int16 => PropertyValue::Int16(reader.read_i16()?),
        PropertyKind::Int => PropertyValue::Int(reader.read_i32()?),
        PropertyKind::Int64 => PropertyValue::Int64(reader.read_i64()?),
        PropertyKind::UInt16 => PropertyValue::UInt16(reader.read_u16()?),
        PropertyKind::UInt32 => PropertyValue::UInt32(reader.read_u32()?),
        PropertyKind::UInt64 => PropertyValue::UInt64(reader.read_u64()?),
        PropertyKind::Float => PropertyValue::Float(reader.read_f32()?),
        PropertyKind::Double => PropertyValue::Double(reader.read_f64()?),
        PropertyKind::Str => PropertyValue::Str(reader.read_string()?),
        PropertyKind::Name => PropertyValue::Name(reader.read_name()?),
        PropertyKind::Object => PropertyValue::Object(ObjectReference::read(reader)?),
        PropertyKind::Struct => {
            let struct_type = type_argument.as_name().ok_or_else(missing)?.clone();
            let struct_kind = registry.struct_kind(struct_type.text());
            let value = StructValue::read_property(reader, registry, struct_kind)?;
            PropertyValue::Struct { struct_type, value }
        }
        PropertyKind::Array => {
            let element_tag = type_argument.as_name().ok_or_else(missing)?;
            PropertyValue::Array(ArrayValue::read(reader, registry, element_tag, data_size)?)
        }
    })
}

impl RawProperty {
    pub fn binary_size(&self, names: &dyn NameSizer) -> usize {
        names.name_size(&self.name)
            + names.name_size(&self.type_name)
            + 8
            + self.type_argument.binary_size(names)
            + self.data.len()
    }

    pub fn write(&self, writer: &mut ArchiveWriter) -> Result<()> {
        writer.write_name(&self.name)?;
        writer.write_name(&self.type_name)?;
        writer.write_i32(self.data.len() as i32)?;
        writer.write_i32(self.index)?;
        self.type_argument.write(writer)?;
        writer.write_bytes(&self.data)
    }

    pub fn visit_names(&self, f: &mut dyn FnMut(&str, u32)) {
        f(self.name.text(), self.name.instance());
        f(self.type_name.text(), self.type_name.instance());
        if let Some(argument) = self.type_argument.as_name() {
            f(argument.text(), argument.instance());
        }
    }
}

impl PropertyList {
    /// Read entries up to and including the `None` terminator. Unreadable
    /// entries are logged, counted on the reader and kept in place.
    pub fn read(reader: &mut ArchiveReader, registry: &PropertyRegistry) -> Result<Self> {
        Self::read_partial(reader, registry).into_result()
    }

    /// Like [`read`](Self::read), but damage that ends the list early
    /// returns the entries read before it.
    pub fn read_partial(reader: &mut ArchiveReader, registry: &PropertyRegistry) -> Partial<Self> {
        let mut list = PropertyList::new();
        loop {
            let offset = reader.position();
            let read = match Property::read(reader, registry) {
                Ok(read) => read,
                Err(err) => return Partial { value: list, damage: Some(err) },
            };
            match read {
                PropertyRead::End => return Partial::complete(list),
                PropertyRead::Property(property) => list.push(property),
                PropertyRead::Unreadable(raw) => {
                    let event = Error::UnreadableProperty {
                        name: raw.name.to_string(),
                        type_name: raw.type_name.to_string(),
                        offset,
                    };
                    warn!("{event}, skipped");
                    reader.stats_mut().unreadable_properties += 1;
                    list.push_skipped(raw);
                }
            }
        }
    }

    pub fn binary_size(&self, names: &dyn NameSizer) -> usize {
        let properties: usize = self.iter().map(|p| p.binary_size(names)).sum();
        let skipped: usize = self.skipped().iter().map(|s| s.raw.binary_size(names)).sum();
        properties + skipped + names.name_size(&Name::none())
    }

    pub fn write(&self, writer: &mut ArchiveWriter) -> Result<()> {
        for entry in self.entries() {
            match entry {
                ListEntry::Property(property) => property.write(writer)?,
                ListEntry::Skipped(raw) => raw.write(writer)?,
            }
        }
        writer.write_name(&Name::none())
    }

    pub fn visit_names(&self, f: &mut dyn FnMut(&str, u32)) {
        for property in self.iter() {
            property.visit_names(f);
        }
        for skipped in self.skipped() {
            skipped.raw.visit_names(f);
        }
        f(Name::none().text(), 0);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::codec::{NameMode, NameTable};
    use crate::property::StructValue;

    fn sample_list() -> PropertyList {
        let nested = PropertyList::from(vec![
            Property::new("ItemQuantity", PropertyValue::Int(5)),
            Property::new("ItemId", PropertyValue::Struct {
                struct_type: Name::new("ItemNetID", 0),
                value: StructValue::Properties(PropertyList::from(vec![
                    Property::new("ItemID1", PropertyValue::UInt32(7)),
                    Property::new("ItemID2", PropertyValue::UInt32(8)),
                ])),
            }),
        ]);
        PropertyList::from(vec![
            Property::new("bFlag", PropertyValue::Bool(true)),
            Property::new("Small", PropertyValue::Int8(-3)),
            Property::new("Plain", PropertyValue::Byte(9)),
            Property::new("Slot", PropertyValue::Enum {
                enum_type: Name::new("EPrimalEquipmentType", 0),
                value: Name::new("EPrimalEquipmentType::Hat", 0),
            }),
            Property::indexed("ColorSetIndices", 5, PropertyValue::Byte(12)),
            Property::new("Short", PropertyValue::Int16(-2)),
            Property::new("UShort", PropertyValue::UInt16(65535)),
            Property::new("Level", PropertyValue::Int(150)),
            Property::new("Flags", PropertyValue::UInt32(u32::MAX)),
            Property::new("Big", PropertyValue::Int64(i64::MIN)),
            Property::new("UBig", PropertyValue::UInt64(u64::MAX)),
            Property::new("Health", PropertyValue::Float(1234.5)),
            Property::new("GameTime", PropertyValue::Double(98765.4321)),
            Property::new("TamerString", PropertyValue::Str("Tëst tribe".into())),
            Property::new("Empty", PropertyValue::Str(String::new())),
            Property::new("Tag", PropertyValue::Name(Name::new("Dodo", 3))),
            Property::new("Owner", PropertyValue::Object(ObjectReference::Id(4))),
            Property::new("Nobody", PropertyValue::Object(ObjectReference::Null)),
            Property::new("Archetype", PropertyValue::Object(ObjectReference::Path(Name::new(
                "BlueprintGeneratedClass /Game/PrimalEarth/Dinos/Dodo/Dodo_Character_BP.Dodo_Character_BP_C",
                0,
            )))),
            Property::new("Location", PropertyValue::Struct {
                struct_type: Name::new("Vector", 0),
                value: StructValue::Vector { x: 1.0, y: 2.0, z: 3.0 },
            }),
            Property::new("CustomItemDatas", PropertyValue::Array(ArrayValue::from(vec![nested]))),
            Property::new("Scores", PropertyValue::Array(ArrayValue::Float(vec![]))),
        ])
    }

    fn table_for(list: &PropertyList, mode: NameMode) -> Arc<NameTable> {
        let mut table = NameTable::new();
        list.visit_names(&mut |text, instance| table.register(text, instance, mode));
        Arc::new(table)
    }

    fn encode(list: &PropertyList, mode: NameMode, table: Option<Arc<NameTable>>) -> Vec<u8> {
        let size = list.binary_size(&mode);
        let mut buf = vec![0u8; size];
        let mut writer = ArchiveWriter::with_names(&mut buf, mode, table);
        list.write(&mut writer).unwrap();
        assert_eq!(writer.finish().unwrap(), size);
        buf
    }

    #[test]
    fn test_list_roundtrip_every_mode() {
        let registry = PropertyRegistry::standard();
        let list = sample_list();
        for mode in [NameMode::Legacy, NameMode::Table, NameMode::Hibernation] {
            let table = mode.uses_table().then(|| table_for(&list, mode));
            let bytes = encode(&list, mode, table.clone());

            let mut reader = ArchiveReader::with_names(&bytes, mode, table.clone());
            let read = PropertyList::read(&mut reader, &registry).unwrap();
            assert!(reader.is_empty(), "{mode:?}");
            assert_eq!(read, list, "{mode:?}");
            assert_eq!(encode(&read, mode, table), bytes, "{mode:?}");
        }
    }

    #[test]
    fn test_unknown_property_is_skipped() {
        let registry = PropertyRegistry::standard();
        let mut list = PropertyList::new();
        list.push(Property::new("Before", PropertyValue::Int(1)));
        list.push_skipped(RawProperty {
            name: Name::new("Mystery", 0),
            type_name: Name::new("SoftObjectProperty", 0),
            index: 0,
            type_argument: TypeArgument::None,
            data: vec![0xAA; 11],
        });
        list.push(Property::new("After", PropertyValue::Bool(false)));
        let bytes = encode(&list, NameMode::Legacy, None);

        let mut reader = ArchiveReader::new(&bytes);
        let read = PropertyList::read(&mut reader, &registry).unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read[0].name.text(), "Before");
        assert_eq!(read[1].name.text(), "After");
        assert_eq!(read.skipped().len(), 1);
        assert_eq!(read.skipped()[0].position, 1);
        assert_eq!(reader.stats().unreadable_properties, 1);
        assert_eq!(encode(&read, NameMode::Legacy, None), bytes);
    }

    #[test]
    fn test_undecodable_payload_is_downgraded() {
        let registry = PropertyRegistry::standard();
        // IntProperty that declares 6 payload bytes.
        let mut bytes = Vec::new();
        for s in ["Odd", "IntProperty"] {
            bytes.extend_from_slice(&(s.len() as i32 + 1).to_le_bytes());
            bytes.extend_from_slice(s.as_bytes());
            bytes.push(0);
        }
        bytes.extend_from_slice(&6i32.to_le_bytes());
        bytes.extend_from_slice(&0i32.to_le_bytes());
        bytes.extend_from_slice(&[1, 2, 3, 4, 5, 6]);

        let mut reader = ArchiveReader::new(&bytes);
        match Property::read(&mut reader, &registry).unwrap() {
            PropertyRead::Unreadable(raw) => {
                assert_eq!(raw.type_name.text(), "IntProperty");
                assert_eq!(raw.data, vec![1, 2, 3, 4, 5, 6]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(reader.is_empty());
    }

    #[test]
    fn test_invalid_bool_keeps_value_byte() {
        let registry = PropertyRegistry::standard();
        let mut list = PropertyList::new();
        list.push_skipped(RawProperty {
            name: Name::new("bOdd", 0),
            type_name: Name::new("BoolProperty", 0),
            index: 0,
            type_argument: TypeArgument::Bool(7),
            data: Vec::new(),
        });
        let bytes = encode(&list, NameMode::Legacy, None);
        let read = PropertyList::read(&mut ArchiveReader::new(&bytes), &registry).unwrap();
        assert_eq!(read.skipped()[0].raw.type_argument, TypeArgument::Bool(7));
        assert_eq!(encode(&read, NameMode::Legacy, None), bytes);
    }

    #[test]
    fn test_payload_past_end_is_truncated() {
        let registry = PropertyRegistry::standard();
        let list = PropertyList::from(vec![Property::new("Level", PropertyValue::Int(3))]);
        let bytes = encode(&list, NameMode::Legacy, None);
        // Cut inside the Int payload.
        let cut = string_size("Level") + string_size("IntProperty") + 8 + 2;
        let mut reader = ArchiveReader::new(&bytes[..cut]);
        assert!(matches!(PropertyList::read(&mut reader, &registry), Err(Error::Truncated { .. })));
    }

    #[test]
    fn test_struct_depth_three() {
        let registry = PropertyRegistry::standard();
        let mut value = PropertyValue::Int(42);
        for depth in 0..3 {
            value = PropertyValue::Struct {
                struct_type: Name::new(&format!("Level{depth}"), 0),
                value: StructValue::Properties(PropertyList::from(vec![Property::new("Inner", value)])),
            };
        }
        let list = PropertyList::from(vec![Property::new("Outer", value)]);
        let bytes = encode(&list, NameMode::Legacy, None);
        let read = PropertyList::read(&mut ArchiveReader::new(&bytes), &registry).unwrap();
        assert_eq!(read, list);
    }

    #[test]
    fn test_empty_list_is_terminator_only() {
        let list = PropertyList::new();
        assert_eq!(list.binary_size(&NameMode::Legacy), string_size("None"));
        assert_eq!(list.binary_size(&NameMode::Table), 8);
    }
}
