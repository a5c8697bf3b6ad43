use super::structs::{StructKind, StructValue};
use super::{ObjectReference, PropertyKind, PropertyList, PropertyRegistry};
use crate::codec::{string_size, ArchiveReader, ArchiveWriter, Name, NameSizer};
use crate::error::{Error, Result};

/// Homogeneous array payload of an `ArrayProperty`.
///
/// An empty `ByteProperty` array carries nothing that tells bytes from enum
/// names, so it always decodes as `Byte`; empty `Byte` and `Enum` arrays
/// compare equal.
#[derive(Debug, Clone)]
pub enum ArrayValue {
    Bool(Vec<bool>),
    Int8(Vec<i8>),
    Byte(Vec<u8>),
    /// `ByteProperty` array whose elements are enum names.
    Enum(Vec<Name>),
    Int16(Vec<i16>),
    UInt16(Vec<u16>),
    Int(Vec<i32>),
    UInt32(Vec<u32>),
    Int64(Vec<i64>),
    UInt64(Vec<u64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Str(Vec<String>),
    Name(Vec<Name>),
    Object(Vec<ObjectReference>),
    Struct(Vec<StructValue>),
}

impl PartialEq for ArrayValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int8(a), Self::Int8(b)) => a == b,
            (Self::Byte(a), Self::Byte(b)) => a == b,
            (Self::Enum(a), Self::Enum(b)) => a == b,
            (Self::Byte(bytes), Self::Enum(names)) | (Self::Enum(names), Self::Byte(bytes)) => {
                bytes.is_empty() && names.is_empty()
            }
            (Self::Int16(a), Self::Int16(b)) => a == b,
            (Self::UInt16(a), Self::UInt16(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::UInt32(a), Self::UInt32(b)) => a == b,
            (Self::Int64(a), Self::Int64(b)) => a == b,
            (Self::UInt64(a), Self::UInt64(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Double(a), Self::Double(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Name(a), Self::Name(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            (Self::Struct(a), Self::Struct(b)) => a == b,
            _ => false,
        }
    }
}

impl ArrayValue {
    pub fn element_kind(&self) -> PropertyKind {
        match self {
            Self::Bool(_) => PropertyKind::Bool,
            Self::Int8(_) => PropertyKind::Int8,
            Self::Byte(_) | Self::Enum(_) => PropertyKind::Byte,
            Self::Int16(_) => PropertyKind::Int16,
            Self::UInt16(_) => PropertyKind::UInt16,
            Self::Int(_) => PropertyKind::Int,
            Self::UInt32(_) => PropertyKind::UInt32,
            Self::Int64(_) => PropertyKind::Int64,
            Self::UInt64(_) => PropertyKind::UInt64,
            Self::Float(_) => PropertyKind::Float,
            Self::Double(_) => PropertyKind::Double,
            Self::Str(_) => PropertyKind::Str,
            Self::Name(_) => PropertyKind::Name,
            Self::Object(_) => PropertyKind::Object,
            Self::Struct(_) => PropertyKind::Struct,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Bool(v) => v.len(),
            Self::Int8(v) => v.len(),
            Self::Byte(v) => v.len(),
            Self::Enum(v) => v.len(),
            Self::Int16(v) => v.len(),
            Self::UInt16(v) => v.len(),
            Self::Int(v) => v.len(),
            Self::UInt32(v) => v.len(),
            Self::Int64(v) => v.len(),
            Self::UInt64(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::Double(v) => v.len(),
            Self::Str(v) => v.len(),
            Self::Name(v) => v.len(),
            Self::Object(v) => v.len(),
            Self::Struct(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read an array payload of `payload_len` bytes whose elements are of
    /// type `element_tag`.
    pub fn read(
        reader: &mut ArchiveReader,
        registry: &PropertyRegistry,
        element_tag: &Name,
        payload_len: usize,
    ) -> Result<Self> {
        let offset = reader.position();
        let kind = registry.kind(element_tag.text()).ok_or_else(|| {
            Error::corrupt(offset, format!("unknown array element type {element_tag}"))
        })?;
        let count = reader.read_count(1)?;
        let elements_len = payload_len.saturating_sub(4);

        fn collect<T>(count: usize, mut read: impl FnMut() -> Result<T>) -> Result<Vec<T>> {
            let mut out = Vec::with_capacity(count);
            for _ in 0..count {
                out.push(read()?);
            }
            Ok(out)
        }

        Ok(match kind {
            PropertyKind::Bool => Self::Bool(collect(count, || reader.read_bool())?),
            PropertyKind::Int8 => Self::Int8(collect(count, || reader.read_i8())?),
            PropertyKind::Byte if elements_len == count => Self::Byte(reader.read_bytes(count)?.to_vec()),
            PropertyKind::Byte => Self::Enum(collect(count, || reader.read_name())?),
            PropertyKind::Int16 => Self::Int16(collect(count, || reader.read_i16())?),
            PropertyKind::UInt16 => Self::UInt16(collect(count, || reader.read_u16())?),
            PropertyKind::Int => Self::Int(collect(count, || reader.read_i32())?),
            PropertyKind::UInt32 => Self::UInt32(collect(count, || reader.read_u32())?),
            PropertyKind::Int64 => Self::Int64(collect(count, || reader.read_i64())?),
            PropertyKind::UInt64 => Self::UInt64(collect(count, || reader.read_u64())?),
            PropertyKind::Float => Self::Float(collect(count, || reader.read_f32())?),
            PropertyKind::Double => Self::Double(collect(count, || reader.read_f64())?),
            PropertyKind::Str => Self::Str(collect(count, || reader.read_string())?),
            PropertyKind::Name => Self::Name(collect(count, || reader.read_name())?),
            PropertyKind::Object => Self::Object(collect(count, || ObjectReference::read(reader))?),
            PropertyKind::Struct => {
                let struct_kind = StructKind::infer_for_array(elements_len, count);
                if struct_kind == StructKind::Vector2D {
                    if let Some(lists) = read_property_lists(reader, registry, count, elements_len) {
                        return Ok(Self::Struct(lists));
                    }
                }
                Self::Struct(collect(count, || StructValue::read(reader, registry, struct_kind))?)
            }
            PropertyKind::Array => {
                return Err(Error::corrupt(offset, "nested arrays are not supported"));
            }
        })
    }

    /// Payload size: element count plus elements.
    pub fn binary_size(&self, names: &dyn NameSizer) -> usize {
        4 + match self {
            Self::Bool(v) => v.len(),
            Self::Int8(v) => v.len(),
            Self::Byte(v) => v.len(),
            Self::Enum(v) | Self::Name(v) => v.iter().map(|n| names.name_size(n)).sum(),
            Self::Int16(v) => v.len() * 2,
            Self::UInt16(v) => v.len() * 2,
            Self::Int(v) => v.len() * 4,
            Self::UInt32(v) => v.len() * 4,
            Self::Float(v) => v.len() * 4,
            Self::Int64(v) => v.len() * 8,
            Self::UInt64(v) => v.len() * 8,
            Self::Double(v) => v.len() * 8,
            Self::Str(v) => v.iter().map(|s| string_size(s)).sum(),
            Self::Object(v) => v.iter().map(|r| r.binary_size(names)).sum(),
            Self::Struct(v) => v.iter().map(|s| s.binary_size(names)).sum(),
        }
    }

    pub fn write(&self, writer: &mut ArchiveWriter) -> Result<()> {
        writer.write_i32(self.len() as i32)?;
        match self {
            Self::Bool(v) => v.iter().try_for_each(|&b| writer.write_bool(b)),
            Self::Int8(v) => v.iter().try_for_each(|&x| writer.write_i8(x)),
            Self::Byte(v) => writer.write_bytes(v),
            Self::Enum(v) | Self::Name(v) => v.iter().try_for_each(|n| writer.write_name(n)),
            Self::Int16(v) => v.iter().try_for_each(|&x| writer.write_i16(x)),
            Self::UInt16(v) => v.iter().try_for_each(|&x| writer.write_u16(x)),
            Self::Int(v) => v.iter().try_for_each(|&x| writer.write_i32(x)),
            Self::UInt32(v) => v.iter().try_for_each(|&x| writer.write_u32(x)),
            Self::Int64(v) => v.iter().try_for_each(|&x| writer.write_i64(x)),
            Self::UInt64(v) => v.iter().try_for_each(|&x| writer.write_u64(x)),
            Self::Float(v) => v.iter().try_for_each(|&x| writer.write_f32(x)),
            Self::Double(v) => v.iter().try_for_each(|&x| writer.write_f64(x)),
            Self::Str(v) => v.iter().try_for_each(|s| writer.write_string(s)),
            Self::Object(v) => v.iter().try_for_each(|r| r.write(writer)),
            Self::Struct(v) => v.iter().try_for_each(|s| s.write(writer)),
        }
    }

    pub fn visit_names(&self, f: &mut dyn FnMut(&str, u32)) {
        match self {
            Self::Enum(v) | Self::Name(v) => {
                for name in v {
                    f(name.text(), name.instance());
                }
            }
            Self::Object(v) => {
                for reference in v {
                    reference.visit_names(f);
                }
            }
            Self::Struct(v) => {
                for value in v {
                    value.visit_names(f);
                }
            }
            _ => {}
        }
    }

    pub fn for_each_reference(&self, f: &mut dyn FnMut(&ObjectReference)) {
        match self {
            Self::Object(v) => v.iter().for_each(|r| f(r)),
            Self::Struct(v) => v.iter().for_each(|s| s.for_each_reference(f)),
            _ => {}
        }
    }

    pub fn try_for_each_reference_mut(
        &mut self,
        f: &mut dyn FnMut(&mut ObjectReference) -> Result<()>,
    ) -> Result<()> {
        match self {
            Self::Object(v) => v.iter_mut().try_for_each(|r| f(r)),
            Self::Struct(v) => v.iter_mut().try_for_each(|s| s.try_for_each_reference_mut(f)),
            _ => Ok(()),
        }
    }
}

/// Read `count` property lists filling exactly `len` bytes, or restore the
/// reader and return `None`. With name tokens an empty list is 8 bytes, the
/// size of a `Vector2D`.
fn read_property_lists(
    reader: &mut ArchiveReader,
    registry: &PropertyRegistry,
    count: usize,
    len: usize,
) -> Option<Vec<StructValue>> {
    let start = reader.position();
    let stats = reader.stats();
    let parsed = reader.bounded(len, |r| {
        let mut lists = Vec::with_capacity(count);
        for _ in 0..count {
            let list = PropertyList::read(r, registry)?;
            if !list.skipped().is_empty() {
                return Err(Error::corrupt(r.position(), "struct element is not a property list"));
            }
            lists.push(StructValue::Properties(list));
        }
        Ok(lists)
    });
    match parsed {
        Ok((lists, 0)) => Some(lists),
        _ => {
            *reader.stats_mut() = stats;
            reader.set_position(start).ok()?;
            None
        }
    }
}

/// Struct arrays of property lists, e.g. `CustomItemDatas`.
impl From<Vec<PropertyList>> for ArrayValue {
    fn from(lists: Vec<PropertyList>) -> Self {
        Self::Struct(lists.into_iter().map(StructValue::Properties).collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::codec::{NameMode, NameTable};

    fn roundtrip(value: &ArrayValue, element_tag: &str) -> ArrayValue {
        let registry = PropertyRegistry::standard();
        let size = value.binary_size(&NameMode::Legacy);
        let mut buf = vec![0u8; size];
        let mut writer = ArchiveWriter::new(&mut buf);
        value.write(&mut writer).unwrap();
        writer.finish().unwrap();

        let mut reader = ArchiveReader::new(&buf);
        let read = ArrayValue::read(&mut reader, &registry, &Name::new(element_tag, 0), size).unwrap();
        assert!(reader.is_empty());
        read
    }

    #[test]
    fn test_byte_vs_enum_arrays() {
        let bytes = ArrayValue::Byte(vec![1, 2, 3]);
        assert_eq!(roundtrip(&bytes, "ByteProperty"), bytes);

        let enums = ArrayValue::Enum(vec![Name::new("EPrimalEquipmentType::Hat", 0)]);
        assert_eq!(roundtrip(&enums, "ByteProperty"), enums);
    }

    #[test]
    fn test_empty_enum_array() {
        let empty = ArrayValue::Enum(Vec::new());
        let read = roundtrip(&empty, "ByteProperty");
        assert!(matches!(read, ArrayValue::Byte(ref bytes) if bytes.is_empty()));
        assert_eq!(read, empty);
        assert_eq!(empty, read);
        assert_ne!(ArrayValue::Byte(vec![1]), ArrayValue::Enum(Vec::new()));
    }

    #[test]
    fn test_empty_array() {
        let empty = ArrayValue::Int(Vec::new());
        assert_eq!(empty.binary_size(&NameMode::Table), 4);
        assert_eq!(roundtrip(&empty, "IntProperty"), empty);
    }

    #[test]
    fn test_struct_array_inference() {
        let vectors = ArrayValue::Struct(vec![
            StructValue::Vector { x: 1.0, y: 2.0, z: 3.0 },
            StructValue::Vector { x: 4.0, y: 5.0, z: 6.0 },
        ]);
        assert_eq!(roundtrip(&vectors, "StructProperty"), vectors);

        let colors = ArrayValue::Struct(vec![StructValue::Color { b: 0, g: 10, r: 20, a: 255 }]);
        assert_eq!(roundtrip(&colors, "StructProperty"), colors);
    }

    fn roundtrip_with_table(value: &ArrayValue) -> ArrayValue {
        let mut table = NameTable::new();
        table.insert("None");
        let table = Arc::new(table);
        let size = value.binary_size(&NameMode::Table);
        let mut buf = vec![0u8; size];
        let mut writer = ArchiveWriter::with_names(&mut buf, NameMode::Table, Some(table.clone()));
        value.write(&mut writer).unwrap();
        writer.finish().unwrap();

        let mut reader = ArchiveReader::new(&buf);
        reader.set_names(NameMode::Table, Some(table));
        let registry = PropertyRegistry::standard();
        let read = ArrayValue::read(&mut reader, &registry, &Name::new("StructProperty", 0), size).unwrap();
        assert!(reader.is_empty());
        read
    }

    #[test]
    fn test_empty_struct_lists_with_name_table() {
        let lists = ArrayValue::from(vec![PropertyList::new(), PropertyList::new()]);
        assert_eq!(lists.binary_size(&NameMode::Table), 4 + 2 * 8);
        assert_eq!(roundtrip_with_table(&lists), lists);

        let points = ArrayValue::Struct(vec![
            StructValue::Vector2D { x: 1.0, y: 2.0 },
            StructValue::Vector2D { x: -3.5, y: 0.0 },
        ]);
        assert_eq!(roundtrip_with_table(&points), points);
    }

    #[test]
    fn test_object_array() {
        let refs = ArrayValue::Object(vec![
            ObjectReference::Id(3),
            ObjectReference::Null,
            ObjectReference::Path(Name::new("/Game/PrimalEarth/Dinos/Dodo", 0)),
        ]);
        assert_eq!(roundtrip(&refs, "ObjectProperty"), refs);
    }
}
