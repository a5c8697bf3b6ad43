use super::{ObjectReference, PropertyList, PropertyRegistry};
use crate::codec::{string_size, ArchiveReader, ArchiveWriter, NameSizer};
use crate::error::Result;

/// Binary layout of a struct payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StructKind {
    Vector,
    Vector2D,
    Quat,
    Rotator,
    Color,
    LinearColor,
    UniqueNetId,
    /// Nested property list terminated by `None`.
    Properties,
}

impl StructKind {
    /// Kinds with a fixed native layout.
    pub const NATIVE: [StructKind; 7] = [
        Self::Vector,
        Self::Vector2D,
        Self::Quat,
        Self::Rotator,
        Self::Color,
        Self::LinearColor,
        Self::UniqueNetId,
    ];

    pub fn type_name(self) -> &'static str {
        match self {
            Self::Vector => "Vector",
            Self::Vector2D => "Vector2D",
            Self::Quat => "Quat",
            Self::Rotator => "Rotator",
            Self::Color => "Color",
            Self::LinearColor => "LinearColor",
            Self::UniqueNetId => "UniqueNetIdRepl",
            Self::Properties => "Properties",
        }
    }

    pub fn from_type_name(name: &str) -> Option<Self> {
        Self::NATIVE
            .iter()
            .copied()
            .chain(std::iter::once(Self::Properties))
            .find(|k| k.type_name() == name)
    }

    /// Element kind of a struct array, inferred from the per-element size
    /// (the array header does not record the struct type). Eight bytes is
    /// also an empty property list when names are table tokens.
    pub fn infer_for_array(payload_len: usize, count: usize) -> Self {
        if count == 0 || payload_len % count != 0 {
            return Self::Properties;
        }
        match payload_len / count {
            4 => Self::Color,
            8 => Self::Vector2D,
            12 => Self::Vector,
            16 => Self::LinearColor,
            _ => Self::Properties,
        }
    }
}

/// Struct payload.
#[derive(Debug, Clone, PartialEq)]
pub enum StructValue {
    Vector { x: f32, y: f32, z: f32 },
    Vector2D { x: f32, y: f32 },
    Quat { x: f32, y: f32, z: f32, w: f32 },
    Rotator { pitch: f32, yaw: f32, roll: f32 },
    Color { b: u8, g: u8, r: u8, a: u8 },
    LinearColor { r: f32, g: f32, b: f32, a: f32 },
    UniqueNetId { unknown: i32, net_id: String },
    Properties(PropertyList),
    /// Property-list struct whose payload did not parse; kept verbatim.
    Opaque(Vec<u8>),
}

impl StructValue {
    pub fn kind(&self) -> StructKind {
        match self {
            Self::Vector { .. } => StructKind::Vector,
            Self::Vector2D { .. } => StructKind::Vector2D,
            Self::Quat { .. } => StructKind::Quat,
            Self::Rotator { .. } => StructKind::Rotator,
            Self::Color { .. } => StructKind::Color,
            Self::LinearColor { .. } => StructKind::LinearColor,
            Self::UniqueNetId { .. } => StructKind::UniqueNetId,
            Self::Properties(_) | Self::Opaque(_) => StructKind::Properties,
        }
    }

    /// Read the payload of a `StructProperty` occupying the whole current
    /// window. A property-list payload that fails to parse is kept opaque.
    pub fn read_property(reader: &mut ArchiveReader, registry: &PropertyRegistry, kind: StructKind) -> Result<Self> {
        if kind != StructKind::Properties {
            return Self::read(reader, registry, kind);
        }
        let start = reader.position();
        match PropertyList::read(reader, registry) {
            Ok(list) if reader.is_empty() => Ok(Self::Properties(list)),
            outcome => {
                if let Err(err) = outcome {
                    tracing::debug!(offset = start, error = %err, "struct payload kept opaque");
                }
                reader.set_position(start)?;
                Ok(Self::Opaque(reader.read_remaining().to_vec()))
            }
        }
    }

    pub fn read(reader: &mut ArchiveReader, registry: &PropertyRegistry, kind: StructKind) -> Result<Self> {
        Ok(match kind {
            StructKind::Vector => Self::Vector {
                x: reader.read_f32()?,
                y: reader.read_f32()?,
                z: reader.read_f32()?,
            },
            StructKind::Vector2D => Self::Vector2D { x: reader.read_f32()?, y: reader.read_f32()? },
            StructKind::Quat => Self::Quat {
                x: reader.read_f32()?,
                y: reader.read_f32()?,
                z: reader.read_f32()?,
                w: reader.read_f32()?,
            },
            StructKind::Rotator => Self::Rotator {
                pitch: reader.read_f32()?,
                yaw: reader.read_f32()?,
                roll: reader.read_f32()?,
            },
            StructKind::Color => Self::Color {
                b: reader.read_u8()?,
                g: reader.read_u8()?,
                r: reader.read_u8()?,
                a: reader.read_u8()?,
            },
            StructKind::LinearColor => Self::LinearColor {
                r: reader.read_f32()?,
                g: reader.read_f32()?,
                b: reader.read_f32()?,
                a: reader.read_f32()?,
            },
            StructKind::UniqueNetId => {
                let unknown = reader.read_i32()?;
                let net_id = reader.read_string()?;
                Self::UniqueNetId { unknown, net_id }
            }
            StructKind::Properties => Self::Properties(PropertyList::read(reader, registry)?),
        })
    }

    pub fn binary_size(&self, names: &dyn NameSizer) -> usize {
        match self {
            Self::Vector { .. } | Self::Rotator { .. } => 12,
            Self::Vector2D { .. } => 8,
            Self::Quat { .. } | Self::LinearColor { .. } => 16,
            Self::Color { .. } => 4,
            Self::UniqueNetId { net_id, .. } => 4 + string_size(net_id),
            Self::Properties(list) => list.binary_size(names),
            Self::Opaque(data) => data.len(),
        }
    }

    pub fn write(&self, writer: &mut ArchiveWriter) -> Result<()> {
        match self {
            Self::Vector { x, y, z } => {
                writer.write_f32(*x)?;
                writer.write_f32(*y)?;
                writer.write_f32(*z)
            }
            Self::Vector2D { x, y } => {
                writer.write_f32(*x)?;
                writer.write_f32(*y)
            }
            Self::Quat { x, y, z, w } => {
                writer.write_f32(*x)?;
                writer.write_f32(*y)?;
                writer.write_f32(*z)?;
                writer.write_f32(*w)
            }
            Self::Rotator { pitch, yaw, roll } => {
                writer.write_f32(*pitch)?;
                writer.write_f32(*yaw)?;
                writer.write_f32(*roll)
            }
            Self::Color { b, g, r, a } => {
                writer.write_u8(*b)?;
                writer.write_u8(*g)?;
                writer.write_u8(*r)?;
                writer.write_u8(*a)
            }
            Self::LinearColor { r, g, b, a } => {
                writer.write_f32(*r)?;
                writer.write_f32(*g)?;
                writer.write_f32(*b)?;
                writer.write_f32(*a)
            }
            Self::UniqueNetId { unknown, net_id } => {
                writer.write_i32(*unknown)?;
                writer.write_string(net_id)
            }
            Self::Properties(list) => list.write(writer),
            Self::Opaque(data) => writer.write_bytes(data),
        }
    }

    pub fn visit_names(&self, f: &mut dyn FnMut(&str, u32)) {
        if let Self::Properties(list) = self {
            list.visit_names(f);
        }
    }

    pub fn for_each_reference(&self, f: &mut dyn FnMut(&ObjectReference)) {
        if let Self::Properties(list) = self {
            list.for_each_reference(f);
        }
    }

    pub fn try_for_each_reference_mut(
        &mut self,
        f: &mut dyn FnMut(&mut ObjectReference) -> Result<()>,
    ) -> Result<()> {
        match self {
            Self::Properties(list) => list.try_for_each_reference_mut(f),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::NameMode;

    #[test]
    fn test_infer_for_array() {
        assert_eq!(StructKind::infer_for_array(24, 2), StructKind::Vector);
        assert_eq!(StructKind::infer_for_array(8, 2), StructKind::Color);
        assert_eq!(StructKind::infer_for_array(32, 2), StructKind::LinearColor);
        assert_eq!(StructKind::infer_for_array(0, 0), StructKind::Properties);
        assert_eq!(StructKind::infer_for_array(50, 2), StructKind::Properties);
        assert_eq!(StructKind::infer_for_array(7, 2), StructKind::Properties);
    }

    #[test]
    fn test_native_roundtrip() {
        let registry = PropertyRegistry::standard();
        let values = [
            StructValue::Vector { x: 1.0, y: -2.5, z: 3.25 },
            StructValue::Quat { x: 0.0, y: 0.5, z: 0.5, w: 1.0 },
            StructValue::Color { b: 1, g: 2, r: 3, a: 255 },
            StructValue::UniqueNetId { unknown: 8, net_id: "76561198000000000".into() },
        ];
        for value in values {
            let size = value.binary_size(&NameMode::Legacy);
            let mut buf = vec![0u8; size];
            let mut writer = ArchiveWriter::new(&mut buf);
            value.write(&mut writer).unwrap();
            writer.finish().unwrap();

            let mut reader = ArchiveReader::new(&buf);
            assert_eq!(StructValue::read(&mut reader, &registry, value.kind()).unwrap(), value);
            assert!(reader.is_empty());
        }
    }

    #[test]
    fn test_unparseable_property_struct_is_opaque() {
        let registry = PropertyRegistry::standard();
        // An 8-byte native struct the registry does not know about.
        let data = [1u8, 0, 0, 0, 2, 0, 0, 0];
        let mut reader = ArchiveReader::new(&data);
        let value = StructValue::read_property(&mut reader, &registry, StructKind::Properties).unwrap();
        assert_eq!(value, StructValue::Opaque(data.to_vec()));
        assert!(reader.is_empty());
    }
}
