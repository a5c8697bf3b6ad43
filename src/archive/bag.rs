//! Single property bag (`.sav`): class name, property list, trailing bytes

use serde_json::{json, Map, Value};
use tracing::debug;

use super::{Planned, ReadOptions, SaveArchive};
use crate::codec::{ArchiveWriter, Name, NameMode, NameSizer, ReadStats};
use crate::error::{Error, Partial, Result};
use crate::property::json::{as_object, as_str, field, hex_decode, hex_encode, name_from_json};
use crate::property::{PropertyList, PropertyRegistry};

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyBag {
    /// Class of the serialized object; doubles as the format tag.
    pub class_name: Name,
    pub properties: PropertyList,
    pub extra_data: Vec<u8>,
}

impl PropertyBag {
    pub fn new(class_name: Name) -> Self {
        Self { class_name, properties: PropertyList::new(), extra_data: Vec::new() }
    }

    pub fn read(data: &[u8], options: &ReadOptions) -> Result<Self> {
        Ok(Self::read_with_stats(data, options)?.0)
    }

    pub fn read_with_stats(data: &[u8], options: &ReadOptions) -> Result<(Self, ReadStats)> {
        let mut reader = options.reader(data);
        let class_name = reader.read_name().map_err(|err| match err {
            Error::Truncated { .. } | Error::CorruptData { .. } => Error::header(format!("bad bag class name: {err}")),
            other => other,
        })?;
        if class_name.text().is_empty() {
            return Err(Error::header("bag class name is empty"));
        }

        let Partial { value: properties, damage } = PropertyList::read_partial(&mut reader, options.property_registry());
        let extra_data = if damage.is_none() { reader.read_remaining().to_vec() } else { Vec::new() };
        let bag = options.accept(
            Partial { value: Self { class_name, properties, extra_data }, damage },
            "property bag",
        )?;
        debug!(class = %bag.class_name, properties = bag.properties.len(), "read property bag");
        Ok((bag, reader.stats()))
    }

    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        object.insert("class".into(), json!(self.class_name));
        object.insert("properties".into(), self.properties.to_json());
        if !self.extra_data.is_empty() {
            object.insert("extraData".into(), json!(hex_encode(&self.extra_data)));
        }
        Value::Object(object)
    }

    pub fn from_json(v: &Value, registry: &PropertyRegistry) -> Result<Self> {
        let object = as_object(v)?;
        let mut bag = Self::new(name_from_json(field(object, "class")?)?);
        bag.properties = PropertyList::from_json(field(object, "properties")?, registry)?;
        if let Some(extra) = object.get("extraData") {
            bag.extra_data = hex_decode(as_str(extra)?)?;
        }
        Ok(bag)
    }
}

impl SaveArchive for PropertyBag {
    type Layout = ();

    fn plan(&self) -> Result<Planned<()>> {
        let mode = NameMode::Legacy;
        let size = mode.name_size(&self.class_name) + self.properties.binary_size(&mode) + self.extra_data.len();
        Ok(Planned { size, layout: () })
    }

    fn write_planned(&self, _plan: &Planned<()>, writer: &mut ArchiveWriter) -> Result<()> {
        writer.write_name(&self.class_name)?;
        self.properties.write(writer)?;
        writer.write_bytes(&self.extra_data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::{Property, PropertyValue, StructValue};

    fn sample() -> PropertyBag {
        let mut bag = PropertyBag::new(Name::new("PrimalLocalProfile", 0));
        bag.properties.push(Property::new("PlayerName", PropertyValue::Str("Survivor".into())));
        bag.properties.push(Property::indexed("ColorSetIndices", 2, PropertyValue::Byte(7)));
        bag.properties.push(Property::new(
            "SavedLocation",
            PropertyValue::Struct {
                struct_type: Name::new("Vector", 0),
                value: StructValue::Vector { x: 1.0, y: 2.0, z: 3.0 },
            },
        ));
        bag.extra_data = vec![0, 0, 0, 0];
        bag
    }

    #[test]
    fn test_bag_roundtrip() {
        let bag = sample();
        let bytes = bag.to_bytes().unwrap();
        assert_eq!(bytes.len(), bag.calculate_size().unwrap());
        let back = PropertyBag::read(&bytes, &ReadOptions::default()).unwrap();
        assert_eq!(back, bag);
        assert_eq!(back.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_bag_json_roundtrip() {
        let bag = sample();
        let registry = PropertyRegistry::standard();
        let json = bag.to_json();
        assert_eq!(json["class"], json!("PrimalLocalProfile"));
        assert_eq!(PropertyBag::from_json(&json, &registry).unwrap(), bag);
    }

    #[test]
    fn test_truncated_bag() {
        let bytes = sample().to_bytes().unwrap();
        let cut = &bytes[..bytes.len() - 20];
        assert!(matches!(PropertyBag::read(cut, &ReadOptions::default()), Err(Error::Truncated { .. })));

        let partial = PropertyBag::read(cut, &ReadOptions::default().allow_broken(true)).unwrap();
        assert_eq!(partial.properties.len(), 2);
        assert!(partial.extra_data.is_empty());
    }

    #[test]
    fn test_bad_header() {
        assert!(matches!(PropertyBag::read(&[0xff, 0xff], &ReadOptions::default()), Err(Error::CorruptHeader { .. })));
        assert!(matches!(PropertyBag::read(&[0, 0, 0, 0], &ReadOptions::default()), Err(Error::CorruptHeader { .. })));
    }
}
