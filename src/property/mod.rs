//! Property value model
//!
//! A property is a named, typed value with a static-array index. Kinds form
//! a closed set ([`PropertyKind`]); values of an unknown kind are kept as
//! [`RawProperty`] so they survive a read/write cycle untouched.

pub mod access;
pub mod array;
pub mod binary;
pub mod json;
pub mod registry;
pub mod structs;

use std::ops::Deref;

use serde::{Deserialize, Serialize};

use crate::codec::Name;
use crate::error::Result;

pub use access::FromPropertyValue;
pub use array::ArrayValue;
pub use binary::PropertyRead;
pub use registry::{PropertyRegistry, PropertyRegistryBuilder};
pub use structs::{StructKind, StructValue};

/// Closed set of property kinds, keyed by their type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    Bool,
    Byte,
    Int8,
    Int16,
    Int,
    Int64,
    UInt16,
    UInt32,
    UInt64,
    Float,
    Double,
    Str,
    Name,
    Object,
    Struct,
    Array,
}

impl PropertyKind {
    pub const ALL: [PropertyKind; 16] = [
        Self::Bool,
        Self::Byte,
        Self::Int8,
        Self::Int16,
        Self::Int,
        Self::Int64,
        Self::UInt16,
        Self::UInt32,
        Self::UInt64,
        Self::Float,
        Self::Double,
        Self::Str,
        Self::Name,
        Self::Object,
        Self::Struct,
        Self::Array,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            Self::Bool => "BoolProperty",
            Self::Byte => "ByteProperty",
            Self::Int8 => "Int8Property",
            Self::Int16 => "Int16Property",
            Self::Int => "IntProperty",
            Self::Int64 => "Int64Property",
            Self::UInt16 => "UInt16Property",
            Self::UInt32 => "UInt32Property",
            Self::UInt64 => "UInt64Property",
            Self::Float => "FloatProperty",
            Self::Double => "DoubleProperty",
            Self::Str => "StrProperty",
            Self::Name => "NameProperty",
            Self::Object => "ObjectProperty",
            Self::Struct => "StructProperty",
            Self::Array => "ArrayProperty",
        }
    }
}

/// Reference from a property to another object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ObjectReference {
    Null,
    /// Index into the object table of the archive (or island) that
    /// produced it.
    Id(i32),
    /// Path to a class or asset outside the save.
    Path(Name),
}

impl ObjectReference {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn index(&self) -> Option<i32> {
        match self {
            Self::Id(index) => Some(*index),
            _ => None,
        }
    }
}

/// Decoded property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Int8(i8),
    /// Plain byte (`ByteProperty` whose enum type is `None`).
    Byte(u8),
    /// Enum value stored as a name (`ByteProperty` with an enum type).
    Enum { enum_type: Name, value: Name },
    Int16(i16),
    UInt16(u16),
    Int(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float(f32),
    Double(f64),
    Str(String),
    Name(Name),
    Object(ObjectReference),
    Struct { struct_type: Name, value: StructValue },
    Array(ArrayValue),
}

impl PropertyValue {
    pub fn kind(&self) -> PropertyKind {
        match self {
            Self::Bool(_) => PropertyKind::Bool,
            Self::Int8(_) => PropertyKind::Int8,
            Self::Byte(_) | Self::Enum { .. } => PropertyKind::Byte,
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
            Self::Struct { .. } => PropertyKind::Struct,
            Self::Array(_) => PropertyKind::Array,
        }
    }

    /// Short label used in type-mismatch errors.
    pub fn kind_label(&self) -> &'static str {
        self.kind().tag()
    }

    pub fn for_each_reference(&self, f: &mut dyn FnMut(&ObjectReference)) {
        match self {
            Self::Object(reference) => f(reference),
            Self::Struct { value, .. } => value.for_each_reference(f),
            Self::Array(array) => array.for_each_reference(f),
            _ => {}
        }
    }

    pub fn try_for_each_reference_mut(
        &mut self,
        f: &mut dyn FnMut(&mut ObjectReference) -> Result<()>,
    ) -> Result<()> {
        match self {
            Self::Object(reference) => f(reference),
            Self::Struct { value, .. } => value.try_for_each_reference_mut(f),
            Self::Array(array) => array.try_for_each_reference_mut(f),
            _ => Ok(()),
        }
    }
}

/// One named, typed, optionally array-indexed value.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: Name,
    /// Static-array index; disambiguates elements of a fixed-size array
    /// that share one name.
    pub index: i32,
    pub value: PropertyValue,
}

impl Property {
    pub fn new(name: impl Into<Name>, value: PropertyValue) -> Self {
        Self { name: name.into(), index: 0, value }
    }

    pub fn indexed(name: impl Into<Name>, index: i32, value: PropertyValue) -> Self {
        Self { name: name.into(), index, value }
    }

    pub fn kind(&self) -> PropertyKind {
        self.value.kind()
    }
}

/// Header field that some kinds carry between the index and the payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TypeArgument {
    #[default]
    None,
    /// Enum type, struct type or array element type.
    Name(Name),
    /// Value byte of a `BoolProperty`.
    Bool(u8),
}

/// A property whose kind is unknown, or whose payload did not decode,
/// preserved byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawProperty {
    pub name: Name,
    pub type_name: Name,
    pub index: i32,
    pub type_argument: TypeArgument,
    pub data: Vec<u8>,
}

/// A raw property and the position it held in its list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedProperty {
    /// Number of decoded properties that preceded it.
    pub position: usize,
    pub raw: RawProperty,
}

/// Entry of a property list in file order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ListEntry<'a> {
    Property(&'a Property),
    Skipped(&'a RawProperty),
}

/// Ordered property sequence. Decoded properties are exposed as a slice;
/// skipped raw properties are kept aside with their positions so the list
/// is written back in its original order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PropertyList {
    properties: Vec<Property>,
    skipped: Vec<SkippedProperty>,
}

impl PropertyList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_properties(properties: Vec<Property>) -> Self {
        Self { properties, skipped: Vec::new() }
    }

    pub fn push(&mut self, property: Property) {
        self.properties.push(property);
    }

    /// Record a raw property at the current end of the list.
    pub fn push_skipped(&mut self, raw: RawProperty) {
        self.skipped.push(SkippedProperty { position: self.properties.len(), raw });
    }

    pub fn skipped(&self) -> &[SkippedProperty] {
        &self.skipped
    }

    pub fn as_mut_slice(&mut self) -> &mut [Property] {
        &mut self.properties
    }

    /// Every entry, decoded or raw, in file order.
    pub fn entries(&self) -> Vec<ListEntry<'_>> {
        let mut out = Vec::with_capacity(self.properties.len() + self.skipped.len());
        let mut skipped = self.skipped.iter().peekable();
        for (i, property) in self.properties.iter().enumerate() {
            while let Some(s) = skipped.next_if(|s| s.position <= i) {
                out.push(ListEntry::Skipped(&s.raw));
            }
            out.push(ListEntry::Property(property));
        }
        out.extend(skipped.map(|s| ListEntry::Skipped(&s.raw)));
        out
    }

    /// Last property matching `(name, index)`. Naive updaters append
    /// instead of replacing, so the last occurrence wins.
    pub fn find(&self, name: &str, index: i32) -> Option<&Property> {
        self.properties
            .iter()
            .rev()
            .find(|p| p.index == index && p.name.instance() == 0 && p.name.text() == name)
    }

    pub fn find_name(&self, name: &Name, index: i32) -> Option<&Property> {
        self.properties.iter().rev().find(|p| p.index == index && &p.name == name)
    }

    pub fn find_mut(&mut self, name: &str, index: i32) -> Option<&mut Property> {
        self.properties
            .iter_mut()
            .rev()
            .find(|p| p.index == index && p.name.instance() == 0 && p.name.text() == name)
    }

    /// Replace the last matching property's value, or append a new one.
    pub fn set(&mut self, name: &str, index: i32, value: PropertyValue) {
        match self.find_mut(name, index) {
            Some(property) => property.value = value,
            None => self.push(Property::indexed(Name::new(name, 0), index, value)),
        }
    }

    /// Remove every property matching `(name, index)`; returns how many.
    pub fn remove(&mut self, name: &str, index: i32) -> usize {
        let mut removed = 0;
        let mut i = 0;
        while i < self.properties.len() {
            let p = &self.properties[i];
            if p.index == index && p.name.instance() == 0 && p.name.text() == name {
                self.properties.remove(i);
                for s in &mut self.skipped {
                    if s.position > i {
                        s.position -= 1;
                    }
                }
                removed += 1;
            } else {
                i += 1;
            }
        }
        removed
    }

    pub fn for_each_reference(&self, f: &mut dyn FnMut(&ObjectReference)) {
        for property in &self.properties {
            property.value.for_each_reference(f);
        }
    }

    pub fn try_for_each_reference_mut(
        &mut self,
        f: &mut dyn FnMut(&mut ObjectReference) -> Result<()>,
    ) -> Result<()> {
        for property in &mut self.properties {
            property.value.try_for_each_reference_mut(f)?;
        }
        Ok(())
    }
}

impl Deref for PropertyList {
    type Target = [Property];

    fn deref(&self) -> &[Property] {
        &self.properties
    }
}

impl From<Vec<Property>> for PropertyList {
    fn from(properties: Vec<Property>) -> Self {
        Self::from_properties(properties)
    }
}

impl FromIterator<Property> for PropertyList {
    fn from_iter<I: IntoIterator<Item = Property>>(iter: I) -> Self {
        Self::from_properties(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(name: &str) -> RawProperty {
        RawProperty {
            name: Name::new(name, 0),
            type_name: Name::new("MysteryProperty", 0),
            index: 0,
            type_argument: TypeArgument::None,
            data: vec![1, 2, 3],
        }
    }

    #[test]
    fn test_find_returns_last_match() {
        let list: PropertyList = vec![
            Property::new("Level", PropertyValue::Int(1)),
            Property::indexed("Level", 1, PropertyValue::Int(7)),
            Property::new("Level", PropertyValue::Int(2)),
        ]
        .into();
        assert_eq!(list.find("Level", 0).map(|p| &p.value), Some(&PropertyValue::Int(2)));
        assert_eq!(list.find("Level", 1).map(|p| &p.value), Some(&PropertyValue::Int(7)));
        assert!(list.find("Level", 2).is_none());
    }

    #[test]
    fn test_entries_keep_file_order() {
        let mut list = PropertyList::new();
        list.push_skipped(raw("First"));
        list.push(Property::new("A", PropertyValue::Bool(true)));
        list.push_skipped(raw("Middle"));
        list.push(Property::new("B", PropertyValue::Bool(false)));
        list.push_skipped(raw("Last"));

        let order: Vec<String> = list
            .entries()
            .iter()
            .map(|e| match e {
                ListEntry::Property(p) => p.name.to_string(),
                ListEntry::Skipped(r) => r.name.to_string(),
            })
            .collect();
        assert_eq!(order, vec!["First", "A", "Middle", "B", "Last"]);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_remove_shifts_skipped_positions() {
        let mut list = PropertyList::new();
        list.push(Property::new("A", PropertyValue::Int(1)));
        list.push(Property::new("B", PropertyValue::Int(2)));
        list.push_skipped(raw("X"));
        assert_eq!(list.remove("A", 0), 1);
        assert_eq!(list.skipped()[0].position, 1);
    }

    #[test]
    fn test_set_replaces_or_appends() {
        let mut list = PropertyList::new();
        list.set("bFlag", 0, PropertyValue::Bool(false));
        list.set("bFlag", 0, PropertyValue::Bool(true));
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].value, PropertyValue::Bool(true));
    }
}
