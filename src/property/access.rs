//! Typed property lookup

use super::{ArrayValue, ObjectReference, PropertyList, PropertyValue, StructValue};
use crate::codec::Name;
use crate::error::{Error, Result};

/// Conversion from a decoded value to a Rust type. Integer and float
/// targets accept narrower kinds of the same signedness.
pub trait FromPropertyValue: Sized {
    /// Label used in type-mismatch errors.
    const EXPECTED: &'static str;

    fn from_property_value(value: &PropertyValue) -> Option<Self>;
}

macro_rules! impl_from_value {
    ($ty:ty, $expected:literal, $($variant:ident),+) => {
        impl FromPropertyValue for $ty {
            const EXPECTED: &'static str = $expected;

            fn from_property_value(value: &PropertyValue) -> Option<Self> {
                match value {
                    $(PropertyValue::$variant(v) => Some(<$ty>::from(*v)),)+
                    _ => None,
                }
            }
        }
    };
}

impl_from_value!(bool, "bool", Bool);
impl_from_value!(i8, "i8", Int8);
impl_from_value!(u8, "u8", Byte);
impl_from_value!(i16, "i16", Int8, Int16);
impl_from_value!(u16, "u16", Byte, UInt16);
impl_from_value!(i32, "i32", Int8, Int16, Int);
impl_from_value!(u32, "u32", Byte, UInt16, UInt32);
impl_from_value!(i64, "i64", Int8, Int16, Int, Int64);
impl_from_value!(u64, "u64", Byte, UInt16, UInt32, UInt64);
impl_from_value!(f32, "f32", Float);
impl_from_value!(f64, "f64", Float, Double);

impl FromPropertyValue for String {
    const EXPECTED: &'static str = "string";

    fn from_property_value(value: &PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Str(s) => Some(s.clone()),
            PropertyValue::Name(name) => Some(name.to_string()),
            _ => None,
        }
    }
}

impl FromPropertyValue for Name {
    const EXPECTED: &'static str = "name";

    fn from_property_value(value: &PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Name(name) | PropertyValue::Enum { value: name, .. } => Some(name.clone()),
            _ => None,
        }
    }
}

impl FromPropertyValue for ObjectReference {
    const EXPECTED: &'static str = "object reference";

    fn from_property_value(value: &PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Object(reference) => Some(reference.clone()),
            _ => None,
        }
    }
}

impl FromPropertyValue for StructValue {
    const EXPECTED: &'static str = "struct";

    fn from_property_value(value: &PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Struct { value, .. } => Some(value.clone()),
            _ => None,
        }
    }
}

impl FromPropertyValue for ArrayValue {
    const EXPECTED: &'static str = "array";

    fn from_property_value(value: &PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Array(array) => Some(array.clone()),
            _ => None,
        }
    }
}

impl PropertyList {
    /// Value of the last `(name, index)` property. Absent is `Ok(None)`;
    /// present with an incompatible kind is [`Error::TypeMismatch`].
    pub fn value<T: FromPropertyValue>(&self, name: &str, index: i32) -> Result<Option<T>> {
        let Some(property) = self.find(name, index) else {
            return Ok(None);
        };
        T::from_property_value(&property.value).map(Some).ok_or_else(|| Error::TypeMismatch {
            property: name.to_string(),
            expected: T::EXPECTED,
            found: property.value.kind_label(),
        })
    }

    /// Like [`value`](Self::value), returning `default` when the property is
    /// absent or of another kind.
    pub fn value_or<T: FromPropertyValue>(&self, name: &str, index: i32, default: T) -> T {
        self.find(name, index)
            .and_then(|property| T::from_property_value(&property.value))
            .unwrap_or(default)
    }
}
