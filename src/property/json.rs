//! JSON projection of properties
//!
//! A property list is a JSON array in file order. Each entry is an object
//! with `name`, `type`, `index` (omitted when 0) and `value`; kinds with a
//! header argument add `enum`, `structType` or `arrayType`. Skipped raw
//! entries keep their position and carry their payload as hex in `raw`.

use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::structs::{StructKind, StructValue};
use super::{
    ArrayValue, ListEntry, ObjectReference, Property, PropertyKind, PropertyList, PropertyRegistry,
    PropertyValue, RawProperty, TypeArgument,
};
use crate::codec::Name;
use crate::error::{Error, Result};

pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(DIGITS[(b >> 4) as usize] as char);
        out.push(DIGITS[(b & 0x0f) as usize] as char);
    }
    out
}

pub(crate) fn hex_decode(s: &str) -> Result<Vec<u8>> {
    if s.len() % 2 != 0 {
        return Err(Error::json(format!("odd-length hex string of {} digits", s.len())));
    }
    s.as_bytes()
        .chunks_exact(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|digits| u8::from_str_radix(digits, 16).ok())
                .ok_or_else(|| Error::json(format!("invalid hex digits {:?}", String::from_utf8_lossy(pair))))
        })
        .collect()
}

/// Finite floats are numbers; non-finite ones are the strings `NaN`,
/// `inf` and `-inf`.
pub(crate) fn float_to_json(v: f64) -> Value {
    if v.is_nan() {
        Value::from("NaN")
    } else if v.is_infinite() {
        Value::from(if v > 0.0 { "inf" } else { "-inf" })
    } else {
        json!(v)
    }
}

pub(crate) fn float_from_json(v: &Value) -> Result<f64> {
    match v {
        Value::String(s) => match s.as_str() {
            "NaN" => Ok(f64::NAN),
            "inf" => Ok(f64::INFINITY),
            "-inf" => Ok(f64::NEG_INFINITY),
            other => Err(Error::json(format!("expected number, found string {other:?}"))),
        },
        _ => v.as_f64().ok_or_else(|| Error::json(format!("expected number, found {v}"))),
    }
}

pub(crate) fn name_from_json(v: &Value) -> Result<Name> {
    Ok(Name::deserialize(v)?)
}

pub(crate) fn field<'a>(object: &'a Map<String, Value>, key: &str) -> Result<&'a Value> {
    object.get(key).ok_or_else(|| Error::json(format!("missing field {key:?}")))
}

pub(crate) fn as_object(v: &Value) -> Result<&Map<String, Value>> {
    v.as_object().ok_or_else(|| Error::json(format!("expected object, found {v}")))
}

pub(crate) fn as_array(v: &Value) -> Result<&Vec<Value>> {
    v.as_array().ok_or_else(|| Error::json(format!("expected array, found {v}")))
}

pub(crate) fn as_str(v: &Value) -> Result<&str> {
    v.as_str().ok_or_else(|| Error::json(format!("expected string, found {v}")))
}

pub(crate) fn as_bool(v: &Value) -> Result<bool> {
    v.as_bool().ok_or_else(|| Error::json(format!("expected boolean, found {v}")))
}

pub(crate) fn int<T: TryFrom<i64>>(v: &Value) -> Result<T> {
    v.as_i64()
        .and_then(|n| T::try_from(n).ok())
        .ok_or_else(|| Error::json(format!("integer out of range: {v}")))
}

pub(crate) fn uint<T: TryFrom<u64>>(v: &Value) -> Result<T> {
    v.as_u64()
        .and_then(|n| T::try_from(n).ok())
        .ok_or_else(|| Error::json(format!("unsigned integer out of range: {v}")))
}

fn reference_from_json(v: &Value) -> Result<ObjectReference> {
    Ok(ObjectReference::deserialize(v)?)
}

impl StructValue {
    pub fn to_json(&self) -> Value {
        let f = |v: f32| float_to_json(v as f64);
        match self {
            Self::Vector { x, y, z } => json!({ "x": f(*x), "y": f(*y), "z": f(*z) }),
            Self::Vector2D { x, y } => json!({ "x": f(*x), "y": f(*y) }),
            Self::Quat { x, y, z, w } => json!({ "x": f(*x), "y": f(*y), "z": f(*z), "w": f(*w) }),
            Self::Rotator { pitch, yaw, roll } => {
                json!({ "pitch": f(*pitch), "yaw": f(*yaw), "roll": f(*roll) })
            }
            Self::Color { b, g, r, a } => json!({ "r": r, "g": g, "b": b, "a": a }),
            Self::LinearColor { r, g, b, a } => json!({ "r": f(*r), "g": f(*g), "b": f(*b), "a": f(*a) }),
            Self::UniqueNetId { unknown, net_id } => json!({ "unknown": unknown, "netId": net_id }),
            Self::Properties(list) => list.to_json(),
            Self::Opaque(data) => json!({ "raw": hex_encode(data) }),
        }
    }

    pub fn from_json(kind: StructKind, v: &Value, registry: &PropertyRegistry) -> Result<Self> {
        if v.is_array() {
            return Ok(Self::Properties(PropertyList::from_json(v, registry)?));
        }
        let object = as_object(v)?;
        if let Some(raw) = object.get("raw") {
            return Ok(Self::Opaque(hex_decode(as_str(raw)?)?));
        }

        let f = |key: &str| -> Result<f32> { Ok(float_from_json(field(object, key)?)? as f32) };
        let byte = |key: &str| -> Result<u8> { uint(field(object, key)?) };
        Ok(match kind {
            StructKind::Vector => Self::Vector { x: f("x")?, y: f("y")?, z: f("z")? },
            StructKind::Vector2D => Self::Vector2D { x: f("x")?, y: f("y")? },
            StructKind::Quat => Self::Quat { x: f("x")?, y: f("y")?, z: f("z")?, w: f("w")? },
            StructKind::Rotator => Self::Rotator { pitch: f("pitch")?, yaw: f("yaw")?, roll: f("roll")? },
            StructKind::Color => Self::Color { b: byte("b")?, g: byte("g")?, r: byte("r")?, a: byte("a")? },
            StructKind::LinearColor => Self::LinearColor { r: f("r")?, g: f("g")?, b: f("b")?, a: f("a")? },
            StructKind::UniqueNetId => Self::UniqueNetId {
                unknown: int(field(object, "unknown")?)?,
                net_id: as_str(field(object, "netId")?)?.to_string(),
            },
            StructKind::Properties => {
                return Err(Error::json(format!("expected property list or raw bytes, found {v}")));
            }
        })
    }
}

impl ArrayValue {
    pub fn to_json(&self) -> Value {
        fn list<T>(items: &[T], f: impl Fn(&T) -> Value) -> Value {
            Value::Array(items.iter().map(f).collect())
        }
        match self {
            Self::Bool(v) => list(v, |b| json!(b)),
            Self::Int8(v) => list(v, |n| json!(n)),
            Self::Byte(v) => list(v, |n| json!(n)),
            Self::Enum(v) | Self::Name(v) => list(v, |n| json!(n)),
            Self::Int16(v) => list(v, |n| json!(n)),
            Self::UInt16(v) => list(v, |n| json!(n)),
            Self::Int(v) => list(v, |n| json!(n)),
            Self::UInt32(v) => list(v, |n| json!(n)),
            Self::Int64(v) => list(v, |n| json!(n)),
            Self::UInt64(v) => list(v, |n| json!(n)),
            Self::Float(v) => list(v, |x| float_to_json(*x as f64)),
            Self::Double(v) => list(v, |x| float_to_json(*x)),
            Self::Str(v) => list(v, |s| json!(s)),
            Self::Object(v) => list(v, |r| json!(r)),
            Self::Struct(v) => list(v, StructValue::to_json),
        }
    }

    /// Decode elements of `element_kind`. `enum_names` selects enum-name
    /// elements for byte arrays; `struct_kind` is the element layout of
    /// struct arrays.
    pub fn from_json(
        element_kind: PropertyKind,
        enum_names: bool,
        struct_kind: StructKind,
        v: &Value,
        registry: &PropertyRegistry,
    ) -> Result<Self> {
        let items = as_array(v)?;
        fn each<T>(items: &[Value], f: impl Fn(&Value) -> Result<T>) -> Result<Vec<T>> {
            items.iter().map(f).collect()
        }
        Ok(match element_kind {
            PropertyKind::Bool => Self::Bool(each(items, as_bool)?),
            PropertyKind::Int8 => Self::Int8(each(items, int)?),
            PropertyKind::Byte if enum_names => Self::Enum(each(items, name_from_json)?),
            PropertyKind::Byte => Self::Byte(each(items, uint)?),
            PropertyKind::Int16 => Self::Int16(each(items, int)?),
            PropertyKind::UInt16 => Self::UInt16(each(items, uint)?),
            PropertyKind::Int => Self::Int(each(items, int)?),
            PropertyKind::UInt32 => Self::UInt32(each(items, uint)?),
            PropertyKind::Int64 => Self::Int64(each(items, int)?),
            PropertyKind::UInt64 => Self::UInt64(each(items, uint)?),
            PropertyKind::Float => Self::Float(each(items, |x| Ok(float_from_json(x)? as f32))?),
            PropertyKind::Double => Self::Double(each(items, float_from_json)?),
            PropertyKind::Str => Self::Str(each(items, |s| Ok(as_str(s)?.to_string()))?),
            PropertyKind::Name => Self::Name(each(items, name_from_json)?),
            PropertyKind::Object => Self::Object(each(items, reference_from_json)?),
            PropertyKind::Struct => {
                Self::Struct(each(items, |s| StructValue::from_json(struct_kind, s, registry))?)
            }
            PropertyKind::Array => return Err(Error::json("nested arrays are not supported")),
        })
    }
}

impl PropertyValue {
    pub fn to_json(&self) -> Value {
        match self {
            Self::Bool(v) => json!(v),
            Self::Int8(v) => json!(v),
            Self::Byte(v) => json!(v),
            Self::Enum { value, .. } => json!(value),
            Self::Int16(v) => json!(v),
            Self::UInt16(v) => json!(v),
            Self::Int(v) => json!(v),
            Self::UInt32(v) => json!(v),
            Self::Int64(v) => json!(v),
            Self::UInt64(v) => json!(v),
            Self::Float(v) => float_to_json(*v as f64),
            Self::Double(v) => float_to_json(*v),
            Self::Str(v) => json!(v),
            Self::Name(v) => json!(v),
            Self::Object(v) => json!(v),
            Self::Struct { value, .. } => value.to_json(),
            Self::Array(array) => array.to_json(),
        }
    }
}

impl Property {
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        object.insert("name".into(), json!(self.name));
        object.insert("type".into(), json!(self.kind().tag()));
        if self.index != 0 {
            object.insert("index".into(), json!(self.index));
        }
        match &self.value {
            PropertyValue::Enum { enum_type, .. } => {
                object.insert("enum".into(), json!(enum_type));
            }
            PropertyValue::Struct { struct_type, .. } => {
                object.insert("structType".into(), json!(struct_type));
            }
            PropertyValue::Array(array) => {
                object.insert("arrayType".into(), json!(array.element_kind().tag()));
                match array {
                    ArrayValue::Enum(_) => {
                        object.insert("enum".into(), json!(true));
                    }
                    ArrayValue::Struct(items) => {
                        let kind = items.first().map_or(StructKind::Properties, StructValue::kind);
                        object.insert("structType".into(), json!(kind.type_name()));
                    }
                    _ => {}
                }
            }
            _ => {}
        }
        object.insert("value".into(), self.value.to_json());
        Value::Object(object)
    }

    pub fn from_json(v: &Value, registry: &PropertyRegistry) -> Result<Self> {
        let object = as_object(v)?;
        let name = name_from_json(field(object, "name")?)?;
        let tag = as_str(field(object, "type")?)?;
        let kind = registry
            .kind(tag)
            .ok_or_else(|| Error::json(format!("property {name}: unknown type {tag:?}")))?;
        let index = object.get("index").map(int).transpose()?.unwrap_or(0);
        let value = field(object, "value")?;

        let value = match kind {
            PropertyKind::Bool => PropertyValue::Bool(as_bool(value)?),
            PropertyKind::Byte => match object.get("enum") {
                Some(enum_type) => PropertyValue::Enum {
                    enum_type: name_from_json(enum_type)?,
                    value: name_from_json(value)?,
                },
                None => PropertyValue::Byte(uint(value)?),
            },
            PropertyKind::Int8 => PropertyValue::Int8(int(value)?),
            PropertyKind::Int16 => PropertyValue::Int16(int(value)?),
            PropertyKind::Int => PropertyValue::Int(int(value)?),
            PropertyKind::Int64 => PropertyValue::Int64(int(value)?),
            PropertyKind::UInt16 => PropertyValue::UInt16(uint(value)?),
            PropertyKind::UInt32 => PropertyValue::UInt32(uint(value)?),
            PropertyKind::UInt64 => PropertyValue::UInt64(uint(value)?),
            PropertyKind::Float => PropertyValue::Float(float_from_json(value)? as f32),
            PropertyKind::Double => PropertyValue::Double(float_from_json(value)?),
            PropertyKind::Str => PropertyValue::Str(as_str(value)?.to_string()),
            PropertyKind::Name => PropertyValue::Name(name_from_json(value)?),
            PropertyKind::Object => PropertyValue::Object(reference_from_json(value)?),
            PropertyKind::Struct => {
                let struct_type = name_from_json(field(object, "structType")?)?;
                let struct_kind = registry.struct_kind(struct_type.text());
                let value = StructValue::from_json(struct_kind, value, registry)?;
                PropertyValue::Struct { struct_type, value }
            }
            PropertyKind::Array => {
                let element_tag = as_str(field(object, "arrayType")?)?;
                let element_kind = registry
                    .kind(element_tag)
                    .ok_or_else(|| Error::json(format!("property {name}: unknown element type {element_tag:?}")))?;
                let enum_names = object.get("enum").and_then(Value::as_bool).unwrap_or(false);
                let struct_kind = object
                    .get("structType")
                    .and_then(Value::as_str)
                    .and_then(StructKind::from_type_name)
                    .unwrap_or(StructKind::Properties);
                PropertyValue::Array(ArrayValue::from_json(
                    element_kind,
                    enum_names,
                    struct_kind,
                    value,
                    registry,
                )?)
            }
        };
        Ok(Property { name, index, value })
    }
}

impl RawProperty {
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        object.insert("name".into(), json!(self.name));
        object.insert("type".into(), json!(self.type_name));
        if self.index != 0 {
            object.insert("index".into(), json!(self.index));
        }
        match &self.type_argument {
            TypeArgument::None => {}
            TypeArgument::Name(argument) => {
                object.insert("typeArgument".into(), json!(argument));
            }
            TypeArgument::Bool(value) => {
                object.insert("typeArgument".into(), json!(value));
            }
        }
        object.insert("raw".into(), json!(hex_encode(&self.data)));
        Value::Object(object)
    }

    pub fn from_json(v: &Value) -> Result<Self> {
        let object = as_object(v)?;
        let type_argument = match object.get("typeArgument") {
            None => TypeArgument::None,
            Some(n @ Value::Number(_)) => TypeArgument::Bool(uint(n)?),
            Some(argument) => TypeArgument::Name(name_from_json(argument)?),
        };
        Ok(RawProperty {
            name: name_from_json(field(object, "name")?)?,
            type_name: name_from_json(field(object, "type")?)?,
            index: object.get("index").map(int).transpose()?.unwrap_or(0),
            type_argument,
            data: hex_decode(as_str(field(object, "raw")?)?)?,
        })
    }
}

impl PropertyList {
    pub fn to_json(&self) -> Value {
        Value::Array(
            self.entries()
                .into_iter()
                .map(|entry| match entry {
                    ListEntry::Property(property) => property.to_json(),
                    ListEntry::Skipped(raw) => raw.to_json(),
                })
                .collect(),
        )
    }

    pub fn from_json(v: &Value, registry: &PropertyRegistry) -> Result<Self> {
        let mut list = PropertyList::new();
        for entry in as_array(v)? {
            if entry.get("raw").is_some() {
                list.push_skipped(RawProperty::from_json(entry)?);
            } else {
                list.push(Property::from_json(entry, registry)?);
            }
        }
        Ok(list)
    }
}
