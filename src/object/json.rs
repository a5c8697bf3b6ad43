//! JSON projection of objects and containers

use indexmap::IndexMap;
use serde_json::{json, Map, Value};

use super::{GameObject, GameObjectContainer, LocationData};
use crate::codec::CompositeName;
use crate::error::{Error, Result};
use crate::property::json::{
    as_array, as_bool, as_object, as_str, field, float_from_json, float_to_json, hex_decode, hex_encode, int,
    name_from_json, uint,
};
use crate::property::{PropertyList, PropertyRegistry};

impl LocationData {
    pub fn to_json(&self) -> Value {
        let f = |v: f32| float_to_json(v as f64);
        json!({
            "x": f(self.x),
            "y": f(self.y),
            "z": f(self.z),
            "pitch": f(self.pitch),
            "yaw": f(self.yaw),
            "roll": f(self.roll),
        })
    }

    pub fn from_json(v: &Value) -> Result<Self> {
        let object = as_object(v)?;
        let f = |key: &str| -> Result<f32> { Ok(float_from_json(field(object, key)?)? as f32) };
        Ok(Self { x: f("x")?, y: f("y")?, z: f("z")?, pitch: f("pitch")?, yaw: f("yaw")?, roll: f("roll")? })
    }
}

pub(crate) fn guid_from_json(v: &Value) -> Result<[u8; 16]> {
    let bytes = hex_decode(as_str(v)?)?;
    <[u8; 16]>::try_from(bytes.as_slice()).map_err(|_| Error::json(format!("guid must be 16 bytes, found {}", bytes.len())))
}

impl GameObject {
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        object.insert("guid".into(), json!(hex_encode(&self.guid)));
        object.insert("class".into(), json!(self.class_name));
        object.insert("names".into(), json!(self.names.names()));
        object.insert("isItem".into(), json!(self.is_item));
        object.insert("fromDataFile".into(), json!(self.from_data_file));
        object.insert("dataFileIndex".into(), json!(self.data_file_index));
        if let Some(location) = &self.location {
            object.insert("location".into(), location.to_json());
        }
        if !self.properties_loaded {
            object.insert("propertiesLoaded".into(), json!(false));
        }
        object.insert("properties".into(), self.properties.to_json());
        if !self.extra_data.is_empty() {
            object.insert("extraData".into(), json!(hex_encode(&self.extra_data)));
        }
        if let Some(parent) = self.parent {
            object.insert("parent".into(), json!(parent));
        }
        if !self.components.is_empty() {
            let components: Vec<Value> = self.components.iter().map(|(name, index)| json!([name, index])).collect();
            object.insert("components".into(), Value::Array(components));
        }
        Value::Object(object)
    }

    pub fn from_json(v: &Value, registry: &PropertyRegistry) -> Result<Self> {
        let object = as_object(v)?;
        let names = as_array(field(object, "names")?)?.iter().map(name_from_json).collect::<Result<Vec<_>>>()?;
        let mut result = GameObject::new(name_from_json(field(object, "class")?)?, CompositeName::new(names));
        if let Some(guid) = object.get("guid") {
            result.guid = guid_from_json(guid)?;
        }
        result.is_item = object.get("isItem").map(as_bool).transpose()?.unwrap_or(false);
        result.from_data_file = object.get("fromDataFile").map(as_bool).transpose()?.unwrap_or(false);
        result.data_file_index = object.get("dataFileIndex").map(int).transpose()?.unwrap_or(0);
        result.location = object.get("location").map(LocationData::from_json).transpose()?;
        result.properties_loaded = object.get("propertiesLoaded").map(as_bool).transpose()?.unwrap_or(true);
        result.properties = match object.get("properties") {
            Some(properties) => PropertyList::from_json(properties, registry)?,
            None => PropertyList::new(),
        };
        if let Some(extra) = object.get("extraData") {
            result.extra_data = hex_decode(as_str(extra)?)?;
        }
        result.parent = object.get("parent").map(uint).transpose()?;
        if let Some(components) = object.get("components") {
            let mut map = IndexMap::new();
            for pair in as_array(components)? {
                match pair.as_array().map(Vec::as_slice) {
                    Some([name, index]) => {
                        map.insert(name_from_json(name)?, uint(index)?);
                    }
                    _ => return Err(Error::json(format!("expected [name, index] component pair, found {pair}"))),
                }
            }
            result.components = map;
        }
        Ok(result)
    }
}

impl GameObjectContainer {
    pub fn to_json(&self) -> Value {
        Value::Array(self.iter().map(GameObject::to_json).collect())
    }

    /// Decode objects and check that component links stay inside the
    /// container.
    pub fn from_json(v: &Value, registry: &PropertyRegistry) -> Result<Self> {
        let objects = as_array(v)?
            .iter()
            .map(|o| GameObject::from_json(o, registry))
            .collect::<Result<Vec<_>>>()?;
        let len = objects.len();
        for object in &objects {
            let links = object.parent.into_iter().chain(object.components.values().copied());
            for index in links {
                if index >= len {
                    return Err(Error::BrokenReference { index: index as i64, len });
                }
            }
        }
        Ok(Self::from_objects(objects))
    }
}
