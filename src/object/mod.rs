pub mod collector;
pub mod container;
pub mod json;
pub mod table;

pub use collector::{Follow, ObjectCollector};
pub use container::GameObjectContainer;
pub use table::BlockLayout;

use indexmap::IndexMap;

use crate::codec::{CompositeName, Name};
use crate::error::Result;
use crate::property::{FromPropertyValue, ObjectReference, PropertyList};

/// Bucket of objects that do not come from a data file.
pub const SAVE_BUCKET: i32 = -1;

/// World position and rotation of an object.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LocationData {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
}

/// One node of the persisted object graph.
///
/// Objects live in a [`GameObjectContainer`]; `parent` and `components`
/// are indices into that container, filled in by
/// [`GameObjectContainer::build_tree`].
#[derive(Debug, Clone, PartialEq)]
pub struct GameObject {
    pub guid: [u8; 16],
    pub class_name: Name,
    /// Own name first, then the names of the owner chain.
    pub names: CompositeName,
    pub is_item: bool,
    pub from_data_file: bool,
    pub data_file_index: i32,
    pub location: Option<LocationData>,
    pub properties: PropertyList,
    /// False when the read filter rejected the object; such an object
    /// cannot be written back.
    pub properties_loaded: bool,
    /// Bytes between the end of the property list and the next block.
    pub extra_data: Vec<u8>,
    pub(crate) parent: Option<usize>,
    pub(crate) components: IndexMap<Name, usize>,
}

impl GameObject {
    pub fn new(class_name: Name, names: CompositeName) -> Self {
        Self {
            guid: [0; 16],
            class_name,
            names,
            is_item: false,
            from_data_file: false,
            data_file_index: 0,
            location: None,
            properties: PropertyList::new(),
            properties_loaded: true,
            extra_data: Vec::new(),
            parent: None,
            components: IndexMap::new(),
        }
    }

    /// Own name (first entry of the composite name).
    pub fn name(&self) -> Option<&Name> {
        self.names.first()
    }

    /// Data-file bucket used for duplicate detection and tree building.
    pub fn bucket(&self) -> i32 {
        if self.from_data_file {
            self.data_file_index
        } else {
            SAVE_BUCKET
        }
    }

    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    /// Components keyed by their own name, in attachment order.
    pub fn components(&self) -> &IndexMap<Name, usize> {
        &self.components
    }

    pub fn component(&self, name: &str) -> Option<usize> {
        self.components.get(&Name::parse(name)).copied()
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.properties.iter().any(|p| p.name.instance() == 0 && p.name.text() == name)
    }

    pub fn property_value<T: FromPropertyValue>(&self, name: &str, index: i32) -> Result<Option<T>> {
        self.properties.value(name, index)
    }

    pub fn property_value_or<T: FromPropertyValue>(&self, name: &str, index: i32, default: T) -> T {
        self.properties.value_or(name, index, default)
    }

    pub fn for_each_reference(&self, f: &mut dyn FnMut(&ObjectReference)) {
        self.properties.for_each_reference(f);
    }

    /// Report every name token of the table entry and property block.
    pub fn visit_names(&self, f: &mut dyn FnMut(&str, u32)) {
        f(self.class_name.text(), self.class_name.instance());
        for name in self.names.iter() {
            f(name.text(), name.instance());
        }
        self.properties.visit_names(f);
    }

    pub(crate) fn clear_links(&mut self) {
        self.parent = None;
        self.components.clear();
    }

    pub(crate) fn offset_links(&mut self, base: usize) {
        if let Some(parent) = self.parent.as_mut() {
            *parent += base;
        }
        for index in self.components.values_mut() {
            *index += base;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::{Property, PropertyValue};

    #[test]
    fn test_bucket() {
        let mut object = GameObject::new(Name::new("Foo_C", 0), CompositeName::single(Name::new("Foo_C", 1)));
        assert_eq!(object.bucket(), SAVE_BUCKET);
        object.from_data_file = true;
        object.data_file_index = 3;
        assert_eq!(object.bucket(), 3);
    }

    #[test]
    fn test_property_lookup() {
        let mut object = GameObject::new(Name::new("Foo_C", 0), CompositeName::single(Name::new("Foo_C", 1)));
        object.properties.push(Property::new("bFlag", PropertyValue::Bool(true)));
        assert!(object.has_property("bFlag"));
        assert_eq!(object.property_value::<bool>("bFlag", 0).unwrap(), Some(true));
        assert_eq!(object.property_value_or("Level", 0, 1i32), 1);
    }
}
