//! Object container: indexed storage, reference resolution, duplicate
//! detection and component trees.

use std::ops::{Index, IndexMut};

use ahash::AHashMap;
use tracing::debug;

use super::GameObject;
use crate::codec::{CompositeName, Name};
use crate::error::{Error, Result};
use crate::property::ObjectReference;

/// Indexable object sequence plus a per-bucket duplicate-detection map.
///
/// For each data-file bucket the map holds the first object read under a
/// composite name; later objects with the same name are only reachable by
/// iterating the sequence.
#[derive(Debug, Clone, Default)]
pub struct GameObjectContainer {
    objects: Vec<GameObject>,
    object_map: AHashMap<i32, AHashMap<CompositeName, usize>>,
}

impl GameObjectContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_objects(objects: Vec<GameObject>) -> Self {
        let mut container = Self::new();
        container.objects.reserve(objects.len());
        for object in objects {
            container.push(object);
        }
        container
    }

    /// Append an object and return its index.
    pub fn push(&mut self, object: GameObject) -> usize {
        let index = self.objects.len();
        self.object_map
            .entry(object.bucket())
            .or_default()
            .entry(object.names.clone())
            .or_insert(index);
        self.objects.push(object);
        index
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&GameObject> {
        self.objects.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut GameObject> {
        self.objects.get_mut(index)
    }

    pub fn objects(&self) -> &[GameObject] {
        &self.objects
    }

    pub fn iter(&self) -> std::slice::Iter<'_, GameObject> {
        self.objects.iter()
    }

    pub fn into_objects(self) -> Vec<GameObject> {
        self.objects
    }

    /// Authoritative object for `names` in `bucket`.
    pub fn lookup(&self, bucket: i32, names: &CompositeName) -> Option<usize> {
        self.object_map.get(&bucket)?.get(names).copied()
    }

    /// Index an `Id` reference points at. `Null` and `Path` references
    /// resolve to `None`; an index outside the container is an error.
    pub fn resolve_index(&self, reference: &ObjectReference) -> Result<Option<usize>> {
        match reference {
            ObjectReference::Null | ObjectReference::Path(_) => Ok(None),
            ObjectReference::Id(id) => match usize::try_from(*id) {
                Ok(index) if index < self.objects.len() => Ok(Some(index)),
                _ => Err(Error::BrokenReference { index: i64::from(*id), len: self.objects.len() }),
            },
        }
    }

    pub fn resolve(&self, reference: &ObjectReference) -> Result<Option<&GameObject>> {
        Ok(self.resolve_index(reference)?.map(|index| &self.objects[index]))
    }

    /// Check that every `Id` reference of every object resolves.
    pub fn validate_references(&self) -> Result<()> {
        let mut broken = None;
        for object in &self.objects {
            object.for_each_reference(&mut |reference| {
                if broken.is_none() {
                    if let Err(err) = self.resolve_index(reference) {
                        broken = Some(err);
                    }
                }
            });
            if let Some(err) = broken.take() {
                return Err(err);
            }
        }
        Ok(())
    }

    pub fn parent_of(&self, index: usize) -> Option<&GameObject> {
        self.objects.get(index)?.parent.map(|parent| &self.objects[parent])
    }

    pub fn components_of(&self, index: usize) -> impl Iterator<Item = (&Name, &GameObject)> + '_ {
        self.objects
            .get(index)
            .into_iter()
            .flat_map(move |object| object.components.iter().map(move |(name, &i)| (name, &self.objects[i])))
    }

    /// Objects without a parent, in container order.
    pub fn top_level(&self) -> impl Iterator<Item = (usize, &GameObject)> + '_ {
        self.objects.iter().enumerate().filter(|(_, object)| object.parent.is_none())
    }

    /// Attach every object whose owner names match another object in the
    /// same bucket to that object's components. Stale links are cleared
    /// first. When two components share a key the first one stays.
    /// Returns the number of objects attached.
    pub fn build_tree(&mut self) -> usize {
        for object in &mut self.objects {
            object.clear_links();
        }

        let mut links = Vec::new();
        for (child, object) in self.objects.iter().enumerate() {
            let (Some(owner), Some(own_name)) = (object.names.parent(), object.names.first()) else {
                continue;
            };
            if let Some(parent) = self.lookup(object.bucket(), &owner) {
                if parent != child {
                    links.push((child, parent, own_name.clone()));
                }
            }
        }

        let mut attached = 0;
        let mut duplicates = 0;
        for (child, parent, key) in links {
            let components = &mut self.objects[parent].components;
            if components.contains_key(&key) {
                duplicates += 1;
                continue;
            }
            components.insert(key, child);
            self.objects[child].parent = Some(parent);
            attached += 1;
        }
        debug!(attached, duplicates, objects = self.objects.len(), "built component tree");
        attached
    }

    /// Append `island`, renumbering its internal references by the current
    /// length. Returns the base index the island starts at.
    pub fn merge_island(&mut self, island: GameObjectContainer) -> Result<usize> {
        let base = self.objects.len();
        let island_len = island.len();
        let mut objects = island.into_objects();
        for object in &mut objects {
            object.properties.try_for_each_reference_mut(&mut |reference| {
                if let ObjectReference::Id(id) = reference {
                    match usize::try_from(*id) {
                        Ok(index) if index < island_len => *id = (base + index) as i32,
                        _ => return Err(Error::BrokenReference { index: i64::from(*id), len: island_len }),
                    }
                }
                Ok(())
            })?;
            object.offset_links(base);
        }
        for object in objects {
            self.push(object);
        }
        Ok(base)
    }

    /// Class names with their object counts, most frequent first, ties in
    /// name order.
    pub fn class_counts(&self) -> Vec<(Name, usize)> {
        count_classes(&self.objects)
    }
}

/// Class counts over any object sequence; see
/// [`GameObjectContainer::class_counts`].
pub fn count_classes<'a>(objects: impl IntoIterator<Item = &'a GameObject>) -> Vec<(Name, usize)> {
    let mut counts: AHashMap<&Name, usize> = AHashMap::new();
    for object in objects {
        *counts.entry(&object.class_name).or_default() += 1;
    }
    let mut counts: Vec<(Name, usize)> = counts.into_iter().map(|(name, count)| (name.clone(), count)).collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    counts
}

/// Containers are equal when their object sequences are; the map is
/// derived from the sequence.
impl PartialEq for GameObjectContainer {
    fn eq(&self, other: &Self) -> bool {
        self.objects == other.objects
    }
}

impl Index<usize> for GameObjectContainer {
    type Output = GameObject;

    fn index(&self, index: usize) -> &GameObject {
        &self.objects[index]
    }
}

impl IndexMut<usize> for GameObjectContainer {
    fn index_mut(&mut self, index: usize) -> &mut GameObject {
        &mut self.objects[index]
    }
}

impl FromIterator<GameObject> for GameObjectContainer {
    fn from_iter<I: IntoIterator<Item = GameObject>>(iter: I) -> Self {
        Self::from_objects(iter.into_iter().collect())
    }
}
