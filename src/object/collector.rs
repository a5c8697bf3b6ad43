//! Reachability collection and renumbering of object subsets.

use ahash::{AHashMap, AHashSet};
use bitflags::bitflags;
use indexmap::IndexMap;
use tracing::{debug, warn};

use super::{GameObject, GameObjectContainer};
use crate::error::{Error, Result};
use crate::property::ObjectReference;

bitflags! {
    /// Edges followed while collecting.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Follow: u8 {
        /// `Id` references in property values.
        const REFERENCES = 0x01;
        /// Components attached by tree building.
        const COMPONENTS = 0x02;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Collecting,
    Mutating,
}

/// Objects produced by [`ObjectCollector::remap`].
#[derive(Debug, Default)]
pub struct Remapped {
    /// Objects in output order; the first one has index `base`.
    pub objects: Vec<GameObject>,
    /// References to objects that were never collected, replaced by `Null`.
    pub nulled_references: usize,
}

/// Working copy of a subset of a container's objects.
///
/// Collect from roots, optionally insert or remove objects, then
/// [`remap`](Self::remap) to a fresh sequential numbering with every
/// reference rewritten. Collecting is only allowed before the first
/// mutation.
pub struct ObjectCollector<'c> {
    source: &'c GameObjectContainer,
    collected: IndexMap<usize, GameObject>,
    removed: AHashSet<usize>,
    inserted: Vec<GameObject>,
    phase: Phase,
}

impl<'c> ObjectCollector<'c> {
    pub fn new(source: &'c GameObjectContainer) -> Self {
        Self {
            source,
            collected: IndexMap::new(),
            removed: AHashSet::new(),
            inserted: Vec::new(),
            phase: Phase::Collecting,
        }
    }

    /// Collect `root` and everything reachable from it along `follow`.
    /// Returns the number of newly collected objects.
    pub fn collect(&mut self, root: usize, follow: Follow) -> Result<usize> {
        if self.phase != Phase::Collecting {
            return Err(Error::CollectorState("cannot collect after objects were inserted or removed"));
        }
        if root >= self.source.len() {
            return Err(Error::BrokenReference { index: root as i64, len: self.source.len() });
        }

        let source = self.source;
        let before = self.collected.len();
        let mut seen = AHashSet::new();
        let mut stack = vec![root];
        while let Some(index) = stack.pop() {
            if !seen.insert(index) {
                continue;
            }
            let object = &source[index];
            let mut next = Vec::new();
            if follow.contains(Follow::COMPONENTS) {
                next.extend(object.components.values().copied());
            }
            if follow.contains(Follow::REFERENCES) {
                let mut broken = None;
                object.for_each_reference(&mut |reference| match source.resolve_index(reference) {
                    Ok(Some(target)) => next.push(target),
                    Ok(None) => {}
                    Err(err) => {
                        broken.get_or_insert(err);
                    }
                });
                if let Some(err) = broken {
                    return Err(err);
                }
            }
            self.collected.entry(index).or_insert_with(|| object.clone());
            stack.extend(next.into_iter().rev());
        }
        Ok(self.collected.len() - before)
    }

    /// Collect every object of the source.
    pub fn collect_all(&mut self) -> Result<usize> {
        let mut added = 0;
        for index in 0..self.source.len() {
            added += self.collect(index, Follow::empty())?;
        }
        Ok(added)
    }

    pub fn is_collected(&self, index: usize) -> bool {
        self.collected.contains_key(&index)
    }

    /// Number of objects the remap would emit.
    pub fn len(&self) -> usize {
        self.collected.len() + self.inserted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add a new object. Its `Id` references are read as indices of the
    /// source container.
    pub fn insert(&mut self, mut object: GameObject) {
        self.phase = Phase::Mutating;
        object.clear_links();
        self.inserted.push(object);
    }

    /// Drop a collected object. Any remaining reference to it makes the
    /// remap fail.
    pub fn remove(&mut self, index: usize) -> bool {
        self.phase = Phase::Mutating;
        if self.collected.shift_remove(&index).is_some() {
            self.removed.insert(index);
            true
        } else {
            false
        }
    }

    /// Renumber the working set from `base`, parents before their
    /// components, and rewrite every reference and link.
    pub fn remap(self, base: usize) -> Result<Remapped> {
        let order = self.output_order();
        let mut mapping: AHashMap<usize, usize> = AHashMap::with_capacity(order.len());
        for (position, &old) in order.iter().enumerate() {
            mapping.insert(old, base + position);
        }

        let mut collected = self.collected;
        let mut nulled = 0;
        let mut objects = Vec::with_capacity(order.len() + self.inserted.len());
        let emitted = order.iter().filter_map(|old| collected.swap_remove(old)).chain(self.inserted);

        for mut object in emitted {
            object.properties.try_for_each_reference_mut(&mut |reference| {
                let ObjectReference::Id(id) = reference else {
                    return Ok(());
                };
                let old = usize::try_from(*id).ok();
                match old.and_then(|old| mapping.get(&old)) {
                    Some(&new) => *id = new as i32,
                    None if old.is_some_and(|old| self.removed.contains(&old)) => {
                        return Err(Error::BrokenReference { index: i64::from(*id), len: self.source.len() });
                    }
                    None => {
                        warn!(index = *id, "reference to uncollected object replaced by null");
                        *reference = ObjectReference::Null;
                        nulled += 1;
                    }
                }
                Ok(())
            })?;

            object.parent = object.parent.and_then(|p| mapping.get(&p).copied());
            object.components = object
                .components
                .iter()
                .filter_map(|(name, c)| mapping.get(c).map(|&new| (name.clone(), new)))
                .collect();
            objects.push(object);
        }

        debug!(objects = objects.len(), base, nulled, "remapped collected objects");
        Ok(Remapped { objects, nulled_references: nulled })
    }

    /// Collected indices, parent first, components in attachment order.
    fn output_order(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.collected.len());
        let mut visited = AHashSet::with_capacity(self.collected.len());
        let is_root = |object: &GameObject| object.parent.map_or(true, |p| !self.collected.contains_key(&p));

        for (&index, object) in &self.collected {
            if !is_root(object) {
                continue;
            }
            let mut stack = vec![index];
            while let Some(current) = stack.pop() {
                if !visited.insert(current) {
                    continue;
                }
                order.push(current);
                if let Some(object) = self.collected.get(&current) {
                    let children = object.components.values().filter(|c| self.collected.contains_key(*c));
                    let children: Vec<usize> = children.copied().collect();
                    stack.extend(children.into_iter().rev());
                }
            }
        }
        // Cycles in parent links leave objects without a root.
        for &index in self.collected.keys() {
            if visited.insert(index) {
                order.push(index);
            }
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{CompositeName, Name};
    use crate::property::{Property, PropertyValue};

    fn object(name: &str, owner: Option<&str>) -> GameObject {
        let mut names = vec![Name::new(name, 0)];
        names.extend(owner.map(|o| Name::new(o, 0)));
        GameObject::new(Name::new(name, 0), CompositeName::new(names))
    }

    fn reference(target: i32) -> Property {
        Property::new("Target", PropertyValue::Object(ObjectReference::Id(target)))
    }

    /// 0: Root, 1: Other (refs 3), 2: Root.Comp, 3: Leaf, 4: Unrelated
    fn container() -> GameObjectContainer {
        let mut objects = vec![
            object("Root", None),
            object("Other", None),
            object("Comp", Some("Root")),
            object("Leaf", None),
            object("Unrelated", None),
        ];
        objects[0].properties.push(reference(1));
        objects[1].properties.push(reference(3));
        let mut container = GameObjectContainer::from_objects(objects);
        container.build_tree();
        container
    }

    #[test]
    fn test_collect_follows_edges() {
        let source = container();
        let mut collector = ObjectCollector::new(&source);
        assert_eq!(collector.collect(0, Follow::COMPONENTS).unwrap(), 2);
        assert!(collector.is_collected(2));
        assert!(!collector.is_collected(1));
        assert_eq!(collector.collect(0, Follow::all()).unwrap(), 2);
        assert!(collector.is_collected(3));
        assert!(!collector.is_collected(4));
    }

    #[test]
    fn test_remap_parent_first_and_rewrites() {
        let source = container();
        let mut collector = ObjectCollector::new(&source);
        collector.collect(1, Follow::REFERENCES).unwrap();
        collector.collect(0, Follow::all()).unwrap();
        let remapped = collector.remap(10).unwrap();

        let names: Vec<&str> = remapped.objects.iter().map(|o| o.class_name.text()).collect();
        assert_eq!(names, vec!["Other", "Leaf", "Root", "Comp"]);
        // Other -> Leaf, Root -> Other
        assert_eq!(remapped.objects[0].property_value::<ObjectReference>("Target", 0).unwrap(), Some(ObjectReference::Id(11)));
        assert_eq!(remapped.objects[2].property_value::<ObjectReference>("Target", 0).unwrap(), Some(ObjectReference::Id(10)));
        assert_eq!(remapped.objects[3].parent(), Some(12));
        assert_eq!(remapped.objects[2].component("Comp"), Some(13));
        assert_eq!(remapped.nulled_references, 0);
    }

    #[test]
    fn test_uncollected_reference_is_nulled() {
        let source = container();
        let mut collector = ObjectCollector::new(&source);
        collector.collect(0, Follow::COMPONENTS).unwrap();
        let remapped = collector.remap(0).unwrap();
        assert_eq!(remapped.nulled_references, 1);
        assert_eq!(remapped.objects[0].property_value::<ObjectReference>("Target", 0).unwrap(), Some(ObjectReference::Null));
    }

    #[test]
    fn test_reference_to_removed_object_fails() {
        let source = container();
        let mut collector = ObjectCollector::new(&source);
        collector.collect(0, Follow::all()).unwrap();
        assert!(collector.remove(1));
        assert!(matches!(collector.remap(0), Err(Error::BrokenReference { index: 1, .. })));
    }

    #[test]
    fn test_collect_after_mutation_fails() {
        let source = container();
        let mut collector = ObjectCollector::new(&source);
        collector.collect(4, Follow::all()).unwrap();
        collector.insert(object("New", None));
        assert!(matches!(collector.collect(0, Follow::all()), Err(Error::CollectorState(_))));

        let remapped = collector.remap(0).unwrap();
        assert_eq!(remapped.objects.len(), 2);
        assert_eq!(remapped.objects[1].class_name.text(), "New");
    }

    #[test]
    fn test_broken_reference_while_collecting() {
        let mut objects = vec![object("Root", None)];
        objects[0].properties.push(reference(9999));
        let source = GameObjectContainer::from_objects(objects);
        let mut collector = ObjectCollector::new(&source);
        assert!(matches!(collector.collect(0, Follow::REFERENCES), Err(Error::BrokenReference { index: 9999, len: 1 })));
        assert!(matches!(collector.collect(5, Follow::REFERENCES), Err(Error::BrokenReference { .. })));
    }
}
