#![allow(dead_code)]

use std::path::PathBuf;

use ark_savegame::archive::Hibernation;
use ark_savegame::{
    CompositeName, GameObject, GameObjectContainer, HibernationEntry, HibernationSection, LocationData, Name,
    ObjectReference, Property, PropertyValue, WorldSave,
};

pub fn name(text: &str, instance: u32) -> Name {
    Name::new(text, instance)
}

/// Object whose own name is `(text, instance)`, owned by `owners`.
pub fn object(class: &str, own: (&str, u32), owners: &[(&str, u32)]) -> GameObject {
    let mut names = vec![name(own.0, own.1)];
    names.extend(owners.iter().map(|&(text, instance)| name(text, instance)));
    GameObject::new(name(class, 0), CompositeName::new(names))
}

/// One `Foo_C` with `bFlag = true` and its `FooComponent_C`.
pub fn foo_world(version: i16) -> WorldSave {
    let mut foo = object("Foo_C", ("Foo_C", 1), &[]);
    foo.properties.push(Property::new("bFlag", PropertyValue::Bool(true)));
    foo.location = Some(LocationData { x: -100.5, y: 2.25, z: 300.0, pitch: 0.0, yaw: 45.0, roll: 0.0 });
    let component = object("FooComponent_C", ("FooComponent_C", 0), &[("Foo_C", 1)]);

    let mut world = WorldSave::new(version);
    world.game_time = 600.0;
    world.data_files = vec!["TheIsland".into()];
    world.objects = GameObjectContainer::from_objects(vec![foo, component]);
    world
}

/// Island of `len` dinos; dino 2 targets dino 0.
pub fn dodo_island(len: usize) -> HibernationEntry {
    let mut objects: Vec<GameObject> =
        (0..len).map(|i| object("Dodo_Character_BP_C", ("Dodo_Character_BP_C", i as u32 + 1), &[])).collect();
    objects[2].properties.push(Property::new("Target", PropertyValue::Object(ObjectReference::Id(0))));
    HibernationEntry { x: 1.0, y: 2.0, z: 3.0, objects: GameObjectContainer::from_objects(objects), ..Default::default() }
}

pub fn with_islands(mut world: WorldSave, islands: Vec<HibernationEntry>) -> WorldSave {
    world.hibernation = Some(Hibernation::Loaded(HibernationSection {
        classes: vec!["Dodo_Character_BP_C".into()],
        indices: vec![0],
        entries: islands,
        ..Default::default()
    }));
    world
}

/// Legacy string: length with NUL, bytes, NUL.
pub fn put_string(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as i32 + 1).to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
}

pub fn put_i32(buf: &mut Vec<u8>, v: i32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

pub fn scratch_dir(label: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("ark-savegame-{label}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
