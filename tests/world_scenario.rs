mod common;

use ark_savegame::archive::Hibernation;
use ark_savegame::{Error, ObjectReference, PropertyValue, ReadOptions, SaveArchive, SaveFile, SaveFormat, WorldSave};

use common::{dodo_island, foo_world, with_islands};

#[test]
fn test_foo_world_with_tree() {
    let bytes = foo_world(9).to_bytes().unwrap();
    let save = SaveFile::read(&bytes, SaveFormat::World, &ReadOptions::new().build_tree(true)).unwrap();
    let SaveFile::World(world) = save else { panic!("expected a world save") };

    let container = world.container();
    assert_eq!(container.len(), 2);
    let foo = &container[0];
    assert_eq!(foo.class_name.text(), "Foo_C");
    assert_eq!(foo.components().len(), 1);
    let (key, &index) = foo.components().first().unwrap();
    assert_eq!(key.text(), "FooComponent_C");
    assert_eq!(key.instance(), 0);
    assert_eq!(container[index].parent(), Some(0));
    assert_eq!(foo.property_value::<bool>("bFlag", 0).unwrap(), Some(true));
}

#[test]
fn test_legacy_world_without_name_table() {
    let world = foo_world(5);
    let bytes = world.to_bytes().unwrap();
    // Legacy names are strings, so the class text appears verbatim.
    assert!(bytes.windows(6).any(|w| w == b"Foo_C\0"));
    let back = WorldSave::read(&bytes, &ReadOptions::new()).unwrap();
    assert!(back.names.is_empty());
    assert_eq!(back.objects, world.objects);
}

#[test]
fn test_hibernation_merge_renumbers_island() {
    let world = with_islands(foo_world(9), vec![dodo_island(3), dodo_island(4)]);
    let bytes = world.to_bytes().unwrap();
    let read = WorldSave::read(&bytes, &ReadOptions::new().merge_hibernation(true)).unwrap();

    let merged = read.container();
    let n = read.objects.len();
    assert_eq!(merged.len(), n + 7);

    let target = |index: usize| merged[index].property_value::<ObjectReference>("Target", 0).unwrap();
    let first = target(n + 2).unwrap();
    assert_eq!(merged.resolve_index(&first).unwrap(), Some(n));
    let second = target(n + 3 + 2).unwrap();
    assert_eq!(merged.resolve_index(&second).unwrap(), Some(n + 3));

    // Main objects are untouched.
    for i in 0..n {
        assert_eq!(merged[i], read.objects[i]);
    }
    // Island copies inside the section keep their local numbering.
    let section = read.hibernation_section().unwrap();
    let local = section.entries[0].objects[2].property_value::<ObjectReference>("Target", 0).unwrap();
    assert_eq!(local, Some(ObjectReference::Id(0)));
}

#[test]
fn test_skipped_hibernation_round_trips() {
    let world = with_islands(foo_world(9), vec![dodo_island(3)]);
    let bytes = world.to_bytes().unwrap();
    let read = WorldSave::read(&bytes, &ReadOptions::new().load_hibernation(false)).unwrap();
    assert!(matches!(read.hibernation, Some(Hibernation::Unloaded(_))));
    assert_eq!(read.class_counts().len(), 2);
    assert_eq!(read.to_bytes().unwrap(), bytes);
}

#[test]
fn test_hibernation_needs_version_7() {
    let world = with_islands(foo_world(6), vec![dodo_island(3)]);
    assert!(matches!(world.to_bytes(), Err(Error::UnsupportedVersion { version: 6, .. })));
}

#[test]
fn test_filtered_objects_cannot_be_written() {
    let bytes = foo_world(9).to_bytes().unwrap();
    let options = ReadOptions::new().filter(|object| object.class_name.text() == "Foo_C");
    let world = WorldSave::read(&bytes, &options).unwrap();
    assert!(world.objects[0].properties_loaded);
    assert!(!world.objects[1].properties_loaded);
    assert!(matches!(world.to_bytes(), Err(Error::IncompleteObject { index: 1 })));
}

#[test]
fn test_edited_world_rewrites() {
    let bytes = foo_world(9).to_bytes().unwrap();
    let mut world = WorldSave::read(&bytes, &ReadOptions::new()).unwrap();
    world.objects[0].properties.set("bFlag", 0, PropertyValue::Bool(false));
    world.objects[0].properties.set("NewName", 0, PropertyValue::Name(common::name("Brand_New", 4)));

    let edited = world.to_bytes().unwrap();
    assert_eq!(edited.len(), world.calculate_size().unwrap());
    let back = WorldSave::read(&edited, &ReadOptions::new()).unwrap();
    assert_eq!(back.objects[0].property_value::<bool>("bFlag", 0).unwrap(), Some(false));
    assert_eq!(back.names.position("Brand_New"), Some(back.names.len() - 1));
}
