//! ARK save archives
//!
//! Reads and writes world saves (`.ark`), player profiles (`.arkprofile`),
//! tribes (`.arktribe`) and single property bags (`.sav`), and projects
//! them to JSON and back.

pub mod archive;
pub mod batch;
pub mod codec;
pub mod error;
pub mod object;
pub mod property;

pub use error::{Error, Result};
pub use archive::{
    HibernationEntry, HibernationSection, ObjectFile, ObjectFileKind, PropertyBag,
    ReadOptions, SaveArchive, SaveFile, SaveFormat, WorldSave, WriteOptions,
};
pub use codec::{ArchiveReader, ArchiveWriter, CompositeName, Name, NameMode, NameTable, ReadStats};
pub use object::{Follow, GameObject, GameObjectContainer, LocationData, ObjectCollector};
pub use property::{
    ArrayValue, FromPropertyValue, ObjectReference, Property, PropertyList,
    PropertyRegistry, PropertyValue, StructValue,
};
