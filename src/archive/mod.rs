//! Top-level save formats
//!
//! Every format is written with the same two passes: [`SaveArchive::plan`]
//! computes the exact output size together with whatever layout the emit
//! pass needs (name tables, block offsets), then
//! [`SaveArchive::write_planned`] fills a buffer of exactly that size.

pub mod bag;
pub mod hibernation;
pub mod io;
pub mod object_file;
pub mod world;

pub use bag::PropertyBag;
pub use hibernation::{HibernationEntry, HibernationSection};
pub use object_file::{ObjectFile, ObjectFileKind};
pub use world::{DataFileObjects, EmbeddedData, Hibernation, WorldSave};

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::warn;

use crate::codec::{ArchiveReader, ArchiveWriter, Name, ReadStats, SealedNameRegistry};
use crate::error::{Error, Partial, Result};
use crate::object::GameObject;
use crate::property::json::{as_object, as_str, field};
use crate::property::PropertyRegistry;

/// Predicate deciding whether an object's properties are decoded.
pub type ObjectFilter = Arc<dyn Fn(&GameObject) -> bool + Send + Sync>;

/// Settings for decoding an archive.
#[derive(Clone)]
pub struct ReadOptions {
    allow_broken: bool,
    build_tree: bool,
    load_hibernation: bool,
    merge_hibernation: bool,
    filter: Option<ObjectFilter>,
    registry: Arc<PropertyRegistry>,
    shared_names: Option<Arc<SealedNameRegistry>>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            allow_broken: false,
            build_tree: false,
            load_hibernation: true,
            merge_hibernation: false,
            filter: None,
            registry: Arc::new(PropertyRegistry::standard()),
            shared_names: None,
        }
    }
}

impl fmt::Debug for ReadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadOptions")
            .field("allow_broken", &self.allow_broken)
            .field("build_tree", &self.build_tree)
            .field("load_hibernation", &self.load_hibernation)
            .field("merge_hibernation", &self.merge_hibernation)
            .field("filter", &self.filter.is_some())
            .field("shared_names", &self.shared_names.as_ref().map(|n| n.len()))
            .finish()
    }
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep the readable prefix of a damaged file instead of failing.
    pub fn allow_broken(mut self, allow: bool) -> Self {
        self.allow_broken = allow;
        self
    }

    pub fn build_tree(mut self, build: bool) -> Self {
        self.build_tree = build;
        self
    }

    pub fn load_hibernation(mut self, load: bool) -> Self {
        self.load_hibernation = load;
        self
    }

    /// Append every hibernation island to the main container after
    /// reading. Implies `load_hibernation`.
    pub fn merge_hibernation(mut self, merge: bool) -> Self {
        self.merge_hibernation = merge;
        if merge {
            self.load_hibernation = true;
        }
        self
    }

    pub fn filter(mut self, filter: impl Fn(&GameObject) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn registry(mut self, registry: Arc<PropertyRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Sealed names shared by every reader created from these options.
    pub fn shared_names(mut self, names: Arc<SealedNameRegistry>) -> Self {
        self.shared_names = Some(names);
        self
    }

    pub fn is_allow_broken(&self) -> bool {
        self.allow_broken
    }

    pub fn is_build_tree(&self) -> bool {
        self.build_tree
    }

    pub fn is_load_hibernation(&self) -> bool {
        self.load_hibernation
    }

    pub fn is_merge_hibernation(&self) -> bool {
        self.merge_hibernation
    }

    pub fn object_filter(&self) -> Option<&(dyn Fn(&GameObject) -> bool + Send + Sync)> {
        self.filter.as_deref()
    }

    pub fn property_registry(&self) -> &Arc<PropertyRegistry> {
        &self.registry
    }

    pub(crate) fn reader<'a>(&self, data: &'a [u8]) -> ArchiveReader<'a> {
        let mut reader = ArchiveReader::new(data);
        reader.set_shared_names(self.shared_names.clone());
        reader
    }

    /// Turn a partial read into a result. Damage is forgiven only in
    /// allow-broken mode and only when it is file damage.
    pub(crate) fn accept<T>(&self, partial: Partial<T>, what: &str) -> Result<T> {
        match partial.damage {
            None => Ok(partial.value),
            Some(err) if self.allow_broken && err.is_recoverable_damage() => {
                warn!(error = %err, "{what} is damaged, keeping the readable part");
                Ok(partial.value)
            }
            Some(err) => Err(err),
        }
    }
}

/// Settings for encoding an archive to a file.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    pub memory_map: bool,
}

impl WriteOptions {
    pub fn memory_map(mut self, memory_map: bool) -> Self {
        self.memory_map = memory_map;
        self
    }
}

/// Output of the size pass: the exact byte count plus the layout the emit
/// pass must follow.
#[derive(Debug, Clone)]
pub struct Planned<L> {
    pub size: usize,
    pub layout: L,
}

/// Two-pass binary encoding shared by all formats.
pub trait SaveArchive {
    type Layout;

    /// Size pass. Pure; computes everything the emit pass needs.
    fn plan(&self) -> Result<Planned<Self::Layout>>;

    /// Emit pass. Must write exactly `plan.size` bytes.
    fn write_planned(&self, plan: &Planned<Self::Layout>, writer: &mut ArchiveWriter) -> Result<()>;

    fn calculate_size(&self) -> Result<usize> {
        Ok(self.plan()?.size)
    }

    /// Encode into a buffer of exactly [`calculate_size`](Self::calculate_size) bytes.
    fn to_bytes(&self) -> Result<Vec<u8>> {
        let plan = self.plan()?;
        let mut buf = vec![0u8; plan.size];
        let mut writer = ArchiveWriter::new(&mut buf);
        self.write_planned(&plan, &mut writer)?;
        writer.finish()?;
        Ok(buf)
    }
}

/// The four on-disk formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SaveFormat {
    World,
    Profile,
    Tribe,
    Bag,
}

impl SaveFormat {
    pub const ALL: [SaveFormat; 4] = [Self::World, Self::Profile, Self::Tribe, Self::Bag];

    pub fn name(self) -> &'static str {
        match self {
            Self::World => "world",
            Self::Profile => "profile",
            Self::Tribe => "tribe",
            Self::Bag => "bag",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::World => "ark",
            Self::Profile => "arkprofile",
            Self::Tribe => "arktribe",
            Self::Bag => "sav",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    /// Detect the format from the file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        Self::ALL.into_iter().find(|f| f.extension() == extension)
    }
}

impl fmt::Display for SaveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Any decoded save file.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveFile {
    World(WorldSave),
    Profile(ObjectFile),
    Tribe(ObjectFile),
    Bag(PropertyBag),
}

impl SaveFile {
    pub fn read(data: &[u8], format: SaveFormat, options: &ReadOptions) -> Result<Self> {
        Ok(Self::read_with_stats(data, format, options)?.0)
    }

    /// Decode and report how many properties had to be skipped.
    pub fn read_with_stats(data: &[u8], format: SaveFormat, options: &ReadOptions) -> Result<(Self, ReadStats)> {
        Ok(match format {
            SaveFormat::World => {
                let (world, stats) = WorldSave::read_with_stats(data, options)?;
                (Self::World(world), stats)
            }
            SaveFormat::Profile => {
                let (file, stats) = ObjectFile::read_with_stats(data, ObjectFileKind::Profile, options)?;
                (Self::Profile(file), stats)
            }
            SaveFormat::Tribe => {
                let (file, stats) = ObjectFile::read_with_stats(data, ObjectFileKind::Tribe, options)?;
                (Self::Tribe(file), stats)
            }
            SaveFormat::Bag => {
                let (bag, stats) = PropertyBag::read_with_stats(data, options)?;
                (Self::Bag(bag), stats)
            }
        })
    }

    /// Read a file, detecting the format from its extension unless given.
    pub fn read_path(
        path: &Path,
        format: Option<SaveFormat>,
        options: &ReadOptions,
        memory_map: bool,
    ) -> Result<(Self, ReadStats)> {
        let format = format
            .or_else(|| SaveFormat::from_path(path))
            .ok_or_else(|| Error::header(format!("cannot detect save format of {}", path.display())))?;
        let input = io::Input::open(path, memory_map)?;
        Self::read_with_stats(&input, format, options)
    }

    pub fn format(&self) -> SaveFormat {
        match self {
            Self::World(_) => SaveFormat::World,
            Self::Profile(_) => SaveFormat::Profile,
            Self::Tribe(_) => SaveFormat::Tribe,
            Self::Bag(_) => SaveFormat::Bag,
        }
    }

    pub fn calculate_size(&self) -> Result<usize> {
        match self {
            Self::World(world) => world.calculate_size(),
            Self::Profile(file) | Self::Tribe(file) => file.calculate_size(),
            Self::Bag(bag) => bag.calculate_size(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match self {
            Self::World(world) => world.to_bytes(),
            Self::Profile(file) | Self::Tribe(file) => file.to_bytes(),
            Self::Bag(bag) => bag.to_bytes(),
        }
    }

    /// Encode to `path`; returns the number of bytes written.
    pub fn write_path(&self, path: &Path, options: WriteOptions) -> Result<usize> {
        match self {
            Self::World(world) => io::write_archive(world, path, options),
            Self::Profile(file) | Self::Tribe(file) => io::write_archive(file, path, options),
            Self::Bag(bag) => io::write_archive(bag, path, options),
        }
    }

    /// Class names with counts. Worlds include their hibernated objects.
    pub fn class_counts(&self) -> Vec<(Name, usize)> {
        match self {
            Self::World(world) => world.class_counts(),
            Self::Profile(file) | Self::Tribe(file) => file.objects.class_counts(),
            Self::Bag(bag) => vec![(bag.class_name.clone(), 1)],
        }
    }

    pub fn to_json(&self) -> Value {
        let body = match self {
            Self::World(world) => world.to_json(),
            Self::Profile(file) | Self::Tribe(file) => file.to_json(),
            Self::Bag(bag) => bag.to_json(),
        };
        json!({ "format": self.format().name(), "save": body })
    }

    pub fn from_json(v: &Value, registry: &PropertyRegistry) -> Result<Self> {
        let object = as_object(v)?;
        let name = as_str(field(object, "format")?)?;
        let format = SaveFormat::from_name(name).ok_or_else(|| Error::json(format!("unknown save format {name:?}")))?;
        let body = field(object, "save")?;
        Ok(match format {
            SaveFormat::World => Self::World(WorldSave::from_json(body, registry)?),
            SaveFormat::Profile => Self::Profile(ObjectFile::from_json(body, ObjectFileKind::Profile, registry)?),
            SaveFormat::Tribe => Self::Tribe(ObjectFile::from_json(body, ObjectFileKind::Tribe, registry)?),
            SaveFormat::Bag => Self::Bag(PropertyBag::from_json(body, registry)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CompositeName;

    #[test]
    fn test_format_detection() {
        assert_eq!(SaveFormat::from_path(Path::new("TheIsland.ark")), Some(SaveFormat::World));
        assert_eq!(SaveFormat::from_path(Path::new("a/b/1234.ArkProfile")), Some(SaveFormat::Profile));
        assert_eq!(SaveFormat::from_path(Path::new("1234.arktribe")), Some(SaveFormat::Tribe));
        assert_eq!(SaveFormat::from_path(Path::new("LocalPlayer.sav")), Some(SaveFormat::Bag));
        assert_eq!(SaveFormat::from_path(Path::new("notes.txt")), None);
        assert_eq!(SaveFormat::from_path(Path::new("noextension")), None);
    }

    #[test]
    fn test_merge_implies_load() {
        let options = ReadOptions::new().load_hibernation(false).merge_hibernation(true);
        assert!(options.is_load_hibernation());
        assert!(options.is_merge_hibernation());
    }

    #[test]
    fn test_accept_policy() {
        let damaged = || Partial { value: 3, damage: Some(Error::Truncated { offset: 10, need: 4, have: 0 }) };
        assert!(ReadOptions::new().accept(damaged(), "test").is_err());
        assert_eq!(ReadOptions::new().allow_broken(true).accept(damaged(), "test").unwrap(), 3);

        let broken = Partial { value: 3, damage: Some(Error::BrokenReference { index: 9999, len: 10 }) };
        assert!(ReadOptions::new().allow_broken(true).accept(broken, "test").is_err());
    }

    #[test]
    fn test_filter_option() {
        let options = ReadOptions::new().filter(|o: &GameObject| o.is_item);
        let filter = options.object_filter().unwrap();
        let mut object = GameObject::new(Name::new("Item_C", 0), CompositeName::single(Name::new("Item_C", 1)));
        assert!(!filter(&object));
        object.is_item = true;
        assert!(filter(&object));
    }
}
