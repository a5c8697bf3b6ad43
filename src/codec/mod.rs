pub mod name;
pub mod name_table;
pub mod reader;
pub mod writer;

pub use name::{CompositeName, Name, NameRegistry, SealedNameRegistry};
pub use name_table::{NameMode, NameTable};
pub use reader::{ArchiveReader, ReadStats};
pub use writer::{string_size, ArchiveWriter, NameSizer};
