#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("truncated at offset {offset}: need {need} bytes, have {have}")]
    Truncated { offset: usize, need: usize, have: usize },

    #[error("corrupt data at offset {offset}: {reason}")]
    CorruptData { offset: usize, reason: String },

    #[error("corrupt header: {reason}")]
    CorruptHeader { reason: String },

    #[error("unsupported {format} version {version}")]
    UnsupportedVersion { format: &'static str, version: i64 },

    #[error("unreadable property {name} of type {type_name} at offset {offset}")]
    UnreadableProperty { name: String, type_name: String, offset: usize },

    #[error("broken object reference: index {index} in container of {len} objects")]
    BrokenReference { index: i64, len: usize },

    #[error("property {property}: expected {expected}, found {found}")]
    TypeMismatch { property: String, expected: &'static str, found: &'static str },

    #[error("output buffer overflow: need {need} bytes, have {have}")]
    Overflow { need: usize, have: usize },

    #[error("size mismatch: calculated {expected} bytes, wrote {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("name {0:?} missing from output name table")]
    MissingName(String),

    #[error("object {index} was loaded without properties and cannot be written")]
    IncompleteObject { index: usize },

    #[error("object collector: {0}")]
    CollectorState(&'static str),

    #[error("invalid json: {reason}")]
    Json { reason: String },

    #[error("io error: {0}")]
    Io(String),
}

impl Error {
    /// Short stable label used by the CLI summary line.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Truncated { .. } => "truncated",
            Self::CorruptData { .. } => "corrupt-data",
            Self::CorruptHeader { .. } => "corrupt-header",
            Self::UnsupportedVersion { .. } => "unsupported-version",
            Self::UnreadableProperty { .. } => "unreadable-property",
            Self::BrokenReference { .. } => "broken-reference",
            Self::TypeMismatch { .. } => "type-mismatch",
            Self::Overflow { .. } => "overflow",
            Self::SizeMismatch { .. } => "size-mismatch",
            Self::MissingName(_) => "missing-name",
            Self::IncompleteObject { .. } => "incomplete-object",
            Self::CollectorState(_) => "collector-state",
            Self::Json { .. } => "json",
            Self::Io(_) => "io",
        }
    }

    /// File damage that allow-broken mode may turn into a partial result.
    /// Reference errors are internal inconsistencies and never qualify.
    pub fn is_recoverable_damage(&self) -> bool {
        matches!(
            self,
            Self::Truncated { .. } | Self::CorruptData { .. } | Self::CorruptHeader { .. }
        )
    }

    pub(crate) fn corrupt(offset: usize, reason: impl Into<String>) -> Self {
        Self::CorruptData { offset, reason: reason.into() }
    }

    pub(crate) fn header(reason: impl Into<String>) -> Self {
        Self::CorruptHeader { reason: reason.into() }
    }

    pub(crate) fn json(reason: impl Into<String>) -> Self {
        Self::Json { reason: reason.into() }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::json(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A read that may have stopped early. `damage` holds the error that
/// ended it; `value` is what was read before.
#[derive(Debug)]
pub struct Partial<T> {
    pub value: T,
    pub damage: Option<Error>,
}

impl<T> Partial<T> {
    pub fn complete(value: T) -> Self {
        Self { value, damage: None }
    }

    /// The value, or the damage as an error.
    pub fn into_result(self) -> Result<T> {
        match self.damage {
            Some(err) => Err(err),
            None => Ok(self.value),
        }
    }
}
