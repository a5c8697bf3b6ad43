//! Interned names
//!
//! A [`Name`] is a `(text, instance)` pair. Instance 0 means "no number";
//! instance `n > 0` is displayed as `text_{n-1}`, which is how the engine
//! prints numbered names and how legacy archives store them as strings.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::Arc;

use ahash::{AHashSet, RandomState};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Text of the name that terminates property lists.
pub const NONE_TEXT: &str = "None";

/// Interned `(text, instance)` identity token.
#[derive(Clone)]
pub struct Name {
    text: Arc<str>,
    instance: u32,
}

impl Name {
    /// Create a name without going through a registry.
    pub fn new(text: &str, instance: u32) -> Self {
        Self { text: Arc::from(text), instance }
    }

    pub(crate) fn from_shared(text: Arc<str>, instance: u32) -> Self {
        Self { text, instance }
    }

    /// Parse a display form (`Foo`, `Foo_3`) into a name.
    pub fn parse(display: &str) -> Self {
        let (text, instance) = split_display(display);
        Self::new(text, instance)
    }

    /// The `None` marker.
    pub fn none() -> Self {
        Self::new(NONE_TEXT, 0)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub(crate) fn shared_text(&self) -> &Arc<str> {
        &self.text
    }

    pub fn instance(&self) -> u32 {
        self.instance
    }

    pub fn is_none(&self) -> bool {
        self.instance == 0 && &*self.text == NONE_TEXT
    }

    /// True when the display form parses back into the same pair.
    pub fn display_round_trips(&self) -> bool {
        split_display(&self.to_string()) == (self.text(), self.instance)
    }

    /// Byte length of the display form, without allocating it.
    pub(crate) fn display_len(&self) -> usize {
        if self.instance == 0 {
            self.text.len()
        } else {
            self.text.len() + 1 + decimal_digits(self.instance - 1)
        }
    }
}

/// Split `Foo_12` into `("Foo", 13)`. Suffixes with a leading zero are part
/// of the text, as are suffixes that do not fit the instance range.
pub fn split_display(display: &str) -> (&str, u32) {
    let Some(pos) = display.rfind('_') else {
        return (display, 0);
    };
    let digits = &display[pos + 1..];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return (display, 0);
    }
    if digits.len() > 1 && digits.starts_with('0') {
        return (display, 0);
    }
    match digits.parse::<u32>().ok().and_then(|n| n.checked_add(1)) {
        Some(instance) => (&display[..pos], instance),
        None => (display, 0),
    }
}

fn decimal_digits(mut v: u32) -> usize {
    let mut digits = 1;
    while v >= 10 {
        v /= 10;
        digits += 1;
    }
    digits
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.instance == other.instance
            && (Arc::ptr_eq(&self.text, &other.text) || self.text == other.text)
    }
}

impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.text.hash(state);
        self.instance.hash(state);
    }
}

impl Ord for Name {
    /// Ordinal text comparison, then numeric instance comparison.
    fn cmp(&self, other: &Self) -> Ordering {
        self.text
            .as_bytes()
            .cmp(other.text.as_bytes())
            .then(self.instance.cmp(&other.instance))
    }
}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.instance == 0 {
            f.write_str(&self.text)
        } else {
            write!(f, "{}_{}", self.text, self.instance - 1)
        }
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({:?}, {})", &*self.text, self.instance)
    }
}

impl From<&str> for Name {
    fn from(display: &str) -> Self {
        Self::parse(display)
    }
}

/// Serialized as the display string when that parses back unchanged,
/// otherwise as `{"name": text, "instance": n}`.
impl Serialize for Name {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if self.display_round_trips() {
            serializer.serialize_str(&self.to_string())
        } else {
            let mut state = serializer.serialize_struct("Name", 2)?;
            state.serialize_field("name", self.text())?;
            state.serialize_field("instance", &self.instance)?;
            state.end()
        }
    }
}

impl<'de> Deserialize<'de> for Name {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Display(String),
            Parts { name: String, instance: u32 },
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Display(display) => Name::parse(&display),
            Repr::Parts { name, instance } => Name::new(&name, instance),
        })
    }
}

/// Ordered sequence of names identifying an object: its own name first,
/// followed by the names of its owner chain.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct CompositeName(Vec<Name>);

// Fixed seeds so composite hashes are comparable across calls and runs.
const HASH_SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

impl CompositeName {
    pub fn new(names: Vec<Name>) -> Self {
        Self(names)
    }

    pub fn single(name: Name) -> Self {
        Self(vec![name])
    }

    pub fn names(&self) -> &[Name] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The object's own name.
    pub fn first(&self) -> Option<&Name> {
        self.0.first()
    }

    /// Composite name of the owner, if this name is qualified.
    pub fn parent(&self) -> Option<CompositeName> {
        if self.0.len() > 1 {
            Some(Self(self.0[1..].to_vec()))
        } else {
            None
        }
    }

    /// Order-sensitive hash, stable across calls.
    pub fn stable_hash(&self) -> u64 {
        let state = RandomState::with_seeds(HASH_SEEDS[0], HASH_SEEDS[1], HASH_SEEDS[2], HASH_SEEDS[3]);
        let mut hasher = state.build_hasher();
        self.0.len().hash(&mut hasher);
        for name in &self.0 {
            name.hash(&mut hasher);
        }
        hasher.finish()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Name> {
        self.0.iter()
    }

    pub fn into_vec(self) -> Vec<Name> {
        self.0
    }
}

impl From<Vec<Name>> for CompositeName {
    fn from(names: Vec<Name>) -> Self {
        Self(names)
    }
}

impl std::ops::Index<usize> for CompositeName {
    type Output = Name;

    fn index(&self, index: usize) -> &Name {
        &self.0[index]
    }
}

impl fmt::Display for CompositeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, name) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{name}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for CompositeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

/// Interns name texts so equal names share one allocation.
#[derive(Debug, Default)]
pub struct NameRegistry {
    texts: AHashSet<Arc<str>>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent: interning the same pair twice yields equal names that
    /// share their text allocation.
    pub fn intern(&mut self, text: &str, instance: u32) -> Name {
        Name::from_shared(self.intern_text(text), instance)
    }

    /// Intern a display form (`Foo_3`).
    pub fn intern_display(&mut self, display: &str) -> Name {
        let (text, instance) = split_display(display);
        self.intern(text, instance)
    }

    pub(crate) fn intern_text(&mut self, text: &str) -> Arc<str> {
        if let Some(existing) = self.texts.get(text) {
            return existing.clone();
        }
        let shared: Arc<str> = Arc::from(text);
        self.texts.insert(shared.clone());
        shared
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    /// Freeze the registry. The sealed form is lookup-only and can be shared
    /// between threads without locking.
    pub fn seal(self) -> SealedNameRegistry {
        SealedNameRegistry { texts: self.texts }
    }
}

/// Read-only registry produced by [`NameRegistry::seal`].
#[derive(Debug, Default)]
pub struct SealedNameRegistry {
    texts: AHashSet<Arc<str>>,
}

impl SealedNameRegistry {
    pub fn get(&self, text: &str, instance: u32) -> Option<Name> {
        self.texts
            .get(text)
            .map(|shared| Name::from_shared(shared.clone(), instance))
    }

    pub fn contains(&self, text: &str) -> bool {
        self.texts.contains(text)
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }
}
