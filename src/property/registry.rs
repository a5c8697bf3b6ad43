//! Property kind dispatch table
//!
//! Built once, then shared read-only (behind `Arc`) by every reader and
//! writer, including worker threads of a batch run.

use ahash::AHashMap;

use super::structs::StructKind;
use super::PropertyKind;

/// Maps type tags to property kinds and struct type names to struct
/// layouts.
#[derive(Debug, Clone)]
pub struct PropertyRegistry {
    kinds: AHashMap<&'static str, PropertyKind>,
    structs: AHashMap<String, StructKind>,
}

impl PropertyRegistry {
    /// Every built-in kind and native struct.
    pub fn standard() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> PropertyRegistryBuilder {
        PropertyRegistryBuilder::new()
    }

    pub fn kind(&self, tag: &str) -> Option<PropertyKind> {
        self.kinds.get(tag).copied()
    }

    /// Layout of a struct type; unregistered types are property lists.
    pub fn struct_kind(&self, struct_type: &str) -> StructKind {
        self.structs.get(struct_type).copied().unwrap_or(StructKind::Properties)
    }

    pub fn kind_count(&self) -> usize {
        self.kinds.len()
    }
}

impl Default for PropertyRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

/// Builder for [`PropertyRegistry`].
pub struct PropertyRegistryBuilder {
    kinds: AHashMap<&'static str, PropertyKind>,
    structs: AHashMap<String, StructKind>,
}

impl PropertyRegistryBuilder {
    pub fn new() -> Self {
        let kinds = PropertyKind::ALL.iter().map(|&kind| (kind.tag(), kind)).collect();
        let structs = StructKind::NATIVE
            .iter()
            .map(|&kind| (kind.type_name().to_string(), kind))
            .collect();
        Self { kinds, structs }
    }

    /// Treat `struct_type` as laid out like `kind`.
    pub fn struct_alias(mut self, struct_type: impl Into<String>, kind: StructKind) -> Self {
        self.structs.insert(struct_type.into(), kind);
        self
    }

    /// Stop recognising a kind; its properties are then skipped as raw.
    pub fn without_kind(mut self, kind: PropertyKind) -> Self {
        self.kinds.remove(kind.tag());
        self
    }

    pub fn build(self) -> PropertyRegistry {
        PropertyRegistry { kinds: self.kinds, structs: self.structs }
    }
}

impl Default for PropertyRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_tags() {
        let registry = PropertyRegistry::standard();
        assert_eq!(registry.kind_count(), PropertyKind::ALL.len());
        assert_eq!(registry.kind("IntProperty"), Some(PropertyKind::Int));
        assert_eq!(registry.kind("ArrayProperty"), Some(PropertyKind::Array));
        assert_eq!(registry.kind("SoftObjectProperty"), None);
    }

    #[test]
    fn test_struct_kinds() {
        let registry = PropertyRegistry::builder()
            .struct_alias("Vector_NetQuantize", StructKind::Vector)
            .build();
        assert_eq!(registry.struct_kind("Vector"), StructKind::Vector);
        assert_eq!(registry.struct_kind("UniqueNetIdRepl"), StructKind::UniqueNetId);
        assert_eq!(registry.struct_kind("Vector_NetQuantize"), StructKind::Vector);
        assert_eq!(registry.struct_kind("ItemNetID"), StructKind::Properties);
    }

    #[test]
    fn test_without_kind() {
        let registry = PropertyRegistry::builder().without_kind(PropertyKind::Double).build();
        assert_eq!(registry.kind("DoubleProperty"), None);
    }

    #[test]
    fn test_registry_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PropertyRegistry>();
    }
}
