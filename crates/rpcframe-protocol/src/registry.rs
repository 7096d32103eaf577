//! Declared-type registry.
//!
//! Polymorphic values of enum or model kind carry a declared type name on the
//! wire. The reading side resolves that name through a [`DeclaredTypes`]
//! implementation handed to [`Protocol`](crate::Protocol) at construction.

use std::collections::HashMap;
use std::fmt;

/// Opaque handle for a registered declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeclaredTypeId(pub u32);

impl fmt::Display for DeclaredTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclaredKind {
    Enum,
    Model,
}

impl fmt::Display for DeclaredKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclaredKind::Enum => f.write_str("enum"),
            DeclaredKind::Model => f.write_str("model"),
        }
    }
}

/// Lookup contract between the protocol and whatever owns the declared types.
pub trait DeclaredTypes: Send + Sync {
    /// Map a declared type name to its id.
    fn resolve_discriminant(&self, type_name: &str) -> Option<DeclaredTypeId>;

    /// Map an id back to its declared type name.
    fn resolve_type_name(&self, id: DeclaredTypeId) -> Option<&str>;

    fn kind_of(&self, id: DeclaredTypeId) -> Option<DeclaredKind>;

    /// Variant name for an enum ordinal. `None` for unknown ordinals and non-enum types.
    fn enum_variant(&self, id: DeclaredTypeId, ordinal: i64) -> Option<&str>;
}

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    kind: DeclaredKind,
    variants: Vec<String>,
}

/// In-memory [`DeclaredTypes`] implementation.
///
/// Ids are assigned in registration order. Registering a name again replaces
/// its definition and keeps its id.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    by_name: HashMap<String, DeclaredTypeId>,
    entries: Vec<Entry>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an enum; variant ordinals follow iteration order starting at 0.
    pub fn register_enum<I, S>(&mut self, name: impl Into<String>, variants: I) -> DeclaredTypeId
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let variants = variants.into_iter().map(Into::into).collect();
        self.insert(name.into(), DeclaredKind::Enum, variants)
    }

    pub fn register_model(&mut self, name: impl Into<String>) -> DeclaredTypeId {
        self.insert(name.into(), DeclaredKind::Model, Vec::new())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, name: String, kind: DeclaredKind, variants: Vec<String>) -> DeclaredTypeId {
        let entry = Entry {
            name: name.clone(),
            kind,
            variants,
        };
        if let Some(&id) = self.by_name.get(&name) {
            self.entries[id.0 as usize] = entry;
            return id;
        }
        let id = DeclaredTypeId(self.entries.len() as u32);
        self.entries.push(entry);
        self.by_name.insert(name, id);
        id
    }

    fn entry(&self, id: DeclaredTypeId) -> Option<&Entry> {
        self.entries.get(id.0 as usize)
    }
}

impl DeclaredTypes for TypeRegistry {
    fn resolve_discriminant(&self, type_name: &str) -> Option<DeclaredTypeId> {
        self.by_name.get(type_name).copied()
    }

    fn resolve_type_name(&self, id: DeclaredTypeId) -> Option<&str> {
        self.entry(id).map(|e| e.name.as_str())
    }

    fn kind_of(&self, id: DeclaredTypeId) -> Option<DeclaredKind> {
        self.entry(id).map(|e| e.kind)
    }

    fn enum_variant(&self, id: DeclaredTypeId, ordinal: i64) -> Option<&str> {
        let entry = self.entry(id).filter(|e| e.kind == DeclaredKind::Enum)?;
        let index = usize::try_from(ordinal).ok()?;
        entry.variants.get(index).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_and_ids_resolve_both_ways() {
        let mut registry = TypeRegistry::new();
        let color = registry.register_enum("Color", ["Red", "Green", "Blue"]);
        let point = registry.register_model("Point");

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.resolve_discriminant("Color"), Some(color));
        assert_eq!(registry.resolve_type_name(point), Some("Point"));
        assert_eq!(registry.kind_of(color), Some(DeclaredKind::Enum));
        assert_eq!(registry.kind_of(point), Some(DeclaredKind::Model));
        assert_eq!(registry.resolve_discriminant("Missing"), None);
        assert_eq!(registry.resolve_type_name(DeclaredTypeId(99)), None);
    }

    #[test]
    fn enum_variants_by_ordinal() {
        let mut registry = TypeRegistry::new();
        let color = registry.register_enum("Color", ["Red", "Green"]);
        let point = registry.register_model("Point");

        assert_eq!(registry.enum_variant(color, 1), Some("Green"));
        assert_eq!(registry.enum_variant(color, 2), None);
        assert_eq!(registry.enum_variant(color, -1), None);
        assert_eq!(registry.enum_variant(point, 0), None);
    }

    #[test]
    fn reregistering_keeps_id() {
        let mut registry = TypeRegistry::new();
        let first = registry.register_enum("Mode", ["A"]);
        let second = registry.register_enum("Mode", ["A", "B"]);
        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.enum_variant(second, 1), Some("B"));
    }
}
