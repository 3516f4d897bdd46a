//! # Schema
//!
//! Explicit field layouts and their parsed, per-type descriptors.
//!
//! A modelable type declares its fields once, as a `&'static Structure`.
//! The `StructureRegistry` turns that declaration into a `Descriptor` the
//! first time the type is seen and hands out the same `Arc` forever after.

use crate::record::Modelable;
use parking_lot::Mutex;
use std::any::TypeId;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

// =============================================================================
// DIRECTIVES
// =============================================================================

/// Persistence directive of a field, parsed from the first token of its tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Directive {
    /// No directive.
    #[default]
    Plain,
    /// Never persisted, never a reference.
    Skip,
    /// Marked for full-text search. Stored like `Plain`.
    Search,
    /// Stored but not indexed.
    NoIndex,
}

impl Directive {
    /// Parse a comma-separated tag. Only the first token counts; unknown
    /// tokens parse as `Plain`.
    #[must_use]
    pub fn parse(tag: &str) -> Self {
        match tag.split(',').next().unwrap_or_default().trim() {
            "skip" | "-" => Self::Skip,
            "search" => Self::Search,
            "noindex" => Self::NoIndex,
            _ => Self::Plain,
        }
    }

    #[must_use]
    pub fn is_skip(self) -> bool {
        self == Self::Skip
    }

    #[must_use]
    pub fn is_indexed(self) -> bool {
        self != Self::NoIndex
    }
}

// =============================================================================
// STRUCTURE (declared)
// =============================================================================

/// Shape of a declared field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Stored inline through `save_field` / `load_field`.
    Value,
    /// A nested modelable reached through `reference` / `reference_mut`.
    Reference,
}

/// One declared field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub tag: &'static str,
    pub kind: FieldKind,
}

impl FieldDef {
    #[must_use]
    pub const fn value(name: &'static str, tag: &'static str) -> Self {
        Self {
            name,
            tag,
            kind: FieldKind::Value,
        }
    }

    #[must_use]
    pub const fn reference(name: &'static str, tag: &'static str) -> Self {
        Self {
            name,
            tag,
            kind: FieldKind::Reference,
        }
    }
}

/// Static field layout of a modelable type.
///
/// Field indices used throughout the engine are positions in `fields`.
#[derive(Debug, PartialEq, Eq)]
pub struct Structure {
    pub name: &'static str,
    pub fields: &'static [FieldDef],
}

impl Structure {
    #[must_use]
    pub const fn new(name: &'static str, fields: &'static [FieldDef]) -> Self {
        Self { name, fields }
    }
}

// =============================================================================
// DESCRIPTOR (parsed)
// =============================================================================

/// A field with its directive resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    name: &'static str,
    kind: FieldKind,
    directive: Directive,
}

impl FieldDescriptor {
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    #[must_use]
    pub fn directive(&self) -> Directive {
        self.directive
    }
}

/// Per-type field/directive mapping. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    name: &'static str,
    fields: Vec<FieldDescriptor>,
}

impl Descriptor {
    #[must_use]
    pub fn from_structure(structure: &Structure) -> Self {
        let fields = structure
            .fields
            .iter()
            .map(|def| FieldDescriptor {
                name: def.name,
                kind: def.kind,
                directive: Directive::parse(def.tag),
            })
            .collect();
        Self {
            name: structure.name,
            fields,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    #[must_use]
    pub fn field(&self, index: usize) -> Option<&FieldDescriptor> {
        self.fields.get(index)
    }

    /// Index of the field with the given name.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

// =============================================================================
// STRUCTURE REGISTRY
// =============================================================================

type DescriptorCell = Arc<OnceLock<Arc<Descriptor>>>;

/// Process-wide (but explicitly owned) cache of descriptors, keyed by type.
///
/// The map lock only guards cell lookup. Building the descriptor happens in
/// the type's own `OnceLock`, so two threads describing the same type for
/// the first time build it once, and different types never wait on each
/// other.
#[derive(Debug, Default)]
pub struct StructureRegistry {
    cells: Mutex<BTreeMap<TypeId, DescriptorCell>>,
}

impl StructureRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Descriptor for the instance's type, built on first call.
    pub fn describe(&self, modelable: &dyn Modelable) -> Arc<Descriptor> {
        let cell = {
            let mut cells = self.cells.lock();
            Arc::clone(cells.entry(modelable.type_key()).or_default())
        };
        Arc::clone(cell.get_or_init(|| {
            let structure = modelable.structure();
            tracing::debug!(
                structure = structure.name,
                fields = structure.fields.len(),
                "describing structure"
            );
            Arc::new(Descriptor::from_structure(structure))
        }))
    }

    /// True when the instance's type has been described.
    #[must_use]
    pub fn contains(&self, modelable: &dyn Modelable) -> bool {
        self.cells
            .lock()
            .get(&modelable.type_key())
            .is_some_and(|cell| cell.get().is_some())
    }

    /// Number of described types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells
            .lock()
            .values()
            .filter(|cell| cell.get().is_some())
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
