//! # Records
//!
//! The persistable capability (`Modelable`) and the metadata every
//! persistable instance embeds (`Record`).
//!
//! References are held as field indices. The nested instance itself stays
//! an ordinary owned field of its parent and is reached through
//! `Modelable::reference` / `Modelable::reference_mut`.

use crate::schema::{Descriptor, Structure};
use crate::{Key, MageError, Value};
use std::any::TypeId;
use std::collections::BTreeMap;
use std::sync::Arc;

// =============================================================================
// MODELABLE
// =============================================================================

/// A typed record that can be persisted by the engine.
///
/// Field indices are positions in [`Modelable::structure`]'s field list.
///
/// ```ignore
/// static ADDRESS: Structure = Structure::new(
///     "Address",
///     &[FieldDef::value("street", ""), FieldDef::value("city", "noindex")],
/// );
///
/// impl Modelable for Address {
///     fn structure(&self) -> &'static Structure { &ADDRESS }
///     fn record(&self) -> &Record { &self.record }
///     fn record_mut(&mut self) -> &mut Record { &mut self.record }
///     fn save_field(&self, index: usize) -> Option<Value> {
///         match index {
///             0 => Some(self.street.clone().into()),
///             1 => Some(self.city.clone().into()),
///             _ => None,
///         }
///     }
///     fn load_field(&mut self, index: usize, value: Value) -> Result<(), MageError> {
///         match index {
///             0 => self.street = value.into_text("street")?,
///             1 => self.city = value.into_text("city")?,
///             _ => {}
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Modelable: 'static {
    /// The type's declared field layout.
    fn structure(&self) -> &'static Structure;

    fn record(&self) -> &Record;

    fn record_mut(&mut self) -> &mut Record;

    /// Stored value of a `Value` field. `None` omits the property.
    fn save_field(&self, index: usize) -> Option<Value>;

    /// Restore a `Value` field from its stored value.
    fn load_field(&mut self, index: usize, value: Value) -> Result<(), MageError>;

    /// The nested modelable behind a `Reference` field.
    fn reference(&self, _index: usize) -> Option<&dyn Modelable> {
        None
    }

    fn reference_mut(&mut self, _index: usize) -> Option<&mut dyn Modelable> {
        None
    }

    /// Identity used to memoize descriptors.
    fn type_key(&self) -> TypeId {
        TypeId::of::<Self>()
    }
}

// =============================================================================
// REFERENCE MAP
// =============================================================================

/// Registered reference fields of one instance: field index -> field name.
///
/// Iterates in ascending field index, which is the order references are
/// persisted in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceMap {
    fields: BTreeMap<usize, &'static str>,
}

impl ReferenceMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, index: usize, name: &'static str) {
        self.fields.insert(index, name);
    }

    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        self.fields.contains_key(&index)
    }

    #[must_use]
    pub fn name(&self, index: usize) -> Option<&'static str> {
        self.fields.get(&index).copied()
    }

    /// Field indices in persistence order.
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.fields.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &'static str)> + '_ {
        self.fields.iter().map(|(i, n)| (*i, *n))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// =============================================================================
// RECORD
// =============================================================================

/// Persistence metadata embedded in every modelable.
///
/// A default `Record` is unregistered and keyless. Registration installs the
/// descriptor and reference map; the first successful create assigns the key.
#[derive(Debug, Clone, Default)]
pub struct Record {
    registered: bool,
    key: Option<Key>,
    descriptor: Option<Arc<Descriptor>>,
    references: ReferenceMap,
}

impl Record {
    /// A registered record, carrying over `key`.
    #[must_use]
    pub(crate) fn registered(
        descriptor: Arc<Descriptor>,
        references: ReferenceMap,
        key: Option<Key>,
    ) -> Self {
        Self {
            registered: true,
            key,
            descriptor: Some(descriptor),
            references,
        }
    }

    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.registered
    }

    #[must_use]
    pub fn key(&self) -> Option<&Key> {
        self.key.as_ref()
    }

    pub(crate) fn set_key(&mut self, key: Option<Key>) {
        self.key = key;
    }

    #[must_use]
    pub fn descriptor(&self) -> Option<&Arc<Descriptor>> {
        self.descriptor.as_ref()
    }

    #[must_use]
    pub fn references(&self) -> &ReferenceMap {
        &self.references
    }

    /// Numeric id of the stored entity, if created.
    #[must_use]
    pub fn id(&self) -> Option<i64> {
        self.key.as_ref().map(Key::id)
    }

    /// Name of the record's type, once registered.
    #[must_use]
    pub fn name(&self) -> Option<&'static str> {
        self.descriptor.as_ref().map(|d| d.name())
    }

    /// URL-safe encoded key, if created.
    #[must_use]
    pub fn encoded_key(&self) -> Option<String> {
        self.key.as_ref().map(Key::encode)
    }

    /// Kind used in errors and logs; falls back for unregistered records.
    pub(crate) fn kind_label(&self) -> String {
        self.name().unwrap_or("<unregistered>").to_string()
    }
}
