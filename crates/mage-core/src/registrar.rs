//! # Registrar
//!
//! Walks an instance's declared fields, registers every nested reference,
//! and installs the instance's `Record`.

use crate::record::{Modelable, Record, ReferenceMap};
use crate::schema::{Descriptor, FieldKind, StructureRegistry};
use crate::MageError;
use std::sync::Arc;

/// Registers modelables against a `StructureRegistry`.
#[derive(Debug, Clone, Copy)]
pub struct Registrar<'r> {
    registry: &'r StructureRegistry,
}

/// How an already-registered instance is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Keep the existing record; the rebuilt graph is discarded.
    Register,
    /// Install the rebuilt graph unconditionally.
    Refresh,
}

impl<'r> Registrar<'r> {
    #[must_use]
    pub fn new(registry: &'r StructureRegistry) -> Self {
        Self { registry }
    }

    /// Register `modelable` and, recursively, its references.
    ///
    /// Idempotent: on an already-registered instance the walk still runs
    /// (and registers any reference that was replaced since), but the
    /// instance's own record is left untouched.
    pub fn register(&self, modelable: &mut dyn Modelable) -> Result<(), MageError> {
        self.walk(modelable, Mode::Register)
    }

    /// Rebuild and install the descriptor and reference map of `modelable`
    /// and of every reachable reference. Keys are preserved.
    pub fn reregister(&self, modelable: &mut dyn Modelable) -> Result<(), MageError> {
        self.walk(modelable, Mode::Refresh)
    }

    fn walk(&self, modelable: &mut dyn Modelable, mode: Mode) -> Result<(), MageError> {
        let descriptor = self.registry.describe(modelable);
        let references = self.map_references(modelable, &descriptor, mode)?;

        let record = modelable.record_mut();
        if record.is_registered() && mode == Mode::Register {
            tracing::trace!(
                structure = descriptor.name(),
                "already registered, keeping existing record"
            );
            return Ok(());
        }

        let key = record.key().cloned();
        *record = Record::registered(descriptor, references, key);
        Ok(())
    }

    fn map_references(
        &self,
        modelable: &mut dyn Modelable,
        descriptor: &Arc<Descriptor>,
        mode: Mode,
    ) -> Result<ReferenceMap, MageError> {
        let mut references = ReferenceMap::new();

        for (index, field) in descriptor.fields().iter().enumerate() {
            if field.kind() != FieldKind::Reference {
                continue;
            }
            if field.directive().is_skip() {
                tracing::trace!(
                    structure = descriptor.name(),
                    field = field.name(),
                    "field is skippable"
                );
                continue;
            }

            let Some(reference) = modelable.reference_mut(index) else {
                return Err(MageError::UnaddressableField {
                    structure: descriptor.name().to_string(),
                    field: field.name().to_string(),
                });
            };
            self.walk(reference, mode)?;
            references.insert(index, field.name());
        }

        Ok(references)
    }
}
