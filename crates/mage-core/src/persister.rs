//! # Transactional Persister
//!
//! Create, update and read of registered modelables together with their
//! owned references.
//!
//! Every public operation runs as exactly one store transaction:
//! - references are persisted before their parent, in ascending field order
//! - a failure anywhere aborts the whole transaction
//! - keys assigned during a failed transaction are rolled back
//!
//! Successful writes are copied to the cache. Reads consult the cache first
//! and treat a hit as authoritative.

use crate::cache::{Cache, CacheLayer};
use crate::formats::entity::descriptor_of;
use crate::formats::{load_entity, to_entity};
use crate::record::Modelable;
use crate::registrar::Registrar;
use crate::schema::StructureRegistry;
use crate::storage::{Datastore, Transaction, TransactionOptions};
use crate::{Key, MageError};
use std::sync::Arc;

type Step = fn(&mut dyn Transaction, &mut dyn Modelable) -> Result<(), MageError>;

/// Persists modelables to a `Datastore`, with a write-through `Cache`.
#[derive(Debug)]
pub struct Persister<S, C> {
    registry: Arc<StructureRegistry>,
    store: S,
    cache: CacheLayer<C>,
    options: TransactionOptions,
}

impl<S: Datastore, C: Cache> Persister<S, C> {
    /// Persister with its own, empty structure registry.
    pub fn new(store: S, cache: C) -> Self {
        Self::with_registry(Arc::new(StructureRegistry::new()), store, cache)
    }

    /// Persister sharing `registry` with other persisters.
    pub fn with_registry(registry: Arc<StructureRegistry>, store: S, cache: C) -> Self {
        Self {
            registry,
            store,
            cache: CacheLayer::new(cache),
            options: TransactionOptions::cross_group(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: TransactionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn registry(&self) -> &Arc<StructureRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Give up the persister, keeping its store.
    pub fn into_store(self) -> S {
        self.store
    }

    pub fn cache(&self) -> &CacheLayer<C> {
        &self.cache
    }

    pub fn options(&self) -> TransactionOptions {
        self.options
    }

    // =========================================================================
    // REGISTRATION
    // =========================================================================

    /// Register `modelable` and its references. Idempotent.
    pub fn register(&self, modelable: &mut dyn Modelable) -> Result<(), MageError> {
        Registrar::new(&self.registry).register(modelable)
    }

    /// Rebuild the reference graph of an already-registered modelable.
    pub fn reregister(&self, modelable: &mut dyn Modelable) -> Result<(), MageError> {
        Registrar::new(&self.registry).reregister(modelable)
    }

    // =========================================================================
    // OPERATIONS
    // =========================================================================

    /// Insert `modelable` under a new key, creating or updating its references first.
    ///
    /// # Errors
    ///
    /// - `InvalidState` if `modelable` is not registered
    /// - `AlreadyCreated` if it already has a key (the store is not contacted)
    /// - any store error, after which no key assigned by this call remains set
    pub fn create(&self, modelable: &mut dyn Modelable) -> Result<(), MageError> {
        descriptor_of(modelable)?;
        if modelable.record().key().is_some() {
            return Err(already_created(modelable));
        }

        self.transact(modelable, create_in)?;
        tracing::debug!(key = ?modelable.record().key(), "create committed");
        self.cache.put(modelable);
        Ok(())
    }

    /// Overwrite the stored entity of `modelable` and of every keyed reference.
    ///
    /// # Errors
    ///
    /// `InvalidState` if unregistered, `MissingKey` if never created, or any
    /// store error.
    pub fn update(&self, modelable: &mut dyn Modelable) -> Result<(), MageError> {
        descriptor_of(modelable)?;
        require_key(modelable)?;

        self.transact(modelable, update_in)?;
        tracing::debug!(key = ?modelable.record().key(), "update committed");
        self.cache.put(modelable);
        Ok(())
    }

    /// Populate `modelable` and its references, from the cache if possible.
    ///
    /// # Errors
    ///
    /// `InvalidState` if unregistered, `MissingKey` if `modelable` or a
    /// registered reference has no key, `EntityNotFound` or any store error.
    pub fn read(&self, modelable: &mut dyn Modelable) -> Result<(), MageError> {
        descriptor_of(modelable)?;
        let key = require_key(modelable)?;

        match self.cache.get(modelable) {
            Ok(()) => {
                tracing::debug!(%key, "read served from cache");
                return Ok(());
            }
            Err(MageError::CacheMiss(_)) => {
                tracing::trace!(%key, "cache miss");
            }
            Err(e) => {
                tracing::warn!(%key, error = %e, "cache read failed, reading from store");
            }
        }

        self.transact(modelable, read_in)
    }

    /// Register `modelable` if needed, point it at `id` and read it.
    ///
    /// # Errors
    ///
    /// `InvalidKey` if `id` is not positive (the record is left untouched),
    /// otherwise the errors of [`Persister::read`].
    pub fn modelable_from_id(&self, modelable: &mut dyn Modelable, id: i64) -> Result<(), MageError> {
        if id <= 0 {
            return Err(MageError::InvalidKey(format!(
                "id must be positive, got {}",
                id
            )));
        }
        if !modelable.record().is_registered() {
            self.register(modelable)?;
        }
        let kind = descriptor_of(modelable)?.name();
        modelable.record_mut().set_key(Some(Key::new(kind, id)));
        self.read(modelable)
    }

    /// Run `step` on `modelable` inside one transaction, restoring the
    /// graph's keys before every attempt and after a failure.
    fn transact(&self, modelable: &mut dyn Modelable, step: Step) -> Result<(), MageError> {
        let keys = KeyState::capture(modelable);

        let result = self.store.run_in_transaction(self.options, &mut |txn| {
            keys.restore(&mut *modelable);
            step(txn, &mut *modelable)
        });

        if let Err(e) = &result {
            tracing::debug!(error = %e, "transaction failed, restoring keys");
            keys.restore(modelable);
        }
        result
    }
}

// =============================================================================
// RECURSIVE STEPS
// =============================================================================

fn create_in(txn: &mut dyn Transaction, modelable: &mut dyn Modelable) -> Result<(), MageError> {
    let descriptor = descriptor_of(modelable)?;
    if modelable.record().key().is_some() {
        return Err(already_created(modelable));
    }

    persist_references(txn, modelable)?;

    let entity = to_entity(modelable)?;
    let key = txn.put(&Key::incomplete(descriptor.name()), &entity)?;
    tracing::debug!(%key, "inserted entity");
    modelable.record_mut().set_key(Some(key));
    Ok(())
}

fn update_in(txn: &mut dyn Transaction, modelable: &mut dyn Modelable) -> Result<(), MageError> {
    descriptor_of(modelable)?;
    let key = require_key(modelable)?;

    persist_references(txn, modelable)?;

    let entity = to_entity(modelable)?;
    let written = txn.put(&key, &entity)?;
    if written != key {
        return Err(MageError::StoreError(format!(
            "update of {} was written at {}",
            key, written
        )));
    }
    tracing::debug!(%key, "overwrote entity");
    Ok(())
}

/// Create unkeyed and update keyed registered references, in field order.
/// Unregistered references are left alone.
fn persist_references(
    txn: &mut dyn Transaction,
    modelable: &mut dyn Modelable,
) -> Result<(), MageError> {
    let references = modelable.record().references().clone();
    let parent = modelable.structure().name;

    for (index, field) in references.iter() {
        let Some(reference) = modelable.reference_mut(index) else {
            continue;
        };
        if !reference.record().is_registered() {
            tracing::trace!(structure = parent, field, "skipping unregistered reference");
            continue;
        }

        let result = if reference.record().key().is_some() {
            update_in(txn, reference)
        } else {
            create_in(txn, reference)
        };
        if let Err(e) = result {
            tracing::error!(structure = parent, field, error = %e, "failed to persist reference");
            return Err(e);
        }
    }
    Ok(())
}

fn read_in(txn: &mut dyn Transaction, modelable: &mut dyn Modelable) -> Result<(), MageError> {
    descriptor_of(modelable)?;
    let key = require_key(modelable)?;

    let entity = txn.get(&key)?;
    load_entity(modelable, entity)?;
    tracing::debug!(%key, "read entity");

    let references = modelable.record().references().clone();
    for index in references.indices() {
        let Some(reference) = modelable.reference_mut(index) else {
            continue;
        };
        if !reference.record().is_registered() {
            continue;
        }
        read_in(txn, reference)?;
    }
    Ok(())
}

/// The record's key. An incomplete key counts as missing: only a store
/// allocation may complete it.
fn require_key(modelable: &dyn Modelable) -> Result<Key, MageError> {
    let record = modelable.record();
    record
        .key()
        .filter(|key| !key.is_incomplete())
        .cloned()
        .ok_or_else(|| MageError::MissingKey {
            kind: record.kind_label(),
        })
}

fn already_created(modelable: &dyn Modelable) -> MageError {
    MageError::AlreadyCreated {
        kind: modelable.record().kind_label(),
    }
}

// =============================================================================
// KEY ROLLBACK
// =============================================================================

/// Keys of a registered record graph, captured before a transaction.
#[derive(Debug)]
struct KeyState {
    key: Option<Key>,
    references: Vec<(usize, KeyState)>,
}

impl KeyState {
    fn capture(modelable: &dyn Modelable) -> Self {
        let record = modelable.record();
        let references = record
            .references()
            .indices()
            .filter_map(|index| {
                let reference = modelable.reference(index)?;
                reference
                    .record()
                    .is_registered()
                    .then(|| (index, Self::capture(reference)))
            })
            .collect();
        Self {
            key: record.key().cloned(),
            references,
        }
    }

    fn restore(&self, modelable: &mut dyn Modelable) {
        modelable.record_mut().set_key(self.key.clone());
        for (index, state) in &self.references {
            if let Some(reference) = modelable.reference_mut(*index) {
                state.restore(reference);
            }
        }
    }
}
