//! # Primary Store
//!
//! The transactional key/value collaborator the persister writes through.
//!
//! Two implementations:
//! - `MemoryStore`: in-process, staged writes, used by tests and `--backend memory`
//! - `RedbStore`: disk-backed ACID storage on redb
//!
//! `StorageBackend` picks one at runtime.

mod memory;
mod redb_store;

pub use memory::{MemoryStore, StoreStats};
pub use redb_store::RedbStore;

use crate::primitives::{MAX_TRANSACTION_GROUPS, TRANSACTION_ATTEMPTS};
use crate::{Entity, Key, MageError};
use std::collections::BTreeSet;

// =============================================================================
// TRAITS
// =============================================================================

/// Operations available inside one store transaction.
pub trait Transaction {
    /// Write `entity` under `key`. An incomplete key gets a fresh id; the
    /// key actually written is returned.
    fn put(&mut self, key: &Key, entity: &Entity) -> Result<Key, MageError>;

    /// Read the entity stored under `key`.
    fn get(&mut self, key: &Key) -> Result<Entity, MageError>;
}

/// Body of a transaction. May run once per attempt.
pub type TransactionFn<'a> = dyn FnMut(&mut dyn Transaction) -> Result<(), MageError> + 'a;

/// A store that runs closures inside transactions.
///
/// The closure's writes become visible only if it returns `Ok` and the
/// commit succeeds. A `Conflict` is retried while attempts remain; every
/// other error aborts immediately and is returned unchanged.
pub trait Datastore {
    fn run_in_transaction(
        &self,
        options: TransactionOptions,
        body: &mut TransactionFn<'_>,
    ) -> Result<(), MageError>;
}

// =============================================================================
// OPTIONS
// =============================================================================

/// How a transaction may span entity groups and how often it is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionOptions {
    /// Allow touching more than one entity group.
    pub cross_group: bool,
    /// Total attempts; values below 1 count as 1.
    pub attempts: u32,
}

impl TransactionOptions {
    /// Cross-group, single attempt. What the persister uses.
    #[must_use]
    pub fn cross_group() -> Self {
        Self {
            cross_group: true,
            attempts: TRANSACTION_ATTEMPTS,
        }
    }

    /// One entity group, single attempt.
    #[must_use]
    pub fn single_group() -> Self {
        Self {
            cross_group: false,
            attempts: TRANSACTION_ATTEMPTS,
        }
    }

    #[must_use]
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts.max(1)
    }

    fn group_limit(&self) -> usize {
        if self.cross_group {
            MAX_TRANSACTION_GROUPS
        } else {
            1
        }
    }
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self::cross_group()
    }
}

// =============================================================================
// ENTITY GROUPS
// =============================================================================

/// Tracks the entity groups a transaction touched and enforces the limit.
///
/// Every key is its own group; keys have no ancestors.
#[derive(Debug)]
pub(crate) struct GroupTracker {
    groups: BTreeSet<Key>,
    limit: usize,
}

impl GroupTracker {
    pub(crate) fn new(options: TransactionOptions) -> Self {
        Self {
            groups: BTreeSet::new(),
            limit: options.group_limit(),
        }
    }

    pub(crate) fn touch(&mut self, key: &Key) -> Result<(), MageError> {
        if self.groups.contains(key) {
            return Ok(());
        }
        if self.groups.len() >= self.limit {
            return Err(MageError::StoreError(format!(
                "transaction touches more than {} entity group(s)",
                self.limit
            )));
        }
        self.groups.insert(key.clone());
        Ok(())
    }
}

/// Id following `last` in `kind`. Fails once the id space is exhausted.
pub(crate) fn next_id(kind: &str, last: i64) -> Result<i64, MageError> {
    last.checked_add(1)
        .ok_or_else(|| MageError::StoreError(format!("id space exhausted for kind {}", kind)))
}

/// Run `attempt` until it succeeds, fails with a non-conflict error, or the
/// attempts are used up.
pub(crate) fn retry_conflicts(
    options: TransactionOptions,
    mut attempt: impl FnMut() -> Result<(), MageError>,
) -> Result<(), MageError> {
    let attempts = options.attempts();
    let mut round = 1;
    loop {
        match attempt() {
            Err(MageError::Conflict(reason)) if round < attempts => {
                tracing::debug!(round, attempts, %reason, "transaction conflict, retrying");
                round += 1;
            }
            other => return other,
        }
    }
}

// =============================================================================
// BACKEND SELECTION
// =============================================================================

/// Storage backend chosen at runtime.
#[derive(Debug)]
pub enum StorageBackend {
    /// In-memory store (fast, volatile).
    InMemory(MemoryStore),
    /// Disk-backed store using redb (ACID, persistent).
    Persistent(RedbStore),
}

impl StorageBackend {
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self, Self::Persistent(_))
    }

    /// Number of stored entities per kind.
    pub fn kind_counts(&self) -> Result<Vec<(String, usize)>, MageError> {
        match self {
            Self::InMemory(store) => Ok(store.kind_counts()),
            Self::Persistent(store) => store.kind_counts(),
        }
    }
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::InMemory(MemoryStore::new())
    }
}

impl Datastore for StorageBackend {
    fn run_in_transaction(
        &self,
        options: TransactionOptions,
        body: &mut TransactionFn<'_>,
    ) -> Result<(), MageError> {
        match self {
            Self::InMemory(store) => store.run_in_transaction(options, body),
            Self::Persistent(store) => store.run_in_transaction(options, body),
        }
    }
}
