//! # redb-backed Store
//!
//! A disk-backed `Datastore` using the redb embedded database.
//!
//! Each transaction attempt maps onto one redb write transaction:
//! - committed when the body returns `Ok`
//! - aborted on any error, leaving the file untouched
//!
//! Entities are postcard-encoded. Id allocation lives in its own table and
//! is part of the same write transaction, so aborted attempts give their
//! ids back.

use super::{
    Datastore, GroupTracker, Transaction, TransactionFn, TransactionOptions, next_id,
    retry_conflicts,
};
use crate::{Entity, Key, MageError};
use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition,
    WriteTransaction,
};
use std::collections::BTreeMap;
use std::path::Path;

/// Table for entities: (kind, id) -> serialized Entity bytes
const ENTITIES: TableDefinition<(&str, i64), &[u8]> = TableDefinition::new("entities");

/// Table for id allocation: kind -> last id handed out
const NEXT_IDS: TableDefinition<&str, i64> = TableDefinition::new("next_ids");

/// A disk-backed primary store using redb.
pub struct RedbStore {
    db: Database,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MageError> {
        let db = Database::create(path.as_ref()).map_err(|e| MageError::IoError(e.to_string()))?;

        {
            let write_txn = db
                .begin_write()
                .map_err(|e| MageError::IoError(e.to_string()))?;
            let _ = write_txn
                .open_table(ENTITIES)
                .map_err(|e| MageError::IoError(e.to_string()))?;
            let _ = write_txn
                .open_table(NEXT_IDS)
                .map_err(|e| MageError::IoError(e.to_string()))?;
            write_txn
                .commit()
                .map_err(|e| MageError::IoError(e.to_string()))?;
        }

        tracing::debug!(path = %path.as_ref().display(), "opened redb store");
        Ok(Self { db })
    }

    /// Compact the database file.
    pub fn compact(&mut self) -> Result<(), MageError> {
        self.db
            .compact()
            .map_err(|e| MageError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Number of committed entities.
    pub fn len(&self) -> Result<usize, MageError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| MageError::IoError(e.to_string()))?;
        let table = read_txn
            .open_table(ENTITIES)
            .map_err(|e| MageError::IoError(e.to_string()))?;
        let count = table.len().map_err(|e| MageError::IoError(e.to_string()))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool, MageError> {
        Ok(self.len()? == 0)
    }

    /// Committed entity under `key`, outside any transaction.
    pub fn entity(&self, key: &Key) -> Result<Option<Entity>, MageError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| MageError::IoError(e.to_string()))?;
        let table = read_txn
            .open_table(ENTITIES)
            .map_err(|e| MageError::IoError(e.to_string()))?;

        match table
            .get((key.kind(), key.id()))
            .map_err(|e| MageError::IoError(e.to_string()))?
        {
            Some(data) => Ok(Some(decode_entity(data.value())?)),
            None => Ok(None),
        }
    }

    /// Number of committed entities per kind, sorted by kind.
    pub fn kind_counts(&self) -> Result<Vec<(String, usize)>, MageError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| MageError::IoError(e.to_string()))?;
        let table = read_txn
            .open_table(ENTITIES)
            .map_err(|e| MageError::IoError(e.to_string()))?;

        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for entry in table.iter().map_err(|e| MageError::IoError(e.to_string()))? {
            let (key, _) = entry.map_err(|e| MageError::IoError(e.to_string()))?;
            let (kind, _) = key.value();
            *counts.entry(kind.to_string()).or_insert(0) += 1;
        }
        Ok(counts.into_iter().collect())
    }

    fn attempt(
        &self,
        options: TransactionOptions,
        body: &mut TransactionFn<'_>,
    ) -> Result<(), MageError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| MageError::IoError(e.to_string()))?;

        let outcome = {
            let mut txn = RedbTransaction {
                txn: &write_txn,
                groups: GroupTracker::new(options),
            };
            body(&mut txn)
        };

        match outcome {
            Ok(()) => write_txn
                .commit()
                .map_err(|e| MageError::IoError(e.to_string())),
            Err(e) => {
                if let Err(abort) = write_txn.abort() {
                    tracing::warn!(error = %abort, "failed to abort redb transaction");
                }
                Err(e)
            }
        }
    }
}

impl Datastore for RedbStore {
    fn run_in_transaction(
        &self,
        options: TransactionOptions,
        body: &mut TransactionFn<'_>,
    ) -> Result<(), MageError> {
        retry_conflicts(options, || self.attempt(options, body))
    }
}

// =============================================================================
// TRANSACTION
// =============================================================================

struct RedbTransaction<'t> {
    txn: &'t WriteTransaction,
    groups: GroupTracker,
}

impl RedbTransaction<'_> {
    /// Complete `key` against the id table. Explicit ids push the allocator
    /// past them so later allocations never collide.
    fn complete(&self, key: &Key) -> Result<Key, MageError> {
        let mut table = self
            .txn
            .open_table(NEXT_IDS)
            .map_err(|e| MageError::IoError(e.to_string()))?;
        let last = table
            .get(key.kind())
            .map_err(|e| MageError::IoError(e.to_string()))?
            .map(|v| v.value())
            .unwrap_or(0);

        let id = if key.is_incomplete() {
            next_id(key.kind(), last)?
        } else {
            key.id()
        };
        if id > last {
            table
                .insert(key.kind(), id)
                .map_err(|e| MageError::IoError(e.to_string()))?;
        }
        Ok(Key::new(key.kind(), id))
    }
}

impl Transaction for RedbTransaction<'_> {
    fn put(&mut self, key: &Key, entity: &Entity) -> Result<Key, MageError> {
        let key = self.complete(key)?;
        self.groups.touch(&key)?;

        let bytes =
            postcard::to_allocvec(entity).map_err(|e| MageError::SerializationError(e.to_string()))?;
        let mut table = self
            .txn
            .open_table(ENTITIES)
            .map_err(|e| MageError::IoError(e.to_string()))?;
        table
            .insert((key.kind(), key.id()), bytes.as_slice())
            .map_err(|e| MageError::IoError(e.to_string()))?;
        Ok(key)
    }

    fn get(&mut self, key: &Key) -> Result<Entity, MageError> {
        self.groups.touch(key)?;

        let table = self
            .txn
            .open_table(ENTITIES)
            .map_err(|e| MageError::IoError(e.to_string()))?;
        match table
            .get((key.kind(), key.id()))
            .map_err(|e| MageError::IoError(e.to_string()))?
        {
            Some(data) => decode_entity(data.value()),
            None => Err(MageError::EntityNotFound(key.to_string())),
        }
    }
}

fn decode_entity(bytes: &[u8]) -> Result<Entity, MageError> {
    postcard::from_bytes(bytes).map_err(|e| MageError::SerializationError(e.to_string()))
}
