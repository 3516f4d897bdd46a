//! # In-Memory Store
//!
//! A volatile `Datastore` holding entities in a `BTreeMap`.
//!
//! Transactions hold the store lock for their whole attempt and stage their
//! writes; the staged writes (and id allocations) are applied only on commit.

use super::{
    Datastore, GroupTracker, Transaction, TransactionFn, TransactionOptions, next_id,
    retry_conflicts,
};
use crate::{Entity, Key, MageError};
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Operation counters, useful for asserting what a call actually did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Transaction attempts started.
    pub transactions: u64,
    pub puts: u64,
    pub gets: u64,
    pub commits: u64,
    pub rollbacks: u64,
}

#[derive(Debug, Default)]
struct MemoryState {
    entities: BTreeMap<Key, Entity>,
    next_ids: BTreeMap<String, i64>,
    stats: StoreStats,
    conflict_pending: bool,
}

/// In-memory primary store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().entities.is_empty()
    }

    /// Committed entity under `key`, outside any transaction.
    #[must_use]
    pub fn entity(&self, key: &Key) -> Option<Entity> {
        self.state.lock().entities.get(key).cloned()
    }

    #[must_use]
    pub fn stats(&self) -> StoreStats {
        self.state.lock().stats
    }

    /// Make the next commit fail with `MageError::Conflict`.
    pub fn inject_conflict(&self) {
        self.state.lock().conflict_pending = true;
    }

    /// Number of committed entities per kind, sorted by kind.
    #[must_use]
    pub fn kind_counts(&self) -> Vec<(String, usize)> {
        let state = self.state.lock();
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for key in state.entities.keys() {
            *counts.entry(key.kind()).or_insert(0) += 1;
        }
        counts
            .into_iter()
            .map(|(kind, count)| (kind.to_string(), count))
            .collect()
    }
}

impl Datastore for MemoryStore {
    fn run_in_transaction(
        &self,
        options: TransactionOptions,
        body: &mut TransactionFn<'_>,
    ) -> Result<(), MageError> {
        retry_conflicts(options, || {
            let mut state = self.state.lock();
            state.stats.transactions += 1;

            let mut txn = MemoryTransaction::new(&mut state, options);
            let outcome = body(&mut txn);
            let (staged, next_ids) = txn.into_parts();

            match outcome {
                Ok(()) if state.conflict_pending => {
                    state.conflict_pending = false;
                    state.stats.rollbacks += 1;
                    Err(MageError::Conflict(
                        "concurrent modification detected at commit".to_string(),
                    ))
                }
                Ok(()) => {
                    state.entities.extend(staged);
                    state.next_ids.extend(next_ids);
                    state.stats.commits += 1;
                    Ok(())
                }
                Err(e) => {
                    state.stats.rollbacks += 1;
                    Err(e)
                }
            }
        })
    }
}

// =============================================================================
// TRANSACTION
// =============================================================================

struct MemoryTransaction<'s> {
    state: &'s mut MemoryState,
    staged: BTreeMap<Key, Entity>,
    next_ids: BTreeMap<String, i64>,
    groups: GroupTracker,
}

impl<'s> MemoryTransaction<'s> {
    fn new(state: &'s mut MemoryState, options: TransactionOptions) -> Self {
        Self {
            state,
            staged: BTreeMap::new(),
            next_ids: BTreeMap::new(),
            groups: GroupTracker::new(options),
        }
    }

    fn into_parts(self) -> (BTreeMap<Key, Entity>, BTreeMap<String, i64>) {
        (self.staged, self.next_ids)
    }

    fn last_id(&self, kind: &str) -> i64 {
        self.next_ids
            .get(kind)
            .or_else(|| self.state.next_ids.get(kind))
            .copied()
            .unwrap_or(0)
    }

    /// Complete `key`, allocating an id if needed. Explicit ids push the
    /// allocator past them so later allocations never collide.
    fn complete(&mut self, key: &Key) -> Result<Key, MageError> {
        let last = self.last_id(key.kind());
        if key.is_incomplete() {
            let id = next_id(key.kind(), last)?;
            self.next_ids.insert(key.kind().to_string(), id);
            Ok(Key::new(key.kind(), id))
        } else {
            if key.id() > last {
                self.next_ids.insert(key.kind().to_string(), key.id());
            }
            Ok(key.clone())
        }
    }
}

impl Transaction for MemoryTransaction<'_> {
    fn put(&mut self, key: &Key, entity: &Entity) -> Result<Key, MageError> {
        let key = self.complete(key)?;
        self.groups.touch(&key)?;
        self.state.stats.puts += 1;
        self.staged.insert(key.clone(), entity.clone());
        Ok(key)
    }

    fn get(&mut self, key: &Key) -> Result<Entity, MageError> {
        self.groups.touch(key)?;
        self.state.stats.gets += 1;
        self.staged
            .get(key)
            .or_else(|| self.state.entities.get(key))
            .cloned()
            .ok_or_else(|| MageError::EntityNotFound(key.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::{Property, Value};

    fn entity(kind: &str, name: &str) -> Entity {
        Entity::new(kind, vec![Property::new("name", Value::from(name), true)])
    }

    fn put(store: &MemoryStore, key: Key, e: Entity) -> Result<Key, MageError> {
        let mut written = None;
        store.run_in_transaction(TransactionOptions::cross_group(), &mut |txn| {
            written = Some(txn.put(&key, &e)?);
            Ok(())
        })?;
        Ok(written.expect("written"))
    }

    #[test]
    fn incomplete_keys_get_sequential_ids() {
        let store = MemoryStore::new();
        let a = put(&store, Key::incomplete("Person"), entity("Person", "a")).expect("put");
        let b = put(&store, Key::incomplete("Person"), entity("Person", "b")).expect("put");
        let c = put(&store, Key::incomplete("Address"), entity("Address", "c")).expect("put");
        assert_eq!(a, Key::new("Person", 1));
        assert_eq!(b, Key::new("Person", 2));
        assert_eq!(c, Key::new("Address", 1));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn explicit_id_advances_allocator() {
        let store = MemoryStore::new();
        put(&store, Key::new("Person", 42), entity("Person", "x")).expect("put");
        let next = put(&store, Key::incomplete("Person"), entity("Person", "y")).expect("put");
        assert_eq!(next.id(), 43);
    }

    #[test]
    fn exhausted_id_space_is_an_error() {
        let store = MemoryStore::new();
        put(&store, Key::new("Person", i64::MAX), entity("Person", "last")).expect("put");
        let result = put(&store, Key::incomplete("Person"), entity("Person", "next"));
        assert!(matches!(result, Err(MageError::StoreError(_))));
        assert_eq!(store.len(), 1);

        let other = put(&store, Key::incomplete("Address"), entity("Address", "a")).expect("put");
        assert_eq!(other.id(), 1);
    }

    #[test]
    fn failed_body_discards_writes_and_ids() {
        let store = MemoryStore::new();
        let result = store.run_in_transaction(TransactionOptions::cross_group(), &mut |txn| {
            txn.put(&Key::incomplete("Person"), &entity("Person", "gone"))?;
            Err(MageError::StoreError("boom".to_string()))
        });
        assert!(result.is_err());
        assert!(store.is_empty());
        assert_eq!(store.stats().rollbacks, 1);

        let key = put(&store, Key::incomplete("Person"), entity("Person", "kept")).expect("put");
        assert_eq!(key.id(), 1);
    }

    #[test]
    fn reads_see_staged_writes() {
        let store = MemoryStore::new();
        store
            .run_in_transaction(TransactionOptions::cross_group(), &mut |txn| {
                let key = txn.put(&Key::incomplete("Person"), &entity("Person", "ada"))?;
                let read = txn.get(&key)?;
                assert_eq!(read, entity("Person", "ada"));
                Ok(())
            })
            .expect("transaction");
    }

    #[test]
    fn missing_entity_is_not_found() {
        let store = MemoryStore::new();
        let result = store.run_in_transaction(TransactionOptions::cross_group(), &mut |txn| {
            txn.get(&Key::new("Person", 9)).map(|_| ())
        });
        assert!(matches!(result, Err(MageError::EntityNotFound(_))));
    }

    #[test]
    fn injected_conflict_rolls_back_once() {
        let store = MemoryStore::new();
        store.inject_conflict();
        let result = put(&store, Key::incomplete("Person"), entity("Person", "a"));
        assert!(matches!(result, Err(MageError::Conflict(_))));
        assert!(store.is_empty());

        put(&store, Key::incomplete("Person"), entity("Person", "a")).expect("second put");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn conflict_retried_with_more_attempts() {
        let store = MemoryStore::new();
        store.inject_conflict();
        let mut runs = 0;
        store
            .run_in_transaction(TransactionOptions::cross_group().with_attempts(2), &mut |txn| {
                runs += 1;
                txn.put(&Key::incomplete("Person"), &entity("Person", "a"))?;
                Ok(())
            })
            .expect("second attempt commits");
        assert_eq!(runs, 2);
        assert_eq!(store.stats().commits, 1);
        assert_eq!(store.entity(&Key::new("Person", 1)), Some(entity("Person", "a")));
    }

    #[test]
    fn single_group_rejects_second_key() {
        let store = MemoryStore::new();
        let result = store.run_in_transaction(TransactionOptions::single_group(), &mut |txn| {
            txn.put(&Key::new("Person", 1), &entity("Person", "a"))?;
            txn.put(&Key::new("Person", 2), &entity("Person", "b"))?;
            Ok(())
        });
        assert!(matches!(result, Err(MageError::StoreError(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn kind_counts_sorted() {
        let store = MemoryStore::new();
        put(&store, Key::incomplete("Person"), entity("Person", "a")).expect("put");
        put(&store, Key::incomplete("Address"), entity("Address", "b")).expect("put");
        put(&store, Key::incomplete("Person"), entity("Person", "c")).expect("put");
        assert_eq!(
            store.kind_counts(),
            vec![("Address".to_string(), 1), ("Person".to_string(), 2)]
        );
    }
}
