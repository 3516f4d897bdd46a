//! # mage-core
//!
//! Object-to-document mapping engine for Mage.
//!
//! Typed records ("modelables") are persisted to and loaded from a
//! transactional key/value document store. Nested records are owned
//! references: they are created, updated and read in the same transaction
//! as their parent. A best-effort cache sits in front of reads.
//!
//! ## Layout
//!
//! - `schema`: declared field layouts and the memoized `StructureRegistry`
//! - `record` / `registrar`: per-instance metadata and reference maps
//! - `formats`: record <-> entity, record graph <-> cached bytes
//! - `storage`: the `Datastore` seam with in-memory and redb stores
//! - `cache`: the `Cache` seam, an LRU cache and the snapshot layer
//! - `persister`: create / update / read / modelable_from_id
//!
//! ## Architectural Constraints
//!
//! - Pure Rust: no async, no network dependencies
//! - Explicit schema: types declare their fields, nothing is reflected
//! - Deterministic: references are persisted in ascending field order

// =============================================================================
// MODULES
// =============================================================================

pub mod cache;
pub mod formats;
pub mod persister;
pub mod primitives;
pub mod record;
pub mod registrar;
pub mod schema;
pub mod storage;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{Entity, Key, MageError, Property, Value};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use cache::{Cache, CacheLayer, MemoryCache};
pub use persister::Persister;
pub use record::{Modelable, Record, ReferenceMap};
pub use registrar::Registrar;
pub use schema::{
    Descriptor, Directive, FieldDef, FieldDescriptor, FieldKind, Structure, StructureRegistry,
};
pub use storage::{
    Datastore, MemoryStore, RedbStore, StorageBackend, StoreStats, Transaction, TransactionFn,
    TransactionOptions,
};

// =============================================================================
// RE-EXPORTS: Formats (from formats module)
// =============================================================================

pub use formats::{Snapshot, SnapshotHeader, snapshot_from_bytes, snapshot_to_bytes};
