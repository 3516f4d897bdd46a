//! # Engine Primitives
//!
//! Fixed constants shared by the engine, the stores and the cache format.
//! They are compiled in and never change at runtime.

/// Prefix of the property that stores a reference's key inside its parent.
///
/// A `home` reference is persisted as `ref_home` holding `Value::Key`.
pub const REF_PREFIX: &str = "ref_";

/// Magic bytes heading every cached snapshot blob.
pub const MAGIC_BYTES: &[u8; 4] = b"MAGE";

/// Current snapshot format version.
///
/// Bump on breaking changes; old blobs then fail header validation and are
/// treated as cache misses.
pub const FORMAT_VERSION: u8 = 1;

/// Upper bound on a cached snapshot, checked before decoding.
pub const MAX_SNAPSHOT_SIZE: usize = 1024 * 1024;

/// Number of attempts a persister transaction gets. Conflicts are not retried.
pub const TRANSACTION_ATTEMPTS: u32 = 1;

/// Maximum entity groups one cross-group transaction may touch.
pub const MAX_TRANSACTION_GROUPS: usize = 25;

/// Default number of snapshots held by `MemoryCache`.
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;
