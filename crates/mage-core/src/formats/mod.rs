//! # Formats
//!
//! Pure transformations between records and bytes-adjacent forms:
//! - `entity`: modelable <-> store `Entity`
//! - `snapshot`: cached record graph <-> header-framed postcard bytes

pub mod entity;
pub mod snapshot;

pub use entity::{load_entity, reference_property, to_entity};
pub use snapshot::{Snapshot, SnapshotHeader, snapshot_from_bytes, snapshot_to_bytes};
