//! # Snapshot Format
//!
//! Binary form of a cached record graph.
//!
//! Format: Header (5 bytes) + postcard-serialized `Snapshot`.
//! - 4 bytes: Magic ("MAGE")
//! - 1 byte: Version
//!
//! Size and header are validated before the payload is decoded, so a blob
//! written by an older build fails cleanly and reads as a cache miss.

use crate::formats::entity::{descriptor_of, load_entity, to_entity};
use crate::primitives::{self, MAX_SNAPSHOT_SIZE};
use crate::record::Modelable;
use crate::{Entity, Key, MageError};
use serde::{Deserialize, Serialize};

const HEADER_SIZE: usize = 5;

// =============================================================================
// HEADER
// =============================================================================

/// The header preceding every snapshot payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl SnapshotHeader {
    /// Header for the current format version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *primitives::MAGIC_BYTES,
            version: primitives::FORMAT_VERSION,
        }
    }

    pub fn validate(&self) -> Result<(), MageError> {
        if &self.magic != primitives::MAGIC_BYTES {
            return Err(MageError::SerializationError(
                "Invalid magic bytes".to_string(),
            ));
        }
        if self.version != primitives::FORMAT_VERSION {
            return Err(MageError::SerializationError(format!(
                "Unsupported version: {} (expected {})",
                self.version,
                primitives::FORMAT_VERSION
            )));
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MageError> {
        if bytes.len() < HEADER_SIZE {
            return Err(MageError::SerializationError(
                "Header too short".to_string(),
            ));
        }
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        Ok(Self {
            magic,
            version: bytes[4],
        })
    }
}

impl Default for SnapshotHeader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// A keyed record together with the snapshots of its keyed references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub key: Key,
    pub entity: Entity,
    /// (field index, reference snapshot), ascending by index.
    pub references: Vec<(usize, Snapshot)>,
}

impl Snapshot {
    /// Capture a registered, keyed modelable and its registered, keyed references.
    pub fn capture(modelable: &dyn Modelable) -> Result<Self, MageError> {
        let record = modelable.record();
        let key = record.key().cloned().ok_or_else(|| MageError::MissingKey {
            kind: record.kind_label(),
        })?;
        let entity = to_entity(modelable)?;

        let mut references = Vec::new();
        for index in record.references().indices() {
            let Some(reference) = modelable.reference(index) else {
                continue;
            };
            let inner = reference.record();
            if inner.is_registered() && inner.key().is_some() {
                references.push((index, Self::capture(reference)?));
            }
        }

        Ok(Self {
            key,
            entity,
            references,
        })
    }

    /// Write the snapshot back into a registered modelable of the same kind.
    pub fn restore(self, modelable: &mut dyn Modelable) -> Result<(), MageError> {
        let descriptor = descriptor_of(modelable)?;
        if self.entity.kind() != descriptor.name() {
            return Err(MageError::SerializationError(format!(
                "Snapshot of {} cannot populate {}",
                self.entity.kind(),
                descriptor.name()
            )));
        }

        load_entity(modelable, self.entity)?;
        modelable.record_mut().set_key(Some(self.key));

        let references = modelable.record().references().clone();
        for (index, snapshot) in self.references {
            if !references.contains(index) {
                continue;
            }
            if let Some(reference) = modelable.reference_mut(index)
                && reference.record().is_registered()
            {
                snapshot.restore(reference)?;
            }
        }
        Ok(())
    }
}

// =============================================================================
// SERIALIZATION FUNCTIONS
// =============================================================================

/// Serialize a snapshot to bytes (header + payload).
pub fn snapshot_to_bytes(snapshot: &Snapshot) -> Result<Vec<u8>, MageError> {
    let payload = postcard::to_stdvec(snapshot)
        .map_err(|e| MageError::SerializationError(e.to_string()))?;

    let mut result = Vec::with_capacity(HEADER_SIZE + payload.len());
    result.extend_from_slice(&SnapshotHeader::new().to_bytes());
    result.extend_from_slice(&payload);
    Ok(result)
}

/// Deserialize a snapshot, validating size and header first.
pub fn snapshot_from_bytes(bytes: &[u8]) -> Result<Snapshot, MageError> {
    if bytes.len() < HEADER_SIZE {
        return Err(MageError::SerializationError(format!(
            "Data too short: minimum {} bytes required",
            HEADER_SIZE
        )));
    }
    if bytes.len() > MAX_SNAPSHOT_SIZE {
        return Err(MageError::SerializationError(format!(
            "Data size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            MAX_SNAPSHOT_SIZE
        )));
    }

    SnapshotHeader::from_bytes(bytes)?.validate()?;

    postcard::from_bytes(&bytes[HEADER_SIZE..]).map_err(|e| {
        MageError::SerializationError(format!("Failed to deserialize snapshot: {}", e))
    })
}

// =============================================================================
// TESTS
// =============================================================================
