// model = "claude-opus-4-5"
// created = "2026-08-01"
// modified = "2026-08-01"
// driver = "Isaac Clayton"

//! Identifier types for replicas and operations.
//!
//! # Identifier Hierarchy
//!
//! - `ReplicaId`: identifies a replica (128 bits, totally ordered)
//! - `OperationId`: identifies an operation (replica, stamp)
//!
//! # Design Decisions
//!
//! IDs are designed to be:
//! - Globally unique: replica ids are random 128-bit values, and stamps
//!   are monotonically increasing per replica
//! - Totally ordered: the operation order compares stamps first, then
//!   replica ids, so every pair of operations compares deterministically
//!   on every replica
//! - Compact: `Copy` types, suitable for map keys

use std::cmp::Ordering;

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

/// A Lamport stamp. Monotonically increasing per authoring replica; also
/// the index of the operation within its replica's operation list.
pub type Stamp = u32;

/// A replica identifier: a random 128-bit value, totally ordered.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplicaId(Uuid);

impl ReplicaId {
    /// Generate a fresh random replica id.
    pub fn random() -> ReplicaId {
        return ReplicaId(Uuid::new_v4());
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(id: Uuid) -> ReplicaId {
        return ReplicaId(id);
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        return self.0;
    }
}

impl std::fmt::Debug for ReplicaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        return write!(f, "ReplicaId({})", self.0);
    }
}

impl std::fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        return write!(f, "{}", self.0);
    }
}

/// An operation identifier.
///
/// Uniquely identifies an operation authored by a specific replica. The
/// ordering compares stamps first and breaks ties by replica id; this is
/// the operation order every replica agrees on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId {
    /// The replica that authored this operation.
    pub replica: ReplicaId,
    /// The stamp of the operation (monotone per replica).
    pub stamp: Stamp,
}

impl OperationId {
    /// Create a new operation id.
    pub fn new(replica: ReplicaId, stamp: Stamp) -> OperationId {
        return OperationId { replica, stamp };
    }
}

impl PartialOrd for OperationId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        return Some(self.cmp(other));
    }
}

impl Ord for OperationId {
    fn cmp(&self, other: &Self) -> Ordering {
        // Stamp first, then replica id
        match self.stamp.cmp(&other.stamp) {
            Ordering::Equal => self.replica.cmp(&other.replica),
            other => other,
        }
    }
}
