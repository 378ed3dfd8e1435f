// model = "claude-opus-4-5"
// created = "2026-08-01"
// modified = "2026-08-01"
// driver = "Isaac Clayton"

//! The operation vocabulary the engine consumes.
//!
//! Operations are *intention-preserving*: positions are expressed as
//! anchors into immutable history rather than as indices, so an
//! operation means the same thing no matter which concurrent edits have
//! landed before it arrives.
//!
//! An anchor `(replica, stamp, pos)` names scalar `pos` of the segment
//! inserted by `replica` at `stamp`. Segments are immutable and never
//! freed, so an anchor stays valid for the life of the engine. Stamp 0
//! is reserved for the end-of-file sentinel: an anchor with stamp 0
//! denotes the document tail on every replica.

use serde::Deserialize;
use serde::Serialize;

use crate::ident::OperationId;
use crate::ident::ReplicaId;
use crate::ident::Stamp;

/// A stable position reference into document history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Anchor {
    /// Replica that authored the referenced segment.
    pub replica: ReplicaId,
    /// Stamp of the referenced segment. 0 means the EOF sentinel.
    pub stamp: Stamp,
    /// Scalar offset within the segment.
    pub pos: usize,
}

impl Anchor {
    pub fn new(replica: ReplicaId, stamp: Stamp, pos: usize) -> Anchor {
        return Anchor { replica, stamp, pos };
    }
}

/// Insert text at an anchor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insertion {
    pub replica: ReplicaId,
    pub stamp: Stamp,
    pub anchor: Anchor,
    pub text: String,
}

impl Insertion {
    pub fn new(replica: ReplicaId, stamp: Stamp, anchor: Anchor, text: impl Into<String>) -> Insertion {
        return Insertion { replica, stamp, anchor, text: text.into() };
    }

    pub fn id(&self) -> OperationId {
        return OperationId::new(self.replica, self.stamp);
    }
}

/// Delete the range `[begin, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deletion {
    pub replica: ReplicaId,
    pub stamp: Stamp,
    pub begin: Anchor,
    pub end: Anchor,
}

impl Deletion {
    pub fn new(replica: ReplicaId, stamp: Stamp, begin: Anchor, end: Anchor) -> Deletion {
        return Deletion { replica, stamp, begin, end };
    }

    pub fn id(&self) -> OperationId {
        return OperationId::new(self.replica, self.stamp);
    }
}

/// Undo the operation named by `target`.
///
/// A replica only undoes its own operations, so a target operation id is
/// all that is needed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoOp {
    pub replica: ReplicaId,
    pub stamp: Stamp,
    pub target: OperationId,
}

impl UndoOp {
    pub fn new(replica: ReplicaId, stamp: Stamp, target: OperationId) -> UndoOp {
        return UndoOp { replica, stamp, target };
    }
}

/// Redo the operation named by `target`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedoOp {
    pub replica: ReplicaId,
    pub stamp: Stamp,
    pub target: OperationId,
}

impl RedoOp {
    pub fn new(replica: ReplicaId, stamp: Stamp, target: OperationId) -> RedoOp {
        return RedoOp { replica, stamp, target };
    }
}

/// Any operation, for callers that queue or relay mixed streams.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Insert(Insertion),
    Delete(Deletion),
    Undo(UndoOp),
    Redo(RedoOp),
}

impl Operation {
    /// The authoring replica of the operation.
    pub fn replica(&self) -> ReplicaId {
        match self {
            Operation::Insert(op) => return op.replica,
            Operation::Delete(op) => return op.replica,
            Operation::Undo(op) => return op.replica,
            Operation::Redo(op) => return op.replica,
        }
    }

    /// The stamp of the operation.
    pub fn stamp(&self) -> Stamp {
        match self {
            Operation::Insert(op) => return op.stamp,
            Operation::Delete(op) => return op.stamp,
            Operation::Undo(op) => return op.stamp,
            Operation::Redo(op) => return op.stamp,
        }
    }

    pub fn id(&self) -> OperationId {
        return OperationId::new(self.replica(), self.stamp());
    }
}
