// model = "claude-opus-4-5"
// created = "2026-08-01"
// modified = "2026-08-02"
// driver = "Isaac Clayton"

//! Weave - a collaborative plain-text editing engine built on a piece-tree CRDT.
//!
//! Each replica holds its own copy of a shared document and applies a stream
//! of operations (insertions, range deletions, undo, redo) authored by any
//! replica. Two replicas that have received the same set of operations, in
//! any order, produce byte-identical visible text.
//!
//! # Quick Start
//!
//! ```
//! use weave::crdt::doc::PieceCrdt;
//! use weave::crdt::op::Insertion;
//!
//! let mut doc = PieceCrdt::new();
//!
//! let anchor = doc.anchor(0).unwrap();
//! let stamp = doc.clock();
//! doc.insert(&Insertion::new(doc.id(), stamp, anchor, "Hello, World!")).unwrap();
//!
//! assert_eq!(doc.to_string(), "Hello, World!");
//! ```

pub mod crdt;
pub mod ident;
