// model = "claude-opus-4-5"
// created = "2026-08-01"
// modified = "2026-08-01"
// driver = "Isaac Clayton"

//! The piece-tree CRDT engine.
//!
//! Layering, bottom to top:
//!
//! - [`primitives`]: tagged index cells, the grow-only B+ tree, and the
//!   Lamport clock
//! - [`op`]: the wire operation vocabulary
//! - [`store`]: the per-replica operation store
//! - [`piece_tree`] and [`range_tree`]: the two tree specializations
//! - [`doc`]: the engine itself ([`doc::PieceCrdt`])

pub mod doc;
pub mod op;
pub mod piece_tree;
pub mod primitives;
pub mod range_tree;
pub mod store;
