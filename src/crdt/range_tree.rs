// model = "claude-opus-4-5"
// created = "2026-08-01"
// modified = "2026-08-02"
// driver = "Isaac Clayton"

//! The range-tag tree: deletion endpoints over immutable history.
//!
//! Every range operation owns two tags, one per endpoint. Tags are kept
//! in an ordered set whose comparator follows history position, with
//! tie-breaks at a shared position:
//!
//! - a right endpoint sorts before a left endpoint, so closed ranges
//!   nest instead of interleaving;
//! - among right endpoints the older op sorts first, among left
//!   endpoints the newer op sorts first, which places the innermost
//!   current op closest to the shared position.
//!
//! A tag's `old` field records, for that endpoint, the next-newest range
//! op whose interval is strictly covered by the owner's but by no newer
//! one. A fresh tag starts with `old` in the bad state; it is resolved
//! either from the neighboring piece's tombstone at apply time or by the
//! crossing walk, and may be set bad again by an undo to force lazy
//! recomputation on the next redo.

use crate::crdt::piece_tree::PieceTree;
use crate::crdt::primitives::btree::BPlusTree;
use crate::crdt::primitives::btree::CellIdx;
use crate::crdt::primitives::btree::LastSummarizer;
use crate::crdt::primitives::tagged::CellRef;
use crate::crdt::primitives::tagged::Stated;
use crate::crdt::store::OpIdx;
use crate::crdt::store::OpStore;
use crate::crdt::store::StoredAnchor;

/// Lifecycle of a range op's pair of tags. The two tags of one op are
/// always in the same status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TagStatus {
    /// The op contributes tombstones.
    Active,
    /// The op has been undone.
    Undone,
    /// The op was fully dominated by newer ops at both endpoints when
    /// last applied; it contributes nothing but is remembered so a
    /// later undo of the dominating op can revive it.
    UnUsed,
}

/// One endpoint of a range operation.
#[derive(Clone, Copy, Debug)]
pub struct RangeTag {
    /// True for the operation's start, false for its end.
    pub is_left: bool,
    pub status: TagStatus,
    /// Where the endpoint lies in immutable history.
    pub anchor: StoredAnchor,
    /// The owning range op.
    pub cur: OpIdx,
    /// The next-newest op strictly covering this endpoint; starts bad.
    pub old: Stated,
}

impl RangeTag {
    pub fn left(anchor: StoredAnchor, cur: OpIdx) -> RangeTag {
        return RangeTag { is_left: true, status: TagStatus::Active, anchor, cur, old: Stated::bad() };
    }

    pub fn right(anchor: StoredAnchor, cur: OpIdx) -> RangeTag {
        return RangeTag { is_left: false, status: TagStatus::Active, anchor, cur, old: Stated::bad() };
    }
}

/// The ordered set of range tags.
pub struct RangeTree {
    set: BPlusTree<CellIdx, RangeTag, LastSummarizer>,
}

impl RangeTree {
    pub fn new() -> RangeTree {
        return RangeTree { set: BPlusTree::new() };
    }

    #[inline]
    pub fn tag(&self, cell: CellIdx) -> &RangeTag {
        return self.set.value(cell);
    }

    #[inline]
    pub fn tag_mut(&mut self, cell: CellIdx) -> &mut RangeTag {
        return self.set.value_mut(cell);
    }

    #[inline]
    pub fn next_cell(&self, cell: CellIdx) -> CellRef {
        return self.set.next_cell(cell);
    }

    #[inline]
    pub fn prev_cell(&self, cell: CellIdx) -> CellRef {
        return self.set.prev_cell(cell);
    }

    #[inline]
    pub fn len(&self) -> usize {
        return self.set.len();
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        return self.set.is_empty();
    }

    /// Insert both endpoint tags of a range op, splitting the piece tree
    /// so each endpoint falls on a piece boundary. Returns
    /// `((left_tag, left_piece), (right_tag, right_piece))` where each
    /// piece cell is the piece starting at that endpoint.
    pub fn apply(
        &mut self,
        store: &OpStore,
        pieces: &mut PieceTree,
        left: RangeTag,
        right: RangeTag,
    ) -> ((CellIdx, CellIdx), (CellIdx, CellIdx)) {
        // both endpoints can lie on the same piece, so split the right
        // one first
        let right_pair = self.add_tag(store, pieces, right);
        let left_pair = self.add_tag(store, pieces, left);
        return (left_pair, right_pair);
    }

    fn add_tag(&mut self, store: &OpStore, pieces: &mut PieceTree, tag: RangeTag) -> (CellIdx, CellIdx) {
        let mut piece_cell = pieces.find_anchor(store, tag.anchor);
        let rel = tag.anchor.pos - pieces.piece(piece_cell).seg_pos;
        if rel > 0 && rel == pieces.piece(piece_cell).len {
            // one-past-the-segment anchor (an anti-deletion's right
            // endpoint): the boundary already exists after this piece;
            // settle past empty split fragments
            piece_cell = pieces.next_cell(piece_cell).as_normal();
            while pieces.piece(piece_cell).len == 0 {
                piece_cell = pieces.next_cell(piece_cell).as_normal();
            }
        } else if rel != 0 {
            // the original cell keeps the right half, so after the split
            // `piece_cell` is exactly the piece starting at the anchor
            pieces.split(store, piece_cell, rel);
        }
        let history_pos = pieces.prefix_of(piece_cell).total;

        let pieces_ref: &PieceTree = pieces;
        let tag_cell = self
            .set
            .insert_ordered(tag, |a, b| tag_lt(store, pieces_ref, history_pos, a, b));
        return (tag_cell, piece_cell);
    }
}

impl Default for RangeTree {
    fn default() -> Self {
        return Self::new();
    }
}

/// The endpoint order. `history_pos` is the precomputed history offset
/// of `b`, the tag being inserted.
fn tag_lt(store: &OpStore, pieces: &PieceTree, history_pos: usize, a: &RangeTag, b: &RangeTag) -> bool {
    if a.anchor.seg == b.anchor.seg {
        if a.anchor.pos != b.anchor.pos {
            return a.anchor.pos < b.anchor.pos;
        }
    } else {
        let a_pos = pieces.history_offset(store, a.anchor);
        if a_pos != history_pos {
            return a_pos < history_pos;
        }
    }
    // same position: rights before lefts; older rights first, newer
    // lefts first, so the innermost current op hugs the boundary
    if a.is_left != b.is_left {
        return b.is_left;
    }
    if a.is_left {
        return store.op_lt(b.cur, a.cur);
    }
    return store.op_lt(a.cur, b.cur);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::piece_tree::PieceTree;
    use crate::crdt::store::RangeOp;
    use crate::crdt::store::Segment;
    use crate::crdt::store::StoredKind;
    use crate::crdt::primitives::tagged::NONE;
    use crate::ident::ReplicaId;
    use uuid::Uuid;

    fn id(byte: u8) -> ReplicaId {
        return ReplicaId::from_uuid(Uuid::from_bytes([byte; 16]));
    }

    struct Fixture {
        store: OpStore,
        pieces: PieceTree,
        tags: RangeTree,
        seg: OpIdx,
    }

    impl Fixture {
        /// A document containing one ten-scalar segment.
        fn new() -> Fixture {
            let mut store = OpStore::new();
            let eof = store
                .store_op(id(1), 0, StoredKind::Segment(Segment::new("EOF", NONE, 0)))
                .unwrap();
            let mut pieces = PieceTree::new(&mut store, eof);
            let seg = store
                .store_op(id(1), 1, StoredKind::Segment(Segment::new("0123456789", eof, 0)))
                .unwrap();
            pieces.insert(&mut store, seg);
            return Fixture { store, pieces, tags: RangeTree::new(), seg };
        }

        fn deletion(&mut self, stamp: u32, begin: usize, end: usize) -> (OpIdx, (CellIdx, CellIdx), (CellIdx, CellIdx)) {
            let op = self
                .store
                .store_op(id(1), stamp, StoredKind::Deletion(RangeOp::new()))
                .unwrap();
            let (left, right) = self.tags.apply(
                &self.store,
                &mut self.pieces,
                RangeTag::left(StoredAnchor::new(self.seg, begin), op),
                RangeTag::right(StoredAnchor::new(self.seg, end), op),
            );
            return (op, left, right);
        }

        fn order(&self) -> Vec<(OpIdx, bool)> {
            let mut out = Vec::new();
            let mut it = self.tags.set.begin();
            while it.is_normal() {
                let tag = self.tags.tag(it.as_normal());
                out.push((tag.cur, tag.is_left));
                it = self.tags.set.next(it);
            }
            return out;
        }
    }

    #[test]
    fn apply_splits_pieces_at_endpoints() {
        let mut fx = Fixture::new();
        let (_, (_, left_piece), (_, right_piece)) = fx.deletion(2, 3, 7);

        assert_eq!(fx.pieces.piece(left_piece).seg_pos, 3);
        assert_eq!(fx.pieces.piece(right_piece).seg_pos, 7);
        // splitting changed structure, not content
        assert_eq!(fx.pieces.total().total, 13);
    }

    #[test]
    fn tags_order_by_history_position() {
        let mut fx = Fixture::new();
        let (op_a, _, _) = fx.deletion(2, 1, 4);
        let (op_b, _, _) = fx.deletion(3, 6, 9);

        let order = fx.order();
        assert_eq!(order, vec![(op_a, true), (op_a, false), (op_b, true), (op_b, false)]);
    }

    #[test]
    fn right_sorts_before_left_at_shared_position() {
        let mut fx = Fixture::new();
        // [1,5) then [5,9): both ops have a tag at offset 5
        let (op_a, _, _) = fx.deletion(2, 1, 5);
        let (op_b, _, _) = fx.deletion(3, 5, 9);

        let order = fx.order();
        assert_eq!(
            order,
            vec![(op_a, true), (op_a, false), (op_b, true), (op_b, false)]
        );
    }

    #[test]
    fn coincident_ranges_order_newer_lefts_and_older_rights_first() {
        let mut fx = Fixture::new();
        let (older, _, _) = fx.deletion(2, 1, 9);
        let (newer, _, _) = fx.deletion(3, 1, 9);

        // shared left boundary: newer left sorts first; shared right
        // boundary: older right sorts first
        let order = fx.order();
        assert_eq!(
            order,
            vec![(newer, true), (older, true), (older, false), (newer, false)]
        );
    }

    #[test]
    fn fresh_tags_start_bad() {
        let mut fx = Fixture::new();
        let (_, (left_tag, _), (right_tag, _)) = fx.deletion(2, 3, 7);
        assert!(fx.tags.tag(left_tag).old.is_bad());
        assert!(fx.tags.tag(right_tag).old.is_bad());
        assert_eq!(fx.tags.tag(left_tag).status, TagStatus::Active);
    }
}
