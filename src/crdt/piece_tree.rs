// model = "claude-opus-4-5"
// created = "2026-08-01"
// modified = "2026-08-02"
// driver = "Isaac Clayton"

//! The piece tree: the document as an ordered sequence of pieces.
//!
//! A piece is a view over a contiguous scalar range of one segment.
//! Pieces split (never merge) when an insertion lands inside them or a
//! deletion endpoint falls inside them. Each piece carries a tombstone:
//! the newest active deletion covering it, or none while visible.
//!
//! The tree summarizes each piece as `{total, visible}`, so one
//! structure answers position queries in both coordinate systems:
//!
//! - *history* offsets count every piece, tombstoned or not, and never
//!   shift when text is deleted;
//! - *visible* offsets count only pieces without a tombstone.
//!
//! Splitting keeps the original cell as the right half and inserts a
//! fresh cell for the left half. References held elsewhere (a segment's
//! `last_piece` / `insert_piece`) therefore keep meaning "the rightmost
//! piece" / "the piece left of the first" without bookkeeping.

use std::ops::Add;
use std::ops::AddAssign;

use crate::crdt::primitives::btree::BPlusTree;
use crate::crdt::primitives::btree::CellIdx;
use crate::crdt::primitives::btree::SumSummarizer;
use crate::crdt::primitives::tagged::CellRef;
use crate::crdt::primitives::tagged::NONE;
use crate::crdt::store::OpIdx;
use crate::crdt::store::OpStore;
use crate::crdt::store::StoredAnchor;
use crate::crdt::op::Anchor;

/// Summary of a run of pieces: scalars in history, scalars visible.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PieceInfo {
    pub total: usize,
    pub visible: usize,
}

impl Add for PieceInfo {
    type Output = PieceInfo;

    fn add(self, other: PieceInfo) -> PieceInfo {
        return PieceInfo {
            total: self.total + other.total,
            visible: self.visible + other.visible,
        };
    }
}

impl AddAssign for PieceInfo {
    fn add_assign(&mut self, other: PieceInfo) {
        self.total += other.total;
        self.visible += other.visible;
    }
}

/// A view over a contiguous scalar range of one segment.
#[derive(Clone, Copy, Debug)]
pub struct Piece {
    /// The backing segment.
    pub seg: OpIdx,
    /// Byte range into the segment's text.
    pub byte_start: usize,
    pub byte_len: usize,
    /// Scalar offset of this piece within its segment.
    pub seg_pos: usize,
    /// Length in scalars.
    pub len: usize,
    /// Newest active deletion covering this piece, or NONE.
    pub tombstone: OpIdx,
}

impl Piece {
    /// A piece spanning a whole segment.
    pub fn whole(store: &OpStore, seg: OpIdx) -> Piece {
        let segment = store.seg(seg);
        return Piece {
            seg,
            byte_start: 0,
            byte_len: segment.text.len(),
            seg_pos: 0,
            len: segment.char_len,
            tombstone: NONE,
        };
    }

    #[inline]
    pub fn is_removed(&self) -> bool {
        return self.tombstone != NONE;
    }

    #[inline]
    pub fn size(&self) -> PieceInfo {
        return PieceInfo {
            total: self.len,
            visible: if self.is_removed() { 0 } else { self.len },
        };
    }

    /// The text this piece shows.
    pub fn text<'a>(&self, store: &'a OpStore) -> &'a str {
        return &store.seg(self.seg).text[self.byte_start..self.byte_start + self.byte_len];
    }
}

/// Byte offset of the n-th scalar in `text`.
fn char_byte_offset(text: &str, n: usize) -> usize {
    return text.char_indices().nth(n).map(|(i, _)| i).unwrap_or(text.len());
}

/// The piece tree.
pub struct PieceTree {
    tree: BPlusTree<PieceInfo, Piece, SumSummarizer>,
}

impl PieceTree {
    /// Seed the tree with the sentinel segment's single piece.
    pub fn new(store: &mut OpStore, sentinel: OpIdx) -> PieceTree {
        let mut tree = BPlusTree::new();
        let piece = Piece::whole(store, sentinel);
        let key = piece.size();
        let end = tree.end();
        let cell = tree.insert_before(end, key, piece);
        store.seg_mut(sentinel).last_piece = cell;
        return PieceTree { tree };
    }

    #[inline]
    pub fn piece(&self, cell: CellIdx) -> &Piece {
        return self.tree.value(cell);
    }

    #[inline]
    pub fn piece_mut(&mut self, cell: CellIdx) -> &mut Piece {
        return self.tree.value_mut(cell);
    }

    #[inline]
    pub fn begin(&self) -> CellRef {
        return self.tree.begin();
    }

    #[inline]
    pub fn end(&self) -> CellRef {
        return self.tree.end();
    }

    #[inline]
    pub fn next(&self, it: CellRef) -> CellRef {
        return self.tree.next(it);
    }

    #[inline]
    pub fn next_cell(&self, cell: CellIdx) -> CellRef {
        return self.tree.next_cell(cell);
    }

    #[inline]
    pub fn prev_cell(&self, cell: CellIdx) -> CellRef {
        return self.tree.prev_cell(cell);
    }

    /// Summary of everything strictly before this piece.
    #[inline]
    pub fn prefix_of(&self, cell: CellIdx) -> PieceInfo {
        return self.tree.prefix_of(cell);
    }

    /// Summary of the whole tree, sentinel piece included.
    #[inline]
    pub fn total(&self) -> PieceInfo {
        return self.tree.total();
    }

    /// The piece containing visible scalar offset `pos`.
    pub fn find_visible(&self, pos: usize) -> Option<(CellIdx, PieceInfo)> {
        return self.tree.find_seq(|sum| pos < sum.visible);
    }

    /// The piece containing history scalar offset `pos`.
    pub fn find_history(&self, pos: usize) -> Option<(CellIdx, PieceInfo)> {
        return self.tree.find_seq(|sum| pos < sum.total);
    }

    /// The piece containing a stored anchor.
    ///
    /// Resolution goes through the anchor's segment: the first child
    /// inserted strictly after the anchor offset bounds the search, so
    /// the target is either that child's `insert_piece` or the segment's
    /// `last_piece`; if the anchor offset falls before that piece, fall
    /// back to a history lookup.
    pub fn find_anchor(&self, store: &OpStore, anchor: StoredAnchor) -> CellIdx {
        let seg = store.seg(anchor.seg);
        let idx = seg
            .split_child
            .partition_point(|&child| store.seg(child).insert_pos <= anchor.pos);
        let cell = if idx < seg.split_child.len() {
            store.seg(seg.split_child[idx]).insert_piece
        } else {
            seg.last_piece
        };
        debug_assert_eq!(self.piece(cell).seg, anchor.seg);
        if self.piece(cell).seg_pos <= anchor.pos {
            return cell;
        }
        let target = self.prefix_of(cell).total + anchor.pos - self.piece(cell).seg_pos;
        let (found, _) = self.find_history(target).expect("anchor offset past end of history");
        debug_assert_eq!(self.piece(found).seg, anchor.seg);
        return found;
    }

    /// Translate a history offset to a wire anchor.
    pub fn history_anchor(&self, store: &OpStore, pos: usize) -> Option<Anchor> {
        let (cell, prefix) = self.find_history(pos)?;
        let piece = self.piece(cell);
        let op = store.op(piece.seg);
        return Some(Anchor::new(
            store.replica_id(op.replica),
            op.stamp,
            pos - prefix.total + piece.seg_pos,
        ));
    }

    /// Translate a history offset to a stored anchor.
    pub fn stored_history_anchor(&self, pos: usize) -> Option<StoredAnchor> {
        let (cell, prefix) = self.find_history(pos)?;
        let piece = self.piece(cell);
        return Some(StoredAnchor::new(piece.seg, pos - prefix.total + piece.seg_pos));
    }

    /// Translate a visible offset to a wire anchor.
    pub fn visible_anchor(&self, store: &OpStore, pos: usize) -> Option<Anchor> {
        let (cell, prefix) = self.find_visible(pos)?;
        let piece = self.piece(cell);
        debug_assert!(!piece.is_removed());
        let op = store.op(piece.seg);
        return Some(Anchor::new(
            store.replica_id(op.replica),
            op.stamp,
            pos - prefix.visible + piece.seg_pos,
        ));
    }

    /// History offset of a stored anchor; inverse of `find_anchor`.
    pub fn history_offset(&self, store: &OpStore, anchor: StoredAnchor) -> usize {
        let cell = self.find_anchor(store, anchor);
        return anchor.pos + self.prefix_of(cell).total - self.piece(cell).seg_pos;
    }

    /// Split a piece at scalar offset `pos`, returning the left part.
    /// The original cell keeps the right part. A zero split inserts an
    /// empty left piece.
    pub fn split(&mut self, store: &OpStore, cell: CellIdx, pos: usize) -> CellIdx {
        debug_assert!(pos < self.piece(cell).len, "split offset out of range");

        let offset = char_byte_offset(self.piece(cell).text(store), pos);
        let mut left = *self.piece(cell);
        left.byte_len = offset;
        left.len = pos;
        {
            let right = self.piece_mut(cell);
            right.byte_start += offset;
            right.byte_len -= offset;
            right.seg_pos += pos;
            right.len -= pos;
        }
        let right_key = self.piece(cell).size();
        self.tree.set_key(cell, right_key);

        let left_key = left.size();
        return self.tree.insert_before(CellRef::normal(cell), left_key, left);
    }

    /// Insert a freshly stored segment's piece at its anchor.
    ///
    /// Concurrent insertions at the same offset are disambiguated by the
    /// parent's `split_child` order, so every replica places them
    /// identically no matter the arrival order.
    pub fn insert(&mut self, store: &mut OpStore, seg_idx: OpIdx) -> CellIdx {
        let parent = store.seg(seg_idx).parent;
        let insert_pos = store.seg(seg_idx).insert_pos;
        let mut cell = self.find_anchor(store, StoredAnchor::new(parent, insert_pos));
        let rel = insert_pos - self.piece(cell).seg_pos;

        let conflict = store
            .seg(parent)
            .split_child
            .partition_point(|&child| Self::child_lt(store, child, seg_idx));

        let children = &store.seg(parent).split_child;
        if rel == 0 && !children.is_empty() {
            if conflict == 0 || store.seg(children[conflict - 1]).insert_pos != insert_pos {
                if conflict < children.len() && store.seg(children[conflict]).insert_pos == insert_pos {
                    // earliest-ordered sibling at this offset: the new
                    // segment goes in front of all of them
                    cell = store.seg(children[conflict]).insert_piece;
                } else {
                    // no sibling at this offset: land just before the
                    // anchor piece
                    cell = self.tree.prev_cell(cell).as_normal();
                }
            } else {
                // ordered after an existing sibling: go after the last
                // piece of its content
                cell = store.seg(children[conflict - 1]).last_piece;
            }
        } else {
            cell = self.split(store, cell, rel);
        }

        store.seg_mut(seg_idx).insert_piece = cell;
        store.seg_mut(parent).split_child.insert(conflict, seg_idx);

        let mut piece = Piece::whole(store, seg_idx);
        piece.tombstone = self.slot_coverage(store, cell, seg_idx);
        let key = piece.size();
        let new_cell = self.tree.insert_after(CellRef::normal(cell), key, piece);
        store.seg_mut(seg_idx).last_piece = new_cell;
        return new_cell;
    }

    /// The tombstone a piece inserted right after `cell` must carry.
    ///
    /// The slot shares its range coverage with the nearest non-empty
    /// piece to its left (empty split fragments carry stale copies and
    /// range boundaries never fall between a non-empty piece and the
    /// slot). A range op only ever covers segments older than itself,
    /// so a covering op that is older than the new segment leaves it
    /// visible. This is what makes an insertion into a concurrently
    /// deleted range land identically whichever side arrives first.
    fn slot_coverage(&self, store: &OpStore, cell: CellIdx, seg_idx: OpIdx) -> OpIdx {
        let mut probe = cell;
        loop {
            let piece = self.piece(probe);
            if piece.len > 0 {
                let tombstone = piece.tombstone;
                if tombstone != NONE && store.op_lt(seg_idx, tombstone) {
                    return tombstone;
                }
                return NONE;
            }
            if CellRef::normal(probe) == self.tree.begin() {
                return NONE;
            }
            probe = self.tree.prev_cell(probe).as_normal();
        }
    }

    /// Re-summarize the leaf span covering `[from, to]` after tombstone
    /// repaints.
    pub fn update_range(&mut self, from: CellIdx, to: CellIdx) {
        self.tree.update_range(from, to, |piece| piece.size());
    }

    /// The `split_child` order: insert offset, then stamp, then replica
    /// id *descending*. Ascending stamps keep a replica's sequential
    /// edits at a reused anchor in typing order; the descending replica
    /// tie-break fixes the order of stamp-tied concurrent insertions.
    fn child_lt(store: &OpStore, a: OpIdx, b: OpIdx) -> bool {
        let (seg_a, seg_b) = (store.seg(a), store.seg(b));
        if seg_a.insert_pos != seg_b.insert_pos {
            return seg_a.insert_pos < seg_b.insert_pos;
        }
        let (op_a, op_b) = (store.op(a), store.op(b));
        if op_a.stamp != op_b.stamp {
            return op_a.stamp < op_b.stamp;
        }
        return store.replica_id(op_b.replica) < store.replica_id(op_a.replica);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::store::Segment;
    use crate::crdt::store::StoredKind;
    use crate::ident::ReplicaId;
    use uuid::Uuid;

    fn id(byte: u8) -> ReplicaId {
        return ReplicaId::from_uuid(Uuid::from_bytes([byte; 16]));
    }

    struct Fixture {
        store: OpStore,
        tree: PieceTree,
        eof: OpIdx,
    }

    impl Fixture {
        fn new() -> Fixture {
            let mut store = OpStore::new();
            let eof = store
                .store_op(id(1), 0, StoredKind::Segment(Segment::new("EOF", NONE, 0)))
                .unwrap();
            let tree = PieceTree::new(&mut store, eof);
            return Fixture { store, tree, eof };
        }

        fn insert(&mut self, replica: ReplicaId, stamp: u32, parent: OpIdx, pos: usize, text: &str) -> OpIdx {
            let seg = self
                .store
                .store_op(replica, stamp, StoredKind::Segment(Segment::new(text, parent, pos)))
                .unwrap();
            self.tree.insert(&mut self.store, seg);
            return seg;
        }

        /// Visible text, sentinel piece excluded.
        fn text(&self) -> String {
            let mut out = String::new();
            let stop = self.store.seg(self.eof).last_piece;
            let mut it = self.tree.begin();
            while it.is_normal() && it.as_normal() != stop {
                let piece = self.tree.piece(it.as_normal());
                if !piece.is_removed() {
                    out.push_str(piece.text(&self.store));
                }
                it = self.tree.next(it);
            }
            return out;
        }
    }

    #[test]
    fn seeded_with_sentinel() {
        let fx = Fixture::new();
        assert_eq!(fx.tree.total(), PieceInfo { total: 3, visible: 3 });
        assert_eq!(fx.text(), "");
    }

    #[test]
    fn insert_at_sentinel() {
        let mut fx = Fixture::new();
        fx.insert(id(1), 1, fx.eof, 0, "hello");
        assert_eq!(fx.text(), "hello");
    }

    #[test]
    fn sequential_typing_stays_in_order() {
        let mut fx = Fixture::new();
        let eof = fx.eof;
        // each keystroke re-resolves to the sentinel anchor
        fx.insert(id(1), 1, eof, 0, "a");
        fx.insert(id(1), 2, eof, 0, "b");
        fx.insert(id(1), 3, eof, 0, "c");
        assert_eq!(fx.text(), "abc");
    }

    #[test]
    fn insert_inside_a_segment_splits_it() {
        let mut fx = Fixture::new();
        let base = fx.insert(id(1), 1, fx.eof, 0, "helloworld");
        fx.insert(id(1), 2, base, 5, ", ");
        assert_eq!(fx.text(), "hello, world");
    }

    #[test]
    fn stamp_tied_inserts_order_higher_replica_first() {
        // replica order is the tie-break: B > A lands earlier
        let mut fx = Fixture::new();
        let eof = fx.eof;
        fx.insert(id(1), 1, eof, 0, "AA");
        fx.insert(id(2), 1, eof, 0, "BB");
        assert_eq!(fx.text(), "BBAA");

        // reversed arrival converges to the same order
        let mut fx = Fixture::new();
        let eof = fx.eof;
        fx.insert(id(2), 1, eof, 0, "BB");
        fx.insert(id(1), 1, eof, 0, "AA");
        assert_eq!(fx.text(), "BBAA");
    }

    #[test]
    fn concurrent_inserts_at_same_interior_offset_converge() {
        let texts = ["xy", "11", "22"];
        let mut first = None;
        // both arrival orders of the two concurrent children
        for flip in [false, true] {
            let mut fx = Fixture::new();
            let base = fx.insert(id(1), 1, fx.eof, 0, texts[0]);
            let (ra, rb) = if flip { (id(3), id(2)) } else { (id(2), id(3)) };
            let (ta, tb) = if flip { (texts[2], texts[1]) } else { (texts[1], texts[2]) };
            fx.insert(ra, 2, base, 1, ta);
            fx.insert(rb, 2, base, 1, tb);
            let text = fx.text();
            match &first {
                None => first = Some(text),
                Some(expected) => assert_eq!(&text, expected),
            }
        }
        // higher replica first at the tied stamp
        assert_eq!(first.unwrap(), "x2211y");
    }

    #[test]
    fn find_visible_skips_tombstones() {
        let mut fx = Fixture::new();
        let seg = fx.insert(id(1), 1, fx.eof, 0, "abcdef");
        // split [0,3) | [3,6) and tombstone the left part by hand
        let first = fx.store.seg(seg).insert_piece;
        let content = fx.tree.next_cell(first).as_normal();
        let left = fx.tree.split(&fx.store, content, 3);
        fx.tree.piece_mut(left).tombstone = 7; // any op index
        fx.tree.update_range(left, content);

        assert_eq!(fx.text(), "def");
        let (cell, prefix) = fx.tree.find_visible(0).unwrap();
        assert_eq!(cell, content);
        assert_eq!(prefix.visible, 0);
        assert_eq!(prefix.total, 3);
    }

    #[test]
    fn history_and_visible_anchors() {
        let mut fx = Fixture::new();
        fx.insert(id(1), 1, fx.eof, 0, "abcdef");

        let visible = fx.tree.visible_anchor(&fx.store, 2).unwrap();
        assert_eq!(visible.stamp, 1);
        assert_eq!(visible.pos, 2);

        let history = fx.tree.history_anchor(&fx.store, 2).unwrap();
        assert_eq!(history.stamp, 1);
        assert_eq!(history.pos, 2);
    }

    #[test]
    fn history_offset_is_inverse_of_anchor() {
        let mut fx = Fixture::new();
        let base = fx.insert(id(1), 1, fx.eof, 0, "abcdef");
        fx.insert(id(1), 2, base, 3, "XY");
        // history: a b c X Y d e f EOF
        for pos in 0..8 {
            let anchor = fx.tree.stored_history_anchor(pos).unwrap();
            assert_eq!(fx.tree.history_offset(&fx.store, anchor), pos);
        }
    }

    #[test]
    fn anchor_resolves_after_children_at_offset() {
        let mut fx = Fixture::new();
        let base = fx.insert(id(1), 1, fx.eof, 0, "xyz");
        fx.insert(id(1), 2, base, 0, "b");
        assert_eq!(fx.text(), "bxyz");

        // anchor (base, 0) names the boundary after the child's text
        let cell = fx.tree.find_anchor(&fx.store, StoredAnchor::new(base, 0));
        let piece = fx.tree.piece(cell);
        assert_eq!(piece.seg, base);
        assert_eq!(piece.seg_pos, 0);
        assert_eq!(piece.len, 3);
    }

    #[test]
    fn split_keeps_right_half_in_place() {
        let mut fx = Fixture::new();
        let seg = fx.insert(id(1), 1, fx.eof, 0, "abcdef");
        let last = fx.store.seg(seg).last_piece;
        let left = fx.tree.split(&fx.store, last, 2);

        assert_eq!(fx.tree.piece(left).text(&fx.store), "ab");
        assert_eq!(fx.tree.piece(last).text(&fx.store), "cdef");
        assert_eq!(fx.tree.piece(last).seg_pos, 2);
        // last_piece still names the rightmost piece of the segment
        assert_eq!(fx.store.seg(seg).last_piece, last);
        assert_eq!(fx.text(), "abcdef");
    }

    #[test]
    fn zero_split_inserts_an_empty_left_piece() {
        let mut fx = Fixture::new();
        let seg = fx.insert(id(1), 1, fx.eof, 0, "abcdef");
        let last = fx.store.seg(seg).last_piece;
        let left = fx.tree.split(&fx.store, last, 0);

        // not a no-op: a distinct, empty cell lands before the original
        assert_ne!(left, last);
        let empty = fx.tree.piece(left);
        assert_eq!(empty.len, 0);
        assert_eq!(empty.seg, seg);
        assert_eq!(empty.seg_pos, 0);
        assert_eq!(empty.text(&fx.store), "");

        // the original cell is untouched and still follows the new one
        let right = fx.tree.piece(last);
        assert_eq!(right.text(&fx.store), "abcdef");
        assert_eq!(right.seg_pos, 0);
        assert_eq!(fx.tree.next_cell(left).as_normal(), last);
        assert_eq!(fx.text(), "abcdef");
    }

    #[test]
    fn split_multibyte_text() {
        let mut fx = Fixture::new();
        let seg = fx.insert(id(1), 1, fx.eof, 0, "héllo");
        let last = fx.store.seg(seg).last_piece;
        let left = fx.tree.split(&fx.store, last, 2);
        assert_eq!(fx.tree.piece(left).text(&fx.store), "hé");
        assert_eq!(fx.tree.piece(last).text(&fx.store), "llo");
        assert_eq!(fx.text(), "héllo");
    }
}
