// model = "claude-opus-4-5"
// created = "2026-08-01"
// modified = "2026-08-02"
// driver = "Isaac Clayton"

//! The CRDT engine: a replicated plain-text document.
//!
//! `PieceCrdt` owns the operation store, the piece tree, and the
//! range-tag tree, and dispatches the four operation kinds. Applying the
//! same set of operations in any order yields byte-identical text on
//! every replica.
//!
//! # Model
//!
//! The document is seeded with a sentinel segment (`"EOF"`, stamp 0).
//! The sentinel is never shown but gives every position an anchor: the
//! document tail is "before the sentinel's first scalar". Insertions
//! become immutable segments anchored into existing segments; deletions
//! become range ops whose endpoint tags live in the tag tree and whose
//! effect is painted onto pieces as tombstones.
//!
//! Undo never unwinds state. Undoing a deletion repaints the pieces it
//! tombstoned with the next-newest covering op (reviving fully dominated
//! ops where needed); undoing an insertion applies a synthesized
//! anti-deletion covering the whole segment. Everything stays in memory,
//! so redo is a repaint as well.

use std::fmt;

use rustc_hash::FxHashSet;
use tracing::debug;
use tracing::trace;

use crate::crdt::op::Anchor;
use crate::crdt::op::Deletion;
use crate::crdt::op::Insertion;
use crate::crdt::op::Operation;
use crate::crdt::op::RedoOp;
use crate::crdt::op::UndoOp;
use crate::crdt::piece_tree::PieceTree;
use crate::crdt::primitives::btree::CellIdx;
use crate::crdt::primitives::tagged::CellRef;
use crate::crdt::primitives::tagged::NONE;
use crate::crdt::range_tree::RangeTag;
use crate::crdt::range_tree::RangeTree;
use crate::crdt::range_tree::TagStatus;
use crate::crdt::store::OpIdx;
use crate::crdt::store::OpStore;
use crate::crdt::store::RangeOp;
use crate::crdt::store::Segment;
use crate::crdt::store::StoredAnchor;
use crate::crdt::store::StoredKind;
use crate::ident::ReplicaId;
use crate::ident::Stamp;

/// Why an operation was not applied. The engine state is unchanged in
/// every case; callers retry once the missing dependency arrives, or
/// simply ignore the result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ApplyError {
    #[error("anchor references a segment that has not arrived")]
    UnknownAnchor,
    #[error("target operation has not arrived")]
    UnknownTarget,
    #[error("stamp slot already occupied (duplicate delivery)")]
    StampOccupied,
    #[error("target already has an outstanding undo")]
    AlreadyUndone,
    #[error("target is not currently undone")]
    NotUndone,
    #[error("the sentinel segment cannot be undone")]
    SentinelTarget,
    #[error("deletion range is empty or inverted")]
    EmptyRange,
}

/// One piece of the document, for callers that walk raw pieces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PieceView<'a> {
    /// The piece's text.
    pub text: &'a str,
    /// Length in scalars.
    pub len: usize,
    /// Whether the piece is currently tombstoned.
    pub removed: bool,
}

/// A replicated plain-text document.
pub struct PieceCrdt {
    local: ReplicaId,
    /// The sentinel segment (always operation 0).
    eof: OpIdx,
    store: OpStore,
    pieces: PieceTree,
    tags: RangeTree,
}

impl PieceCrdt {
    /// A fresh empty document with a random replica id.
    pub fn new() -> PieceCrdt {
        return PieceCrdt::with_id(ReplicaId::random());
    }

    /// A fresh empty document with the given replica id.
    pub fn with_id(local: ReplicaId) -> PieceCrdt {
        let mut store = OpStore::new();
        let eof = store
            .store_op(local, 0, StoredKind::Segment(Segment::new("EOF", NONE, 0)))
            .expect("sentinel slot is free in a fresh store");
        let pieces = PieceTree::new(&mut store, eof);
        return PieceCrdt {
            local,
            eof,
            store,
            pieces,
            tags: RangeTree::new(),
        };
    }

    /// This replica's id.
    #[inline]
    pub fn id(&self) -> ReplicaId {
        return self.local;
    }

    /// Current Lamport time; the stamp for the next local operation.
    #[inline]
    pub fn clock(&self) -> Stamp {
        return self.store.clock();
    }

    /// Visible length in scalars.
    pub fn size(&self) -> usize {
        return self.pieces.prefix_of(self.store.seg(self.eof).last_piece).visible;
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        return self.size() == 0;
    }

    /// History length in scalars (tombstoned text included, sentinel
    /// excluded). History offsets never shift.
    pub fn history_len(&self) -> usize {
        return self.pieces.prefix_of(self.store.seg(self.eof).last_piece).total;
    }

    /// Anchor for a visible offset. `pos == size()` anchors the tail.
    pub fn anchor(&self, pos: usize) -> Option<Anchor> {
        if pos > self.size() {
            return None;
        }
        return self.pieces.visible_anchor(&self.store, pos);
    }

    /// Anchor for a history offset. `pos == history_len()` anchors the
    /// tail.
    pub fn history_anchor(&self, pos: usize) -> Option<Anchor> {
        if pos > self.history_len() {
            return None;
        }
        return self.pieces.history_anchor(&self.store, pos);
    }

    /// Walk the document's pieces in order, sentinel excluded.
    pub fn pieces(&self) -> Pieces<'_> {
        return Pieces {
            doc: self,
            it: self.pieces.begin(),
            stop: self.store.seg(self.eof).last_piece,
        };
    }

    /// Apply any operation.
    pub fn apply(&mut self, op: &Operation) -> Result<(), ApplyError> {
        match op {
            Operation::Insert(op) => return self.insert(op),
            Operation::Delete(op) => return self.del(op),
            Operation::Undo(op) => return self.undo(op),
            Operation::Redo(op) => return self.redo(op),
        }
    }

    /// Apply an insertion.
    pub fn insert(&mut self, op: &Insertion) -> Result<(), ApplyError> {
        let anchor = self
            .store
            .resolve_anchor(self.eof, &op.anchor)
            .ok_or(ApplyError::UnknownAnchor)?;
        if anchor.pos >= self.store.seg(anchor.seg).char_len {
            trace!(stamp = op.stamp, "insertion anchor offset out of range");
            return Err(ApplyError::UnknownAnchor);
        }
        let seg = self
            .store
            .store_op(
                op.replica,
                op.stamp,
                StoredKind::Segment(Segment::new(op.text.as_str(), anchor.seg, anchor.pos)),
            )
            .ok_or(ApplyError::StampOccupied)?;
        self.pieces.insert(&mut self.store, seg);
        return Ok(());
    }

    /// Apply a range deletion.
    pub fn del(&mut self, op: &Deletion) -> Result<(), ApplyError> {
        let begin = self
            .store
            .resolve_anchor(self.eof, &op.begin)
            .ok_or(ApplyError::UnknownAnchor)?;
        let end = self
            .store
            .resolve_anchor(self.eof, &op.end)
            .ok_or(ApplyError::UnknownAnchor)?;
        let begin_seg = self.store.seg(begin.seg);
        let end_seg = self.store.seg(end.seg);
        if begin_seg.char_len == 0
            || end_seg.char_len == 0
            || begin.pos > begin_seg.char_len
            || end.pos > end_seg.char_len
        {
            trace!(stamp = op.stamp, "deletion anchor offset out of range");
            return Err(ApplyError::UnknownAnchor);
        }
        // the endpoint walk needs the left tag strictly before the right
        let begin_off = self.pieces.history_offset(&self.store, begin);
        let end_off = self.pieces.history_offset(&self.store, end);
        if begin_off >= end_off {
            trace!(stamp = op.stamp, "deletion range is empty or inverted");
            return Err(ApplyError::EmptyRange);
        }
        let del_idx = self
            .store
            .store_op(op.replica, op.stamp, StoredKind::Deletion(RangeOp::new()))
            .ok_or(ApplyError::StampOccupied)?;

        let Self { store, pieces, tags, .. } = self;
        let ((left_tag, left_piece), (right_tag, right_piece)) = tags.apply(
            store,
            pieces,
            RangeTag::left(begin, del_idx),
            RangeTag::right(end, del_idx),
        );
        store.range_mut(del_idx).left = left_tag;
        store.range_mut(del_idx).right = right_tag;

        assign_boundary_olds(store, pieces, tags, del_idx, begin, end);
        redo_range_op(store, pieces, tags, del_idx);
        pieces.update_range(left_piece, right_piece);
        return Ok(());
    }

    /// Apply an undo.
    pub fn undo(&mut self, op: &UndoOp) -> Result<(), ApplyError> {
        let mut target = self.store.lookup(op.target).ok_or(ApplyError::UnknownTarget)?;
        if target == self.eof {
            return Err(ApplyError::SentinelTarget);
        }
        if self.store.op(target).has_undo {
            return Err(ApplyError::AlreadyUndone);
        }
        let redirect = match &self.store.op(target).kind {
            StoredKind::Undo { target: inner } => Some((*inner, true)),
            StoredKind::Redo { target: inner } => Some((*inner, false)),
            _ => None,
        };
        if let Some((inner, through_undo)) = redirect {
            self.store.op_mut(target).has_undo = true;
            if through_undo {
                // undoing an undo redoes the original
                let inner_id = self.store.op_id(inner);
                debug!(stamp = op.stamp, "undo of an undo; redirecting to redo");
                return self.redo(&RedoOp::new(op.replica, op.stamp, inner_id));
            }
            target = inner;
        }
        self.store
            .store_op(op.replica, op.stamp, StoredKind::Undo { target })
            .ok_or(ApplyError::StampOccupied)?;

        let is_segment = matches!(self.store.op(target).kind, StoredKind::Segment(_));
        let Self { store, pieces, tags, .. } = self;
        if is_segment {
            undo_insertion(store, pieces, tags, target);
        } else {
            debug_assert!(
                matches!(store.op(target).kind, StoredKind::Deletion(_)),
                "cannot undo an undo/redo directly"
            );
            undo_del(store, pieces, tags, target);
        }
        return Ok(());
    }

    /// Apply a redo.
    pub fn redo(&mut self, op: &RedoOp) -> Result<(), ApplyError> {
        let mut target = self.store.lookup(op.target).ok_or(ApplyError::UnknownTarget)?;
        if target == self.eof {
            return Err(ApplyError::SentinelTarget);
        }
        if !self.store.op(target).has_undo {
            return Err(ApplyError::NotUndone);
        }
        let redirect = match &self.store.op(target).kind {
            StoredKind::Undo { target: inner } => Some((*inner, true)),
            StoredKind::Redo { target: inner } => Some((*inner, false)),
            _ => None,
        };
        if let Some((inner, through_undo)) = redirect {
            self.store.op_mut(target).has_undo = false;
            if through_undo {
                // redoing an undo undoes the original again
                let inner_id = self.store.op_id(inner);
                debug!(stamp = op.stamp, "redo of an undo; redirecting to undo");
                return self.undo(&UndoOp::new(op.replica, op.stamp, inner_id));
            }
            target = inner;
        }
        self.store
            .store_op(op.replica, op.stamp, StoredKind::Redo { target })
            .ok_or(ApplyError::StampOccupied)?;

        let is_segment = matches!(self.store.op(target).kind, StoredKind::Segment(_));
        let Self { store, pieces, tags, .. } = self;
        if is_segment {
            redo_insertion(store, pieces, tags, target);
        } else {
            debug_assert!(
                matches!(store.op(target).kind, StoredKind::Deletion(_)),
                "cannot redo an undo/redo directly"
            );
            redo_del(store, pieces, tags, target);
        }
        return Ok(());
    }
}

impl Default for PieceCrdt {
    fn default() -> Self {
        return Self::new();
    }
}

impl fmt::Display for PieceCrdt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for piece in self.pieces() {
            if !piece.removed {
                f.write_str(piece.text)?;
            }
        }
        return Ok(());
    }
}

/// Iterator over document pieces, sentinel excluded.
pub struct Pieces<'a> {
    doc: &'a PieceCrdt,
    it: CellRef,
    stop: CellIdx,
}

impl<'a> Iterator for Pieces<'a> {
    type Item = PieceView<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.it.is_special() || self.it.as_normal() == self.stop {
            return None;
        }
        let piece = self.doc.pieces.piece(self.it.as_normal());
        self.it = self.doc.pieces.next(self.it);
        return Some(PieceView {
            text: piece.text(&self.doc.store),
            len: piece.len,
            removed: piece.is_removed(),
        });
    }
}

/// The piece whose start coincides with a tag's position. Anchors are
/// piece-aligned (tags split on apply), so this is the piece starting at
/// the anchor offset; for a one-past-the-segment anchor it is the piece
/// after the segment's last.
fn boundary_cell(store: &OpStore, pieces: &PieceTree, anchor: StoredAnchor) -> CellIdx {
    let cell = pieces.find_anchor(store, anchor);
    let piece = pieces.piece(cell);
    if piece.len > 0 && anchor.pos == piece.seg_pos + piece.len {
        // one-past anchor: step to the boundary, then past any empty
        // split fragments so every tag at this position stops on the
        // same cell
        let mut cell = pieces.next_cell(cell).as_normal();
        while pieces.piece(cell).len == 0 {
            cell = pieces.next_cell(cell).as_normal();
        }
        return cell;
    }
    debug_assert_eq!(piece.seg_pos, anchor.pos, "tag anchor is not piece-aligned");
    return cell;
}

/// Tombstone a piece if this op is newer than its current tombstone.
/// Segments newer than the op are not covered by it: their text was
/// inserted concurrently with (or after) the op's authoring, and every
/// replica must leave it visible no matter the delivery order.
fn paint_newer(store: &OpStore, pieces: &mut PieceTree, cell: CellIdx, op: OpIdx) {
    let piece = pieces.piece(cell);
    if store.op_lt(op, piece.seg) {
        return;
    }
    let tombstone = piece.tombstone;
    if tombstone == NONE || store.op_lt(tombstone, op) {
        pieces.piece_mut(cell).tombstone = op;
    }
}

/// Seed the endpoint `old` pointers of a freshly applied range op from
/// the tombstones of the pieces just outside the range. A neighbor with
/// no tombstone pins `old` to null; a neighbor tombstoned by an op that
/// shares this endpoint inherits that op's own `old`; otherwise an older
/// tombstoning op becomes the `old`. Endpoints left bad are resolved by
/// the crossing walk or marked UnUsed.
fn assign_boundary_olds(
    store: &OpStore,
    pieces: &PieceTree,
    tags: &mut RangeTree,
    op: OpIdx,
    begin: StoredAnchor,
    end: StoredAnchor,
) {
    let left_tag = store.range(op).left;
    let right_tag = store.range(op).right;
    let left_piece = boundary_cell(store, pieces, begin);
    let right_piece = boundary_cell(store, pieces, end);

    if CellRef::normal(left_piece) != pieces.begin() {
        let before = pieces.prev_cell(left_piece).as_normal();
        let tombstone = pieces.piece(before).tombstone;
        if tombstone == NONE {
            tags.tag_mut(left_tag).old.set_null();
        } else {
            let other = store.range(tombstone).right;
            debug_assert!(tags.tag(other).old.is_good());
            if tags.tag(other).anchor != begin {
                if store.op_lt(tombstone, op) {
                    tags.tag_mut(left_tag).old.set_index(tombstone);
                }
            } else {
                debug_assert_eq!(tags.tag(other).status, TagStatus::Active);
                let inherited = tags.tag(other).old;
                if inherited.get().map_or(true, |o| store.op_lt(o, op)) {
                    tags.tag_mut(left_tag).old = inherited;
                }
            }
        }
    }

    {
        let tombstone = pieces.piece(right_piece).tombstone;
        if tombstone == NONE {
            tags.tag_mut(right_tag).old.set_null();
        } else {
            let other = store.range(tombstone).left;
            debug_assert!(tags.tag(other).old.is_good());
            if tags.tag(other).anchor != end {
                if store.op_lt(tombstone, op) {
                    tags.tag_mut(right_tag).old.set_index(tombstone);
                }
            } else {
                debug_assert_eq!(tags.tag(other).status, TagStatus::Active);
                let inherited = tags.tag(other).old;
                if inherited.get().map_or(true, |o| store.op_lt(o, op)) {
                    tags.tag_mut(right_tag).old = inherited;
                }
            }
        }
    }
}

/// Apply or re-apply a range op: walk its tags, paint tombstones on the
/// pieces in between, detect crossings with older active ops, and settle
/// the endpoint `old` pointers and status.
fn redo_range_op(store: &mut OpStore, pieces: &mut PieceTree, tags: &mut RangeTree, op: OpIdx) {
    store.op_mut(op).has_undo = false;
    let left_it = store.range(op).left;
    let right_it = store.range(op).right;

    let mut has_across = false;
    let mut first_across = left_it;
    let mut last_across = right_it;

    let mut piece_cell = boundary_cell(store, pieces, tags.tag(left_it).anchor);
    let mut it = tags.next_cell(left_it);
    loop {
        debug_assert!(it.is_normal(), "walk ran past the right endpoint");
        let it_cell = it.as_normal();
        let stop = boundary_cell(store, pieces, tags.tag(it_cell).anchor);
        while piece_cell != stop {
            paint_newer(store, pieces, piece_cell, op);
            piece_cell = pieces.next_cell(piece_cell).as_normal();
        }
        if it_cell == right_it {
            break;
        }

        let tag = *tags.tag(it_cell);
        if tag.status == TagStatus::Active {
            let covered = tag.old.get().map_or(true, |o| store.op_lt(o, op));
            if covered && store.op_lt(op, tag.cur) {
                // this op slides between the tag's owner and its old
                has_across = true;
                if first_across == left_it {
                    first_across = it_cell;
                }
                if last_across != right_it && last_across != first_across {
                    tags.tag_mut(last_across).old.set_index(op);
                }
                last_across = it_cell;
            }
        }
        it = tags.next_cell(it_cell);
    }

    if !has_across {
        if tags.tag(left_it).old.is_good() && tags.tag(right_it).old.is_good() {
            // newest op over its whole range
            tags.tag_mut(left_it).status = TagStatus::Active;
            tags.tag_mut(right_it).status = TagStatus::Active;
        } else {
            // both endpoints sit exactly under a newer op's endpoints;
            // remembered for later undo, contributes nothing now
            tags.tag_mut(left_it).status = TagStatus::UnUsed;
            tags.tag_mut(right_it).status = TagStatus::UnUsed;
        }
        return;
    }

    tags.tag_mut(left_it).status = TagStatus::Active;
    tags.tag_mut(right_it).status = TagStatus::Active;

    // walk outward from the crossings to settle bad endpoints, tracking
    // the newest op whose interval still dominates
    if tags.tag(left_it).old.is_bad() {
        let mut newest = tags.tag(first_across).old.get();
        let mut walk = tags.prev_cell(first_across);
        loop {
            let walk_cell = walk.as_normal();
            if walk_cell == left_it {
                break;
            }
            let tag = *tags.tag(walk_cell);
            if tag.status == TagStatus::Active {
                if tag.is_left && newest == Some(tag.cur) {
                    newest = tag.old.get();
                } else if !tag.is_left
                    && newest.map_or(true, |n| store.op_lt(n, tag.cur))
                    && store.op_lt(tag.cur, op)
                {
                    debug_assert_eq!(tag.old.get(), newest);
                    newest = Some(tag.cur);
                }
            }
            walk = tags.prev_cell(walk_cell);
        }
        tags.tag_mut(left_it).old.set(newest);
    }

    if tags.tag(right_it).old.is_bad() {
        let mut newest = tags.tag(last_across).old.get();
        let mut walk = tags.next_cell(last_across);
        loop {
            let walk_cell = walk.as_normal();
            if walk_cell == right_it {
                break;
            }
            let tag = *tags.tag(walk_cell);
            if tag.status == TagStatus::Active {
                if !tag.is_left && newest == Some(tag.cur) {
                    newest = tag.old.get();
                } else if tag.is_left
                    && store.op_lt(tag.cur, op)
                    && newest.map_or(true, |n| store.op_lt(n, tag.cur))
                {
                    debug_assert_eq!(tag.old.get(), newest);
                    newest = Some(tag.cur);
                }
            }
            walk = tags.next_cell(walk_cell);
        }
        tags.tag_mut(right_it).old.set(newest);
    }

    tags.tag_mut(first_across).old.set_index(op);
    tags.tag_mut(last_across).old.set_index(op);
    debug_assert_eq!(tags.tag(left_it).old.is_good(), tags.tag(right_it).old.is_good());
}

/// Undo a range op: walk its tags, repaint pieces it tombstoned with the
/// newest still-covering op, rewrite `old` pointers that referred to it,
/// and collect fully dominated UnUsed ops for revival. Returns the
/// revived candidates newest-first.
fn undo_range_op(
    store: &mut OpStore,
    pieces: &mut PieceTree,
    tags: &mut RangeTree,
    op: OpIdx,
) -> Vec<OpIdx> {
    store.op_mut(op).has_undo = true;
    let left_it = store.range(op).left;
    let right_it = store.range(op).right;

    if tags.tag(left_it).status == TagStatus::UnUsed || tags.tag(right_it).status == TagStatus::UnUsed {
        tags.tag_mut(left_it).status = TagStatus::Undone;
        tags.tag_mut(right_it).status = TagStatus::Undone;
        return Vec::new();
    }
    tags.tag_mut(left_it).status = TagStatus::Undone;
    tags.tag_mut(right_it).status = TagStatus::Undone;

    // unused ops are fully covered by some op, so only ops whose both
    // tags lie inside this range can need revival
    let mut unused_seen: FxHashSet<OpIdx> = FxHashSet::default();
    let mut revive: Vec<OpIdx> = Vec::new();

    let mut piece_cell = boundary_cell(store, pieces, tags.tag(left_it).anchor);
    let mut newest = tags.tag(left_it).old.get();
    let mut it = tags.next_cell(left_it);
    loop {
        debug_assert!(it.is_normal(), "walk ran past the right endpoint");
        let it_cell = it.as_normal();
        let stop = boundary_cell(store, pieces, tags.tag(it_cell).anchor);
        while piece_cell != stop {
            if pieces.piece(piece_cell).tombstone == op {
                // the replacement op must itself cover this segment (an
                // anti-deletion shares its segment's identity, so "not
                // older" rather than "strictly newer")
                let seg = pieces.piece(piece_cell).seg;
                let replacement = newest.filter(|&n| !store.op_lt(n, seg));
                pieces.piece_mut(piece_cell).tombstone = replacement.unwrap_or(NONE);
            }
            piece_cell = pieces.next_cell(piece_cell).as_normal();
        }
        if it_cell == right_it {
            break;
        }

        let tag = *tags.tag(it_cell);
        let skip = match tag.status {
            TagStatus::Undone => true,
            TagStatus::UnUsed => store.op_lt(op, tag.cur),
            TagStatus::Active => tag.old.get().map_or(false, |o| store.op_lt(op, o)),
        };
        if skip {
            it = tags.next_cell(it_cell);
            continue;
        }

        if tag.old.is_index(op) {
            tags.tag_mut(it_cell).old.set(newest);
        } else if tag.is_left {
            if tag.status == TagStatus::UnUsed {
                unused_seen.insert(tag.cur);
                if newest.map_or(true, |n| store.op_lt(n, tag.cur)) {
                    tags.tag_mut(it_cell).old.set(newest);
                } else {
                    tags.tag_mut(it_cell).old.set_bad();
                }
            } else if newest.map_or(true, |n| store.op_lt(n, tag.cur)) {
                debug_assert_eq!(tag.old.get(), newest);
                newest = Some(tag.cur);
            }
        } else {
            if tag.status == TagStatus::UnUsed {
                if unused_seen.contains(&tag.cur) {
                    revive.push(tag.cur);
                    if newest.map_or(true, |n| store.op_lt(n, tag.cur)) {
                        tags.tag_mut(it_cell).old.set(newest);
                    } else {
                        tags.tag_mut(it_cell).old.set_bad();
                    }
                }
            } else if newest == Some(tag.cur) {
                newest = tag.old.get();
            }
        }
        it = tags.next_cell(it_cell);
    }

    // revive newest first so repaints land in operation order
    revive.sort_by(|&a, &b| {
        if store.op_lt(b, a) {
            return std::cmp::Ordering::Less;
        }
        if store.op_lt(a, b) {
            return std::cmp::Ordering::Greater;
        }
        return std::cmp::Ordering::Equal;
    });
    return revive;
}

fn redo_del(store: &mut OpStore, pieces: &mut PieceTree, tags: &mut RangeTree, op: OpIdx) {
    redo_range_op(store, pieces, tags, op);
    let left = pieces.find_anchor(store, tags.tag(store.range(op).left).anchor);
    let right = pieces.find_anchor(store, tags.tag(store.range(op).right).anchor);
    pieces.update_range(left, right);
}

fn undo_del(store: &mut OpStore, pieces: &mut PieceTree, tags: &mut RangeTree, op: OpIdx) {
    let revive = undo_range_op(store, pieces, tags, op);
    for covered in revive {
        redo_range_op(store, pieces, tags, covered);
    }
    let left = pieces.find_anchor(store, tags.tag(store.range(op).left).anchor);
    let right = pieces.find_anchor(store, tags.tag(store.range(op).right).anchor);
    pieces.update_range(left, right);
}

/// Hide an insertion by applying (or re-applying) its anti-deletion: a
/// synthesized range op covering the whole segment, sharing the
/// segment's identity in the operation order.
fn undo_insertion(store: &mut OpStore, pieces: &mut PieceTree, tags: &mut RangeTree, seg_idx: OpIdx) {
    if store.seg(seg_idx).char_len == 0 {
        // nothing to hide, and an empty range has no valid tag pair
        store.op_mut(seg_idx).has_undo = true;
        return;
    }
    if store.seg(seg_idx).undo_op == NONE {
        let (replica, stamp) = {
            let header = store.op(seg_idx);
            (header.replica, header.stamp)
        };
        let anti = store.store_synthetic(replica, stamp, StoredKind::Deletion(RangeOp::new()));
        let begin = StoredAnchor::new(seg_idx, 0);
        let end = StoredAnchor::new(seg_idx, store.seg(seg_idx).char_len);

        let ((left_tag, left_piece), (right_tag, right_piece)) =
            tags.apply(store, pieces, RangeTag::left(begin, anti), RangeTag::right(end, anti));
        store.range_mut(anti).left = left_tag;
        store.range_mut(anti).right = right_tag;
        store.seg_mut(seg_idx).undo_op = anti;

        assign_boundary_olds(store, pieces, tags, anti, begin, end);
        redo_range_op(store, pieces, tags, anti);
        pieces.update_range(left_piece, right_piece);
    } else {
        let anti = store.seg(seg_idx).undo_op;
        redo_del(store, pieces, tags, anti);
    }
    store.op_mut(seg_idx).has_undo = true;
}

/// Show an insertion again by undoing its anti-deletion.
fn redo_insertion(store: &mut OpStore, pieces: &mut PieceTree, tags: &mut RangeTree, seg_idx: OpIdx) {
    let anti = store.seg(seg_idx).undo_op;
    if anti != NONE {
        undo_del(store, pieces, tags, anti);
    }
    store.op_mut(seg_idx).has_undo = false;
}
