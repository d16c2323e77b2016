//! Order storage for one (item, side, price) level.
//!
//! Orders live in fixed-size segments of [`SEGMENT_SIZE`] slots, strictly in arrival
//! order. The head of the level is described by a [`LevelHead`] kept on the price's
//! tree node: whole drained segments are skipped via `tombstone_offset`, drained slots
//! at the start of the first live segment via `in_segment_deleted`. Neither is reset
//! when the level empties, so a re-created level appends after its history instead of
//! rescanning it.
//!
//! Invariant: the live entries of a level form one contiguous run starting at the head.
//! Only the last segment may have empty trailing slots.

use serde::{Deserialize, Serialize};

use crate::types::{OrderId, Quantity};

/// Slots per segment.
pub const SEGMENT_SIZE: usize = 4;

/// Where the live part of a level starts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelHead {
    /// Whole segments at the front that are fully drained.
    pub tombstone_offset: usize,
    /// Drained slots at the front of the first live segment.
    pub in_segment_deleted: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelEntry {
    pub order_id: OrderId,
    pub quantity: Quantity,
}

#[derive(Clone, Debug, Default)]
struct Segment {
    slots: [Option<LevelEntry>; SEGMENT_SIZE],
}

impl Segment {
    /// Index one past the last occupied slot.
    fn tail_len(&self) -> usize {
        self.slots
            .iter()
            .rposition(Option::is_some)
            .map_or(0, |i| i + 1)
    }

    fn occupied(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

/// One order touched by a consumption.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelFill {
    pub order_id: OrderId,
    pub quantity: Quantity,
    pub fully_filled: bool,
}

/// Result of walking a level with a quantity budget. Computed without mutating the
/// level; [`PriceLevelQueue::apply`] commits it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Consumption {
    pub fills: Vec<LevelFill>,
    pub consumed: Quantity,
    /// Segments that became fully drained; fold into `tombstone_offset`.
    pub segments_drained: usize,
    /// Head after the consumption.
    pub head: LevelHead,
    /// No live entries remain; the price must leave the tree.
    pub emptied: bool,
    from: LevelHead,
    partial: Option<(usize, usize, Quantity)>,
}

/// Result of removing one entry (cancel).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Removal {
    pub entry: LevelEntry,
    pub head: LevelHead,
    /// Head segments dropped by the removal (0 or 1).
    pub segments_dropped: usize,
    pub emptied: bool,
}

/// Copy of a level's segments from its head segment on. Segments before the head are
/// drained and never written again, so this is enough to put the level back.
#[derive(Clone, Debug)]
pub struct LevelSnapshot {
    start: usize,
    segments: Vec<Segment>,
    live: usize,
}

#[derive(Clone, Debug, Default)]
pub struct PriceLevelQueue {
    segments: Vec<Segment>,
    live: usize,
}

impl PriceLevelQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live orders at this level.
    pub fn live_orders(&self) -> usize {
        self.live
    }

    /// Segments ever allocated, drained ones included.
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn entry(&self, segment: usize, offset: usize) -> Option<LevelEntry> {
        self.segments.get(segment)?.slots.get(offset).copied().flatten()
    }

    /// Live entries in FIFO order.
    pub fn entries(&self, head: LevelHead) -> impl Iterator<Item = LevelEntry> + '_ {
        self.segments
            .iter()
            .enumerate()
            .skip(head.tombstone_offset)
            .flat_map(move |(s, seg)| {
                let from = if s == head.tombstone_offset {
                    head.in_segment_deleted
                } else {
                    0
                };
                seg.slots[from..].iter().flatten().copied()
            })
    }

    /// Total resting quantity at this level.
    pub fn open_interest(&self, head: LevelHead) -> u64 {
        self.entries(head).map(|e| u64::from(e.quantity)).sum()
    }

    /// Appends at the tail. Fills the next free slot of the last segment if that
    /// segment is still live, otherwise opens a new segment. Returns (segment, offset).
    pub fn append(&mut self, head: LevelHead, order_id: OrderId, quantity: Quantity) -> (usize, usize) {
        let entry = LevelEntry { order_id, quantity };
        let len = self.segments.len();
        if len > head.tombstone_offset {
            let last = &mut self.segments[len - 1];
            let tail = last.tail_len();
            if tail < SEGMENT_SIZE {
                last.slots[tail] = Some(entry);
                self.live += 1;
                return (len - 1, tail);
            }
        }
        let mut segment = Segment::default();
        segment.slots[0] = Some(entry);
        self.segments.push(segment);
        self.live += 1;
        (len, 0)
    }

    /// Binary search for `order_id` over the live segments. Relies on ids being
    /// strictly increasing along the level.
    pub fn find_index(&self, head: LevelHead, order_id: OrderId) -> Option<(usize, usize)> {
        let start = head.tombstone_offset;
        let end = self.segments.len();
        if start >= end {
            return None;
        }
        let first_id = |s: usize| {
            let offset = if s == start { head.in_segment_deleted } else { 0 };
            self.segments[s].slots[offset].map(|e| e.order_id)
        };
        // Last segment whose first live id is <= order_id lies in [lo, hi).
        let (mut lo, mut hi) = (start, end);
        while hi - lo > 1 {
            let mid = lo + (hi - lo) / 2;
            match first_id(mid) {
                Some(id) if id <= order_id => lo = mid,
                _ => hi = mid,
            }
        }
        let from = if lo == start { head.in_segment_deleted } else { 0 };
        for offset in from..SEGMENT_SIZE {
            match self.segments[lo].slots[offset] {
                Some(e) if e.order_id == order_id => return Some((lo, offset)),
                Some(e) if e.order_id < order_id => continue,
                _ => return None,
            }
        }
        None
    }

    /// Removes the entry at (segment, offset). A head segment left without live entries
    /// is dropped whole; otherwise later entries shift one slot left, across segment
    /// boundaries, keeping the run contiguous. O(remaining entries).
    pub fn remove_at(&mut self, head: LevelHead, segment: usize, offset: usize) -> Option<Removal> {
        let len = self.segments.len();
        if segment < head.tombstone_offset
            || segment >= len
            || offset >= SEGMENT_SIZE
            || (segment == head.tombstone_offset && offset < head.in_segment_deleted)
        {
            return None;
        }
        let entry = self.segments[segment].slots[offset]?;

        if segment == head.tombstone_offset && self.segments[segment].occupied() == 1 {
            self.segments[segment].slots[offset] = None;
            self.live -= 1;
            let next = LevelHead {
                tombstone_offset: head.tombstone_offset + 1,
                in_segment_deleted: 0,
            };
            return Some(Removal {
                entry,
                head: next,
                segments_dropped: 1,
                emptied: next.tombstone_offset == len,
            });
        }

        let (mut s, mut o) = (segment, offset);
        loop {
            let (ns, no) = if o + 1 == SEGMENT_SIZE { (s + 1, 0) } else { (s, o + 1) };
            let next = if ns < len { self.segments[ns].slots[no] } else { None };
            self.segments[s].slots[o] = next;
            if next.is_none() {
                break;
            }
            s = ns;
            o = no;
        }
        if let Some(last) = self.segments.last() {
            if last.tail_len() == 0 && self.segments.len() > head.tombstone_offset + 1 {
                self.segments.pop();
            }
        }
        self.live -= 1;
        Some(Removal {
            entry,
            head,
            segments_dropped: 0,
            emptied: false,
        })
    }

    /// Walks forward from `head` taking up to `budget` units in FIFO order. Whole
    /// entries are consumed until the budget runs short; the entry that exhausts it is
    /// partially filled in place.
    pub fn consume_from(&self, head: LevelHead, budget: Quantity) -> Consumption {
        let len = self.segments.len();
        let mut seg = head.tombstone_offset;
        let mut off = head.in_segment_deleted;
        let mut remaining = budget;
        let mut fills = Vec::new();
        let mut partial = None;

        while remaining > 0 && seg < len {
            if off == SEGMENT_SIZE {
                seg += 1;
                off = 0;
                continue;
            }
            let Some(entry) = self.segments[seg].slots[off] else {
                // only the tail of the last segment is empty
                seg += 1;
                off = 0;
                continue;
            };
            if entry.quantity <= remaining {
                remaining -= entry.quantity;
                fills.push(LevelFill {
                    order_id: entry.order_id,
                    quantity: entry.quantity,
                    fully_filled: true,
                });
                off += 1;
            } else {
                fills.push(LevelFill {
                    order_id: entry.order_id,
                    quantity: remaining,
                    fully_filled: false,
                });
                partial = Some((seg, off, entry.quantity - remaining));
                remaining = 0;
            }
        }
        if partial.is_none()
            && seg < len
            && (off == SEGMENT_SIZE || self.segments[seg].slots[off].is_none())
        {
            seg += 1;
            off = 0;
        }

        let next = LevelHead {
            tombstone_offset: seg,
            in_segment_deleted: off,
        };
        Consumption {
            fills,
            consumed: budget - remaining,
            segments_drained: seg - head.tombstone_offset,
            head: next,
            emptied: seg >= len,
            from: head,
            partial,
        }
    }

    /// Commits a consumption computed by [`consume_from`](Self::consume_from) against
    /// the current state of this level.
    pub fn apply(&mut self, consumption: &Consumption) {
        let len = self.segments.len();
        let (mut s, mut o) = (
            consumption.from.tombstone_offset,
            consumption.from.in_segment_deleted,
        );
        let stop = (
            consumption.head.tombstone_offset,
            consumption.head.in_segment_deleted,
        );
        while (s, o) < stop && s < len {
            self.segments[s].slots[o] = None;
            o += 1;
            if o == SEGMENT_SIZE {
                s += 1;
                o = 0;
            }
        }
        if let Some((s, o, quantity)) = consumption.partial {
            if let Some(entry) = self.segments[s].slots[o].as_mut() {
                entry.quantity = quantity;
            }
        }
        let drained = consumption.fills.iter().filter(|f| f.fully_filled).count();
        self.live -= drained;
    }

    /// Copies the live part of the level. O(live orders).
    pub fn snapshot(&self, head: LevelHead) -> LevelSnapshot {
        let start = head.tombstone_offset.min(self.segments.len());
        LevelSnapshot {
            start,
            segments: self.segments[start..].to_vec(),
            live: self.live,
        }
    }

    /// Puts the level back to `snapshot`. Valid while the head has not moved behind
    /// the snapshot's start, which holds because heads only move forward.
    pub fn restore(&mut self, snapshot: LevelSnapshot) {
        self.segments.truncate(snapshot.start);
        self.segments.extend(snapshot.segments);
        self.live = snapshot.live;
    }
}
