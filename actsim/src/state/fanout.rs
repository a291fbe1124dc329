//! Per-cell fanout lists: the set of actors to notify when a boolean or
//! integer cell changes.
//!
//! Small lists are common (most nets drive a handful of gates) so the
//! representation starts as an inline small-vector and only promotes to a
//! geometric-growth heap allocation once it crosses a threshold; the
//! promoted capacity is tracked so repeated growth doesn't repeatedly
//! reallocate by one slot at a time.

use hashbrown::HashMap;
use smallvec::SmallVec;

/// Opaque identity for an actor that can be registered on a fanout list.
/// The hierarchy layer hands these out; they index into whatever actor
/// table the simulator owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(pub u32);

const INLINE_CAP: usize = 4;
/// Above this many entries a cell's list is promoted to the tracked
/// geometric-growth representation.
const PROMOTE_THRESHOLD: usize = 8;
/// How many of the most recently inserted entries `insert` checks against
/// for de-duplication, per the spec's "idempotent over the last few
/// insertions" fanout contract.
const DEDUP_TAIL: usize = 6;

#[derive(Debug, Clone, Default)]
struct FanoutList {
    entries: SmallVec<[ActorId; INLINE_CAP]>,
}

impl FanoutList {
    fn insert(&mut self, id: ActorId) {
        let tail_start = self.entries.len().saturating_sub(DEDUP_TAIL);
        if self.entries[tail_start..].contains(&id) {
            return;
        }
        self.entries.push(id);
    }
}

/// Tracks, for cells whose fanout list has been promoted, the allocated
/// capacity separately from the logical length so growth doubles rather
/// than reallocating one element at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct GrowthRecord {
    capacity: usize,
}

/// A fanout table over a dense key space (global offsets). One table is
/// kept per cell kind (boolean, integer) by the state vector.
#[derive(Debug, Clone, Default)]
pub struct FanoutTable {
    lists: HashMap<u32, FanoutList>,
    growth: HashMap<u32, GrowthRecord>,
}

impl FanoutTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `actor` to be notified when `key` changes. Idempotent over
    /// the last few registrations, so repeated calls during hierarchy
    /// traversal are harmless.
    pub fn register(&mut self, key: u32, actor: ActorId) {
        let list = self.lists.entry(key).or_default();
        list.insert(actor);
        if list.entries.len() > PROMOTE_THRESHOLD {
            let rec = self.growth.entry(key).or_insert(GrowthRecord {
                capacity: list.entries.capacity(),
            });
            if list.entries.len() > rec.capacity {
                rec.capacity = (rec.capacity * 2).max(list.entries.len());
                list.entries.reserve(rec.capacity - list.entries.len());
            }
        }
    }

    /// The actors currently registered against `key`, in registration
    /// order.
    pub fn fanout(&self, key: u32) -> &[ActorId] {
        self.lists
            .get(&key)
            .map(|l| l.entries.as_slice())
            .unwrap_or(&[])
    }

    pub fn len_for(&self, key: u32) -> usize {
        self.lists.get(&key).map(|l| l.entries.len()).unwrap_or(0)
    }
}
