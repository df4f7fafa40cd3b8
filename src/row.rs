//! Row identifiers and the positional vectors duplicate lookups fill in.

use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::id::ObjectId;

/// Stable reference to one row inside one object.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowId {
    object: ObjectId,
    offset: u32,
}

impl RowId {
    /// Row `offset` of `object`.
    pub const fn new(object: ObjectId, offset: u32) -> Self {
        Self { object, offset }
    }

    /// Object holding the row.
    pub fn object(&self) -> ObjectId {
        self.object
    }

    /// Position of the row inside its object.
    pub fn offset(&self) -> u32 {
        self.offset
    }
}

impl fmt::Debug for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RowId({}:{})", self.object, self.offset)
    }
}

/// Row identifiers aligned 1:1 with a probe key vector.
///
/// `None` is the empty sentinel: the probe key at that position had no
/// match. Slots are filled at most once; the first match wins.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RowIds {
    slots: Vec<Option<RowId>>,
}

impl RowIds {
    /// `len` empty slots.
    pub fn empty(len: usize) -> Self {
        Self {
            slots: vec![None; len],
        }
    }

    /// Number of slots (equals the probe length).
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// `true` when there are no slots at all.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Row matched at `idx`, if any.
    pub fn get(&self, idx: usize) -> Option<RowId> {
        self.slots.get(idx).copied().flatten()
    }

    /// `true` when slot `idx` holds no match.
    pub fn is_empty_at(&self, idx: usize) -> bool {
        self.get(idx).is_none()
    }

    /// Record a match for slot `idx` unless one is already there.
    ///
    /// Returns `true` when the slot was filled by this call.
    pub fn fill(&mut self, idx: usize, row: RowId) -> bool {
        match self.slots.get_mut(idx) {
            Some(slot) if slot.is_none() => {
                *slot = Some(row);
                true
            }
            _ => false,
        }
    }

    /// Positions that already hold a match.
    pub fn matched(&self) -> impl Iterator<Item = (usize, RowId)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot.map(|row| (idx, row)))
    }

    /// Number of matched slots.
    pub fn matched_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// `true` once every slot holds a match.
    pub fn all_matched(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// Slot view.
    pub fn as_slice(&self) -> &[Option<RowId>] {
        &self.slots
    }

    fn reset(&mut self, len: usize) {
        self.slots.clear();
        self.slots.resize(len, None);
    }
}

/// Recycles row-identifier buffers between lookups.
#[derive(Debug)]
pub struct RowIdPool {
    free: Mutex<Vec<RowIds>>,
    capacity: usize,
}

impl RowIdPool {
    /// Pool keeping at most `capacity` idle buffers.
    pub fn new(capacity: usize) -> Self {
        Self {
            free: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    /// Vector of `len` empty slots, reusing an idle buffer when one exists.
    pub fn get(&self, len: usize) -> RowIds {
        match self.free.lock().pop() {
            Some(mut ids) => {
                ids.reset(len);
                ids
            }
            None => RowIds::empty(len),
        }
    }

    /// Return a buffer for reuse.
    pub fn put(&self, ids: RowIds) {
        let mut free = self.free.lock();
        if free.len() < self.capacity {
            free.push(ids);
        }
    }

    /// Number of idle buffers.
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }
}

impl Default for RowIdPool {
    fn default() -> Self {
        Self::new(16)
    }
}
