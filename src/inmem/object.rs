use std::{collections::HashMap, fmt};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{
    catalog::MvccNode,
    error::AccessError,
    id::ObjectId,
    key::KeyOwned,
    mvcc::Timestamp,
    object::{DupRequest, ObjectData},
    pruning::ZoneMap,
    row::{RowId, RowIds},
};

// Fixed per-row bookkeeping on top of the key's heap bytes.
const ROW_OVERHEAD: usize = 48;

struct MemRow {
    key: KeyOwned,
    commit: MvccNode,
    deleted_at: Option<Timestamp>,
}

#[derive(Default)]
struct Rows {
    rows: Vec<MemRow>,
    // Row offsets per key, in append order.
    index: HashMap<KeyOwned, Vec<u32>>,
    zone_map: ZoneMap,
    approx_bytes: usize,
}

/// Row-oriented object held entirely in memory.
///
/// Every row carries its own commit record, so the same type serves
/// appendable objects (rows committed one transaction at a time) and sealed
/// objects (all rows share the object's creation record).
pub struct MemObject {
    id: ObjectId,
    inner: RwLock<Rows>,
}

impl fmt::Debug for MemObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("MemObject")
            .field("id", &self.id)
            .field("rows", &inner.rows.len())
            .field("zone_map", &inner.zone_map)
            .finish()
    }
}

impl MemObject {
    /// Empty object.
    pub fn new(id: ObjectId) -> Self {
        Self {
            id,
            inner: RwLock::new(Rows::default()),
        }
    }

    /// Object whose rows all share `commit`.
    pub fn with_keys(
        id: ObjectId,
        keys: impl IntoIterator<Item = KeyOwned>,
        commit: MvccNode,
    ) -> Self {
        let object = Self::new(id);
        for key in keys {
            object.append(key, commit.clone());
        }
        object
    }

    /// Object identity.
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Append one row and return its offset.
    pub fn append(&self, key: KeyOwned, commit: MvccNode) -> u32 {
        let mut inner = self.inner.write();
        let offset = inner.rows.len() as u32;
        inner.approx_bytes += key.heap_size() + ROW_OVERHEAD;
        inner.zone_map.update(&key);
        inner.index.entry(key.clone()).or_default().push(offset);
        inner.rows.push(MemRow {
            key,
            commit,
            deleted_at: None,
        });
        offset
    }

    /// Mark row `offset` deleted at `ts`. Returns `false` for unknown rows.
    pub fn delete_row(&self, offset: u32, ts: Timestamp) -> bool {
        match self.inner.write().rows.get_mut(offset as usize) {
            Some(row) => {
                row.deleted_at = Some(ts);
                true
            }
            None => false,
        }
    }

    /// Number of rows, including deleted ones.
    pub fn len(&self) -> usize {
        self.inner.read().rows.len()
    }

    /// `true` when the object holds no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Min/max over every key ever appended.
    pub fn zone_map(&self) -> ZoneMap {
        self.inner.read().zone_map.clone()
    }
}

#[async_trait]
impl ObjectData for MemObject {
    async fn get_duplicated_rows(
        &self,
        req: &DupRequest<'_>,
        rows: &mut RowIds,
    ) -> Result<(), AccessError> {
        let inner = self.inner.read();
        if !inner.zone_map.fast_intersect(req.keys_zm) {
            return Ok(());
        }
        let read_ts = req.read_view.read_ts();
        for (idx, key) in req.keys.iter().enumerate() {
            if !rows.is_empty_at(idx) {
                continue;
            }
            let Some(offsets) = inner.index.get(key) else {
                continue;
            };
            for &offset in offsets {
                let row = &inner.rows[offset as usize];
                let Some(commit_ts) = row.commit.commit_ts() else {
                    if req.check_ww && row.commit.is_pending() {
                        return Err(AccessError::WriteConflict {
                            object: self.id,
                            key: row.key.clone(),
                        });
                    }
                    continue;
                };
                if !req.range.contains(commit_ts) {
                    continue;
                }
                if !req.read_view.sees(commit_ts) {
                    if req.check_ww {
                        return Err(AccessError::WriteConflict {
                            object: self.id,
                            key: row.key.clone(),
                        });
                    }
                    continue;
                }
                if row.deleted_at.is_some_and(|deleted| deleted <= read_ts) {
                    continue;
                }
                rows.fill(idx, RowId::new(self.id, offset));
                break;
            }
        }
        Ok(())
    }

    fn approx_size(&self) -> usize {
        self.inner.read().approx_bytes
    }
}
