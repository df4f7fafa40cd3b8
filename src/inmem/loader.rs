use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use arrow::{array::ArrayRef, record_batch::RecordBatch};
use async_trait::async_trait;
use parking_lot::RwLock;

use super::MemObject;
use crate::{
    catalog::MvccNode,
    error::{AccessError, DedupResult},
    extractor::keys_from_batch_index,
    id::ObjectId,
    object::{BlockLocation, ObjectData, ObjectLoader, ObjectStats},
    pruning::ZoneMap,
};

struct StoredObject {
    blocks: Vec<RecordBatch>,
    pk_index: usize,
}

/// [`ObjectLoader`] over objects written into memory.
///
/// Objects are split into blocks of at most `block_max_rows` rows when
/// written, mirroring how an object writer lays out blocks on disk.
pub struct MemObjectLoader {
    objects: RwLock<HashMap<ObjectId, StoredObject>>,
    block_max_rows: u32,
    column_loads: AtomicUsize,
    fail_loads: AtomicBool,
}

impl MemObjectLoader {
    /// Loader producing blocks of at most `block_max_rows` rows.
    pub fn new(block_max_rows: u32) -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            block_max_rows: block_max_rows.max(1),
            column_loads: AtomicUsize::new(0),
            fail_loads: AtomicBool::new(false),
        }
    }

    /// Store `batch` as object `id` and describe it.
    ///
    /// `pk_index` names the primary-key column used for the zone map.
    pub fn write_object(
        &self,
        id: ObjectId,
        batch: &RecordBatch,
        pk_index: usize,
    ) -> DedupResult<ObjectStats> {
        let mut zone_map = ZoneMap::new();
        zone_map.batch_update(&keys_from_batch_index(batch, pk_index)?);

        let step = self.block_max_rows as usize;
        let blocks: Vec<RecordBatch> = (0..batch.num_rows())
            .step_by(step)
            .map(|offset| batch.slice(offset, step.min(batch.num_rows() - offset)))
            .collect();
        let stats = ObjectStats::new(id, batch.num_rows() as u32, blocks.len() as u16, zone_map);
        self.objects
            .write()
            .insert(id, StoredObject { blocks, pk_index });
        Ok(stats)
    }

    /// Make every subsequent column load fail.
    pub fn fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::Relaxed);
    }

    /// Number of successful column loads so far.
    pub fn column_loads(&self) -> usize {
        self.column_loads.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ObjectLoader for MemObjectLoader {
    async fn load_column(
        &self,
        location: &BlockLocation,
        column: usize,
    ) -> Result<ArrayRef, AccessError> {
        if self.fail_loads.load(Ordering::Relaxed) {
            return Err(AccessError::Load {
                object: location.object,
                reason: "injected failure".to_string(),
            });
        }
        let objects = self.objects.read();
        let stored = objects
            .get(&location.object)
            .ok_or_else(|| AccessError::Load {
                object: location.object,
                reason: "unknown object".to_string(),
            })?;
        let block = stored
            .blocks
            .get(location.block as usize)
            .ok_or_else(|| AccessError::Corrupted {
                object: location.object,
                reason: format!("missing block {}", location.block),
            })?;
        if block.num_rows() != location.rows as usize {
            return Err(AccessError::Corrupted {
                object: location.object,
                reason: format!(
                    "block {} has {} rows, expected {}",
                    location.block,
                    block.num_rows(),
                    location.rows
                ),
            });
        }
        if column >= block.num_columns() {
            return Err(AccessError::Corrupted {
                object: location.object,
                reason: format!("column {column} out of bounds"),
            });
        }
        self.column_loads.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::clone(block.column(column)))
    }

    fn open(
        &self,
        stats: &ObjectStats,
        create: MvccNode,
    ) -> Result<Arc<dyn ObjectData>, AccessError> {
        let objects = self.objects.read();
        let stored = objects.get(&stats.id()).ok_or_else(|| AccessError::Load {
            object: stats.id(),
            reason: "unknown object".to_string(),
        })?;
        let mut keys = Vec::with_capacity(stats.rows() as usize);
        for block in &stored.blocks {
            let block_keys =
                keys_from_batch_index(block, stored.pk_index).map_err(|err| {
                    AccessError::Corrupted {
                        object: stats.id(),
                        reason: err.to_string(),
                    }
                })?;
            keys.extend(block_keys);
        }
        Ok(Arc::new(MemObject::with_keys(stats.id(), keys, create)))
    }
}
