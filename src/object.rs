//! Boundary to the storage layer: per-object duplicate probes and key-column loads.
//!
//! The engine never reads object files itself. Each catalog object carries an
//! [`ObjectData`] accessor that answers "which of these keys live in this
//! object within this timestamp range", and bulk-loaded objects are read
//! through an [`ObjectLoader`] one block at a time.

use std::{fmt, sync::Arc};

use arrow::array::ArrayRef;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    catalog::MvccNode,
    error::AccessError,
    id::ObjectId,
    key::KeyOwned,
    mvcc::{ReadView, TsRange},
    pruning::ZoneMap,
    row::RowIds,
};

/// Parameters of one duplicate probe against one object.
#[derive(Debug, Clone, Copy)]
pub struct DupRequest<'a> {
    /// Probe keys; matches are written at the same positions.
    pub keys: &'a [KeyOwned],
    /// Summary of `keys`, usable for block-level pruning inside the object.
    pub keys_zm: &'a ZoneMap,
    /// Only rows whose commit timestamp falls inside this range count.
    pub range: TsRange,
    /// Rows must be live as of this view to count as duplicates.
    pub read_view: ReadView,
    /// Fail with [`AccessError::WriteConflict`] when a probe key was written
    /// after `read_view`.
    pub check_ww: bool,
}

/// Row-level access to one object's primary keys.
#[async_trait]
pub trait ObjectData: Send + Sync + fmt::Debug {
    /// Fill `rows` with the identifiers of rows matching `req.keys`.
    ///
    /// Slots that already hold a match must be left untouched.
    async fn get_duplicated_rows(
        &self,
        req: &DupRequest<'_>,
        rows: &mut RowIds,
    ) -> Result<(), AccessError>;

    /// Approximate in-memory footprint in bytes.
    fn approx_size(&self) -> usize {
        0
    }
}

/// Descriptor of an externally written (bulk-loaded) object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectStats {
    id: ObjectId,
    rows: u32,
    block_count: u16,
    zone_map: ZoneMap,
}

impl ObjectStats {
    /// Describe object `id` holding `rows` rows split into `block_count` blocks.
    pub fn new(id: ObjectId, rows: u32, block_count: u16, zone_map: ZoneMap) -> Self {
        Self {
            id,
            rows,
            block_count,
            zone_map,
        }
    }

    /// Object identity.
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Total row count.
    pub fn rows(&self) -> u32 {
        self.rows
    }

    /// Number of blocks.
    pub fn block_count(&self) -> u16 {
        self.block_count
    }

    /// Sort-key zone map of the whole object.
    pub fn zone_map(&self) -> &ZoneMap {
        &self.zone_map
    }

    /// Split the object into block locations of at most `block_max_rows` rows.
    pub fn block_locations(&self, block_max_rows: u32) -> Vec<BlockLocation> {
        let mut remaining = self.rows;
        (0..self.block_count)
            .map(|block| {
                let rows = remaining.min(block_max_rows);
                remaining -= rows;
                BlockLocation {
                    object: self.id,
                    block,
                    rows,
                }
            })
            .collect()
    }
}

/// One block of an object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockLocation {
    /// Object the block belongs to.
    pub object: ObjectId,
    /// Block ordinal inside the object.
    pub block: u16,
    /// Rows stored in the block.
    pub rows: u32,
}

/// Reads bulk-loaded objects.
#[async_trait]
pub trait ObjectLoader: Send + Sync {
    /// Load column `column` of the block at `location`.
    async fn load_column(
        &self,
        location: &BlockLocation,
        column: usize,
    ) -> Result<ArrayRef, AccessError>;

    /// Open an accessor for the object described by `stats`.
    ///
    /// Every row of the object is treated as committed by `create`.
    fn open(&self, stats: &ObjectStats, create: MvccNode)
        -> Result<Arc<dyn ObjectData>, AccessError>;
}
