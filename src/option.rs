/// Tuning knobs for the dedup engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    pub(crate) block_max_rows: u32,
    pub(crate) row_id_pool_capacity: usize,
    pub(crate) zone_map_pruning: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            block_max_rows: 8192,
            row_id_pool_capacity: 16,
            zone_map_pruning: true,
        }
    }
}

impl EngineOptions {
    /// Maximum rows per block when splitting a bulk-loaded object.
    pub fn block_max_rows(self, block_max_rows: u32) -> Self {
        EngineOptions {
            block_max_rows: block_max_rows.max(1),
            ..self
        }
    }

    /// Idle row-identifier buffers kept for reuse.
    pub fn row_id_pool_capacity(self, row_id_pool_capacity: usize) -> Self {
        EngineOptions {
            row_id_pool_capacity,
            ..self
        }
    }

    /// Skip objects whose zone map cannot contain any probe key.
    pub fn zone_map_pruning(self, zone_map_pruning: bool) -> Self {
        EngineOptions {
            zone_map_pruning,
            ..self
        }
    }

    /// Configured block size.
    pub fn get_block_max_rows(&self) -> u32 {
        self.block_max_rows
    }
}
