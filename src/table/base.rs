use std::{collections::HashSet, sync::Arc};

use arrow::record_batch::RecordBatch;
use tokio_util::sync::CancellationToken;

use super::{cursor::ResumeCursor, TableShared};
use crate::{
    catalog::ObjectEntry,
    error::{DedupError, DedupResult},
    extractor::{keys_from_array, keys_from_batch},
    key::KeyOwned,
    object::ObjectStats,
    observability::{log_debug, log_info},
    row::RowIds,
    workspace::{CommandManager, TableSpace},
};

/// One object list (data or tombstones) of a table as seen by one transaction.
///
/// Pairs the catalog's objects with the transaction's lazily created
/// workspace and owns the resume cursor of the incremental lookup. Every
/// method that moves the cursor takes `&mut self`, so a table has at most
/// one incremental driver at a time.
pub struct BaseTable {
    pub(super) shared: Arc<TableShared>,
    pub(super) is_tombstone: bool,
    pub(super) space: Option<TableSpace>,
    pub(super) cursor: ResumeCursor,
}

impl std::fmt::Debug for BaseTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseTable")
            .field("table", &self.shared.entry.schema().name())
            .field("tombstone", &self.is_tombstone)
            .field("txn", &self.shared.txn.id())
            .field("space", &self.space)
            .field("cursor", &self.cursor)
            .finish()
    }
}

impl BaseTable {
    pub(super) fn new(shared: Arc<TableShared>, is_tombstone: bool) -> Self {
        Self {
            shared,
            is_tombstone,
            space: None,
            cursor: ResumeCursor::new(),
        }
    }

    /// Whether this is the tombstone side of the table.
    pub fn is_tombstone(&self) -> bool {
        self.is_tombstone
    }

    /// Resume cursor of the incremental lookup.
    pub fn cursor(&self) -> ResumeCursor {
        self.cursor
    }

    /// The workspace, if anything was written yet.
    pub fn table_space(&self) -> Option<&TableSpace> {
        self.space.as_ref()
    }

    /// Hand a lookup result back for reuse.
    pub fn recycle(&self, rows: RowIds) {
        self.shared.pool.put(rows);
    }

    fn space_mut(&mut self) -> &mut TableSpace {
        let shared = &self.shared;
        let is_tombstone = self.is_tombstone;
        self.space.get_or_insert_with(|| {
            log_debug!(
                component = "workspace",
                event = "table_space_created",
                table = shared.entry.schema().name(),
                txn = %shared.txn.id(),
                tombstone = is_tombstone,
            );
            TableSpace::new(
                shared.entry.schema().name(),
                is_tombstone,
                Arc::clone(&shared.txn),
            )
        })
    }

    fn pk_keys(&self, batch: &RecordBatch) -> DedupResult<Option<Vec<KeyOwned>>> {
        match self.shared.entry.schema().primary_key() {
            Some(pk) => Ok(Some(keys_from_batch(batch, &pk.name)?)),
            None => Ok(None),
        }
    }

    /// Fail on the first key already buffered or registered in the workspace.
    ///
    /// No-op before the workspace exists.
    pub fn dedup_workspace(&self, keys: &[KeyOwned]) -> DedupResult<()> {
        match &self.space {
            Some(space) => space.batch_dedup(keys),
            None => Ok(()),
        }
    }

    /// [`BaseTable::dedup_workspace`] over the primary-key column of `batch`.
    ///
    /// No-op when the table has no primary key or no workspace exists yet.
    pub fn batch_dedup_local(&self, batch: &RecordBatch) -> DedupResult<()> {
        if self.space.is_none() {
            return Ok(());
        }
        match self.pk_keys(batch)? {
            Some(keys) => self.dedup_workspace(&keys),
            None => Ok(()),
        }
    }

    /// Buffer `batch` in the workspace after checking its keys locally.
    pub fn append(&mut self, batch: RecordBatch) -> DedupResult<()> {
        let keys = self.pk_keys(&batch)?.unwrap_or_default();
        check_unique(&keys)?;
        self.dedup_workspace(&keys)?;
        self.space_mut().append(batch, keys)
    }

    /// Approximate bytes held by the workspace.
    pub fn approx_size(&self) -> usize {
        self.space.as_ref().map_or(0, TableSpace::approx_size)
    }

    /// Register a bulk-loaded object with the workspace.
    ///
    /// Unless the table has no primary key, backs a secondary index, or the
    /// transaction skips persisted sources, the object's primary-key column
    /// is loaded block by block and every block is deduplicated before the
    /// object is registered. Registering an object twice is a no-op.
    pub async fn add_objects(
        &mut self,
        stats: ObjectStats,
        cancel: &CancellationToken,
    ) -> DedupResult<()> {
        if self
            .space
            .as_ref()
            .is_some_and(|space| space.is_stats_existed(stats.id()))
        {
            log_debug!(
                component = "workspace",
                event = "object_already_registered",
                object = %stats.id(),
            );
            return Ok(());
        }
        if self.shared.entry.contains_object(stats.id()) {
            return Err(DedupError::DuplicateObject { object: stats.id() });
        }
        let locations = stats.block_locations(self.shared.options.block_max_rows);
        let schema = self.shared.entry.schema();
        let mut keys = Vec::new();
        if let Some(pk) = schema.primary_key() {
            if !schema.is_secondary_index_table()
                && !self.shared.txn.dedup_policy().skip_source_persisted()
            {
                for location in &locations {
                    if cancel.is_cancelled() {
                        return Err(DedupError::Cancelled);
                    }
                    let column = self.shared.loader.load_column(location, pk.index).await?;
                    let block_keys = keys_from_array(&column)?;
                    self.dedup(&block_keys, cancel).await?;
                    keys.extend(block_keys);
                }
                check_unique(&keys)?;
            }
        }
        let (object, rows, blocks) = (stats.id(), stats.rows(), locations.len());
        self.space_mut().add_data_files(stats, keys)?;
        log_info!(
            component = "workspace",
            event = "object_registered",
            object = %object,
            rows = rows,
            blocks = blocks,
            tombstone = self.is_tombstone,
        );
        Ok(())
    }

    /// Finalize the workspace's append buffer ahead of commit.
    pub fn pre_prepare(&mut self) -> DedupResult<()> {
        match &mut self.space {
            Some(space) => space.prepare_apply(),
            None => Ok(()),
        }
    }

    /// Emit the workspace's log commands into `cmds`.
    pub fn collect_cmd(&self, cmds: &mut CommandManager) {
        if let Some(space) = &self.space {
            space.collect_cmd(cmds);
        }
    }

    /// Materialize the workspace as catalog objects created by the owning
    /// transaction.
    pub fn apply_commit(&mut self) -> DedupResult<Vec<Arc<ObjectEntry>>> {
        let shared = Arc::clone(&self.shared);
        match &mut self.space {
            Some(space) => space.apply(&shared.entry, shared.loader.as_ref()),
            None => Ok(Vec::new()),
        }
    }

    /// Release the workspace. Idempotent.
    pub fn close(&mut self) {
        if let Some(mut space) = self.space.take() {
            space.close();
        }
    }

    /// Drop pending appends. Idempotent.
    pub fn cleanup(&mut self) {
        if let Some(space) = &mut self.space {
            space.close_appends();
        }
    }
}

/// Fail on the first key that appears twice in `keys`.
pub(super) fn check_unique(keys: &[KeyOwned]) -> DedupResult<()> {
    let mut seen = HashSet::with_capacity(keys.len());
    match keys.iter().find(|key| !seen.insert(*key)) {
        Some(key) => Err(DedupError::DuplicateKey { key: key.clone() }),
        None => Ok(()),
    }
}
