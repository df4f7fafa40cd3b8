//! Transaction-side view of a table: the duplicate-key resolution engine.
//!
//! A [`TxnTable`] pairs one catalog table with one transaction. It holds a
//! [`BaseTable`] for the data objects and one for the tombstone objects;
//! each owns its own workspace and incremental-lookup cursor.

mod base;
mod cursor;
mod lookup;

use std::sync::Arc;

pub use base::BaseTable;
pub use cursor::ResumeCursor;
use tokio_util::sync::CancellationToken;

use crate::{
    catalog::{ObjectEntry, TableEntry},
    error::DedupResult,
    key::KeyOwned,
    object::ObjectLoader,
    option::EngineOptions,
    row::RowIdPool,
    transaction::TxnHandle,
    workspace::CommandManager,
};

pub(crate) struct TableShared {
    entry: Arc<TableEntry>,
    txn: Arc<TxnHandle>,
    loader: Arc<dyn ObjectLoader>,
    options: EngineOptions,
    pool: RowIdPool,
}

/// One table as seen by one transaction.
#[derive(Debug)]
pub struct TxnTable {
    data: BaseTable,
    tombstone: BaseTable,
}

impl TxnTable {
    /// Open `entry` for `txn`, reading bulk-loaded objects through `loader`.
    pub fn new(
        entry: Arc<TableEntry>,
        txn: Arc<TxnHandle>,
        loader: Arc<dyn ObjectLoader>,
        options: EngineOptions,
    ) -> Self {
        let pool = RowIdPool::new(options.row_id_pool_capacity);
        let shared = Arc::new(TableShared {
            entry,
            txn,
            loader,
            options,
            pool,
        });
        Self {
            data: BaseTable::new(Arc::clone(&shared), false),
            tombstone: BaseTable::new(shared, true),
        }
    }

    /// Owning transaction.
    pub fn txn(&self) -> &Arc<TxnHandle> {
        &self.data.shared.txn
    }

    /// Catalog table.
    pub fn entry(&self) -> &Arc<TableEntry> {
        &self.data.shared.entry
    }

    /// Data side.
    pub fn data(&self) -> &BaseTable {
        &self.data
    }

    /// Data side, mutably.
    pub fn data_mut(&mut self) -> &mut BaseTable {
        &mut self.data
    }

    /// Tombstone side.
    pub fn tombstone(&self) -> &BaseTable {
        &self.tombstone
    }

    /// Tombstone side, mutably.
    pub fn tombstone_mut(&mut self) -> &mut BaseTable {
        &mut self.tombstone
    }

    /// Side selected by `is_tombstone`.
    pub fn base(&self, is_tombstone: bool) -> &BaseTable {
        if is_tombstone {
            &self.tombstone
        } else {
            &self.data
        }
    }

    /// Side selected by `is_tombstone`, mutably.
    pub fn base_mut(&mut self, is_tombstone: bool) -> &mut BaseTable {
        if is_tombstone {
            &mut self.tombstone
        } else {
            &mut self.data
        }
    }

    /// Dedup `keys` against the side selected by `is_tombstone`.
    pub async fn dedup(
        &self,
        keys: &[KeyOwned],
        is_tombstone: bool,
        cancel: &CancellationToken,
    ) -> DedupResult<()> {
        self.base(is_tombstone).dedup(keys, cancel).await
    }

    /// Finalize both workspaces ahead of commit.
    pub fn pre_prepare(&mut self) -> DedupResult<()> {
        self.data.pre_prepare()?;
        self.tombstone.pre_prepare()
    }

    /// Emit both workspaces' log commands.
    pub fn collect_cmd(&self, cmds: &mut CommandManager) {
        self.data.collect_cmd(cmds);
        self.tombstone.collect_cmd(cmds);
    }

    /// Materialize both workspaces as catalog objects.
    pub fn apply_commit(&mut self) -> DedupResult<Vec<Arc<ObjectEntry>>> {
        let mut created = self.data.apply_commit()?;
        created.extend(self.tombstone.apply_commit()?);
        Ok(created)
    }

    /// Release both workspaces. Idempotent.
    pub fn close(&mut self) {
        self.data.close();
        self.tombstone.close();
    }

    /// Drop pending appends on both sides. Idempotent.
    pub fn cleanup(&mut self) {
        self.data.cleanup();
        self.tombstone.cleanup();
    }
}
