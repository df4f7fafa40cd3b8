//! Per-transaction, per-table workspace.
//!
//! A [`TableSpace`] buffers the rows a transaction appends and the
//! bulk-loaded objects it registers, keeps a key index over both for local
//! dedup, and turns its contents into log commands and catalog objects when
//! the transaction commits.

mod command;

use std::{collections::HashMap, sync::Arc};

use arrow::record_batch::RecordBatch;

pub use command::{CommandManager, TxnCommand};

use crate::{
    catalog::{MvccNode, ObjectEntry, ObjectKind, ObjectSpec, TableEntry},
    error::{DedupError, DedupResult},
    id::ObjectId,
    inmem::MemObject,
    key::KeyOwned,
    object::{ObjectLoader, ObjectStats},
    observability::{log_debug, log_info},
    pruning::ZoneMap,
    transaction::{TxnHandle, TxnState},
};

// Bookkeeping per indexed key on top of its heap bytes.
const INDEX_ENTRY_OVERHEAD: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Appended,
    Loaded,
}

/// Uncommitted writes of one transaction against one table.
pub struct TableSpace {
    table: String,
    is_tombstone: bool,
    txn: Arc<TxnHandle>,
    batches: Vec<RecordBatch>,
    appended_rows: u32,
    appended_keys: Vec<KeyOwned>,
    data_files: Vec<ObjectStats>,
    index: HashMap<KeyOwned, Slot>,
    prepared: Option<ZoneMap>,
    applied: bool,
    closed: bool,
    approx_bytes: usize,
}

impl std::fmt::Debug for TableSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableSpace")
            .field("table", &self.table)
            .field("tombstone", &self.is_tombstone)
            .field("txn", &self.txn.id())
            .field("appended_rows", &self.appended_rows)
            .field("data_files", &self.data_files.len())
            .field("prepared", &self.prepared.is_some())
            .field("closed", &self.closed)
            .finish()
    }
}

impl TableSpace {
    pub(crate) fn new(table: impl Into<String>, is_tombstone: bool, txn: Arc<TxnHandle>) -> Self {
        Self {
            table: table.into(),
            is_tombstone,
            txn,
            batches: Vec::new(),
            appended_rows: 0,
            appended_keys: Vec::new(),
            data_files: Vec::new(),
            index: HashMap::new(),
            prepared: None,
            applied: false,
            closed: false,
            approx_bytes: 0,
        }
    }

    /// Owning transaction.
    pub fn txn(&self) -> &Arc<TxnHandle> {
        &self.txn
    }

    /// Rows appended so far.
    pub fn appended_rows(&self) -> u32 {
        self.appended_rows
    }

    /// Registered bulk-loaded objects.
    pub fn data_files(&self) -> &[ObjectStats] {
        &self.data_files
    }

    /// `true` once [`TableSpace::close`] ran.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Approximate bytes held by buffered rows and the key index.
    pub fn approx_size(&self) -> usize {
        self.approx_bytes
    }

    /// Fail with [`DedupError::DuplicateKey`] on the first key already buffered
    /// or registered in this workspace.
    pub fn batch_dedup(&self, keys: &[KeyOwned]) -> DedupResult<()> {
        match keys.iter().find(|key| self.index.contains_key(*key)) {
            Some(key) => Err(DedupError::DuplicateKey { key: key.clone() }),
            None => Ok(()),
        }
    }

    /// Whether an object with this identity is already registered.
    pub fn is_stats_existed(&self, id: ObjectId) -> bool {
        self.data_files.iter().any(|stats| stats.id() == id)
    }

    fn ensure_writable(&self) -> DedupResult<()> {
        if self.closed || self.prepared.is_some() {
            return Err(DedupError::WorkspaceClosed {
                table: self.table.clone(),
            });
        }
        Ok(())
    }

    fn index_keys(&mut self, keys: &[KeyOwned], slot: Slot) {
        for key in keys {
            self.approx_bytes += key.heap_size() + INDEX_ENTRY_OVERHEAD;
            self.index.insert(key.clone(), slot);
        }
    }

    /// Buffer `batch`, whose primary keys are `keys` (empty without a primary key).
    pub fn append(&mut self, batch: RecordBatch, keys: Vec<KeyOwned>) -> DedupResult<()> {
        self.ensure_writable()?;
        self.batch_dedup(&keys)?;
        self.index_keys(&keys, Slot::Appended);
        self.appended_rows += batch.num_rows() as u32;
        self.approx_bytes += batch.get_array_memory_size();
        self.appended_keys.extend(keys);
        self.batches.push(batch);
        Ok(())
    }

    /// Register a bulk-loaded object whose primary keys are `keys`.
    ///
    /// `keys` have already been deduplicated by the caller and are empty
    /// when dedup of the object was skipped. Registering the same object
    /// twice is a no-op.
    pub fn add_data_files(&mut self, stats: ObjectStats, keys: Vec<KeyOwned>) -> DedupResult<()> {
        if self.is_stats_existed(stats.id()) {
            return Ok(());
        }
        self.ensure_writable()?;
        let id = stats.id();
        self.index_keys(&keys, Slot::Loaded);
        log_debug!(
            component = "workspace",
            event = "data_file_added",
            table = %self.table,
            object = %id,
            rows = stats.rows(),
        );
        self.data_files.push(stats);
        Ok(())
    }

    /// Finalize the append buffer. Later calls are no-ops.
    pub fn prepare_apply(&mut self) -> DedupResult<()> {
        if self.prepared.is_some() {
            return Ok(());
        }
        if self.closed {
            return Err(DedupError::WorkspaceClosed {
                table: self.table.clone(),
            });
        }
        self.prepared = Some(ZoneMap::from_keys(&self.appended_keys));
        log_debug!(
            component = "workspace",
            event = "prepared",
            table = %self.table,
            txn = %self.txn.id(),
            rows = self.appended_rows,
            data_files = self.data_files.len(),
        );
        Ok(())
    }

    /// Emit the log commands describing this workspace.
    pub fn collect_cmd(&self, cmds: &mut CommandManager) {
        if self.appended_rows > 0 {
            let zone_map = self
                .prepared
                .clone()
                .unwrap_or_else(|| ZoneMap::from_keys(&self.appended_keys));
            cmds.add(TxnCommand::Append {
                table: self.table.clone(),
                tombstone: self.is_tombstone,
                rows: self.appended_rows,
                zone_map,
            });
        }
        if !self.data_files.is_empty() {
            cmds.add(TxnCommand::AddObjects {
                table: self.table.clone(),
                tombstone: self.is_tombstone,
                objects: self.data_files.clone(),
            });
        }
    }

    /// Turn the workspace into catalog objects created by the owning
    /// transaction; they become visible when it commits.
    ///
    /// Buffered rows land in one appendable object and every registered
    /// bulk-loaded object becomes a sealed object with the same identity.
    /// Applying twice registers nothing the second time.
    ///
    /// The transaction must be committing, and the call belongs inside
    /// [`crate::transaction::TxnManager::prepare_with`] so sort hints follow
    /// prepare order. On error the transaction has to be aborted; objects
    /// registered before the failure stay invisible.
    pub fn apply(
        &mut self,
        table: &TableEntry,
        loader: &dyn ObjectLoader,
    ) -> DedupResult<Vec<Arc<ObjectEntry>>> {
        if self.applied {
            return Ok(Vec::new());
        }
        if !matches!(self.txn.state(), TxnState::Committing { .. }) {
            return Err(DedupError::NotCommitting {
                txn: self.txn.id(),
            });
        }
        self.prepare_apply()?;
        let create = MvccNode::Txn(Arc::clone(&self.txn));
        let mut created = Vec::with_capacity(self.data_files.len() + 1);

        if self.appended_rows > 0 {
            let id = table.generate_object_id();
            let mut spec = ObjectSpec::new(ObjectKind::Appendable, create.clone()).with_id(id);
            if !self.appended_keys.is_empty() {
                let object = MemObject::with_keys(id, self.appended_keys.clone(), create.clone());
                spec = spec.with_zone_map(object.zone_map()).with_data(Arc::new(object));
            }
            created.push(table.create_object(self.is_tombstone, spec)?);
        }
        for stats in &self.data_files {
            let data = loader.open(stats, create.clone())?;
            let spec = ObjectSpec::new(ObjectKind::Sealed, create.clone())
                .with_id(stats.id())
                .with_zone_map(stats.zone_map().clone())
                .with_data(data);
            created.push(table.create_object(self.is_tombstone, spec)?);
        }
        self.applied = true;
        log_info!(
            component = "workspace",
            event = "workspace_applied",
            table = %self.table,
            txn = %self.txn.id(),
            objects = created.len(),
        );
        Ok(created)
    }

    /// Drop buffered rows and their index entries. Idempotent.
    pub fn close_appends(&mut self) {
        if self.batches.is_empty() && self.appended_keys.is_empty() {
            return;
        }
        self.index.retain(|_, slot| *slot == Slot::Loaded);
        self.batches.clear();
        self.appended_keys.clear();
        self.appended_rows = 0;
        self.approx_bytes = self
            .index
            .keys()
            .map(|key| key.heap_size() + INDEX_ENTRY_OVERHEAD)
            .sum();
    }

    /// Release everything the workspace holds. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.close_appends();
        self.index.clear();
        self.data_files.clear();
        self.approx_bytes = 0;
        self.closed = true;
    }
}
