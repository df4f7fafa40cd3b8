//! Test-only fixtures: Arrow batch builders and a catalog with one keyed table.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use arrow::{
    array::{Int64Array, StringArray},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use tokio_util::sync::CancellationToken;

use crate::{
    catalog::{Catalog, MvccNode, ObjectEntry, ObjectKind, ObjectSpec, TableEntry, TableSchema},
    inmem::{MemObject, MemObjectLoader},
    key::KeyOwned,
    mvcc::Timestamp,
    object::{ObjectLoader, ObjectStats},
    option::EngineOptions,
    table::TxnTable,
    transaction::{DedupPolicy, TxnHandle, TxnId, TxnManager},
};

/// Route this crate's log events to the test harness; filter with `RUST_LOG`.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub(crate) fn ts(raw: u64) -> Timestamp {
    Timestamp::new(raw)
}

pub(crate) fn int_keys(raw: &[i64]) -> Vec<KeyOwned> {
    raw.iter().copied().map(KeyOwned::from).collect()
}

/// Batch with an `id: Int64` primary key and a `v: Utf8` payload.
pub(crate) fn pk_batch(ids: &[i64]) -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("v", DataType::Utf8, true),
    ]));
    let payload: Vec<String> = ids.iter().map(|id| format!("v{id}")).collect();
    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int64Array::from(ids.to_vec())),
            Arc::new(StringArray::from(payload)),
        ],
    )
    .expect("valid batch")
}

pub(crate) struct Fixture {
    pub(crate) catalog: Catalog,
    pub(crate) table: Arc<TableEntry>,
    pub(crate) txns: TxnManager,
    pub(crate) loader: Arc<MemObjectLoader>,
    pub(crate) options: EngineOptions,
    next_txn: AtomicU64,
}

impl Fixture {
    /// Table `t` keyed by `id`, with two-row blocks.
    pub(crate) fn new() -> Self {
        Self::with_schema(TableSchema::new("t").with_primary_key("id", 0))
    }

    pub(crate) fn with_schema(schema: TableSchema) -> Self {
        let catalog = Catalog::new();
        let table = catalog.create_table(schema);
        Self {
            catalog,
            table,
            txns: TxnManager::new(),
            loader: Arc::new(MemObjectLoader::new(2)),
            options: EngineOptions::default().block_max_rows(2),
            next_txn: AtomicU64::new(1_000),
        }
    }

    pub(crate) fn begin(&self) -> Arc<TxnHandle> {
        self.txns.begin()
    }

    pub(crate) fn begin_with(&self, policy: DedupPolicy) -> Arc<TxnHandle> {
        self.txns.begin_with_policy(policy)
    }

    /// Transaction reading at an explicit snapshot, outside the manager's clock.
    pub(crate) fn txn_at(&self, snapshot: u64) -> Arc<TxnHandle> {
        let id = TxnId::new(self.next_txn.fetch_add(1, Ordering::Relaxed));
        TxnHandle::new(id, ts(snapshot), DedupPolicy::Full)
    }

    pub(crate) fn txn_table(&self, txn: Arc<TxnHandle>) -> TxnTable {
        let loader: Arc<dyn ObjectLoader> = Arc::clone(&self.loader) as Arc<dyn ObjectLoader>;
        TxnTable::new(Arc::clone(&self.table), txn, loader, self.options.clone())
    }

    /// Bulk-write an object holding `ids` and return its descriptor.
    pub(crate) fn write_object(&self, ids: &[i64]) -> ObjectStats {
        self.loader
            .write_object(self.catalog.generate_object_id(), &pk_batch(ids), 0)
            .expect("write object")
    }

    /// Register an object whose rows all carry `create`.
    pub(crate) fn object(
        &self,
        kind: ObjectKind,
        ids: &[i64],
        create: MvccNode,
    ) -> Arc<ObjectEntry> {
        let id = self.catalog.generate_object_id();
        let data = MemObject::with_keys(id, int_keys(ids), create.clone());
        let spec = ObjectSpec::new(kind, create)
            .with_id(id)
            .with_zone_map(data.zone_map())
            .with_data(Arc::new(data));
        self.table.create_object(false, spec).expect("create object")
    }

    pub(crate) fn committed(&self, kind: ObjectKind, ids: &[i64], at: u64) -> Arc<ObjectEntry> {
        self.object(kind, ids, MvccNode::Committed(ts(at)))
    }

    /// Appendable object whose rows commit one at a time, `(key, commit_ts)`.
    pub(crate) fn appendable(&self, rows: &[(i64, u64)], created_at: u64) -> Arc<ObjectEntry> {
        let id = self.catalog.generate_object_id();
        let data = MemObject::new(id);
        for &(key, at) in rows {
            data.append(KeyOwned::from(key), MvccNode::Committed(ts(at)));
        }
        let spec = ObjectSpec::new(ObjectKind::Appendable, MvccNode::Committed(ts(created_at)))
            .with_id(id)
            .with_zone_map(data.zone_map())
            .with_data(Arc::new(data));
        self.table.create_object(false, spec).expect("create object")
    }

    /// Run a whole write transaction appending `ids` through the manager's clock.
    pub(crate) async fn commit_rows(&self, ids: &[i64]) -> Arc<TxnHandle> {
        let txn = self.begin();
        let mut table = self.txn_table(Arc::clone(&txn));
        table
            .dedup(&int_keys(ids), false, &CancellationToken::new())
            .await
            .expect("dedup");
        table.data_mut().append(pk_batch(ids)).expect("append");
        table.pre_prepare().expect("pre-prepare");
        self.txns
            .prepare_with(&txn, |_| table.apply_commit())
            .expect("prepare");
        txn.commit().expect("commit");
        table.close();
        txn
    }
}
