//! Lazy, restartable walks over a table's objects in sort-hint order.

use std::{ops::Bound, sync::Arc};

use crossbeam_skiplist::SkipMap;
use tokio_util::sync::CancellationToken;

use super::entry::{ObjectEntry, ObjectView, SortHint};
use crate::{
    error::{DedupError, DedupResult},
    mvcc::Timestamp,
    observability::log_debug,
    transaction::TxnId,
};

pub(crate) type ObjectList = SkipMap<SortHint, Arc<ObjectEntry>>;

/// Walk direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IterOrder {
    /// Oldest object first.
    Creation,
    /// Newest object first.
    ReverseCreation,
}

/// Cursor over a table's objects.
///
/// The iterator remembers the last sort hint it yielded and seeks from there
/// on every step, so objects created while a walk is in progress never
/// disturb it. [`ObjectIter::restart`] rewinds to the first position.
pub struct ObjectIter {
    objects: Arc<ObjectList>,
    order: IterOrder,
    cursor: Option<SortHint>,
}

impl ObjectIter {
    pub(crate) fn new(objects: Arc<ObjectList>, order: IterOrder) -> Self {
        Self {
            objects,
            order,
            cursor: None,
        }
    }

    /// Direction of the walk.
    pub fn order(&self) -> IterOrder {
        self.order
    }

    /// Rewind to the first position.
    pub fn restart(&mut self) {
        self.cursor = None;
    }
}

impl Iterator for ObjectIter {
    type Item = Arc<ObjectEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = match (self.order, self.cursor) {
            (IterOrder::Creation, None) => self.objects.front(),
            (IterOrder::Creation, Some(last)) => self
                .objects
                .range((Bound::Excluded(last), Bound::Unbounded))
                .next(),
            (IterOrder::ReverseCreation, None) => self.objects.back(),
            (IterOrder::ReverseCreation, Some(last)) => self.objects.range(..last).next_back(),
        }?;
        self.cursor = Some(*entry.key());
        Some(Arc::clone(entry.value()))
    }
}

/// Take a view of `entry` that is final with respect to a reader at `ts`.
///
/// While the object's creation or deletion belongs to a transaction that is
/// committing with a prepare timestamp at or before `ts`, park until that
/// transaction resolves and take a fresh view. Transactions prepared after
/// `ts` will commit after `ts` and are not waited on, and neither is the
/// reader's own transaction (`reader`). No lock is held while parked.
pub async fn resolve_view(
    entry: &Arc<ObjectEntry>,
    ts: Timestamp,
    reader: Option<TxnId>,
    cancel: &CancellationToken,
) -> DedupResult<ObjectView> {
    loop {
        let view = entry.view();
        let pending: Vec<_> = view
            .committing_txns(ts)
            .into_iter()
            .filter(|txn| Some(txn.id()) != reader)
            .collect();
        if pending.is_empty() {
            return Ok(view);
        }
        for txn in pending {
            log_debug!(
                component = "catalog",
                event = "commit_wait",
                object = %view.id(),
                txn = %txn.id(),
                read_ts = %ts,
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DedupError::Cancelled),
                outcome = txn.wait_resolved() => {
                    outcome?;
                }
            }
        }
    }
}

/// Objects visible at a fixed timestamp, in the order of the underlying walk.
pub struct SnapshotObjectIter {
    inner: ObjectIter,
    read_ts: Timestamp,
    reader: Option<TxnId>,
}

impl SnapshotObjectIter {
    pub(crate) fn new(inner: ObjectIter, read_ts: Timestamp) -> Self {
        Self {
            inner,
            read_ts,
            reader: None,
        }
    }

    /// Never park on `txn`; its own pending records read as not committed.
    pub fn with_reader(mut self, txn: TxnId) -> Self {
        self.reader = Some(txn);
        self
    }

    /// Timestamp visibility is judged at.
    pub fn read_ts(&self) -> Timestamp {
        self.read_ts
    }

    /// Rewind to the first position.
    pub fn restart(&mut self) {
        self.inner.restart();
    }

    /// Next visible object, resolving in-flight commits first.
    pub async fn next_visible(
        &mut self,
        cancel: &CancellationToken,
    ) -> DedupResult<Option<ObjectView>> {
        loop {
            if cancel.is_cancelled() {
                return Err(DedupError::Cancelled);
            }
            let Some(entry) = self.inner.next() else {
                return Ok(None);
            };
            let view = resolve_view(&entry, self.read_ts, self.reader, cancel).await?;
            if view.visible_at(self.read_ts) {
                return Ok(Some(view));
            }
        }
    }
}
