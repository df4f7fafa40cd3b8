//! Object entries: per-object metadata, MVCC nodes and the visibility predicate.

use std::{fmt, sync::Arc};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{
    error::{DedupError, DedupResult},
    id::ObjectId,
    mvcc::Timestamp,
    object::ObjectData,
    pruning::ZoneMap,
    transaction::{TxnHandle, TxnState},
};

/// Creation-order position of an object. Strictly increasing per catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SortHint(u64);

impl SortHint {
    /// Wrap a raw hint.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw hint value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SortHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Storage shape of an object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectKind {
    /// Still accepting appends; rows carry individual commit timestamps.
    Appendable,
    /// Immutable and persisted.
    Sealed,
}

/// Creation or deletion record of an object.
#[derive(Clone)]
pub enum MvccNode {
    /// Replayed or bootstrapped record whose commit is already known.
    Committed(Timestamp),
    /// Record written by a transaction; its state decides the outcome.
    Txn(Arc<TxnHandle>),
}

impl fmt::Debug for MvccNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MvccNode::Committed(ts) => f.debug_tuple("Committed").field(ts).finish(),
            MvccNode::Txn(txn) => f
                .debug_struct("Txn")
                .field("id", &txn.id())
                .field("state", &txn.state())
                .finish(),
        }
    }
}

impl MvccNode {
    /// Commit state behind the node.
    pub fn state(&self) -> TxnState {
        match self {
            MvccNode::Committed(commit_ts) => TxnState::Committed {
                commit_ts: *commit_ts,
            },
            MvccNode::Txn(txn) => txn.state(),
        }
    }

    /// Commit timestamp once committed.
    pub fn commit_ts(&self) -> Option<Timestamp> {
        self.state().commit_ts()
    }

    /// `true` while the owning transaction is active or committing.
    pub fn is_pending(&self) -> bool {
        !self.state().is_resolved()
    }

    /// `true` when the owning transaction rolled back.
    pub fn is_aborted(&self) -> bool {
        matches!(self.state(), TxnState::Aborted)
    }

    /// Transaction a reader at `ts` has to wait for, if any.
    pub fn need_wait_committing(&self, ts: Timestamp) -> Option<&Arc<TxnHandle>> {
        match self {
            MvccNode::Txn(txn) if txn.need_wait_committing(ts) => Some(txn),
            _ => None,
        }
    }

    fn committed_at_or_before(&self, ts: Timestamp) -> bool {
        self.commit_ts().is_some_and(|commit_ts| commit_ts <= ts)
    }

    fn committed_before(&self, ts: Timestamp) -> bool {
        self.commit_ts().is_some_and(|commit_ts| commit_ts < ts)
    }
}

#[derive(Clone, Debug)]
struct ObjectState {
    create: MvccNode,
    delete: Option<MvccNode>,
}

/// Catalog metadata for one stored object.
///
/// Identity, sort hint, kind, zone map and data accessor are fixed at
/// creation. Only the delete record changes, through
/// [`ObjectEntry::mark_deleted`]; readers work on [`ObjectView`] copies.
pub struct ObjectEntry {
    id: ObjectId,
    sort_hint: SortHint,
    kind: ObjectKind,
    zone_map: Option<ZoneMap>,
    data: Option<Arc<dyn ObjectData>>,
    state: RwLock<ObjectState>,
}

impl fmt::Debug for ObjectEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("ObjectEntry")
            .field("id", &self.id)
            .field("sort_hint", &self.sort_hint)
            .field("kind", &self.kind)
            .field("create", &state.create)
            .field("delete", &state.delete)
            .field("has_data", &self.data.is_some())
            .finish()
    }
}

impl ObjectEntry {
    pub(crate) fn new(
        id: ObjectId,
        sort_hint: SortHint,
        kind: ObjectKind,
        create: MvccNode,
        zone_map: Option<ZoneMap>,
        data: Option<Arc<dyn ObjectData>>,
    ) -> Self {
        Self {
            id,
            sort_hint,
            kind,
            zone_map,
            data,
            state: RwLock::new(ObjectState {
                create,
                delete: None,
            }),
        }
    }

    /// Object identity.
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Creation-order position.
    pub fn sort_hint(&self) -> SortHint {
        self.sort_hint
    }

    /// Copy of the current state.
    pub fn view(self: &Arc<Self>) -> ObjectView {
        let state = self.state.read().clone();
        ObjectView {
            entry: Arc::clone(self),
            kind: self.kind,
            create: state.create,
            delete: state.delete,
        }
    }

    /// Record a whole-object delete.
    ///
    /// Replaces a previous delete only if that one aborted.
    pub fn mark_deleted(&self, node: MvccNode) -> DedupResult<()> {
        let mut state = self.state.write();
        if state
            .delete
            .as_ref()
            .is_some_and(|existing| !existing.is_aborted())
        {
            return Err(DedupError::ObjectAlreadyDeleted { object: self.id });
        }
        state.delete = Some(node);
        Ok(())
    }
}

/// Point-in-time copy of an object's state.
#[derive(Clone, Debug)]
pub struct ObjectView {
    entry: Arc<ObjectEntry>,
    kind: ObjectKind,
    create: MvccNode,
    delete: Option<MvccNode>,
}

impl ObjectView {
    /// The entry this view was taken from.
    pub fn entry(&self) -> &Arc<ObjectEntry> {
        &self.entry
    }

    /// Object identity.
    pub fn id(&self) -> ObjectId {
        self.entry.id
    }

    /// Creation-order position.
    pub fn sort_hint(&self) -> SortHint {
        self.entry.sort_hint
    }

    /// Storage shape at the time of the view.
    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// `true` for appendable objects.
    pub fn is_appendable(&self) -> bool {
        self.kind == ObjectKind::Appendable
    }

    /// Creation record.
    pub fn create_node(&self) -> &MvccNode {
        &self.create
    }

    /// Deletion record, if a delete was ever issued.
    pub fn delete_node(&self) -> Option<&MvccNode> {
        self.delete.as_ref()
    }

    /// Commit timestamp of the creation, once committed.
    pub fn created_at(&self) -> Option<Timestamp> {
        self.create.commit_ts()
    }

    /// Commit timestamp of the deletion, once committed. `None` means "not deleted".
    pub fn deleted_at(&self) -> Option<Timestamp> {
        self.delete.as_ref().and_then(MvccNode::commit_ts)
    }

    /// `true` while the creating transaction has not resolved.
    pub fn is_creating(&self) -> bool {
        self.create.is_pending()
    }

    /// Visibility at `ts`: created at or before `ts` and not deleted at or before `ts`.
    ///
    /// Pending records count as "not committed"; callers resolve them first
    /// when the outcome matters (see [`crate::catalog::resolve_view`]).
    pub fn visible_at(&self, ts: Timestamp) -> bool {
        self.create.committed_at_or_before(ts)
            && !self
                .delete
                .as_ref()
                .is_some_and(|delete| delete.committed_at_or_before(ts))
    }

    /// `true` when the whole-object delete committed strictly before `ts`.
    pub fn delete_before(&self, ts: Timestamp) -> bool {
        self.delete
            .as_ref()
            .is_some_and(|delete| delete.committed_before(ts))
    }

    /// `true` when the creation committed strictly before `ts`.
    pub fn created_before(&self, ts: Timestamp) -> bool {
        self.create.committed_before(ts)
    }

    /// Sealed object whose creation committed.
    pub fn has_committed_persisted_data(&self) -> bool {
        self.kind == ObjectKind::Sealed && self.create.commit_ts().is_some()
    }

    /// Sort-key zone map, when the object has one.
    pub fn zone_map(&self) -> Option<&ZoneMap> {
        self.entry.zone_map.as_ref()
    }

    /// Row accessor, when the object has materialized data.
    pub fn data(&self) -> Option<&Arc<dyn ObjectData>> {
        self.entry.data.as_ref()
    }

    /// Transactions a reader at `ts` must wait for before judging this view.
    pub fn committing_txns(&self, ts: Timestamp) -> Vec<Arc<TxnHandle>> {
        self.create
            .need_wait_committing(ts)
            .into_iter()
            .chain(self.delete.as_ref().and_then(|d| d.need_wait_committing(ts)))
            .cloned()
            .collect()
    }
}
