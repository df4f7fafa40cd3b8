//! Transaction commit-state machine and the commit wait used by visibility checks.
//!
//! A transaction moves `Active -> Committing -> Committed` or ends `Aborted`.
//! Readers that meet an object whose creation or deletion belongs to a
//! committing transaction must learn the final outcome before deciding
//! visibility. Each [`TxnHandle`] publishes its state through a
//! `tokio::sync::watch` channel, so such a reader parks on exactly that
//! transaction instead of a table-wide lock.
//!
//! The commit timestamp is never lower than the prepare timestamp. A reader at
//! `t` facing a committing transaction prepared after `t` therefore knows the
//! commit lands after `t` and skips the wait.

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;

use crate::{
    mvcc::{CommitClock, ReadView, Timestamp},
    observability::log_debug,
};

/// Identity of a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxnId(u64);

impl TxnId {
    /// Wrap a raw identifier.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw identifier value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn-{}", self.0)
    }
}

/// Per-transaction switch for which sources primary-key dedup consults.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DedupPolicy {
    /// Check the workspace and every persisted source.
    #[default]
    Full,
    /// Trust the caller that the workspace holds no collisions.
    SkipWorkspace,
    /// Do not load bulk-loaded objects to check them against committed data.
    SkipSourcePersisted,
    /// Skip every dedup check.
    SkipAll,
}

impl DedupPolicy {
    /// Whether checks against the transaction's own workspace are skipped.
    pub fn skip_workspace(self) -> bool {
        matches!(self, DedupPolicy::SkipWorkspace | DedupPolicy::SkipAll)
    }

    /// Whether incoming persisted objects are exempt from dedup.
    pub fn skip_source_persisted(self) -> bool {
        matches!(self, DedupPolicy::SkipSourcePersisted | DedupPolicy::SkipAll)
    }
}

/// Commit state of a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxnState {
    /// Running; nothing it wrote is visible to others.
    Active,
    /// Commit in flight. It will commit at `prepare_ts` or abort.
    Committing {
        /// Timestamp assigned at prepare.
        prepare_ts: Timestamp,
    },
    /// Commit finished at `commit_ts`.
    Committed {
        /// Final commit timestamp.
        commit_ts: Timestamp,
    },
    /// Rolled back; nothing it wrote will ever be visible.
    Aborted,
}

impl TxnState {
    /// `true` once the outcome is final.
    pub fn is_resolved(&self) -> bool {
        matches!(self, TxnState::Committed { .. } | TxnState::Aborted)
    }

    /// Commit timestamp if the transaction committed.
    pub fn commit_ts(&self) -> Option<Timestamp> {
        match self {
            TxnState::Committed { commit_ts } => Some(*commit_ts),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            TxnState::Active => "active",
            TxnState::Committing { .. } => "committing",
            TxnState::Committed { .. } => "committed",
            TxnState::Aborted => "aborted",
        }
    }
}

/// Errors raised by the transaction state machine.
#[derive(Debug, Error)]
pub enum TxnError {
    /// A state change that the commit protocol does not allow.
    #[error("{txn}: cannot move from {from} to {to}")]
    InvalidTransition {
        /// Transaction being changed.
        txn: TxnId,
        /// Current state.
        from: &'static str,
        /// Requested state.
        to: &'static str,
    },
    /// The state channel closed while a reader was waiting.
    #[error("{txn}: state channel closed")]
    Closed {
        /// Transaction waited on.
        txn: TxnId,
    },
}

/// Shared handle to one transaction.
pub struct TxnHandle {
    id: TxnId,
    start_ts: Timestamp,
    policy: DedupPolicy,
    state: watch::Sender<TxnState>,
}

impl fmt::Debug for TxnHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxnHandle")
            .field("id", &self.id)
            .field("start_ts", &self.start_ts)
            .field("policy", &self.policy)
            .field("state", &self.state())
            .finish()
    }
}

impl TxnHandle {
    /// Create an active transaction reading at `start_ts`.
    pub fn new(id: TxnId, start_ts: Timestamp, policy: DedupPolicy) -> Arc<Self> {
        let (state, _) = watch::channel(TxnState::Active);
        Arc::new(Self {
            id,
            start_ts,
            policy,
            state,
        })
    }

    /// Transaction identity.
    pub fn id(&self) -> TxnId {
        self.id
    }

    /// Snapshot timestamp the transaction reads at.
    pub fn snapshot_ts(&self) -> Timestamp {
        self.start_ts
    }

    /// Read view pinned at the snapshot timestamp.
    pub fn read_view(&self) -> ReadView {
        ReadView::new(self.start_ts)
    }

    /// Dedup policy configured for this transaction.
    pub fn dedup_policy(&self) -> DedupPolicy {
        self.policy
    }

    /// Current commit state.
    pub fn state(&self) -> TxnState {
        *self.state.borrow()
    }

    /// Whether a reader at `ts` has to wait for this transaction's outcome.
    pub fn need_wait_committing(&self, ts: Timestamp) -> bool {
        match self.state() {
            TxnState::Committing { prepare_ts } => prepare_ts <= ts,
            _ => false,
        }
    }

    /// Enter the committing state with `prepare_ts`.
    pub fn prepare(&self, prepare_ts: Timestamp) -> Result<(), TxnError> {
        self.transition("committing", |state| match state {
            TxnState::Active => Ok(TxnState::Committing { prepare_ts }),
            _ => Err(()),
        })
    }

    /// Finish the commit.
    ///
    /// The commit timestamp is the prepare timestamp, so commit order always
    /// matches the order in which [`TxnManager`] handed out prepare
    /// timestamps and registered the transaction's objects.
    pub fn commit(&self) -> Result<(), TxnError> {
        self.transition("committed", |state| match state {
            TxnState::Committing { prepare_ts } => Ok(TxnState::Committed {
                commit_ts: *prepare_ts,
            }),
            _ => Err(()),
        })
    }

    /// Roll the transaction back.
    pub fn abort(&self) -> Result<(), TxnError> {
        self.transition("aborted", |state| match state {
            TxnState::Active | TxnState::Committing { .. } => Ok(TxnState::Aborted),
            _ => Err(()),
        })
    }

    /// Park until the transaction is committed or aborted and return the outcome.
    pub async fn wait_resolved(&self) -> Result<TxnState, TxnError> {
        let mut rx = self.state.subscribe();
        let state = rx
            .wait_for(TxnState::is_resolved)
            .await
            .map_err(|_| TxnError::Closed { txn: self.id })?;
        Ok(*state)
    }

    fn invalid(&self, from: TxnState, to: &'static str) -> TxnError {
        TxnError::InvalidTransition {
            txn: self.id,
            from: from.name(),
            to,
        }
    }

    fn transition(
        &self,
        to: &'static str,
        next: impl FnOnce(&TxnState) -> Result<TxnState, ()>,
    ) -> Result<(), TxnError> {
        let mut result = Ok(());
        self.state.send_if_modified(|state| match next(state) {
            Ok(next) => {
                *state = next;
                true
            }
            Err(()) => {
                result = Err(self.invalid(*state, to));
                false
            }
        });
        if result.is_ok() {
            log_debug!(
                component = "txn",
                event = "txn_state_changed",
                txn = %self.id,
                state = to,
            );
        }
        result
    }
}

/// Hands out transaction ids, snapshot timestamps and prepare timestamps.
#[derive(Debug)]
pub struct TxnManager {
    clock: Mutex<CommitClock>,
    next_id: AtomicU64,
    default_policy: DedupPolicy,
}

impl TxnManager {
    /// Manager whose first commit lands at timestamp 1.
    pub fn new() -> Self {
        Self::with_clock(CommitClock::default())
    }

    /// Manager resuming from an existing clock, e.g. after recovery.
    pub fn with_clock(clock: CommitClock) -> Self {
        Self {
            clock: Mutex::new(clock),
            next_id: AtomicU64::new(1),
            default_policy: DedupPolicy::default(),
        }
    }

    /// Set the dedup policy handed to transactions started with [`TxnManager::begin`].
    pub fn with_default_policy(mut self, policy: DedupPolicy) -> Self {
        self.default_policy = policy;
        self
    }

    /// Start a transaction that sees everything prepared so far.
    pub fn begin(&self) -> Arc<TxnHandle> {
        self.begin_with_policy(self.default_policy)
    }

    /// Start a transaction with an explicit dedup policy.
    pub fn begin_with_policy(&self, policy: DedupPolicy) -> Arc<TxnHandle> {
        let id = TxnId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let snapshot = Timestamp::new(self.clock.lock().peek().get().saturating_sub(1));
        TxnHandle::new(id, snapshot, policy)
    }

    /// Allocate a prepare timestamp and move `txn` to committing.
    pub fn prepare(&self, txn: &TxnHandle) -> Result<Timestamp, TxnError> {
        self.prepare_with(txn, |_| Ok::<_, TxnError>(()))
            .map(|(prepare_ts, ())| prepare_ts)
    }

    /// Prepare `txn` and run `apply` before any later transaction can prepare.
    ///
    /// Catalog objects registered inside `apply` get sort hints in prepare
    /// order, which is also commit order. The incremental lookup relies on
    /// that to stop at the first appendable object created before its range.
    /// Readers that begin afterwards already find the objects, in the
    /// committing state. If `apply` fails the transaction stays committing;
    /// the caller aborts it.
    pub fn prepare_with<R, E>(
        &self,
        txn: &TxnHandle,
        apply: impl FnOnce(Timestamp) -> Result<R, E>,
    ) -> Result<(Timestamp, R), E>
    where
        E: From<TxnError>,
    {
        let mut clock = self.clock.lock();
        let prepare_ts = clock.tick();
        txn.prepare(prepare_ts)?;
        let applied = apply(prepare_ts)?;
        Ok((prepare_ts, applied))
    }

    /// Prepare and commit `txn` in one step.
    pub fn commit(&self, txn: &TxnHandle) -> Result<Timestamp, TxnError> {
        let ts = match txn.state() {
            TxnState::Committing { prepare_ts } => prepare_ts,
            _ => self.prepare(txn)?,
        };
        txn.commit()?;
        Ok(ts)
    }

    /// Timestamp the next prepare will receive.
    pub fn peek(&self) -> Timestamp {
        self.clock.lock().peek()
    }
}

impl Default for TxnManager {
    fn default() -> Self {
        Self::new()
    }
}
