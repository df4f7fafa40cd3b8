//! Duplicate lookups against committed and committing objects.

use tokio_util::sync::CancellationToken;

use super::{base::check_unique, BaseTable};
use crate::{
    catalog::{resolve_view, IterOrder, ObjectView, SortHint},
    error::{DedupError, DedupResult},
    key::KeyOwned,
    mvcc::{ReadView, Timestamp, TsRange},
    object::DupRequest,
    observability::{log_debug, log_error},
    pruning::{quick_skip, ZoneMap},
    row::RowIds,
    transaction::DedupPolicy,
};

#[derive(Debug, Default)]
struct ScanStats {
    visited: usize,
    pruned: usize,
    scanned: usize,
}

impl BaseTable {
    fn prunable(&self, view: &ObjectView, keys_zm: &ZoneMap) -> bool {
        self.shared.options.zone_map_pruning
            && view.has_committed_persisted_data()
            && quick_skip(keys_zm, view.zone_map())
    }

    /// Match `keys` against every row visible to the transaction's snapshot.
    ///
    /// The result is aligned with `keys`; unmatched positions stay empty.
    /// With `check_ww`, a probe key rewritten after the snapshot fails the
    /// lookup with a write-write conflict. Any error aborts the whole lookup.
    pub async fn lookup_duplicates(
        &self,
        keys: &[KeyOwned],
        check_ww: bool,
        cancel: &CancellationToken,
    ) -> DedupResult<RowIds> {
        let mut rows = self.shared.pool.get(keys.len());
        match self.full_scan(keys, check_ww, &mut rows, cancel).await {
            Ok(()) => Ok(rows),
            Err(err) => Err(self.abort_scan(rows, err)),
        }
    }

    fn abort_scan(&self, rows: RowIds, err: DedupError) -> DedupError {
        self.recycle(rows);
        match &err {
            DedupError::Access(source) => log_error!(
                component = "lookup",
                event = "object_access_failed",
                txn = %self.shared.txn.id(),
                tombstone = self.is_tombstone,
                error = %source,
            ),
            DedupError::WriteConflict { object, key } => log_debug!(
                component = "lookup",
                event = "write_conflict",
                txn = %self.shared.txn.id(),
                object = %object,
                key = %key,
            ),
            _ => {}
        }
        err
    }

    async fn full_scan(
        &self,
        keys: &[KeyOwned],
        check_ww: bool,
        rows: &mut RowIds,
        cancel: &CancellationToken,
    ) -> DedupResult<()> {
        let keys_zm = ZoneMap::from_keys(keys);
        let txn = &self.shared.txn;
        let snapshot = txn.snapshot_ts();
        let req = DupRequest {
            keys,
            keys_zm: &keys_zm,
            range: TsRange::all(),
            read_view: txn.read_view(),
            check_ww,
        };
        let mut stats = ScanStats::default();
        let mut it = self
            .shared
            .entry
            .snapshot_object_it(self.is_tombstone, snapshot)
            .with_reader(txn.id());
        while let Some(view) = it.next_visible(cancel).await? {
            stats.visited += 1;
            if view.delete_before(snapshot) {
                continue;
            }
            let Some(data) = view.data() else {
                continue;
            };
            if self.prunable(&view, &keys_zm) {
                stats.pruned += 1;
                continue;
            }
            stats.scanned += 1;
            data.get_duplicated_rows(&req, rows).await?;
        }
        log_debug!(
            component = "lookup",
            event = "full_scan_finished",
            txn = %txn.id(),
            snapshot = %snapshot,
            keys = keys.len(),
            visited = stats.visited,
            pruned = stats.pruned,
            scanned = stats.scanned,
            matched = rows.matched_count(),
        );
        Ok(())
    }

    /// Match `keys` against rows committed in `[from, to)`, walking objects
    /// newest first and stopping as soon as older objects cannot contribute.
    ///
    /// A fresh scan (`in_queue == false`) may move the resume cursor; a
    /// resumed scan uses it to skip sealed objects an earlier pass already
    /// covered. The cursor only moves when the whole call succeeds.
    pub async fn lookup_duplicates_incremental(
        &mut self,
        keys: &[KeyOwned],
        from: Timestamp,
        to: Timestamp,
        in_queue: bool,
        cancel: &CancellationToken,
    ) -> DedupResult<RowIds> {
        let mut rows = self.shared.pool.get(keys.len());
        let scanned = self
            .incremental_scan(keys, TsRange::new(from, to), in_queue, &mut rows, cancel)
            .await;
        match scanned {
            Ok(candidate) => {
                if let Some(candidate) = candidate {
                    self.cursor.advance(candidate);
                }
                Ok(rows)
            }
            Err(err) => Err(self.abort_scan(rows, err)),
        }
    }

    /// Returns the cursor position this call proposes.
    async fn incremental_scan(
        &self,
        keys: &[KeyOwned],
        range: TsRange,
        in_queue: bool,
        rows: &mut RowIds,
        cancel: &CancellationToken,
    ) -> DedupResult<Option<SortHint>> {
        let (from, to) = (range.from(), range.to());
        let keys_zm = ZoneMap::from_keys(keys);
        let req = DupRequest {
            keys,
            keys_zm: &keys_zm,
            range,
            read_view: ReadView::new(to),
            check_ww: false,
        };
        let cursor = self.cursor;
        let mut candidate = cursor.get();
        let mut appendable_done = false;
        let mut sealed_done = false;
        let mut stats = ScanStats::default();

        let objects = self
            .shared
            .entry
            .make_object_it(self.is_tombstone, IterOrder::ReverseCreation);
        for entry in objects {
            if appendable_done && sealed_done {
                break;
            }
            if cancel.is_cancelled() {
                return Err(DedupError::Cancelled);
            }
            stats.visited += 1;
            let hint = entry.sort_hint();
            if !in_queue {
                candidate.get_or_insert(hint);
            } else if cursor.covers(hint) {
                sealed_done = true;
            }

            let view = entry.view();
            if view.is_appendable() {
                if appendable_done {
                    continue;
                }
            } else {
                if sealed_done {
                    continue;
                }
                if !in_queue && view.delete_before(from) {
                    sealed_done = true;
                    continue;
                }
            }

            let view = resolve_view(&entry, to, Some(self.shared.txn.id()), cancel).await?;
            if view.is_appendable() && view.created_before(from) {
                appendable_done = true;
            }
            if !view.visible_at(to) {
                if !in_queue && !view.is_appendable() && view.is_creating() {
                    candidate = Some(hint);
                }
                continue;
            }
            if !view.is_appendable() && view.created_before(from) {
                continue;
            }
            let Some(data) = view.data() else {
                continue;
            };
            if self.prunable(&view, &keys_zm) {
                stats.pruned += 1;
                continue;
            }
            stats.scanned += 1;
            data.get_duplicated_rows(&req, rows).await?;
        }
        log_debug!(
            component = "lookup",
            event = "incremental_scan_finished",
            txn = %self.shared.txn.id(),
            from = %from,
            to = %to,
            in_queue = in_queue,
            appendable_done = appendable_done,
            sealed_done = sealed_done,
            visited = stats.visited,
            pruned = stats.pruned,
            scanned = stats.scanned,
            matched = rows.matched_count(),
        );
        Ok(candidate)
    }

    /// Transaction-level dedup of `keys`: no repeats inside `keys`, no
    /// collision with the workspace (unless the policy skips it), and no
    /// collision with rows visible to the snapshot.
    pub async fn dedup(&self, keys: &[KeyOwned], cancel: &CancellationToken) -> DedupResult<()> {
        let policy = self.shared.txn.dedup_policy();
        if policy == DedupPolicy::SkipAll {
            return Ok(());
        }
        check_unique(keys)?;
        if !policy.skip_workspace() {
            self.dedup_workspace(keys)?;
        }
        let rows = self.lookup_duplicates(keys, true, cancel).await?;
        let hit = rows.matched().next().map(|(idx, _)| keys[idx].clone());
        self.recycle(rows);
        match hit {
            Some(key) => {
                log_debug!(
                    component = "lookup",
                    event = "duplicate_found",
                    txn = %self.shared.txn.id(),
                    key = %key,
                );
                Err(DedupError::DuplicateKey { key })
            }
            None => Ok(()),
        }
    }
}
