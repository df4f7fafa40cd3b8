use std::{collections::BTreeSet, sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;

use super::counted_object;
use crate::{
    catalog::{MvccNode, ObjectEntry, ObjectKind, SortHint},
    error::DedupError,
    key::KeyOwned,
    row::RowIds,
    table::{BaseTable, TxnTable},
    test_util::{init_tracing, int_keys, pk_batch, ts, Fixture},
    transaction::{DedupPolicy, TxnHandle, TxnId},
};

fn matched_keys(keys: &[KeyOwned], rows: &RowIds) -> BTreeSet<KeyOwned> {
    rows.matched().map(|(idx, _)| keys[idx].clone()).collect()
}

async fn full_scan(fixture: &Fixture, keys: &[KeyOwned]) -> BTreeSet<KeyOwned> {
    let table = fixture.txn_table(fixture.begin());
    let rows = table
        .data()
        .lookup_duplicates(keys, false, &CancellationToken::new())
        .await
        .expect("full scan");
    matched_keys(keys, &rows)
}

async fn incremental(
    table: &mut BaseTable,
    keys: &[KeyOwned],
    from: u64,
    to: u64,
    in_queue: bool,
) -> BTreeSet<KeyOwned> {
    let rows = table
        .lookup_duplicates_incremental(keys, ts(from), ts(to), in_queue, &CancellationToken::new())
        .await
        .expect("incremental lookup");
    matched_keys(keys, &rows)
}

#[tokio::test(flavor = "current_thread")]
async fn partitioned_scans_match_full_scan() {
    let fixture = Fixture::new();
    fixture.committed(ObjectKind::Sealed, &[1, 2], 2);
    fixture.appendable(&[(5, 4), (6, 6)], 3);
    fixture.committed(ObjectKind::Sealed, &[7], 7);
    let keys = int_keys(&[1, 5, 6, 7, 9]);

    let mut table = fixture.txn_table(fixture.txn_at(9));
    let full = table
        .data()
        .lookup_duplicates(&keys, false, &CancellationToken::new())
        .await
        .expect("full scan");
    let full = matched_keys(&keys, &full);
    assert_eq!(full, int_keys(&[1, 5, 6, 7]).into_iter().collect());

    let data = table.data_mut();
    let first = incremental(data, &keys, 0, 3, false).await;
    let second = incremental(data, &keys, 3, 6, false).await;
    let third = incremental(data, &keys, 6, 10, false).await;
    assert_eq!(first, int_keys(&[1]).into_iter().collect());
    assert_eq!(second, int_keys(&[5]).into_iter().collect());
    assert_eq!(third, int_keys(&[6, 7]).into_iter().collect());

    let union: BTreeSet<KeyOwned> = first.into_iter().chain(second).chain(third).collect();
    assert_eq!(union, full);
}

#[tokio::test(flavor = "current_thread")]
async fn random_histories_keep_incremental_and_full_scans_equivalent() {
    for seed in 0..32u64 {
        let mut rng = fastrand::Rng::with_seed(seed);
        let fixture = Fixture::new();
        let mut next_key = 0i64;
        let mut now = 1u64;
        // Appendable objects take all their rows before the next one is
        // created, as only the newest appendable object receives appends.
        for _ in 0..rng.usize(4..12) {
            now += rng.u64(0..3);
            if rng.bool() {
                let ids: Vec<i64> = (0..rng.usize(1..4))
                    .map(|_| {
                        next_key += 1;
                        next_key
                    })
                    .collect();
                fixture.committed(ObjectKind::Sealed, &ids, now);
            } else {
                let rows: Vec<(i64, u64)> = (0..rng.usize(1..4))
                    .map(|step| {
                        next_key += 1;
                        (next_key, now + step as u64)
                    })
                    .collect();
                fixture.appendable(&rows, now);
                now += rows.len() as u64;
            }
        }
        let horizon = now + 1;

        let keys: Vec<KeyOwned> = (0..=next_key + 2)
            .filter(|_| rng.bool())
            .map(KeyOwned::from)
            .collect();

        let mut table = fixture.txn_table(fixture.txn_at(horizon - 1));
        let full = table
            .data()
            .lookup_duplicates(&keys, false, &CancellationToken::new())
            .await
            .expect("full scan");
        let full = matched_keys(&keys, &full);

        let mut cuts: Vec<u64> = (0..rng.usize(0..4)).map(|_| rng.u64(1..horizon)).collect();
        cuts.push(0);
        cuts.push(horizon);
        cuts.sort_unstable();
        cuts.dedup();

        let mut union = BTreeSet::new();
        for window in cuts.windows(2) {
            union.extend(incremental(table.data_mut(), &keys, window[0], window[1], false).await);
        }
        assert_eq!(union, full, "seed={seed} cuts={cuts:?}");
    }
}

fn fresh_keys(rng: &mut fastrand::Rng, next_key: &mut i64) -> Vec<i64> {
    (0..rng.usize(1..4))
        .map(|_| {
            *next_key += 1;
            *next_key
        })
        .collect()
}

enum Work {
    Append(TxnTable),
    BulkLoad(TxnTable, Vec<i64>),
    Merge(Vec<(Arc<ObjectEntry>, Vec<i64>)>),
}

struct Writer {
    txn: Arc<TxnHandle>,
    work: Work,
    created: Vec<(Arc<ObjectEntry>, Vec<i64>)>,
}

impl Writer {
    /// Register the writer's objects; runs inside `prepare_with`.
    fn apply(&mut self, fixture: &Fixture) -> Result<(), DedupError> {
        match &mut self.work {
            Work::Append(table) => {
                table.apply_commit()?;
            }
            Work::BulkLoad(table, ids) => {
                for entry in table.apply_commit()? {
                    self.created.push((entry, ids.clone()));
                }
            }
            Work::Merge(victims) => {
                let create = MvccNode::Txn(Arc::clone(&self.txn));
                let mut ids = Vec::new();
                for (entry, keys) in victims.iter() {
                    entry.mark_deleted(create.clone())?;
                    ids.extend_from_slice(keys);
                }
                let merged = fixture.object(ObjectKind::Sealed, &ids, create);
                self.created.push((merged, ids));
            }
        }
        Ok(())
    }
}

#[tokio::test(flavor = "current_thread")]
async fn random_transactional_histories_keep_incremental_and_full_scans_equivalent() {
    init_tracing();
    let cancel = CancellationToken::new();
    for seed in 0..24u64 {
        let mut rng = fastrand::Rng::with_seed(seed);
        let fixture = Fixture::new();
        let mut next_key = 0i64;
        // Committed sealed objects a merge may still fold together.
        let mut live: Vec<(Arc<ObjectEntry>, Vec<i64>)> = Vec::new();
        let mut reader = fixture.txn_table(fixture.txn_at(0));
        let mut union = BTreeSet::new();
        let mut windows = Vec::new();
        let mut last_cut = 0u64;
        let mut all_keys = Vec::new();

        for _ in 0..rng.usize(3..8) {
            // Everyone in a round begins before anyone prepares.
            let mut writers = Vec::new();
            let mut merged = false;
            for _ in 0..rng.usize(1..4) {
                let txn = fixture.begin();
                let work = match rng.u8(0..3) {
                    0 if !merged && live.len() >= 2 => {
                        merged = true;
                        rng.shuffle(&mut live);
                        let take = rng.usize(2..=live.len());
                        Work::Merge(live[..take].to_vec())
                    }
                    0 | 1 => {
                        let ids = fresh_keys(&mut rng, &mut next_key);
                        let mut table = fixture.txn_table(Arc::clone(&txn));
                        table.data_mut().append(pk_batch(&ids)).expect("append");
                        table.pre_prepare().expect("pre-prepare");
                        all_keys.extend(ids);
                        Work::Append(table)
                    }
                    _ => {
                        let ids = fresh_keys(&mut rng, &mut next_key);
                        let mut table = fixture.txn_table(Arc::clone(&txn));
                        table
                            .data_mut()
                            .add_objects(fixture.write_object(&ids), &cancel)
                            .await
                            .expect("add objects");
                        table.pre_prepare().expect("pre-prepare");
                        all_keys.extend(ids.iter().copied());
                        Work::BulkLoad(table, ids)
                    }
                };
                writers.push(Writer {
                    txn,
                    work,
                    created: Vec::new(),
                });
            }

            rng.shuffle(&mut writers);
            for writer in writers.iter_mut() {
                let txn = Arc::clone(&writer.txn);
                fixture
                    .txns
                    .prepare_with(&txn, |_| writer.apply(&fixture))
                    .expect("prepare");
            }
            rng.shuffle(&mut writers);
            for writer in writers {
                if rng.u8(0..6) == 0 {
                    writer.txn.abort().expect("abort");
                    continue;
                }
                writer.txn.commit().expect("commit");
                if let Work::Merge(victims) = &writer.work {
                    live.retain(|(entry, _)| {
                        !victims.iter().any(|(gone, _)| gone.id() == entry.id())
                    });
                }
                live.extend(writer.created);
            }

            if rng.bool() {
                let cut = fixture.txns.peek().get();
                let keys = lookup_keys(&all_keys);
                union.extend(incremental(reader.data_mut(), &keys, last_cut, cut, false).await);
                windows.push((last_cut, cut));
                last_cut = cut;
            }
        }

        let keys = lookup_keys(&all_keys);
        let horizon = fixture.txns.peek().get();
        union.extend(incremental(reader.data_mut(), &keys, last_cut, horizon, false).await);
        windows.push((last_cut, horizon));
        assert_eq!(
            union,
            full_scan(&fixture, &keys).await,
            "seed={seed} windows={windows:?}"
        );
    }
}

/// Every key ever written plus one that never was.
fn lookup_keys(written: &[i64]) -> Vec<KeyOwned> {
    let mut ids = written.to_vec();
    ids.push(-1);
    int_keys(&ids)
}

#[tokio::test(flavor = "current_thread")]
async fn objects_are_ordered_by_prepare_not_by_workspace_activity() {
    let fixture = Fixture::new();
    let first = fixture.begin();
    let second = fixture.begin();
    let mut first_table = fixture.txn_table(Arc::clone(&first));
    let mut second_table = fixture.txn_table(Arc::clone(&second));
    // `first` writes and finalizes its workspace before `second` does, but
    // `second` reaches prepare first.
    first_table.data_mut().append(pk_batch(&[1])).expect("append");
    first_table.pre_prepare().expect("pre-prepare");
    second_table.data_mut().append(pk_batch(&[2])).expect("append");
    second_table.pre_prepare().expect("pre-prepare");

    let (second_ts, second_objects) = fixture
        .txns
        .prepare_with(&second, |_| second_table.apply_commit())
        .expect("prepare");
    let (first_ts, first_objects) = fixture
        .txns
        .prepare_with(&first, |_| first_table.apply_commit())
        .expect("prepare");
    first.commit().expect("commit");
    second.commit().expect("commit");

    assert!(second_ts < first_ts);
    assert!(second_objects[0].sort_hint() < first_objects[0].sort_hint());
    assert_eq!(first_objects[0].view().created_at(), Some(first_ts));

    // The window starting at `first`'s commit walks `first`'s appendable
    // object before reaching the older one that predates the window.
    let keys = int_keys(&[1, 2]);
    let horizon = fixture.txns.peek();
    let mut reader = fixture.txn_table(fixture.txn_at(0));
    let early = incremental(reader.data_mut(), &keys, 0, first_ts.get(), false).await;
    let late = incremental(reader.data_mut(), &keys, first_ts.get(), horizon.get(), false).await;
    assert_eq!(early, int_keys(&[2]).into_iter().collect());
    assert_eq!(late, int_keys(&[1]).into_iter().collect());
    assert_eq!(
        early.into_iter().chain(late).collect::<BTreeSet<_>>(),
        full_scan(&fixture, &keys).await
    );
}

#[tokio::test(flavor = "current_thread")]
async fn fresh_scan_seeds_cursor_with_newest_object() {
    let fixture = Fixture::new();
    fixture.committed(ObjectKind::Sealed, &[1], 1);
    let newest = fixture.committed(ObjectKind::Sealed, &[2], 2);

    let mut table = fixture.txn_table(fixture.txn_at(5));
    assert_eq!(table.data().cursor().get(), None);
    incremental(table.data_mut(), &int_keys(&[1]), 0, 5, true).await;
    assert_eq!(table.data().cursor().get(), None, "resumed scans never move it");

    incremental(table.data_mut(), &int_keys(&[1]), 0, 5, false).await;
    assert_eq!(table.data().cursor().get(), Some(newest.sort_hint()));
}

#[tokio::test(flavor = "current_thread")]
async fn pending_sealed_creation_becomes_resume_point() {
    init_tracing();
    let fixture = Fixture::new();
    fixture.committed(ObjectKind::Sealed, &[1], 1);
    let writer = TxnHandle::new(TxnId::new(50), ts(1), DedupPolicy::Full);
    let pending = fixture.object(ObjectKind::Sealed, &[2], MvccNode::Txn(Arc::clone(&writer)));
    fixture.committed(ObjectKind::Sealed, &[3], 3);
    let newest = fixture.committed(ObjectKind::Sealed, &[4], 4);

    let mut table = fixture.txn_table(fixture.txn_at(9));
    let keys = int_keys(&[1, 2, 3, 4]);
    let found = incremental(table.data_mut(), &keys, 0, 9, false).await;
    assert_eq!(found, int_keys(&[1, 3, 4]).into_iter().collect());
    assert_eq!(table.data().cursor().get(), Some(pending.sort_hint()));
    assert!(pending.sort_hint() < newest.sort_hint());

    // Later fresh scans never move the cursor backwards.
    let mut hints: Vec<Option<SortHint>> = vec![table.data().cursor().get()];
    writer.prepare(ts(10)).expect("prepare");
    writer.commit().expect("commit");
    for (from, to) in [(9, 11), (11, 12)] {
        incremental(table.data_mut(), &keys, from, to, false).await;
        hints.push(table.data().cursor().get());
    }
    assert!(hints.windows(2).all(|pair| pair[0] <= pair[1]), "{hints:?}");
}

#[tokio::test(flavor = "current_thread")]
async fn resumed_scan_skips_objects_behind_the_cursor() {
    let fixture = Fixture::new();
    let (older, older_lookups) = counted_object(
        &fixture,
        ObjectKind::Sealed,
        &[1],
        MvccNode::Committed(ts(1)),
        false,
    );
    // Deleting `older` is stuck committing with a prepare ts inside every
    // window below; evaluating it would park forever.
    let deleter = TxnHandle::new(TxnId::new(60), ts(1), DedupPolicy::Full);
    older
        .mark_deleted(MvccNode::Txn(Arc::clone(&deleter)))
        .expect("delete");
    deleter.prepare(ts(3)).expect("prepare");

    let (gone, gone_lookups) = counted_object(
        &fixture,
        ObjectKind::Sealed,
        &[2],
        MvccNode::Committed(ts(1)),
        false,
    );
    gone.mark_deleted(MvccNode::Committed(ts(2)))
        .expect("delete");

    let mut table = fixture.txn_table(fixture.txn_at(9));
    let keys = int_keys(&[1, 2]);

    // Fresh scan: `gone` was fully deleted before `from`, so nothing older is
    // looked at, including the object whose delete is still committing.
    let found = tokio::time::timeout(
        Duration::from_secs(2),
        incremental(table.data_mut(), &keys, 5, 9, false),
    )
    .await
    .expect("fresh scan stops at the deleted object");
    assert!(found.is_empty());
    assert_eq!(table.data().cursor().get(), Some(gone.sort_hint()));

    // Resumed scan: the cursor alone stops the sealed walk.
    let found = tokio::time::timeout(
        Duration::from_secs(2),
        incremental(table.data_mut(), &keys, 9, 12, true),
    )
    .await
    .expect("resumed scan stops at the cursor");
    assert!(found.is_empty());
    assert_eq!(older_lookups.lookups(), 0);
    assert_eq!(gone_lookups.lookups(), 0);
}

#[tokio::test(flavor = "current_thread")]
async fn older_appendable_objects_are_skipped_once_one_predates_the_range() {
    let fixture = Fixture::new();
    let (_, old_lookups) = counted_object(
        &fixture,
        ObjectKind::Appendable,
        &[1],
        MvccNode::Committed(ts(1)),
        false,
    );
    let (_, recent_lookups) = counted_object(
        &fixture,
        ObjectKind::Appendable,
        &[2],
        MvccNode::Committed(ts(3)),
        false,
    );

    let mut table = fixture.txn_table(fixture.txn_at(9));
    let found = incremental(table.data_mut(), &int_keys(&[1, 2]), 5, 9, false).await;
    assert!(found.is_empty());
    assert_eq!(recent_lookups.lookups(), 1);
    assert_eq!(old_lookups.lookups(), 0);
}

#[tokio::test(flavor = "current_thread")]
async fn cancellation_leaves_cursor_untouched() {
    let fixture = Fixture::new();
    fixture.committed(ObjectKind::Sealed, &[1], 1);
    let mut table = fixture.txn_table(fixture.txn_at(5));

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = table
        .data_mut()
        .lookup_duplicates_incremental(&int_keys(&[1]), ts(0), ts(5), false, &cancel)
        .await;
    assert!(matches!(result, Err(DedupError::Cancelled)));
    assert_eq!(table.data().cursor().get(), None);
}

#[tokio::test(flavor = "current_thread")]
async fn access_failure_leaves_cursor_untouched() {
    let fixture = Fixture::new();
    counted_object(
        &fixture,
        ObjectKind::Sealed,
        &[1],
        MvccNode::Committed(ts(1)),
        true,
    );
    let mut table = fixture.txn_table(fixture.txn_at(5));
    let result = table
        .data_mut()
        .lookup_duplicates_incremental(
            &int_keys(&[1]),
            ts(0),
            ts(5),
            false,
            &CancellationToken::new(),
        )
        .await;
    assert!(matches!(result, Err(DedupError::Access(_))));
    assert_eq!(table.data().cursor().get(), None);
}
