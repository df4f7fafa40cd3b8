#![cfg(test)]

mod incremental_e2e;

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use async_trait::async_trait;

use crate::{
    catalog::{MvccNode, ObjectEntry, ObjectKind, ObjectSpec},
    error::AccessError,
    id::ObjectId,
    inmem::MemObject,
    object::{DupRequest, ObjectData},
    row::RowIds,
    test_util::{int_keys, Fixture},
};

/// Wraps an accessor and counts lookups; optionally fails every call.
#[derive(Debug)]
pub(crate) struct LookupCounter {
    inner: Arc<dyn ObjectData>,
    lookups: AtomicUsize,
    fail_as: Option<ObjectId>,
}

impl LookupCounter {
    pub(crate) fn new(inner: Arc<dyn ObjectData>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            lookups: AtomicUsize::new(0),
            fail_as: None,
        })
    }

    pub(crate) fn failing(inner: Arc<dyn ObjectData>, object: ObjectId) -> Arc<Self> {
        Arc::new(Self {
            inner,
            lookups: AtomicUsize::new(0),
            fail_as: Some(object),
        })
    }

    pub(crate) fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectData for LookupCounter {
    async fn get_duplicated_rows(
        &self,
        req: &DupRequest<'_>,
        rows: &mut RowIds,
    ) -> Result<(), AccessError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(object) = self.fail_as {
            return Err(AccessError::Load {
                object,
                reason: "disk went away".to_string(),
            });
        }
        self.inner.get_duplicated_rows(req, rows).await
    }
}

/// Register an object whose accessor is wrapped in a [`LookupCounter`].
pub(crate) fn counted_object(
    fixture: &Fixture,
    kind: ObjectKind,
    ids: &[i64],
    create: MvccNode,
    fail: bool,
) -> (Arc<ObjectEntry>, Arc<LookupCounter>) {
    let id = fixture.catalog.generate_object_id();
    let data = MemObject::with_keys(id, int_keys(ids), create.clone());
    let zone_map = data.zone_map();
    let data: Arc<dyn ObjectData> = Arc::new(data);
    let counter = if fail {
        LookupCounter::failing(data, id)
    } else {
        LookupCounter::new(data)
    };
    let spec = ObjectSpec::new(kind, create)
        .with_id(id)
        .with_zone_map(zone_map)
        .with_data(Arc::clone(&counter) as Arc<dyn ObjectData>);
    let entry = fixture.table.create_object(false, spec).expect("create object");
    (entry, counter)
}
