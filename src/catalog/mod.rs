//! Table and object metadata consumed by the dedup engine.
//!
//! A [`Catalog`] owns the sort-hint and object-id allocators. Each
//! [`TableEntry`] keeps two object lists, one for data objects and one for
//! tombstone objects, as skip lists keyed by sort hint so walks in either
//! direction can run while new objects are being added.

mod entry;
mod iter;

use std::{
    collections::HashSet,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use crossbeam_skiplist::SkipMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

pub use entry::{MvccNode, ObjectEntry, ObjectKind, ObjectView, SortHint};
pub use iter::{resolve_view, IterOrder, ObjectIter, SnapshotObjectIter};
use iter::ObjectList;

use crate::{
    error::{DedupError, DedupResult},
    id::{ObjectId, ObjectIdGenerator},
    mvcc::Timestamp,
    object::ObjectData,
    observability::log_debug,
    pruning::ZoneMap,
};

/// Primary-key column of a table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryKey {
    /// Column name.
    pub name: String,
    /// Zero-based column index in the table schema.
    pub index: usize,
}

/// The parts of a table schema the dedup engine needs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    name: String,
    primary_key: Option<PrimaryKey>,
    secondary_index: bool,
}

impl TableSchema {
    /// Table without a primary key.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: None,
            secondary_index: false,
        }
    }

    /// Declare the primary-key column.
    pub fn with_primary_key(mut self, name: impl Into<String>, index: usize) -> Self {
        self.primary_key = Some(PrimaryKey {
            name: name.into(),
            index,
        });
        self
    }

    /// Mark the table as a secondary-index table.
    pub fn with_secondary_index(mut self, secondary_index: bool) -> Self {
        self.secondary_index = secondary_index;
        self
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Primary-key column, if declared.
    pub fn primary_key(&self) -> Option<&PrimaryKey> {
        self.primary_key.as_ref()
    }

    /// Whether a primary key is declared.
    pub fn has_pk(&self) -> bool {
        self.primary_key.is_some()
    }

    /// Whether this table backs a secondary index.
    pub fn is_secondary_index_table(&self) -> bool {
        self.secondary_index
    }
}

/// Everything needed to register a new object.
pub struct ObjectSpec {
    /// Identity; allocated by the catalog when `None`.
    pub id: Option<ObjectId>,
    /// Appendable or sealed.
    pub kind: ObjectKind,
    /// Creation record.
    pub create: MvccNode,
    /// Sort-key zone map.
    pub zone_map: Option<ZoneMap>,
    /// Row accessor.
    pub data: Option<Arc<dyn ObjectData>>,
}

impl ObjectSpec {
    /// Spec for an object of `kind` created by `create`.
    pub fn new(kind: ObjectKind, create: MvccNode) -> Self {
        Self {
            id: None,
            kind,
            create,
            zone_map: None,
            data: None,
        }
    }

    /// Use a pre-assigned identity.
    pub fn with_id(mut self, id: ObjectId) -> Self {
        self.id = Some(id);
        self
    }

    /// Attach a zone map.
    pub fn with_zone_map(mut self, zone_map: ZoneMap) -> Self {
        self.zone_map = Some(zone_map);
        self
    }

    /// Attach a row accessor.
    pub fn with_data(mut self, data: Arc<dyn ObjectData>) -> Self {
        self.data = Some(data);
        self
    }
}

struct Registry {
    next_sort_hint: u64,
    objects: HashSet<ObjectId>,
}

struct Allocators {
    // Sort hints are handed out and inserted under this lock, so a reader
    // never sees hint N+1 before hint N is in its list.
    registry: Mutex<Registry>,
    ids: ObjectIdGenerator,
    next_table: AtomicU64,
}

/// Root of all table metadata.
#[derive(Clone)]
pub struct Catalog {
    alloc: Arc<Allocators>,
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog")
            .field("next_sort_hint", &self.alloc.registry.lock().next_sort_hint)
            .finish()
    }
}

impl Catalog {
    /// Empty catalog; the first object gets sort hint 1.
    pub fn new() -> Self {
        Self {
            alloc: Arc::new(Allocators {
                registry: Mutex::new(Registry {
                    next_sort_hint: 1,
                    objects: HashSet::new(),
                }),
                ids: ObjectIdGenerator::new(),
                next_table: AtomicU64::new(1),
            }),
        }
    }

    /// Register a table.
    pub fn create_table(&self, schema: TableSchema) -> Arc<TableEntry> {
        let id = self
            .alloc
            .next_table
            .fetch_add(1, Ordering::Relaxed);
        Arc::new(TableEntry {
            id,
            schema,
            data: Arc::new(SkipMap::new()),
            tombstones: Arc::new(SkipMap::new()),
            alloc: Arc::clone(&self.alloc),
        })
    }

    /// Fresh object identity.
    pub fn generate_object_id(&self) -> ObjectId {
        self.alloc.ids.generate()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

/// Metadata of one table: schema plus its data and tombstone objects.
pub struct TableEntry {
    id: u64,
    schema: TableSchema,
    data: Arc<ObjectList>,
    tombstones: Arc<ObjectList>,
    alloc: Arc<Allocators>,
}

impl fmt::Debug for TableEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableEntry")
            .field("id", &self.id)
            .field("schema", &self.schema)
            .field("data_objects", &self.data.len())
            .field("tombstone_objects", &self.tombstones.len())
            .finish()
    }
}

impl TableEntry {
    /// Table identity within its catalog.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Table schema.
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    fn list(&self, is_tombstone: bool) -> &Arc<ObjectList> {
        if is_tombstone {
            &self.tombstones
        } else {
            &self.data
        }
    }

    /// Register a new object and assign it the next sort hint.
    ///
    /// Fails with [`DedupError::DuplicateObject`] when an object with the
    /// spec's identity is already registered anywhere in the catalog.
    pub fn create_object(
        &self,
        is_tombstone: bool,
        spec: ObjectSpec,
    ) -> DedupResult<Arc<ObjectEntry>> {
        let id = spec.id.unwrap_or_else(|| self.alloc.ids.generate());
        let mut registry = self.alloc.registry.lock();
        if !registry.objects.insert(id) {
            return Err(DedupError::DuplicateObject { object: id });
        }
        let sort_hint = SortHint::new(registry.next_sort_hint);
        registry.next_sort_hint += 1;
        let entry = Arc::new(ObjectEntry::new(
            id,
            sort_hint,
            spec.kind,
            spec.create,
            spec.zone_map,
            spec.data,
        ));
        self.list(is_tombstone)
            .insert(sort_hint, Arc::clone(&entry));
        drop(registry);
        log_debug!(
            component = "catalog",
            event = "object_created",
            table = self.schema.name(),
            object = %id,
            sort_hint = sort_hint.get(),
            kind = ?spec.kind,
            tombstone = is_tombstone,
        );
        Ok(entry)
    }

    /// Whether an object with this identity is registered anywhere in the catalog.
    pub fn contains_object(&self, id: ObjectId) -> bool {
        self.alloc.registry.lock().objects.contains(&id)
    }

    /// Fresh object identity from the owning catalog.
    pub fn generate_object_id(&self) -> ObjectId {
        self.alloc.ids.generate()
    }

    /// Walk the object list in `order`.
    pub fn make_object_it(&self, is_tombstone: bool, order: IterOrder) -> ObjectIter {
        ObjectIter::new(Arc::clone(self.list(is_tombstone)), order)
    }

    /// Walk the objects visible at `read_ts`, oldest first.
    pub fn snapshot_object_it(&self, is_tombstone: bool, read_ts: Timestamp) -> SnapshotObjectIter {
        SnapshotObjectIter::new(self.make_object_it(is_tombstone, IterOrder::Creation), read_ts)
    }

    /// Find an object by identity.
    pub fn get_object(&self, is_tombstone: bool, id: ObjectId) -> Option<Arc<ObjectEntry>> {
        self.list(is_tombstone)
            .iter()
            .find(|entry| entry.value().id() == id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Number of registered objects.
    pub fn object_count(&self, is_tombstone: bool) -> usize {
        self.list(is_tombstone).len()
    }
}
