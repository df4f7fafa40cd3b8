use parking_lot::Mutex;
use ulid::{Generator, Ulid};

/// Identifier of a stored object (appendable or sealed).
pub type ObjectId = Ulid;

/// Thread-safe ULID generator shared by everything that names objects.
pub struct ObjectIdGenerator {
    inner: Mutex<Generator>,
}

impl ObjectIdGenerator {
    /// Create a new generator seeded with the current time.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Generator::new()),
        }
    }

    /// Produce the next [`ObjectId`] in a monotonic, time-ordered sequence.
    pub fn generate(&self) -> ObjectId {
        // The generator only fails when the random part overflows within one
        // millisecond; a fresh id is still unique, just not ordered.
        self.inner.lock().generate().unwrap_or_else(|_| Ulid::new())
    }
}

impl Default for ObjectIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ObjectIdGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectIdGenerator").finish_non_exhaustive()
    }
}
