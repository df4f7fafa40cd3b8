use crate::{
    extractor::KeyExtractError,
    id::ObjectId,
    key::KeyOwned,
    transaction::{TxnError, TxnId},
};

/// Failure raised by an object accessor or loader while reading key data.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    /// The object's rows or key column could not be loaded.
    #[error("failed to load object {object}: {reason}")]
    Load {
        /// Object being read.
        object: ObjectId,
        /// Backend-specific description.
        reason: String,
    },
    /// The object's data did not match its descriptor.
    #[error("object {object} is corrupted: {reason}")]
    Corrupted {
        /// Object being read.
        object: ObjectId,
        /// What did not line up.
        reason: String,
    },
    /// A probe key was rewritten by a transaction committed after the reader's snapshot.
    #[error("write-write conflict on key {key} in object {object}")]
    WriteConflict {
        /// Object holding the newer row.
        object: ObjectId,
        /// Conflicting key.
        key: KeyOwned,
    },
}

/// Error returned by the duplicate-key resolution engine.
#[derive(Debug, thiserror::Error)]
pub enum DedupError {
    /// A primary key collides with visible or buffered data.
    #[error("duplicate primary key: {key}")]
    DuplicateKey {
        /// The colliding key.
        key: KeyOwned,
    },
    /// A probe key was rewritten after the reader's snapshot.
    #[error("write-write conflict on key {key} in object {object}")]
    WriteConflict {
        /// Object holding the newer row.
        object: ObjectId,
        /// Conflicting key.
        key: KeyOwned,
    },
    /// Key data could not be fetched; the lookup was aborted.
    #[error("object access failed: {0}")]
    Access(#[source] AccessError),
    /// The caller cancelled the lookup.
    #[error("lookup cancelled")]
    Cancelled,
    /// The primary-key column could not be turned into keys.
    #[error("key extract error: {0}")]
    KeyExtract(#[from] KeyExtractError),
    /// Transaction state machine error.
    #[error("transaction error: {0}")]
    Txn(#[from] TxnError),
    /// The workspace no longer accepts writes.
    #[error("workspace of table {table} is closed for writes")]
    WorkspaceClosed {
        /// Table owning the workspace.
        table: String,
    },
    /// The workspace was applied while its transaction was not committing.
    #[error("{txn} applied its workspace outside prepare")]
    NotCommitting {
        /// Transaction owning the workspace.
        txn: TxnId,
    },
    /// An object with this identity is already registered in the catalog.
    #[error("object {object} is already registered")]
    DuplicateObject {
        /// Identity registered twice.
        object: ObjectId,
    },
    /// The object already carries a live delete.
    #[error("object {object} is already deleted")]
    ObjectAlreadyDeleted {
        /// Object targeted by the second delete.
        object: ObjectId,
    },
}

impl From<AccessError> for DedupError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::WriteConflict { object, key } => DedupError::WriteConflict { object, key },
            other => DedupError::Access(other),
        }
    }
}

/// Convenience alias used across the crate.
pub type DedupResult<T> = Result<T, DedupError>;
