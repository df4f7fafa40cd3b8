use arrow::{datatypes::DataType, error::ArrowError};

/// Error returned when primary-key extraction fails due to schema or type mismatches.
#[derive(Debug, thiserror::Error)]
pub enum KeyExtractError {
    /// Column index is outside the batch's column range.
    #[error("column index {0} out of bounds (num_columns={1})")]
    ColumnOutOfBounds(usize, usize),
    /// Referenced field by name was not found in the schema.
    #[error("no such field in schema: {name}")]
    NoSuchField {
        /// The missing field name.
        name: String,
    },
    /// Encountered an Arrow type that cannot serve as a primary key.
    #[error("unsupported primary key data type: {data_type:?}")]
    UnsupportedType {
        /// The Arrow data type that is not supported.
        data_type: DataType,
    },
    /// Primary keys are never null.
    #[error("null primary key at row {row}")]
    NullKey {
        /// Row holding the null.
        row: usize,
    },
    /// Generic Arrow failure.
    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),
}
