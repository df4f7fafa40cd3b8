//! Arrow primary-key column extraction.
//!
//! Dedup works on owned [`KeyOwned`] values. These helpers turn the primary-key
//! column of a `RecordBatch` (or a bare `ArrayRef` loaded from an object block)
//! into a positional probe vector.

mod errors;

use std::sync::Arc;

use arrow::{
    array::{Array, ArrayRef, AsArray},
    datatypes::{DataType, Float32Type, Float64Type, Int32Type, Int64Type, UInt32Type, UInt64Type},
    record_batch::RecordBatch,
};
pub use errors::KeyExtractError;

use crate::key::{KeyComponentOwned, KeyOwned};

/// Look up a column by name in `batch`.
pub fn column_by_name<'a>(
    batch: &'a RecordBatch,
    name: &str,
) -> Result<&'a ArrayRef, KeyExtractError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| KeyExtractError::NoSuchField {
            name: name.to_string(),
        })
}

/// Extract the keys of the column named `name`.
pub fn keys_from_batch(batch: &RecordBatch, name: &str) -> Result<Vec<KeyOwned>, KeyExtractError> {
    keys_from_array(column_by_name(batch, name)?)
}

/// Extract the keys of the column at `idx`.
pub fn keys_from_batch_index(
    batch: &RecordBatch,
    idx: usize,
) -> Result<Vec<KeyOwned>, KeyExtractError> {
    if idx >= batch.num_columns() {
        return Err(KeyExtractError::ColumnOutOfBounds(idx, batch.num_columns()));
    }
    keys_from_array(batch.column(idx))
}

macro_rules! collect_keys {
    ($array:expr, $map:expr) => {{
        let array = $array;
        let mut keys = Vec::with_capacity(array.len());
        for row in 0..array.len() {
            if array.is_null(row) {
                return Err(KeyExtractError::NullKey { row });
            }
            keys.push(KeyOwned::new($map(array.value(row))));
        }
        Ok(keys)
    }};
}

/// Convert one Arrow array into owned keys, rejecting nulls.
pub fn keys_from_array(array: &ArrayRef) -> Result<Vec<KeyOwned>, KeyExtractError> {
    match array.data_type() {
        DataType::Boolean => collect_keys!(array.as_boolean(), KeyComponentOwned::Bool),
        DataType::Int32 => {
            collect_keys!(array.as_primitive::<Int32Type>(), KeyComponentOwned::I32)
        }
        DataType::Int64 => {
            collect_keys!(array.as_primitive::<Int64Type>(), KeyComponentOwned::I64)
        }
        DataType::UInt32 => {
            collect_keys!(array.as_primitive::<UInt32Type>(), KeyComponentOwned::U32)
        }
        DataType::UInt64 => {
            collect_keys!(array.as_primitive::<UInt64Type>(), KeyComponentOwned::U64)
        }
        DataType::Float32 => collect_keys!(array.as_primitive::<Float32Type>(), |v: f32| {
            KeyComponentOwned::F32(v.to_bits())
        }),
        DataType::Float64 => collect_keys!(array.as_primitive::<Float64Type>(), |v: f64| {
            KeyComponentOwned::F64(v.to_bits())
        }),
        DataType::Utf8 => collect_keys!(array.as_string::<i32>(), |v: &str| {
            KeyComponentOwned::Utf8(Arc::new(v.to_owned()))
        }),
        DataType::LargeUtf8 => collect_keys!(array.as_string::<i64>(), |v: &str| {
            KeyComponentOwned::LargeUtf8(Arc::new(v.to_owned()))
        }),
        DataType::Binary => collect_keys!(array.as_binary::<i32>(), |v: &[u8]| {
            KeyComponentOwned::Binary(Arc::new(v.to_vec()))
        }),
        DataType::LargeBinary => collect_keys!(array.as_binary::<i64>(), |v: &[u8]| {
            KeyComponentOwned::LargeBinary(Arc::new(v.to_vec()))
        }),
        DataType::FixedSizeBinary(_) => {
            collect_keys!(array.as_fixed_size_binary(), |v: &[u8]| {
                KeyComponentOwned::FixedSizeBinary(Arc::new(v.to_vec()))
            })
        }
        other => Err(KeyExtractError::UnsupportedType {
            data_type: other.clone(),
        }),
    }
}
