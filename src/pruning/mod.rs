//! Zone-map pruning for the duplicate lookup path.
//!
//! Before an object's row data is touched, the probe key set is summarized
//! into a [`ZoneMap`] and tested against the object's persisted sort-key zone
//! map. A miss proves the object holds none of the probe keys. A hit proves
//! nothing, so the filter may let through objects without matches but never
//! drops one that has them.

mod zone_map;

pub use zone_map::ZoneMap;

/// Decide whether an object can be skipped for a probe summarized by `keys_zm`.
///
/// Objects without a zone map are never skipped.
pub(crate) fn quick_skip(keys_zm: &ZoneMap, object_zm: Option<&ZoneMap>) -> bool {
    match object_zm {
        Some(object_zm) => !object_zm.fast_intersect(keys_zm),
        None => false,
    }
}
