//! Min/max zone maps over primary-key values.

use serde::{Deserialize, Serialize};

use crate::key::KeyOwned;

/// Min/max summary of a key column.
///
/// An empty zone map describes a column without values and intersects
/// nothing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneMap {
    bounds: Option<(KeyOwned, KeyOwned)>,
}

impl ZoneMap {
    /// Zone map over no values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Zone map over the closed range `[min, max]`.
    pub fn with_bounds(min: KeyOwned, max: KeyOwned) -> Self {
        if min <= max {
            Self {
                bounds: Some((min, max)),
            }
        } else {
            Self {
                bounds: Some((max, min)),
            }
        }
    }

    /// Build a zone map summarizing every key in `keys`.
    pub fn from_keys<'a>(keys: impl IntoIterator<Item = &'a KeyOwned>) -> Self {
        let mut zm = Self::new();
        zm.batch_update(keys);
        zm
    }

    /// Widen the zone map to cover `key`.
    pub fn update(&mut self, key: &KeyOwned) {
        match &mut self.bounds {
            None => self.bounds = Some((key.clone(), key.clone())),
            Some((min, max)) => {
                if key < min {
                    *min = key.clone();
                } else if key > max {
                    *max = key.clone();
                }
            }
        }
    }

    /// Widen the zone map to cover every key in `keys`.
    pub fn batch_update<'a>(&mut self, keys: impl IntoIterator<Item = &'a KeyOwned>) {
        for key in keys {
            self.update(key);
        }
    }

    /// `true` when no value has been recorded.
    pub fn is_empty(&self) -> bool {
        self.bounds.is_none()
    }

    /// Smallest recorded key.
    pub fn min(&self) -> Option<&KeyOwned> {
        self.bounds.as_ref().map(|(min, _)| min)
    }

    /// Largest recorded key.
    pub fn max(&self) -> Option<&KeyOwned> {
        self.bounds.as_ref().map(|(_, max)| max)
    }

    /// `true` when `key` lies within `[min, max]`.
    pub fn contains(&self, key: &KeyOwned) -> bool {
        match &self.bounds {
            Some((min, max)) => key >= min && key <= max,
            None => false,
        }
    }

    /// Range-overlap test. Never reports `false` for ranges sharing a key.
    pub fn fast_intersect(&self, other: &ZoneMap) -> bool {
        match (&self.bounds, &other.bounds) {
            (Some((a_min, a_max)), Some((b_min, b_max))) => a_min <= b_max && b_min <= a_max,
            _ => false,
        }
    }
}
