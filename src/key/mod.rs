//! Primary-key values used by probe vectors, zone maps and workspace indexes.
mod owned;

pub use owned::{KeyComponentOwned, KeyOwned};
