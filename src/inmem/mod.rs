//! In-memory objects and object loader.
//!
//! - `object` holds [`MemObject`], a row-oriented [`crate::object::ObjectData`]
//!   with a per-key offset index.
//! - `loader` holds [`MemObjectLoader`], which keeps bulk-written objects as
//!   Arrow blocks and serves key columns from them.

mod loader;
mod object;

pub use loader::MemObjectLoader;
pub use object::MemObject;
