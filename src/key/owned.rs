//! Owned primary-key representation.
//!
//! `KeyOwned` wraps a single `KeyComponentOwned`. Variable-width components
//! keep their bytes in reference-counted buffers so clones stay cheap while
//! probe vectors, zone maps and workspace indexes share the same values.
//! Equality, ordering and hashing treat the small/large Arrow flavours of
//! the same logical type (Utf8 vs LargeUtf8, Binary vs LargeBinary vs
//! FixedSizeBinary) as identical.

use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use serde::{Deserialize, Serialize};

/// Owned key component.
#[allow(clippy::large_enum_variant)]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum KeyComponentOwned {
    /// Boolean component.
    Bool(bool),
    /// 32-bit signed integer component.
    I32(i32),
    /// 64-bit signed integer component.
    I64(i64),
    /// 32-bit unsigned integer component.
    U32(u32),
    /// 64-bit unsigned integer component.
    U64(u64),
    /// 32-bit floating-point component stored as IEEE bits.
    F32(u32),
    /// 64-bit floating-point component stored as IEEE bits.
    F64(u64),
    /// UTF-8 value owned as a reference-counted `String`.
    Utf8(Arc<String>),
    /// Large UTF-8 value owned as a reference-counted `String`.
    LargeUtf8(Arc<String>),
    /// Binary value stored in a shared `Vec<u8>` buffer.
    Binary(Arc<Vec<u8>>),
    /// Large binary value stored in a shared `Vec<u8>` buffer.
    LargeBinary(Arc<Vec<u8>>),
    /// Fixed-size binary value stored in a shared `Vec<u8>` buffer.
    FixedSizeBinary(Arc<Vec<u8>>),
    /// Struct/tuple component consisting of nested parts.
    Struct(Vec<KeyComponentOwned>),
}

/// Logical shape used for comparisons, collapsing physical flavours.
enum Normalized<'a> {
    Bool(bool),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(u32),
    F64(u64),
    Str(&'a str),
    Bytes(&'a [u8]),
    Struct(&'a [KeyComponentOwned]),
}

impl Normalized<'_> {
    fn rank(&self) -> u8 {
        match self {
            Normalized::Bool(_) => 0,
            Normalized::I32(_) => 1,
            Normalized::I64(_) => 2,
            Normalized::U32(_) => 3,
            Normalized::U64(_) => 4,
            Normalized::F32(_) => 5,
            Normalized::F64(_) => 6,
            Normalized::Str(_) => 7,
            Normalized::Bytes(_) => 8,
            Normalized::Struct(_) => 9,
        }
    }
}

impl KeyComponentOwned {
    fn normalized(&self) -> Normalized<'_> {
        match self {
            KeyComponentOwned::Bool(v) => Normalized::Bool(*v),
            KeyComponentOwned::I32(v) => Normalized::I32(*v),
            KeyComponentOwned::I64(v) => Normalized::I64(*v),
            KeyComponentOwned::U32(v) => Normalized::U32(*v),
            KeyComponentOwned::U64(v) => Normalized::U64(*v),
            KeyComponentOwned::F32(v) => Normalized::F32(*v),
            KeyComponentOwned::F64(v) => Normalized::F64(*v),
            KeyComponentOwned::Utf8(v) | KeyComponentOwned::LargeUtf8(v) => {
                Normalized::Str(v.as_str())
            }
            KeyComponentOwned::Binary(v)
            | KeyComponentOwned::LargeBinary(v)
            | KeyComponentOwned::FixedSizeBinary(v) => Normalized::Bytes(v.as_slice()),
            KeyComponentOwned::Struct(parts) => Normalized::Struct(parts.as_slice()),
        }
    }

    /// Returns a view over the component interpreted as UTF-8 if applicable.
    pub fn as_utf8(&self) -> Option<&str> {
        match self.normalized() {
            Normalized::Str(v) => Some(v),
            _ => None,
        }
    }

    /// Returns a view over the component interpreted as binary if applicable.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self.normalized() {
            Normalized::Bytes(v) => Some(v),
            _ => None,
        }
    }

    /// Approximate heap footprint of the component in bytes.
    pub fn heap_size(&self) -> usize {
        match self {
            KeyComponentOwned::Utf8(v) | KeyComponentOwned::LargeUtf8(v) => v.len(),
            KeyComponentOwned::Binary(v)
            | KeyComponentOwned::LargeBinary(v)
            | KeyComponentOwned::FixedSizeBinary(v) => v.len(),
            KeyComponentOwned::Struct(parts) => {
                parts.iter().map(KeyComponentOwned::heap_size).sum::<usize>()
                    + parts.len() * std::mem::size_of::<KeyComponentOwned>()
            }
            _ => 0,
        }
    }
}

impl PartialEq for KeyComponentOwned {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for KeyComponentOwned {}

impl PartialOrd for KeyComponentOwned {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeyComponentOwned {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = self.normalized();
        let rhs = other.normalized();
        match (&lhs, &rhs) {
            (Normalized::Bool(a), Normalized::Bool(b)) => a.cmp(b),
            (Normalized::I32(a), Normalized::I32(b)) => a.cmp(b),
            (Normalized::I64(a), Normalized::I64(b)) => a.cmp(b),
            (Normalized::U32(a), Normalized::U32(b)) => a.cmp(b),
            (Normalized::U64(a), Normalized::U64(b)) => a.cmp(b),
            (Normalized::F32(a), Normalized::F32(b)) => {
                f32::from_bits(*a).total_cmp(&f32::from_bits(*b))
            }
            (Normalized::F64(a), Normalized::F64(b)) => {
                f64::from_bits(*a).total_cmp(&f64::from_bits(*b))
            }
            (Normalized::Str(a), Normalized::Str(b)) => a.cmp(b),
            (Normalized::Bytes(a), Normalized::Bytes(b)) => a.cmp(b),
            (Normalized::Struct(a), Normalized::Struct(b)) => a.iter().cmp(b.iter()),
            _ => lhs.rank().cmp(&rhs.rank()),
        }
    }
}

impl Hash for KeyComponentOwned {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let normalized = self.normalized();
        state.write_u8(normalized.rank());
        match normalized {
            Normalized::Bool(v) => v.hash(state),
            Normalized::I32(v) => v.hash(state),
            Normalized::I64(v) => v.hash(state),
            Normalized::U32(v) => v.hash(state),
            Normalized::U64(v) => v.hash(state),
            Normalized::F32(v) => v.hash(state),
            Normalized::F64(v) => v.hash(state),
            Normalized::Str(v) => v.hash(state),
            Normalized::Bytes(v) => v.hash(state),
            Normalized::Struct(parts) => {
                state.write_usize(parts.len());
                for part in parts {
                    part.hash(state);
                }
            }
        }
    }
}

impl fmt::Display for KeyComponentOwned {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.normalized() {
            Normalized::Bool(v) => write!(f, "{v}"),
            Normalized::I32(v) => write!(f, "{v}"),
            Normalized::I64(v) => write!(f, "{v}"),
            Normalized::U32(v) => write!(f, "{v}"),
            Normalized::U64(v) => write!(f, "{v}"),
            Normalized::F32(v) => write!(f, "{}", f32::from_bits(v)),
            Normalized::F64(v) => write!(f, "{}", f64::from_bits(v)),
            Normalized::Str(v) => write!(f, "{v:?}"),
            Normalized::Bytes(v) => {
                f.write_str("0x")?;
                for byte in v {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Normalized::Struct(parts) => {
                f.write_str("(")?;
                for (idx, part) in parts.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{part}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Owned primary-key value.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct KeyOwned {
    component: KeyComponentOwned,
}

impl KeyOwned {
    /// Create an owned key from a component.
    pub fn new(component: KeyComponentOwned) -> Self {
        Self { component }
    }

    /// Access the component backing this key.
    pub fn component(&self) -> &KeyComponentOwned {
        &self.component
    }

    /// Consume the key and return its component.
    pub fn into_component(self) -> KeyComponentOwned {
        self.component
    }

    /// Build a composite key from owned parts.
    pub fn tuple(parts: Vec<Self>) -> Self {
        let comps = parts
            .into_iter()
            .map(KeyOwned::into_component)
            .collect::<Vec<_>>();
        KeyOwned::new(KeyComponentOwned::Struct(comps))
    }

    /// Returns the key interpreted as UTF-8 if applicable.
    pub fn as_utf8(&self) -> Option<&str> {
        self.component.as_utf8()
    }

    /// Returns the key interpreted as raw bytes if applicable.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        self.component.as_bytes()
    }

    /// Approximate memory footprint of the key, inline part included.
    pub fn heap_size(&self) -> usize {
        std::mem::size_of::<Self>() + self.component.heap_size()
    }
}

impl fmt::Display for KeyOwned {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.component.fmt(f)
    }
}

impl From<&str> for KeyOwned {
    fn from(value: &str) -> Self {
        KeyOwned::new(KeyComponentOwned::Utf8(Arc::new(value.to_owned())))
    }
}

impl From<String> for KeyOwned {
    fn from(value: String) -> Self {
        KeyOwned::new(KeyComponentOwned::Utf8(Arc::new(value)))
    }
}

impl From<&[u8]> for KeyOwned {
    fn from(value: &[u8]) -> Self {
        KeyOwned::new(KeyComponentOwned::Binary(Arc::new(value.to_vec())))
    }
}

impl From<Vec<u8>> for KeyOwned {
    fn from(value: Vec<u8>) -> Self {
        KeyOwned::new(KeyComponentOwned::Binary(Arc::new(value)))
    }
}

macro_rules! impl_from_scalar {
    ($variant:ident, $t:ty, $map:expr) => {
        impl From<$t> for KeyOwned {
            fn from(value: $t) -> Self {
                KeyOwned::new(KeyComponentOwned::$variant($map(value)))
            }
        }
    };
}

impl_from_scalar!(Bool, bool, |v| v);
impl_from_scalar!(I32, i32, |v| v);
impl_from_scalar!(I64, i64, |v| v);
impl_from_scalar!(U32, u32, |v| v);
impl_from_scalar!(U64, u64, |v| v);
impl_from_scalar!(F32, f32, |v: f32| v.to_bits());
impl_from_scalar!(F64, f64, |v: f64| v.to_bits());
