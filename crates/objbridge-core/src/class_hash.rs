//! Deterministic hash-based class identity.
//!
//! [`ClassHash`] is computed from a class name with XXHash64, so the same name
//! always hashes the same way regardless of registration order.
//!
//! ```
//! use objbridge_core::ClassHash;
//!
//! let a = ClassHash::from_name("Ship");
//! let b = ClassHash::from_name("Ship");
//! assert_eq!(a, b);
//! assert_ne!(a, ClassHash::from_name("Station"));
//! ```

use std::fmt;
use xxhash_rust::xxh64::xxh64;

/// Domain-specific mixing constants for hash computation.
pub mod hash_constants {
    /// Domain marker for class hashes
    pub const CLASS: u64 = 0x2fac10b63a6cc57c;

    /// Domain marker for member (method, attribute) hashes
    pub const MEMBER: u64 = 0x7d3c8b4a92e15f6d;
}

/// A deterministic 64-bit hash identifying a script-visible class.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ClassHash(pub u64);

impl ClassHash {
    /// Empty/invalid hash constant.
    pub const EMPTY: ClassHash = ClassHash(0);

    /// Create a class hash from a class name.
    #[inline]
    pub fn from_name(name: &str) -> Self {
        ClassHash(hash_constants::CLASS ^ xxh64(name.as_bytes(), 0))
    }

    /// Create a hash for a member of a class.
    ///
    /// Members with the same name on different classes hash differently.
    #[inline]
    pub fn from_member(class: ClassHash, member: &str) -> Self {
        ClassHash(hash_constants::MEMBER ^ xxh64(member.as_bytes(), class.0))
    }

    /// Check if this is the empty hash.
    #[inline]
    pub fn is_empty(self) -> bool {
        self == Self::EMPTY
    }
}

impl fmt::Debug for ClassHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassHash(0x{:016x})", self.0)
    }
}

impl fmt::Display for ClassHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}
