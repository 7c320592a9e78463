//! Error types for the object bridge.
//!
//! ## Error Hierarchy
//!
//! ```text
//! Error (top-level wrapper)
//! ├── RegistrationError   - class/promotion/serializer registration (start-up)
//! ├── BridgeError         - push, pull, and member dispatch (script boundary)
//! │   └── ConversionError - value conversion failures
//! └── SerializationError  - persisting and restoring object references
//! ```
//!
//! Registration errors are programmer errors and abort start-up. Bridge
//! errors abort the current script call; the host continues. Serialization
//! errors let a save/load routine reject corrupt data without panicking.

use std::fmt;

use thiserror::Error;

// ============================================================================
// Registration Errors
// ============================================================================

/// Errors raised while building the class, promotion, and serializer tables.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// The same name was registered twice in one table.
    #[error("{kind} '{name}' is already registered")]
    DuplicateRegistration { name: String, kind: &'static str },

    /// A class names a parent that has not been registered yet.
    #[error("class '{class}' names unknown parent '{parent}'")]
    UnknownParent { class: String, parent: String },

    /// A promotion or serializer refers to an unregistered class.
    #[error("class '{0}' is not registered")]
    UnknownClass(String),

    /// The derived class of a promotion does not descend from its base.
    #[error("cannot promote '{base}' to '{derived}': not a subclass")]
    InvalidPromotion { base: String, derived: String },

    /// The class name cannot appear on its own line of a saved token.
    #[error("invalid class name {name:?}: {reason}")]
    InvalidClassName { name: String, reason: &'static str },
}

impl RegistrationError {
    pub(crate) fn duplicate(name: impl Into<String>, kind: &'static str) -> Self {
        RegistrationError::DuplicateRegistration {
            name: name.into(),
            kind,
        }
    }
}

// ============================================================================
// Conversion Errors
// ============================================================================

/// Errors converting between script values and Rust types.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    /// Type mismatch during conversion
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    /// Integer overflow during conversion
    #[error("integer overflow: value {value} does not fit in {target_type}")]
    IntegerOverflow { value: i64, target_type: &'static str },

    /// Number has a fractional part where an integer was expected
    #[error("number {value} cannot be represented as {target_type}")]
    NotAnInteger { value: f64, target_type: &'static str },
}

// ============================================================================
// Bridge Errors
// ============================================================================

/// Why a stack slot yielded no object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundReason {
    /// The slot is absent or nil.
    Empty,
    /// The slot holds a proxy whose entity has been deleted.
    Deleted,
}

impl fmt::Display for NotFoundReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotFoundReason::Empty => write!(f, "slot is empty"),
            NotFoundReason::Deleted => write!(f, "object is no longer valid"),
        }
    }
}

/// Errors surfaced to scripts at the bridge boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    /// No live object at the requested stack index.
    #[error("no object at stack index {index}: {reason}")]
    NotFound { index: i32, reason: NotFoundReason },

    /// The value cannot be used as the requested class.
    #[error("object on stack has type {actual} which can not be used as type {expected}")]
    TypeMismatch { expected: String, actual: String },

    /// No method, attribute, or metamethod with this name on the class chain.
    #[error("'{class}' has no member '{member}'")]
    NoSuchMember { class: String, member: String },

    /// Attribute has a getter but no setter.
    #[error("attribute '{attribute}' of '{class}' is read-only")]
    ReadOnlyAttribute { class: String, attribute: String },

    /// Class name is not registered.
    #[error("class '{0}' is not registered")]
    UnknownClass(String),

    /// Class chain has no property map accessor.
    #[error("'{class}' objects do not carry properties")]
    NoPropertyMap { class: String },

    /// The entity is borrowed in a conflicting way by an outer call.
    #[error("'{class}' object is already in use")]
    EntityBorrowed { class: String },

    /// Error converting arguments or return values.
    #[error("conversion error: {0}")]
    Conversion(#[from] ConversionError),

    /// Error raised by a native method.
    #[error("native error: {message}")]
    Native { message: String },
}

impl BridgeError {
    /// Create a native method error.
    pub fn native(message: impl Into<String>) -> Self {
        BridgeError::Native {
            message: message.into(),
        }
    }

    pub(crate) fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        BridgeError::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Check if this error reports use of a deleted entity.
    pub fn is_use_after_free(&self) -> bool {
        matches!(
            self,
            BridgeError::NotFound {
                reason: NotFoundReason::Deleted,
                ..
            }
        )
    }

    /// Check if this error reports a missing object.
    pub fn is_not_found(&self) -> bool {
        matches!(self, BridgeError::NotFound { .. })
    }

    /// Check if this error reports a type mismatch.
    pub fn is_type_mismatch(&self) -> bool {
        matches!(self, BridgeError::TypeMismatch { .. })
    }
}

// ============================================================================
// Serialization Errors
// ============================================================================

/// Errors persisting or restoring object references.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SerializationError {
    /// The class has no serializer pair of its own.
    #[error("no registered serializer for type {class}")]
    NoSerializer { class: String },

    /// A token names a class that is not registered.
    #[error("token names unknown class '{0}'")]
    UnknownClass(String),

    /// The stream ended partway through a token.
    #[error("truncated token at byte {offset}")]
    Truncated { offset: usize },

    /// A payload could not be parsed.
    #[error("malformed {class} payload '{payload}': {reason}")]
    Malformed {
        class: String,
        payload: String,
        reason: String,
    },

    /// A payload index does not name a live object in the rebuilt container.
    #[error("{class} index {index} out of range (container holds {len})")]
    OutOfRange { class: String, index: i64, len: usize },

    /// Attempted to encode a proxy whose entity has been deleted.
    #[error("cannot encode deleted {class} object")]
    DeadObject { class: String },

    /// An encoder produced a payload that cannot be framed.
    #[error("{class} encoder produced an unframeable payload '{payload}'")]
    InvalidPayload { class: String, payload: String },

    /// Only objects and nil can be persisted as references.
    #[error("cannot persist a {actual} as an object reference")]
    NotAnObject { actual: &'static str },

    /// A decoder failed while pushing the restored object.
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl SerializationError {
    /// Create a malformed-payload error.
    pub fn malformed(
        class: impl Into<String>,
        payload: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        SerializationError::Malformed {
            class: class.into(),
            payload: payload.into(),
            reason: reason.into(),
        }
    }

    /// Create an out-of-range index error.
    pub fn out_of_range(class: impl Into<String>, index: i64, len: usize) -> Self {
        SerializationError::OutOfRange {
            class: class.into(),
            index,
            len,
        }
    }
}

// ============================================================================
// Top-level Error
// ============================================================================

/// Unified error type for all bridge operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Serialization(#[from] SerializationError),
}

impl Error {
    pub fn is_registration(&self) -> bool {
        matches!(self, Error::Registration(_))
    }

    pub fn is_bridge(&self) -> bool {
        matches!(self, Error::Bridge(_))
    }

    pub fn is_serialization(&self) -> bool {
        matches!(self, Error::Serialization(_))
    }
}

impl From<ConversionError> for Error {
    fn from(err: ConversionError) -> Self {
        Error::Bridge(err.into())
    }
}
