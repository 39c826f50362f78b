//! Error types shared by every slotproxy layer.

use std::fmt;

use thiserror::Error;

use crate::auth::Action;
use crate::{Address, Revert, SignatureError};

/// Why a storage layout declaration was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutConflictKind {
    /// A module base falls inside the proxy's reserved slots.
    OverlapsProxy { base: u64, reserved: u64 },
    /// A re-declaration dropped, reordered, or retyped a shipped field.
    NotAppendOnly {
        position: usize,
        shipped: String,
        declared: Option<String>,
    },
    /// The module's slots collide with another owner's range.
    OverlapsModule {
        other: String,
        start: u64,
        end: u64,
    },
    /// A re-declaration asked for a different base than the shipped one.
    BaseMoved { shipped: u64, requested: u64 },
    /// The slot range does not fit in the slot space.
    OutOfSlots,
}

impl fmt::Display for LayoutConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutConflictKind::OverlapsProxy { base, reserved } => write!(
                f,
                "base slot {} is inside the proxy reservation [0, {})",
                base, reserved
            ),
            LayoutConflictKind::NotAppendOnly {
                position,
                shipped,
                declared: Some(declared),
            } => write!(
                f,
                "field {} was '{}' and is now '{}'; fields may only be appended",
                position, shipped, declared
            ),
            LayoutConflictKind::NotAppendOnly {
                position,
                shipped,
                declared: None,
            } => write!(
                f,
                "field {} ('{}') was removed; fields may only be appended",
                position, shipped
            ),
            LayoutConflictKind::OverlapsModule { other, start, end } => {
                write!(f, "slots [{}, {}) are owned by '{}'", start, end, other)
            }
            LayoutConflictKind::BaseMoved { shipped, requested } => write!(
                f,
                "base moved from slot {} to slot {}",
                shipped, requested
            ),
            LayoutConflictKind::OutOfSlots => write!(f, "layout exceeds the slot space"),
        }
    }
}

/// Errors across the allocator, registries, proxies, and version manager.
#[derive(Debug, Error)]
pub enum Error {
    /// A storage layout declaration would corrupt persisted state.
    #[error("layout conflict for '{owner}': {kind}")]
    LayoutConflict {
        owner: String,
        kind: LayoutConflictKind,
    },

    /// A lookup found no entry.
    #[error("not found: {key}")]
    NotFound { key: String },

    /// A signature (or its selector) is already bound elsewhere.
    #[error(
        "signature conflict for '{signature}': selector already bound to '{existing_signature}' at {existing}, requested {requested}"
    )]
    SignatureConflict {
        signature: String,
        existing_signature: String,
        existing: Address,
        requested: Address,
    },

    /// A proxy could not route a call.
    #[error("unresolved target for {key}")]
    UnresolvedTarget { key: String },

    /// A mutating operation was invoked by a caller without the right.
    #[error("{caller} is not authorized to {action}")]
    Unauthorized { caller: Address, action: Action },

    /// A forwarded call failed; the module's revert data is unchanged.
    #[error(transparent)]
    Reverted(Revert),

    /// An upgrade asked to move an instance to an older version.
    #[error("{proxy} is on version {current}; moving to {requested} requires a rollback")]
    Downgrade {
        proxy: Address,
        current: u64,
        requested: u64,
    },

    /// A rollback asked to move an instance forward or nowhere.
    #[error("{proxy} is on version {current}; cannot roll back to {requested}")]
    InvalidRollback {
        proxy: Address,
        current: u64,
        requested: u64,
    },

    #[error(transparent)]
    InvalidSignature(#[from] SignatureError),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Configuration or manifest error.
    #[error("config error: {message}")]
    Config { message: String },
}

impl Error {
    pub fn not_found(key: impl fmt::Display) -> Self {
        Error::NotFound {
            key: key.to_string(),
        }
    }

    pub fn unresolved(key: impl fmt::Display) -> Self {
        Error::UnresolvedTarget {
            key: key.to_string(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
        }
    }

    pub fn layout(owner: impl Into<String>, kind: LayoutConflictKind) -> Self {
        Error::LayoutConflict {
            owner: owner.into(),
            kind,
        }
    }

    /// The module revert carried by this error, if any.
    pub fn revert(&self) -> Option<&Revert> {
        match self {
            Error::Reverted(revert) => Some(revert),
            _ => None,
        }
    }
}

/// Result alias for slotproxy operations.
pub type Result<T> = std::result::Result<T, Error>;
