//! Errors raised by the bridge itself.
//!
//! Parse errors coming out of libxml2 are not represented here; they are
//! payloads delivered to the installed callbacks as [`crate::XmlError`].

use std::fmt;

use thiserror::Error;

/// Which libxml2 error slot an operation concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Structured,
    Generic,
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotKind::Structured => f.write_str("structured"),
            SlotKind::Generic => f.write_str("generic"),
        }
    }
}

#[derive(Debug, Error)]
pub enum BridgeError {
    /// The slot already owns a handler; remove it before installing another.
    #[error("a {slot} error handler is already registered")]
    AlreadyRegistered { slot: SlotKind },

    /// No libxml2 shared library could be found.
    #[error("libxml2 shared library not found, tried: {tried:?}")]
    LibraryNotFound { tried: Vec<String> },

    #[error("failed to load libxml2 from {path}: {source}")]
    Load {
        path: String,
        #[source]
        source: libloading::Error,
    },

    #[error("libxml2 is missing required symbol {symbol}: {source}")]
    MissingSymbol {
        symbol: &'static str,
        #[source]
        source: libloading::Error,
    },

    /// An earlier process-wide load attempt failed; the reason is cached.
    #[error("system libxml2 unavailable: {reason}")]
    Unavailable { reason: String },
}

pub type Result<T> = std::result::Result<T, BridgeError>;
