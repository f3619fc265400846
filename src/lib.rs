//! Bridges libxml2's global error hooks to Rust closures.
//!
//! libxml2 reports problems through two process-wide slots: a structured
//! handler receiving an `xmlError` record, and a printf-style generic
//! handler. [`ErrorBridge`] owns one closure per slot, installs a trampoline
//! for it, and resets the slot when the closure is removed or the bridge is
//! dropped.
//!
//! ```no_run
//! use xml_error_bridge::ErrorBridge;
//!
//! let mut bridge = ErrorBridge::system()?;
//! bridge.install_structured(|err| eprintln!("{err}"))?;
//! // ... parse with libxml2 ...
//! bridge.remove_structured();
//! # Ok::<(), xml_error_bridge::BridgeError>(())
//! ```

#![allow(non_camel_case_types)]
#![allow(non_snake_case)]

pub mod bridge;
pub mod error;
pub mod ffi;
pub mod record;
pub mod slots;

// Runtime loader for the system libxml2
pub mod libxml2_dynload;

pub use bridge::{ErrorBridge, SlotState};
pub use error::{BridgeError, Result, SlotKind};
pub use libxml2_dynload::{Libxml2, LIBXML2_PATH_ENV};
pub use record::{ErrorDomain, ErrorLevel, XmlError};
pub use slots::ErrorSlots;
