use std::env;
use std::path::Path;
use std::ptr;
use std::sync::OnceLock;

use libc::c_void;
use libloading::Library;

use crate::error::{BridgeError, Result};
use crate::ffi::{
    xmlErrorContextAccessorFn, xmlGenericErrorFunc, xmlInitParserFn, xmlSetGenericErrorFuncFn,
    xmlSetStructuredErrorFuncFn, xmlStructuredErrorFunc,
};
use crate::slots::ErrorSlots;

/// Environment variable naming an explicit libxml2 shared library.
pub const LIBXML2_PATH_ENV: &str = "XML_ERROR_BRIDGE_LIBXML2";

static SYSTEM_LIBRARY: OnceLock<std::result::Result<Libxml2, String>> = OnceLock::new();

/// A libxml2 shared library loaded at runtime, with the error-slot entry
/// points resolved.
pub struct Libxml2 {
    set_structured_error_func: xmlSetStructuredErrorFuncFn,
    set_generic_error_func: xmlSetGenericErrorFuncFn,
    structured_error_context: Option<xmlErrorContextAccessorFn>,
    generic_error_context: Option<xmlErrorContextAccessorFn>,
    // Declared last so the function pointers above never outlive it.
    library: Library,
}

impl Libxml2 {
    /// Loads libxml2 from an explicit path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let library = unsafe { Library::new(path) }.map_err(|source| BridgeError::Load {
            path: path.display().to_string(),
            source,
        })?;
        let libxml2 = Self::from_library(library)?;
        tracing::debug!(path = %path.display(), "loaded libxml2");
        Ok(libxml2)
    }

    /// Searches the usual places for libxml2: `XML_ERROR_BRIDGE_LIBXML2`,
    /// the platform sonames, then a glob over common library directories.
    pub fn load() -> Result<Self> {
        let mut tried = Vec::new();

        if let Ok(path) = env::var(LIBXML2_PATH_ENV) {
            // An explicit path that fails to load is an error, not a fallthrough.
            return Self::open(path);
        }

        for name in library_names() {
            match Self::open(name) {
                Ok(lib) => return Ok(lib),
                Err(err @ BridgeError::MissingSymbol { .. }) => return Err(err),
                Err(err) => {
                    tracing::trace!(%name, error = %err, "libxml2 candidate rejected");
                    tried.push(name.to_string());
                }
            }
        }

        // Fallback: find the library using glob patterns
        for pattern in glob_patterns() {
            if let Ok(entries) = glob::glob(pattern) {
                for entry in entries.flatten() {
                    match Self::open(&entry) {
                        Ok(lib) => return Ok(lib),
                        Err(_) => tried.push(entry.display().to_string()),
                    }
                }
            }
        }

        Err(BridgeError::LibraryNotFound { tried })
    }

    /// Process-wide libxml2, loaded on first use with [`Libxml2::load`].
    pub fn system() -> Result<&'static Libxml2> {
        SYSTEM_LIBRARY
            .get_or_init(|| Libxml2::load().map_err(|err| err.to_string()))
            .as_ref()
            .map_err(|reason| BridgeError::Unavailable {
                reason: reason.clone(),
            })
    }

    fn from_library(library: Library) -> Result<Self> {
        unsafe {
            let set_structured_error_func =
                *required::<xmlSetStructuredErrorFuncFn>(&library, "xmlSetStructuredErrorFunc")?;
            let set_generic_error_func =
                *required::<xmlSetGenericErrorFuncFn>(&library, "xmlSetGenericErrorFunc")?;
            let structured_error_context =
                optional::<xmlErrorContextAccessorFn>(&library, "__xmlStructuredErrorContext");
            let generic_error_context =
                optional::<xmlErrorContextAccessorFn>(&library, "__xmlGenericErrorContext");

            if let Some(init) = optional::<xmlInitParserFn>(&library, "xmlInitParser") {
                init();
            }

            Ok(Libxml2 {
                set_structured_error_func,
                set_generic_error_func,
                structured_error_context,
                generic_error_context,
                library,
            })
        }
    }

    /// The underlying library, for resolving entry points the bridge does
    /// not wrap.
    pub fn library(&self) -> &Library {
        &self.library
    }
}

impl ErrorSlots for Libxml2 {
    unsafe fn set_structured_error_func(&self, ctx: *mut c_void, handler: xmlStructuredErrorFunc) {
        (self.set_structured_error_func)(ctx, handler)
    }

    fn structured_error_context(&self) -> *mut c_void {
        read_context(self.structured_error_context)
    }

    unsafe fn set_generic_error_func(&self, ctx: *mut c_void, handler: xmlGenericErrorFunc) {
        (self.set_generic_error_func)(ctx, handler)
    }

    fn generic_error_context(&self) -> *mut c_void {
        read_context(self.generic_error_context)
    }
}

fn read_context(accessor: Option<xmlErrorContextAccessorFn>) -> *mut c_void {
    match accessor {
        Some(accessor) => unsafe {
            let slot = accessor();
            if slot.is_null() {
                ptr::null_mut()
            } else {
                *slot
            }
        },
        None => ptr::null_mut(),
    }
}

unsafe fn required<'lib, T>(
    library: &'lib Library,
    symbol: &'static str,
) -> Result<libloading::Symbol<'lib, T>> {
    library
        .get::<T>(symbol.as_bytes())
        .map_err(|source| BridgeError::MissingSymbol { symbol, source })
}

unsafe fn optional<T: Copy>(library: &Library, symbol: &str) -> Option<T> {
    library.get::<T>(symbol.as_bytes()).ok().map(|sym| *sym)
}

fn library_names() -> &'static [&'static str] {
    if cfg!(target_os = "windows") {
        &["libxml2.dll", "libxml2-2.dll"]
    } else if cfg!(target_os = "macos") {
        &["libxml2.2.dylib", "libxml2.dylib"]
    } else {
        &["libxml2.so.2", "libxml2.so"]
    }
}

fn glob_patterns() -> &'static [&'static str] {
    if cfg!(target_os = "windows") {
        &[]
    } else if cfg!(target_os = "macos") {
        &[
            "/opt/homebrew/opt/libxml2/lib/libxml2*.dylib",
            "/usr/local/opt/libxml2/lib/libxml2*.dylib",
        ]
    } else {
        &[
            "/usr/lib/*/libxml2.so*",
            "/usr/lib64/libxml2.so*",
            "/usr/local/lib/libxml2.so*",
        ]
    }
}
