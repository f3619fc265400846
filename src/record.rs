//! Owned copy of libxml2's structured error record.

use std::ffi::CStr;
use std::fmt;

use libc::{c_char, c_int};

use crate::ffi;

/// How consequent an error is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorLevel {
    None,
    Warning,
    Error,
    Fatal,
}

impl ErrorLevel {
    pub fn from_raw(level: c_int) -> Self {
        match level {
            ffi::XML_ERR_NONE => ErrorLevel::None,
            ffi::XML_ERR_WARNING => ErrorLevel::Warning,
            ffi::XML_ERR_ERROR => ErrorLevel::Error,
            ffi::XML_ERR_FATAL => ErrorLevel::Fatal,
            _ => ErrorLevel::None,
        }
    }
}

impl fmt::Display for ErrorLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

macro_rules! error_domains {
    ($($variant:ident = $value:literal => $name:literal,)*) => {
        /// The part of libxml2 that raised an error (`xmlErrorDomain`).
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(i32)]
        pub enum ErrorDomain {
            $($variant = $value,)*
        }

        impl ErrorDomain {
            /// Unknown domains map to [`ErrorDomain::None`].
            pub fn from_raw(domain: c_int) -> Self {
                match domain {
                    $($value => ErrorDomain::$variant,)*
                    _ => ErrorDomain::None,
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $(ErrorDomain::$variant => $name,)*
                }
            }
        }
    };
}

error_domains! {
    None = 0 => "None",
    Parser = 1 => "Parser",
    Tree = 2 => "Tree",
    Namespace = 3 => "Namespace",
    Dtd = 4 => "DTD",
    Html = 5 => "HTML",
    Memory = 6 => "Memory",
    Output = 7 => "Output",
    Io = 8 => "IO",
    Ftp = 9 => "FTP",
    Http = 10 => "HTTP",
    XInclude = 11 => "XInclude",
    XPath = 12 => "XPath",
    XPointer = 13 => "XPointer",
    Regexp = 14 => "Regexp",
    Datatype = 15 => "Datatype",
    SchemasP = 16 => "SchemasP",
    SchemasV = 17 => "SchemasV",
    RelaxNgP = 18 => "RelaxNGP",
    RelaxNgV = 19 => "RelaxNGV",
    Catalog = 20 => "Catalog",
    C14n = 21 => "C14N",
    Xslt = 22 => "XSLT",
    Valid = 23 => "Valid",
    Check = 24 => "Check",
    Writer = 25 => "Writer",
    Module = 26 => "Module",
    I18n = 27 => "I18N",
    SchematronV = 28 => "SchematronV",
    Buffer = 29 => "Buffer",
    Uri = 30 => "URI",
}

impl fmt::Display for ErrorDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A structured parse or processing error, copied out of libxml2.
///
/// libxml2 reuses the storage behind its records, so everything is copied
/// while the handler runs. The `ctxt` and `node` pointers are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlError {
    pub domain: ErrorDomain,
    pub code: i32,
    /// Human-readable message; empty when libxml2 supplied none.
    pub message: String,
    pub level: ErrorLevel,
    pub file: Option<String>,
    pub line: i32,
    /// Column number, or 0 if not available.
    pub column: i32,
    pub str1: Option<String>,
    pub str2: Option<String>,
    pub str3: Option<String>,
    pub int1: i32,
}

impl XmlError {
    /// A fatal error carrying only a message.
    pub fn with_message(message: impl Into<String>) -> Self {
        XmlError {
            domain: ErrorDomain::None,
            code: 0,
            message: message.into(),
            level: ErrorLevel::Fatal,
            file: None,
            line: 0,
            column: 0,
            str1: None,
            str2: None,
            str3: None,
            int1: 0,
        }
    }

    /// Copies a raw libxml2 record.
    ///
    /// # Safety
    ///
    /// Every non-NULL string pointer in `raw` must point to a valid
    /// NUL-terminated string for the duration of the call.
    pub unsafe fn from_raw(raw: &ffi::xmlError) -> Self {
        XmlError {
            domain: ErrorDomain::from_raw(raw.domain),
            code: raw.code,
            message: copy_c_string(raw.message).unwrap_or_default(),
            level: ErrorLevel::from_raw(raw.level),
            file: copy_c_string(raw.file),
            line: raw.line,
            column: raw.int2,
            str1: copy_c_string(raw.str1),
            str2: copy_c_string(raw.str2),
            str3: copy_c_string(raw.str3),
            int1: raw.int1,
        }
    }
}

impl fmt::Display for XmlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{}:{}]: {}",
            self.domain, self.level, self.line, self.column, self.message
        )
    }
}

impl std::error::Error for XmlError {}

unsafe fn copy_c_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
}
