//! Hand-written binding to the error-reporting corner of libxml2.
//!
//! Only the record layout and the handler signatures are declared here; the
//! registration functions themselves are resolved at runtime by
//! [`crate::libxml2_dynload`].

use libc::{c_char, c_int, c_void};

pub const XML_ERR_NONE: c_int = 0;
pub const XML_ERR_WARNING: c_int = 1;
pub const XML_ERR_ERROR: c_int = 2;
pub const XML_ERR_FATAL: c_int = 3;

/// `struct _xmlError` from `libxml/xmlerror.h`.
#[repr(C)]
#[derive(Debug)]
pub struct xmlError {
    pub domain: c_int,
    pub code: c_int,
    pub message: *mut c_char,
    pub level: c_int,
    pub file: *mut c_char,
    pub line: c_int,
    pub str1: *mut c_char,
    pub str2: *mut c_char,
    pub str3: *mut c_char,
    pub int1: c_int,
    /// Column number, when known.
    pub int2: c_int,
    pub ctxt: *mut c_void,
    pub node: *mut c_void,
}

pub type xmlStructuredErrorFunc =
    Option<unsafe extern "C" fn(user_data: *mut c_void, error: *const xmlError)>;

pub type xmlGenericErrorFunc =
    Option<unsafe extern "C" fn(ctx: *mut c_void, msg: *const c_char, ...)>;

pub type xmlSetStructuredErrorFuncFn =
    unsafe extern "C" fn(ctx: *mut c_void, handler: xmlStructuredErrorFunc);

pub type xmlSetGenericErrorFuncFn =
    unsafe extern "C" fn(ctx: *mut c_void, handler: xmlGenericErrorFunc);

/// `__xmlStructuredErrorContext` / `__xmlGenericErrorContext`: address of
/// the (possibly thread-local) context global.
pub type xmlErrorContextAccessorFn = unsafe extern "C" fn() -> *mut *mut c_void;

pub type xmlInitParserFn = unsafe extern "C" fn();

/// Rust half of the generic trampoline; stored first in the context the C
/// shim receives.
pub type GenericForwardFn = unsafe extern "C" fn(ctx: *mut c_void, msg: *const c_char);

extern "C" {
    /// Defined in `csrc/generic_trampoline.c`.
    pub fn xml_error_bridge_generic_trampoline(ctx: *mut c_void, msg: *const c_char, ...);
}
