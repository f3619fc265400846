//! The two libxml2 registration points the bridge drives.

use libc::c_void;

use crate::ffi::{xmlGenericErrorFunc, xmlStructuredErrorFunc};

/// Global error-handler registration API of an XML library.
///
/// Implemented by [`crate::Libxml2`] for a real libxml2, and by test doubles.
pub trait ErrorSlots {
    /// Installs `handler` with `ctx` as its user data. A `None` handler
    /// restores the library default.
    ///
    /// # Safety
    ///
    /// `ctx` must stay valid for as long as `handler` can be invoked with it.
    unsafe fn set_structured_error_func(&self, ctx: *mut c_void, handler: xmlStructuredErrorFunc);

    /// Context currently registered in the structured slot, or NULL when
    /// empty or unknown.
    fn structured_error_context(&self) -> *mut c_void;

    /// # Safety
    ///
    /// Same contract as [`ErrorSlots::set_structured_error_func`].
    unsafe fn set_generic_error_func(&self, ctx: *mut c_void, handler: xmlGenericErrorFunc);

    fn generic_error_context(&self) -> *mut c_void;
}
