//! Ownership of the closures installed in libxml2's error slots.
//!
//! Each slot hands libxml2 a trampoline plus a pointer to a heap box owning
//! the closure. The box lives in the [`ErrorBridge`] until the slot is
//! removed, at which point libxml2 is reset first and the box dropped after.

use std::ffi::CStr;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

use libc::{c_char, c_void};

use crate::error::{BridgeError, Result, SlotKind};
use crate::ffi;
use crate::libxml2_dynload::Libxml2;
use crate::record::XmlError;
use crate::slots::ErrorSlots;

/// Registration state of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// No handler installed; libxml2 uses its default.
    Empty,
    /// Trampoline installed without a callback, swallowing errors.
    Silenced,
    /// Trampoline installed, forwarding to an owned callback.
    Installed,
}

enum Slot<C> {
    Empty,
    Silenced,
    Installed(Box<C>),
}

impl<C> Slot<C> {
    fn state(&self) -> SlotState {
        match self {
            Slot::Empty => SlotState::Empty,
            Slot::Silenced => SlotState::Silenced,
            Slot::Installed(_) => SlotState::Installed,
        }
    }

    fn context_ptr(&self) -> *mut c_void {
        match self {
            Slot::Installed(context) => &**context as *const C as *mut c_void,
            _ => ptr::null_mut(),
        }
    }
}

struct StructuredContext {
    callback: Box<dyn Fn(XmlError)>,
}

/// `forward` must stay the first field: the C trampoline reads it through
/// `struct xml_error_bridge_generic_ctx`.
#[repr(C)]
struct GenericContext {
    forward: ffi::GenericForwardFn,
    callback: Box<dyn Fn(&str)>,
}

/// Owner of the structured and generic error handlers registered with an
/// XML library.
///
/// At most one handler is owned per slot; installing over an occupied slot,
/// whether occupied by this bridge or by any other registration with a
/// context, fails with [`BridgeError::AlreadyRegistered`]. Dropping the bridge
/// removes both registrations.
///
/// libxml2 keeps these slots per thread in threaded builds, so the bridge
/// is neither `Send` nor `Sync`.
pub struct ErrorBridge<'lib, L: ErrorSlots + ?Sized> {
    library: &'lib L,
    structured: Slot<StructuredContext>,
    generic: Slot<GenericContext>,
    _not_send: PhantomData<*mut ()>,
}

impl ErrorBridge<'static, Libxml2> {
    /// A bridge over the process-wide system libxml2.
    pub fn system() -> Result<Self> {
        Ok(ErrorBridge::new(Libxml2::system()?))
    }
}

impl<'lib, L: ErrorSlots + ?Sized> ErrorBridge<'lib, L> {
    pub fn new(library: &'lib L) -> Self {
        ErrorBridge {
            library,
            structured: Slot::Empty,
            generic: Slot::Empty,
            _not_send: PhantomData,
        }
    }

    pub fn library(&self) -> &'lib L {
        self.library
    }

    pub fn structured_state(&self) -> SlotState {
        self.structured.state()
    }

    pub fn generic_state(&self) -> SlotState {
        self.generic.state()
    }

    /// Routes every structured error to `callback`, which receives its own
    /// copy of the record.
    pub fn install_structured<F>(&mut self, callback: F) -> Result<()>
    where
        F: Fn(XmlError) + 'static,
    {
        self.set_structured(Slot::Installed(Box::new(StructuredContext {
            callback: Box::new(callback),
        })))
    }

    /// Installs the trampoline with no callback, so structured errors are
    /// swallowed instead of reaching libxml2's default handler.
    ///
    /// A silenced slot registers a NULL context, so other bridges on the same
    /// library cannot see it through the context accessor and may install
    /// over it.
    pub fn silence_structured(&mut self) -> Result<()> {
        self.set_structured(Slot::Silenced)
    }

    /// Releases the owned callback and resets libxml2's structured slot.
    /// Does nothing if the slot is empty. The library slot is left alone when
    /// another handler has since registered a context there.
    pub fn remove_structured(&mut self) {
        if matches!(self.structured, Slot::Empty) {
            return;
        }

        let ours = self.structured.context_ptr();
        let current = self.library.structured_error_context();
        if current.is_null() || current == ours {
            unsafe { self.library.set_structured_error_func(ptr::null_mut(), None) };
        } else {
            tracing::warn!("structured error slot now belongs to another handler; leaving it installed");
        }
        self.structured = Slot::Empty;
        tracing::debug!("structured error handler removed");
    }

    /// Routes every generic error message to `callback`, fully rendered.
    pub fn install_generic<F>(&mut self, callback: F) -> Result<()>
    where
        F: Fn(&str) + 'static,
    {
        self.set_generic(Slot::Installed(Box::new(GenericContext {
            forward: forward_generic_error,
            callback: Box::new(callback),
        })))
    }

    /// Installs the trampoline with no callback, so generic errors are
    /// swallowed instead of reaching libxml2's default handler.
    ///
    /// A silenced slot registers a NULL context, so other bridges on the same
    /// library cannot see it through the context accessor and may install
    /// over it.
    pub fn silence_generic(&mut self) -> Result<()> {
        self.set_generic(Slot::Silenced)
    }

    pub fn remove_generic(&mut self) {
        if matches!(self.generic, Slot::Empty) {
            return;
        }

        let ours = self.generic.context_ptr();
        let current = self.library.generic_error_context();
        if current.is_null() || current == ours {
            unsafe { self.library.set_generic_error_func(ptr::null_mut(), None) };
        } else {
            tracing::warn!("generic error slot now belongs to another handler; leaving it installed");
        }
        self.generic = Slot::Empty;
        tracing::debug!("generic error handler removed");
    }

    /// Runs `f` with generic errors silenced, then removes the registration.
    pub fn with_generic_silenced<R>(&mut self, f: impl FnOnce() -> R) -> Result<R> {
        self.silence_generic()?;
        let result = panic::catch_unwind(AssertUnwindSafe(f));
        self.remove_generic();
        match result {
            Ok(value) => Ok(value),
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    fn set_structured(&mut self, slot: Slot<StructuredContext>) -> Result<()> {
        if !matches!(self.structured, Slot::Empty) {
            return Err(BridgeError::AlreadyRegistered {
                slot: SlotKind::Structured,
            });
        }
        if !self.library.structured_error_context().is_null() {
            return Err(BridgeError::AlreadyRegistered {
                slot: SlotKind::Structured,
            });
        }

        let state = slot.state();
        let ctx = slot.context_ptr();
        unsafe {
            self.library
                .set_structured_error_func(ctx, Some(structured_error_trampoline))
        };
        self.structured = slot;
        tracing::debug!(?state, "structured error handler installed");
        Ok(())
    }

    fn set_generic(&mut self, slot: Slot<GenericContext>) -> Result<()> {
        if !matches!(self.generic, Slot::Empty) {
            return Err(BridgeError::AlreadyRegistered {
                slot: SlotKind::Generic,
            });
        }
        if !self.library.generic_error_context().is_null() {
            return Err(BridgeError::AlreadyRegistered {
                slot: SlotKind::Generic,
            });
        }

        let state = slot.state();
        let ctx = slot.context_ptr();
        unsafe {
            self.library
                .set_generic_error_func(ctx, Some(ffi::xml_error_bridge_generic_trampoline))
        };
        self.generic = slot;
        tracing::debug!(?state, "generic error handler installed");
        Ok(())
    }
}

impl<L: ErrorSlots + ?Sized> Drop for ErrorBridge<'_, L> {
    fn drop(&mut self) {
        self.remove_structured();
        self.remove_generic();
    }
}

unsafe extern "C" fn structured_error_trampoline(user_data: *mut c_void, error: *const ffi::xmlError) {
    if user_data.is_null() || error.is_null() {
        return;
    }
    let context = &*(user_data as *const StructuredContext);
    let record = XmlError::from_raw(&*error);
    tracing::trace!(domain = %record.domain, code = record.code, "forwarding structured error");

    if panic::catch_unwind(AssertUnwindSafe(|| (context.callback)(record))).is_err() {
        tracing::error!("structured error callback panicked");
    }
}

unsafe extern "C" fn forward_generic_error(ctx: *mut c_void, msg: *const c_char) {
    if ctx.is_null() || msg.is_null() {
        return;
    }
    let context = &*(ctx as *const GenericContext);
    let text = CStr::from_ptr(msg).to_string_lossy();
    tracing::trace!(len = text.len(), "forwarding generic error");

    if panic::catch_unwind(AssertUnwindSafe(|| (context.callback)(&*text))).is_err() {
        tracing::error!("generic error callback panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ErrorDomain, ErrorLevel};
    use crate::slots::fake::FakeSlots;
    use proptest::prelude::*;
    use std::cell::RefCell;
    use std::ffi::CString;
    use std::rc::Rc;

    fn raw_error(domain: i32, code: i32, message: &CString, line: i32, column: i32) -> ffi::xmlError {
        ffi::xmlError {
            domain,
            code,
            message: message.as_ptr() as *mut c_char,
            level: ffi::XML_ERR_FATAL,
            file: ptr::null_mut(),
            line,
            str1: ptr::null_mut(),
            str2: ptr::null_mut(),
            str3: ptr::null_mut(),
            int1: 0,
            int2: column,
            ctxt: ptr::null_mut(),
            node: ptr::null_mut(),
        }
    }

    fn collector<T: 'static>() -> (Rc<RefCell<Vec<T>>>, Rc<RefCell<Vec<T>>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        (seen.clone(), seen)
    }

    #[test]
    fn test_structured_callback_receives_record() {
        let slots = FakeSlots::new();
        let mut bridge = ErrorBridge::new(&slots);
        let (seen, sink) = collector::<XmlError>();
        bridge
            .install_structured(move |err| sink.borrow_mut().push(err))
            .unwrap();
        assert_eq!(bridge.structured_state(), SlotState::Installed);

        let message = CString::new("Opening and ending tag mismatch: a line 1 and b\n").unwrap();
        assert!(slots.raise_structured(&raw_error(1, 76, &message, 1, 8)));

        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].domain, ErrorDomain::Parser);
        assert_eq!(seen[0].code, 76);
        assert_eq!(seen[0].level, ErrorLevel::Fatal);
        assert_eq!(seen[0].line, 1);
        assert_eq!(seen[0].column, 8);
        assert_eq!(seen[0].message, "Opening and ending tag mismatch: a line 1 and b\n");
    }

    #[test]
    fn test_structured_remove_clears_handler() {
        let slots = FakeSlots::new();
        let mut bridge = ErrorBridge::new(&slots);
        let (seen, sink) = collector::<XmlError>();
        bridge
            .install_structured(move |err| sink.borrow_mut().push(err))
            .unwrap();
        assert!(!slots.structured_error_context().is_null());

        bridge.remove_structured();
        assert_eq!(bridge.structured_state(), SlotState::Empty);
        assert!(!slots.structured_handler_installed());
        assert!(slots.structured_error_context().is_null());

        let message = CString::new("late").unwrap();
        assert!(!slots.raise_structured(&raw_error(1, 5, &message, 1, 1)));
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn test_remove_releases_callback() {
        let slots = FakeSlots::new();
        let mut bridge = ErrorBridge::new(&slots);
        let token = Rc::new(());
        let held = token.clone();
        bridge
            .install_structured(move |_| {
                let _ = &held;
            })
            .unwrap();
        assert_eq!(Rc::strong_count(&token), 2);

        bridge.remove_structured();
        assert_eq!(Rc::strong_count(&token), 1);
    }

    #[test]
    fn test_remove_without_registration_is_noop() {
        let slots = FakeSlots::new();
        let mut bridge = ErrorBridge::new(&slots);
        bridge.remove_structured();
        bridge.remove_generic();
        bridge.remove_structured();
        assert_eq!(bridge.structured_state(), SlotState::Empty);
        assert_eq!(bridge.generic_state(), SlotState::Empty);
        assert!(!slots.structured_handler_installed());
    }

    #[test]
    fn test_double_install_is_rejected() {
        let slots = FakeSlots::new();
        let mut bridge = ErrorBridge::new(&slots);
        let (seen, sink) = collector::<i32>();
        let first = sink.clone();
        bridge
            .install_structured(move |err| first.borrow_mut().push(err.code))
            .unwrap();

        let second = sink;
        let err = bridge
            .install_structured(move |_| second.borrow_mut().push(-1))
            .unwrap_err();
        assert!(matches!(
            err,
            BridgeError::AlreadyRegistered {
                slot: SlotKind::Structured
            }
        ));

        let message = CString::new("boom").unwrap();
        slots.raise_structured(&raw_error(1, 4, &message, 1, 1));
        assert_eq!(*seen.borrow(), vec![4]);
    }

    #[test]
    fn test_silence_blocks_both_kinds() {
        let slots = FakeSlots::new();
        let mut bridge = ErrorBridge::new(&slots);
        bridge.silence_structured().unwrap();
        bridge.silence_generic().unwrap();
        assert_eq!(bridge.structured_state(), SlotState::Silenced);
        assert_eq!(bridge.generic_state(), SlotState::Silenced);

        // Handlers stay installed so libxml2 does not fall back to stderr.
        assert!(slots.structured_handler_installed());
        assert!(slots.generic_handler_installed());
        assert!(slots.structured_error_context().is_null());

        let message = CString::new("ignored").unwrap();
        assert!(slots.raise_structured(&raw_error(1, 1, &message, 1, 1)));
        assert!(slots.raise_generic("ignored"));

        assert!(matches!(
            bridge.install_generic(|_| {}),
            Err(BridgeError::AlreadyRegistered {
                slot: SlotKind::Generic
            })
        ));
    }

    #[test]
    fn test_generic_callback_receives_text() {
        let slots = FakeSlots::new();
        let mut bridge = ErrorBridge::new(&slots);
        let (seen, sink) = collector::<String>();
        bridge
            .install_generic(move |msg| sink.borrow_mut().push(msg.to_string()))
            .unwrap();

        assert!(slots.raise_generic("Entity: line 1: parser error : unterminated entity reference"));
        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].contains("unterminated"));
    }

    #[test]
    fn test_generic_message_is_rendered() {
        let slots = FakeSlots::new();
        let mut bridge = ErrorBridge::new(&slots);
        let (seen, sink) = collector::<String>();
        bridge
            .install_generic(move |msg| sink.borrow_mut().push(msg.to_string()))
            .unwrap();

        slots.raise_generic_located("doc.xml", 3, "Comment not terminated");
        assert_eq!(*seen.borrow(), vec!["doc.xml:3: Comment not terminated".to_string()]);
    }

    #[test]
    fn test_generic_long_message() {
        let slots = FakeSlots::new();
        let mut bridge = ErrorBridge::new(&slots);
        let (seen, sink) = collector::<String>();
        bridge
            .install_generic(move |msg| sink.borrow_mut().push(msg.to_string()))
            .unwrap();

        let long = "x".repeat(4096);
        slots.raise_generic(&long);
        assert_eq!(seen.borrow()[0], long);
    }

    #[test]
    fn test_generic_remove_clears_handler() {
        let slots = FakeSlots::new();
        let mut bridge = ErrorBridge::new(&slots);
        let (seen, sink) = collector::<String>();
        bridge
            .install_generic(move |msg| sink.borrow_mut().push(msg.to_string()))
            .unwrap();
        bridge.remove_generic();

        assert!(!slots.raise_generic("after removal"));
        assert!(seen.borrow().is_empty());
        assert!(slots.generic_error_context().is_null());

        // The slot can be reused once emptied.
        bridge.install_generic(|_| {}).unwrap();
        assert_eq!(bridge.generic_state(), SlotState::Installed);
    }

    #[test]
    fn test_drop_removes_both() {
        let slots = FakeSlots::new();
        {
            let mut bridge = ErrorBridge::new(&slots);
            bridge.install_structured(|_| {}).unwrap();
            bridge.install_generic(|_| {}).unwrap();
        }
        assert!(!slots.structured_handler_installed());
        assert!(!slots.generic_handler_installed());
    }

    #[test]
    fn test_slots_are_independent() {
        let slots = FakeSlots::new();
        let mut bridge = ErrorBridge::new(&slots);
        bridge.install_structured(|_| {}).unwrap();
        bridge.install_generic(|_| {}).unwrap();

        bridge.remove_generic();
        assert_eq!(bridge.structured_state(), SlotState::Installed);
        assert!(slots.structured_handler_installed());
        assert!(!slots.generic_handler_installed());
    }

    #[test]
    fn test_panicking_callback_is_contained() {
        let slots = FakeSlots::new();
        let mut bridge = ErrorBridge::new(&slots);
        bridge.install_structured(|_| panic!("callback failure")).unwrap();
        bridge.install_generic(|_| panic!("callback failure")).unwrap();

        let message = CString::new("boom").unwrap();
        assert!(slots.raise_structured(&raw_error(1, 1, &message, 1, 1)));
        assert!(slots.raise_generic("boom"));
    }

    #[test]
    fn test_foreign_replacement_is_left_installed() {
        let slots = FakeSlots::new();
        let mut bridge = ErrorBridge::new(&slots);
        bridge.install_structured(|_| {}).unwrap();

        let mut foreign = 0u8;
        let foreign_ctx = &mut foreign as *mut u8 as *mut c_void;
        slots.hijack_structured(foreign_ctx);
        bridge.remove_structured();
        assert_eq!(bridge.structured_state(), SlotState::Empty);
        assert_eq!(slots.structured_error_context(), foreign_ctx);
        assert!(slots.structured_handler_installed());
    }

    #[test]
    fn test_second_bridge_cannot_take_occupied_slot() {
        let slots = FakeSlots::new();
        let mut first = ErrorBridge::new(&slots);
        let (seen, sink) = collector::<i32>();
        first
            .install_structured(move |err| sink.borrow_mut().push(err.code))
            .unwrap();
        let (messages, message_sink) = collector::<String>();
        first
            .install_generic(move |msg| message_sink.borrow_mut().push(msg.to_string()))
            .unwrap();

        {
            let mut second = ErrorBridge::new(&slots);
            assert!(matches!(
                second.install_structured(|_| {}),
                Err(BridgeError::AlreadyRegistered {
                    slot: SlotKind::Structured
                })
            ));
            assert!(matches!(
                second.install_generic(|_| {}),
                Err(BridgeError::AlreadyRegistered {
                    slot: SlotKind::Generic
                })
            ));
            assert_eq!(second.structured_state(), SlotState::Empty);
            assert_eq!(second.generic_state(), SlotState::Empty);
        }

        // Dropping the rejected bridge must not clear the first one's slots.
        assert_eq!(first.structured_state(), SlotState::Installed);
        let message = CString::new("still routed").unwrap();
        assert!(slots.raise_structured(&raw_error(1, 9, &message, 1, 1)));
        assert!(slots.raise_generic("still routed"));
        assert_eq!(*seen.borrow(), vec![9]);
        assert_eq!(*messages.borrow(), vec!["still routed".to_string()]);
    }

    #[test]
    fn test_remove_after_takeover_keeps_other_bridge() {
        let slots = FakeSlots::new();
        let mut first = ErrorBridge::new(&slots);
        first.silence_structured().unwrap();

        // A silenced slot has a NULL context, so a second bridge can install.
        let mut second = ErrorBridge::new(&slots);
        let (seen, sink) = collector::<i32>();
        second
            .install_structured(move |err| sink.borrow_mut().push(err.code))
            .unwrap();

        first.remove_structured();
        assert_eq!(first.structured_state(), SlotState::Empty);
        let message = CString::new("kept").unwrap();
        assert!(slots.raise_structured(&raw_error(1, 3, &message, 1, 1)));
        assert_eq!(*seen.borrow(), vec![3]);
    }

    #[test]
    fn test_with_generic_silenced() {
        let slots = FakeSlots::new();
        let mut bridge = ErrorBridge::new(&slots);
        let value = bridge
            .with_generic_silenced(|| {
                assert!(slots.generic_handler_installed());
                slots.raise_generic("swallowed");
                42
            })
            .unwrap();
        assert_eq!(value, 42);
        assert_eq!(bridge.generic_state(), SlotState::Empty);
        assert!(!slots.generic_handler_installed());
    }

    #[test]
    fn test_with_generic_silenced_requires_empty_slot() {
        let slots = FakeSlots::new();
        let mut bridge = ErrorBridge::new(&slots);
        bridge.install_generic(|_| {}).unwrap();
        assert!(bridge.with_generic_silenced(|| ()).is_err());
        assert_eq!(bridge.generic_state(), SlotState::Installed);
    }

    proptest! {
        #[test]
        fn prop_structured_record_delivered_once(
            domain in 0i32..=30,
            code in 0i32..2000,
            line in 0i32..100_000,
            column in 0i32..1000,
            message in "[a-zA-Z0-9 :<>/]{0,64}",
        ) {
            let slots = FakeSlots::new();
            let mut bridge = ErrorBridge::new(&slots);
            let (seen, sink) = collector::<XmlError>();
            bridge.install_structured(move |err| sink.borrow_mut().push(err)).unwrap();

            let c_message = CString::new(message.clone()).unwrap();
            slots.raise_structured(&raw_error(domain, code, &c_message, line, column));

            let seen = seen.borrow();
            prop_assert_eq!(seen.len(), 1);
            prop_assert_eq!(seen[0].domain as i32, domain);
            prop_assert_eq!(seen[0].code, code);
            prop_assert_eq!(seen[0].line, line);
            prop_assert_eq!(seen[0].column, column);
            prop_assert_eq!(&seen[0].message, &message);
        }

        #[test]
        fn prop_generic_text_passes_through(message in "[a-zA-Z0-9 .,:;'-]{0,300}") {
            let slots = FakeSlots::new();
            let mut bridge = ErrorBridge::new(&slots);
            let (seen, sink) = collector::<String>();
            bridge.install_generic(move |msg| sink.borrow_mut().push(msg.to_string())).unwrap();

            slots.raise_generic(&message);
            let seen = seen.borrow();
            prop_assert_eq!(seen.len(), 1);
            prop_assert_eq!(&seen[0], &message);
        }
    }
}
