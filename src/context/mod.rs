//! Handle context - the state every handle-level call runs against
//!
//! Design: One context owns:
//! 1. The handle table (translation between handles and references)
//! 2. The error indicator (set on failure, alongside a NULL result)
//! 3. The call strategy, fixed when the context is created
//! 4. Call counters for monitoring
//!
//! Locks are held only for the duration of a single table or indicator
//! access, never across a call into foreign code, so target functions may
//! re-enter the context freely.


use crate::call::CallStrategy;
use crate::config::ShimConfig;
use crate::fatal::abort_on_violation;
use crate::handles::{DebugHandle, Handle, HandleTable};
use crate::logging::{debug, log_call_failure, trace};
use crate::object::{ExceptionKind, PyErr, PyObject, PyResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct HandleContext {
    handles: Mutex<HandleTable>,
    error: Mutex<Option<PyErr>>,
    strategy: CallStrategy,
    counters: CallCounters,
}

#[derive(Default)]
struct CallCounters {
    calls_made: AtomicUsize,
    call_failures: AtomicUsize,
    trampoline_dispatches: AtomicUsize,
}

/// Call statistics for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallStats {
    pub calls_made: usize,
    pub call_failures: usize,
    pub trampoline_dispatches: usize,
}

impl HandleContext {
    /// Context for the default (modern) host runtime
    pub fn new() -> Self {
        Self::from_config(&ShimConfig::default())
    }

    pub fn from_config(config: &ShimConfig) -> Self {
        Self::with_strategy(config.strategy())
    }

    pub fn with_strategy(strategy: CallStrategy) -> Self {
        debug!(?strategy, "handle context created");
        Self {
            handles: Mutex::new(HandleTable::new()),
            error: Mutex::new(None),
            strategy,
            counters: CallCounters::default(),
        }
    }

    #[inline]
    pub fn strategy(&self) -> CallStrategy {
        self.strategy
    }

    // ------------------------------------------------------------------
    // Handle translation
    // ------------------------------------------------------------------

    /// Open a handle owning `object`
    pub fn new_handle(&self, object: PyObject) -> Handle {
        let h = self.handles.lock().open(object);
        trace!(handle = h.raw(), "handle opened");
        h
    }

    /// Reference behind `handle`; `None` for `Handle::NULL`
    ///
    /// A non-null handle that is not open is a contract violation and
    /// aborts the process.
    pub fn to_object(&self, handle: Handle) -> Option<PyObject> {
        if handle.is_null() {
            return None;
        }
        match self.handles.lock().resolve(handle) {
            Some(object) => Some(object.clone()),
            None => abort_on_violation(&format!(
                "handle 0x{:x} does not refer to an open object",
                handle.raw()
            )),
        }
    }

    /// Close `handle`; closing `Handle::NULL` is a no-op
    pub fn close(&self, handle: Handle) {
        if handle.is_null() {
            return;
        }
        // drop the released reference outside the table lock
        let released = self.handles.lock().close(handle);
        if released.is_none() {
            abort_on_violation(&format!(
                "closing handle 0x{:x} which is not open",
                handle.raw()
            ));
        }
        trace!(handle = handle.raw(), "handle closed");
    }

    pub fn dup(&self, handle: Handle) -> Handle {
        if handle.is_null() {
            return Handle::NULL;
        }
        match self.handles.lock().dup(handle) {
            Some(h) => h,
            None => abort_on_violation(&format!(
                "duplicating handle 0x{:x} which is not open",
                handle.raw()
            )),
        }
    }

    #[inline]
    pub fn is_null(&self, handle: Handle) -> bool {
        handle.is_null()
    }

    /// Number of open handles
    pub fn handle_count(&self) -> usize {
        self.handles.lock().len()
    }

    pub fn new_generation(&self) -> u64 {
        self.handles.lock().new_generation()
    }

    pub fn open_handles(&self, generation: u64) -> Vec<DebugHandle> {
        self.handles.lock().open_handles(generation)
    }

    /// Convert a handle returned by foreign code into an owned reference
    ///
    /// The handle is closed; `Handle::NULL` maps to `None` with the error
    /// indicator left as the callee set it.
    pub fn take_result(&self, handle: Handle) -> Option<PyObject> {
        if handle.is_null() {
            return None;
        }
        let object = self.to_object(handle);
        self.close(handle);
        object
    }

    // ------------------------------------------------------------------
    // Object helpers
    // ------------------------------------------------------------------

    pub fn tuple_check(&self, handle: Handle) -> bool {
        self.to_object(handle).is_some_and(|o| o.is_tuple())
    }

    pub fn dict_check(&self, handle: Handle) -> bool {
        self.to_object(handle).is_some_and(|o| o.is_dict())
    }

    /// New tuple built from the objects behind `items`
    pub fn tuple_from_array(&self, items: &[Handle]) -> Handle {
        let mut elements = Vec::with_capacity(items.len());
        for &h in items {
            match self.to_object(h) {
                Some(object) => elements.push(object),
                None => {
                    self.err_set_string(
                        ExceptionKind::SystemError,
                        "tuple_from_array received a null handle",
                    );
                    return Handle::NULL;
                }
            }
        }
        self.new_handle(PyObject::new_tuple(elements))
    }

    pub fn new_int(&self, value: i64) -> Handle {
        self.new_handle(PyObject::from_int(value))
    }

    pub fn new_str(&self, value: &str) -> Handle {
        self.new_handle(PyObject::new_str(value))
    }

    /// Handle for a `PyResult`, setting the error indicator on failure
    pub fn result_from(&self, result: PyResult<PyObject>) -> Handle {
        match result {
            Ok(object) => self.new_handle(object),
            Err(err) => {
                self.counters.call_failures.fetch_add(1, Ordering::Relaxed);
                log_call_failure(&err);
                self.err_restore(err);
                Handle::NULL
            }
        }
    }

    // ------------------------------------------------------------------
    // Error indicator
    // ------------------------------------------------------------------

    pub fn err_set_string(&self, kind: ExceptionKind, message: &str) {
        self.err_restore(PyErr::new(kind, message));
    }

    pub fn err_restore(&self, err: PyErr) {
        *self.error.lock() = Some(err);
    }

    pub fn err_occurred(&self) -> bool {
        self.error.lock().is_some()
    }

    /// Take the pending exception, clearing the indicator
    pub fn err_fetch(&self) -> Option<PyErr> {
        self.error.lock().take()
    }

    pub fn err_clear(&self) {
        *self.error.lock() = None;
    }

    // ------------------------------------------------------------------
    // Statistics
    // ------------------------------------------------------------------

    #[inline]
    pub(crate) fn record_call(&self) {
        self.counters.calls_made.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_dispatch(&self) {
        self.counters
            .trampoline_dispatches
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> CallStats {
        CallStats {
            calls_made: self.counters.calls_made.load(Ordering::Relaxed),
            call_failures: self.counters.call_failures.load(Ordering::Relaxed),
            trampoline_dispatches: self.counters.trampoline_dispatches.load(Ordering::Relaxed),
        }
    }
}

impl Default for HandleContext {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard closing a handle when dropped
///
/// Usage:
/// ```ignore
/// let empty = ScopedHandle::new(ctx, ctx.tuple_from_array(&[]));
/// // use empty.get()
/// // closed on every exit path
/// ```
pub struct ScopedHandle<'ctx> {
    ctx: &'ctx HandleContext,
    handle: Handle,
}

impl<'ctx> ScopedHandle<'ctx> {
    #[inline]
    pub fn new(ctx: &'ctx HandleContext, handle: Handle) -> Self {
        Self { ctx, handle }
    }

    #[inline]
    pub fn get(&self) -> Handle {
        self.handle
    }
}

impl Drop for ScopedHandle<'_> {
    #[inline]
    fn drop(&mut self) {
        self.ctx.close(self.handle);
    }
}
