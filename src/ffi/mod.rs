//! C FFI - stable ABI over the handle context
//!
//! Design: Thin `extern "C"` wrappers with:
//! 1. Context lifecycle (new, free)
//! 2. Handle lifecycle (dup, close)
//! 3. The three call operations
//! 4. Error propagation via `Handle::NULL` plus the context error indicator
//!
//! A null context pointer makes every entry point a no-op that returns
//! `Handle::NULL` (or its integer equivalent).


use std::ffi::{c_char, CStr};
use std::slice;

use crate::call;
use crate::config::ShimConfig;
use crate::context::HandleContext;
use crate::fatal::abort_on_violation;
use crate::handles::Handle;
use crate::logging::{debug, warn};
use crate::object::{ExceptionKind, PyObject};

/// Borrow the context behind `ctx`
///
/// # Safety
/// `ctx` must be null or come from `hshim_context_new` and not yet be freed.
#[inline(always)]
unsafe fn context<'a>(ctx: *const HandleContext) -> Option<&'a HandleContext> {
    ctx.as_ref()
}

/// Argument vector of `len` handles starting at `args`
///
/// # Safety
/// A non-null `args` must point to at least `len` handles.
unsafe fn handle_slice<'a>(args: *const Handle, len: usize) -> &'a [Handle] {
    if args.is_null() {
        if len != 0 {
            abort_on_violation("null argument vector with a non-zero span");
        }
        return &[];
    }
    slice::from_raw_parts(args, len)
}

/// Create a context
///
/// `host_version` 0 reads `HSHIM_HOST_VERSION` / `HSHIM_STRATEGY`; an
/// unparsable environment falls back to the defaults.
#[no_mangle]
pub extern "C" fn hshim_context_new(host_version: u32) -> *mut HandleContext {
    let config = if host_version == 0 {
        ShimConfig::from_env().unwrap_or_else(|e| {
            warn!(error = %e, "ignoring invalid environment configuration");
            ShimConfig::default()
        })
    } else {
        ShimConfig {
            host_version,
            ..ShimConfig::default()
        }
    };
    crate::init_with_config(&config);
    Box::into_raw(Box::new(HandleContext::from_config(&config)))
}

/// Destroy a context, releasing every handle still open in it
///
/// # Safety
/// `ctx` must be null or come from `hshim_context_new`; it is invalid afterwards.
#[no_mangle]
pub unsafe extern "C" fn hshim_context_free(ctx: *mut HandleContext) {
    if ctx.is_null() {
        return;
    }
    let ctx = Box::from_raw(ctx);
    let open = ctx.handle_count();
    if open > 0 {
        debug!(open, "context freed with open handles");
    }
}

/// # Safety
/// See `hshim_context_free`.
#[no_mangle]
pub unsafe extern "C" fn hshim_close(ctx: *const HandleContext, h: Handle) {
    if let Some(ctx) = context(ctx) {
        ctx.close(h);
    }
}

/// # Safety
/// See `hshim_context_free`.
#[no_mangle]
pub unsafe extern "C" fn hshim_dup(ctx: *const HandleContext, h: Handle) -> Handle {
    match context(ctx) {
        Some(ctx) => ctx.dup(h),
        None => Handle::NULL,
    }
}

/// # Safety
/// See `hshim_context_free`.
#[no_mangle]
pub unsafe extern "C" fn hshim_long_from_i64(ctx: *const HandleContext, value: i64) -> Handle {
    match context(ctx) {
        Some(ctx) => ctx.new_int(value),
        None => Handle::NULL,
    }
}

/// Integer value of `h`; -1 with TypeError set when it is not an integer
///
/// # Safety
/// See `hshim_context_free`.
#[no_mangle]
pub unsafe extern "C" fn hshim_long_as_i64(ctx: *const HandleContext, h: Handle) -> i64 {
    let Some(ctx) = context(ctx) else {
        return -1;
    };
    match ctx.to_object(h).as_ref().and_then(PyObject::as_int) {
        Some(value) => value,
        None => {
            ctx.err_set_string(ExceptionKind::TypeError, "an integer is required");
            -1
        }
    }
}

/// New string from a NUL-terminated UTF-8 buffer
///
/// # Safety
/// `text` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn hshim_unicode_from_utf8(
    ctx: *const HandleContext,
    text: *const c_char,
) -> Handle {
    let Some(ctx) = context(ctx) else {
        return Handle::NULL;
    };
    if text.is_null() {
        ctx.err_set_string(ExceptionKind::SystemError, "null string pointer");
        return Handle::NULL;
    }
    match CStr::from_ptr(text).to_str() {
        Ok(s) => ctx.new_str(s),
        Err(_) => {
            ctx.err_set_string(ExceptionKind::ValueError, "string is not valid UTF-8");
            Handle::NULL
        }
    }
}

/// # Safety
/// `items` must be null (with `n` 0) or point to `n` handles.
#[no_mangle]
pub unsafe extern "C" fn hshim_tuple_from_array(
    ctx: *const HandleContext,
    items: *const Handle,
    n: usize,
) -> Handle {
    match context(ctx) {
        Some(ctx) => ctx.tuple_from_array(handle_slice(items, n)),
        None => Handle::NULL,
    }
}

/// # Safety
/// See `hshim_context_free`.
#[no_mangle]
pub unsafe extern "C" fn hshim_call_tuple_dict(
    ctx: *const HandleContext,
    callable: Handle,
    args: Handle,
    kw: Handle,
) -> Handle {
    match context(ctx) {
        Some(ctx) => call::call_tuple_dict(ctx, callable, args, kw),
        None => Handle::NULL,
    }
}

/// Vector-call `callable`
///
/// # Safety
/// `args` must point to `nargs` handles plus one per entry of `kwnames`.
#[no_mangle]
pub unsafe extern "C" fn hshim_call(
    ctx: *const HandleContext,
    callable: Handle,
    args: *const Handle,
    nargs: usize,
    kwnames: Handle,
) -> Handle {
    let Some(ctx) = context(ctx) else {
        return Handle::NULL;
    };
    let span = call::vector_span(ctx, nargs, kwnames);
    call::call(ctx, callable, handle_slice(args, span), nargs, kwnames)
}

/// Vector-call the method `name` of `args[0]`
///
/// # Safety
/// `args` must point to `nargs` handles plus one per entry of `kwnames`.
#[no_mangle]
pub unsafe extern "C" fn hshim_call_method(
    ctx: *const HandleContext,
    name: Handle,
    args: *const Handle,
    nargs: usize,
    kwnames: Handle,
) -> Handle {
    let Some(ctx) = context(ctx) else {
        return Handle::NULL;
    };
    let span = call::vector_span(ctx, nargs, kwnames);
    call::call_method(ctx, name, handle_slice(args, span), nargs, kwnames)
}

/// 1 when an exception is pending, else 0
///
/// # Safety
/// See `hshim_context_free`.
#[no_mangle]
pub unsafe extern "C" fn hshim_err_occurred(ctx: *const HandleContext) -> i32 {
    context(ctx).map_or(0, |ctx| i32::from(ctx.err_occurred()))
}

/// # Safety
/// See `hshim_context_free`.
#[no_mangle]
pub unsafe extern "C" fn hshim_err_clear(ctx: *const HandleContext) {
    if let Some(ctx) = context(ctx) {
        ctx.err_clear();
    }
}
