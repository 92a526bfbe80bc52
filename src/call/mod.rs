//! Generic call operations at the handle boundary
//!
//! Design: Three entry points translate handle-level arguments into object
//! model calls:
//! 1. `call_tuple_dict` - positional tuple plus optional keyword dict
//! 2. `call` - vector-call (argument slice + count + keyword-name tuple)
//! 3. `call_method` - vector-call of a named method on `args[0]`
//!
//! Argument vectors are translated into a `SmallVec` that lives only for the
//! duration of the call. Two execution strategies exist for the vector-call
//! paths; the context picks one when it is created.


use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::str::FromStr;

use crate::config::ConfigError;
use crate::context::{HandleContext, ScopedHandle};
use crate::fatal::abort_on_violation;
use crate::handles::Handle;
use crate::logging::log_call;
use crate::object::{self, ExceptionKind, PyErr, PyObject};
use crate::trampoline::ARG_BUFFER_INLINE;

/// Transient buffer of translated argument references
type ObjectBuffer = SmallVec<[PyObject; ARG_BUFFER_INLINE]>;

/// How vector-calls reach the object model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStrategy {
    /// Resolve the vector-call slot by hand; named-method calls go through
    /// an explicit attribute lookup and do not forward keywords
    ///
    /// The receiver bound by that lookup is not passed again as a positional
    /// argument: the method sees `args[1..nargs]` after it.
    Legacy,
    /// Delegate to the object model's native vector-call primitives
    Vectorcall,
}

impl CallStrategy {
    /// First host revision with native vector-call entry points
    pub const VECTORCALL_MIN_VERSION: u32 = 0x0309_0000;

    pub const fn for_host_version(version: u32) -> Self {
        if version >= Self::VECTORCALL_MIN_VERSION {
            Self::Vectorcall
        } else {
            Self::Legacy
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Vectorcall => "vectorcall",
        }
    }
}

impl FromStr for CallStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "legacy" => Ok(Self::Legacy),
            "vectorcall" => Ok(Self::Vectorcall),
            _ => Err(ConfigError::InvalidStrategy(s.to_string())),
        }
    }
}

/// Total entries in a vector-call argument array
///
/// `None` when the sum wraps.
#[inline]
pub const fn arg_span(nargs: usize, kwcount: usize) -> Option<usize> {
    nargs.checked_add(kwcount)
}

/// Call `callable` with an optional positional tuple and keyword dict
///
/// A non-tuple `args` or non-dict `kw` sets TypeError and returns
/// `Handle::NULL` without calling anything. When only keywords are given an
/// empty positional tuple is created for the duration of the call.
pub fn call_tuple_dict(ctx: &HandleContext, callable: Handle, args: Handle, kw: Handle) -> Handle {
    if !args.is_null() && !ctx.tuple_check(args) {
        ctx.err_set_string(
            ExceptionKind::TypeError,
            "HPy_CallTupleDict requires args to be a tuple or null handle",
        );
        return Handle::NULL;
    }
    if !kw.is_null() && !ctx.dict_check(kw) {
        ctx.err_set_string(
            ExceptionKind::TypeError,
            "HPy_CallTupleDict requires kw to be a dict or null handle",
        );
        return Handle::NULL;
    }
    let Some(callable) = ctx.to_object(callable) else {
        return null_callable(ctx);
    };
    ctx.record_call();

    let args_obj = ctx.to_object(args);
    let result = match ctx.to_object(kw) {
        None => {
            log_call("call_tuple_dict", positional_len(args_obj.as_ref()), 0);
            object::call_object(&callable, args_obj.as_ref())
        }
        Some(kw_obj) => {
            log_call("call_tuple_dict", positional_len(args_obj.as_ref()), keyword_len(&kw_obj));
            match args_obj {
                Some(args_obj) => object::call(&callable, &args_obj, Some(&kw_obj)),
                None => {
                    let empty = ScopedHandle::new(ctx, ctx.tuple_from_array(&[]));
                    match ctx.to_object(empty.get()) {
                        Some(empty_args) => object::call(&callable, &empty_args, Some(&kw_obj)),
                        None => Err(PyErr::system_error("could not create empty argument tuple")),
                    }
                }
            }
        }
    };
    ctx.result_from(result)
}

/// Vector-call `callable`
///
/// `args` holds `nargs` positional handles followed by one handle per name
/// in the `kwnames` tuple.
pub fn call(
    ctx: &HandleContext,
    callable: Handle,
    args: &[Handle],
    nargs: usize,
    kwnames: Handle,
) -> Handle {
    let (kwnames_obj, span) = vector_layout(ctx, nargs, kwnames);
    let buffer = translate_args(ctx, args, span);
    let Some(callable) = ctx.to_object(callable) else {
        return null_callable(ctx);
    };
    ctx.record_call();
    log_call("call", nargs, span - nargs);

    let result = match ctx.strategy() {
        CallStrategy::Legacy => {
            object::legacy_vectorcall(&callable, &buffer, nargs, kwnames_obj.as_ref())
        }
        CallStrategy::Vectorcall => {
            object::vectorcall(&callable, &buffer, nargs, kwnames_obj.as_ref())
        }
    };
    ctx.result_from(result)
}

/// Vector-call the method `name` of `args[0]`
///
/// Under the legacy strategy the method is resolved by attribute lookup and
/// called with the remaining positional arguments only: keyword entries are
/// not forwarded. The vector-call strategy forwards them.
pub fn call_method(
    ctx: &HandleContext,
    name: Handle,
    args: &[Handle],
    nargs: usize,
    kwnames: Handle,
) -> Handle {
    let (kwnames_obj, span) = vector_layout(ctx, nargs, kwnames);
    let buffer = translate_args(ctx, args, span);
    let Some(name) = ctx.to_object(name) else {
        return ctx.result_from(Err(PyErr::system_error("method name is a null handle")));
    };
    ctx.record_call();
    log_call("call_method", nargs, span - nargs);

    let result = match ctx.strategy() {
        CallStrategy::Legacy => legacy_call_method(&name, &buffer, nargs),
        CallStrategy::Vectorcall => {
            object::vectorcall_method(&name, &buffer, nargs, kwnames_obj.as_ref())
        }
    };
    ctx.result_from(result)
}

/// Number of argument handles `call` / `call_method` will read
pub fn vector_span(ctx: &HandleContext, nargs: usize, kwnames: Handle) -> usize {
    vector_layout(ctx, nargs, kwnames).1
}

fn legacy_call_method(name: &PyObject, args: &[PyObject], nargs: usize) -> object::PyResult<PyObject> {
    let Some(attr) = name.as_str() else {
        return Err(PyErr::type_error(format!(
            "attribute name must be string, not '{}'",
            name.type_name()
        )));
    };
    let Some(receiver) = args.first().filter(|_| nargs > 0) else {
        return Err(PyErr::system_error(
            "method call requires the receiver as first argument",
        ));
    };

    // the method reference is released when this frame returns, on both paths
    let method = object::get_attr(receiver, attr)?;
    object::legacy_vectorcall(&method, &args[1..nargs], nargs - 1, None)
}

/// Keyword-name tuple and checked total span of a vector-call
fn vector_layout(ctx: &HandleContext, nargs: usize, kwnames: Handle) -> (Option<PyObject>, usize) {
    let Some(names) = ctx.to_object(kwnames) else {
        return (None, nargs);
    };
    let kwcount = match names.as_tuple() {
        Some(items) => items.len(),
        None => abort_on_violation("keyword names must be passed as a tuple"),
    };
    match arg_span(nargs, kwcount) {
        Some(span) => (Some(names), span),
        None => abort_on_violation("argument count overflow in vector-call"),
    }
}

/// Translate the first `span` handles into a call-scoped buffer
fn translate_args(ctx: &HandleContext, args: &[Handle], span: usize) -> ObjectBuffer {
    if span > args.len() {
        abort_on_violation(&format!(
            "argument vector holds {} handles, call needs {}",
            args.len(),
            span
        ));
    }
    args[..span]
        .iter()
        .map(|&h| match ctx.to_object(h) {
            Some(object) => object,
            None => abort_on_violation("null handle in argument vector"),
        })
        .collect()
}

fn null_callable(ctx: &HandleContext) -> Handle {
    ctx.result_from(Err(PyErr::system_error("call target is a null handle")))
}

fn positional_len(args: Option<&PyObject>) -> usize {
    args.and_then(|a| a.as_tuple())
        .map_or(0, |items| items.len())
}

fn keyword_len(kw: &PyObject) -> usize {
    kw.as_dict().map_or(0, |d| d.len())
}
