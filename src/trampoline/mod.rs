//! Call trampoline - host calls into handle-based method implementations
//!
//! The host invokes a registered method with its own convention (receiver,
//! positional tuple, keyword dict). The trampoline re-invokes the real
//! implementation under the convention its signature tag names, translating
//! references to handles on the way in and the result back on the way out.
//!
//! Handles opened for the call are closed when it returns, on every path.

#[cfg(test)]
mod tests;

use smallvec::SmallVec;

use crate::context::HandleContext;
use crate::fatal::abort_on_violation;
use crate::handles::Handle;
use crate::logging::log_dispatch;
use crate::object::PyObject;

/// Argument count kept inline before a call buffer spills to the heap
pub const ARG_BUFFER_INLINE: usize = 8;

/// Handle buffer for one call
type HandleBuffer = SmallVec<[Handle; ARG_BUFFER_INLINE]>;

/// `f(ctx, self)`
pub type MethNoArgs = fn(&HandleContext, Handle) -> Handle;
/// `f(ctx, self, arg)`
pub type MethO = fn(&HandleContext, Handle, Handle) -> Handle;
/// `f(ctx, self, args)`; the slice carries both the buffer and its count
pub type MethVarArgs = fn(&HandleContext, Handle, &[Handle]) -> Handle;

/// Calling-convention shape of a registered method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum MethSignature {
    VarArgs = 1,
    /// Defined by the ABI; no trampoline exists for it
    Keywords = 2,
    NoArgs = 3,
    O = 4,
}

impl MethSignature {
    /// Decode a raw signature tag
    pub const fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            1 => Some(Self::VarArgs),
            2 => Some(Self::Keywords),
            3 => Some(Self::NoArgs),
            4 => Some(Self::O),
            _ => None,
        }
    }

    #[inline]
    pub const fn raw(self) -> i32 {
        self as i32
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::VarArgs => "VARARGS",
            Self::Keywords => "KEYWORDS",
            Self::NoArgs => "NOARGS",
            Self::O => "O",
        }
    }
}

/// Handles closed when the call frame unwinds
struct CallHandles<'ctx> {
    ctx: &'ctx HandleContext,
    handles: HandleBuffer,
}

impl<'ctx> CallHandles<'ctx> {
    fn new(ctx: &'ctx HandleContext) -> Self {
        Self {
            ctx,
            handles: HandleBuffer::new(),
        }
    }

    fn open(&mut self, object: PyObject) -> Handle {
        let h = self.ctx.new_handle(object);
        self.handles.push(h);
        h
    }
}

impl Drop for CallHandles<'_> {
    fn drop(&mut self) {
        for &h in &self.handles {
            self.ctx.close(h);
        }
    }
}

/// Invoke `func` under the convention named by the raw tag `sig`
///
/// - `NoArgs`: `func(ctx, self)`; `args` is ignored
/// - `O`: `func(ctx, self, arg)` where `args` is the single argument itself
/// - `VarArgs`: `args` (a tuple, or absent for none) is unpacked in order
///
/// Returns the callee's result, or `None` when it returned `Handle::NULL`
/// (its error indicator is left untouched). The keyword dict belongs to the keyword
/// convention and is not consulted by any supported signature.
///
/// An unknown tag, the keyword signature, or a non-tuple `args` for
/// `VarArgs` abort the process.
///
/// # Safety
/// `func` must be a function pointer of the type matching `sig`
/// (`MethNoArgs`, `MethO` or `MethVarArgs`).
pub unsafe fn call_real_function_from_trampoline(
    ctx: &HandleContext,
    slf: &PyObject,
    args: Option<&PyObject>,
    _kw: Option<&PyObject>,
    func: *const (),
    sig: i32,
) -> Option<PyObject> {
    if func.is_null() {
        abort_on_violation("trampoline target is a null function pointer");
    }
    let Some(signature) = MethSignature::from_raw(sig) else {
        abort_on_violation(&format!("unknown method signature tag {}", sig));
    };
    ctx.record_dispatch();

    let mut scope = CallHandles::new(ctx);
    let h_self = scope.open(slf.clone());

    let result = match signature {
        MethSignature::NoArgs => {
            log_dispatch(signature.name(), 0);
            let f: MethNoArgs = std::mem::transmute(func);
            f(ctx, h_self)
        }
        MethSignature::O => {
            log_dispatch(signature.name(), 1);
            let f: MethO = std::mem::transmute(func);
            let h_arg = match args {
                Some(arg) => scope.open(arg.clone()),
                None => Handle::NULL,
            };
            f(ctx, h_self, h_arg)
        }
        MethSignature::VarArgs => {
            let items = match args {
                None => &[][..],
                Some(tuple) => match tuple.as_tuple() {
                    Some(items) => items,
                    None => abort_on_violation("VARARGS trampoline requires a tuple of arguments"),
                },
            };
            log_dispatch(signature.name(), items.len());
            let f: MethVarArgs = std::mem::transmute(func);
            let h_args: HandleBuffer = items.iter().map(|item| scope.open(item.clone())).collect();
            f(ctx, h_self, &h_args)
        }
        MethSignature::Keywords => {
            abort_on_violation("keyword method signature has no trampoline")
        }
    };

    drop(scope);
    ctx.take_result(result)
}
