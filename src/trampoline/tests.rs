//! Tests for signature-tagged dispatch

use super::*;
use crate::object::{ExceptionKind, PyObject};
use std::cell::RefCell;

thread_local! {
    /// What the last target saw: receiver plus arguments
    static SEEN: RefCell<Option<(PyObject, Vec<PyObject>)>> = RefCell::new(None);
}

fn record(ctx: &HandleContext, slf: Handle, args: &[Handle]) {
    let receiver = ctx.to_object(slf).expect("receiver handle");
    let args = args
        .iter()
        .map(|&h| ctx.to_object(h).unwrap_or_else(PyObject::none))
        .collect();
    SEEN.with(|seen| *seen.borrow_mut() = Some((receiver, args)));
}

fn take_seen() -> (PyObject, Vec<PyObject>) {
    SEEN.with(|seen| seen.borrow_mut().take()).expect("target was not called")
}

fn noargs_target(ctx: &HandleContext, slf: Handle) -> Handle {
    record(ctx, slf, &[]);
    ctx.new_str("noargs")
}

fn o_target(ctx: &HandleContext, slf: Handle, arg: Handle) -> Handle {
    record(ctx, slf, &[arg]);
    ctx.dup(arg)
}

fn varargs_target(ctx: &HandleContext, slf: Handle, args: &[Handle]) -> Handle {
    record(ctx, slf, args);
    ctx.new_int(args.len() as i64)
}

fn failing_target(ctx: &HandleContext, _slf: Handle) -> Handle {
    ctx.err_set_string(ExceptionKind::ValueError, "target failed");
    Handle::NULL
}

fn dispatch(
    ctx: &HandleContext,
    slf: &PyObject,
    args: Option<&PyObject>,
    func: *const (),
    sig: MethSignature,
) -> Option<PyObject> {
    unsafe { call_real_function_from_trampoline(ctx, slf, args, None, func, sig.raw()) }
}

fn ints(n: i64) -> PyObject {
    PyObject::new_tuple((0..n).map(PyObject::from_int).collect())
}

#[test]
fn test_signature_tags() {
    assert_eq!(MethSignature::from_raw(1), Some(MethSignature::VarArgs));
    assert_eq!(MethSignature::from_raw(2), Some(MethSignature::Keywords));
    assert_eq!(MethSignature::from_raw(3), Some(MethSignature::NoArgs));
    assert_eq!(MethSignature::from_raw(4), Some(MethSignature::O));
    assert_eq!(MethSignature::from_raw(0), None);
    assert_eq!(MethSignature::from_raw(99), None);
    assert_eq!(MethSignature::O.raw(), 4);
}

#[test]
fn test_noargs_sees_only_receiver() {
    let ctx = HandleContext::new();
    let slf = PyObject::new_str("self");
    let ignored = ints(3);

    let result = dispatch(
        &ctx,
        &slf,
        Some(&ignored),
        noargs_target as MethNoArgs as *const (),
        MethSignature::NoArgs,
    )
    .unwrap();

    assert_eq!(result.as_str(), Some("noargs"));
    let (receiver, args) = take_seen();
    assert!(receiver.is(&slf));
    assert!(args.is_empty());
}

#[test]
fn test_single_arg_is_not_unpacked() {
    let ctx = HandleContext::new();
    let slf = PyObject::none();
    let arg = ints(2);

    let result = dispatch(
        &ctx,
        &slf,
        Some(&arg),
        o_target as MethO as *const (),
        MethSignature::O,
    )
    .unwrap();

    let (receiver, args) = take_seen();
    assert!(receiver.is_none());
    assert_eq!(args.len(), 1);
    assert!(args[0].is(&arg), "the payload itself must reach the target");
    assert!(result.is(&arg));
}

#[test]
fn test_varargs_preserves_order_and_count() {
    let ctx = HandleContext::new();
    let slf = PyObject::new_str("self");
    let args = ints(5);

    let result = dispatch(
        &ctx,
        &slf,
        Some(&args),
        varargs_target as MethVarArgs as *const (),
        MethSignature::VarArgs,
    )
    .unwrap();

    assert_eq!(result.as_int(), Some(5));
    let (_, seen) = take_seen();
    let values: Vec<_> = seen.iter().filter_map(|o| o.as_int()).collect();
    assert_eq!(values, vec![0, 1, 2, 3, 4]);
    for (seen, sent) in seen.iter().zip(args.as_tuple().unwrap()) {
        assert!(seen.is(sent));
    }
}

#[test]
fn test_varargs_spills_past_inline_buffer() {
    let ctx = HandleContext::new();
    let n = (ARG_BUFFER_INLINE * 4) as i64;
    let args = ints(n);

    let result = dispatch(
        &ctx,
        &PyObject::none(),
        Some(&args),
        varargs_target as MethVarArgs as *const (),
        MethSignature::VarArgs,
    )
    .unwrap();

    assert_eq!(result.as_int(), Some(n));
    let (_, seen) = take_seen();
    assert_eq!(seen.last().and_then(|o| o.as_int()), Some(n - 1));
}

#[test]
fn test_varargs_without_tuple_is_empty() {
    let ctx = HandleContext::new();
    let result = dispatch(
        &ctx,
        &PyObject::none(),
        None,
        varargs_target as MethVarArgs as *const (),
        MethSignature::VarArgs,
    )
    .unwrap();
    assert_eq!(result.as_int(), Some(0));
    assert!(take_seen().1.is_empty());
}

#[test]
fn test_null_result_propagates_with_error() {
    let ctx = HandleContext::new();
    let result = dispatch(
        &ctx,
        &PyObject::none(),
        None,
        failing_target as MethNoArgs as *const (),
        MethSignature::NoArgs,
    );
    assert!(result.is_none());
    let err = ctx.err_fetch().unwrap();
    assert_eq!(err.kind(), ExceptionKind::ValueError);
    assert_eq!(err.message(), "target failed");
}

#[test]
fn test_call_handles_are_released() {
    let ctx = HandleContext::new();
    let slf = PyObject::new_str("self");
    let args = ints(3);
    let before = (slf.ref_count(), args.ref_count());

    let result = dispatch(
        &ctx,
        &slf,
        Some(&args),
        varargs_target as MethVarArgs as *const (),
        MethSignature::VarArgs,
    );
    drop(result);
    drop(take_seen());

    assert_eq!(ctx.handle_count(), 0);
    assert_eq!((slf.ref_count(), args.ref_count()), before);
    assert_eq!(ctx.stats().trampoline_dispatches, 1);
}
