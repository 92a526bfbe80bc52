//! Tests for the object model and its call primitives

use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Callable that echoes its arguments as `(positional_tuple, kw_dict)`
fn echo() -> PyObject {
    PyObject::function("echo", |args| {
        let pos = PyObject::new_tuple(args.positional.to_vec());
        let kw = PyObject::dict_from(args.keywords.iter().cloned());
        Ok(PyObject::new_tuple(vec![pos, kw]))
    })
}

fn echo_without_vectorcall() -> PyObject {
    PyObject::function_without_vectorcall("echo", |args| {
        let pos = PyObject::new_tuple(args.positional.to_vec());
        let kw = PyObject::dict_from(args.keywords.iter().cloned());
        Ok(PyObject::new_tuple(vec![pos, kw]))
    })
}

fn ints(values: &[i64]) -> Vec<PyObject> {
    values.iter().copied().map(PyObject::from_int).collect()
}

#[test]
fn test_none_is_singleton() {
    assert!(PyObject::none().is(&PyObject::none()));
    assert!(PyObject::none().is_none());
}

#[test]
fn test_refcount_follows_clones() {
    let obj = PyObject::new_str("x");
    assert_eq!(obj.ref_count(), 1);
    let other = obj.clone();
    assert_eq!(obj.ref_count(), 2);
    drop(other);
    assert_eq!(obj.ref_count(), 1);
}

#[test]
fn test_dict_keeps_insertion_order() {
    let d = PyObject::dict_from([("b", PyObject::from_int(1)), ("a", PyObject::from_int(2))]);
    let dict = d.as_dict().unwrap();
    dict.set("b".to_string(), PyObject::from_int(3));
    let keys: Vec<_> = dict.items().into_iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec!["b", "a"]);
    assert_eq!(dict.get("b").and_then(|v| v.as_int()), Some(3));
    assert!(!dict.contains("c"));
}

#[test]
fn test_debug_repr() {
    let t = PyObject::new_tuple(vec![PyObject::from_int(1)]);
    assert_eq!(format!("{:?}", t), "(1,)");
    let d = PyObject::dict_from([("k", PyObject::new_str("v"))]);
    assert_eq!(format!("{:?}", d), "{\"k\": \"v\"}");
}

#[test]
fn test_call_with_tuple_and_dict() {
    let args = PyObject::new_tuple(ints(&[1, 2]));
    let kw = PyObject::dict_from([("x", PyObject::from_int(3))]);
    let result = call(&echo(), &args, Some(&kw)).unwrap();
    let parts = result.as_tuple().unwrap();
    assert_eq!(parts[0].as_tuple().unwrap().len(), 2);
    assert_eq!(parts[1].as_dict().unwrap().get("x").unwrap().as_int(), Some(3));
}

#[test]
fn test_call_rejects_non_tuple_args() {
    let err = call(&echo(), &PyObject::from_int(1), None).unwrap_err();
    assert!(err.is(ExceptionKind::TypeError));
    assert!(err.message().contains("must be a tuple"));
}

#[test]
fn test_call_rejects_non_dict_kwargs() {
    let args = PyObject::new_tuple(vec![]);
    let err = call(&echo(), &args, Some(&PyObject::from_int(1))).unwrap_err();
    assert!(err.is(ExceptionKind::TypeError));
    assert!(err.message().contains("dictionary"));
}

#[test]
fn test_call_object_without_args() {
    let seen = Arc::new(AtomicUsize::new(usize::MAX));
    let seen2 = seen.clone();
    let f = PyObject::function("count", move |args| {
        seen2.store(args.len(), Ordering::SeqCst);
        Ok(PyObject::none())
    });
    call_object(&f, None).unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 0);
}

#[test]
fn test_not_callable() {
    let err = call_object(&PyObject::from_int(3), None).unwrap_err();
    assert_eq!(err.to_string(), "TypeError: 'int' object is not callable");
}

#[test]
fn test_vectorcall_splits_keywords() {
    let mut args = ints(&[1, 2, 3]);
    args.push(PyObject::new_str("a"));
    let kwnames = PyObject::str_tuple(["name"]);
    let result = vectorcall(&echo(), &args, 3, Some(&kwnames)).unwrap();
    let parts = result.as_tuple().unwrap();
    assert_eq!(parts[0].as_tuple().unwrap().len(), 3);
    let kw = parts[1].as_dict().unwrap();
    assert_eq!(kw.get("name").unwrap().as_str(), Some("a"));
}

#[test]
fn test_vectorcall_rejects_duplicate_keywords() {
    let args = ints(&[1, 2]);
    let kwnames = PyObject::str_tuple(["x", "x"]);
    let err = vectorcall(&echo(), &args, 0, Some(&kwnames)).unwrap_err();
    assert!(err.message().contains("multiple values"));
}

#[test]
fn test_vectorcall_rejects_short_vector() {
    let args = ints(&[1]);
    let kwnames = PyObject::str_tuple(["x", "y"]);
    let err = vectorcall(&echo(), &args, 1, Some(&kwnames)).unwrap_err();
    assert!(err.is(ExceptionKind::SystemError));
}

#[test]
fn test_legacy_vectorcall_matches_native() {
    let mut args = ints(&[7, 8]);
    args.push(PyObject::from_bool(true));
    let kwnames = PyObject::str_tuple(["flag"]);

    for callable in [echo(), echo_without_vectorcall()] {
        let native = vectorcall(&callable, &args, 2, Some(&kwnames)).unwrap();
        let legacy = legacy_vectorcall(&callable, &args, 2, Some(&kwnames)).unwrap();
        assert_eq!(format!("{:?}", native), format!("{:?}", legacy));
    }
}

#[test]
fn test_get_attr_binds_methods() {
    let ty = PyObject::new_type("Point");
    ty.add_method(
        "first",
        PyObject::function("first", |args| Ok(args.positional[0].clone())),
    )
    .unwrap();
    let inst = PyObject::new_instance(&ty).unwrap();

    let method = get_attr(&inst, "first").unwrap();
    assert_eq!(method.type_name(), "method");
    let receiver = call_object(&method, None).unwrap();
    assert!(receiver.is(&inst));
}

#[test]
fn test_get_attr_missing() {
    let err = get_attr(&PyObject::from_int(1), "real").unwrap_err();
    assert!(err.is(ExceptionKind::AttributeError));
    assert_eq!(err.message(), "'int' object has no attribute 'real'");
}

#[test]
fn test_vectorcall_method_passes_receiver_and_keywords() {
    let ty = PyObject::new_type("Greeter");
    ty.add_method("greet", echo()).unwrap();
    let inst = PyObject::new_instance(&ty).unwrap();

    let args = vec![inst.clone(), PyObject::from_int(1), PyObject::new_str("hi")];
    let kwnames = PyObject::str_tuple(["word"]);
    let name = PyObject::new_str("greet");
    let result = vectorcall_method(&name, &args, 2, Some(&kwnames)).unwrap();

    let parts = result.as_tuple().unwrap();
    let pos = parts[0].as_tuple().unwrap();
    assert_eq!(pos.len(), 2);
    assert!(pos[0].is(&inst));
    assert_eq!(parts[1].as_dict().unwrap().get("word").unwrap().as_str(), Some("hi"));
}

#[test]
fn test_vectorcall_method_uses_instance_attribute() {
    let ty = PyObject::new_type("Holder");
    let inst = PyObject::new_instance(&ty).unwrap();
    inst.set_attr("callback", echo()).unwrap();

    let args = vec![inst, PyObject::from_int(5)];
    let name = PyObject::new_str("callback");
    let result = vectorcall_method(&name, &args, 2, None).unwrap();
    let pos = result.as_tuple().unwrap()[0].as_tuple().unwrap().to_vec();
    assert_eq!(pos.len(), 1);
    assert_eq!(pos[0].as_int(), Some(5));
}

#[test]
fn test_instance_call_uses_dunder_call() {
    let ty = PyObject::new_type("Adder");
    ty.add_method(
        "__call__",
        PyObject::function("__call__", |args| {
            let total: i64 = args.positional[1..].iter().filter_map(|o| o.as_int()).sum();
            Ok(PyObject::from_int(total))
        }),
    )
    .unwrap();
    let inst = PyObject::new_instance(&ty).unwrap();
    let args = PyObject::new_tuple(ints(&[2, 3]));
    assert_eq!(call(&inst, &args, None).unwrap().as_int(), Some(5));
}

#[test]
fn test_instance_shares_type_methods() {
    let ty = PyObject::new_type("Late");
    let inst = PyObject::new_instance(&ty).unwrap();
    assert_eq!(inst.type_name(), "Late");
    assert!(get_attr(&inst, "hello").is_err());

    // added after the instance exists
    ty.add_method("hello", echo()).unwrap();
    let method = get_attr(&inst, "hello").unwrap();
    assert_eq!(method.type_name(), "method");

    let err = PyObject::new_instance(&PyObject::from_int(3)).unwrap_err();
    assert!(err.is(ExceptionKind::TypeError));
}
