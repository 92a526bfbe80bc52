//! Call primitives of the object model
//!
//! Two protocols reach the same callable body:
//! - tuple/dict (`call`, `call_object`)
//! - vector-call: one contiguous argument slice, a positional count, and a
//!   tuple naming the trailing keyword entries (`vectorcall`)
//!
//! `legacy_vectorcall` resolves the vector-call slot by hand and falls back to
//! the tuple/dict protocol, so both routes produce identical results.

use super::{ObjectKind, PyErr, PyObject, PyResult};
use smallvec::SmallVec;

/// Argument view handed to native callables
#[derive(Debug, Clone, Copy)]
pub struct CallArgs<'a> {
    pub positional: &'a [PyObject],
    pub keywords: &'a [(String, PyObject)],
}

impl<'a> CallArgs<'a> {
    pub const fn new(positional: &'a [PyObject], keywords: &'a [(String, PyObject)]) -> Self {
        Self {
            positional,
            keywords,
        }
    }

    pub const fn empty() -> Self {
        Self {
            positional: &[],
            keywords: &[],
        }
    }

    /// Total argument count, positional plus keyword
    #[inline]
    pub fn len(&self) -> usize {
        self.positional.len() + self.keywords.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keyword(&self, name: &str) -> Option<&PyObject> {
        self.keywords
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }
}

/// Call with a positional tuple and an optional keyword dict
pub fn call(callable: &PyObject, args: &PyObject, kwargs: Option<&PyObject>) -> PyResult<PyObject> {
    let positional = args.as_tuple().ok_or_else(|| {
        PyErr::type_error(format!(
            "argument list must be a tuple, not {}",
            args.type_name()
        ))
    })?;

    let keywords = match kwargs {
        Some(kw) => kw
            .as_dict()
            .ok_or_else(|| {
                PyErr::type_error(format!(
                    "keyword list must be a dictionary, not {}",
                    kw.type_name()
                ))
            })?
            .items(),
        None => Vec::new(),
    };

    invoke(callable, &CallArgs::new(positional, &keywords))
}

/// Call with an optional positional tuple; absent means no arguments
pub fn call_object(callable: &PyObject, args: Option<&PyObject>) -> PyResult<PyObject> {
    match args {
        Some(args) => call(callable, args, None),
        None => invoke(callable, &CallArgs::empty()),
    }
}

/// Native vector-call entry point
///
/// `args` holds `nargs` positional entries followed by one entry per name in
/// `kwnames`.
pub fn vectorcall(
    callable: &PyObject,
    args: &[PyObject],
    nargs: usize,
    kwnames: Option<&PyObject>,
) -> PyResult<PyObject> {
    let keywords = zip_keywords(args, nargs, kwnames)?;
    invoke(callable, &CallArgs::new(&args[..nargs], &keywords))
}

/// Vector-call with manual slot resolution
///
/// Callables without a vector-call entry point are reached by packing the
/// argument slice into a tuple and a dict.
pub fn legacy_vectorcall(
    callable: &PyObject,
    args: &[PyObject],
    nargs: usize,
    kwnames: Option<&PyObject>,
) -> PyResult<PyObject> {
    if has_vectorcall_slot(callable) {
        return vectorcall(callable, args, nargs, kwnames);
    }

    let keywords = zip_keywords(args, nargs, kwnames)?;
    let tuple = PyObject::new_tuple(args[..nargs].to_vec());
    if keywords.is_empty() {
        call(callable, &tuple, None)
    } else {
        let dict = PyObject::dict_from(keywords);
        call(callable, &tuple, Some(&dict))
    }
}

/// Resolve `name` on `args[0]` and vector-call it, keywords included
pub fn vectorcall_method(
    name: &PyObject,
    args: &[PyObject],
    nargs: usize,
    kwnames: Option<&PyObject>,
) -> PyResult<PyObject> {
    let name = name.as_str().ok_or_else(|| {
        PyErr::type_error(format!(
            "attribute name must be string, not '{}'",
            name.type_name()
        ))
    })?;
    if nargs == 0 {
        return Err(PyErr::system_error(
            "method call requires the receiver as first argument",
        ));
    }
    let receiver = &args[0];

    // Unbound lookup on the type avoids materializing a bound method
    if let ObjectKind::Instance(inst) = receiver.kind() {
        if inst.attr(name).is_none() {
            if let Some(function) = inst.type_object().method(name) {
                return vectorcall(&function, args, nargs, kwnames);
            }
        }
    }

    let method = get_attr(receiver, name)?;
    vectorcall(&method, &args[1..], nargs - 1, kwnames)
}

/// Attribute lookup: instance dict, then the type's method table
pub fn get_attr(obj: &PyObject, name: &str) -> PyResult<PyObject> {
    let found = match obj.kind() {
        ObjectKind::Instance(inst) => inst.attr(name).or_else(|| {
            inst.type_object()
                .method(name)
                .map(|function| PyObject::bound_method(obj.clone(), function))
        }),
        ObjectKind::Type(ty) => ty.method(name),
        ObjectKind::BoundMethod { receiver, function } => match name {
            "__self__" => Some(receiver.clone()),
            "__func__" => Some(function.clone()),
            _ => None,
        },
        _ => None,
    };

    found.ok_or_else(|| {
        PyErr::attribute_error(format!(
            "'{}' object has no attribute '{}'",
            obj.type_name(),
            name
        ))
    })
}

fn has_vectorcall_slot(callable: &PyObject) -> bool {
    match callable.kind() {
        ObjectKind::Function(f) => f.has_vectorcall(),
        ObjectKind::BoundMethod { .. } => true,
        _ => false,
    }
}

/// Pair the trailing entries of `args` with the names in `kwnames`
fn zip_keywords(
    args: &[PyObject],
    nargs: usize,
    kwnames: Option<&PyObject>,
) -> PyResult<Vec<(String, PyObject)>> {
    let names: &[PyObject] = match kwnames {
        None => &[],
        Some(names) => names.as_tuple().ok_or_else(|| {
            PyErr::system_error(format!(
                "keyword names must be a tuple, not {}",
                names.type_name()
            ))
        })?,
    };

    if nargs.checked_add(names.len()) != Some(args.len()) {
        return Err(PyErr::system_error(format!(
            "argument vector holds {} entries, expected {} positional + {} keyword",
            args.len(),
            nargs,
            names.len()
        )));
    }

    let mut keywords = Vec::with_capacity(names.len());
    for (name, value) in names.iter().zip(&args[nargs..]) {
        let name = name
            .as_str()
            .ok_or_else(|| PyErr::type_error("keywords must be strings"))?;
        if keywords.iter().any(|(k, _): &(String, PyObject)| k == name) {
            return Err(PyErr::type_error(format!(
                "got multiple values for keyword argument '{}'",
                name
            )));
        }
        keywords.push((name.to_string(), value.clone()));
    }
    Ok(keywords)
}

/// tp_call dispatch
fn invoke(callable: &PyObject, args: &CallArgs<'_>) -> PyResult<PyObject> {
    match callable.kind() {
        ObjectKind::Function(f) => f.invoke(args),
        ObjectKind::BoundMethod { receiver, function } => {
            let mut positional: SmallVec<[PyObject; 8]> =
                SmallVec::with_capacity(args.positional.len() + 1);
            positional.push(receiver.clone());
            positional.extend(args.positional.iter().cloned());
            invoke(function, &CallArgs::new(&positional, args.keywords))
        }
        ObjectKind::Type(ty) => {
            if !args.is_empty() {
                return Err(PyErr::type_error(format!("{}() takes no arguments", ty.name())));
            }
            PyObject::new_instance(callable)
        }
        ObjectKind::Instance(inst) => match inst.type_object().method("__call__") {
            Some(function) => {
                let bound = PyObject::bound_method(callable.clone(), function);
                invoke(&bound, args)
            }
            None => Err(not_callable(callable)),
        },
        _ => Err(not_callable(callable)),
    }
}

fn not_callable(obj: &PyObject) -> PyErr {
    PyErr::type_error(format!("'{}' object is not callable", obj.type_name()))
}
