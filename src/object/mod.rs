//! Object model - reference-counted values the shim marshals between conventions
//!
//! Design: Every value is an `Arc`-backed `PyObject`:
//! 1. Cloning is an incref, dropping is a decref
//! 2. Containers own their elements
//! 3. Callables are Rust closures behind one argument view (`CallArgs`)
//!
//! The call primitives live in `call.rs`; this file holds representation and
//! constructors.

mod call;
mod error;

#[cfg(test)]
mod tests;

pub use call::{
    call, call_object, get_attr, legacy_vectorcall, vectorcall, vectorcall_method, CallArgs,
};
pub use error::{ExceptionKind, PyErr, PyResult};

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Body of a native callable
pub type NativeFn = dyn Fn(&CallArgs<'_>) -> PyResult<PyObject> + Send + Sync;

static NONE: Lazy<PyObject> = Lazy::new(|| PyObject::from_kind(ObjectKind::None));

/// Universal object reference
#[derive(Clone)]
pub struct PyObject(Arc<ObjectKind>);

/// Object representation per type
pub enum ObjectKind {
    None,
    Bool(bool),
    Int(i64),
    Str(String),
    Tuple(Vec<PyObject>),
    Dict(Dict),
    Function(NativeFunction),
    Type(Arc<TypeObject>),
    Instance(Instance),
    BoundMethod { receiver: PyObject, function: PyObject },
}

impl PyObject {
    #[inline]
    fn from_kind(kind: ObjectKind) -> Self {
        Self(Arc::new(kind))
    }

    /// The None singleton
    #[inline]
    pub fn none() -> Self {
        NONE.clone()
    }

    pub fn from_bool(value: bool) -> Self {
        Self::from_kind(ObjectKind::Bool(value))
    }

    pub fn from_int(value: i64) -> Self {
        Self::from_kind(ObjectKind::Int(value))
    }

    pub fn new_str(value: impl Into<String>) -> Self {
        Self::from_kind(ObjectKind::Str(value.into()))
    }

    pub fn new_tuple(items: Vec<PyObject>) -> Self {
        Self::from_kind(ObjectKind::Tuple(items))
    }

    /// Tuple of string objects, the shape keyword-name vectors take
    pub fn str_tuple<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        Self::new_tuple(names.into_iter().map(PyObject::new_str).collect())
    }

    pub fn new_dict() -> Self {
        Self::from_kind(ObjectKind::Dict(Dict::default()))
    }

    /// Dict pre-populated from `(key, value)` pairs
    pub fn dict_from<K: Into<String>>(items: impl IntoIterator<Item = (K, PyObject)>) -> Self {
        let dict = Dict::default();
        for (key, value) in items {
            dict.set(key.into(), value);
        }
        Self::from_kind(ObjectKind::Dict(dict))
    }

    /// Native callable exposing a vector-call entry point
    pub fn function<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&CallArgs<'_>) -> PyResult<PyObject> + Send + Sync + 'static,
    {
        Self::from_kind(ObjectKind::Function(NativeFunction {
            name: name.into(),
            body: Arc::new(body),
            vectorcall: true,
        }))
    }

    /// Native callable reachable only through the tuple/dict protocol
    pub fn function_without_vectorcall<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&CallArgs<'_>) -> PyResult<PyObject> + Send + Sync + 'static,
    {
        Self::from_kind(ObjectKind::Function(NativeFunction {
            name: name.into(),
            body: Arc::new(body),
            vectorcall: false,
        }))
    }

    pub fn new_type(name: impl Into<String>) -> Self {
        Self::from_kind(ObjectKind::Type(Arc::new(TypeObject {
            name: name.into(),
            methods: Dict::default(),
        })))
    }

    /// Fresh instance of a type object
    ///
    /// Returns a TypeError if `ty` is not a type.
    pub fn new_instance(ty: &PyObject) -> PyResult<Self> {
        match ty.kind() {
            ObjectKind::Type(type_object) => Ok(Self::from_kind(ObjectKind::Instance(Instance {
                ty: type_object.clone(),
                attrs: Dict::default(),
            }))),
            _ => Err(PyErr::type_error(format!(
                "cannot instantiate '{}' object",
                ty.type_name()
            ))),
        }
    }

    pub(crate) fn bound_method(receiver: PyObject, function: PyObject) -> Self {
        Self::from_kind(ObjectKind::BoundMethod { receiver, function })
    }

    #[inline]
    pub fn kind(&self) -> &ObjectKind {
        &self.0
    }

    /// Identity comparison (`is`)
    #[inline]
    pub fn is(&self, other: &PyObject) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Current strong reference count
    #[inline]
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    pub fn type_name(&self) -> &str {
        match self.kind() {
            ObjectKind::None => "NoneType",
            ObjectKind::Bool(_) => "bool",
            ObjectKind::Int(_) => "int",
            ObjectKind::Str(_) => "str",
            ObjectKind::Tuple(_) => "tuple",
            ObjectKind::Dict(_) => "dict",
            ObjectKind::Function(_) => "builtin_function_or_method",
            ObjectKind::Type(_) => "type",
            ObjectKind::Instance(inst) => inst.type_object().name(),
            ObjectKind::BoundMethod { .. } => "method",
        }
    }

    #[inline]
    pub fn is_none(&self) -> bool {
        matches!(self.kind(), ObjectKind::None)
    }

    #[inline]
    pub fn is_tuple(&self) -> bool {
        matches!(self.kind(), ObjectKind::Tuple(_))
    }

    #[inline]
    pub fn is_dict(&self) -> bool {
        matches!(self.kind(), ObjectKind::Dict(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.kind() {
            ObjectKind::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self.kind() {
            ObjectKind::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self.kind() {
            ObjectKind::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[PyObject]> {
        match self.kind() {
            ObjectKind::Tuple(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Dict> {
        match self.kind() {
            ObjectKind::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Add a method to a type object
    pub fn add_method(&self, name: impl Into<String>, function: PyObject) -> PyResult<()> {
        match self.kind() {
            ObjectKind::Type(ty) => {
                ty.methods.set(name.into(), function);
                Ok(())
            }
            _ => Err(PyErr::type_error(format!(
                "'{}' object has no method table",
                self.type_name()
            ))),
        }
    }

    /// Set an instance attribute
    pub fn set_attr(&self, name: impl Into<String>, value: PyObject) -> PyResult<()> {
        match self.kind() {
            ObjectKind::Instance(inst) => {
                inst.attrs.set(name.into(), value);
                Ok(())
            }
            _ => Err(PyErr::attribute_error(format!(
                "'{}' object attributes are read-only",
                self.type_name()
            ))),
        }
    }
}

impl fmt::Debug for PyObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            ObjectKind::None => f.write_str("None"),
            ObjectKind::Bool(true) => f.write_str("True"),
            ObjectKind::Bool(false) => f.write_str("False"),
            ObjectKind::Int(i) => write!(f, "{}", i),
            ObjectKind::Str(s) => write!(f, "{:?}", s),
            ObjectKind::Tuple(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{:?}", item)?;
                }
                if items.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
            ObjectKind::Dict(d) => {
                f.write_str("{")?;
                for (i, (key, value)) in d.items().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{:?}: {:?}", key, value)?;
                }
                f.write_str("}")
            }
            ObjectKind::Function(func) => write!(f, "<built-in function {}>", func.name),
            ObjectKind::Type(ty) => write!(f, "<class '{}'>", ty.name),
            ObjectKind::Instance(inst) => {
                write!(f, "<{} object at {:p}>", inst.type_object().name(), Arc::as_ptr(&self.0))
            }
            ObjectKind::BoundMethod { receiver, function } => {
                write!(f, "<bound method {:?} of {:?}>", function, receiver)
            }
        }
    }
}

/// Insertion-ordered mapping with string keys
#[derive(Default)]
pub struct Dict {
    entries: RwLock<Vec<(String, PyObject)>>,
}

impl Dict {
    pub fn get(&self, key: &str) -> Option<PyObject> {
        self.entries
            .read()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /// Insert or replace, keeping the original position of an existing key
    pub fn set(&self, key: String, value: PyObject) {
        let mut entries = self.entries.write();
        match entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => entries.push((key, value)),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().iter().any(|(k, _)| k == key)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Snapshot of all entries in insertion order
    pub fn items(&self) -> Vec<(String, PyObject)> {
        self.entries.read().clone()
    }
}

/// Native callable
pub struct NativeFunction {
    name: String,
    body: Arc<NativeFn>,
    vectorcall: bool,
}

impl NativeFunction {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the callable exposes a vector-call entry point
    pub fn has_vectorcall(&self) -> bool {
        self.vectorcall
    }

    #[inline]
    pub(crate) fn invoke(&self, args: &CallArgs<'_>) -> PyResult<PyObject> {
        (self.body)(args)
    }
}

/// Type object: a name and a method table
pub struct TypeObject {
    name: String,
    methods: Dict,
}

impl TypeObject {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(&self, name: &str) -> Option<PyObject> {
        self.methods.get(name)
    }
}

/// Instance of a `TypeObject` with its own attribute dict
pub struct Instance {
    ty: Arc<TypeObject>,
    attrs: Dict,
}

impl Instance {
    /// Shared with the type object, so methods added later are visible
    #[inline]
    pub fn type_object(&self) -> &TypeObject {
        &self.ty
    }

    pub fn attr(&self, name: &str) -> Option<PyObject> {
        self.attrs.get(name)
    }
}
