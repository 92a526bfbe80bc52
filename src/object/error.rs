//! Exception values raised by the object model
//!
//! Failures travel as `PyErr` inside `PyResult` until they reach the handle
//! boundary, where the context turns them into the error indicator plus a
//! null handle.

use std::fmt;

/// Exception classes the object model can raise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionKind {
    TypeError,
    AttributeError,
    ValueError,
    RuntimeError,
    SystemError,
}

impl ExceptionKind {
    /// Class name as the host runtime spells it
    pub const fn name(self) -> &'static str {
        match self {
            Self::TypeError => "TypeError",
            Self::AttributeError => "AttributeError",
            Self::ValueError => "ValueError",
            Self::RuntimeError => "RuntimeError",
            Self::SystemError => "SystemError",
        }
    }
}

impl fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A raised exception: class plus message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PyErr {
    kind: ExceptionKind,
    message: String,
}

impl PyErr {
    pub fn new(kind: ExceptionKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::TypeError, message)
    }

    pub fn attribute_error(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::AttributeError, message)
    }

    pub fn system_error(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::SystemError, message)
    }

    #[inline]
    pub fn kind(&self) -> ExceptionKind {
        self.kind
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Check exception class
    #[inline]
    pub fn is(&self, kind: ExceptionKind) -> bool {
        self.kind == kind
    }
}

impl fmt::Display for PyErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for PyErr {}

/// Result of any object-model operation
pub type PyResult<T> = Result<T, PyErr>;
