//! Contract violations - unrecoverable, process-terminating
//!
//! Reached only when a callable is invoked differently from how it was
//! registered, or when an argument vector is corrupt. No caller can recover.

use crate::logging::log_fatal;

/// Log the violation and abort the process
#[cold]
#[inline(never)]
pub(crate) fn abort_on_violation(what: &str) -> ! {
    log_fatal(what);
    eprintln!("handle-shim: fatal contract violation: {}", what);
    std::process::abort()
}
