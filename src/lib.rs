//! Handle Shim - handle-ABI call trampoline over a reference-counted object model
//!
//! Extension code never sees object references directly: it works with
//! opaque handles resolved through a `HandleContext`. This crate provides the
//! two directions of calling across that boundary:
//! - `trampoline`: the host calls a handle-based method implementation
//! - `call`: handle-based code calls any callable of the object model
//!
//! The C entry points live in `ffi`.

pub mod call;
pub mod config;
pub mod context;
pub mod ffi;
pub mod handles;
pub mod logging;
pub mod object;
pub mod trampoline;

mod fatal;

// Re-export core types
pub use call::{arg_span, call, call_method, call_tuple_dict, CallStrategy};
pub use config::{ConfigError, ShimConfig};
pub use context::{CallStats, HandleContext, ScopedHandle};
pub use handles::{Handle, HandleLeakError, LeakDetector, LeakDetectorError};
pub use object::{ExceptionKind, PyErr, PyObject, PyResult};
pub use trampoline::{call_real_function_from_trampoline, MethNoArgs, MethO, MethSignature, MethVarArgs};

/// Initialize logging from the environment and return the environment config
pub fn init() -> Result<ShimConfig, ConfigError> {
    let config = ShimConfig::from_env()?;
    init_with_config(&config);
    Ok(config)
}

/// Initialize logging for `config` (first call wins)
///
/// A `[log]` section that names a level or a file takes precedence over the
/// `HSHIM_LOG_*` variables.
pub fn init_with_config(config: &ShimConfig) {
    if config.log.level.is_some() || config.log.file.is_some() {
        logging::init_with_config(config.log.to_log_config());
    } else {
        logging::init();
    }
    logging::log_init(config.strategy().name());
}
