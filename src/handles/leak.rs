//! Leak detection over debug generations
//!
//! A detector opens a new generation on `start` and, on `stop`, reports every
//! handle from that generation onwards that is still open.

use super::DebugHandle;
use crate::context::HandleContext;
use crate::logging::log_leaks;
use std::fmt;

/// Handles left open between `start` and `stop`
#[derive(Debug, Clone)]
pub struct HandleLeakError {
    pub leaks: Vec<DebugHandle>,
}

impl fmt::Display for HandleLeakError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.leaks.len();
        let s = if n != 1 { "s" } else { "" };
        write!(f, "{} unclosed handle{}:", n, s)?;
        for leak in &self.leaks {
            write!(f, "\n    {:?}", leak)?;
        }
        Ok(())
    }
}

impl std::error::Error for HandleLeakError {}

/// Misuse of the detector, or leaks found on `stop`
#[derive(Debug)]
pub enum LeakDetectorError {
    AlreadyStarted,
    NotStarted,
    Leaked(HandleLeakError),
}

impl fmt::Display for LeakDetectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyStarted => write!(f, "LeakDetector already started"),
            Self::NotStarted => write!(f, "LeakDetector not started yet"),
            Self::Leaked(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for LeakDetectorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Leaked(err) => Some(err),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct LeakDetector {
    generation: Option<u64>,
}

impl LeakDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, ctx: &HandleContext) -> Result<(), LeakDetectorError> {
        if self.generation.is_some() {
            return Err(LeakDetectorError::AlreadyStarted);
        }
        self.generation = Some(ctx.new_generation());
        Ok(())
    }

    pub fn stop(&mut self, ctx: &HandleContext) -> Result<(), LeakDetectorError> {
        let generation = self.generation.ok_or(LeakDetectorError::NotStarted)?;
        let leaks = ctx.open_handles(generation);
        if leaks.is_empty() {
            return Ok(());
        }
        log_leaks(leaks.len(), generation);
        Err(LeakDetectorError::Leaked(HandleLeakError { leaks }))
    }

    /// Run `f` between `start` and `stop`
    pub fn run<R>(
        ctx: &HandleContext,
        f: impl FnOnce(&HandleContext) -> R,
    ) -> Result<R, LeakDetectorError> {
        let mut detector = Self::new();
        detector.start(ctx)?;
        let result = f(ctx);
        detector.stop(ctx)?;
        Ok(result)
    }
}
