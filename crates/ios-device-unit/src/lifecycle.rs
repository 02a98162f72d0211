//! Process termination on unrecoverable faults.
//!
//! The unit exits with status 1 and relies on its supervisor (container
//! runtime, systemd) to restart it with fresh automation state.

use tracing::error;
use wda_bridge::ports::Lifecycle;
use wda_bridge::FatalReason;

const FATAL_EXIT_CODE: i32 = 1;

type ExitFn = Box<dyn Fn(i32) + Send + Sync>;

pub struct ProcessLifecycle {
    exit: ExitFn,
}

impl ProcessLifecycle {
    pub fn new() -> Self {
        Self {
            exit: Box::new(|code| std::process::exit(code)),
        }
    }

    /// Replace the exit call.
    #[cfg(test)]
    pub fn with_exit(exit: impl Fn(i32) + Send + Sync + 'static) -> Self {
        Self {
            exit: Box::new(exit),
        }
    }
}

impl Default for ProcessLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle for ProcessLifecycle {
    fn fatal(&self, reason: &FatalReason) {
        error!(%reason, code = FATAL_EXIT_CODE, "Shutting down unit");
        (self.exit)(FATAL_EXIT_CODE);
    }
}
