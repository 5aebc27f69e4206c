//! Configuration surface for embedders: everything a host can choose
//! before `Engine::new` runs the bootstrap, plus a `Default` matching the
//! reference implementation's own defaults.

use std::path::PathBuf;

use crate::cell::DEFAULT_CORE_SIZE;
use crate::registers::ErrorAction;

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Total image size, in cells. Rejected below `MIN_CORE`. Ignored when
    /// `core_image_path` is set, since a loaded image keeps its own size.
    pub core_size: usize,

    /// Initial `BASE` register value: `0` for C-style auto-detected radix.
    pub initial_base: crate::cell::Cell,

    /// Initial `ERROR_HANDLER` policy for recoverable errors raised during
    /// `run`/`eval`.
    pub error_action: ErrorAction,

    /// A previously saved core image to resume from instead of running the
    /// bootstrap sequence fresh.
    pub core_image_path: Option<PathBuf>,
}

impl Default for EngineOptions {
    fn default() -> EngineOptions {
        EngineOptions {
            core_size: DEFAULT_CORE_SIZE,
            initial_base: 0,
            error_action: ErrorAction::Recover,
            core_image_path: None,
        }
    }
}
