//! Typed errors for the interpreter, grounded in the four-kind error model
//! the dispatch loop implements: initialization failure, fatal error,
//! recoverable error, and the informational end-of-input condition.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ForthError {
    #[error("image too small: {requested} cells (minimum {minimum})")]
    ImageTooSmall { requested: usize, minimum: usize },

    /// Illegal opcode, out-of-bounds access, or stack bounds violation.
    /// Sets `INVALID`; the instance refuses further operations.
    #[error("fatal: {reason}")]
    Fatal { reason: String },

    /// Unknown word, numeric parse failure, stack under/overflow, or
    /// divide by zero. Handled per the `ERROR_HANDLER` register.
    #[error("error: {reason}")]
    Recoverable { reason: String },

    /// The instance has previously gone fatal; no further operations are
    /// permitted.
    #[error("interpreter is invalid")]
    Invalid,

    #[error("end of input")]
    Eof,

    #[error("core image header mismatch: {reason}")]
    BadImage { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type ForthResult<T> = Result<T, ForthError>;
