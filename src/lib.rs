//! An embeddable indirect-threaded Forth interpreter.
//!
//! The virtual machine is a flat cell array holding registers, a
//! dictionary, a parse buffer, and two stacks; see [`Engine`] for the
//! public surface.
//!
//! ```
//! use emforth::{Engine, EngineOptions};
//!
//! let mut engine = Engine::new(EngineOptions::default()).unwrap();
//! engine.eval("2 2 +").unwrap();
//! assert_eq!(engine.pop().unwrap(), 4);
//! ```

mod bootstrap;
mod cell;
mod config;
mod dictionary;
mod engine;
mod error;
mod files;
mod image;
mod io_source;
mod logging;
mod numeric;
mod opcode;
mod registers;
mod serializer;

pub use config::EngineOptions;
pub use engine::{Engine, ReadOutcome};
pub use error::{ForthError, ForthResult};
pub use registers::ErrorAction;
