//! Diagnostic output: a `( kind "message" )` stderr line, plus a
//! structured `tracing` event for hosts that want to route diagnostics
//! through their own subscriber instead of scraping text.
//!
//! The library never installs a subscriber itself; only a demo binary does.

use std::io::Write;

pub fn emit(out: &mut dyn Write, kind: &str, message: &str) {
    let _ = writeln!(out, "( {} \"{}\" )", kind, message);
    match kind {
        "fatal" => tracing::error!(kind, message),
        _ => tracing::warn!(kind, message),
    }
}
