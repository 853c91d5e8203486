//! User-facing diagnostics on stderr.
//!
//! Three severities, each with its mandated line prefix. Debug lines are
//! gated on the engine configuration, not on an ambient global.

use std::fmt::Display;

pub fn info(msg: impl Display) {
    eprintln!("info: {msg}");
}

pub fn warning(msg: impl Display) {
    eprintln!("warning: {msg}");
}

pub fn debug(enabled: bool, msg: impl Display) {
    if enabled {
        eprintln!("debug: {msg}");
    }
}
