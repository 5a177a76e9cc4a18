//! Internal logging helpers for structured rowscript events.

/// Single `tracing` target for rowscript.
pub(crate) const LOG_TARGET: &str = "rowscript";

/// `tracing` target for output produced by scripts through `print`/`debug`.
pub(crate) const SCRIPT_LOG_TARGET: &str = "rowscript::script";
