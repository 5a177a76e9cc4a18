//! Sandboxed execution of user enrichment functions.
//!
//! User code is a Rhai script defining a function (by convention `enrich`)
//! that receives one row as an object map and returns any value. Each
//! [`CompiledFunction`] owns its own engine, so no script state leaks between
//! compilations. Every invocation runs under [`SandboxLimits`]:
//!
//! - the time budget is enforced by the engine's progress hook, which aborts
//!   evaluation once the deadline passes;
//! - the memory budget caps string bytes and array/map element counts per
//!   value, the engine's variable hook fails once the data held across all
//!   live variables and call frames exceeds it, and runaway recursion trips
//!   the engine's call-depth ceiling.
//!
//! Script faults are returned as [`SandboxResult::Failure`] values, never as
//! errors, so a caller can record them and move on to the next row.

mod builtins;
mod heap;
mod limits;

pub use limits::{SandboxLimits, DEFAULT_MEMORY_LIMIT, DEFAULT_TIME_LIMIT};

use std::fmt;
use std::sync::Arc;

use rhai::{CallFnOptions, Dynamic, Engine, EvalAltResult, Position, Scope, AST};
use serde::Serialize;

use crate::error::{Result, RowscriptError};
use crate::types::JsonValue;

use self::builtins::{sandboxed_engine, Budget, SharedBudget};

/// Why a script invocation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    /// The time budget ran out and the engine was interrupted.
    Timeout,
    /// A data-size or call-depth ceiling was hit.
    MemoryExceeded,
    /// Any other script exception, including user `throw`.
    RuntimeError,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureKind::Timeout => "timeout",
            FailureKind::MemoryExceeded => "memory exceeded",
            FailureKind::RuntimeError => "runtime error",
        })
    }
}

/// Outcome of one script invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum SandboxResult {
    /// The function returned; the value is already converted to JSON.
    Success(JsonValue),
    /// The function failed; `message` is the engine's text, unmodified.
    Failure { kind: FailureKind, message: String },
}

impl SandboxResult {
    fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        SandboxResult::Failure {
            kind,
            message: message.into(),
        }
    }

    /// Returns true for [`SandboxResult::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, SandboxResult::Success(_))
    }
}

/// Compiles `source` and locates the function named `function_name`.
///
/// # Errors
///
/// Returns [`RowscriptError::CompileError`] carrying the engine's parse
/// diagnostics if the source does not parse, or if it parses but defines no
/// function with that name.
pub fn compile(function_name: &str, source: &str) -> Result<CompiledFunction> {
    let budget = SharedBudget::default();
    let engine = sandboxed_engine(Arc::clone(&budget));

    let ast = engine
        .compile(source)
        .map_err(|e| RowscriptError::CompileError(e.to_string()))?;

    let arities: Vec<usize> = ast
        .iter_functions()
        .filter(|f| f.name == function_name)
        .map(|f| f.params.len())
        .collect();
    // Prefer the one-argument overload; otherwise the smallest arity.
    let arity = if arities.contains(&1) {
        1
    } else {
        arities.iter().copied().min().ok_or_else(|| {
            RowscriptError::CompileError(format!("Function '{function_name}' is not defined"))
        })?
    };

    Ok(CompiledFunction {
        engine,
        ast,
        name: function_name.to_string(),
        arity,
        budget,
    })
}

/// A parsed script bound to one function name, ready to be invoked per row.
pub struct CompiledFunction {
    engine: Engine,
    ast: AST,
    name: String,
    arity: usize,
    budget: SharedBudget,
}

impl fmt::Debug for CompiledFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

impl CompiledFunction {
    /// Returns the function name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Calls the function with `input` as its sole argument.
    ///
    /// A function declaring no parameters is called without the input; extra
    /// declared parameters receive unit.
    pub fn invoke(&mut self, input: &JsonValue, limits: SandboxLimits) -> SandboxResult {
        limits.apply(&mut self.engine);

        let arg = match rhai::serde::to_dynamic(input) {
            Ok(arg) => arg,
            Err(err) => return SandboxResult::failure(FailureKind::RuntimeError, err.to_string()),
        };
        let mut args = Vec::with_capacity(self.arity);
        if self.arity > 0 {
            args.push(arg);
            args.resize(self.arity, Dynamic::UNIT);
        }

        let options = CallFnOptions::new().eval_ast(false).rewind_scope(true);
        let mut scope = Scope::new();

        *self.budget.lock() = Budget::starting_now(limits);
        let outcome = self.engine.call_fn_with_options::<Dynamic>(
            options,
            &mut scope,
            &self.ast,
            &self.name,
            args,
        );
        *self.budget.lock() = Budget::default();

        match outcome {
            Ok(value) => match rhai::serde::from_dynamic::<JsonValue>(&value) {
                Ok(json) => SandboxResult::Success(json),
                Err(err) => SandboxResult::failure(
                    FailureKind::RuntimeError,
                    format!("Unsupported return value of type '{}': {err}", value.type_name()),
                ),
            },
            Err(err) => self.classify(&err),
        }
    }

    fn classify(&self, err: &EvalAltResult) -> SandboxResult {
        match err.unwrap_inner() {
            EvalAltResult::ErrorTerminated(_, pos) | EvalAltResult::ErrorTooManyOperations(pos) => {
                SandboxResult::failure(FailureKind::Timeout, interrupted_message(&self.name, *pos))
            }
            EvalAltResult::ErrorDataTooLarge(..) | EvalAltResult::ErrorStackOverflow(..) => {
                SandboxResult::failure(FailureKind::MemoryExceeded, err.to_string())
            }
            _ => SandboxResult::failure(FailureKind::RuntimeError, err.to_string()),
        }
    }
}

/// Formats an interruption the way a stack trace reports it: the error line
/// followed by one frame naming the function and, when known, the source line.
fn interrupted_message(function_name: &str, pos: Position) -> String {
    match pos.line() {
        Some(line) => {
            format!("InternalError: interrupted\n    at {function_name} (<input>:{line})\n")
        }
        None => format!("InternalError: interrupted\n    at {function_name} (<input>)\n"),
    }
}
