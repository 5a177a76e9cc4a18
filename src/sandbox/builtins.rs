//! Engine construction: built-in functions and host hooks.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use rhai::{Engine, EvalAltResult, Position};

use crate::logging::SCRIPT_LOG_TARGET;
use crate::sandbox::heap::HeapUsage;
use crate::sandbox::{SandboxLimits, DEFAULT_MEMORY_LIMIT};

/// Bounds of the running invocation, read by the engine's hooks.
#[derive(Debug, Clone)]
pub(crate) struct Budget {
    pub deadline: Option<Instant>,
    pub memory_limit: usize,
    pub heap: HeapUsage,
}

impl Budget {
    /// Budget for an invocation starting now.
    pub fn starting_now(limits: SandboxLimits) -> Self {
        Self {
            deadline: Some(Instant::now() + limits.time_limit),
            memory_limit: limits.memory_limit,
            heap: HeapUsage::default(),
        }
    }
}

impl Default for Budget {
    fn default() -> Self {
        Self {
            deadline: None,
            memory_limit: DEFAULT_MEMORY_LIMIT,
            heap: HeapUsage::default(),
        }
    }
}

/// Budget shared between the host and the engine.
pub(crate) type SharedBudget = Arc<Mutex<Budget>>;

/// Builds a fresh, isolated engine bound to `budget`.
///
/// The progress hook aborts evaluation once the deadline has passed. The
/// variable hook fails with a data-size error once the data held by live
/// variables, summed over call frames, exceeds the memory limit.
pub(crate) fn sandboxed_engine(budget: SharedBudget) -> Engine {
    let mut engine = Engine::new();

    engine.disable_symbol("eval");

    // Milliseconds since the Unix epoch.
    engine.register_fn("now", || chrono::Utc::now().timestamp_millis());

    engine.on_print(|text| {
        tracing::debug!(target: SCRIPT_LOG_TARGET, "{text}");
    });
    engine.on_debug(|text, source, pos| {
        tracing::debug!(
            target: SCRIPT_LOG_TARGET,
            source = source.unwrap_or("<input>"),
            position = ?pos,
            "{text}"
        );
    });

    let progress_budget = Arc::clone(&budget);
    engine.on_progress(move |_operations| match progress_budget.lock().deadline {
        Some(at) if Instant::now() >= at => Some("interrupted".into()),
        _ => None,
    });

    guard_variable_sizes(&mut engine, budget);

    SandboxLimits::default().apply(&mut engine);
    engine
}

// `on_var` is marked volatile upstream.
#[allow(deprecated)]
fn guard_variable_sizes(engine: &mut Engine, budget: SharedBudget) {
    engine.on_var(move |_name, _index, context| {
        let mut budget = budget.lock();
        let held = budget.heap.measure(context.call_level(), context.scope());
        if held > budget.memory_limit {
            return Err(EvalAltResult::ErrorDataTooLarge(
                "Size of live script data".to_string(),
                Position::NONE,
            )
            .into());
        }
        Ok(None)
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_is_epoch_millis() {
        let engine = sandboxed_engine(SharedBudget::default());
        let now: i64 = engine.eval("now()").unwrap();
        let host = chrono::Utc::now().timestamp_millis();
        assert!((host - now).abs() < 5_000);
    }

    #[test]
    fn test_eval_is_disabled() {
        let engine = sandboxed_engine(SharedBudget::default());
        let result = engine
            .compile(r#"eval("40 + 2")"#)
            .map_err(|e| e.to_string())
            .and_then(|ast| engine.eval_ast::<i64>(&ast).map_err(|e| e.to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_expired_deadline_terminates() {
        let budget = Budget {
            deadline: Some(Instant::now()),
            ..Budget::default()
        };
        let engine = sandboxed_engine(Arc::new(Mutex::new(budget)));
        let err = engine.eval::<i64>("let x = 0; loop { x += 1; }").unwrap_err();
        assert!(matches!(*err, rhai::EvalAltResult::ErrorTerminated(..)));
    }

    #[test]
    fn test_live_variables_over_budget_fail() {
        let budget = Budget {
            memory_limit: 4096,
            ..Budget::default()
        };
        let engine = sandboxed_engine(Arc::new(Mutex::new(budget)));
        let script = r#"
            let a = "";
            a.pad(1500, "a");
            let b = "";
            b.pad(1500, "b");
            let c = "";
            c.pad(1500, "c");
            a.len() + b.len() + c.len()
        "#;
        let err = engine.eval::<i64>(script).unwrap_err();
        assert!(matches!(*err, rhai::EvalAltResult::ErrorDataTooLarge(..)), "{err}");

        let engine = sandboxed_engine(SharedBudget::default());
        assert_eq!(engine.eval::<i64>(script).unwrap(), 4500);
    }
}
