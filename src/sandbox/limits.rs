//! Resource limits applied to every script invocation.

use std::time::Duration;

use rhai::{Dynamic, Engine};

use crate::error::{Result, RowscriptError};

/// Default wall-clock budget per invocation (100ms).
pub const DEFAULT_TIME_LIMIT: Duration = Duration::from_millis(100);

/// Default script heap ceiling (4 MiB).
pub const DEFAULT_MEMORY_LIMIT: usize = 4 * 1024 * 1024;

/// CPU-time and memory bounds for one script invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SandboxLimits {
    /// Deadline measured from the start of the invocation.
    pub time_limit: Duration,
    /// Ceiling on script-managed data, in bytes.
    pub memory_limit: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            time_limit: DEFAULT_TIME_LIMIT,
            memory_limit: DEFAULT_MEMORY_LIMIT,
        }
    }
}

impl SandboxLimits {
    /// Creates limits with the default budget.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the time limit.
    #[must_use]
    pub fn with_time_limit(mut self, time_limit: Duration) -> Self {
        self.time_limit = time_limit;
        self
    }

    /// Sets the memory limit in bytes.
    #[must_use]
    pub fn with_memory_limit(mut self, memory_limit: usize) -> Self {
        self.memory_limit = memory_limit;
        self
    }

    /// Validates the limits.
    ///
    /// # Errors
    ///
    /// Returns an error if either limit is zero.
    pub fn validate(&self) -> Result<()> {
        if self.time_limit.is_zero() {
            return Err(RowscriptError::ValidationError(
                "time_limit must be greater than zero".to_string(),
            ));
        }
        if self.memory_limit == 0 {
            return Err(RowscriptError::ValidationError(
                "memory_limit must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of script values that fit in the memory limit.
    #[must_use]
    pub fn max_elements(&self) -> usize {
        (self.memory_limit / std::mem::size_of::<Dynamic>()).max(1)
    }

    /// Maps the memory limit onto the engine's data-size ceilings.
    ///
    /// Strings are bounded in bytes; arrays and maps by the number of values
    /// that fit in the same budget, counted across nesting. These bound a
    /// single value; the total held in variables is checked by the engine's
    /// variable hook (see `heap.rs`).
    pub(crate) fn apply(&self, engine: &mut Engine) {
        engine
            .set_max_string_size(self.memory_limit.max(1))
            .set_max_array_size(self.max_elements())
            .set_max_map_size(self.max_elements());
    }
}
