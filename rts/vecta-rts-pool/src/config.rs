//! Worker pool configuration.
//!
//! Defaults follow the machine: one worker per available core, 2 MiB
//! stacks, work stealing on. Every field can be overridden from the
//! environment with [`PoolConfig::from_env`]:
//!
//! | Variable              | Field          |
//! |-----------------------|----------------|
//! | `VECTA_WORKERS`       | `num_workers`  |
//! | `VECTA_STACK_SIZE`    | `stack_size`   |
//! | `VECTA_WORK_STEALING` | `work_stealing`|

use serde::{Deserialize, Serialize};
use std::thread;

use crate::DispatchError;

/// Environment variable overriding the worker count.
pub const ENV_WORKERS: &str = "VECTA_WORKERS";
/// Environment variable overriding the worker stack size (bytes).
pub const ENV_STACK_SIZE: &str = "VECTA_STACK_SIZE";
/// Environment variable toggling work stealing (`true`/`false`/`1`/`0`).
pub const ENV_WORK_STEALING: &str = "VECTA_WORK_STEALING";

/// Configuration for a [`WorkerPool`](crate::WorkerPool).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of worker threads.
    pub num_workers: usize,
    /// Stack size for worker threads.
    pub stack_size: usize,
    /// Let idle workers take keyed tasks routed to other workers.
    pub work_stealing: bool,
    /// Prefix for worker thread names.
    pub thread_name: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            num_workers: num_cpus(),
            stack_size: 2 * 1024 * 1024, // 2 MB
            work_stealing: true,
            thread_name: "vecta-worker".to_string(),
        }
    }
}

impl PoolConfig {
    /// Default configuration with overrides read from the environment.
    pub fn from_env() -> Result<Self, DispatchError> {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable source.
    ///
    /// Unset variables keep the current value; set but unparsable ones
    /// are rejected.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, DispatchError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_WORKERS) {
            self.num_workers = parse_var(ENV_WORKERS, &raw, |s| s.parse().ok())?;
        }
        if let Some(raw) = lookup(ENV_STACK_SIZE) {
            self.stack_size = parse_var(ENV_STACK_SIZE, &raw, |s| s.parse().ok())?;
        }
        if let Some(raw) = lookup(ENV_WORK_STEALING) {
            self.work_stealing = parse_var(ENV_WORK_STEALING, &raw, parse_flag)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject configurations no pool can be built from.
    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.num_workers == 0 {
            return Err(DispatchError::InvalidConfig {
                name: "num_workers",
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_var<T>(
    name: &'static str,
    raw: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T, DispatchError> {
    parse(raw.trim()).ok_or_else(|| DispatchError::InvalidConfig {
        name,
        value: raw.to_string(),
    })
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn num_cpus() -> usize {
    thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1)
}
