//! Engine configuration.
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default number of workers in the execution pool.
const DEFAULT_WORKER_COUNT: usize = 10;
/// Default linear-memory ceiling, in 64 KiB Wasm pages (32 MiB).
const DEFAULT_MAX_MEMORY_PAGES: u32 = 512;
/// Default limit enforced by the stack height instrumentation.
const DEFAULT_MAX_STACK_HEIGHT: u32 = 64 * 1024;
/// Default total deadline for one view call.
const DEFAULT_CALL_TIMEOUT_MILLIS: u64 = 5_000;
/// Default freshness bound for the memoized latest block height.
const DEFAULT_LATEST_HEIGHT_TTL_MILLIS: u64 = 500;
/// Default retry budget for a transient failure within one store lookup.
const DEFAULT_STORE_RETRIES: usize = 1;

/// View engine configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
// Disallow unknown fields to ensure config files and command-line overrides
// contain valid keys.
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Number of sandboxed workers executing guest code in parallel.
    pub worker_count: usize,
    /// Linear-memory ceiling per invocation, in 64 KiB Wasm pages.
    pub max_memory_pages: u32,
    /// Maximum instrumented stack height of guest code.
    pub max_stack_height: u32,
    /// Total wall-clock budget of a view call, in milliseconds. Store
    /// lookups and the guest invocation share this budget.
    pub call_timeout_millis: u64,
    /// How long the latest indexed block height may be served from memory,
    /// in milliseconds.
    pub latest_height_ttl_millis: u64,
    /// How many times a single store lookup is retried on transient
    /// failures.
    pub store_retries: usize,
}

impl EngineConfig {
    /// The call deadline as a [`Duration`].
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_millis)
    }

    /// The latest-height memo TTL as a [`Duration`].
    pub fn latest_height_ttl(&self) -> Duration {
        Duration::from_millis(self.latest_height_ttl_millis)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            worker_count: DEFAULT_WORKER_COUNT,
            max_memory_pages: DEFAULT_MAX_MEMORY_PAGES,
            max_stack_height: DEFAULT_MAX_STACK_HEIGHT,
            call_timeout_millis: DEFAULT_CALL_TIMEOUT_MILLIS,
            latest_height_ttl_millis: DEFAULT_LATEST_HEIGHT_TTL_MILLIS,
            store_retries: DEFAULT_STORE_RETRIES,
        }
    }
}
