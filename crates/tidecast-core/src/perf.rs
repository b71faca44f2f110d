//! Opt-in development timing hook.
//!
//! Setting `TIDECAST_PERF=1` prints per-phase wall times to stderr. The flag
//! is resolved once per process; nothing in the engine depends on it.

use std::sync::OnceLock;
use std::time::Instant;

static PERF_ENABLED: OnceLock<bool> = OnceLock::new();

/// Whether perf timing output is enabled.
pub fn is_enabled() -> bool {
    *PERF_ENABLED.get_or_init(|| {
        std::env::var("TIDECAST_PERF").map(|v| v == "1").unwrap_or(false)
    })
}

/// Time a phase, printing its duration to stderr when enabled.
pub fn timed<T, F: FnOnce() -> T>(phase: &str, f: F) -> T {
    if !is_enabled() {
        return f();
    }
    let start = Instant::now();
    let out = f();
    eprintln!("[tidecast perf] {}: {:.3?}", phase, start.elapsed());
    out
}
