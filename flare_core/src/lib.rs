/*!
 * Flare Core — the error reporting engine.
 *
 * This crate owns the queues, the deduplication cache, the provider chain
 * and the background batch worker. End users normally depend on the
 * `flare` facade crate, which adds ambient context and the panic hook.
 *
 * # Module structure
 *
 * - `protocol/` — what we report: `ErrorReport`, enums, constants
 * - `providers/` — where reports go: console, local cache, remote
 * - `transport/` — how they get there: HTTP client, background worker
 * - `service` — the `ErrorReportingService` itself
 * - `config`, `dedup`, `queue`, `storage` — its building blocks
 * - `clock`, `random` — injectable time and randomness
 * - `guard` — RAII flush-on-drop
 */

pub mod clock;
pub mod config;
mod dedup;
pub mod error;
pub mod guard;
pub mod protocol;
pub mod providers;
pub mod queue;
pub mod random;
pub mod service;
pub mod storage;
pub mod transport;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigPatch, RemoteSettings, ReportingConfig};
pub use error::{ConfigError, FlareError, Result};
pub use guard::Guard;
pub use protocol::constants::SDK_VERSION;
pub use protocol::types::{Environment, ErrorReport, ReportBuilder, Severity};
pub use providers::{ConsoleProvider, LocalCacheProvider, RemoteProvider, ReportingProvider};
pub use random::{FixedRandom, MutexRng, RandomSource};
pub use service::{
    in_provider_call, Admission, BatchOutcome, ErrorReportingService, FlushSummary, ProviderStat,
    ReportingStats, ServiceBuilder,
};

// ---------------------------------------------------------------------------
// Stack capture
// ---------------------------------------------------------------------------

/**
 * Captures a backtrace at the call site and renders it as a stack string,
 * one `function (file:line)` frame per line.
 *
 * Returns `None` if no useful frames were resolved.
 */
pub fn capture_stack() -> Option<String> {
    let bt = backtrace::Backtrace::new();
    let stack = format_backtrace(&bt);
    if stack.is_empty() { None } else { Some(stack) }
}

/**
 * Renders a resolved `backtrace::Backtrace`.
 * Frames with neither a symbol name nor a file are skipped.
 */
pub fn format_backtrace(bt: &backtrace::Backtrace) -> String {
    let mut lines = Vec::new();

    for frame in bt.frames() {
        for symbol in frame.symbols() {
            let function = symbol.name().map(|n| n.to_string());
            let file = symbol.filename().map(|p| p.display().to_string());

            let line = match (function, file, symbol.lineno()) {
                (None, None, _) => continue,
                (Some(f), Some(path), Some(n)) => format!("{f} ({path}:{n})"),
                (Some(f), Some(path), None) => format!("{f} ({path})"),
                (Some(f), None, _) => f,
                (None, Some(path), Some(n)) => format!("<unknown> ({path}:{n})"),
                (None, Some(path), None) => format!("<unknown> ({path})"),
            };
            lines.push(line);
        }
    }

    lines.join("\n")
}
