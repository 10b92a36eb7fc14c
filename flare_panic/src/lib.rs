/*!
 * Flare Panic Hook — turns panics into `critical` error reports.
 *
 * `install(service)` registers a `std::panic::set_hook` handler. When a
 * panic occurs, it:
 *
 * 1. Extracts the panic message, source location, and thread name.
 * 2. Captures the stack at the panic site.
 * 3. Builds an `ErrorReport` with `severity = critical`,
 *    `category = "panic"` and hands it to the service.
 * 4. Calls the previous panic hook (so the default stderr output is preserved).
 *
 * The report is only enqueued. It is delivered by the batch timer, a
 * batch-full trigger, or the `Guard` flush while the panic unwinds out of
 * `main`. Flushing from inside the hook could wait on a dispatch that is
 * itself waiting for the panicking thread.
 *
 * # Recursion safety
 *
 * A `thread_local` flag stops the hook from re-entering itself. Panics
 * raised inside a provider call (on whatever thread the dispatch runs) and
 * panics on the SDK's own threads (`flare-*`) are not reported: those are
 * provider failures, already logged by the service.
 */

use std::cell::Cell;
use std::panic;
use std::panic::PanicHookInfo;
use std::sync::atomic::{AtomicBool, Ordering};

use flare_core::{ErrorReport, ErrorReportingService, Severity};

/// Category given to every panic report.
pub const PANIC_CATEGORY: &str = "panic";

// ---------------------------------------------------------------------------
// Guards
// ---------------------------------------------------------------------------

/// Ensures `install()` is idempotent: calling it multiple times
/// won't stack hooks and produce duplicate reports per panic.
static INSTALLED: AtomicBool = AtomicBool::new(false);

thread_local! {
    static IN_HOOK: Cell<bool> = const { Cell::new(false) };
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/**
 * Installs the Flare panic hook, reporting through `service`.
 *
 * Idempotent: subsequent calls are silent no-ops and keep the first
 * service.
 */
pub fn install(service: ErrorReportingService) {
    if INSTALLED.swap(true, Ordering::SeqCst) {
        return;
    }

    let previous_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        let is_recursive = IN_HOOK.with(|flag| flag.replace(true));

        if !is_recursive {
            let _ = panic::catch_unwind(panic::AssertUnwindSafe(|| {
                handle_panic(&service, info);
            }));

            IN_HOOK.with(|flag| flag.set(false));
        }

        previous_hook(info);
    }));

    tracing::debug!("Panic hook installed");
}

/// Whether `install` has already run in this process.
pub fn is_installed() -> bool {
    INSTALLED.load(Ordering::SeqCst)
}

// ---------------------------------------------------------------------------
// Internal: build and enqueue the panic report
// ---------------------------------------------------------------------------

fn handle_panic(service: &ErrorReportingService, info: &PanicHookInfo) {
    /* A provider panicking mid-dispatch, possibly inline on a caller's thread. */
    if flare_core::in_provider_call() {
        return;
    }

    let thread = std::thread::current();
    let thread_name = thread.name().unwrap_or("<unnamed>");
    if thread_name.starts_with("flare-") {
        return;
    }

    service.report_error(panic_report(
        info,
        thread_name,
        service.config().environment,
        flare_core::capture_stack(),
    ));
}

fn panic_message(info: &PanicHookInfo) -> String {
    match info.payload().downcast_ref::<&str>() {
        Some(s) => (*s).to_string(),
        None => match info.payload().downcast_ref::<String>() {
            Some(s) => s.clone(),
            None => "<unknown panic>".to_string(),
        },
    }
}

fn panic_report(
    info: &PanicHookInfo,
    thread_name: &str,
    environment: flare_core::Environment,
    stack: Option<String>,
) -> ErrorReport {
    let message = panic_message(info);

    let mut builder = ErrorReport::builder(format!("panic: {message}"))
        .severity(Severity::Critical)
        .category(PANIC_CATEGORY)
        .action("panic")
        .environment(environment)
        .data("thread", thread_name);

    if let Some(loc) = info.location() {
        builder = builder
            .component(loc.file())
            .data("line", loc.line())
            .data("column", loc.column());
    }

    if let Some(stack) = stack {
        builder = builder.stack(stack);
    }

    builder.build()
}
