/**
 * Minimal harness for the Flare error reporting SDK.
 *
 * Reports go to the console and to `./.flare/error_reports.json`. Point
 * `FLARE_REPORTING_ENDPOINT` at a collector and set `FLARE_ENV=production`
 * to also send them over HTTP. Then run:
 *
 *   cargo run -p flare_demo
 *   cargo run -p flare_demo -- --offline   # queue while offline, then reconnect
 *   cargo run -p flare_demo -- --panic     # test panic capture
 */
use flare::{Admission, Severity};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), flare::FlareError> {
    let args: Vec<String> = std::env::args().collect();
    let test_panic = args.iter().any(|a| a == "--panic");
    let test_offline = args.iter().any(|a| a == "--offline");

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let flare = flare::init(flare::ConfigPatch {
        batch_size: Some(3),
        ..Default::default()
    })?;
    let _guard = flare.guard();

    flare.context().set_user(Some("demo-user".into()));
    flare.context().set_extra("demo", true);

    if test_offline {
        println!("[demo] Going offline");
        flare.set_online(false);
    }

    /*
     * A plain message.
     */
    flare.capture_message("Hello from the Flare demo!", Severity::Low);
    println!("[demo] Sent a text message");

    /*
     * A real error (file not found).
     */
    if let Err(e) = std::fs::read_to_string("/nonexistent/path.txt") {
        flare.capture_error(&e);
        println!("[demo] Sent an io::Error: {e}");
    }

    /*
     * The same failure twice inside the deduplication window: only the
     * first one is queued.
     */
    for attempt in 1..=2 {
        let report = flare
            .builder("Quiz submission failed")
            .category("network")
            .component("QuizScreen")
            .action("submit")
            .data("attempt", attempt);
        match flare.capture(report) {
            Admission::Queued => println!("[demo] Quiz failure #{attempt} queued"),
            other => println!("[demo] Quiz failure #{attempt} not queued: {other:?}"),
        }
    }

    if test_offline {
        let stats = flare.stats();
        println!(
            "[demo] Offline: {} pending, {} held offline",
            stats.queue_size, stats.offline_queue_size
        );
        println!("[demo] Back online");
        flare.set_online(true);
    }

    /*
     * The panic hook (catch_panics = true by default) queues this one;
     * the guard flushes it while the stack unwinds.
     */
    if test_panic {
        println!("[demo] Triggering a panic...");
        panic!("Test panic from the Flare demo");
    }

    match serde_json::to_string_pretty(&flare.stats()) {
        Ok(stats) => println!("[demo] Stats:\n{stats}"),
        Err(e) => tracing::warn!(error = %e, "Could not render stats"),
    }

    println!("[demo] Done. Pending reports are flushed when _guard drops.");
    Ok(())
}
