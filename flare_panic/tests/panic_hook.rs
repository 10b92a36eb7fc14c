//! The hook is process-global, so everything lives in one test.

use std::sync::{Arc, Mutex};
use std::thread;

use flare_core::{ConfigPatch, ErrorReport, ErrorReportingService, ReportingProvider, Severity};

#[derive(Default)]
struct Capture {
    reports: Mutex<Vec<ErrorReport>>,
}

impl ReportingProvider for Capture {
    fn name(&self) -> &str {
        "capture"
    }

    fn priority(&self) -> i32 {
        1
    }

    fn report(&self, report: &ErrorReport) -> bool {
        self.reports.lock().unwrap().push(report.clone());
        true
    }
}

#[test]
fn panics_become_critical_reports() {
    let capture = Arc::new(Capture::default());
    let service = ErrorReportingService::builder().provider(capture.clone()).build();
    service
        .update_config(&ConfigPatch {
            enable_offline_support: Some(false),
            ..Default::default()
        })
        .expect("valid");

    flare_panic::install(service.clone());
    flare_panic::install(service.clone());
    assert!(flare_panic::is_installed());

    let joined = thread::Builder::new()
        .name("quiz-worker".into())
        .spawn(|| panic!("answer index out of bounds"))
        .expect("spawn")
        .join();
    assert!(joined.is_err());

    /* One report despite installing twice. */
    assert_eq!(service.get_stats().queue_size, 1);
    service.flush();

    let reports = capture.reports.lock().unwrap();
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.message, "panic: answer index out of bounds");
    assert_eq!(report.severity, Severity::Critical);
    assert_eq!(report.category, flare_panic::PANIC_CATEGORY);
    assert_eq!(report.additional_data["thread"], "quiz-worker");
    assert!(report.component.as_deref().unwrap_or("").ends_with("panic_hook.rs"));
}
