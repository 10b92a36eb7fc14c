/**
 * RAII guard that flushes the service when it goes out of scope.
 *
 * ```ignore
 * fn main() {
 *     let service = ErrorReportingService::new();
 *     service.initialize(&ConfigPatch::default())?;
 *     let _guard = Guard::new(service.clone());
 *
 *     // ... application logic, errors reported through `service` ...
 *
 * }   // <-- _guard is dropped here: flush, then stop the timer
 * ```
 *
 * The flush runs on the dropping thread and is bounded by the providers'
 * own timeouts. Whatever is still offline stays in the persisted mirror
 * and is picked up by the next `initialize`.
 */
use crate::service::ErrorReportingService;

pub struct Guard {
    service: ErrorReportingService,
}

impl Guard {
    pub fn new(service: ErrorReportingService) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &ErrorReportingService {
        &self.service
    }
}

impl Drop for Guard {
    fn drop(&mut self) {
        let summary = self.service.flush();
        self.service.shutdown();

        if summary.dropped > 0 {
            tracing::warn!(
                dropped = summary.dropped,
                "Final flush could not deliver every report"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigPatch;
    use crate::protocol::types::ErrorReport;
    use crate::providers::ConsoleProvider;
    use std::sync::Arc;

    #[test]
    fn test_drop_flushes_and_stops() {
        let service = ErrorReportingService::builder()
            .provider(Arc::new(ConsoleProvider::new(false)))
            .build();
        service
            .initialize(&ConfigPatch {
                enable_offline_support: Some(false),
                ..Default::default()
            })
            .expect("init");

        service.report_error(ErrorReport::builder("pending").build());
        assert_eq!(service.get_stats().queue_size, 1);

        drop(Guard::new(service.clone()));

        assert_eq!(service.get_stats().queue_size, 0);
        assert!(!service.is_running());
    }
}
