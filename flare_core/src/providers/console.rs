/**
 * Console provider — dumps reports to stderr.
 *
 * Verbose output is meant for development; in other environments the
 * provider accepts reports silently. It always reports success, which
 * makes it the catch-all at the bottom of the chain.
 */
use std::io::Write;
use std::sync::Mutex;

use super::ReportingProvider;
use crate::protocol::types::ErrorReport;

pub const CONSOLE_PROVIDER: &str = "console";
const CONSOLE_PRIORITY: i32 = 1;

pub struct ConsoleProvider {
    verbose: bool,
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleProvider {
    pub fn new(verbose: bool) -> Self {
        Self::with_writer(verbose, Box::new(std::io::stderr()))
    }

    /// Same as `new` but writes somewhere other than stderr.
    pub fn with_writer(verbose: bool, out: Box<dyn Write + Send>) -> Self {
        Self { verbose, out: Mutex::new(out) }
    }

    fn render(report: &ErrorReport) -> String {
        let mut block = format!(
            "[Flare] {} error ({}): {}\n",
            report.severity, report.category, report.message
        );
        block.push_str(&format!("  id:          {}\n", report.id));
        block.push_str(&format!("  timestamp:   {}\n", report.timestamp));
        if let Some(ref component) = report.component {
            block.push_str(&format!("  component:   {component}\n"));
        }
        if let Some(ref action) = report.action {
            block.push_str(&format!("  action:      {action}\n"));
        }
        if !report.url.is_empty() {
            block.push_str(&format!("  url:         {}\n", report.url));
        }
        if !report.additional_data.is_empty() {
            let data = serde_json::Value::Object(report.additional_data.clone());
            block.push_str(&format!("  data:        {data}\n"));
        }
        if let Some(ref stack) = report.stack {
            block.push_str("  stack:\n");
            for line in stack.lines() {
                block.push_str(&format!("    {line}\n"));
            }
        }
        block
    }
}

impl ReportingProvider for ConsoleProvider {
    fn name(&self) -> &str {
        CONSOLE_PROVIDER
    }

    fn priority(&self) -> i32 {
        CONSOLE_PRIORITY
    }

    fn report(&self, report: &ErrorReport) -> bool {
        if !self.verbose {
            return true;
        }

        /* One write per report so concurrent dumps don't interleave. */
        let block = Self::render(report);
        if let Ok(mut out) = self.out.lock() {
            let _ = out.write_all(block.as_bytes());
            let _ = out.flush();
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_verbose_dump_contains_key_fields() {
        let buf = SharedBuf::default();
        let provider = ConsoleProvider::with_writer(true, Box::new(buf.clone()));
        let report = ErrorReport::builder("submit failed")
            .category("ui")
            .component("Quiz")
            .action("submit")
            .stack("at quiz.rs:10\nat main.rs:3")
            .build();

        assert!(provider.report(&report));

        let text = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert!(text.contains("submit failed"));
        assert!(text.contains("component:   Quiz"));
        assert!(text.contains("    at main.rs:3"));
    }

    #[test]
    fn test_quiet_mode_still_accepts() {
        let buf = SharedBuf::default();
        let provider = ConsoleProvider::with_writer(false, Box::new(buf.clone()));
        assert!(provider.report(&ErrorReport::builder("x").build()));
        assert!(buf.0.lock().unwrap().is_empty());
    }
}
