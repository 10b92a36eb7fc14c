/**
 * Local cache provider — keeps the most recent reports on disk.
 *
 * Every accepted report is appended to the JSON list stored under
 * `error_reports`, read-modify-write, keeping at most 1000 entries
 * (oldest evicted first).
 */
use std::path::Path;
use std::sync::Mutex;

use super::ReportingProvider;
use crate::error::Result;
use crate::protocol::constants::{MAX_CACHED_REPORTS, STORAGE_KEY};
use crate::protocol::types::ErrorReport;
use crate::storage::JsonStore;

pub const LOCAL_CACHE_PROVIDER: &str = "localStorage";
const LOCAL_CACHE_PRIORITY: i32 = 2;

pub struct LocalCacheProvider {
    store: JsonStore,
    enabled: bool,
    capacity: usize,
    /// Serializes the read-modify-write cycle across concurrent reports.
    write_lock: Mutex<()>,
}

impl LocalCacheProvider {
    pub fn new(dir: &Path, enabled: bool) -> Self {
        Self::with_capacity(dir, enabled, MAX_CACHED_REPORTS)
    }

    pub fn with_capacity(dir: &Path, enabled: bool, capacity: usize) -> Self {
        Self {
            store: JsonStore::new(dir),
            enabled,
            capacity,
            write_lock: Mutex::new(()),
        }
    }

    /// Reports currently cached, oldest first.
    pub fn cached(&self) -> Result<Vec<ErrorReport>> {
        self.store.read_list(STORAGE_KEY)
    }

    fn append(&self, report: &ErrorReport) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());

        /* An unreadable cache is replaced rather than blocking every write. */
        let mut reports = self.store.read_list(STORAGE_KEY).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Discarding unreadable local report cache");
            Vec::new()
        });

        reports.push(report.clone());
        if reports.len() > self.capacity {
            let excess = reports.len() - self.capacity;
            reports.drain(..excess);
        }

        self.store.write_list(STORAGE_KEY, &reports)
    }
}

impl ReportingProvider for LocalCacheProvider {
    fn name(&self) -> &str {
        LOCAL_CACHE_PROVIDER
    }

    fn priority(&self) -> i32 {
        LOCAL_CACHE_PRIORITY
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn report(&self, report: &ErrorReport) -> bool {
        match self.append(report) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, report_id = %report.id, "Failed to cache report locally");
                false
            }
        }
    }
}
