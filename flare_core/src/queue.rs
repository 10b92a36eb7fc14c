/**
 * Pending and offline report queues.
 *
 * A report lives in exactly one place: the pending queue, the offline
 * queue, or (once a batch has been taken) the dispatching caller. Every
 * operation here moves reports, none copies them.
 */
use std::collections::VecDeque;

use crate::protocol::types::ErrorReport;

#[derive(Debug, Default)]
pub struct ReportQueues {
    pending: VecDeque<ErrorReport>,
    offline: VecDeque<ErrorReport>,
}

impl ReportQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends to the pending queue and returns its new length.
    pub fn push(&mut self, report: ErrorReport) -> usize {
        self.pending.push_back(report);
        self.pending.len()
    }

    /// Removes up to `max` reports from the front of the pending queue.
    pub fn take_batch(&mut self, max: usize) -> Vec<ErrorReport> {
        let n = max.min(self.pending.len());
        self.pending.drain(..n).collect()
    }

    /// Parks a drained batch in the offline queue, keeping its order.
    pub fn defer_offline(&mut self, batch: Vec<ErrorReport>) {
        self.offline.extend(batch);
    }

    /**
     * Moves every offline report to the front of the pending queue.
     *
     * Offline reports keep their relative order and end up ahead of
     * anything enqueued while offline. Returns how many were moved.
     */
    pub fn restore_offline(&mut self) -> usize {
        let restored: Vec<ErrorReport> = self.offline.drain(..).collect();
        let count = restored.len();
        self.prepend(restored);
        count
    }

    /// Puts `reports` at the front of the pending queue, in order.
    pub fn prepend(&mut self, reports: Vec<ErrorReport>) {
        for report in reports.into_iter().rev() {
            self.pending.push_front(report);
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn offline_len(&self) -> usize {
        self.offline.len()
    }

    pub fn offline_reports(&self) -> impl Iterator<Item = &ErrorReport> {
        self.offline.iter()
    }

    pub fn pending_reports(&self) -> impl Iterator<Item = &ErrorReport> {
        self.pending.iter()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.offline.clear();
    }
}
