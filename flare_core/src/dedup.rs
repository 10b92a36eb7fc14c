/**
 * Deduplication cache.
 *
 * Maps a report's dedup key to the time it was last admitted. A key seen
 * inside the window is rejected and its timestamp is left alone, so the
 * first occurrence wins until the window lapses on its own.
 */
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Default)]
pub struct DedupCache {
    last_seen: HashMap<String, i64>,
}

impl DedupCache {
    pub fn new() -> Self {
        Self::default()
    }

    /**
     * Returns `true` if a report with `key` should be enqueued at `now_ms`.
     *
     * Admitting a key records `now_ms` for it and prunes every entry whose
     * window has already expired.
     */
    pub fn admit(&mut self, key: &str, now_ms: i64, window: Duration) -> bool {
        let window_ms = window.as_millis() as i64;

        if let Some(&seen) = self.last_seen.get(key) {
            if now_ms - seen < window_ms {
                return false;
            }
        }

        self.last_seen.retain(|_, seen| now_ms - *seen < window_ms);
        self.last_seen.insert(key.to_string(), now_ms);
        true
    }

    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn clear(&mut self) {
        self.last_seen.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    #[test]
    fn test_second_hit_inside_window_is_rejected() {
        let mut cache = DedupCache::new();
        assert!(cache.admit("ui|Quiz|submit|X", 0, WINDOW));
        assert!(!cache.admit("ui|Quiz|submit|X", 1_000, WINDOW));
        assert_eq!(cache.len(), 1);
    }

    /**
     * A rejected hit must not extend the window: after 59 s and 61 s the
     * key is admitted again because the original timestamp still counts.
     */
    #[test]
    fn test_rejection_does_not_refresh_window() {
        let mut cache = DedupCache::new();
        assert!(cache.admit("k", 0, WINDOW));
        assert!(!cache.admit("k", 59_000, WINDOW));
        assert!(cache.admit("k", 60_000, WINDOW));
    }

    #[test]
    fn test_distinct_keys_are_independent() {
        let mut cache = DedupCache::new();
        assert!(cache.admit("a", 0, WINDOW));
        assert!(cache.admit("b", 0, WINDOW));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_expired_entries_are_pruned() {
        let mut cache = DedupCache::new();
        cache.admit("old", 0, WINDOW);
        cache.admit("new", 120_000, WINDOW);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_zero_window_admits_everything() {
        let mut cache = DedupCache::new();
        assert!(cache.admit("k", 5, Duration::ZERO));
        assert!(cache.admit("k", 5, Duration::ZERO));
    }
}
