/**
 * Service configuration.
 *
 * `ReportingConfig` is the resolved, validated configuration the service
 * runs with. `ConfigPatch` is a partial overlay: every field is optional
 * and only the ones that are set replace the current values. Both are
 * deserializable so they can come from a JSON file; durations are given
 * in milliseconds there (`batchIntervalMs`, `retryDelayMs`, ...).
 */
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::protocol::constants::{API_KEY_ENV, ENDPOINT_ENV};
use crate::protocol::types::Environment;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

const DEFAULT_BATCH_SIZE: usize = 10;
const DEFAULT_BATCH_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_DEDUPLICATION_WINDOW: Duration = Duration::from_secs(60);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_STORAGE_DIR: &str = ".flare";

// ---------------------------------------------------------------------------
// RemoteSettings
// ---------------------------------------------------------------------------

/**
 * Where the remote provider sends reports.
 */
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSettings {
    pub endpoint: String,
    pub api_key: String,
}

impl RemoteSettings {
    /**
     * Reads `FLARE_REPORTING_ENDPOINT` and `FLARE_REPORTING_API_KEY`.
     *
     * Returns `None` unless the endpoint is set and non-empty. A missing
     * API key is sent as an empty header value.
     */
    pub fn from_env() -> Option<Self> {
        let endpoint = std::env::var(ENDPOINT_ENV).ok()?;
        if endpoint.trim().is_empty() {
            return None;
        }
        let api_key = std::env::var(API_KEY_ENV).unwrap_or_default();
        Some(Self { endpoint, api_key })
    }
}

// ---------------------------------------------------------------------------
// ReportingConfig
// ---------------------------------------------------------------------------

/**
 * Resolved configuration of an `ErrorReportingService`.
 *
 * Invariants (checked by `validate`):
 * - `batch_size >= 1`
 * - `batch_interval > 0`
 * - `0.0 <= sampling_rate <= 1.0`
 */
#[derive(Debug, Clone, PartialEq)]
pub struct ReportingConfig {
    /// Reports per dispatched batch; reaching it triggers an immediate flush.
    pub batch_size: usize,

    /// Period of the background batch timer.
    pub batch_interval: Duration,

    /// Extra attempts the remote provider makes after a failed request.
    pub max_retries: u32,

    /// Pause between remote retries.
    pub retry_delay: Duration,

    /// Enables the local cache provider and persistence of the offline queue.
    pub enable_offline_support: bool,

    pub enable_sampling: bool,

    /// Probability of keeping a report when sampling is enabled.
    pub sampling_rate: f64,

    /// Identical reports inside this window are dropped.
    pub deduplication_window: Duration,

    /// Upper bound for a single remote request.
    pub request_timeout: Duration,

    pub environment: Environment,

    /// Directory holding the local cache and offline queue files.
    pub storage_dir: PathBuf,

    pub remote: Option<RemoteSettings>,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_interval: DEFAULT_BATCH_INTERVAL,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            enable_offline_support: true,
            enable_sampling: false,
            sampling_rate: 1.0,
            deduplication_window: DEFAULT_DEDUPLICATION_WINDOW,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            environment: Environment::default(),
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            remote: None,
        }
    }
}

impl ReportingConfig {
    /**
     * Returns a copy of `self` with every field set in `patch` replaced.
     *
     * The result is not validated; call `validate` (the service always does).
     */
    pub fn merge(&self, patch: &ConfigPatch) -> Self {
        let mut merged = self.clone();

        if let Some(v) = patch.batch_size {
            merged.batch_size = v;
        }
        if let Some(v) = patch.batch_interval {
            merged.batch_interval = v;
        }
        if let Some(v) = patch.max_retries {
            merged.max_retries = v;
        }
        if let Some(v) = patch.retry_delay {
            merged.retry_delay = v;
        }
        if let Some(v) = patch.enable_offline_support {
            merged.enable_offline_support = v;
        }
        if let Some(v) = patch.enable_sampling {
            merged.enable_sampling = v;
        }
        if let Some(v) = patch.sampling_rate {
            merged.sampling_rate = v;
        }
        if let Some(v) = patch.deduplication_window {
            merged.deduplication_window = v;
        }
        if let Some(v) = patch.request_timeout {
            merged.request_timeout = v;
        }
        if let Some(v) = patch.environment {
            merged.environment = v;
        }
        if let Some(ref v) = patch.storage_dir {
            merged.storage_dir = v.clone();
        }
        if let Some(ref v) = patch.remote {
            merged.remote = Some(v.clone());
        }

        merged
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.batch_interval.is_zero() {
            return Err(ConfigError::ZeroBatchInterval);
        }
        /* `contains` is false for NaN as well. */
        if !(0.0..=1.0).contains(&self.sampling_rate) {
            return Err(ConfigError::SamplingRateOutOfRange(self.sampling_rate));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ConfigPatch
// ---------------------------------------------------------------------------

/**
 * Partial configuration passed to `initialize` and `update_config`.
 *
 * # Example
 * ```ignore
 * service.update_config(&ConfigPatch {
 *     batch_size: Some(2),
 *     batch_interval: Some(Duration::from_millis(500)),
 *     ..Default::default()
 * })?;
 * ```
 */
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigPatch {
    pub batch_size: Option<usize>,

    #[serde(rename = "batchIntervalMs", with = "millis")]
    pub batch_interval: Option<Duration>,

    pub max_retries: Option<u32>,

    #[serde(rename = "retryDelayMs", with = "millis")]
    pub retry_delay: Option<Duration>,

    pub enable_offline_support: Option<bool>,
    pub enable_sampling: Option<bool>,
    pub sampling_rate: Option<f64>,

    #[serde(rename = "deduplicationWindowMs", with = "millis")]
    pub deduplication_window: Option<Duration>,

    #[serde(rename = "requestTimeoutMs", with = "millis")]
    pub request_timeout: Option<Duration>,

    pub environment: Option<Environment>,
    pub storage_dir: Option<PathBuf>,
    pub remote: Option<RemoteSettings>,
}

impl ConfigPatch {
    /**
     * Parses a patch from a JSON document.
     */
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Optional durations written as integer milliseconds.
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ReportingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.deduplication_window, Duration::from_secs(60));
        assert!(config.enable_offline_support);
        assert!(!config.enable_sampling);
    }

    #[test]
    fn test_merge_only_overrides_set_fields() {
        let base = ReportingConfig::default();
        let merged = base.merge(&ConfigPatch {
            batch_size: Some(2),
            sampling_rate: Some(0.5),
            ..Default::default()
        });

        assert_eq!(merged.batch_size, 2);
        assert_eq!(merged.sampling_rate, 0.5);
        assert_eq!(merged.batch_interval, base.batch_interval);
        assert_eq!(merged.storage_dir, base.storage_dir);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let base = ReportingConfig::default();

        let zero_batch = base.merge(&ConfigPatch { batch_size: Some(0), ..Default::default() });
        assert_eq!(zero_batch.validate(), Err(ConfigError::ZeroBatchSize));

        let zero_interval = base.merge(&ConfigPatch {
            batch_interval: Some(Duration::ZERO),
            ..Default::default()
        });
        assert_eq!(zero_interval.validate(), Err(ConfigError::ZeroBatchInterval));

        let rate = base.merge(&ConfigPatch { sampling_rate: Some(1.5), ..Default::default() });
        assert!(matches!(rate.validate(), Err(ConfigError::SamplingRateOutOfRange(_))));

        let nan = base.merge(&ConfigPatch { sampling_rate: Some(f64::NAN), ..Default::default() });
        assert!(nan.validate().is_err());
    }

    #[test]
    fn test_patch_from_json() {
        let patch = ConfigPatch::from_json(
            r#"{
                "batchSize": 4,
                "batchIntervalMs": 250,
                "deduplicationWindowMs": 1000,
                "environment": "production",
                "remote": { "endpoint": "http://localhost:9/ingest", "apiKey": "k" }
            }"#,
        )
        .expect("valid patch");

        assert_eq!(patch.batch_size, Some(4));
        assert_eq!(patch.batch_interval, Some(Duration::from_millis(250)));
        assert_eq!(patch.deduplication_window, Some(Duration::from_secs(1)));
        assert_eq!(patch.environment, Some(Environment::Production));
        assert_eq!(patch.remote.as_ref().map(|r| r.api_key.as_str()), Some("k"));
        assert_eq!(patch.retry_delay, None);
    }
}
