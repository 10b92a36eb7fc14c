/**
 * SDK-wide constants.
 *
 * Storage keys, HTTP header names and environment variable names shared
 * by the providers and the service.
 */
/// SDK version string, derived from the `flare_core` package version.
pub const SDK_VERSION: &str = concat!("flare-rust/", env!("CARGO_PKG_VERSION"));

/// Storage key of the local persistent cache written by the `localStorage` provider.
pub const STORAGE_KEY: &str = "error_reports";

/// Storage key of the mirrored offline queue.
pub const OFFLINE_STORAGE_KEY: &str = "offline_error_reports";

/// The local cache keeps at most this many of the most recent reports.
pub const MAX_CACHED_REPORTS: usize = 1000;

/// Header carrying the remote endpoint's API key.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Endpoint of the remote provider.
pub const ENDPOINT_ENV: &str = "FLARE_REPORTING_ENDPOINT";

/// API key of the remote provider.
pub const API_KEY_ENV: &str = "FLARE_REPORTING_API_KEY";

/// Deployment environment (`development`, `staging`, `production`).
pub const ENVIRONMENT_ENV: &str = "FLARE_ENV";

/// Application version stamped on reports by the facade.
pub const APP_VERSION_ENV: &str = "FLARE_APP_VERSION";

/// Build number stamped on reports by the facade.
pub const BUILD_NUMBER_ENV: &str = "FLARE_BUILD_NUMBER";

