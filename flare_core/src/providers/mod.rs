/*!
 * Reporting providers — the sinks a batch is dispatched to.
 *
 * A provider accepts one report at a time and answers whether it took
 * responsibility for it. Providers never panic and never return errors:
 * every failure is logged and reported as `false`.
 *
 * Built-in providers:
 * - `console` (priority 1) — stderr dump, verbose in development
 * - `localStorage` (priority 2) — capped JSON file cache
 * - `remote` (priority 3) — HTTP POST to the configured endpoint
 */

use std::sync::Arc;

use crate::config::ReportingConfig;
use crate::protocol::types::{Environment, ErrorReport};

pub mod console;
pub mod local_cache;
pub mod remote;

pub use console::ConsoleProvider;
pub use local_cache::LocalCacheProvider;
pub use remote::RemoteProvider;

/**
 * A named, prioritised sink for error reports.
 *
 * Higher `priority` is consulted first. A disabled provider stays
 * registered but is skipped during dispatch.
 *
 * `report` is called concurrently from several threads for the reports
 * of one batch, hence `Send + Sync`.
 */
pub trait ReportingProvider: Send + Sync {
    fn name(&self) -> &str;

    fn priority(&self) -> i32;

    fn enabled(&self) -> bool {
        true
    }

    /// Returns `true` if the provider accepted responsibility for `report`.
    fn report(&self, report: &ErrorReport) -> bool;
}

/**
 * Builds the providers installed when `initialize` finds none registered.
 *
 * The remote provider is only built when remote settings exist, and is
 * only enabled in production.
 */
pub fn default_providers(config: &ReportingConfig) -> Vec<Arc<dyn ReportingProvider>> {
    let mut providers: Vec<Arc<dyn ReportingProvider>> = vec![
        Arc::new(ConsoleProvider::new(config.environment == Environment::Development)),
        Arc::new(LocalCacheProvider::new(
            &config.storage_dir,
            config.enable_offline_support,
        )),
    ];

    if let Some(ref remote) = config.remote {
        providers.push(Arc::new(RemoteProvider::new(
            remote.clone(),
            config.environment == Environment::Production,
            config.max_retries,
            config.retry_delay,
            config.request_timeout,
        )));
    }

    providers
}
