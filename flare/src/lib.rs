/**
 * Flare — batched, deduplicated error reporting for Rust.
 *
 * This is the crate applications depend on. It wires the core service,
 * the ambient context and the panic hook together behind one `init` call.
 *
 * # Quick start
 *
 * ```ignore
 * fn main() -> Result<(), flare::FlareError> {
 *     let flare = flare::init(flare::Options::default())?;
 *     let _guard = flare.guard();
 *
 *     flare.context().set_user(Some("user-42".into()));
 *
 *     if let Err(e) = std::fs::read_to_string("settings.toml") {
 *         flare.capture_error(&e);
 *     }
 *
 *     // _guard is dropped here → pending reports are flushed
 *     Ok(())
 * }
 * ```
 *
 * # With options
 *
 * ```ignore
 * let flare = flare::init(flare::Options {
 *     config: flare::ConfigPatch {
 *         batch_size: Some(20),
 *         enable_sampling: Some(true),
 *         sampling_rate: Some(0.25),
 *         ..Default::default()
 *     },
 *     catch_panics: false,
 *     ..Default::default()
 * })?;
 * ```
 */

use std::sync::Arc;

mod context;

pub use context::AmbientContext;

// ---------------------------------------------------------------------------
// Re-exports from flare_core — the public surface area
// ---------------------------------------------------------------------------

pub use flare_core::{
    capture_stack, Admission, BatchOutcome, ConfigError, ConfigPatch, ConsoleProvider,
    Environment, ErrorReport, ErrorReportingService, FlareError, FlushSummary, Guard,
    LocalCacheProvider, RemoteProvider, RemoteSettings, ReportBuilder, ReportingConfig,
    ReportingProvider, ReportingStats, Result, Severity, SDK_VERSION,
};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/**
 * Configuration for `init`.
 *
 * Unset `config.environment` and `config.remote` are filled from the
 * process environment (`FLARE_ENV`, `FLARE_REPORTING_ENDPOINT`,
 * `FLARE_REPORTING_API_KEY`).
 */
pub struct Options {
    pub config: ConfigPatch,

    /// Whether to install a panic hook that reports panics. Defaults to `true`.
    pub catch_panics: bool,

    /// Connectivity at start-up. Defaults to `true`.
    pub online: bool,

    /// Providers to register instead of the built-in defaults.
    pub providers: Vec<Arc<dyn ReportingProvider>>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            config: ConfigPatch::default(),
            catch_panics: true,
            online: true,
            providers: Vec::new(),
        }
    }
}

/**
 * Allows `flare::init(patch)` with everything else defaulted.
 */
impl From<ConfigPatch> for Options {
    fn from(config: ConfigPatch) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// init
// ---------------------------------------------------------------------------

/**
 * Builds and initializes the reporting service.
 *
 * # Returns
 * A `Flare` handle; clone it freely and pass it to whatever reports
 * errors. Call `guard()` once and keep the guard alive for the duration
 * of the app.
 *
 * # Errors
 * Invalid configuration or a failure to start the worker thread.
 */
pub fn init(options: impl Into<Options>) -> Result<Flare> {
    let mut opts = options.into();

    let context = AmbientContext::from_env();
    match opts.config.environment {
        Some(environment) => context.set_environment(environment),
        None => opts.config.environment = Some(context.environment()),
    }
    if opts.config.remote.is_none() {
        opts.config.remote = RemoteSettings::from_env();
    }

    let mut builder = ErrorReportingService::builder().online(opts.online);
    for provider in opts.providers {
        builder = builder.provider(provider);
    }
    let service = builder.build();
    service.initialize(&opts.config)?;

    if opts.catch_panics {
        flare_panic::install(service.clone());
    }

    tracing::debug!(
        environment = %context.environment(),
        catch_panics = opts.catch_panics,
        online = opts.online,
        "Flare ready"
    );

    Ok(Flare {
        service,
        context: Arc::new(context),
    })
}

// ---------------------------------------------------------------------------
// Flare handle
// ---------------------------------------------------------------------------

/**
 * The service plus the ambient context used to build reports.
 */
#[derive(Clone)]
pub struct Flare {
    service: ErrorReportingService,
    context: Arc<AmbientContext>,
}

impl Flare {
    pub fn service(&self) -> &ErrorReportingService {
        &self.service
    }

    pub fn context(&self) -> &AmbientContext {
        &self.context
    }

    /// Flush-on-drop guard for this handle's service.
    pub fn guard(&self) -> Guard {
        Guard::new(self.service.clone())
    }

    /// A report builder pre-filled with the ambient context.
    pub fn builder(&self, message: impl Into<String>) -> ReportBuilder {
        self.context.builder(message)
    }

    /// Builds `builder` now and hands the report to the service.
    pub fn capture(&self, builder: ReportBuilder) -> Admission {
        self.service.report_error(builder.build())
    }

    pub fn capture_message(&self, message: impl Into<String>, severity: Severity) -> Admission {
        self.capture(self.builder(message).severity(severity).category("message"))
    }

    /**
     * Reports a Rust error with the stack at the call site.
     *
     * The `source()` chain, if any, is recorded under `additionalData.causes`.
     */
    pub fn capture_error(&self, error: &(dyn std::error::Error + 'static)) -> Admission {
        let mut builder = self
            .builder(error.to_string())
            .severity(Severity::High)
            .category("error");

        let causes: Vec<serde_json::Value> = std::iter::successors(error.source(), |e| e.source())
            .map(|e| e.to_string().into())
            .collect();
        if !causes.is_empty() {
            builder = builder.data("causes", causes);
        }

        if let Some(stack) = capture_stack() {
            builder = builder.stack(stack);
        }

        self.capture(builder)
    }

    pub fn flush(&self) -> FlushSummary {
        self.service.flush()
    }

    pub fn set_online(&self, online: bool) {
        self.service.set_online(online);
    }

    pub fn stats(&self) -> ReportingStats {
        self.service.get_stats()
    }
}
