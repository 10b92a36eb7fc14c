/*!
 * Error types.
 *
 * Only set-up paths are fallible: building a configuration, starting the
 * worker, touching the storage directory. Reporting itself never fails;
 * provider problems are logged and turned into `false`.
 */
use thiserror::Error;

/**
 * A configuration value broke one of the `ReportingConfig` invariants.
 */
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("batch size must be at least 1")]
    ZeroBatchSize,

    #[error("batch interval must be greater than zero")]
    ZeroBatchInterval,

    #[error("sampling rate must be within 0.0..=1.0, got {0}")]
    SamplingRateOutOfRange(f64),
}

#[derive(Debug, Error)]
pub enum FlareError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(std::io::Error),

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FlareError>;
