/**
 * Core type definitions for the Flare SDK.
 *
 * `ErrorReport` is the single value that flows through the service: it is
 * built once at the call site, queued, and handed to providers. The JSON
 * shape (camelCase keys, lowercase enums) is what the remote endpoint
 * receives and what the local cache stores.
 */
use std::fmt;
use std::str::FromStr;

use chrono::{SecondsFormat, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/**
 * How bad an error is. Serialized lowercase.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/**
 * Deployment environment a report was captured in.
 *
 * Also decides which default providers are enabled: the console dump is
 * only verbose in development, the remote provider only runs in production.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    /**
     * Reads the environment from `FLARE_ENV`.
     *
     * Missing or unrecognised values fall back to `Development`.
     */
    pub fn from_env() -> Self {
        std::env::var(crate::protocol::constants::ENVIRONMENT_ENV)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_default()
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!("unknown environment: {other}")),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ErrorReport
// ---------------------------------------------------------------------------

/**
 * One captured error event with its contextual metadata.
 *
 * Reports are immutable once built. The service only ever moves them
 * between queues; providers receive shared references.
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    /// Process-unique id: `<epoch millis>-<base36 suffix>`.
    pub id: String,

    /// RFC 3339 capture time (UTC, millisecond precision).
    pub timestamp: String,

    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,

    pub severity: Severity,

    /// Free-form subsystem classification, e.g. `"network"` or `"ui"`.
    pub category: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub user_agent: String,

    /// Logical place that failed, e.g. `"Quiz"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,

    /// Operation that failed, e.g. `"submit"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    #[serde(default)]
    pub additional_data: Map<String, Value>,

    pub environment: Environment,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_number: Option<String>,
}

impl ErrorReport {
    /**
     * Starts building a report with the given message.
     */
    pub fn builder(message: impl Into<String>) -> ReportBuilder {
        ReportBuilder::new(message)
    }

    /**
     * Key used to suppress near-identical reports.
     *
     * Built from category, component, action and message; absent parts
     * contribute an empty segment so `None` and `Some("")` collide.
     */
    pub fn dedup_key(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.category,
            self.component.as_deref().unwrap_or(""),
            self.action.as_deref().unwrap_or(""),
            self.message,
        )
    }
}

// ---------------------------------------------------------------------------
// ReportBuilder
// ---------------------------------------------------------------------------

/**
 * Fluent builder for `ErrorReport`.
 *
 * `build()` stamps the id and timestamp, so a builder can be prepared
 * ahead of time and built at the moment the error is observed.
 *
 * # Example
 * ```ignore
 * let report = ErrorReport::builder("submit failed")
 *     .severity(Severity::High)
 *     .category("ui")
 *     .component("Quiz")
 *     .action("submit")
 *     .build();
 * ```
 */
#[derive(Debug, Clone)]
pub struct ReportBuilder {
    message: String,
    stack: Option<String>,
    severity: Severity,
    category: String,
    user_id: Option<String>,
    session_id: Option<String>,
    url: String,
    user_agent: String,
    component: Option<String>,
    action: Option<String>,
    additional_data: Map<String, Value>,
    environment: Environment,
    version: Option<String>,
    build_number: Option<String>,
}

impl ReportBuilder {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
            severity: Severity::default(),
            category: "general".to_string(),
            user_id: None,
            session_id: None,
            url: String::new(),
            user_agent: String::new(),
            component: None,
            action: None,
            additional_data: Map::new(),
            environment: Environment::default(),
            version: None,
            build_number: None,
        }
    }

    pub fn stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Adds one entry to the `additionalData` bag, overwriting an existing key.
    pub fn data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.additional_data.insert(key.into(), value.into());
        self
    }

    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn build_number(mut self, build_number: impl Into<String>) -> Self {
        self.build_number = Some(build_number.into());
        self
    }

    /**
     * Finishes the report, stamping the current time and a fresh id.
     */
    pub fn build(self) -> ErrorReport {
        let now = Utc::now();

        ErrorReport {
            id: generate_id(now.timestamp_millis(), &mut rand::thread_rng()),
            timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            message: self.message,
            stack: self.stack,
            severity: self.severity,
            category: self.category,
            user_id: self.user_id,
            session_id: self.session_id,
            url: self.url,
            user_agent: self.user_agent,
            component: self.component,
            action: self.action,
            additional_data: self.additional_data,
            environment: self.environment,
            version: self.version,
            build_number: self.build_number,
        }
    }
}

// ---------------------------------------------------------------------------
// Id generation
// ---------------------------------------------------------------------------

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_SUFFIX_LEN: usize = 9;

/**
 * Builds a report id from a millisecond timestamp and a random base36 suffix.
 */
pub fn generate_id(epoch_ms: i64, rng: &mut impl Rng) -> String {
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect();
    format!("{epoch_ms}-{suffix}")
}
