/**
 * Ambient context stamped onto every report built through the facade.
 *
 * The service itself never reads the environment. Whatever a report needs
 * to know about "where we are" (user, session, current location, user
 * agent, build provenance) is collected here and applied when a report is
 * built, so it reflects the moment of capture.
 *
 * All methods take `&self`; the state sits behind a `RwLock` so any
 * thread can update it while others are building reports.
 */
use std::collections::BTreeMap;
use std::sync::RwLock;

use flare_core::protocol::constants::{APP_VERSION_ENV, BUILD_NUMBER_ENV, SDK_VERSION};
use flare_core::{Environment, ReportBuilder};
use serde_json::Value;

#[derive(Debug, Clone, Default)]
struct Inner {
    user_id: Option<String>,
    session_id: Option<String>,
    url: String,
    user_agent: String,
    environment: Environment,
    version: Option<String>,
    build_number: Option<String>,
    extras: BTreeMap<String, Value>,
}

#[derive(Debug, Default)]
pub struct AmbientContext {
    inner: RwLock<Inner>,
}

impl AmbientContext {
    pub fn new() -> Self {
        Self::default()
    }

    /**
     * Context seeded from the process environment:
     * `FLARE_ENV`, `FLARE_APP_VERSION`, `FLARE_BUILD_NUMBER`, and a user
     * agent naming the SDK, OS and architecture.
     */
    pub fn from_env() -> Self {
        let inner = Inner {
            environment: Environment::from_env(),
            version: std::env::var(APP_VERSION_ENV).ok().filter(|v| !v.is_empty()),
            build_number: std::env::var(BUILD_NUMBER_ENV).ok().filter(|v| !v.is_empty()),
            user_agent: default_user_agent(),
            ..Default::default()
        };
        Self { inner: RwLock::new(inner) }
    }

    // -----------------------------------------------------------------------
    // Setters
    // -----------------------------------------------------------------------

    pub fn set_user(&self, user_id: Option<String>) {
        self.write(|inner| inner.user_id = user_id);
    }

    pub fn set_session(&self, session_id: Option<String>) {
        self.write(|inner| inner.session_id = session_id);
    }

    /// Location the process is currently serving or showing, e.g. a route.
    pub fn set_url(&self, url: impl Into<String>) {
        let url = url.into();
        self.write(|inner| inner.url = url);
    }

    pub fn set_user_agent(&self, user_agent: impl Into<String>) {
        let user_agent = user_agent.into();
        self.write(|inner| inner.user_agent = user_agent);
    }

    pub fn set_environment(&self, environment: Environment) {
        self.write(|inner| inner.environment = environment);
    }

    pub fn set_version(&self, version: Option<String>) {
        self.write(|inner| inner.version = version);
    }

    pub fn set_build_number(&self, build_number: Option<String>) {
        self.write(|inner| inner.build_number = build_number);
    }

    /**
     * Sets an extra that lands in every report's `additionalData`.
     * Per-report data with the same key wins.
     */
    pub fn set_extra(&self, key: impl Into<String>, value: impl Into<Value>) {
        let (key, value) = (key.into(), value.into());
        self.write(|inner| {
            inner.extras.insert(key, value);
        });
    }

    pub fn remove_extra(&self, key: &str) {
        self.write(|inner| {
            inner.extras.remove(key);
        });
    }

    pub fn environment(&self) -> Environment {
        self.read().environment
    }

    pub fn user_id(&self) -> Option<String> {
        self.read().user_id
    }

    // -----------------------------------------------------------------------
    // Applying
    // -----------------------------------------------------------------------

    /**
     * Starts a report for `message` pre-filled with the current context.
     *
     * Anything set on the returned builder afterwards overrides the
     * ambient values.
     */
    pub fn builder(&self, message: impl Into<String>) -> ReportBuilder {
        let inner = self.read();

        let mut builder = ReportBuilder::new(message)
            .url(inner.url)
            .user_agent(inner.user_agent)
            .environment(inner.environment);

        if let Some(user_id) = inner.user_id {
            builder = builder.user_id(user_id);
        }
        if let Some(session_id) = inner.session_id {
            builder = builder.session_id(session_id);
        }
        if let Some(version) = inner.version {
            builder = builder.version(version);
        }
        if let Some(build_number) = inner.build_number {
            builder = builder.build_number(build_number);
        }
        for (key, value) in inner.extras {
            builder = builder.data(key, value);
        }

        builder
    }

    fn read(&self) -> Inner {
        self.inner.read().map(|g| (*g).clone()).unwrap_or_else(|p| (*p.into_inner()).clone())
    }

    fn write(&self, f: impl FnOnce(&mut Inner)) {
        match self.inner.write() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

fn default_user_agent() -> String {
    format!(
        "{SDK_VERSION} ({}; {})",
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_carries_context() {
        let ctx = AmbientContext::new();
        ctx.set_user(Some("u-1".into()));
        ctx.set_session(Some("s-1".into()));
        ctx.set_url("/courses/rust-101");
        ctx.set_version(Some("2.3.0".into()));
        ctx.set_environment(Environment::Staging);
        ctx.set_extra("region", "eu");

        let report = ctx.builder("boom").build();
        assert_eq!(report.user_id.as_deref(), Some("u-1"));
        assert_eq!(report.session_id.as_deref(), Some("s-1"));
        assert_eq!(report.url, "/courses/rust-101");
        assert_eq!(report.version.as_deref(), Some("2.3.0"));
        assert_eq!(report.environment, Environment::Staging);
        assert_eq!(report.additional_data["region"], "eu");
    }

    #[test]
    fn test_per_report_values_override_context() {
        let ctx = AmbientContext::new();
        ctx.set_extra("region", "eu");
        ctx.set_url("/a");

        let report = ctx.builder("boom").data("region", "us").url("/b").build();
        assert_eq!(report.additional_data["region"], "us");
        assert_eq!(report.url, "/b");
    }

    #[test]
    fn test_clearing_values() {
        let ctx = AmbientContext::new();
        ctx.set_user(Some("u".into()));
        ctx.set_user(None);
        ctx.set_extra("k", 1);
        ctx.remove_extra("k");

        let report = ctx.builder("x").build();
        assert!(report.user_id.is_none());
        assert!(report.additional_data.is_empty());
    }

    #[test]
    fn test_default_user_agent_names_sdk() {
        assert!(default_user_agent().starts_with("flare-rust/"));
    }
}
