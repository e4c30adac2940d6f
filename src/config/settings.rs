//! Effective per-backend settings.

use crate::config::source::ConfigSource;
use crate::core::RequestOverrides;
use crate::registry::Backend;

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default per-call deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2500);
/// Default retries per candidate after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 1;
/// Default generic backoff base.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(150);
/// Default rate-limit backoff base.
pub const DEFAULT_RATE_LIMIT_BACKOFF: Duration = Duration::from_millis(1000);
/// Default breaker failure threshold.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
/// Default breaker cool-down.
pub const DEFAULT_COOL_DOWN: Duration = Duration::from_secs(30);

/// Settings a backend declares at registration time.
///
/// Sits between the global configuration layer and the per-backend layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsOverlay {
    /// Per-call deadline in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Retries per candidate.
    pub max_retries: Option<u32>,
    /// Generic backoff base in milliseconds.
    pub retry_backoff_ms: Option<u64>,
    /// Rate-limit backoff base in milliseconds.
    pub rate_limit_backoff_ms: Option<u64>,
    /// Administratively disabled.
    pub disabled: Option<bool>,
    /// Breaker failure threshold.
    pub failure_threshold: Option<u32>,
    /// Breaker cool-down in milliseconds.
    pub cool_down_ms: Option<u64>,
}

impl SettingsOverlay {
    /// Creates an empty overlay.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-call deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Sets the retry budget.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Sets the generic backoff base.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff_ms = Some(u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Sets the rate-limit backoff base.
    pub fn with_rate_limit_backoff(mut self, backoff: Duration) -> Self {
        self.rate_limit_backoff_ms = Some(u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Marks the backend disabled or enabled.
    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = Some(disabled);
        self
    }

    /// Sets the breaker threshold.
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = Some(threshold);
        self
    }

    /// Sets the breaker cool-down.
    pub fn with_cool_down(mut self, cool_down: Duration) -> Self {
        self.cool_down_ms = Some(u64::try_from(cool_down.as_millis()).unwrap_or(u64::MAX));
        self
    }
}

/// Fully resolved settings for one candidate of one request.
///
/// Layers apply in ascending precedence:
///
/// 1. built-in defaults (or the base this is resolved from)
/// 2. `resilience.<key>`
/// 3. the backend's registration [`SettingsOverlay`]
/// 4. `backends.<id>.<key>`
/// 5. `tenants.<tenant>.backends.<id>.<key>`
/// 6. the request's [`RequestOverrides`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveSettings {
    /// Deadline for one call.
    #[serde(with = "crate::core::types::duration_serde")]
    pub timeout: Duration,
    /// Retries after the first attempt on one candidate.
    pub max_retries: u32,
    /// Generic backoff base.
    #[serde(with = "crate::core::types::duration_serde")]
    pub retry_backoff: Duration,
    /// Rate-limit backoff base.
    #[serde(with = "crate::core::types::duration_serde")]
    pub rate_limit_backoff: Duration,
    /// Skip this backend without consuming any retry budget.
    pub disabled: bool,
    /// Consecutive failures before the breaker opens.
    pub failure_threshold: u32,
    /// How long an opened breaker stays open.
    #[serde(with = "crate::core::types::duration_serde")]
    pub cool_down: Duration,
}

impl Default for EffectiveSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            rate_limit_backoff: DEFAULT_RATE_LIMIT_BACKOFF,
            disabled: false,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            cool_down: DEFAULT_COOL_DOWN,
        }
    }
}

impl EffectiveSettings {
    /// Creates settings with the built-in defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the retry budget.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the generic backoff base.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Sets the rate-limit backoff base.
    pub fn with_rate_limit_backoff(mut self, backoff: Duration) -> Self {
        self.rate_limit_backoff = backoff;
        self
    }

    /// Sets the breaker threshold and cool-down.
    pub fn with_breaker(mut self, failure_threshold: u32, cool_down: Duration) -> Self {
        self.failure_threshold = failure_threshold.max(1);
        self.cool_down = cool_down;
        self
    }

    /// Total calls allowed on one candidate.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Resolves the settings for `backend` serving a request from `tenant`,
    /// starting from `self` as the lowest layer.
    pub fn resolve(
        &self,
        config: &dyn ConfigSource,
        backend: &Backend,
        tenant: Option<&str>,
        overrides: &RequestOverrides,
    ) -> Self {
        let mut settings = self.clone();

        settings.apply_source(config, "resilience");
        settings.apply_overlay(&backend.settings);
        settings.apply_source(config, &format!("backends.{}", backend.id));
        if let Some(tenant) = tenant {
            settings.apply_source(config, &format!("tenants.{tenant}.backends.{}", backend.id));
        }
        settings.apply_overrides(overrides);

        settings
    }

    fn apply_source(&mut self, config: &dyn ConfigSource, prefix: &str) {
        let millis = |name: &str, current: Duration| {
            let current = i64::try_from(current.as_millis()).unwrap_or(i64::MAX);
            let value = config.get_long(&format!("{prefix}.{name}"), current);
            Duration::from_millis(value.max(0) as u64)
        };
        let count = |name: &str, current: u32| {
            let value = config.get_long(&format!("{prefix}.{name}"), i64::from(current));
            u32::try_from(value.max(0)).unwrap_or(u32::MAX)
        };

        // A zero or negative timeout would fail every call, so the lower
        // layer's value stands.
        let timeout_key = format!("{prefix}.timeout_ms");
        let timeout_ms = config.get_long(&timeout_key, 0);
        if timeout_ms > 0 {
            self.timeout = Duration::from_millis(timeout_ms as u64);
        } else if timeout_ms < 0 {
            tracing::warn!(key = %timeout_key, value = timeout_ms, "Ignoring negative timeout");
        }
        self.max_retries = count("max_retries", self.max_retries);
        self.retry_backoff = millis("retry_backoff_ms", self.retry_backoff);
        self.rate_limit_backoff = millis("rate_limit_backoff_ms", self.rate_limit_backoff);
        self.disabled = config.get_bool(&format!("{prefix}.disabled"), self.disabled);
        self.failure_threshold = count("failure_threshold", self.failure_threshold).max(1);
        self.cool_down = millis("cool_down_ms", self.cool_down);
    }

    fn apply_overlay(&mut self, overlay: &SettingsOverlay) {
        if let Some(ms) = overlay.timeout_ms.filter(|ms| *ms > 0) {
            self.timeout = Duration::from_millis(ms);
        }
        if let Some(retries) = overlay.max_retries {
            self.max_retries = retries;
        }
        if let Some(ms) = overlay.retry_backoff_ms {
            self.retry_backoff = Duration::from_millis(ms);
        }
        if let Some(ms) = overlay.rate_limit_backoff_ms {
            self.rate_limit_backoff = Duration::from_millis(ms);
        }
        if let Some(disabled) = overlay.disabled {
            self.disabled = disabled;
        }
        if let Some(threshold) = overlay.failure_threshold {
            self.failure_threshold = threshold.max(1);
        }
        if let Some(ms) = overlay.cool_down_ms {
            self.cool_down = Duration::from_millis(ms);
        }
    }

    fn apply_overrides(&mut self, overrides: &RequestOverrides) {
        if let Some(timeout) = overrides.timeout.filter(|t| !t.is_zero()) {
            self.timeout = timeout;
        }
        if let Some(retries) = overrides.max_retries {
            self.max_retries = retries;
        }
        if let Some(backoff) = overrides.retry_backoff {
            self.retry_backoff = backoff;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayeredConfig;

    fn backend() -> Backend {
        Backend::new("search-a")
            .with_capability("search")
            .with_settings(SettingsOverlay::new().with_timeout(Duration::from_millis(900)))
    }

    #[test]
    fn test_builtin_defaults() {
        let settings = EffectiveSettings::default();
        assert_eq!(settings.timeout, Duration::from_millis(2500));
        assert_eq!(settings.max_retries, 1);
        assert_eq!(settings.max_attempts(), 2);
        assert_eq!(settings.retry_backoff, Duration::from_millis(150));
        assert_eq!(settings.rate_limit_backoff, Duration::from_millis(1000));
        assert_eq!(settings.failure_threshold, 5);
        assert_eq!(settings.cool_down, Duration::from_secs(30));
        assert!(!settings.disabled);
    }

    #[test]
    fn test_empty_config_keeps_overlay() {
        let config = LayeredConfig::new();
        let settings =
            EffectiveSettings::default().resolve(&config, &backend(), None, &RequestOverrides::default());
        assert_eq!(settings.timeout, Duration::from_millis(900));
        assert_eq!(settings.max_retries, 1);
    }

    #[test]
    fn test_layer_precedence() {
        let config = LayeredConfig::from_toml_str(
            r#"
[resilience]
timeout_ms = 2000
max_retries = 4
retry_backoff_ms = 50

[backends.search-a]
max_retries = 2
disabled = true

[tenants.acme.backends.search-a]
disabled = false
"#,
        )
        .unwrap();

        let base = EffectiveSettings::default();
        let none = RequestOverrides::default();

        // Registration overlay beats the global layer.
        let other_tenant = base.resolve(&config, &backend(), Some("globex"), &none);
        assert_eq!(other_tenant.timeout, Duration::from_millis(900));
        assert_eq!(other_tenant.max_retries, 2);
        assert_eq!(other_tenant.retry_backoff, Duration::from_millis(50));
        assert!(other_tenant.disabled);

        let acme = base.resolve(&config, &backend(), Some("acme"), &none);
        assert!(!acme.disabled);

        let overrides = RequestOverrides {
            timeout: Some(Duration::from_millis(100)),
            max_retries: Some(0),
            retry_backoff: None,
        };
        let overridden = base.resolve(&config, &backend(), Some("acme"), &overrides);
        assert_eq!(overridden.timeout, Duration::from_millis(100));
        assert_eq!(overridden.max_retries, 0);
    }

    #[test]
    fn test_out_of_range_values() {
        let config = LayeredConfig::new();
        config.set("resilience.timeout_ms", -5);
        config.set("resilience.failure_threshold", 0);

        let settings = EffectiveSettings::default().resolve(
            &config,
            &Backend::new("b"),
            None,
            &RequestOverrides::default(),
        );
        assert_eq!(settings.timeout, Duration::from_millis(2500));
        assert_eq!(settings.failure_threshold, 1);
    }

    #[test]
    fn test_zero_timeout_keeps_lower_layer() {
        let config = LayeredConfig::new();
        config.set("backends.search-a.timeout_ms", 0);

        let settings = EffectiveSettings::default().resolve(
            &config,
            &backend(),
            None,
            &RequestOverrides::default(),
        );
        assert_eq!(settings.timeout, Duration::from_millis(900));

        let overrides = RequestOverrides {
            timeout: Some(Duration::ZERO),
            ..RequestOverrides::default()
        };
        let settings = EffectiveSettings::default().resolve(&config, &backend(), None, &overrides);
        assert_eq!(settings.timeout, Duration::from_millis(900));

        let zero_overlay = Backend::new("b").with_settings(SettingsOverlay::new().with_timeout(Duration::ZERO));
        let settings = EffectiveSettings::default().resolve(
            &config,
            &zero_overlay,
            None,
            &RequestOverrides::default(),
        );
        assert_eq!(settings.timeout, Duration::from_millis(2500));
    }
}
