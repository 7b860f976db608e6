//! Detector configuration.
//!
//! # Precedence
//!
//! Highest first:
//!
//! 1. **Programmatic**: builder setters called on a [`DetectorConfig`]
//! 2. **Environment**: `LEAKWATCH_*` variables via [`DetectorConfig::apply_env_overrides`]
//! 3. **Config file**: TOML via [`DetectorConfig::from_toml_str`] (feature `config-file`)
//! 4. **Defaults**: [`DetectorConfig::default`]
//!
//! Apply the layers bottom-up: load the file, apply the environment, then call
//! setters.
//!
//! # Environment variables
//!
//! | Variable | Type | Maps to |
//! |----------|------|---------|
//! | `LEAKWATCH_ENABLED` | `bool` | `enabled` |
//! | `LEAKWATCH_DEALLOCATION_TIMEOUT_MS` | `u64` | `deallocation_timeout` |
//! | `LEAKWATCH_VIEW_TIMEOUT_MS` | `u64` | `view_disappear_timeout` |
//! | `LEAKWATCH_MAX_TICK_MS` | `u64` | `max_tick` |

use crate::error::ConfigError;
use crate::time::{DEFAULT_MAX_TICK, MIN_MAX_TICK};
use std::time::Duration;

/// Environment variable toggling fatal leak assertions.
pub const ENV_ENABLED: &str = "LEAKWATCH_ENABLED";
/// Environment variable for the default deallocation timeout, in milliseconds.
pub const ENV_DEALLOCATION_TIMEOUT_MS: &str = "LEAKWATCH_DEALLOCATION_TIMEOUT_MS";
/// Environment variable for the default view-disappearance timeout, in milliseconds.
pub const ENV_VIEW_TIMEOUT_MS: &str = "LEAKWATCH_VIEW_TIMEOUT_MS";
/// Environment variable for the scheduler's per-tick cap, in milliseconds.
pub const ENV_MAX_TICK_MS: &str = "LEAKWATCH_MAX_TICK_MS";

/// Default timeout for deallocation expectations.
pub const DEFAULT_DEALLOCATION_TIMEOUT: Duration = Duration::from_secs(1);
/// Default timeout for view-disappearance expectations.
pub const DEFAULT_VIEW_DISAPPEAR_TIMEOUT: Duration = Duration::from_secs(3);

/// Settings for a [`LeakDetector`](crate::detector::LeakDetector).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectorConfig {
    /// Whether a violation panics. When false, violations are logged and
    /// published as leak reports instead.
    pub enabled: bool,
    /// Timeout used by `expect_deallocate` and `expect_deallocate_all`.
    pub deallocation_timeout: Duration,
    /// Timeout used by `expect_view_disappeared`.
    pub view_disappear_timeout: Duration,
    /// Cap on elapsed time counted per scheduler tick.
    pub max_tick: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            deallocation_timeout: DEFAULT_DEALLOCATION_TIMEOUT,
            view_disappear_timeout: DEFAULT_VIEW_DISAPPEAR_TIMEOUT,
            max_tick: DEFAULT_MAX_TICK,
        }
    }
}

impl DetectorConfig {
    /// Sets whether violations are fatal.
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the default deallocation timeout.
    #[must_use]
    pub const fn deallocation_timeout(mut self, timeout: Duration) -> Self {
        self.deallocation_timeout = timeout;
        self
    }

    /// Sets the default view-disappearance timeout.
    #[must_use]
    pub const fn view_disappear_timeout(mut self, timeout: Duration) -> Self {
        self.view_disappear_timeout = timeout;
        self
    }

    /// Sets the per-tick cap.
    #[must_use]
    pub const fn max_tick(mut self, max_tick: Duration) -> Self {
        self.max_tick = max_tick;
        self
    }

    /// Checks that the configuration is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_tick < MIN_MAX_TICK {
            return Err(ConfigError::MaxTickTooSmall {
                min: MIN_MAX_TICK,
                actual: self.max_tick,
            });
        }
        Ok(())
    }

    /// Defaults overlaid with the process environment, validated.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Overrides fields from `LEAKWATCH_*` variables that are set.
    ///
    /// Unset variables leave the field alone; a set but unparseable variable
    /// is an error and leaves the config partially updated.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// Like [`apply_env_overrides`](Self::apply_env_overrides), reading
    /// variables through `lookup`.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup(ENV_ENABLED) {
            self.enabled = parse_bool(ENV_ENABLED, &val)?;
        }
        if let Some(val) = lookup(ENV_DEALLOCATION_TIMEOUT_MS) {
            self.deallocation_timeout = parse_millis(ENV_DEALLOCATION_TIMEOUT_MS, &val)?;
        }
        if let Some(val) = lookup(ENV_VIEW_TIMEOUT_MS) {
            self.view_disappear_timeout = parse_millis(ENV_VIEW_TIMEOUT_MS, &val)?;
        }
        if let Some(val) = lookup(ENV_MAX_TICK_MS) {
            self.max_tick = parse_millis(ENV_MAX_TICK_MS, &val)?;
        }
        Ok(())
    }
}

fn parse_millis(var: &'static str, val: &str) -> Result<Duration, ConfigError> {
    val.trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ConfigError::InvalidEnv {
            var,
            value: val.to_owned(),
            expected: "milliseconds as an unsigned integer",
        })
}

fn parse_bool(var: &'static str, val: &str) -> Result<bool, ConfigError> {
    match val.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnv {
            var,
            value: val.to_owned(),
            expected: "bool (true/false/1/0/yes/no/on/off)",
        }),
    }
}

// =========================================================================
// TOML config file support (feature-gated)
// =========================================================================

/// TOML layout of a detector config. Every key is optional.
///
/// ```toml
/// enabled = true
/// deallocation_timeout_ms = 1000
/// view_disappear_timeout_ms = 3000
/// max_tick_ms = 33
/// ```
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
#[serde(deny_unknown_fields)]
pub struct DetectorToml {
    /// Whether violations are fatal.
    pub enabled: Option<bool>,
    /// Deallocation timeout in milliseconds.
    pub deallocation_timeout_ms: Option<u64>,
    /// View-disappearance timeout in milliseconds.
    pub view_disappear_timeout_ms: Option<u64>,
    /// Per-tick cap in milliseconds.
    pub max_tick_ms: Option<u64>,
}

#[cfg(feature = "config-file")]
impl DetectorConfig {
    /// Defaults overlaid with a TOML document, validated.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        let file: DetectorToml = toml::from_str(toml_str)?;
        let mut config = Self::default();
        config.apply_toml(&file);
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML file; see [`from_toml_str`](Self::from_toml_str).
    pub fn from_toml_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Overrides the fields present in `file`.
    pub fn apply_toml(&mut self, file: &DetectorToml) {
        if let Some(enabled) = file.enabled {
            self.enabled = enabled;
        }
        if let Some(ms) = file.deallocation_timeout_ms {
            self.deallocation_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = file.view_disappear_timeout_ms {
            self.view_disappear_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = file.max_tick_ms {
            self.max_tick = Duration::from_millis(ms);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn init_test(name: &str) {
        crate::test_utils::init_test_logging();
        crate::test_phase!(name);
    }

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        init_test("defaults_match_documented_values");
        let config = DetectorConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.deallocation_timeout, Duration::from_secs(1));
        assert_eq!(config.view_disappear_timeout, Duration::from_secs(3));
        assert_eq!(config.max_tick, Duration::from_millis(33));
        assert!(config.validate().is_ok());
        crate::test_complete!("defaults_match_documented_values");
    }

    #[test]
    fn setters_override_fields() {
        init_test("setters_override_fields");
        let config = DetectorConfig::default()
            .enabled(true)
            .deallocation_timeout(Duration::from_millis(250))
            .view_disappear_timeout(Duration::from_millis(500))
            .max_tick(Duration::from_millis(16));
        assert!(config.enabled);
        assert_eq!(config.deallocation_timeout, Duration::from_millis(250));
        assert_eq!(config.view_disappear_timeout, Duration::from_millis(500));
        assert_eq!(config.max_tick, Duration::from_millis(16));
        crate::test_complete!("setters_override_fields");
    }

    #[test]
    fn validate_rejects_tiny_max_tick() {
        init_test("validate_rejects_tiny_max_tick");
        let err = DetectorConfig::default()
            .max_tick(Duration::from_millis(2))
            .validate()
            .expect_err("2ms is below the minimum");
        assert!(matches!(err, ConfigError::MaxTickTooSmall { .. }));
        crate::test_complete!("validate_rejects_tiny_max_tick");
    }

    #[test]
    fn env_overrides_apply_set_variables_only() {
        init_test("env_overrides_apply_set_variables_only");
        let mut config = DetectorConfig::default();
        config
            .apply_overrides_from(lookup(&[
                (ENV_ENABLED, "yes"),
                (ENV_DEALLOCATION_TIMEOUT_MS, " 1500 "),
            ]))
            .expect("valid overrides");
        assert!(config.enabled);
        assert_eq!(config.deallocation_timeout, Duration::from_millis(1500));
        assert_eq!(config.view_disappear_timeout, DEFAULT_VIEW_DISAPPEAR_TIMEOUT);
        assert_eq!(config.max_tick, DEFAULT_MAX_TICK);
        crate::test_complete!("env_overrides_apply_set_variables_only");
    }

    #[test]
    fn env_overrides_cover_every_variable() {
        init_test("env_overrides_cover_every_variable");
        let mut config = DetectorConfig::default().enabled(true);
        config
            .apply_overrides_from(lookup(&[
                (ENV_ENABLED, "off"),
                (ENV_DEALLOCATION_TIMEOUT_MS, "10"),
                (ENV_VIEW_TIMEOUT_MS, "20"),
                (ENV_MAX_TICK_MS, "30"),
            ]))
            .expect("valid overrides");
        assert_eq!(
            config,
            DetectorConfig {
                enabled: false,
                deallocation_timeout: Duration::from_millis(10),
                view_disappear_timeout: Duration::from_millis(20),
                max_tick: Duration::from_millis(30),
            }
        );
        crate::test_complete!("env_overrides_cover_every_variable");
    }

    #[test]
    fn env_overrides_reject_garbage() {
        init_test("env_overrides_reject_garbage");
        let mut config = DetectorConfig::default();
        let err = config
            .apply_overrides_from(lookup(&[(ENV_ENABLED, "maybe")]))
            .expect_err("not a bool");
        assert!(matches!(err, ConfigError::InvalidEnv { var: ENV_ENABLED, .. }));

        let err = config
            .apply_overrides_from(lookup(&[(ENV_MAX_TICK_MS, "-5")]))
            .expect_err("not unsigned");
        assert!(err.to_string().contains(ENV_MAX_TICK_MS));
        crate::test_complete!("env_overrides_reject_garbage");
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        for truthy in ["true", "TRUE", "1", "yes", "On"] {
            assert!(parse_bool(ENV_ENABLED, truthy).expect("truthy"));
        }
        for falsy in ["false", "0", "no", "OFF"] {
            assert!(!parse_bool(ENV_ENABLED, falsy).expect("falsy"));
        }
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn toml_partial_document_keeps_defaults() {
        init_test("toml_partial_document_keeps_defaults");
        let config = DetectorConfig::from_toml_str("enabled = true\nmax_tick_ms = 16\n")
            .expect("valid toml");
        assert!(config.enabled);
        assert_eq!(config.max_tick, Duration::from_millis(16));
        assert_eq!(config.deallocation_timeout, DEFAULT_DEALLOCATION_TIMEOUT);
        crate::test_complete!("toml_partial_document_keeps_defaults");
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn toml_rejects_unknown_keys_and_bad_values() {
        init_test("toml_rejects_unknown_keys_and_bad_values");
        let err = DetectorConfig::from_toml_str("enable = true").expect_err("typo");
        assert!(matches!(err, ConfigError::Toml(_)));

        let err = DetectorConfig::from_toml_str("max_tick_ms = 1").expect_err("too small");
        assert!(matches!(err, ConfigError::MaxTickTooSmall { .. }));
        crate::test_complete!("toml_rejects_unknown_keys_and_bad_values");
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn toml_file_missing_is_io_error() {
        init_test("toml_file_missing_is_io_error");
        let err = DetectorConfig::from_toml_file(std::path::Path::new(
            "/nonexistent/leakwatch/config.toml",
        ))
        .expect_err("missing file");
        assert!(matches!(err, ConfigError::Io { .. }));
        crate::test_complete!("toml_file_missing_is_io_error");
    }
}
