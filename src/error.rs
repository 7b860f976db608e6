//! Error types.
//!
//! A failed expectation is the only runtime error the detector produces. It is
//! never swallowed: with detection enabled it becomes a panic carrying the same
//! message, otherwise it is logged and published as the last leak report.
//! Configuration errors can only occur while building a [`DetectorConfig`].
//!
//! [`DetectorConfig`]: crate::config::DetectorConfig

use crate::detector::LeakReport;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// An expectation found its target still retained at the deadline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", .report.message)]
pub struct ExpectationViolated {
    /// Diagnostic describing the retained target.
    pub report: LeakReport,
}

impl ExpectationViolated {
    /// Wraps a report.
    #[must_use]
    pub const fn new(report: LeakReport) -> Self {
        Self { report }
    }

    /// Unwraps the report.
    #[must_use]
    pub fn into_report(self) -> LeakReport {
        self.report
    }
}

/// Invalid detector configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable was set to something unparseable.
    #[error("invalid value for {var}: expected {expected}, got {value:?}")]
    InvalidEnv {
        /// Variable name.
        var: &'static str,
        /// Raw value found.
        value: String,
        /// What the variable should contain.
        expected: &'static str,
    },

    /// `max_tick` is too small to yield a non-zero tick period.
    #[error("max_tick must be at least {min:?}, got {actual:?}")]
    MaxTickTooSmall {
        /// Smallest accepted value.
        min: Duration,
        /// Configured value.
        actual: Duration,
    },

    /// A config file could not be read.
    #[error("failed to read config file {}: {source}", .path.display())]
    Io {
        /// File that failed to load.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A config file is not valid TOML for [`DetectorConfig`](crate::config::DetectorConfig).
    #[cfg(feature = "config-file")]
    #[error("failed to parse TOML config: {0}")]
    Toml(#[from] toml::de::Error),
}
