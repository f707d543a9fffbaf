//! Executor configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::mapping::{FieldResolver, MissingPathPolicy, DEFAULT_LITERAL_MARKER};

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The document is not valid JSON for this shape.
    #[error("Invalid executor config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value is out of range.
    #[error("Invalid value for '{field}': {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

/// Tunables for [`crate::pipeline::PipelineExecutor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Interval between in-flight progress ticks.
    #[serde(default = "default_tick_interval_ms")]
    pub progress_tick_interval_ms: u64,
    /// Percentage points of step progress added per tick.
    #[serde(default = "default_tick_increment")]
    pub progress_tick_increment: f64,
    /// Maximum ticks emitted per invocation.
    #[serde(default = "default_max_ticks")]
    pub max_progress_ticks: u32,
    /// Cap on step progress while the invocation is outstanding.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight_progress: f64,
    /// Timeout applied when neither the step nor the contract declares one.
    #[serde(default)]
    pub default_step_timeout_ms: Option<u64>,
    /// Policy for input-mapping paths that do not resolve.
    #[serde(default)]
    pub missing_input_path: MissingPathPolicy,
    /// Prefix marking mapping strings as literals.
    #[serde(default = "default_literal_marker")]
    pub literal_marker: String,
    /// Suffix of the bucket key used for unmapped step output.
    #[serde(default = "default_bucket_suffix")]
    pub output_bucket_suffix: String,
}

fn default_tick_interval_ms() -> u64 {
    500
}

fn default_tick_increment() -> f64 {
    5.0
}

fn default_max_ticks() -> u32 {
    100
}

fn default_max_in_flight() -> f64 {
    95.0
}

fn default_literal_marker() -> String {
    DEFAULT_LITERAL_MARKER.to_string()
}

fn default_bucket_suffix() -> String {
    "_output".to_string()
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            progress_tick_interval_ms: default_tick_interval_ms(),
            progress_tick_increment: default_tick_increment(),
            max_progress_ticks: default_max_ticks(),
            max_in_flight_progress: default_max_in_flight(),
            default_step_timeout_ms: None,
            missing_input_path: MissingPathPolicy::default(),
            literal_marker: default_literal_marker(),
            output_bucket_suffix: default_bucket_suffix(),
        }
    }
}

impl ExecutorConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and checks a JSON document. Missing keys take their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the executor cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.progress_tick_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "progress_tick_interval_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.progress_tick_increment.is_nan() || self.progress_tick_increment <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "progress_tick_increment",
                reason: format!("must be positive, got {}", self.progress_tick_increment),
            });
        }
        if !(0.0..100.0).contains(&self.max_in_flight_progress) {
            return Err(ConfigError::Invalid {
                field: "max_in_flight_progress",
                reason: format!("must be in [0, 100), got {}", self.max_in_flight_progress),
            });
        }
        if self.literal_marker.is_empty() {
            return Err(ConfigError::Invalid {
                field: "literal_marker",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Sets the tick interval.
    #[must_use]
    pub fn with_progress_tick_interval_ms(mut self, ms: u64) -> Self {
        self.progress_tick_interval_ms = ms;
        self
    }

    /// Sets the per-tick increment.
    #[must_use]
    pub fn with_progress_tick_increment(mut self, increment: f64) -> Self {
        self.progress_tick_increment = increment;
        self
    }

    /// Sets the tick budget per invocation.
    #[must_use]
    pub fn with_max_progress_ticks(mut self, ticks: u32) -> Self {
        self.max_progress_ticks = ticks;
        self
    }

    /// Sets the fallback step timeout.
    #[must_use]
    pub fn with_default_step_timeout_ms(mut self, ms: u64) -> Self {
        self.default_step_timeout_ms = Some(ms);
        self
    }

    /// Sets the unresolved input path policy.
    #[must_use]
    pub fn with_missing_input_path(mut self, policy: MissingPathPolicy) -> Self {
        self.missing_input_path = policy;
        self
    }

    /// Sets the literal marker.
    #[must_use]
    pub fn with_literal_marker(mut self, marker: impl Into<String>) -> Self {
        self.literal_marker = marker.into();
        self
    }

    /// Sets the bucket suffix.
    #[must_use]
    pub fn with_output_bucket_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.output_bucket_suffix = suffix.into();
        self
    }

    /// Tick interval as a duration.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.progress_tick_interval_ms.max(1))
    }

    /// Fallback timeout as a duration.
    #[must_use]
    pub fn default_step_timeout(&self) -> Option<Duration> {
        self.default_step_timeout_ms.map(Duration::from_millis)
    }

    /// Resolver used for step input mappings.
    #[must_use]
    pub fn input_resolver(&self) -> FieldResolver {
        FieldResolver::new()
            .with_literal_marker(self.literal_marker.clone())
            .with_missing_policy(self.missing_input_path)
    }

    /// Resolver used for step output mappings. Always strict.
    #[must_use]
    pub fn output_resolver(&self) -> FieldResolver {
        FieldResolver::new()
            .with_literal_marker(self.literal_marker.clone())
            .with_missing_policy(MissingPathPolicy::Fail)
    }

    /// Accumulator key for the unmapped output of `stage_id`.
    #[must_use]
    pub fn bucket_key(&self, stage_id: &str) -> String {
        format!("{stage_id}{}", self.output_bucket_suffix)
    }
}
