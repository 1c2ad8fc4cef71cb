//! Runtime configuration.
//!
//! Configuration is per thread, like the rest of the runtime. Install it with
//! [`Runtime::configure`](crate::reactive::Runtime::configure) before creating
//! any reactive values on that thread.

use serde::{Deserialize, Serialize};

/// Default cap on the number of rounds one flush may take.
pub const DEFAULT_MAX_FLUSH_ROUNDS: usize = 100;

/// When a write outside of a batch propagates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushMode {
    /// Every write outside a batch flushes before returning.
    #[default]
    Sync,

    /// Writes outside a batch only queue work. The queue is flushed by
    /// [`flush`](crate::reactive::flush) or at the next
    /// [`tick`](crate::reactive::tick), so all writes made by one task
    /// collapse into a single flush.
    Deferred,
}

/// Errors produced while loading a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The document could not be parsed.
    #[error("invalid runtime configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// A field holds a value the runtime cannot work with.
    #[error("invalid value for `{field}`: {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

/// Tunables for the reactive runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// How many rounds a flush may take before it is declared an infinite
    /// reaction.
    pub max_flush_rounds: usize,

    /// When writes outside a batch are propagated.
    pub flush_mode: FlushMode,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_flush_rounds: DEFAULT_MAX_FLUSH_ROUNDS,
            flush_mode: FlushMode::Sync,
        }
    }
}

impl RuntimeConfig {
    /// Parse and validate a JSON configuration. Missing fields take their
    /// defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every field is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_flush_rounds == 0 {
            return Err(ConfigError::Invalid {
                field: "max_flush_rounds",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }

    /// Builder-style setter for the flush mode.
    pub fn with_flush_mode(mut self, flush_mode: FlushMode) -> Self {
        self.flush_mode = flush_mode;
        self
    }

    /// Builder-style setter for the flush round cap.
    pub fn with_max_flush_rounds(mut self, rounds: usize) -> Self {
        self.max_flush_rounds = rounds;
        self
    }
}
