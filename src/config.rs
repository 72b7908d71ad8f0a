//! Configuration for the commitment engine and the flat trie loader.
//!
//! Both structs deserialize with every field optional, so they can be
//! embedded as sections of a host's TOML configuration file.

use serde::{Deserialize, Serialize};

/// Commitment engine options.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Log every rebuilt node at `trace` level.
    pub trace: bool,
}

/// Flat trie loader options.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Prefix attached to every log line of a load.
    pub log_prefix: String,
    /// Log every closed branch frame at `trace` level.
    pub trace: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            log_prefix: "calcroot".to_string(),
            trace: false,
        }
    }
}

impl LoaderConfig {
    /// Creates a config with the given log prefix.
    pub fn with_log_prefix(log_prefix: impl Into<String>) -> Self {
        Self {
            log_prefix: log_prefix.into(),
            ..Default::default()
        }
    }

    /// Enables or disables per-frame tracing.
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }
}
