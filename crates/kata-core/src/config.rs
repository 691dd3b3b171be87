//! Engine configuration with environment-friendly defaults.
//!
//! Every field has a serde default so a minimal (or absent) configuration
//! document yields a working engine; surrounding layers can deserialize this
//! from whatever format they store settings in.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core_types::ExecOptions;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Wall-clock ceiling for one execution, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Approximate heap-byte budget for one execution.
    #[serde(default = "default_memory_ceiling_bytes")]
    pub memory_ceiling_bytes: usize,
    /// Cap on captured textual output per execution.
    #[serde(default = "default_output_limit_bytes")]
    pub output_limit_bytes: usize,
    /// Maximum user-function call depth.
    #[serde(default = "default_max_call_depth")]
    pub max_call_depth: usize,
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_memory_ceiling_bytes() -> usize {
    48 * 1024 * 1024
}

fn default_output_limit_bytes() -> usize {
    64 * 1024
}

fn default_max_call_depth() -> usize {
    200
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            memory_ceiling_bytes: default_memory_ceiling_bytes(),
            output_limit_bytes: default_output_limit_bytes(),
            max_call_depth: default_max_call_depth(),
        }
    }
}

impl EngineConfig {
    /// Per-invocation options derived from this configuration.
    pub fn exec_options(&self) -> ExecOptions {
        ExecOptions {
            timeout: Duration::from_millis(self.timeout_ms),
            memory_ceiling_bytes: self.memory_ceiling_bytes,
            capture_output: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_document() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.timeout_ms, 5_000);
        assert_eq!(config.memory_ceiling_bytes, 48 * 1024 * 1024);
    }

    #[test]
    fn test_partial_override() {
        let config: EngineConfig = serde_json::from_str(r#"{"timeout_ms": 250}"#).unwrap();
        assert_eq!(config.timeout_ms, 250);
        assert_eq!(config.max_call_depth, 200);
    }

    #[test]
    fn test_exec_options_mirror_config() {
        let config = EngineConfig {
            timeout_ms: 100,
            ..EngineConfig::default()
        };
        let options = config.exec_options();
        assert_eq!(options.timeout, Duration::from_millis(100));
        assert!(options.capture_output);
    }
}
