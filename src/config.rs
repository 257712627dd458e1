//! Kernel configuration (ambient component N). A single defaults level —
//! collapsed from the teacher's four-tier (system/team/project/user) config
//! hierarchy since the kernel has no multi-tenant policy system to justify
//! more than one.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    pub default_capacity_minutes_per_day: i64,
    pub due_soon_days_default: i64,
    pub execution_window: ExecutionWindowConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionWindowConfig {
    pub scheduled_max_default: i64,
    pub scheduled_max_cap: i64,
    pub actionable_max_default: i64,
    pub next_up_hours: i64,
}

impl Default for KernelConfig {
    fn default() -> Self {
        KernelConfig {
            default_capacity_minutes_per_day: 480,
            due_soon_days_default: 7,
            execution_window: ExecutionWindowConfig::default(),
        }
    }
}

impl Default for ExecutionWindowConfig {
    fn default() -> Self {
        ExecutionWindowConfig {
            scheduled_max_default: 12,
            scheduled_max_cap: 50,
            actionable_max_default: 8,
            next_up_hours: 4,
        }
    }
}

impl ExecutionWindowConfig {
    pub fn unscheduled_max_default(&self) -> i64 {
        (2 * self.actionable_max_default).max(16)
    }
}

impl KernelConfig {
    /// Load from a TOML file if present, falling back to defaults field by field.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(KernelConfig::default());
        }
        let text = std::fs::read_to_string(path).map_err(|e| Error::Internal(format!("reading config: {e}")))?;
        toml::from_str(&text).map_err(|e| Error::Internal(format!("parsing config: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_defaults() {
        let cfg = KernelConfig::default();
        assert_eq!(cfg.execution_window.scheduled_max_default, 12);
        assert_eq!(cfg.execution_window.actionable_max_default, 8);
        assert_eq!(cfg.execution_window.unscheduled_max_default(), 16);
    }

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let cfg = KernelConfig::load("/nonexistent/path/kernel.toml").unwrap();
        assert_eq!(cfg, KernelConfig::default());
    }
}
