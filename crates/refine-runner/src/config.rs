use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use refinement::RefinementConfig;

/// Driver-side knobs; the control-loop thresholds live in `refinement`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverSettings {
    /// Per-judge scoring timeout.
    pub judge_timeout_ms: u64,
    /// How often the session timeout is re-checked while a patch is in flight.
    pub timeout_poll_ms: u64,
    /// Patches applied per refinement cycle.
    pub max_patches_per_cycle: usize,
    /// Character budget for retrieval context in a patch request.
    pub max_context_chars: usize,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            judge_timeout_ms: 60_000,
            timeout_poll_ms: 1_000,
            max_patches_per_cycle: 3,
            max_context_chars: 4_000,
        }
    }
}

impl DriverSettings {
    pub fn judge_timeout(&self) -> Duration {
        Duration::from_millis(self.judge_timeout_ms)
    }

    pub fn timeout_poll(&self) -> Duration {
        Duration::from_millis(self.timeout_poll_ms.max(1))
    }
}

/// Top-level runner configuration file.
///
/// ```toml
/// [refinement]
/// operation_mode = "semi-auto"
///
/// [driver]
/// judge_timeout_ms = 30000
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub refinement: RefinementConfig,
    pub driver: DriverSettings,
}

impl RunnerConfig {
    /// Load from TOML, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&content).context("Failed to parse runner config TOML")?;
        Ok(config.with_env_overrides())
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(mut self) -> Self {
        self.refinement = self.refinement.with_env_overrides();
        self.driver.judge_timeout_ms =
            u64_from_env("REFINE_JUDGE_TIMEOUT_MS", self.driver.judge_timeout_ms);
        self.driver.timeout_poll_ms =
            u64_from_env("REFINE_TIMEOUT_POLL_MS", self.driver.timeout_poll_ms);
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.refinement
            .validate()
            .context("Invalid refinement settings")?;
        anyhow::ensure!(
            self.driver.max_patches_per_cycle > 0,
            "driver.max_patches_per_cycle must be greater than zero"
        );
        Ok(())
    }
}

fn u64_from_env(var: &str, default: u64) -> u64 {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use refinement::OperatingMode;

    #[test]
    fn test_load_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runner.toml");
        std::fs::write(
            &path,
            r#"
[refinement]
operation_mode = "semi-auto"
max_iterations = 5

[driver]
max_patches_per_cycle = 1
"#,
        )
        .unwrap();

        let config = RunnerConfig::load(&path).unwrap();
        assert_eq!(config.refinement.operation_mode, OperatingMode::SemiAuto);
        assert_eq!(config.driver.max_patches_per_cycle, 1);
        assert_eq!(config.driver.timeout_poll_ms, 1_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_has_context() {
        let err = RunnerConfig::load(Path::new("/nonexistent/runner.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }

    #[test]
    fn test_zero_patches_rejected() {
        let mut config = RunnerConfig::default();
        config.driver.max_patches_per_cycle = 0;
        assert!(config.validate().is_err());
    }
}
