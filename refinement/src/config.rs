//! Session configuration
//!
//! All thresholds and limits the control loop reads. Defaults match the
//! documented constants; every field can be overridden from TOML, from the
//! environment, or programmatically.
//!
//! ```toml
//! operation_mode = "semi-auto"
//! max_iterations = 4
//! timeout_ms = 120000
//!
//! [pricing."my-model"]
//! input_per_million = 1.0
//! output_per_million = 4.0
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::arbiter::JudgeQuorum;
use crate::best_effort::DEFAULT_MAX_HINTS;
use crate::cost::{ModelPrice, PriceTable, DEFAULT_COST_CEILING};
use crate::quality_lock::{DEFAULT_LOCK_THRESHOLD, DEFAULT_LOCK_TOLERANCE};

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// How autonomously the loop operates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperatingMode {
    /// Decide autonomously with a lower accept bar
    #[default]
    FullAuto,
    /// Higher accept bar; escalate to a human on failure
    SemiAuto,
}

impl std::fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FullAuto => write!(f, "full-auto"),
            Self::SemiAuto => write!(f, "semi-auto"),
        }
    }
}

impl std::str::FromStr for OperatingMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "full-auto" => Ok(Self::FullAuto),
            "semi-auto" => Ok(Self::SemiAuto),
            other => Err(ConfigError::Invalid {
                field: "operation_mode",
                reason: format!("unknown mode '{}' (expected full-auto or semi-auto)", other),
            }),
        }
    }
}

/// A value per operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerMode<T> {
    pub full_auto: T,
    pub semi_auto: T,
}

impl<T: Copy> PerMode<T> {
    pub fn get(&self, mode: OperatingMode) -> T {
        match mode {
            OperatingMode::FullAuto => self.full_auto,
            OperatingMode::SemiAuto => self.semi_auto,
        }
    }
}

/// Lower bounds (inclusive) of the quality labels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityBands {
    pub good: f64,
    pub acceptable: f64,
}

/// Refinement session configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinementConfig {
    pub operation_mode: OperatingMode,
    /// Score at which a criterion is frozen into the lock map
    pub lock_threshold: f64,
    /// Allowed drop below a locked score
    pub lock_tolerance: f64,
    pub max_iterations: u32,
    pub max_tokens: u64,
    pub timeout_ms: u64,
    /// Edits after which a section is locked
    pub section_lock_after_edits: u32,
    /// Plateau width for convergence detection
    pub convergence_threshold: f64,
    pub accept_thresholds: PerMode<f64>,
    pub quality_bands: PerMode<QualityBands>,
    pub max_hints: usize,
    pub cost_ceiling: f64,
    pub judge_quorum: JudgeQuorum,
    /// Extra or overriding model prices, per million tokens
    pub pricing: BTreeMap<String, ModelPrice>,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            operation_mode: OperatingMode::FullAuto,
            lock_threshold: DEFAULT_LOCK_THRESHOLD,
            lock_tolerance: DEFAULT_LOCK_TOLERANCE,
            max_iterations: 3,
            max_tokens: 15_000,
            timeout_ms: 300_000,
            section_lock_after_edits: 2,
            convergence_threshold: 0.02,
            accept_thresholds: PerMode {
                full_auto: 0.85,
                semi_auto: 0.90,
            },
            quality_bands: PerMode {
                full_auto: QualityBands {
                    good: 0.85,
                    acceptable: 0.75,
                },
                semi_auto: QualityBands {
                    good: 0.90,
                    acceptable: 0.85,
                },
            },
            max_hints: DEFAULT_MAX_HINTS,
            cost_ceiling: DEFAULT_COST_CEILING,
            judge_quorum: JudgeQuorum::RequireAll,
            pricing: BTreeMap::new(),
        }
    }
}

impl RefinementConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Loading refinement config");
        Self::from_toml_str(&content)
    }

    /// Apply `REFINE_*` environment overrides. Unparseable values are ignored.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(mode) = std::env::var("REFINE_MODE")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.operation_mode = mode;
        }
        self.max_iterations = u32_from_env("REFINE_MAX_ITERATIONS", self.max_iterations);
        self.max_tokens = u64_from_env("REFINE_MAX_TOKENS", self.max_tokens);
        self.timeout_ms = u64_from_env("REFINE_TIMEOUT_MS", self.timeout_ms);
        self.section_lock_after_edits = u32_from_env(
            "REFINE_SECTION_LOCK_AFTER_EDITS",
            self.section_lock_after_edits,
        );
        self
    }

    pub fn with_mode(mut self, mode: OperatingMode) -> Self {
        self.operation_mode = mode;
        self
    }

    /// Accept threshold for the configured mode.
    pub fn accept_threshold(&self) -> f64 {
        self.accept_thresholds.get(self.operation_mode)
    }

    /// Quality bands for the configured mode.
    pub fn bands(&self) -> QualityBands {
        self.quality_bands.get(self.operation_mode)
    }

    /// Below this a semi-auto stop escalates to a human.
    pub fn good_enough_threshold(&self) -> f64 {
        self.bands().acceptable
    }

    /// Built-in prices merged with configured overrides.
    pub fn price_table(&self) -> PriceTable {
        let mut table = PriceTable::default();
        for (model, price) in &self.pricing {
            table.insert(model.clone(), *price);
        }
        table
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let unit = |field: &'static str, value: f64| -> ConfigResult<()> {
            if value.is_finite() && (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(ConfigError::Invalid {
                    field,
                    reason: format!("{} is outside 0.0..=1.0", value),
                })
            }
        };
        let positive = |field: &'static str, value: u64| -> ConfigResult<()> {
            if value > 0 {
                Ok(())
            } else {
                Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".to_string(),
                })
            }
        };

        unit("lock_threshold", self.lock_threshold)?;
        unit("lock_tolerance", self.lock_tolerance)?;
        unit("convergence_threshold", self.convergence_threshold)?;
        unit("accept_thresholds.full_auto", self.accept_thresholds.full_auto)?;
        unit("accept_thresholds.semi_auto", self.accept_thresholds.semi_auto)?;
        for (field, bands) in [
            ("quality_bands.full_auto", self.quality_bands.full_auto),
            ("quality_bands.semi_auto", self.quality_bands.semi_auto),
        ] {
            unit(field, bands.good)?;
            unit(field, bands.acceptable)?;
            if bands.acceptable > bands.good {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!(
                        "acceptable ({}) exceeds good ({})",
                        bands.acceptable, bands.good
                    ),
                });
            }
        }
        positive("max_iterations", self.max_iterations as u64)?;
        positive("max_tokens", self.max_tokens)?;
        positive("timeout_ms", self.timeout_ms)?;
        positive("section_lock_after_edits", self.section_lock_after_edits as u64)?;
        if !self.cost_ceiling.is_finite() || self.cost_ceiling <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "cost_ceiling",
                reason: format!("{} is not a positive amount", self.cost_ceiling),
            });
        }
        for (model, price) in &self.pricing {
            if !price.is_valid() {
                return Err(ConfigError::Invalid {
                    field: "pricing",
                    reason: format!("price for {} must be finite and non-negative", model),
                });
            }
        }
        Ok(())
    }
}

fn u32_from_env(var: &str, default: u32) -> u32 {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
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

    #[test]
    fn test_defaults() {
        let config = RefinementConfig::default();
        assert_eq!(config.max_iterations, 3);
        assert_eq!(config.max_tokens, 15_000);
        assert_eq!(config.timeout_ms, 300_000);
        assert_eq!(config.section_lock_after_edits, 2);
        assert!((config.accept_threshold() - 0.85).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_mode_dependent_thresholds() {
        let config = RefinementConfig::default().with_mode(OperatingMode::SemiAuto);
        assert!((config.accept_threshold() - 0.90).abs() < f64::EPSILON);
        assert!((config.good_enough_threshold() - 0.85).abs() < f64::EPSILON);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RefinementConfig::from_toml_str(
            r#"
operation_mode = "semi-auto"
max_iterations = 5

[pricing."tiny-model"]
input_per_million = 0.1
output_per_million = 0.2
"#,
        )
        .unwrap();
        assert_eq!(config.operation_mode, OperatingMode::SemiAuto);
        assert_eq!(config.max_iterations, 5);
        assert_eq!(config.max_tokens, 15_000);
        assert!(config.price_table().get("tiny-model").is_some());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = RefinementConfig::from_toml_str("lock_tolerance = 1.5").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "lock_tolerance",
                ..
            }
        ));
        assert!(RefinementConfig::from_toml_str("max_iterations = 0").is_err());
        assert!(RefinementConfig::from_toml_str("operation_mode = \"manual\"").is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("refine.toml");
        std::fs::write(&path, "timeout_ms = 1000\n").unwrap();
        let config = RefinementConfig::from_file(&path).unwrap();
        assert_eq!(config.timeout_ms, 1000);

        let missing = RefinementConfig::from_file(&dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!(
            "semi_auto".parse::<OperatingMode>().unwrap(),
            OperatingMode::SemiAuto
        );
        assert_eq!(OperatingMode::FullAuto.to_string(), "full-auto");
    }
}
