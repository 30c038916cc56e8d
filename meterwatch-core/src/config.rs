// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Anomaly configuration
//!
//! Two documents feed the engine:
//! - the per-consumption-type override file (JSON), which never fails the
//!   caller: a missing or malformed file resolves to the built-in default.
//! - optional engine settings ([`DetectionOptions`], TOML), which are checked
//!   strictly because bad values there are caller mistakes.

use crate::error::{EngineError, EngineResult};
use crate::stats::DeltaStatistics;
use crate::threshold::{CalculationMethod, ThresholdMethod, ThresholdSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Default location of the override document
pub const DEFAULT_CONFIG_PATH: &str = "data/analyzed_data/anomaly_config.json";

/// Key of the mandatory fallback entry
pub const DEFAULT_TYPE_KEY: &str = "default";

fn default_daily_max() -> f64 {
    10.0
}

fn default_monthly_max() -> f64 {
    200.0
}

fn default_sudden_increase() -> f64 {
    5.0
}

fn default_std_multiplier() -> f64 {
    3.0
}

/// Limits for one consumption type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TypeConfig {
    #[serde(default = "default_daily_max")]
    pub daily_max: f64,

    #[serde(default = "default_monthly_max")]
    pub monthly_max: f64,

    /// Percentage jump considered sudden
    #[serde(
        rename = "sudden_increase",
        alias = "sudden_increase_pct",
        default = "default_sudden_increase"
    )]
    pub sudden_increase_pct: f64,

    /// Sigma multiplier for history-adjusted thresholds
    #[serde(default = "default_std_multiplier")]
    pub std_multiplier: f64,
}

impl Default for TypeConfig {
    fn default() -> Self {
        Self {
            daily_max: default_daily_max(),
            monthly_max: default_monthly_max(),
            sudden_increase_pct: default_sudden_increase(),
            std_multiplier: default_std_multiplier(),
        }
    }
}

impl TypeConfig {
    fn validate(&self) -> Result<(), String> {
        let fields = [
            ("daily_max", self.daily_max),
            ("monthly_max", self.monthly_max),
            ("sudden_increase", self.sudden_increase_pct),
            ("std_multiplier", self.std_multiplier),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("{} must be a finite, non-negative number", name));
            }
        }
        Ok(())
    }

    /// Turn configured limits into thresholds.
    ///
    /// With history, thresholds sit `k`, `k+1` and `k+2` standard deviations
    /// above the mean change (`k = std_multiplier`). Without it, `daily_max`
    /// and `sudden_increase` are scaled by 0.5, 1 and 2.
    pub fn to_thresholds(&self, stats: Option<&DeltaStatistics>) -> ThresholdSet {
        match stats {
            Some(stats) => {
                let k = self.std_multiplier;
                let abs_base = stats.mean_change.abs();
                let pct_base = stats.mean_change_pct.abs();
                ThresholdSet::from_tiers(
                    [
                        abs_base + k * stats.std_change,
                        abs_base + (k + 1.0) * stats.std_change,
                        abs_base + (k + 2.0) * stats.std_change,
                    ],
                    [
                        pct_base + k * stats.std_change_pct,
                        pct_base + (k + 1.0) * stats.std_change_pct,
                        pct_base + (k + 2.0) * stats.std_change_pct,
                    ],
                    ThresholdMethod::ConfigAdjusted,
                    stats.data_points,
                )
            }
            None => ThresholdSet::from_tiers(
                [self.daily_max * 0.5, self.daily_max, self.daily_max * 2.0],
                [
                    self.sudden_increase_pct * 0.5,
                    self.sudden_increase_pct,
                    self.sudden_increase_pct * 2.0,
                ],
                ThresholdMethod::ConfigDirect,
                0,
            ),
        }
    }
}

/// Per-consumption-type overrides, always holding a `default` entry.
///
/// Read-only once loaded; callers that need fresh values load a new one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyConfig {
    types: BTreeMap<String, TypeConfig>,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self::builtin()
    }
}

impl AnomalyConfig {
    /// Only the built-in default entry
    pub fn builtin() -> Self {
        let mut types = BTreeMap::new();
        types.insert(DEFAULT_TYPE_KEY.to_string(), TypeConfig::default());
        Self { types }
    }

    /// Load the override document. Never fails: missing or unreadable files
    /// fall back to [`AnomalyConfig::builtin`] with a warning.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!(
                "Anomaly configuration file not found at {}, using default values",
                path.display()
            );
            return Self::builtin();
        }

        match Self::try_load(path) {
            Ok(config) => {
                tracing::info!(
                    path = %path.display(),
                    types = config.types.len(),
                    "Loaded anomaly configuration"
                );
                config
            }
            Err(e) => {
                tracing::error!("Error loading anomaly configuration: {}", e);
                Self::builtin()
            }
        }
    }

    /// Strict variant of [`AnomalyConfig::load`]
    pub fn try_load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Parse and validate an override document.
    ///
    /// The document must be a JSON object. Entries that are not objects or
    /// carry invalid values are dropped with a warning; a missing `default`
    /// entry is filled with built-in values.
    pub fn from_json_str(json: &str) -> EngineResult<Self> {
        let raw: BTreeMap<String, serde_json::Value> = serde_json::from_str(json)?;
        let mut types = BTreeMap::new();

        for (key, value) in raw {
            let entry: TypeConfig = match serde_json::from_value(value) {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping anomaly config entry {:?}: {}", key, e);
                    continue;
                }
            };
            if let Err(reason) = entry.validate() {
                tracing::warn!("Skipping anomaly config entry {:?}: {}", key, reason);
                continue;
            }
            types.insert(key, entry);
        }

        if !types.contains_key(DEFAULT_TYPE_KEY) {
            tracing::warn!("Anomaly configuration has no default entry, using built-in values");
            types.insert(DEFAULT_TYPE_KEY.to_string(), TypeConfig::default());
        }

        Ok(Self { types })
    }

    /// Exact match on the consumption type, else the `default` entry
    pub fn resolve(&self, consumption_type: &str) -> TypeConfig {
        self.types
            .get(consumption_type)
            .or_else(|| self.types.get(DEFAULT_TYPE_KEY))
            .copied()
            .unwrap_or_default()
    }

    pub fn get(&self, consumption_type: &str) -> Option<&TypeConfig> {
        self.types.get(consumption_type)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Longest accepted history window (100 years)
pub const MAX_WINDOW_DAYS: u32 = 36_600;

fn default_percentile() -> f64 {
    95.0
}

fn default_min_data_points() -> usize {
    10
}

fn default_workers() -> usize {
    1
}

/// Engine settings shared by every façade call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionOptions {
    /// Statistical method used when configuration is not requested
    #[serde(default)]
    pub method: CalculationMethod,

    /// Percentile for the `percentile` method
    #[serde(default = "default_percentile")]
    pub percentile: f64,

    /// Minimum readings in the history window before statistics are trusted
    #[serde(default = "default_min_data_points")]
    pub min_data_points: usize,

    /// Trailing history window in days, counted back from the latest reading
    #[serde(default)]
    pub window_days: Option<u32>,

    /// Worker threads for batch runs (0 = available parallelism)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Undo counter resets before computing thresholds
    #[serde(default)]
    pub correct_counter_resets: bool,
}

impl Default for DetectionOptions {
    fn default() -> Self {
        Self {
            method: CalculationMethod::default(),
            percentile: default_percentile(),
            min_data_points: default_min_data_points(),
            window_days: None,
            workers: default_workers(),
            correct_counter_resets: false,
        }
    }
}

impl DetectionOptions {
    pub fn from_toml_str(s: &str) -> EngineResult<Self> {
        let options: DetectionOptions = toml::from_str(s)?;
        options.validate()?;
        Ok(options)
    }

    pub fn with_method(mut self, method: CalculationMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_percentile(mut self, percentile: f64) -> Self {
        self.percentile = percentile;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn validate(&self) -> EngineResult<()> {
        validate_percentile(self.percentile)?;
        if self.min_data_points < 2 {
            return Err(EngineError::InvalidOption {
                name: "min_data_points",
                reason: format!("must be at least 2, got {}", self.min_data_points),
            });
        }
        match self.window_days {
            Some(0) => {
                return Err(EngineError::InvalidOption {
                    name: "window_days",
                    reason: "must be positive when set".to_string(),
                });
            }
            Some(days) if days > MAX_WINDOW_DAYS => {
                return Err(EngineError::InvalidOption {
                    name: "window_days",
                    reason: format!("must be at most {MAX_WINDOW_DAYS}, got {days}"),
                });
            }
            _ => {}
        }
        Ok(())
    }
}

/// Percentiles live in (0, 100]
pub fn validate_percentile(percentile: f64) -> EngineResult<()> {
    if percentile.is_finite() && percentile > 0.0 && percentile <= 100.0 {
        Ok(())
    } else {
        Err(EngineError::InvalidPercentile(percentile))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_missing_file_uses_builtin() {
        let config = AnomalyConfig::load("/nonexistent/anomaly_config.json");
        assert_eq!(config, AnomalyConfig::builtin());
        assert_eq!(config.resolve("WATER"), TypeConfig::default());
    }

    #[test]
    fn test_malformed_file_uses_builtin() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let config = AnomalyConfig::load(file.path());
        assert_eq!(config, AnomalyConfig::builtin());
    }

    #[test]
    fn test_load_and_resolve() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "default": {{"daily_max": 12.0, "monthly_max": 250.0, "sudden_increase": 6.0, "std_multiplier": 2.5}},
                "WATER": {{"daily_max": 40.0, "sudden_increase_pct": 8.0}}
            }}"#
        )
        .unwrap();

        let config = AnomalyConfig::load(file.path());
        assert_eq!(config.len(), 2);

        let water = config.resolve("WATER");
        assert_eq!(water.daily_max, 40.0);
        assert_eq!(water.sudden_increase_pct, 8.0);
        // missing fields take built-in values, not the document's default entry
        assert_eq!(water.monthly_max, 200.0);

        let other = config.resolve("ENERGY");
        assert_eq!(other.daily_max, 12.0);
        assert_eq!(other.std_multiplier, 2.5);
    }

    #[test]
    fn test_invalid_entries_are_dropped() {
        let config = AnomalyConfig::from_json_str(
            r#"{
                "version": "2",
                "GAS": {"daily_max": -4.0},
                "HEAT": {"daily_max": 30.0}
            }"#,
        )
        .unwrap();

        assert!(config.get("version").is_none());
        assert!(config.get("GAS").is_none());
        assert_eq!(config.resolve("HEAT").daily_max, 30.0);
        assert_eq!(config.resolve("GAS"), TypeConfig::default());
    }

    #[test]
    fn test_non_object_document_is_rejected() {
        assert!(AnomalyConfig::from_json_str("[1, 2, 3]").is_err());
    }

    #[test]
    fn test_direct_thresholds() {
        let set = TypeConfig::default().to_thresholds(None);
        assert_eq!(set.method, ThresholdMethod::ConfigDirect);
        assert_eq!((set.low_abs, set.medium_abs, set.high_abs), (5.0, 10.0, 20.0));
        assert_eq!((set.low_pct, set.medium_pct, set.high_pct), (2.5, 5.0, 10.0));
    }

    #[test]
    fn test_adjusted_thresholds() {
        let stats = DeltaStatistics {
            mean_change: -4.0,
            std_change: 2.0,
            mean_change_pct: 1.0,
            std_change_pct: 0.5,
            data_points: 30,
        };
        let set = TypeConfig::default().to_thresholds(Some(&stats));
        assert_eq!(set.method, ThresholdMethod::ConfigAdjusted);
        assert_eq!((set.low_abs, set.medium_abs, set.high_abs), (10.0, 12.0, 14.0));
        assert_eq!((set.low_pct, set.medium_pct, set.high_pct), (2.5, 3.0, 3.5));
        assert_eq!(set.sample_size, 30);
    }

    #[test]
    fn test_options_from_toml() {
        let options = DetectionOptions::from_toml_str(
            r#"
            method = "percentile"
            percentile = 90.0
            window_days = 90
            workers = 4
            "#,
        )
        .unwrap();
        assert_eq!(options.method, CalculationMethod::Percentile);
        assert_eq!(options.min_data_points, 10);
        assert_eq!(options.window_days, Some(90));

        let err = DetectionOptions::from_toml_str("percentile = 140.0").unwrap_err();
        assert!(matches!(err, EngineError::InvalidPercentile(_)));

        assert!(DetectionOptions::from_toml_str(r#"method = "zscore""#).is_err());
    }

    #[test]
    fn test_window_days_bounds() {
        let err = DetectionOptions::from_toml_str("window_days = 4294967295").unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidOption {
                name: "window_days",
                ..
            }
        ));
        assert!(DetectionOptions::from_toml_str("window_days = 0").is_err());

        let widest = DetectionOptions {
            window_days: Some(MAX_WINDOW_DAYS),
            ..DetectionOptions::default()
        };
        assert!(widest.validate().is_ok());
    }
}
