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

//! Threshold sets and the methods that produce them

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fallback absolute thresholds (low, medium, high)
pub const DEFAULT_ABS_THRESHOLDS: [f64; 3] = [1_000.0, 10_000.0, 100_000.0];

/// Fallback percentage thresholds (low, medium, high)
pub const DEFAULT_PCT_THRESHOLDS: [f64; 3] = [10.0, 20.0, 50.0];

/// How a threshold set was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdMethod {
    StdDev,
    Percentile,
    ConfigDirect,
    ConfigAdjusted,
    /// Not enough history; the documented fallback applies
    Default,
}

impl ThresholdMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThresholdMethod::StdDev => "std_dev",
            ThresholdMethod::Percentile => "percentile",
            ThresholdMethod::ConfigDirect => "config_direct",
            ThresholdMethod::ConfigAdjusted => "config_adjusted",
            ThresholdMethod::Default => "default",
        }
    }
}

impl fmt::Display for ThresholdMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Method a caller asks the calculator to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationMethod {
    #[default]
    StdDev,
    Percentile,
    /// Per-type configuration, adjusted by history when there is enough of it
    Config,
}

impl CalculationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalculationMethod::StdDev => "std_dev",
            CalculationMethod::Percentile => "percentile",
            CalculationMethod::Config => "config",
        }
    }
}

impl fmt::Display for CalculationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CalculationMethod {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "std_dev" => Ok(CalculationMethod::StdDev),
            "percentile" => Ok(CalculationMethod::Percentile),
            "config" | "config_only" => Ok(CalculationMethod::Config),
            other => Err(EngineError::UnknownMethod(other.to_string())),
        }
    }
}

/// Anomaly thresholds for one (asset, consumption type) series.
///
/// Invariant: `low <= medium <= high` on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSet {
    pub low_abs: f64,
    pub medium_abs: f64,
    pub high_abs: f64,
    pub low_pct: f64,
    pub medium_pct: f64,
    pub high_pct: f64,
    pub method: ThresholdMethod,
    /// Number of deltas the set was computed from (0 when not data-driven)
    pub sample_size: usize,
}

impl ThresholdSet {
    pub fn from_tiers(
        abs: [f64; 3],
        pct: [f64; 3],
        method: ThresholdMethod,
        sample_size: usize,
    ) -> Self {
        Self {
            low_abs: abs[0],
            medium_abs: abs[1],
            high_abs: abs[2],
            low_pct: pct[0],
            medium_pct: pct[1],
            high_pct: pct[2],
            method,
            sample_size,
        }
    }

    /// The documented fallback used when thresholds cannot be computed.
    pub fn fallback() -> Self {
        Self::from_tiers(
            DEFAULT_ABS_THRESHOLDS,
            DEFAULT_PCT_THRESHOLDS,
            ThresholdMethod::Default,
            0,
        )
    }

    pub fn is_fallback(&self) -> bool {
        self.method == ThresholdMethod::Default
    }

    pub fn is_monotonic(&self) -> bool {
        self.low_abs <= self.medium_abs
            && self.medium_abs <= self.high_abs
            && self.low_pct <= self.medium_pct
            && self.medium_pct <= self.high_pct
    }
}

impl Default for ThresholdSet {
    fn default() -> Self {
        Self::fallback()
    }
}
