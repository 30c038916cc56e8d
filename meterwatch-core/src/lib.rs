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

//! Meterwatch Core
//!
//! Data model shared by the anomaly engine: cumulative meter readings, the
//! day-to-day changes derived from them, threshold sets, verdicts and the
//! per-consumption-type configuration.

pub mod config;
pub mod error;
pub mod reading;
pub mod stats;
pub mod threshold;
pub mod verdict;

pub use config::{
    validate_percentile, AnomalyConfig, DetectionOptions, TypeConfig, DEFAULT_CONFIG_PATH,
    DEFAULT_TYPE_KEY,
};
pub use error::{EngineError, EngineResult};
pub use reading::{daily_changes, group_readings, sort_series, DailyChange, GroupKey, Reading, ReadingRow};
pub use stats::DeltaStatistics;
pub use threshold::{
    CalculationMethod, ThresholdMethod, ThresholdSet, DEFAULT_ABS_THRESHOLDS,
    DEFAULT_PCT_THRESHOLDS,
};
pub use verdict::{AnnotatedReading, AnnotatedRow, AnomalyKind, AnomalyVerdict, MAX_CONFIDENCE};
