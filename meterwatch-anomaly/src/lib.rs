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

//! # Meterwatch Anomaly Engine
//!
//! Contextual anomaly detection for cumulative utility meters. A reading is
//! anomalous when its day-to-day change is unusual *for its own series*, so
//! every (asset, consumption type) pair gets thresholds learned from its own
//! history.
//!
//! ## Features
//!
//! - **Threshold methods**: standard deviation, percentile, or per-type config
//! - **Graded confidence**: tiered scoring on absolute and percentage change
//! - **Batch runs**: optional worker pool with deterministic output
//! - **Counter resets**: detection and offset correction before scoring
//!
//! ## Example
//!
//! ```rust,ignore
//! use meterwatch_anomaly::AnomalyEngine;
//! use meterwatch_core::{AnomalyConfig, DetectionOptions};
//!
//! let engine = AnomalyEngine::new(DetectionOptions::default(), AnomalyConfig::builtin())?;
//! let report = engine.detect_anomalies(&readings, false);
//! for record in report.records.iter().filter(|r| r.is_anomaly()) {
//!     println!("{} {}", record.reading.key(), record.verdict.confidence);
//! }
//! ```

pub mod batch;
pub mod calculator;
pub mod detector;
pub mod engine;
pub mod report;
pub mod resets;

pub use batch::{BatchReport, BatchRunner, GroupFailure, GroupSummary};
pub use calculator::{ThresholdCalculator, DEFAULT_MIN_DATA_POINTS};
pub use detector::{annotate_series, classify_change, ContextualAnomalyDetector, GroupDetection};
pub use engine::AnomalyEngine;
pub use report::{AssetReport, BaselineReport, ConfidenceBuckets, KindBuckets, Outcome, TopAnomaly};
pub use resets::{correct_counter_resets, CorrectedReading, ResetDetector, ResetEvent, ResetKind};
