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

// meterwatch-anomaly/src/detector.rs
//
// Contextual anomaly detection: each reading is judged against thresholds
// derived from its own series.
//
// ## Scoring
//
// Confidence grows by 0.1 for every multiple of the threshold the change
// exceeds, starting from a tier-specific base and capped per tier:
//
// | axis       | tier   | base | cap  |
// |------------|--------|------|------|
// | absolute   | high   | 0.5  | 0.90 |
// | absolute   | medium | 0.3  | 0.70 |
// | percentage | high   | 0.6  | 0.95 |
// | percentage | medium | 0.4  | 0.70 |
//
// The constants are empirical.

use crate::calculator::ThresholdCalculator;
use meterwatch_core::{
    daily_changes, AnnotatedReading, AnomalyConfig, AnomalyKind, AnomalyVerdict,
    CalculationMethod, DetectionOptions, EngineError, EngineResult, GroupKey, Reading,
    ThresholdSet,
};
use serde::Serialize;

/// Confidence growth per multiple of the threshold exceeded
pub const CONFIDENCE_STEP: f64 = 0.1;

pub const ABS_HIGH_BASE: f64 = 0.5;
pub const ABS_HIGH_CAP: f64 = 0.90;
pub const ABS_MEDIUM_BASE: f64 = 0.3;
pub const ABS_MEDIUM_CAP: f64 = 0.70;
pub const PCT_HIGH_BASE: f64 = 0.6;
pub const PCT_HIGH_CAP: f64 = 0.95;
pub const PCT_MEDIUM_BASE: f64 = 0.4;
pub const PCT_MEDIUM_CAP: f64 = 0.70;

/// A medium percentage signal only replaces absolute results below this
pub const WEAK_SIGNAL_CONFIDENCE: f64 = 0.5;

fn tier_confidence(magnitude: f64, threshold: f64, base: f64, cap: f64) -> f64 {
    let excess_ratio = magnitude / threshold;
    (base + (excess_ratio - 1.0) * CONFIDENCE_STEP).min(cap)
}

/// Classify one change against a threshold set.
///
/// Only magnitudes matter, so `+x` and `-x` score the same.
pub fn classify_change(delta: f64, delta_pct: Option<f64>, thresholds: &ThresholdSet) -> AnomalyVerdict {
    let mut verdict = AnomalyVerdict::none();

    let abs_change = delta.abs();
    if abs_change > thresholds.high_abs {
        verdict = AnomalyVerdict::flagged(
            tier_confidence(abs_change, thresholds.high_abs, ABS_HIGH_BASE, ABS_HIGH_CAP),
            AnomalyKind::AbsoluteChange,
            thresholds.high_abs,
        );
    } else if abs_change > thresholds.medium_abs {
        verdict = AnomalyVerdict::flagged(
            tier_confidence(abs_change, thresholds.medium_abs, ABS_MEDIUM_BASE, ABS_MEDIUM_CAP),
            AnomalyKind::AbsoluteChange,
            thresholds.medium_abs,
        );
    }

    let Some(pct) = delta_pct else {
        return verdict;
    };
    let abs_pct = pct.abs();

    if abs_pct > thresholds.high_pct {
        let confidence = tier_confidence(abs_pct, thresholds.high_pct, PCT_HIGH_BASE, PCT_HIGH_CAP);
        if !verdict.is_anomaly || confidence > verdict.confidence {
            verdict = AnomalyVerdict::flagged(
                confidence,
                AnomalyKind::PercentageChange,
                thresholds.high_pct,
            );
        }
    } else if abs_pct > thresholds.medium_pct {
        let confidence =
            tier_confidence(abs_pct, thresholds.medium_pct, PCT_MEDIUM_BASE, PCT_MEDIUM_CAP);
        let replaces = !verdict.is_anomaly
            || (verdict.confidence < WEAK_SIGNAL_CONFIDENCE && confidence > verdict.confidence);
        if replaces {
            verdict = AnomalyVerdict::flagged(
                confidence,
                AnomalyKind::PercentageChange,
                thresholds.medium_pct,
            );
        }
    }

    verdict
}

/// Reject series the detector cannot reason about.
pub fn validate_series(key: &GroupKey, series: &[Reading]) -> EngineResult<()> {
    if let Some(bad) = series.iter().find(|r| !r.cumulative_value.is_finite()) {
        return Err(EngineError::MalformedSeries {
            asset_id: key.asset_id.clone(),
            consumption_type: key.consumption_type.clone(),
            reason: format!(
                "non-finite value {} on {}",
                bad.cumulative_value, bad.timestamp
            ),
        });
    }
    Ok(())
}

/// Annotate a series sorted by timestamp. The first reading gets no verdict.
pub fn annotate_series(series: &[Reading], thresholds: &ThresholdSet) -> Vec<AnnotatedReading> {
    daily_changes(series)
        .into_iter()
        .map(|change| {
            let verdict = match change.delta {
                Some(delta) => classify_change(delta, change.delta_pct, thresholds),
                None => AnomalyVerdict::none(),
            };
            if verdict.is_anomaly {
                tracing::debug!(
                    key = %change.reading.key(),
                    date = %change.reading.timestamp,
                    delta = change.delta,
                    delta_pct = change.delta_pct,
                    confidence = verdict.confidence,
                    kind = ?verdict.kind,
                    "Detected contextual anomaly"
                );
            }
            AnnotatedReading {
                reading: change.reading,
                previous_value: change.previous_value,
                delta: change.delta,
                delta_pct: change.delta_pct,
                verdict,
            }
        })
        .collect()
}

/// Detection output for one series
#[derive(Debug, Clone, Serialize)]
pub struct GroupDetection {
    pub key: GroupKey,
    pub thresholds: ThresholdSet,
    pub annotated: Vec<AnnotatedReading>,
}

impl GroupDetection {
    pub fn anomaly_count(&self) -> usize {
        self.annotated.iter().filter(|a| a.is_anomaly()).count()
    }
}

/// Contextual anomaly detector
///
/// Holds only read-only settings; every call is independent.
#[derive(Debug, Clone)]
pub struct ContextualAnomalyDetector {
    options: DetectionOptions,
}

impl ContextualAnomalyDetector {
    pub fn new(options: DetectionOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &DetectionOptions {
        &self.options
    }

    /// Thresholds for one series from the given history.
    pub fn thresholds_for(
        &self,
        key: &GroupKey,
        history: &[Reading],
        method: CalculationMethod,
        config: &AnomalyConfig,
    ) -> EngineResult<ThresholdSet> {
        let mut calculator =
            ThresholdCalculator::new(key.clone(), config.resolve(&key.consumption_type))
                .with_min_data_points(self.options.min_data_points);
        calculator.load_history(history, self.options.window_days);
        calculator.get_thresholds(method, self.options.percentile, false)
    }

    /// Classify one series, using the series itself as history.
    pub fn detect_group(
        &self,
        key: &GroupKey,
        series: &[Reading],
        method: CalculationMethod,
        config: &AnomalyConfig,
    ) -> EngineResult<GroupDetection> {
        validate_series(key, series)?;
        let thresholds = self.thresholds_for(key, series, method, config)?;
        Ok(GroupDetection {
            key: key.clone(),
            thresholds,
            annotated: annotate_series(series, &thresholds),
        })
    }
}
