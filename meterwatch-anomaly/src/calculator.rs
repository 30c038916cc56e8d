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

// meterwatch-anomaly/src/calculator.rs
//
// Asset-specific thresholds from historical day-to-day changes.
//
// ## Methods
//
// - **std_dev**: |mean(Δ)| + 2σ / 3σ / 4σ on the absolute and percentage axes
// - **percentile**: (p-10) / p / (p+5) percentiles of |Δ| and |Δ%|, each
//   clamped to [50, 99]
// - **config**: per-type configuration, adjusted by history when available
//
// When history is too short the calculator yields nothing and
// `get_thresholds` hands out the documented fallback set.

use chrono::Duration;
use meterwatch_core::stats::{quantile_sorted, sorted_copy};
use meterwatch_core::{
    daily_changes, sort_series, validate_percentile, CalculationMethod, DeltaStatistics,
    EngineResult, GroupKey, Reading, ThresholdMethod, ThresholdSet, TypeConfig,
};

/// Lowest percentile tier
const MIN_PERCENTILE_TIER: f64 = 50.0;

/// Highest percentile tier
const MAX_PERCENTILE_TIER: f64 = 99.0;

/// Default minimum number of history readings
pub const DEFAULT_MIN_DATA_POINTS: usize = 10;

/// Threshold calculator for one (asset, consumption type) series
#[derive(Debug, Clone)]
pub struct ThresholdCalculator {
    key: GroupKey,
    type_config: TypeConfig,
    min_data_points: usize,
    history: Vec<Reading>,
    cached: Option<CachedThresholds>,
}

#[derive(Debug, Clone, Copy)]
struct CachedThresholds {
    method: CalculationMethod,
    percentile: f64,
    thresholds: ThresholdSet,
}

impl ThresholdCalculator {
    pub fn new(key: GroupKey, type_config: TypeConfig) -> Self {
        Self {
            key,
            type_config,
            min_data_points: DEFAULT_MIN_DATA_POINTS,
            history: Vec::new(),
            cached: None,
        }
    }

    pub fn with_min_data_points(mut self, min_data_points: usize) -> Self {
        self.min_data_points = min_data_points;
        self.cached = None;
        self
    }

    pub fn key(&self) -> &GroupKey {
        &self.key
    }

    pub fn history(&self) -> &[Reading] {
        &self.history
    }

    /// Keep the readings of this calculator's series, sorted by timestamp.
    ///
    /// `window_days` trims the history to the trailing window ending at the
    /// latest reading; a window reaching past the earliest representable date
    /// keeps the whole history. Returns `false` when nothing is left.
    pub fn load_history(&mut self, readings: &[Reading], window_days: Option<u32>) -> bool {
        let mut history: Vec<Reading> = readings
            .iter()
            .filter(|r| r.belongs_to(&self.key))
            .cloned()
            .collect();
        sort_series(&mut history);

        if let (Some(days), Some(latest)) = (window_days, history.last().map(|r| r.timestamp)) {
            if let Some(cutoff) = latest.checked_sub_signed(Duration::days(i64::from(days))) {
                history.retain(|r| r.timestamp >= cutoff);
            }
        }

        tracing::debug!(
            key = %self.key,
            records = history.len(),
            "Loaded history"
        );

        self.history = history;
        self.cached = None;
        !self.history.is_empty()
    }

    /// Compute thresholds from the loaded history.
    ///
    /// `Ok(None)` means the history is too short for the requested method;
    /// the `config` method never yields `None`.
    pub fn calculate(
        &self,
        method: CalculationMethod,
        percentile: f64,
        min_data_points: usize,
    ) -> EngineResult<Option<ThresholdSet>> {
        if method == CalculationMethod::Percentile {
            validate_percentile(percentile)?;
        }

        let stats_and_changes = if self.history.len() >= min_data_points {
            let changes = daily_changes(&self.history);
            DeltaStatistics::from_changes(&changes).map(|stats| (stats, changes))
        } else {
            None
        };

        let Some((stats, changes)) = stats_and_changes else {
            tracing::warn!(
                "Insufficient data for {}: {} points (need {})",
                self.key,
                self.history.len(),
                min_data_points
            );
            return Ok(match method {
                CalculationMethod::Config => Some(self.type_config.to_thresholds(None)),
                _ => None,
            });
        };

        let thresholds = match method {
            CalculationMethod::StdDev => std_dev_thresholds(&stats),
            CalculationMethod::Percentile => percentile_thresholds(&changes, percentile, &stats),
            CalculationMethod::Config => self.type_config.to_thresholds(Some(&stats)),
        };

        tracing::info!(
            key = %self.key,
            method = %thresholds.method,
            sample_size = thresholds.sample_size,
            high_abs = thresholds.high_abs,
            high_pct = thresholds.high_pct,
            "Calculated thresholds"
        );

        Ok(Some(thresholds))
    }

    /// Memoised thresholds, falling back to [`ThresholdSet::fallback`] when
    /// they cannot be computed.
    pub fn get_thresholds(
        &mut self,
        method: CalculationMethod,
        percentile: f64,
        recalculate: bool,
    ) -> EngineResult<ThresholdSet> {
        if !recalculate {
            if let Some(cached) = self.cached {
                if cached.method == method && cached.percentile == percentile {
                    return Ok(cached.thresholds);
                }
            }
        }

        let thresholds = self
            .calculate(method, percentile, self.min_data_points)?
            .unwrap_or_else(ThresholdSet::fallback);

        self.cached = Some(CachedThresholds {
            method,
            percentile,
            thresholds,
        });
        Ok(thresholds)
    }
}

fn std_dev_thresholds(stats: &DeltaStatistics) -> ThresholdSet {
    let abs_base = stats.mean_change.abs();
    let pct_base = stats.mean_change_pct.abs();
    ThresholdSet::from_tiers(
        [
            abs_base + 2.0 * stats.std_change,
            abs_base + 3.0 * stats.std_change,
            abs_base + 4.0 * stats.std_change,
        ],
        [
            pct_base + 2.0 * stats.std_change_pct,
            pct_base + 3.0 * stats.std_change_pct,
            pct_base + 4.0 * stats.std_change_pct,
        ],
        ThresholdMethod::StdDev,
        stats.data_points,
    )
}

/// Percentile tiers, each clamped so that low <= medium <= high holds
pub(crate) fn percentile_tiers(percentile: f64) -> [f64; 3] {
    let clamp = |p: f64| p.clamp(MIN_PERCENTILE_TIER, MAX_PERCENTILE_TIER);
    [clamp(percentile - 10.0), clamp(percentile), clamp(percentile + 5.0)]
}

fn percentile_thresholds(
    changes: &[meterwatch_core::DailyChange],
    percentile: f64,
    stats: &DeltaStatistics,
) -> ThresholdSet {
    let abs: Vec<f64> = changes.iter().filter_map(|c| c.delta).map(f64::abs).collect();
    let pct: Vec<f64> = changes
        .iter()
        .filter_map(|c| c.delta_pct)
        .map(f64::abs)
        .collect();
    let abs = sorted_copy(&abs);
    let pct = sorted_copy(&pct);

    let tiers = percentile_tiers(percentile);
    // both axes hold at least two values once statistics exist
    let pick = |sorted: &[f64], p: f64| quantile_sorted(sorted, p / 100.0).unwrap_or(0.0);

    ThresholdSet::from_tiers(
        [
            pick(&abs, tiers[0]),
            pick(&abs, tiers[1]),
            pick(&abs, tiers[2]),
        ],
        [
            pick(&pct, tiers[0]),
            pick(&pct, tiers[1]),
            pick(&pct, tiers[2]),
        ],
        ThresholdMethod::Percentile,
        stats.data_points,
    )
}
