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

//! Descriptive statistics over daily changes

use crate::reading::DailyChange;
use serde::{Deserialize, Serialize};

/// Arithmetic mean, `None` for an empty slice
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n - 1 denominator), `None` below two samples
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mean = mean(values)?;
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(variance.sqrt())
}

/// Quantile of a sorted slice with linear interpolation between order
/// statistics. `q` is a fraction in [0, 1].
pub fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let q = q.clamp(0.0, 1.0);
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}

/// Sort a copy of `values` ascending. NaN never reaches here: series are
/// validated before any statistics run.
pub fn sorted_copy(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    sorted
}

/// Mean and spread of the day-to-day changes of one series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeltaStatistics {
    pub mean_change: f64,
    pub std_change: f64,
    pub mean_change_pct: f64,
    pub std_change_pct: f64,
    /// Number of absolute deltas the statistics were computed from
    pub data_points: usize,
}

impl DeltaStatistics {
    /// Needs at least two absolute and two percentage deltas.
    pub fn from_changes(changes: &[DailyChange]) -> Option<Self> {
        let deltas: Vec<f64> = changes.iter().filter_map(|c| c.delta).collect();
        let pcts: Vec<f64> = changes.iter().filter_map(|c| c.delta_pct).collect();

        Some(Self {
            mean_change: mean(&deltas)?,
            std_change: sample_std_dev(&deltas)?,
            mean_change_pct: mean(&pcts)?,
            std_change_pct: sample_std_dev(&pcts)?,
            data_points: deltas.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::{daily_changes, Reading};
    use chrono::NaiveDate;

    #[test]
    fn test_sample_std_dev() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let std = sample_std_dev(&values).unwrap();
        // population std is 2.0, sample std is sqrt(32/7)
        assert!((std - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
        assert!(sample_std_dev(&[1.0]).is_none());
    }

    #[test]
    fn test_quantile_interpolates() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(quantile_sorted(&sorted, 0.5), Some(3.0));
        assert_eq!(quantile_sorted(&sorted, 0.0), Some(1.0));
        assert_eq!(quantile_sorted(&sorted, 1.0), Some(5.0));
        assert!((quantile_sorted(&sorted, 0.95).unwrap() - 4.8).abs() < 1e-12);
        assert!(quantile_sorted(&[], 0.5).is_none());
    }

    #[test]
    fn test_delta_statistics_requires_two_deltas() {
        let d1 = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        let d3 = NaiveDate::from_ymd_opt(2025, 1, 3).unwrap();

        let short = daily_changes(&[
            Reading::new("A", "W", d1, 10.0),
            Reading::new("A", "W", d2, 20.0),
        ]);
        assert!(DeltaStatistics::from_changes(&short).is_none());

        let enough = daily_changes(&[
            Reading::new("A", "W", d1, 10.0),
            Reading::new("A", "W", d2, 20.0),
            Reading::new("A", "W", d3, 40.0),
        ]);
        let stats = DeltaStatistics::from_changes(&enough).unwrap();
        assert_eq!(stats.data_points, 2);
        assert_eq!(stats.mean_change, 15.0);
        assert_eq!(stats.mean_change_pct, 100.0);
    }
}
