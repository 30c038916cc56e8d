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

//! Property tests for threshold calculation and change scoring.

use chrono::{Duration, NaiveDate};
use meterwatch_anomaly::{classify_change, ThresholdCalculator};
use meterwatch_core::{
    CalculationMethod, GroupKey, Reading, ThresholdMethod, ThresholdSet, TypeConfig,
    MAX_CONFIDENCE,
};
use proptest::prelude::*;

// ============================================================================
// Generators
// ============================================================================

/// Cumulative series built from non-negative daily increments
fn arb_series(min_len: usize, max_len: usize) -> impl Strategy<Value = Vec<f64>> {
    (1.0f64..10_000.0, prop::collection::vec(0.0f64..500.0, min_len..max_len)).prop_map(
        |(start, steps)| {
            let mut value = start;
            let mut out = vec![value];
            for step in steps {
                value += step;
                out.push(value);
            }
            out
        },
    )
}

fn arb_thresholds() -> impl Strategy<Value = ThresholdSet> {
    (
        prop::array::uniform3(0.1f64..1_000.0),
        prop::array::uniform3(0.1f64..100.0),
    )
        .prop_map(|(mut abs, mut pct)| {
            abs.sort_by(f64::total_cmp);
            pct.sort_by(f64::total_cmp);
            ThresholdSet::from_tiers(abs, pct, ThresholdMethod::StdDev, 30)
        })
}

fn arb_method() -> impl Strategy<Value = CalculationMethod> {
    prop_oneof![
        Just(CalculationMethod::StdDev),
        Just(CalculationMethod::Percentile),
        Just(CalculationMethod::Config),
    ]
}

fn calculator(values: &[f64]) -> ThresholdCalculator {
    let key = GroupKey::new("P1", "WATER");
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let readings: Vec<Reading> = values
        .iter()
        .enumerate()
        .map(|(i, v)| Reading::new("P1", "WATER", start + Duration::days(i as i64), *v))
        .collect();
    let mut calc = ThresholdCalculator::new(key, TypeConfig::default());
    calc.load_history(&readings, None);
    calc
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// low <= medium <= high on both axes, whatever the method
    #[test]
    fn thresholds_are_monotonic(
        values in arb_series(10, 60),
        method in arb_method(),
        percentile in 1.0f64..=100.0,
    ) {
        let mut calc = calculator(&values);
        let set = calc.get_thresholds(method, percentile, false).unwrap();
        prop_assert!(set.is_monotonic(), "{set:?}");
    }

    /// Fewer readings than the minimum always yields the fallback set
    #[test]
    fn short_history_yields_fallback(
        values in arb_series(0, 9),
        method in prop_oneof![Just(CalculationMethod::StdDev), Just(CalculationMethod::Percentile)],
    ) {
        let mut calc = calculator(&values);
        let set = calc.get_thresholds(method, 95.0, false).unwrap();
        prop_assert_eq!(set, ThresholdSet::fallback());
    }

    /// +Δ and -Δ get the same verdict
    #[test]
    fn scoring_is_symmetric(
        delta in 0.0f64..5_000.0,
        pct in 0.0f64..500.0,
        set in arb_thresholds(),
    ) {
        let up = classify_change(delta, Some(pct), &set);
        let down = classify_change(-delta, Some(-pct), &set);
        prop_assert_eq!(up, down);
    }

    /// Confidence stays in [0, 0.95] and is zero exactly when nothing is flagged
    #[test]
    fn confidence_is_bounded(
        delta in -1.0e7f64..1.0e7,
        pct in prop::option::of(-1.0e4f64..1.0e4),
        set in arb_thresholds(),
    ) {
        let verdict = classify_change(delta, pct, &set);
        prop_assert!(verdict.confidence >= 0.0);
        prop_assert!(verdict.confidence <= MAX_CONFIDENCE);
        if !verdict.is_anomaly {
            prop_assert_eq!(verdict.confidence, 0.0);
            prop_assert!(verdict.threshold_used.is_none());
        }
    }

    /// A flagged change always exceeds the threshold it reports
    #[test]
    fn flagged_change_exceeds_reported_threshold(
        delta in -1.0e5f64..1.0e5,
        pct in -1.0e3f64..1.0e3,
        set in arb_thresholds(),
    ) {
        let verdict = classify_change(delta, Some(pct), &set);
        if let Some(threshold) = verdict.threshold_used {
            let magnitude = match verdict.kind {
                meterwatch_core::AnomalyKind::AbsoluteChange => delta.abs(),
                _ => pct.abs(),
            };
            prop_assert!(magnitude > threshold);
        }
    }
}
