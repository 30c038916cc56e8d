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

//! Counter resets and sensor replacements
//!
//! A cumulative meter that suddenly reads far below its previous value was
//! either reset or physically replaced. Resets are undone by carrying the
//! lost offset forward; replacements are only marked.

use chrono::NaiveDate;
use meterwatch_core::{group_readings, GroupKey, Reading};
use serde::{Deserialize, Serialize};

/// What caused a drop in a cumulative series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetKind {
    CounterReset,
    SensorReplacement,
}

/// A detected drop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetEvent {
    pub key: GroupKey,
    pub date: NaiveDate,
    pub kind: ResetKind,
    pub previous_value: f64,
    pub current_value: f64,
    /// `previous_value - current_value`
    pub offset: f64,
    /// Kind assigned at detection, set once the event is reclassified
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_kind: Option<ResetKind>,
}

impl ResetEvent {
    /// Copy of this event with a new kind; the detected kind is remembered.
    pub fn reclassify(&self, kind: ResetKind) -> ResetEvent {
        let mut updated = self.clone();
        updated.original_kind.get_or_insert(self.kind);
        updated.kind = kind;
        tracing::info!(
            key = %self.key,
            date = %self.date,
            from = ?self.kind,
            to = ?kind,
            "Reclassified reset event"
        );
        updated
    }

    pub fn is_reclassified(&self) -> bool {
        self.original_kind.is_some()
    }
}

/// Detects counter resets within each series
#[derive(Debug, Clone)]
pub struct ResetDetector {
    /// A reading below `drop_ratio × previous` is a reset
    pub drop_ratio: f64,
    /// A reading below `replacement_ratio × previous` may be a new sensor
    pub replacement_ratio: f64,
    /// ... as long as the previous value exceeded this
    pub replacement_min_previous: f64,
    pub detect_sensor_replacements: bool,
}

impl Default for ResetDetector {
    fn default() -> Self {
        Self {
            drop_ratio: 0.8,
            replacement_ratio: 0.05,
            replacement_min_previous: 1000.0,
            detect_sensor_replacements: false,
        }
    }
}

impl ResetDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sensor_replacements(mut self) -> Self {
        self.detect_sensor_replacements = true;
        self
    }

    /// Scan every series in `readings`; events come out grouped by key, then
    /// by date.
    pub fn detect(&self, readings: &[Reading]) -> Vec<ResetEvent> {
        let mut events = Vec::new();

        for (key, series) in group_readings(readings) {
            for pair in series.windows(2) {
                let (previous, current) = (pair[0].cumulative_value, pair[1].cumulative_value);
                if current >= previous * self.drop_ratio {
                    continue;
                }

                let kind = if self.detect_sensor_replacements
                    && current < previous * self.replacement_ratio
                    && previous > self.replacement_min_previous
                {
                    ResetKind::SensorReplacement
                } else {
                    ResetKind::CounterReset
                };

                events.push(ResetEvent {
                    key: key.clone(),
                    date: pair[1].timestamp,
                    kind,
                    previous_value: previous,
                    current_value: current,
                    offset: previous - current,
                    original_kind: None,
                });
            }
        }

        if !events.is_empty() {
            tracing::info!(events = events.len(), "Detected counter drops");
        }
        events
    }
}

/// A reading after reset correction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrectedReading {
    pub reading: Reading,
    pub original_value: f64,
    pub is_corrected: bool,
    pub correction: Option<ResetKind>,
}

/// Apply reset events to a reading set.
///
/// For each counter reset, in date order, the gap between the corrected
/// previous value and the corrected value at the reset is added to the reset
/// reading and every later reading of the same series. Sensor replacements
/// carry no offset; the reading is only marked.
pub fn correct_counter_resets(readings: &[Reading], events: &[ResetEvent]) -> Vec<CorrectedReading> {
    let mut corrected = Vec::with_capacity(readings.len());

    for (key, series) in group_readings(readings) {
        let mut rows: Vec<CorrectedReading> = series
            .into_iter()
            .map(|reading| CorrectedReading {
                original_value: reading.cumulative_value,
                reading,
                is_corrected: false,
                correction: None,
            })
            .collect();

        let mut group_events: Vec<&ResetEvent> = events.iter().filter(|e| e.key == key).collect();
        group_events.sort_by_key(|e| e.date);

        // rows share dates when a day has several readings; match the
        // dropped value too and never step back past an earlier match
        let mut cursor = 0;
        for event in group_events {
            let matched = rows[cursor..]
                .iter()
                .position(|r| {
                    r.reading.timestamp == event.date && r.original_value == event.current_value
                })
                .or_else(|| rows[cursor..].iter().position(|r| r.reading.timestamp == event.date))
                .map(|offset| cursor + offset);
            let Some(idx) = matched else {
                tracing::warn!(
                    key = %key,
                    date = %event.date,
                    "No reading matches reset event"
                );
                continue;
            };

            cursor = idx;
            match event.kind {
                ResetKind::CounterReset => {
                    let previous = if idx > 0 {
                        rows[idx - 1].reading.cumulative_value
                    } else {
                        event.previous_value
                    };
                    let offset = previous - rows[idx].reading.cumulative_value;
                    for row in rows.iter_mut().skip(idx) {
                        row.reading.cumulative_value += offset;
                        row.is_corrected = true;
                        row.correction = Some(ResetKind::CounterReset);
                    }
                    tracing::debug!(key = %key, date = %event.date, offset, "Applied counter reset correction");
                }
                ResetKind::SensorReplacement => {
                    rows[idx].correction = Some(ResetKind::SensorReplacement);
                }
            }
        }

        corrected.extend(rows);
    }

    corrected
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn series(asset: &str, values: &[f64]) -> Vec<Reading> {
        let start = NaiveDate::from_ymd_opt(2025, 2, 1).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, v)| Reading::new(asset, "ENERGY", start + Duration::days(i as i64), *v))
            .collect()
    }

    #[test]
    fn test_detect_counter_reset() {
        let readings = series("M1", &[100.0, 120.0, 10.0, 30.0]);
        let events = ResetDetector::new().detect(&readings);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ResetKind::CounterReset);
        assert_eq!(events[0].offset, 110.0);
        assert_eq!(events[0].current_value, 10.0);
    }

    #[test]
    fn test_small_dip_is_ignored() {
        let readings = series("M1", &[100.0, 90.0, 95.0]);
        assert!(ResetDetector::new().detect(&readings).is_empty());
    }

    #[test]
    fn test_sensor_replacement_heuristic() {
        let readings = series("M1", &[5000.0, 5100.0, 20.0]);

        let plain = ResetDetector::new().detect(&readings);
        assert_eq!(plain[0].kind, ResetKind::CounterReset);

        let events = ResetDetector::new()
            .with_sensor_replacements()
            .detect(&readings);
        assert_eq!(events[0].kind, ResetKind::SensorReplacement);
    }

    #[test]
    fn test_reclassify_keeps_original_kind() {
        let readings = series("M1", &[100.0, 120.0, 10.0]);
        let event = ResetDetector::new().detect(&readings).remove(0);

        let updated = event.reclassify(ResetKind::SensorReplacement);
        assert_eq!(updated.kind, ResetKind::SensorReplacement);
        assert_eq!(updated.original_kind, Some(ResetKind::CounterReset));

        let back = updated.reclassify(ResetKind::CounterReset);
        assert_eq!(back.original_kind, Some(ResetKind::CounterReset));
        assert!(back.is_reclassified());
    }

    #[test]
    fn test_correction_restores_continuity() {
        let readings = series("M1", &[100.0, 120.0, 10.0, 30.0, 5.0, 15.0]);
        let events = ResetDetector::new().detect(&readings);
        assert_eq!(events.len(), 2);

        let corrected = correct_counter_resets(&readings, &events);
        let values: Vec<f64> = corrected.iter().map(|c| c.reading.cumulative_value).collect();
        assert_eq!(values, vec![100.0, 120.0, 120.0, 140.0, 140.0, 150.0]);
        assert!(!corrected[1].is_corrected);
        assert!(corrected[2].is_corrected);
        assert_eq!(corrected[5].original_value, 15.0);
    }

    #[test]
    fn test_replacement_is_marked_only() {
        let readings = series("M1", &[5000.0, 5100.0, 20.0, 40.0]);
        let events = ResetDetector::new()
            .with_sensor_replacements()
            .detect(&readings);
        let corrected = correct_counter_resets(&readings, &events);

        assert_eq!(corrected[2].reading.cumulative_value, 20.0);
        assert_eq!(corrected[2].correction, Some(ResetKind::SensorReplacement));
        assert!(!corrected[2].is_corrected);
    }

    #[test]
    fn test_same_day_readings_correct_the_dropped_one() {
        let day = NaiveDate::from_ymd_opt(2025, 2, 2).unwrap();
        let readings = vec![
            Reading::new("M1", "ENERGY", day.pred_opt().unwrap(), 90.0),
            Reading::new("M1", "ENERGY", day, 100.0),
            Reading::new("M1", "ENERGY", day, 10.0),
            Reading::new("M1", "ENERGY", day.succ_opt().unwrap(), 20.0),
        ];
        let events = ResetDetector::new().detect(&readings);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].current_value, 10.0);

        let corrected = correct_counter_resets(&readings, &events);
        let values: Vec<f64> = corrected.iter().map(|c| c.reading.cumulative_value).collect();
        assert_eq!(values, vec![90.0, 100.0, 100.0, 110.0]);
        assert!(!corrected[1].is_corrected);
        assert!(corrected[2].is_corrected);
        assert_eq!(corrected[2].original_value, 10.0);
    }

    #[test]
    fn test_events_only_touch_their_series() {
        let mut readings = series("M1", &[100.0, 120.0, 10.0]);
        readings.extend(series("M2", &[50.0, 60.0, 70.0]));
        let events = ResetDetector::new().detect(&readings);
        let corrected = correct_counter_resets(&readings, &events);

        let m2: Vec<f64> = corrected
            .iter()
            .filter(|c| c.reading.asset_id == "M2")
            .map(|c| c.reading.cumulative_value)
            .collect();
        assert_eq!(m2, vec![50.0, 60.0, 70.0]);
    }
}
