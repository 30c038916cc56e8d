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

//! Meter readings and the day-to-day changes derived from them.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One cumulative meter sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub asset_id: String,
    pub consumption_type: String,
    pub timestamp: NaiveDate,
    pub cumulative_value: f64,
}

impl Reading {
    pub fn new(
        asset_id: impl Into<String>,
        consumption_type: impl Into<String>,
        timestamp: NaiveDate,
        cumulative_value: f64,
    ) -> Self {
        Self {
            asset_id: asset_id.into(),
            consumption_type: consumption_type.into(),
            timestamp,
            cumulative_value,
        }
    }

    /// Key of the series this reading belongs to
    pub fn key(&self) -> GroupKey {
        GroupKey::new(&self.asset_id, &self.consumption_type)
    }

    pub fn belongs_to(&self, key: &GroupKey) -> bool {
        self.asset_id == key.asset_id && self.consumption_type == key.consumption_type
    }
}

/// Tabular row as handed over by the data-loading side.
///
/// `corrected_value`, when present, wins over the raw consumption column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingRow {
    pub date: NaiveDate,
    #[serde(alias = "value")]
    pub consumption: f64,
    pub asset_id: String,
    pub consumption_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrected_value: Option<f64>,
}

impl From<ReadingRow> for Reading {
    fn from(row: ReadingRow) -> Self {
        Reading {
            cumulative_value: row.corrected_value.unwrap_or(row.consumption),
            asset_id: row.asset_id,
            consumption_type: row.consumption_type,
            timestamp: row.date,
        }
    }
}

/// Identity of one series: an asset measured for one consumption type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupKey {
    pub asset_id: String,
    pub consumption_type: String,
}

impl GroupKey {
    pub fn new(asset_id: impl Into<String>, consumption_type: impl Into<String>) -> Self {
        Self {
            asset_id: asset_id.into(),
            consumption_type: consumption_type.into(),
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.asset_id, self.consumption_type)
    }
}

/// Change between a reading and its predecessor in the same series.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyChange {
    pub reading: Reading,
    pub previous_value: Option<f64>,
    pub delta: Option<f64>,
    /// Undefined for the first sample and when the previous value is zero
    pub delta_pct: Option<f64>,
}

/// Compute day-to-day changes for a series already sorted by timestamp.
pub fn daily_changes(series: &[Reading]) -> Vec<DailyChange> {
    let mut changes = Vec::with_capacity(series.len());
    let mut previous: Option<f64> = None;

    for reading in series {
        let value = reading.cumulative_value;
        let (delta, delta_pct) = match previous {
            Some(prev) => {
                let delta = value - prev;
                let pct = if prev != 0.0 {
                    Some(delta / prev * 100.0)
                } else {
                    None
                };
                (Some(delta), pct)
            }
            None => (None, None),
        };

        changes.push(DailyChange {
            reading: reading.clone(),
            previous_value: previous,
            delta,
            delta_pct,
        });
        previous = Some(value);
    }

    changes
}

/// Sort a series by timestamp. Equal dates keep their input order.
pub fn sort_series(series: &mut [Reading]) {
    series.sort_by_key(|r| r.timestamp);
}

/// Split a mixed reading set into per-key series, each sorted by timestamp.
///
/// Iteration order of the returned map is the key order, which keeps batch
/// output deterministic.
pub fn group_readings<'a, I>(readings: I) -> BTreeMap<GroupKey, Vec<Reading>>
where
    I: IntoIterator<Item = &'a Reading>,
{
    let mut groups: BTreeMap<GroupKey, Vec<Reading>> = BTreeMap::new();
    for reading in readings {
        groups
            .entry(reading.key())
            .or_default()
            .push(reading.clone());
    }
    for series in groups.values_mut() {
        sort_series(series);
    }
    groups
}
