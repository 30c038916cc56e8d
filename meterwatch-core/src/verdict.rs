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

//! Per-reading anomaly verdicts and the annotated output row.

use crate::reading::Reading;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Upper bound for any confidence score
pub const MAX_CONFIDENCE: f64 = 0.95;

/// Which signal flagged a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    AbsoluteChange,
    PercentageChange,
    #[default]
    None,
}

impl AnomalyKind {
    /// Output label; `None` for unflagged readings
    pub fn label(&self) -> Option<&'static str> {
        match self {
            AnomalyKind::AbsoluteChange => Some("absolute_change"),
            AnomalyKind::PercentageChange => Some("percentage_change"),
            AnomalyKind::None => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AnomalyVerdict {
    pub is_anomaly: bool,
    /// In [0, 0.95]; a triage score, not a probability
    pub confidence: f64,
    pub kind: AnomalyKind,
    pub threshold_used: Option<f64>,
}

impl AnomalyVerdict {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn flagged(confidence: f64, kind: AnomalyKind, threshold: f64) -> Self {
        Self {
            is_anomaly: true,
            confidence: confidence.clamp(0.0, MAX_CONFIDENCE),
            kind,
            threshold_used: Some(threshold),
        }
    }
}

/// A reading with its change against the previous sample and its verdict.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(into = "AnnotatedRow")]
pub struct AnnotatedReading {
    pub reading: Reading,
    pub previous_value: Option<f64>,
    pub delta: Option<f64>,
    pub delta_pct: Option<f64>,
    pub verdict: AnomalyVerdict,
}

impl AnnotatedReading {
    /// Reading passed through without classification
    pub fn unclassified(reading: Reading) -> Self {
        Self {
            reading,
            previous_value: None,
            delta: None,
            delta_pct: None,
            verdict: AnomalyVerdict::none(),
        }
    }

    pub fn is_anomaly(&self) -> bool {
        self.verdict.is_anomaly
    }
}

/// Flat output row consumed by the reporting and export side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedRow {
    pub date: NaiveDate,
    pub asset_id: String,
    pub consumption_type: String,
    pub consumption: f64,
    pub daily_change: Option<f64>,
    pub daily_change_pct: Option<f64>,
    pub is_contextual_anomaly: bool,
    pub contextual_anomaly_confidence: f64,
    pub contextual_anomaly_type: Option<String>,
    pub contextual_anomaly_threshold: Option<f64>,
}

impl From<AnnotatedReading> for AnnotatedRow {
    fn from(a: AnnotatedReading) -> Self {
        AnnotatedRow {
            date: a.reading.timestamp,
            asset_id: a.reading.asset_id,
            consumption_type: a.reading.consumption_type,
            consumption: a.reading.cumulative_value,
            daily_change: a.delta,
            daily_change_pct: a.delta_pct,
            is_contextual_anomaly: a.verdict.is_anomaly,
            contextual_anomaly_confidence: a.verdict.confidence,
            contextual_anomaly_type: a.verdict.kind.label().map(str::to_string),
            contextual_anomaly_threshold: a.verdict.threshold_used,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flagged_clamps_confidence() {
        let v = AnomalyVerdict::flagged(1.7, AnomalyKind::AbsoluteChange, 10.0);
        assert_eq!(v.confidence, MAX_CONFIDENCE);
        assert!(v.is_anomaly);
    }

    #[test]
    fn test_output_row_fields() {
        let reading = Reading::new(
            "A1",
            "WATER",
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            1126.0,
        );
        let annotated = AnnotatedReading {
            reading,
            previous_value: Some(1108.0),
            delta: Some(18.0),
            delta_pct: Some(1.62),
            verdict: AnomalyVerdict::flagged(0.42, AnomalyKind::PercentageChange, 1.5),
        };

        let value = serde_json::to_value(&annotated).unwrap();
        assert_eq!(value["is_contextual_anomaly"], true);
        assert_eq!(value["contextual_anomaly_type"], "percentage_change");
        assert_eq!(value["contextual_anomaly_threshold"], 1.5);
        assert_eq!(value["date"], "2025-03-01");

        let plain = AnnotatedReading::unclassified(annotated.reading.clone());
        let value = serde_json::to_value(&plain).unwrap();
        assert_eq!(value["is_contextual_anomaly"], false);
        assert!(value["contextual_anomaly_type"].is_null());
        assert!(value["contextual_anomaly_threshold"].is_null());
    }
}
