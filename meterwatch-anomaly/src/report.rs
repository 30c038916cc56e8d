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

//! Per-asset reports and the success envelope returned by façade calls.

use crate::batch::GroupFailure;
use chrono::NaiveDate;
use meterwatch_core::{AnnotatedReading, AnomalyKind, ThresholdMethod, ThresholdSet};
use serde::Serialize;

/// Confidence at or above which an anomaly counts as high
pub const HIGH_CONFIDENCE: f64 = 0.7;

/// Confidence at or above which an anomaly counts as medium
pub const MEDIUM_CONFIDENCE: f64 = 0.4;

/// Number of anomalies listed in a report
pub const TOP_ANOMALIES: usize = 5;

/// `{success, message?}` plus the payload fields on success
#[derive(Debug, Clone, Serialize)]
pub struct Outcome<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub data: Option<T>,
}

impl<T> Outcome<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data: None,
        }
    }

    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfidenceBuckets {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindBuckets {
    pub absolute_change: usize,
    pub percentage_change: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopAnomaly {
    pub date: NaiveDate,
    pub consumption: f64,
    pub previous_consumption: Option<f64>,
    pub daily_change: Option<f64>,
    pub daily_change_pct: Option<f64>,
    pub confidence: f64,
    #[serde(rename = "type")]
    pub kind: AnomalyKind,
    pub threshold: Option<f64>,
}

impl From<&AnnotatedReading> for TopAnomaly {
    fn from(a: &AnnotatedReading) -> Self {
        Self {
            date: a.reading.timestamp,
            consumption: a.reading.cumulative_value,
            previous_consumption: a.previous_value,
            daily_change: a.delta,
            daily_change_pct: a.delta_pct,
            confidence: a.verdict.confidence,
            kind: a.verdict.kind,
            threshold: a.verdict.threshold_used,
        }
    }
}

/// Candidates classified against a historical baseline
#[derive(Debug, Clone, Default, Serialize)]
pub struct BaselineReport {
    /// Candidate readings only, by group key then timestamp
    pub records: Vec<AnnotatedReading>,
    /// Candidate groups that could not be classified
    pub failed: Vec<GroupFailure>,
}

impl BaselineReport {
    pub fn anomaly_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_anomaly()).count()
    }
}

/// Summary of one asset's series
#[derive(Debug, Clone, Serialize)]
pub struct AssetReport {
    pub asset_id: String,
    pub consumption_type: String,
    pub total_records: usize,
    pub anomaly_records: usize,
    pub anomaly_pct: f64,
    pub confidence_buckets: ConfidenceBuckets,
    pub kind_buckets: KindBuckets,
    pub top_anomalies: Vec<TopAnomaly>,
    pub thresholds_used: ThresholdSet,
    pub threshold_method: ThresholdMethod,
    pub percentile: f64,
}

impl AssetReport {
    pub fn build(
        asset_id: &str,
        consumption_type: &str,
        annotated: &[AnnotatedReading],
        thresholds: ThresholdSet,
        percentile: f64,
    ) -> Self {
        let mut confidence_buckets = ConfidenceBuckets::default();
        let mut kind_buckets = KindBuckets::default();
        let mut anomalies: Vec<&AnnotatedReading> = Vec::new();

        for record in annotated.iter().filter(|r| r.is_anomaly()) {
            let confidence = record.verdict.confidence;
            if confidence >= HIGH_CONFIDENCE {
                confidence_buckets.high += 1;
            } else if confidence >= MEDIUM_CONFIDENCE {
                confidence_buckets.medium += 1;
            } else if confidence > 0.0 {
                confidence_buckets.low += 1;
            }

            match record.verdict.kind {
                AnomalyKind::AbsoluteChange => kind_buckets.absolute_change += 1,
                AnomalyKind::PercentageChange => kind_buckets.percentage_change += 1,
                AnomalyKind::None => {}
            }
            anomalies.push(record);
        }

        let anomaly_records = anomalies.len();
        let anomaly_pct = if annotated.is_empty() {
            0.0
        } else {
            anomaly_records as f64 / annotated.len() as f64 * 100.0
        };

        // stable sort: equal confidences keep date order
        anomalies.sort_by(|a, b| b.verdict.confidence.total_cmp(&a.verdict.confidence));
        let top_anomalies = anomalies
            .into_iter()
            .take(TOP_ANOMALIES)
            .map(TopAnomaly::from)
            .collect();

        Self {
            asset_id: asset_id.to_string(),
            consumption_type: consumption_type.to_string(),
            total_records: annotated.len(),
            anomaly_records,
            anomaly_pct,
            confidence_buckets,
            kind_buckets,
            top_anomalies,
            threshold_method: thresholds.method,
            thresholds_used: thresholds,
            percentile,
        }
    }
}
