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

//! Batch detection over many series
//!
//! Groups are independent, so they can be handed to a small pool of scoped
//! worker threads. Workers claim group indices from a shared cursor and push
//! their outcome into a mutex-guarded collector; the collector is sorted by
//! group index afterwards so the report never depends on scheduling.

use crate::detector::{ContextualAnomalyDetector, GroupDetection};
use meterwatch_core::{
    AnnotatedReading, AnomalyConfig, CalculationMethod, EngineError, GroupKey, Reading,
    ThresholdMethod, ThresholdSet,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

/// Per-group summary
#[derive(Debug, Clone, Serialize)]
pub struct GroupSummary {
    pub key: GroupKey,
    pub records: usize,
    pub anomalies: usize,
    pub threshold_method: ThresholdMethod,
    pub thresholds: ThresholdSet,
}

/// A group that could not be processed
#[derive(Debug, Clone, Serialize)]
pub struct GroupFailure {
    pub key: GroupKey,
    pub error: String,
}

/// Result of a batch run
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    /// Annotated readings, by group key then ascending timestamp
    pub records: Vec<AnnotatedReading>,
    pub processed: Vec<GroupSummary>,
    pub failed: Vec<GroupFailure>,
    /// Groups never started because the batch was cancelled
    pub cancelled: Vec<GroupKey>,
}

impl BatchReport {
    pub fn anomaly_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_anomaly()).count()
    }

    /// Every group was processed without error
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.cancelled.is_empty()
    }

    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string(self)?)
    }
}

enum GroupOutcome {
    Detected(GroupDetection),
    Failed {
        key: GroupKey,
        series: Vec<Reading>,
        error: EngineError,
    },
    Cancelled(GroupKey),
}

/// Runs a detector over a grouped reading set
pub struct BatchRunner<'a> {
    detector: &'a ContextualAnomalyDetector,
    config: &'a AnomalyConfig,
    method: CalculationMethod,
    workers: usize,
}

impl<'a> BatchRunner<'a> {
    pub fn new(
        detector: &'a ContextualAnomalyDetector,
        config: &'a AnomalyConfig,
        method: CalculationMethod,
    ) -> Self {
        Self {
            detector,
            config,
            method,
            workers: detector.options().workers,
        }
    }

    /// `0` means one worker per available core
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    fn effective_workers(&self, groups: usize) -> usize {
        let requested = if self.workers == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            self.workers
        };
        requested.min(groups).max(1)
    }

    pub fn run(&self, groups: BTreeMap<GroupKey, Vec<Reading>>) -> BatchReport {
        self.run_with_cancel(groups, &CancellationToken::new())
    }

    /// Process every group, checking `token` before each one.
    pub fn run_with_cancel(
        &self,
        groups: BTreeMap<GroupKey, Vec<Reading>>,
        token: &CancellationToken,
    ) -> BatchReport {
        let groups: Vec<(GroupKey, Vec<Reading>)> = groups.into_iter().collect();
        let workers = self.effective_workers(groups.len());

        tracing::info!(
            groups = groups.len(),
            workers,
            method = ?self.method,
            "Starting batch detection"
        );

        let cursor = AtomicUsize::new(0);
        let collected: Mutex<Vec<(usize, GroupOutcome)>> =
            Mutex::new(Vec::with_capacity(groups.len()));

        let work = || loop {
            let idx = cursor.fetch_add(1, Ordering::Relaxed);
            let Some((key, series)) = groups.get(idx) else {
                break;
            };
            let outcome = if token.is_cancelled() {
                GroupOutcome::Cancelled(key.clone())
            } else {
                self.process_group(key, series)
            };
            collected.lock().push((idx, outcome));
        };

        if workers == 1 {
            work();
        } else {
            std::thread::scope(|scope| {
                for _ in 0..workers {
                    scope.spawn(work);
                }
            });
        }

        let mut outcomes = collected.into_inner();
        outcomes.sort_by_key(|(idx, _)| *idx);

        let mut report = BatchReport::default();
        for (_, outcome) in outcomes {
            match outcome {
                GroupOutcome::Detected(detection) => {
                    report.processed.push(GroupSummary {
                        key: detection.key.clone(),
                        records: detection.annotated.len(),
                        anomalies: detection.anomaly_count(),
                        threshold_method: detection.thresholds.method,
                        thresholds: detection.thresholds,
                    });
                    report.records.extend(detection.annotated);
                }
                GroupOutcome::Failed { key, series, error } => {
                    report
                        .records
                        .extend(series.into_iter().map(AnnotatedReading::unclassified));
                    report.failed.push(GroupFailure {
                        key,
                        error: error.to_string(),
                    });
                }
                GroupOutcome::Cancelled(key) => report.cancelled.push(key),
            }
        }

        tracing::info!(
            processed = report.processed.len(),
            failed = report.failed.len(),
            cancelled = report.cancelled.len(),
            anomalies = report.anomaly_count(),
            "Batch detection finished"
        );

        report
    }

    fn process_group(&self, key: &GroupKey, series: &[Reading]) -> GroupOutcome {
        match self
            .detector
            .detect_group(key, series, self.method, self.config)
        {
            Ok(detection) => {
                tracing::info!(
                    key = %key,
                    records = detection.annotated.len(),
                    anomalies = detection.anomaly_count(),
                    method = %detection.thresholds.method,
                    "Processed group"
                );
                GroupOutcome::Detected(detection)
            }
            Err(error) => {
                tracing::error!(key = %key, error = %error, "Group detection failed");
                GroupOutcome::Failed {
                    key: key.clone(),
                    series: series.to_vec(),
                    error,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use meterwatch_core::{group_readings, DetectionOptions};

    fn readings(asset: &str, values: &[f64]) -> Vec<Reading> {
        let start = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, v)| Reading::new(asset, "GAS", start + Duration::days(i as i64), *v))
            .collect()
    }

    fn sample() -> Vec<Reading> {
        let mut all = Vec::new();
        for asset in ["B", "A", "D", "C"] {
            all.extend(readings(asset, &[10.0, 12.0, 15.0, 17.0, 30.0]));
        }
        all
    }

    #[test]
    fn test_groups_come_back_in_key_order() {
        let detector = ContextualAnomalyDetector::new(DetectionOptions::default());
        let config = AnomalyConfig::builtin();
        let report = BatchRunner::new(&detector, &config, CalculationMethod::StdDev)
            .run(group_readings(&sample()));

        let order: Vec<&str> = report
            .processed
            .iter()
            .map(|s| s.key.asset_id.as_str())
            .collect();
        assert_eq!(order, vec!["A", "B", "C", "D"]);
        assert_eq!(report.records.len(), 20);
        assert!(report.is_complete());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let detector = ContextualAnomalyDetector::new(DetectionOptions::default());
        let config = AnomalyConfig::builtin();
        let runner = BatchRunner::new(&detector, &config, CalculationMethod::StdDev);

        let sequential = runner.run(group_readings(&sample())).to_json().unwrap();
        let parallel = BatchRunner::new(&detector, &config, CalculationMethod::StdDev)
            .with_workers(3)
            .run(group_readings(&sample()))
            .to_json()
            .unwrap();
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_failed_group_passes_readings_through() {
        let mut all = readings("A", &[1.0, 2.0, 3.0]);
        all.extend(readings("B", &[1.0, f64::INFINITY, 3.0]));

        let detector = ContextualAnomalyDetector::new(DetectionOptions::default());
        let config = AnomalyConfig::builtin();
        let report = BatchRunner::new(&detector, &config, CalculationMethod::StdDev)
            .run(group_readings(&all));

        assert_eq!(report.processed.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].key.asset_id, "B");
        assert_eq!(report.records.len(), 6);
        assert!(report.records[3..].iter().all(|r| !r.is_anomaly()));
    }

    #[test]
    fn test_cancelled_token_skips_groups() {
        let detector = ContextualAnomalyDetector::new(DetectionOptions::default());
        let config = AnomalyConfig::builtin();
        let token = CancellationToken::new();
        token.cancel();

        let report = BatchRunner::new(&detector, &config, CalculationMethod::StdDev)
            .run_with_cancel(group_readings(&sample()), &token);

        assert!(report.processed.is_empty());
        assert_eq!(report.cancelled.len(), 4);
        assert!(report.records.is_empty());
    }
}
