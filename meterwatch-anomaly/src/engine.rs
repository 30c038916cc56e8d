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

//! Anomaly engine
//!
//! Entry point used by dashboards and batch jobs. The engine owns validated
//! options and a configuration snapshot; every call works on the readings it
//! is given and keeps no other state.

use crate::batch::{BatchReport, BatchRunner, GroupFailure};
use crate::detector::{annotate_series, validate_series, ContextualAnomalyDetector};
use crate::report::{AssetReport, BaselineReport, Outcome};
use crate::resets::{correct_counter_resets, ResetDetector};
use meterwatch_core::{
    group_readings, sort_series, AnnotatedReading, AnomalyConfig, CalculationMethod,
    DetectionOptions, EngineResult, GroupKey, Reading, ThresholdSet,
};
use parking_lot::RwLock;
use std::borrow::Cow;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct AnomalyEngine {
    detector: ContextualAnomalyDetector,
    config: RwLock<Arc<AnomalyConfig>>,
}

impl AnomalyEngine {
    /// Build an engine; invalid options are rejected here.
    pub fn new(options: DetectionOptions, config: AnomalyConfig) -> EngineResult<Self> {
        options.validate()?;
        tracing::info!(
            method = %options.method,
            percentile = options.percentile,
            min_data_points = options.min_data_points,
            workers = options.workers,
            config_types = config.len(),
            "Anomaly engine initialized"
        );
        Ok(Self {
            detector: ContextualAnomalyDetector::new(options),
            config: RwLock::new(Arc::new(config)),
        })
    }

    /// Build an engine from a configuration file; a missing or malformed
    /// file yields the built-in configuration.
    pub fn from_config_path(options: DetectionOptions, path: impl AsRef<Path>) -> EngineResult<Self> {
        Self::new(options, AnomalyConfig::load(path))
    }

    pub fn options(&self) -> &DetectionOptions {
        self.detector.options()
    }

    /// Current configuration snapshot
    pub fn config(&self) -> Arc<AnomalyConfig> {
        self.config.read().clone()
    }

    /// Replace the configuration snapshot with the contents of `path`.
    ///
    /// On error the current snapshot stays in place.
    pub fn reload_config(&self, path: impl AsRef<Path>) -> EngineResult<()> {
        let path = path.as_ref();
        let config = match AnomalyConfig::try_load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Config reload failed, keeping current config");
                return Err(e);
            }
        };
        tracing::info!(path = %path.display(), types = config.len(), "Reloaded anomaly config");
        *self.config.write() = Arc::new(config);
        Ok(())
    }

    fn method(&self, use_config: bool) -> CalculationMethod {
        if use_config {
            CalculationMethod::Config
        } else {
            self.options().method
        }
    }

    /// Readings after optional counter-reset correction
    fn prepare<'r>(&self, readings: &'r [Reading]) -> Cow<'r, [Reading]> {
        if !self.options().correct_counter_resets {
            return Cow::Borrowed(readings);
        }
        let events = ResetDetector::new().detect(readings);
        if events.is_empty() {
            return Cow::Borrowed(readings);
        }
        Cow::Owned(
            correct_counter_resets(readings, &events)
                .into_iter()
                .map(|c| c.reading)
                .collect(),
        )
    }

    /// Detect anomalies across every (asset, consumption type) series.
    pub fn detect_anomalies(&self, readings: &[Reading], use_config: bool) -> BatchReport {
        self.detect_anomalies_with_cancel(readings, use_config, &CancellationToken::new())
    }

    /// Like [`detect_anomalies`](Self::detect_anomalies), stopping at the
    /// next group boundary once `token` is cancelled.
    pub fn detect_anomalies_with_cancel(
        &self,
        readings: &[Reading],
        use_config: bool,
        token: &CancellationToken,
    ) -> BatchReport {
        let readings = self.prepare(readings);
        let config = self.config();
        BatchRunner::new(&self.detector, &config, self.method(use_config))
            .run_with_cancel(group_readings(readings.iter()), token)
    }

    /// Detection summary for one asset.
    pub fn analyze_asset(
        &self,
        asset_id: &str,
        consumption_type: &str,
        readings: &[Reading],
    ) -> Outcome<AssetReport> {
        let key = GroupKey::new(asset_id, consumption_type);
        let readings = self.prepare(readings);
        let mut series: Vec<Reading> = readings
            .iter()
            .filter(|r| r.belongs_to(&key))
            .cloned()
            .collect();

        if series.is_empty() {
            tracing::warn!(key = %key, "No data found for asset");
            return Outcome::failure(format!("No data found for asset {asset_id}"));
        }
        sort_series(&mut series);

        let config = self.config();
        match self
            .detector
            .detect_group(&key, &series, self.options().method, &config)
        {
            Ok(detection) => Outcome::ok(AssetReport::build(
                asset_id,
                consumption_type,
                &detection.annotated,
                detection.thresholds,
                self.options().percentile,
            )),
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Asset analysis failed");
                Outcome::failure(e.to_string())
            }
        }
    }

    /// Thresholds the engine would use for one asset.
    pub fn get_thresholds(
        &self,
        asset_id: &str,
        consumption_type: &str,
        readings: &[Reading],
    ) -> EngineResult<ThresholdSet> {
        let key = GroupKey::new(asset_id, consumption_type);
        let readings = self.prepare(readings);
        let config = self.config();
        self.detector
            .thresholds_for(&key, &readings, self.options().method, &config)
    }

    /// Classify `candidates` against thresholds learned from `history` only.
    ///
    /// Each candidate's change is measured against the reading that precedes
    /// it in the merged history + candidate series. With reset correction on,
    /// the merged series is corrected before thresholds are learned, so a
    /// candidate after a reset lines up with the corrected history. Only
    /// candidates are returned, by group key then timestamp; a group that
    /// fails is listed in `failed` and the others still run.
    pub fn detect_against_baseline(
        &self,
        history: &[Reading],
        candidates: &[Reading],
        use_config: bool,
    ) -> Outcome<BaselineReport> {
        let mut history_groups = group_readings(history);
        let config = self.config();
        let method = self.method(use_config);

        let mut report = BaselineReport {
            records: Vec::with_capacity(candidates.len()),
            failed: Vec::new(),
        };
        for (key, group_candidates) in group_readings(candidates) {
            let baseline = history_groups.remove(&key).unwrap_or_default();
            match self.classify_candidates(&key, baseline, group_candidates, method, &config) {
                Ok(records) => report.records.extend(records),
                Err(e) => {
                    tracing::error!(key = %key, error = %e, "Baseline detection failed");
                    report.failed.push(GroupFailure {
                        key,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            candidates = report.records.len(),
            anomalies = report.anomaly_count(),
            failed = report.failed.len(),
            "Baseline detection finished"
        );
        Outcome::ok(report)
    }

    fn classify_candidates(
        &self,
        key: &GroupKey,
        baseline: Vec<Reading>,
        candidates: Vec<Reading>,
        method: CalculationMethod,
        config: &AnomalyConfig,
    ) -> EngineResult<Vec<AnnotatedReading>> {
        // history first so a candidate sharing a date sorts after it
        let mut merged: Vec<(Reading, bool)> = baseline
            .into_iter()
            .map(|r| (r, false))
            .chain(candidates.into_iter().map(|r| (r, true)))
            .collect();
        merged.sort_by_key(|(r, _)| r.timestamp);

        let (series, is_candidate): (Vec<Reading>, Vec<bool>) = merged.into_iter().unzip();
        validate_series(key, &series)?;
        let series = self.prepare(&series).into_owned();

        let baseline: Vec<Reading> = series
            .iter()
            .zip(&is_candidate)
            .filter(|(_, candidate)| !**candidate)
            .map(|(r, _)| r.clone())
            .collect();
        let thresholds = self.detector.thresholds_for(key, &baseline, method, config)?;

        Ok(annotate_series(&series, &thresholds)
            .into_iter()
            .zip(is_candidate)
            .filter_map(|(record, candidate)| candidate.then_some(record))
            .collect())
    }
}
