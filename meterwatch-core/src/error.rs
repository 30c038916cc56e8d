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

//! Engine error types

use thiserror::Error;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by the anomaly engine.
///
/// Missing history and unreadable configuration are not errors: they resolve
/// to documented defaults. What remains is either a caller mistake (bad method
/// name, bad percentile) or a series that cannot be processed.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Threshold method name not recognised
    #[error("Unknown threshold method: {0}")]
    UnknownMethod(String),

    /// Percentile outside (0, 100]
    #[error("Invalid percentile: {0} (expected a value in (0, 100])")]
    InvalidPercentile(f64),

    /// Detection option out of range
    #[error("Invalid option {name}: {reason}")]
    InvalidOption { name: &'static str, reason: String },

    /// A reading series that cannot be classified
    #[error("Malformed series for {asset_id}/{consumption_type}: {reason}")]
    MalformedSeries {
        asset_id: String,
        consumption_type: String,
        reason: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(e: toml::de::Error) -> Self {
        EngineError::Config(e.to_string())
    }
}
