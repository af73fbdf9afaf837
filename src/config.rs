//! Engine configuration.
//!
//! Every field has a default, so an empty JSON object (or no file at all)
//! yields the stock engine.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::SimResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_components: usize,
    pub max_sketch_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_components: 1000,
            max_sketch_bytes: 1024 * 1024,
        }
    }
}

/// Heuristics used to pick one representative iteration out of a raw event
/// stream that has no loop markers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Fewest canonical events before fixed-period detection is attempted.
    pub min_events_for_period: usize,
    pub period_candidates: Vec<usize>,
    pub distinct_min: usize,
    pub distinct_max: usize,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            min_events_for_period: 12,
            period_candidates: vec![4, 6, 8, 10, 12],
            distinct_min: 4,
            distinct_max: 12,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradingConfig {
    pub delay_tolerance_ms: f64,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            delay_tolerance_ms: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub limits: LimitsConfig,
    pub normalizer: NormalizerConfig,
    pub grading: GradingConfig,
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            limits: LimitsConfig::default(),
            normalizer: NormalizerConfig::default(),
            grading: GradingConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> SimResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> SimResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }
}
