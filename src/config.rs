//! Analysis options and anomaly thresholds.
//!
//! Every tunable is carried on the options record passed to `analyze`;
//! there is no global state.

use serde::{Deserialize, Serialize};

/// Thresholds driving the anomaly detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyThresholds {
    /// Fraction of formula peers (row and column) above which a literal cell
    /// is flagged as a hard-coded overwrite.
    #[serde(default = "default_overwrite_ratio")]
    pub hard_coded_overwrite_ratio: f64,

    /// Neighborhood half-width (rows/columns) for the overwrite check.
    #[serde(default = "default_overwrite_window")]
    pub hard_coded_overwrite_window: u32,

    /// Operator count above which a formula is flagged as high-complexity.
    #[serde(default = "default_complexity_threshold")]
    pub high_complexity_operators: u32,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self {
            hard_coded_overwrite_ratio: default_overwrite_ratio(),
            hard_coded_overwrite_window: default_overwrite_window(),
            high_complexity_operators: default_complexity_threshold(),
        }
    }
}

/// Options recognized by the analysis orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisOptions {
    /// Caller-assigned job identity carried into the result document.
    #[serde(default)]
    pub job_id: String,

    /// When false, `raw_value` is stripped from output nodes (still used
    /// internally for error detection and dynamic resolution).
    #[serde(default)]
    pub include_values: bool,

    /// Run the anomaly detector.
    #[serde(default = "default_true")]
    pub detect_anomalies: bool,

    /// Run the cost-driver analyzer.
    #[serde(default = "default_true")]
    pub identify_cost_drivers: bool,

    /// Number of top cost drivers to report; clamped to `[1, 500]`.
    #[serde(default = "default_top_drivers")]
    pub top_drivers_count: usize,

    /// Fold constant string concatenation inside `INDIRECT` arguments.
    #[serde(default)]
    pub fold_string_concat: bool,

    /// Ranges larger than this expand to a single summarized edge instead of
    /// one edge per member cell.
    #[serde(default = "default_fanout_cap")]
    pub range_fanout_cap: u64,

    /// Maximum nesting depth when chasing named-range definitions.
    #[serde(default = "default_named_depth")]
    pub named_range_depth: u32,

    /// Seed for sampled centrality and reachability on large graphs.
    #[serde(default = "default_sampling_seed")]
    pub sampling_seed: u64,

    #[serde(default)]
    pub thresholds: AnomalyThresholds,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            job_id: String::new(),
            include_values: false,
            detect_anomalies: true,
            identify_cost_drivers: true,
            top_drivers_count: default_top_drivers(),
            fold_string_concat: false,
            range_fanout_cap: default_fanout_cap(),
            named_range_depth: default_named_depth(),
            sampling_seed: default_sampling_seed(),
            thresholds: AnomalyThresholds::default(),
        }
    }
}

impl AnalysisOptions {
    /// Validate option values, returning a human-readable message on failure.
    pub fn validate(&self) -> Result<(), String> {
        let ratio = self.thresholds.hard_coded_overwrite_ratio;
        if !(0.0..=1.0).contains(&ratio) {
            return Err(format!(
                "hard_coded_overwrite_ratio must be within [0.0, 1.0], got {ratio}"
            ));
        }
        if self.range_fanout_cap == 0 {
            return Err("range_fanout_cap must be at least 1".to_string());
        }
        if self.named_range_depth == 0 {
            return Err("named_range_depth must be at least 1".to_string());
        }
        Ok(())
    }

    /// `top_drivers_count` clamped to the supported `[1, 500]` window.
    pub fn effective_top_drivers(&self) -> usize {
        self.top_drivers_count.clamp(1, 500)
    }
}

fn default_true() -> bool {
    true
}

fn default_top_drivers() -> usize {
    50
}

fn default_fanout_cap() -> u64 {
    4096
}

fn default_named_depth() -> u32 {
    32
}

fn default_sampling_seed() -> u64 {
    0x51C057
}

fn default_overwrite_ratio() -> f64 {
    0.6
}

fn default_overwrite_window() -> u32 {
    5
}

fn default_complexity_threshold() -> u32 {
    5
}
