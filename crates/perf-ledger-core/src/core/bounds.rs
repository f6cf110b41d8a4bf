// crates/perf-ledger-core/src/core/bounds.rs
// ============================================================================
// Module: Perf Ledger Metric Bounds
// Description: Acceptable metric ceilings per data rate and plugin.
// Purpose: Validate summarized results against an injected bounds table.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! The bounds table maps data rate -> plugin -> metric -> expected value. A
//! measured value passes when it lies in `[0, expected * (1 + error_bound)]`.
//! The table is configuration data loaded at startup; the transmitter never
//! consults it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::record::MetricResults;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default tolerated overshoot above the expected value (30%).
pub const DEFAULT_ERROR_BOUND: f64 = 0.3;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Reasons a metric fails bounds validation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BoundsViolation {
    /// No bounds exist for the data rate.
    #[error("no metric bounds for data rate {rate}")]
    UnknownRate {
        /// Data rate label.
        rate: String,
    },
    /// No bounds exist for the plugin at this data rate.
    #[error("plugin {plugin} has no bounds at data rate {rate}")]
    UnknownPlugin {
        /// Data rate label.
        rate: String,
        /// Plugin name.
        plugin: String,
    },
    /// No bound exists for the metric.
    #[error("metric {metric} has no bound for plugin {plugin}")]
    UnknownMetric {
        /// Plugin name.
        plugin: String,
        /// Metric name.
        metric: String,
    },
    /// Measured value fell outside the accepted range.
    #[error("metric {metric} with value {value} is outside [0, {limit}]")]
    OutOfRange {
        /// Metric name.
        metric: String,
        /// Measured value.
        value: f64,
        /// Upper limit including the error bound.
        limit: f64,
    },
}

// ============================================================================
// SECTION: Bounds Table
// ============================================================================

/// Expected metric values keyed by data rate, plugin, and metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricBoundsTable {
    /// Fractional overshoot tolerated above each expected value.
    pub error_bound: f64,
    /// Expected values: rate -> plugin -> metric -> value.
    pub rates: BTreeMap<String, BTreeMap<String, BTreeMap<String, f64>>>,
}

impl Default for MetricBoundsTable {
    fn default() -> Self {
        Self {
            error_bound: DEFAULT_ERROR_BOUND,
            rates: BTreeMap::new(),
        }
    }
}

impl MetricBoundsTable {
    /// Returns the accepted upper limit for a metric.
    ///
    /// # Errors
    ///
    /// Returns [`BoundsViolation`] when the rate, plugin, or metric is unknown.
    pub fn upper_limit(&self, rate: &str, plugin: &str, metric: &str) -> Result<f64, BoundsViolation> {
        let plugins = self.rates.get(rate).ok_or_else(|| BoundsViolation::UnknownRate {
            rate: rate.to_string(),
        })?;
        let metrics = plugins.get(plugin).ok_or_else(|| BoundsViolation::UnknownPlugin {
            rate: rate.to_string(),
            plugin: plugin.to_string(),
        })?;
        let expected = metrics.get(metric).ok_or_else(|| BoundsViolation::UnknownMetric {
            plugin: plugin.to_string(),
            metric: metric.to_string(),
        })?;
        Ok(expected * (1.0 + self.error_bound))
    }

    /// Checks a single measured value.
    ///
    /// # Errors
    ///
    /// Returns [`BoundsViolation`] when no bound exists or the value is out of range.
    pub fn check(
        &self,
        rate: &str,
        plugin: &str,
        metric: &str,
        value: f64,
    ) -> Result<(), BoundsViolation> {
        let limit = self.upper_limit(rate, plugin, metric)?;
        if value < 0.0 || value > limit || value.is_nan() {
            return Err(BoundsViolation::OutOfRange {
                metric: metric.to_string(),
                value,
                limit,
            });
        }
        Ok(())
    }

    /// Checks the maximum of every metric in a results map.
    ///
    /// Returns every violation found; an empty vector means the results pass.
    #[must_use]
    pub fn validate_results(
        &self,
        rate: &str,
        plugin: &str,
        results: &MetricResults,
    ) -> Vec<BoundsViolation> {
        results
            .iter()
            .filter_map(|(metric, stats)| self.check(rate, plugin, metric, stats.max).err())
            .collect()
    }
}
