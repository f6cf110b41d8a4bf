// crates/perf-ledger-core/src/core/statistics.rs
// ============================================================================
// Module: Perf Ledger Statistics
// Description: Summarization of raw metric samples into compact statistics.
// Purpose: Turn time-series samples into append-only record statistics.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! [`summarize`] reduces a sample sequence to average, min, max, p99,
//! population standard deviation, and the sampling period. It is pure and
//! order independent: the input is copied and sorted before any arithmetic,
//! so permuting the samples yields bit-identical output.
//!
//! The p99 index is `floor(n * 0.99) - 1` clamped to `[0, n - 1]`. For
//! `2 <= n <= 100` this selects the second-largest sample, not the maximum;
//! a single sample is its own p99.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::record::MetricResults;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default metric collection window in seconds (five minutes).
pub const DEFAULT_COLLECTION_WINDOW_SECS: u64 = 5 * 60;

// ============================================================================
// SECTION: Statistics
// ============================================================================

/// Derived statistics for one metric within one test setting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    /// Arithmetic mean of the samples.
    pub average: f64,
    /// 99th percentile sample.
    pub p99: f64,
    /// Largest sample.
    pub max: f64,
    /// Smallest sample.
    pub min: f64,
    /// Population standard deviation.
    pub std_dev: f64,
    /// Collection window divided by the sample count, in seconds.
    pub period_secs: u64,
}

/// Summarizes samples collected over `collection_window_secs`.
///
/// Empty input yields zero-valued statistics.
#[must_use]
pub fn summarize(samples: &[f64], collection_window_secs: u64) -> Statistics {
    let len = samples.len();
    if len == 0 {
        return Statistics::default();
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);

    #[allow(clippy::cast_precision_loss, reason = "Sample counts stay far below 2^52.")]
    let count = len as f64;
    let sum: f64 = sorted.iter().sum();
    let average = sum / count;
    let variance = sorted.iter().map(|value| (average - value).powi(2)).sum::<f64>() / count;

    let p99_index = (len.saturating_mul(99) / 100).saturating_sub(1).min(len - 1);
    let period_secs = u64::try_from(len).map_or(0, |n| collection_window_secs / n);

    Statistics {
        average,
        p99: sorted[p99_index],
        max: sorted[len - 1],
        min: sorted[0],
        std_dev: variance.sqrt(),
        period_secs,
    }
}

// ============================================================================
// SECTION: Summarizer
// ============================================================================

/// Configured summarizer for a test run.
///
/// # Invariants
/// - Holds no per-call state; safe to share across threads.
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticsSummarizer {
    /// Total collection window in seconds.
    collection_window_secs: u64,
    /// Per-metric multipliers applied before summarizing.
    metric_scale: BTreeMap<String, f64>,
}

impl Default for StatisticsSummarizer {
    fn default() -> Self {
        Self::new(DEFAULT_COLLECTION_WINDOW_SECS)
    }
}

impl StatisticsSummarizer {
    /// Creates a summarizer for the given collection window.
    #[must_use]
    pub const fn new(collection_window_secs: u64) -> Self {
        Self {
            collection_window_secs,
            metric_scale: BTreeMap::new(),
        }
    }

    /// Adds per-metric scale factors (e.g. bytes to megabytes).
    #[must_use]
    pub fn with_metric_scale(mut self, metric_scale: BTreeMap<String, f64>) -> Self {
        self.metric_scale = metric_scale;
        self
    }

    /// Returns the configured collection window in seconds.
    #[must_use]
    pub const fn collection_window_secs(&self) -> u64 {
        self.collection_window_secs
    }

    /// Summarizes one sample sequence.
    #[must_use]
    pub fn summarize(&self, samples: &[f64]) -> Statistics {
        summarize(samples, self.collection_window_secs)
    }

    /// Summarizes named sample series into a per-metric results map.
    ///
    /// Series whose name has a configured scale are multiplied first.
    #[must_use]
    pub fn summarize_series<I, S>(&self, series: I) -> MetricResults
    where
        I: IntoIterator<Item = (S, Vec<f64>)>,
        S: Into<String>,
    {
        series
            .into_iter()
            .map(|(name, samples)| {
                let name = name.into();
                let stats = match self.metric_scale.get(&name) {
                    Some(scale) => {
                        let scaled: Vec<f64> = samples.iter().map(|value| value * scale).collect();
                        self.summarize(&scaled)
                    }
                    None => self.summarize(&samples),
                };
                (name, stats)
            })
            .collect()
    }
}
