// crates/perf-ledger-core/tests/statistics.rs
// ============================================================================
// Module: Statistics Summarizer Tests
// Description: Unit and property tests for sample summarization.
// Purpose: Validate mean, percentile, ordering, and period invariants.
// ============================================================================

//! Statistics summarizer tests.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    clippy::float_cmp,
    clippy::cast_precision_loss,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::BTreeMap;

use perf_ledger_core::DEFAULT_COLLECTION_WINDOW_SECS;
use perf_ledger_core::Statistics;
use perf_ledger_core::StatisticsSummarizer;
use perf_ledger_core::summarize;
use proptest::prelude::*;

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-6 * a.abs().max(b.abs()).max(1.0)
}

#[test]
fn empty_samples_yield_zero_statistics() {
    let stats = summarize(&[], DEFAULT_COLLECTION_WINDOW_SECS);
    assert_eq!(stats, Statistics::default());
    assert_eq!(stats.period_secs, 0);
}

#[test]
fn summarize_does_not_mutate_input() {
    let samples = vec![5.0, 1.0, 3.0];
    let _ = summarize(&samples, 300);
    assert_eq!(samples, vec![5.0, 1.0, 3.0]);
}

#[test]
fn p99_is_second_largest_for_short_series() {
    let samples: Vec<f64> = (1 ..= 50).map(f64::from).collect();
    let stats = summarize(&samples, 300);
    // floor(50 * 0.99) - 1 = 48
    assert_eq!(stats.p99, 49.0);
    assert_eq!(stats.max, 50.0);
    assert_eq!(stats.min, 1.0);
}

#[test]
fn p99_uses_floor_index_for_long_series() {
    let samples: Vec<f64> = (1 ..= 200).map(f64::from).collect();
    let stats = summarize(&samples, 300);
    // floor(200 * 0.99) - 1 = 197
    assert_eq!(stats.p99, 198.0);
}

#[test]
fn p99_index_at_hundred_samples() {
    let samples: Vec<f64> = (1 ..= 100).map(f64::from).collect();
    assert_eq!(summarize(&samples, 300).p99, 99.0);
    let samples: Vec<f64> = (1 ..= 1000).map(f64::from).collect();
    assert_eq!(summarize(&samples, 300).p99, 990.0);
}

#[test]
fn single_sample_statistics() {
    let stats = summarize(&[7.5], 300);
    assert_eq!(stats.average, 7.5);
    assert_eq!(stats.p99, 7.5);
    assert_eq!(stats.std_dev, 0.0);
    assert_eq!(stats.period_secs, 300);
}

#[test]
fn population_std_dev_matches_known_value() {
    let stats = summarize(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0], 300);
    assert_eq!(stats.average, 5.0);
    assert!(close(stats.std_dev, 2.0));
}

#[test]
fn period_divides_collection_window() {
    let samples = vec![1.0; 60];
    assert_eq!(summarize(&samples, 300).period_secs, 5);
    assert_eq!(StatisticsSummarizer::default().summarize(&samples).period_secs, 5);
}

#[test]
fn summarize_series_applies_metric_scale() {
    let mut scale = BTreeMap::new();
    scale.insert("procstat_memory_rss".to_string(), 1e-6);
    let summarizer = StatisticsSummarizer::new(300).with_metric_scale(scale);
    let results = summarizer.summarize_series(vec![
        ("procstat_memory_rss", vec![2_000_000.0, 4_000_000.0]),
        ("procstat_cpu_usage", vec![10.0, 20.0]),
    ]);
    assert!(close(results["procstat_memory_rss"].average, 3.0));
    assert_eq!(results["procstat_cpu_usage"].max, 20.0);
    assert_eq!(results.len(), 2);
}

proptest! {
    #[test]
    fn average_is_arithmetic_mean(samples in prop::collection::vec(0.0f64 .. 1e6, 1 .. 200)) {
        let stats = summarize(&samples, 300);
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        prop_assert!(close(stats.average, mean));
    }

    #[test]
    fn p99_lies_between_min_and_max(samples in prop::collection::vec(0.0f64 .. 1e6, 1 .. 300)) {
        let stats = summarize(&samples, 300);
        prop_assert!(stats.min <= stats.p99);
        prop_assert!(stats.p99 <= stats.max);
    }

    #[test]
    fn permutation_does_not_change_output(
        samples in prop::collection::vec(0.0f64 .. 1e6, 0 .. 100),
        seed in any::<u64>(),
    ) {
        let mut shuffled = samples.clone();
        let len = shuffled.len();
        if len > 1 {
            let mut state = seed;
            for index in (1 .. len).rev() {
                state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
                let swap = usize::try_from(state >> 33).unwrap() % (index + 1);
                shuffled.swap(index, swap);
            }
        }
        prop_assert_eq!(summarize(&samples, 300), summarize(&shuffled, 300));
    }
}
