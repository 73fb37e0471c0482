//! Fairness and tail-latency metrics.
//!
//! The two summary functions, [`jain_fairness`] and [`calculate_95th_percentile`], are total: an
//! empty input yields a defined default instead of an error. [`FlowStats`] accumulates the raw
//! samples for one flow during a run and [`SimulationMetrics`] is the end-of-run summary the
//! driver emits.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Jain's fairness index over per-flow throughput values.
///
/// Returns `(Σx)² / (n · Σx²)`, which is 1 when every entry is equal and tends to `1/n` when a
/// single entry dominates. An empty slice is perfectly fair by convention, and so is a slice of
/// zeros (the ratio would be 0/0).
///
/// # Example
/// ```
/// use flow_scheduler::metrics::jain_fairness;
/// assert_eq!(jain_fairness(&[10.0, 0.0]), 0.5);
/// ```
pub fn jain_fairness(throughputs: &[f64]) -> f64 {
    if throughputs.is_empty() {
        return 1.0;
    }
    let sum: f64 = throughputs.iter().sum();
    let sum_squares: f64 = throughputs.iter().map(|x| x * x).sum();
    if sum_squares == 0.0 {
        return 1.0;
    }
    (sum * sum) / (throughputs.len() as f64 * sum_squares)
}

/// Nearest-rank percentile without interpolation.
///
/// Sorts a copy ascending and returns the element at `min(floor(n · q), n - 1)`. An empty slice
/// yields 0.
pub fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let index = (sorted.len() as f64 * q).floor() as usize;
    sorted[index.min(sorted.len() - 1)]
}

/// 95th percentile latency, see [`percentile`].
pub fn calculate_95th_percentile(latencies: &[f64]) -> f64 {
    percentile(latencies, 0.95)
}

/// Running totals for one flow.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowStats {
    pub packet_count: u64,
    pub bytes: u64,
    /// Latency samples in seconds, in service order.
    pub latencies: Vec<f64>,
}

impl FlowStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one served packet of `size` bytes and its latency.
    pub fn record(&mut self, size: u32, latency: f64) {
        self.packet_count += 1;
        self.bytes += u64::from(size);
        self.latencies.push(latency);
    }

    /// Bytes per second over `elapsed` seconds; 0 for a non-positive window.
    pub fn throughput(&self, elapsed: f64) -> f64 {
        if elapsed <= 0.0 {
            return 0.0;
        }
        self.bytes as f64 / elapsed
    }

    /// Arithmetic mean, 0 when nothing was served.
    pub fn average_latency(&self) -> f64 {
        if self.latencies.is_empty() {
            return 0.0;
        }
        self.latencies.iter().sum::<f64>() / self.latencies.len() as f64
    }

    pub fn min_latency(&self) -> Option<f64> {
        self.latencies.iter().copied().reduce(f64::min)
    }

    pub fn max_latency(&self) -> Option<f64> {
        self.latencies.iter().copied().reduce(f64::max)
    }

    pub fn p95(&self) -> f64 {
        calculate_95th_percentile(&self.latencies)
    }
}

/// End-of-run summary for one scheduler.
///
/// Per-flow maps are keyed by flow id. Serialized with camelCase keys so reports line up with
/// the flow records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationMetrics {
    /// Bytes per second served per flow.
    pub throughput: BTreeMap<String, f64>,
    /// Latency samples per flow, in seconds.
    pub latency: BTreeMap<String, Vec<f64>>,
    /// Jain's index over the throughput values.
    pub fairness: f64,
    /// 95th percentile latency per flow.
    pub latency95: BTreeMap<String, f64>,
    pub starvation_count: u64,
    /// Queue lengths when the run stopped.
    pub queue_lengths: Vec<usize>,
    /// Packets handed out by the scheduler.
    pub served: u64,
    /// Served packets the scheduler attributed to a flow other than their owner (or to none).
    pub misattributed: u64,
}

impl SimulationMetrics {
    /// Build the summary from per-flow stats listed in flow order.
    pub fn from_flow_stats<'a>(
        stats: impl IntoIterator<Item = (&'a str, &'a FlowStats)>,
        elapsed: f64,
    ) -> Self {
        let mut metrics = SimulationMetrics::default();
        let mut throughputs = Vec::new();
        for (flow_id, flow_stats) in stats {
            let throughput = flow_stats.throughput(elapsed);
            throughputs.push(throughput);
            metrics.throughput.insert(flow_id.to_string(), throughput);
            metrics
                .latency
                .insert(flow_id.to_string(), flow_stats.latencies.clone());
            metrics
                .latency95
                .insert(flow_id.to_string(), flow_stats.p95());
        }
        metrics.fairness = jain_fairness(&throughputs);
        metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jain_fairness_reference_values() {
        assert_eq!(jain_fairness(&[]), 1.0);
        assert_eq!(jain_fairness(&[5.0, 5.0, 5.0]), 1.0);
        assert_eq!(jain_fairness(&[10.0, 0.0]), 0.5);
        assert_eq!(jain_fairness(&[0.0, 0.0]), 1.0);
    }

    #[test]
    fn jain_fairness_tends_to_one_over_n() {
        let index = jain_fairness(&[1000.0, 0.001, 0.001, 0.001]);
        assert!((index - 0.25).abs() < 1e-3, "got {index}");
    }

    #[test]
    fn percentile_uses_nearest_rank() {
        let values: Vec<f64> = (1..=10).map(f64::from).collect();
        assert_eq!(calculate_95th_percentile(&values), 10.0);
        assert_eq!(percentile(&values, 0.5), 6.0);
        assert_eq!(percentile(&values, 0.0), 1.0);
        assert_eq!(calculate_95th_percentile(&[]), 0.0);
    }

    #[test]
    fn percentile_sorts_a_copy() {
        let values = vec![9.0, 1.0, 5.0];
        assert_eq!(percentile(&values, 0.5), 5.0);
        assert_eq!(values, vec![9.0, 1.0, 5.0]);
    }

    #[test]
    fn flow_stats_accumulate() {
        let mut stats = FlowStats::new();
        stats.record(100, 0.5);
        stats.record(300, 1.5);
        assert_eq!(stats.packet_count, 2);
        assert_eq!(stats.bytes, 400);
        assert_eq!(stats.throughput(2.0), 200.0);
        assert_eq!(stats.throughput(0.0), 0.0);
        assert_eq!(stats.average_latency(), 1.0);
        assert_eq!(stats.min_latency(), Some(0.5));
        assert_eq!(stats.max_latency(), Some(1.5));
        assert_eq!(stats.p95(), 1.5);
    }

    #[test]
    fn summary_computes_fairness_over_flows() {
        let mut a = FlowStats::new();
        a.record(1000, 0.1);
        let b = FlowStats::new();
        let metrics = SimulationMetrics::from_flow_stats([("a", &a), ("b", &b)], 1.0);
        assert_eq!(metrics.throughput["a"], 1000.0);
        assert_eq!(metrics.throughput["b"], 0.0);
        assert_eq!(metrics.fairness, 0.5);
        assert_eq!(metrics.latency95["b"], 0.0);
    }
}
