//! Discrete-time driver that steps a scheduler over a workload.
//!
//! Each tick the driver hands newly arrived packets to the scheduler, then asks it for up to
//! `packets_per_tick` packets to serve. Served packets occupy a single outgoing link for
//! `size / link_bandwidth` seconds; the driver stamps their start and end times and credits the
//! resulting latency to the flow that really owns the packet, whatever flow the scheduler
//! attributed it to.
//!
//! Timeline samples can be streamed to an observer through a bounded channel. Sends never block:
//! a full or disconnected channel just loses the sample.

use crate::config::{SchedulerKind, SimulationConfig};
use crate::error::Result;
use crate::flow::Flow;
use crate::metrics::{FlowStats, SimulationMetrics};
use crate::scheduler::{FlowScheduler, Scheduled};
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

/// Slack when comparing arrival times against the tick clock.
const CLOCK_EPSILON: f64 = 1e-9;

/// Most decimals a timeline label is printed with.
const MAX_TIME_DECIMALS: usize = 9;

/// Decimals needed so consecutive multiples of `time_step` print as distinct labels. At least one.
fn time_decimals(time_step: f64) -> usize {
    (1..=MAX_TIME_DECIMALS)
        .find(|&decimals| {
            let scaled = time_step * 10f64.powi(decimals as i32);
            (scaled - scaled.round()).abs() < 1e-6
        })
        .unwrap_or(MAX_TIME_DECIMALS)
}

/// One timeline sample: a time label plus named series.
///
/// Series are `queue0`, `queue1`, ... (current queue lengths) and `served` (cumulative packets
/// served). They are flattened next to `time` when serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationPoint {
    pub time: String,
    #[serde(flatten)]
    pub series: BTreeMap<String, f64>,
}

/// Everything a single run produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationReport {
    pub scheduler: String,
    pub ticks: u64,
    /// Seconds from the start of the run until the link went idle for the last time.
    pub elapsed: f64,
    pub metrics: SimulationMetrics,
    pub timeline: Vec<SimulationPoint>,
}

/// Stepping driver; one instance can run any number of workloads.
pub struct Simulation {
    config: SimulationConfig,
    observer: Option<Sender<SimulationPoint>>,
}

impl Simulation {
    /// Build a driver for `config`, rejecting values the run loop cannot handle.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            observer: None,
        })
    }

    /// Stream timeline samples to `observer` as they are taken.
    pub fn with_observer(mut self, observer: Sender<SimulationPoint>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Run `flows` through the configured discipline.
    pub fn run(&self, flows: &[Flow]) -> SimulationReport {
        let mut scheduler = self.config.build_scheduler(flows);
        self.run_with(scheduler.as_mut(), flows)
    }

    /// Run `flows` through every discipline, in [`SchedulerKind::ALL`] order.
    pub fn compare(&self, flows: &[Flow]) -> Vec<SimulationReport> {
        SchedulerKind::ALL
            .iter()
            .map(|&kind| {
                let config = SimulationConfig {
                    scheduler: kind,
                    ..self.config.clone()
                };
                let mut scheduler = config.build_scheduler(flows);
                self.run_with(scheduler.as_mut(), flows)
            })
            .collect()
    }

    /// Run `flows` through a caller-supplied scheduler.
    pub fn run_with<S>(&self, scheduler: &mut S, flows: &[Flow]) -> SimulationReport
    where
        S: FlowScheduler + ?Sized,
    {
        let config = &self.config;

        // (arrival, flow index, packet index), flow-major so the stable sort keeps ties in flow
        // order and then packet order.
        let mut arrivals: Vec<(f64, usize, usize)> = flows
            .iter()
            .enumerate()
            .flat_map(|(f, flow)| {
                flow.packets
                    .iter()
                    .enumerate()
                    .map(move |(p, packet)| (packet.arrival_time, f, p))
            })
            .collect();
        arrivals.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut owners: HashMap<&str, usize> = HashMap::new();
        for (f, flow) in flows.iter().enumerate() {
            for packet in &flow.packets {
                owners.entry(packet.id.as_str()).or_insert(f);
            }
        }

        info!(
            scheduler = scheduler.name(),
            flows = flows.len(),
            packets = arrivals.len(),
            "simulation: starting run"
        );

        let mut stats = vec![FlowStats::new(); flows.len()];
        let mut timeline = Vec::new();
        let mut next_arrival = 0;
        let mut link_free_at = 0.0_f64;
        let mut served = 0u64;
        let mut misattributed = 0u64;
        let mut tick = 0u64;
        let decimals = time_decimals(config.time_step);

        loop {
            if tick >= config.max_ticks {
                warn!(
                    scheduler = scheduler.name(),
                    ticks = tick,
                    pending = arrivals.len() - next_arrival,
                    queued = scheduler.queue_lengths().iter().sum::<usize>(),
                    "simulation: max_ticks reached before the workload drained"
                );
                break;
            }
            let now = tick as f64 * config.time_step;

            while let Some(&(arrival, f, p)) = arrivals.get(next_arrival) {
                if arrival > now + CLOCK_EPSILON {
                    break;
                }
                let flow = &flows[f];
                scheduler.add_packet(flow, flow.packets[p].clone());
                next_arrival += 1;
            }

            for _ in 0..config.packets_per_tick {
                let Scheduled { packet, flow_id } = scheduler.schedule();
                let Some(mut packet) = packet else {
                    break;
                };
                served += 1;

                let start = now.max(link_free_at);
                let end = start + f64::from(packet.size) / config.link_bandwidth;
                link_free_at = end;
                packet.start_time = Some(start);
                packet.end_time = Some(end);

                let owner = owners.get(packet.id.as_str()).copied();
                if owner.map(|f| flows[f].id.as_str()) != flow_id.as_deref() {
                    misattributed += 1;
                }
                if let (Some(f), Some(latency)) = (owner, packet.latency()) {
                    stats[f].record(packet.size, latency);
                }
            }

            tick += 1;
            if tick % config.sample_every == 0 {
                self.sample(&mut timeline, now, decimals, scheduler.queue_lengths(), served);
            }
            if next_arrival == arrivals.len() && !scheduler.has_packets() {
                break;
            }
        }

        let elapsed = (tick as f64 * config.time_step).max(link_free_at);
        let mut metrics = SimulationMetrics::from_flow_stats(
            flows.iter().map(|flow| flow.id.as_str()).zip(stats.iter()),
            elapsed,
        );
        metrics.starvation_count = scheduler.starvation_count();
        metrics.queue_lengths = scheduler.queue_lengths();
        metrics.served = served;
        metrics.misattributed = misattributed;

        info!(
            scheduler = scheduler.name(),
            ticks = tick,
            served,
            misattributed,
            fairness = metrics.fairness,
            starvation = metrics.starvation_count,
            "simulation: run finished"
        );

        SimulationReport {
            scheduler: scheduler.name().to_string(),
            ticks: tick,
            elapsed,
            metrics,
            timeline,
        }
    }

    fn sample(
        &self,
        timeline: &mut Vec<SimulationPoint>,
        now: f64,
        decimals: usize,
        queue_lengths: Vec<usize>,
        served: u64,
    ) {
        let mut series: BTreeMap<String, f64> = queue_lengths
            .into_iter()
            .enumerate()
            .map(|(i, len)| (format!("queue{i}"), len as f64))
            .collect();
        series.insert("served".to_string(), served as f64);
        let point = SimulationPoint {
            time: format!("{now:.decimals$}"),
            series,
        };
        if let Some(observer) = &self.observer {
            let _ = observer.try_send(point.clone());
        }
        timeline.push(point);
    }
}
