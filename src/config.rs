//! Run configuration.
//!
//! Every field has a default so a config file only needs the knobs it changes. Files are JSON.

use crate::error::{Result, SimError};
use crate::flow::Flow;
use crate::scheduler::mlfq::{Attribution, DEFAULT_QUEUE_COUNT};
use crate::scheduler::{FlowScheduler, MlfqScheduler, WrrScheduler};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Scheduling discipline driven by the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerKind {
    #[default]
    Mlfq,
    Wrr,
}

impl SchedulerKind {
    pub const ALL: [SchedulerKind; 2] = [SchedulerKind::Mlfq, SchedulerKind::Wrr];
}

impl fmt::Display for SchedulerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SchedulerKind::Mlfq => "mlfq",
            SchedulerKind::Wrr => "wrr",
        };
        write!(f, "{label}")
    }
}

/// MLFQ tuning knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MlfqConfig {
    /// Number of levels; ignored when `quanta` is set.
    pub queue_count: usize,
    /// Explicit quantum per level.
    pub quanta: Option<Vec<u32>>,
    pub attribution: Attribution,
}

impl Default for MlfqConfig {
    fn default() -> Self {
        Self {
            queue_count: DEFAULT_QUEUE_COUNT,
            quanta: None,
            attribution: Attribution::default(),
        }
    }
}

impl MlfqConfig {
    pub fn build(&self) -> MlfqScheduler {
        let scheduler = match &self.quanta {
            Some(quanta) => MlfqScheduler::with_quanta(quanta.clone()),
            None => MlfqScheduler::new(self.queue_count),
        };
        scheduler.with_attribution(self.attribution)
    }
}

/// Synthetic workload shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficConfig {
    pub flows: usize,
    /// Weight per flow, by position; missing entries default to 1.
    pub weights: Vec<u32>,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            flows: 5,
            weights: vec![3, 2, 1, 2, 1],
        }
    }
}

/// Top-level configuration for one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub scheduler: SchedulerKind,
    pub mlfq: MlfqConfig,
    pub traffic: TrafficConfig,
    /// Length of one clock tick, in seconds.
    pub time_step: f64,
    /// Outgoing link rate in bytes per second; sets how long a packet occupies the link.
    pub link_bandwidth: f64,
    /// `schedule` calls per tick.
    pub packets_per_tick: usize,
    /// Hard stop for runs that never drain.
    pub max_ticks: u64,
    /// Timeline sampling period, in ticks.
    pub sample_every: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerKind::default(),
            mlfq: MlfqConfig::default(),
            traffic: TrafficConfig::default(),
            time_step: 0.1,
            link_bandwidth: 100_000.0,
            packets_per_tick: 1,
            max_ticks: 10_000,
            sample_every: 10,
        }
    }
}

impl SimulationConfig {
    /// Load and validate a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: SimulationConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.time_step > 0.0) {
            return Err(SimError::InvalidConfig(format!(
                "time_step must be positive, got {}",
                self.time_step
            )));
        }
        if !(self.link_bandwidth > 0.0) {
            return Err(SimError::InvalidConfig(format!(
                "link_bandwidth must be positive, got {}",
                self.link_bandwidth
            )));
        }
        if self.packets_per_tick == 0 {
            return Err(SimError::InvalidConfig(
                "packets_per_tick must be at least 1".to_string(),
            ));
        }
        if self.sample_every == 0 {
            return Err(SimError::InvalidConfig(
                "sample_every must be at least 1".to_string(),
            ));
        }
        if matches!(&self.mlfq.quanta, Some(quanta) if quanta.is_empty()) {
            return Err(SimError::InvalidConfig(
                "mlfq.quanta must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Instantiate the configured discipline for `flows`.
    pub fn build_scheduler(&self, flows: &[Flow]) -> Box<dyn FlowScheduler> {
        match self.scheduler {
            SchedulerKind::Mlfq => Box::new(self.mlfq.build()),
            SchedulerKind::Wrr => Box::new(WrrScheduler::new(flows)),
        }
    }
}
