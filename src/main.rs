// Simulation binary - runs a synthetic workload through a scheduler and prints the report
//
// Logs go to stderr through tracing (RUST_LOG, default `info`); stdout carries only the JSON
// report so it can be piped straight into other tools.

use clap::Parser;
use flow_scheduler::config::SchedulerKind;
use flow_scheduler::scheduler::Attribution;
use flow_scheduler::simulation::{Simulation, SimulationPoint};
use flow_scheduler::traffic::generate_network_traffic;
use flow_scheduler::SimulationConfig;
use std::path::PathBuf;
use std::thread::JoinHandle;
use tracing_subscriber::EnvFilter;

/// Command-line options; flags override values loaded from `--config`.
#[derive(Debug, Parser)]
#[command(
    name = "flow_scheduler",
    about = "Compare MLFQ and WRR packet scheduling on a synthetic workload"
)]
struct Cli {
    /// JSON configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Scheduling discipline to run.
    #[arg(long, value_enum)]
    scheduler: Option<SchedulerKind>,

    /// Number of generated flows.
    #[arg(long)]
    flows: Option<usize>,

    /// Per-flow weights, comma separated (e.g. `3,2,1`).
    #[arg(long, value_delimiter = ',')]
    weights: Option<Vec<u32>>,

    /// How MLFQ attributes a served packet to a flow.
    #[arg(long, value_enum)]
    attribution: Option<Attribution>,

    /// Run every discipline on the same workload.
    #[arg(long)]
    compare: bool,

    /// Stream timeline samples to stderr as JSON lines while running.
    #[arg(long)]
    follow: bool,
}

impl Cli {
    fn into_config(self) -> Result<SimulationConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => SimulationConfig::from_json_file(path)?,
            None => SimulationConfig::default(),
        };
        if let Some(scheduler) = self.scheduler {
            config.scheduler = scheduler;
        }
        if let Some(flows) = self.flows {
            config.traffic.flows = flows;
        }
        if let Some(weights) = self.weights {
            config.traffic.weights = weights;
        }
        if let Some(attribution) = self.attribution {
            config.mlfq.attribution = attribution;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Wait for the timeline follower; a panic there loses samples but not the report.
fn join_follower(handle: JoinHandle<()>) -> bool {
    match handle.join() {
        Ok(()) => true,
        Err(_) => {
            tracing::warn!("timeline follower thread panicked; some samples may be missing");
            false
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let compare = cli.compare;
    let follow = cli.follow;
    let config = cli.into_config()?;

    let flows = generate_network_traffic(config.traffic.flows, &config.traffic.weights);
    let mut simulation = Simulation::new(config)?;

    let follower = if follow {
        let (tx, rx) = crossbeam_channel::bounded::<SimulationPoint>(1024);
        simulation = simulation.with_observer(tx);
        Some(std::thread::spawn(move || {
            for point in rx {
                match serde_json::to_string(&point) {
                    Ok(line) => eprintln!("{line}"),
                    Err(e) => tracing::warn!("failed to encode timeline point: {e}"),
                }
            }
        }))
    } else {
        None
    };

    let output = if compare {
        serde_json::to_string_pretty(&simulation.compare(&flows))?
    } else {
        serde_json::to_string_pretty(&simulation.run(&flows))?
    };

    // Dropping the simulation closes the observer channel and lets the follower drain.
    drop(simulation);
    if let Some(handle) = follower {
        join_follower(handle);
    }

    println!("{output}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follower_panic_is_reported_not_propagated() {
        let handle = std::thread::spawn(|| panic!("follower failed"));
        assert!(!join_follower(handle));
        assert!(join_follower(std::thread::spawn(|| ())));
    }
}
