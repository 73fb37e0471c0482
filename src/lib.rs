pub mod config;
pub mod error;
pub mod flow;
pub mod metrics;
pub mod scheduler;
pub mod simulation;
pub mod traffic;

// Re-export for easier testing
pub use config::{SchedulerKind, SimulationConfig};
pub use error::SimError;
pub use flow::{Flow, FlowId, Packet, TrafficClass};
pub use scheduler::{Attribution, FlowScheduler, MlfqScheduler, Scheduled, WrrScheduler};
pub use simulation::{Simulation, SimulationPoint, SimulationReport};
