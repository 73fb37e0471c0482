//! Scheduling disciplines.
//!
//! Both disciplines are single-threaded, in-memory decision engines: the driver pushes packets in
//! with `add_packet` and pulls the next packet to serve with `schedule`. Every call completes
//! synchronously and absence of work is reported through [`Scheduled::idle`], never an error.

pub mod mlfq;
pub mod wrr;

pub use mlfq::{Attribution, MlfqScheduler};
pub use wrr::WrrScheduler;

use crate::flow::{Flow, FlowId, Packet};

/// Outcome of one `schedule` call.
///
/// `packet` is `None` when nothing was available. `flow_id` is the flow the scheduler attributes
/// the packet to; it can be `None` even when a packet was served (see
/// [`Attribution::FirstAtLevel`]).
#[derive(Debug, Clone, PartialEq)]
pub struct Scheduled {
    pub packet: Option<Packet>,
    pub flow_id: Option<FlowId>,
}

impl Scheduled {
    /// Nothing to serve.
    pub fn idle() -> Scheduled {
        Scheduled {
            packet: None,
            flow_id: None,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.packet.is_none()
    }
}

/// Common surface the driver steps through, regardless of discipline.
pub trait FlowScheduler {
    /// Short label used in reports and logs.
    fn name(&self) -> &'static str;

    /// Hand a newly arrived packet of `flow` to the scheduler.
    fn add_packet(&mut self, flow: &Flow, packet: Packet);

    /// Pick the next packet to serve.
    fn schedule(&mut self) -> Scheduled;

    /// Current queue lengths, in the discipline's natural order (levels for MLFQ, flows for WRR).
    fn queue_lengths(&self) -> Vec<usize>;

    fn has_packets(&self) -> bool;

    /// Corrective starvation boosts performed so far; disciplines without one report 0.
    fn starvation_count(&self) -> u64 {
        0
    }
}
