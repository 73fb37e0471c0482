//! Weighted Round Robin (WRR) scheduler
//!
//! One FIFO per flow, registered once at construction. A cursor walks the flows in registration
//! order; the flow under the cursor may be served up to `weight` packets in a row before the
//! cursor moves on. The cursor stays put after a successful serve, so a weight-2 flow bursts two
//! packets for every one packet of a weight-1 flow.
//!
//! Packets for a flow that was not registered at construction are dropped silently.

use crate::flow::{Flow, FlowId, Packet};
use crate::scheduler::{FlowScheduler, Scheduled};
use std::collections::{HashMap, VecDeque};

/// Per-flow FIFO and round state.
#[derive(Debug)]
struct Lane {
    id: FlowId,
    queue: VecDeque<Packet>,
    weight: u32,
    /// Packets served in the current round, `0..=weight`.
    served: u32,
}

/// WRR decision engine. See the module docs for the rotation rule.
#[derive(Debug)]
pub struct WrrScheduler {
    lanes: Vec<Lane>,
    lane_index: HashMap<FlowId, usize>,
    /// Rotation order; entries index into `lanes`. A flow listed twice at construction appears
    /// twice here and shares one lane.
    order: Vec<usize>,
    cursor: usize,
}

impl WrrScheduler {
    /// Register `flows` in order. Each gets an empty FIFO and its effective weight.
    pub fn new<'a>(flows: impl IntoIterator<Item = &'a Flow>) -> Self {
        let mut scheduler = WrrScheduler {
            lanes: Vec::new(),
            lane_index: HashMap::new(),
            order: Vec::new(),
            cursor: 0,
        };
        for flow in flows {
            scheduler.register(&flow.id, flow.effective_weight());
        }
        scheduler
    }

    fn register(&mut self, id: &str, weight: u32) {
        let idx = match self.lane_index.get(id) {
            Some(&idx) => {
                // Re-registration resets the lane, last weight wins.
                let lane = &mut self.lanes[idx];
                lane.queue.clear();
                lane.weight = weight;
                lane.served = 0;
                idx
            }
            None => {
                let idx = self.lanes.len();
                self.lanes.push(Lane {
                    id: id.to_string(),
                    queue: VecDeque::new(),
                    weight,
                    served: 0,
                });
                self.lane_index.insert(id.to_string(), idx);
                idx
            }
        };
        self.order.push(idx);
    }

    /// Enqueue `packet` on the FIFO of `flow_id`; unknown flows are ignored.
    pub fn add_packet(&mut self, flow_id: &str, packet: Packet) {
        if let Some(&idx) = self.lane_index.get(flow_id) {
            self.lanes[idx].queue.push_back(packet);
        }
    }

    /// Serve the next packet in weighted rotation.
    ///
    /// Walks at most two full rotations. A flow whose round allowance is spent has its counter
    /// reset as the cursor passes it, whether or not it still has packets.
    pub fn schedule(&mut self) -> Scheduled {
        if self.order.is_empty() {
            return Scheduled::idle();
        }

        for _ in 0..self.order.len() * 2 {
            let lane = &mut self.lanes[self.order[self.cursor]];
            if lane.served < lane.weight {
                if let Some(packet) = lane.queue.pop_front() {
                    lane.served += 1;
                    return Scheduled {
                        packet: Some(packet),
                        flow_id: Some(lane.id.clone()),
                    };
                }
            } else {
                lane.served = 0;
            }
            self.cursor = (self.cursor + 1) % self.order.len();
        }

        Scheduled::idle()
    }

    /// FIFO lengths in registration order, one entry per distinct flow.
    pub fn queue_lengths(&self) -> Vec<usize> {
        self.lanes.iter().map(|lane| lane.queue.len()).collect()
    }

    pub fn has_packets(&self) -> bool {
        self.lanes.iter().any(|lane| !lane.queue.is_empty())
    }

    /// Registered flow ids in registration order.
    pub fn flow_ids(&self) -> impl Iterator<Item = &str> {
        self.lanes.iter().map(|lane| lane.id.as_str())
    }

    /// Position of the rotation cursor.
    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

impl FlowScheduler for WrrScheduler {
    fn name(&self) -> &'static str {
        "wrr"
    }

    fn add_packet(&mut self, flow: &Flow, packet: Packet) {
        WrrScheduler::add_packet(self, &flow.id, packet);
    }

    fn schedule(&mut self) -> Scheduled {
        WrrScheduler::schedule(self)
    }

    fn queue_lengths(&self) -> Vec<usize> {
        WrrScheduler::queue_lengths(self)
    }

    fn has_packets(&self) -> bool {
        WrrScheduler::has_packets(self)
    }
}
