//! Multi-Level Feedback Queue (MLFQ) scheduler
//!
//! Packets wait in one of N FIFO levels. Level 0 is scanned first, so a lower index means earlier
//! service. Each flow sits on exactly one level at a time and may be served `quantum[level]`
//! packets there before it is demoted one level down. A starvation check runs after every
//! `schedule` call and promotes one flow by one level whenever the backlog below level 0 grows
//! past [`STARVATION_THRESHOLD`].
//!
//! Algorithm for `schedule`:
//! 1. Select the first non-empty level `L`
//! 2. Pop its head packet (strict FIFO within a level)
//! 3. Attribute the packet to a flow (see [`Attribution`])
//! 4. Charge the flow one unit of service; demote it to `L + 1` once the count reaches
//!    `quantum[L]`, unless `L` is the last level
//! 5. Run the starvation check
//!
//! A flow's packets stay on the level they were enqueued on. Demotion and promotion only move
//! the flow's *future* packets.

use crate::flow::{Flow, FlowId, Packet};
use crate::scheduler::{FlowScheduler, Scheduled};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// Number of levels when none is given.
pub const DEFAULT_QUEUE_COUNT: usize = 3;

/// Combined length of levels `1..N` above which a starvation boost fires.
pub const STARVATION_THRESHOLD: usize = 10;

/// How a dequeued packet is mapped back to the flow that gets charged for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Attribution {
    /// Charge the first flow, in first-seen order, whose current level equals the level the packet
    /// was popped from. When several flows share a level this always picks the same one,
    /// whichever flow actually owned the packet, and when no flow currently sits on that level
    /// (it was promoted or demoted away) nobody is charged.
    #[default]
    FirstAtLevel,
    /// Charge the flow that enqueued the packet. Demotion is judged against that flow's current
    /// level.
    Tagged,
}

/// Packet plus the flow that enqueued it.
#[derive(Debug, Clone)]
struct QueuedPacket {
    owner: FlowId,
    packet: Packet,
}

/// Per-flow bookkeeping, created the first time a flow is seen.
#[derive(Debug, Clone)]
struct FlowSlot {
    id: FlowId,
    level: usize,
    /// Packets served at the current level.
    served: u32,
}

/// MLFQ decision engine. See the module docs for the algorithm.
#[derive(Debug)]
pub struct MlfqScheduler {
    queues: Vec<VecDeque<QueuedPacket>>,
    quanta: Vec<u32>,
    /// Flow slots in first-seen order; attribution and promotion scan this order.
    flows: Vec<FlowSlot>,
    slot_index: HashMap<FlowId, usize>,
    starvation_count: u64,
    attribution: Attribution,
}

impl Default for MlfqScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_COUNT)
    }
}

impl MlfqScheduler {
    /// Build a scheduler with `queue_count` levels and doubling quanta `2, 4, 8, ...`.
    ///
    /// A count of 0 is raised to 1.
    pub fn new(queue_count: usize) -> Self {
        let count = queue_count.max(1);
        let quanta = (0..count)
            .map(|level| 2u32.saturating_pow(level as u32 + 1))
            .collect();
        Self::with_quanta(quanta)
    }

    /// Build a scheduler from an explicit quantum per level. The number of levels is
    /// `quanta.len()`; an empty array yields a single level with quantum 2.
    pub fn with_quanta(quanta: Vec<u32>) -> Self {
        let quanta = if quanta.is_empty() { vec![2] } else { quanta };
        Self {
            queues: (0..quanta.len()).map(|_| VecDeque::new()).collect(),
            quanta,
            flows: Vec::new(),
            slot_index: HashMap::new(),
            starvation_count: 0,
            attribution: Attribution::default(),
        }
    }

    /// Switch the packet-to-flow attribution mode.
    pub fn with_attribution(mut self, attribution: Attribution) -> Self {
        self.attribution = attribution;
        self
    }

    pub fn attribution(&self) -> Attribution {
        self.attribution
    }

    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }

    pub fn quanta(&self) -> &[u32] {
        &self.quanta
    }

    /// Level a flow with label priority `priority` starts on: `max(0, 3 - priority)`, clamped to
    /// the last level.
    ///
    /// Note that this places label-priority 1 ("highest") on level 2, which is served last with
    /// the default three levels.
    pub fn initial_level(&self, priority: i32) -> usize {
        let level = 3i32.saturating_sub(priority).max(0) as usize;
        level.min(self.queues.len() - 1)
    }

    /// Enqueue `packet` on the current level of `flow`, registering the flow on first sight.
    pub fn add_packet(&mut self, flow: &Flow, packet: Packet) {
        let level = match self.slot_index.get(&flow.id) {
            Some(&idx) => self.flows[idx].level,
            None => {
                let level = self.initial_level(flow.priority);
                self.slot_index.insert(flow.id.clone(), self.flows.len());
                self.flows.push(FlowSlot {
                    id: flow.id.clone(),
                    level,
                    served: 0,
                });
                level
            }
        };
        self.queues[level].push_back(QueuedPacket {
            owner: flow.id.clone(),
            packet,
        });
    }

    /// Serve the head packet of the first non-empty level.
    pub fn schedule(&mut self) -> Scheduled {
        let Some(level) = self.queues.iter().position(|queue| !queue.is_empty()) else {
            self.check_starvation();
            return Scheduled::idle();
        };
        let Some(queued) = self.queues[level].pop_front() else {
            self.check_starvation();
            return Scheduled::idle();
        };

        let attributed = match self.attribution {
            Attribution::FirstAtLevel => self.flows.iter().position(|slot| slot.level == level),
            Attribution::Tagged => self.slot_index.get(&queued.owner).copied(),
        };
        let flow_id = attributed.map(|idx| {
            self.charge(idx);
            self.flows[idx].id.clone()
        });

        self.check_starvation();

        Scheduled {
            packet: Some(queued.packet),
            flow_id,
        }
    }

    /// Count one served packet against the flow and demote it once its quantum is used up.
    fn charge(&mut self, idx: usize) {
        let last = self.queues.len() - 1;
        let slot = &mut self.flows[idx];
        let quantum = self.quanta[slot.level];
        slot.served = slot.served.saturating_add(1);
        if slot.served < quantum {
            return;
        }
        if slot.level < last {
            slot.level += 1;
            slot.served = 0;
            debug!(flow = %slot.id, level = slot.level, "mlfq: demoted");
        } else {
            // Bottom level: nowhere to go, keep the count within the quantum.
            slot.served = quantum;
        }
    }

    /// Promote the first flow below level 0 when the lower levels are backed up.
    ///
    /// At most one promotion per call; the promoted flow keeps its service count.
    fn check_starvation(&mut self) {
        let waiting: usize = self.queues.iter().skip(1).map(VecDeque::len).sum();
        if waiting <= STARVATION_THRESHOLD {
            return;
        }
        self.starvation_count += 1;
        if let Some(slot) = self.flows.iter_mut().find(|slot| slot.level > 0) {
            slot.level -= 1;
            debug!(
                flow = %slot.id,
                level = slot.level,
                waiting,
                "mlfq: starvation boost"
            );
        }
    }

    /// Number of packets waiting on each level, level 0 first.
    pub fn queue_lengths(&self) -> Vec<usize> {
        self.queues.iter().map(VecDeque::len).collect()
    }

    pub fn has_packets(&self) -> bool {
        self.queues.iter().any(|queue| !queue.is_empty())
    }

    /// Number of `schedule` calls that found the lower levels over the starvation threshold.
    pub fn starvation_count(&self) -> u64 {
        self.starvation_count
    }

    /// Current level of a known flow.
    pub fn flow_level(&self, flow_id: &str) -> Option<usize> {
        self.slot_index.get(flow_id).map(|&idx| self.flows[idx].level)
    }

    /// Packets served at the flow's current level.
    pub fn flow_service_count(&self, flow_id: &str) -> Option<u32> {
        self.slot_index
            .get(flow_id)
            .map(|&idx| self.flows[idx].served)
    }
}

impl FlowScheduler for MlfqScheduler {
    fn name(&self) -> &'static str {
        "mlfq"
    }

    fn add_packet(&mut self, flow: &Flow, packet: Packet) {
        MlfqScheduler::add_packet(self, flow, packet);
    }

    fn schedule(&mut self) -> Scheduled {
        MlfqScheduler::schedule(self)
    }

    fn queue_lengths(&self) -> Vec<usize> {
        MlfqScheduler::queue_lengths(self)
    }

    fn has_packets(&self) -> bool {
        MlfqScheduler::has_packets(self)
    }

    fn starvation_count(&self) -> u64 {
        MlfqScheduler::starvation_count(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::TrafficClass;

    fn flow(id: &str, priority: i32) -> Flow {
        Flow::new(id, TrafficClass::Chat, priority, 1)
    }

    fn packet(n: usize) -> Packet {
        Packet::new(format!("p{n}"), 100, n as f64)
    }

    #[test]
    fn default_quanta_are_two_four_eight() {
        let mlfq = MlfqScheduler::default();
        assert_eq!(mlfq.queue_count(), 3);
        assert_eq!(mlfq.quanta(), &[2, 4, 8]);
    }

    #[test]
    fn quanta_keep_doubling_past_three_levels() {
        let mlfq = MlfqScheduler::new(5);
        assert_eq!(mlfq.quanta(), &[2, 4, 8, 16, 32]);
        assert_eq!(MlfqScheduler::new(0).queue_count(), 1);
    }

    #[test]
    fn initial_level_inverts_label_priority() {
        let mlfq = MlfqScheduler::default();
        assert_eq!(mlfq.initial_level(1), 2);
        assert_eq!(mlfq.initial_level(2), 1);
        assert_eq!(mlfq.initial_level(3), 0);
        assert_eq!(mlfq.initial_level(7), 0);
        assert_eq!(mlfq.initial_level(-4), 2);
        assert_eq!(MlfqScheduler::new(2).initial_level(1), 1);
    }

    #[test]
    fn lower_level_is_served_first() {
        let mut mlfq = MlfqScheduler::default();
        let low = flow("low", 1);
        let high = flow("high", 3);
        mlfq.add_packet(&low, packet(1));
        mlfq.add_packet(&high, packet(2));
        assert_eq!(mlfq.queue_lengths(), vec![1, 0, 1]);

        let first = mlfq.schedule();
        assert_eq!(first.packet.unwrap().id, "p2");
        assert_eq!(first.flow_id.as_deref(), Some("high"));
        let second = mlfq.schedule();
        assert_eq!(second.packet.unwrap().id, "p1");
        assert_eq!(second.flow_id.as_deref(), Some("low"));
        assert!(mlfq.schedule().is_idle());
    }

    #[test]
    fn flow_is_demoted_when_quantum_is_used() {
        let mut mlfq = MlfqScheduler::default();
        let f = flow("f", 3);
        mlfq.add_packet(&f, packet(1));
        mlfq.add_packet(&f, packet(2));

        mlfq.schedule();
        assert_eq!(mlfq.flow_level("f"), Some(0));
        assert_eq!(mlfq.flow_service_count("f"), Some(1));
        mlfq.schedule();
        assert_eq!(mlfq.flow_level("f"), Some(1));
        assert_eq!(mlfq.flow_service_count("f"), Some(0));
    }

    #[test]
    fn stranded_packet_is_unattributed() {
        let mut mlfq = MlfqScheduler::default();
        let f = flow("f", 3);
        for n in 0..3 {
            mlfq.add_packet(&f, packet(n));
        }
        mlfq.schedule();
        mlfq.schedule();
        // The flow moved to level 1 but its third packet is still on level 0.
        let third = mlfq.schedule();
        assert_eq!(third.packet.unwrap().id, "p2");
        assert_eq!(third.flow_id, None);
        assert_eq!(mlfq.flow_service_count("f"), Some(0));
    }

    #[test]
    fn first_at_level_charges_the_earliest_flow() {
        let mut mlfq = MlfqScheduler::default();
        let a = flow("a", 3);
        let b = flow("b", 3);
        mlfq.add_packet(&b, packet(1));
        mlfq.add_packet(&a, packet(2));
        mlfq.add_packet(&b, packet(3));

        // "b" was seen first, so it is charged for "a"'s packet too.
        mlfq.schedule();
        let second = mlfq.schedule();
        assert_eq!(second.packet.unwrap().id, "p2");
        assert_eq!(second.flow_id.as_deref(), Some("b"));
        assert_eq!(mlfq.flow_level("b"), Some(1));
        assert_eq!(mlfq.flow_level("a"), Some(0));
    }

    #[test]
    fn tagged_mode_charges_the_owner() {
        let mut mlfq = MlfqScheduler::default().with_attribution(Attribution::Tagged);
        let a = flow("a", 3);
        let b = flow("b", 3);
        mlfq.add_packet(&b, packet(1));
        mlfq.add_packet(&a, packet(2));

        assert_eq!(mlfq.schedule().flow_id.as_deref(), Some("b"));
        assert_eq!(mlfq.schedule().flow_id.as_deref(), Some("a"));
        assert_eq!(mlfq.flow_service_count("a"), Some(1));
        assert_eq!(mlfq.flow_service_count("b"), Some(1));
    }

    #[test]
    fn starvation_boost_promotes_one_flow() {
        let mut mlfq = MlfqScheduler::default();
        let f = flow("f", 1);
        for n in 0..12 {
            mlfq.add_packet(&f, packet(n));
        }
        assert_eq!(mlfq.queue_lengths(), vec![0, 0, 12]);

        // 11 left on level 2 after the pop: over the threshold.
        let served = mlfq.schedule();
        assert_eq!(served.flow_id.as_deref(), Some("f"));
        assert_eq!(mlfq.starvation_count(), 1);
        assert_eq!(mlfq.flow_level("f"), Some(1));
        assert_eq!(mlfq.flow_service_count("f"), Some(1));

        // 10 left: at the threshold, not over it.
        let served = mlfq.schedule();
        assert_eq!(served.flow_id, None);
        assert_eq!(mlfq.starvation_count(), 1);
    }

    #[test]
    fn empty_schedule_does_not_count_starvation() {
        let mut mlfq = MlfqScheduler::default();
        assert!(mlfq.schedule().is_idle());
        assert_eq!(mlfq.starvation_count(), 0);
        assert!(!mlfq.has_packets());
    }
}
