//! Deterministic synthetic traffic.
//!
//! Flows cycle through the traffic classes and a fixed mix of label priorities, arrive half a
//! second apart and emit a packet every 200 ms.

use crate::flow::{Flow, Packet, TrafficClass};

/// Label priorities handed out in turn.
pub const PRIORITY_MIX: [i32; 5] = [1, 1, 2, 2, 3];

/// Gap between consecutive flow arrivals, in seconds.
pub const FLOW_STAGGER: f64 = 0.5;

/// Gap between consecutive packets of one flow, in seconds.
pub const PACKET_SPACING: f64 = 0.2;

/// Generate `num_flows` flows. Flow `i` takes `weights[i]` as its weight when present and
/// positive, 1 otherwise.
pub fn generate_network_traffic(num_flows: usize, weights: &[u32]) -> Vec<Flow> {
    (0..num_flows)
        .map(|i| {
            let class = TrafficClass::ALL[i % TrafficClass::ALL.len()];
            let priority = PRIORITY_MIX[i % PRIORITY_MIX.len()];
            let weight = weights.get(i).copied().filter(|&w| w > 0).unwrap_or(1);
            let arrival_time = i as f64 * FLOW_STAGGER;

            let mut flow = Flow::new(format!("flow{}", i + 1), class, priority, weight);
            flow.arrival_time = arrival_time;
            for j in 0..class.packet_count() {
                flow.push_packet(Packet::new(
                    format!("p{}-{}", i + 1, j + 1),
                    class.packet_size(),
                    arrival_time + j as f64 * PACKET_SPACING,
                ));
            }
            flow
        })
        .collect()
}
