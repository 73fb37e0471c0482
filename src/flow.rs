//! Flow and packet records shared by every scheduling discipline.
//!
//! These are plain value types produced by the traffic generator and consumed by the schedulers.
//! Only the driver writes the optional service timestamps on a [`Packet`]; schedulers move packets
//! around but never touch their contents.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier shared by a flow and all bookkeeping keyed on it.
pub type FlowId = String;

/// Traffic class tag attached to a flow.
///
/// The class is informational: it shapes the generated workload (packet size and count) but no
/// scheduler branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficClass {
    Chat,
    Video,
    File,
}

impl TrafficClass {
    /// Ordered list of all classes, in the order the generator cycles through them.
    pub const ALL: [TrafficClass; 3] = [TrafficClass::Chat, TrafficClass::Video, TrafficClass::File];

    /// Size in bytes of every packet of this class.
    pub const fn packet_size(self) -> u32 {
        match self {
            TrafficClass::Chat => 100,
            TrafficClass::Video => 1500,
            TrafficClass::File => 5000,
        }
    }

    /// Number of packets a generated flow of this class carries.
    pub const fn packet_count(self) -> usize {
        match self {
            TrafficClass::Chat => 8,
            TrafficClass::Video => 12,
            TrafficClass::File => 3,
        }
    }
}

impl fmt::Display for TrafficClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TrafficClass::Chat => "chat",
            TrafficClass::Video => "video",
            TrafficClass::File => "file",
        };
        write!(f, "{label}")
    }
}

/// A single unit of work travelling through a scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Packet {
    pub id: String,
    /// Payload size in bytes.
    pub size: u32,
    /// Arrival time in seconds since the start of the run.
    pub arrival_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<f64>,
}

impl Packet {
    pub fn new(id: impl Into<String>, size: u32, arrival_time: f64) -> Packet {
        Packet {
            id: id.into(),
            size,
            arrival_time,
            start_time: None,
            end_time: None,
        }
    }

    /// Time between arrival and end of service, once the driver has stamped it.
    pub fn latency(&self) -> Option<f64> {
        self.end_time.map(|end| end - self.arrival_time)
    }
}

/// A stream of packets sharing an identifier, label priority and weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flow {
    pub id: FlowId,
    #[serde(rename = "type")]
    pub class: TrafficClass,
    pub arrival_time: f64,
    #[serde(default)]
    pub packets: Vec<Packet>,
    /// Label priority: 1 is labelled "highest", 3 "lowest".
    pub priority: i32,
    /// Round-robin entitlement; zero is treated as 1 by [`Flow::effective_weight`].
    #[serde(default = "default_weight")]
    pub weight: u32,
    #[serde(default)]
    pub total_bytes: u64,
}

fn default_weight() -> u32 {
    1
}

impl Flow {
    /// Create an empty flow; packets are appended with [`Flow::push_packet`].
    pub fn new(id: impl Into<FlowId>, class: TrafficClass, priority: i32, weight: u32) -> Flow {
        Flow {
            id: id.into(),
            class,
            arrival_time: 0.0,
            packets: Vec::new(),
            priority,
            weight,
            total_bytes: 0,
        }
    }

    /// Append a packet and keep `total_bytes` in step.
    pub fn push_packet(&mut self, packet: Packet) {
        self.total_bytes += u64::from(packet.size);
        self.packets.push(packet);
    }

    /// Weight with the "missing or non-positive means 1" rule applied.
    pub fn effective_weight(&self) -> u32 {
        self.weight.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_packet_tracks_total_bytes() {
        let mut flow = Flow::new("flow1", TrafficClass::Video, 2, 3);
        flow.push_packet(Packet::new("p1-1", 1500, 0.0));
        flow.push_packet(Packet::new("p1-2", 1500, 0.2));
        assert_eq!(flow.total_bytes, 3000);
        assert_eq!(flow.packets.len(), 2);
    }

    #[test]
    fn zero_weight_is_treated_as_one() {
        let flow = Flow::new("flow1", TrafficClass::Chat, 1, 0);
        assert_eq!(flow.effective_weight(), 1);
    }

    #[test]
    fn flow_uses_type_key_in_json() {
        let flow = Flow::new("flow1", TrafficClass::File, 3, 2);
        let json = serde_json::to_value(&flow).unwrap();
        assert_eq!(json["type"], "file");
        assert_eq!(json["totalBytes"], 0);

        let back: Flow = serde_json::from_value(serde_json::json!({
            "id": "flow9",
            "type": "chat",
            "arrivalTime": 1.5,
            "priority": 1
        }))
        .unwrap();
        assert_eq!(back.weight, 1);
        assert!(back.packets.is_empty());
    }

    #[test]
    fn latency_requires_end_time() {
        let mut packet = Packet::new("p1-1", 100, 0.5);
        assert_eq!(packet.latency(), None);
        packet.end_time = Some(2.0);
        assert_eq!(packet.latency(), Some(1.5));
    }
}
