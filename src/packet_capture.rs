// pcap-streamrate/src/packet_capture.rs
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of one TCP connection, assigned in first-seen order like
/// Wireshark's `tcp.stream`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A frame as handed over by the dissector. Any field may be missing: frames
/// that are not TCP have no connection id, pcapng simple packet blocks have
/// no timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketRecord {
    pub frame_number: u64,
    /// Seconds since the epoch
    pub timestamp: Option<f64>,
    pub connection_id: Option<ConnectionId>,
    /// Original (on the wire) frame length in bytes
    pub length: Option<u64>,
}

impl PacketRecord {
    /// Try to turn the record into a complete packet. Returns `None` when any
    /// required field is missing or the timestamp is not a finite number.
    pub fn decode(&self) -> Option<DecodedPacket> {
        let timestamp = self.timestamp.filter(|ts| ts.is_finite())?;
        Some(DecodedPacket {
            timestamp,
            connection_id: self.connection_id?,
            byte_length: self.length?,
        })
    }
}

/// A packet with every field the throughput estimator needs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecodedPacket {
    pub timestamp: f64,
    pub connection_id: ConnectionId,
    pub byte_length: u64,
}
