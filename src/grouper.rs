// pcap-streamrate/src/grouper.rs
//! Partition decoded packets into per-connection collections.

use std::collections::HashMap;

use log::debug;

use crate::packet_capture::{ConnectionId, DecodedPacket, PacketRecord};

/// Packets grouped by connection. Iteration follows the order in which each
/// connection id was first seen, which is the canonical processing order for
/// binning and stitching.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionGroup {
    order: Vec<ConnectionId>,
    packets: HashMap<ConnectionId, Vec<DecodedPacket>>,
    skipped: usize,
}

impl ConnectionGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one complete packet to its connection, creating the connection on
    /// first sight.
    pub fn insert(&mut self, packet: DecodedPacket) {
        let order = &mut self.order;
        self.packets
            .entry(packet.connection_id)
            .or_insert_with(|| {
                order.push(packet.connection_id);
                Vec::new()
            })
            .push(packet);
    }

    /// Number of distinct connections.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, id: ConnectionId) -> Option<&[DecodedPacket]> {
        self.packets.get(&id).map(Vec::as_slice)
    }

    /// Connection ids in first-seen order.
    pub fn connection_ids(&self) -> &[ConnectionId] {
        &self.order
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConnectionId, &[DecodedPacket])> + '_ {
        self.order
            .iter()
            .filter_map(move |id| self.packets.get(id).map(|p| (*id, p.as_slice())))
    }

    /// Number of packets across all connections.
    pub fn total_packets(&self) -> usize {
        self.packets.values().map(Vec::len).sum()
    }

    /// Records dropped because a required field was missing.
    pub fn skipped_records(&self) -> usize {
        self.skipped
    }
}

/// Group records by connection id. Records missing a connection id,
/// timestamp or length are dropped without failing the run.
pub fn group_packets<'a, I>(records: I) -> ConnectionGroup
where
    I: IntoIterator<Item = &'a PacketRecord>,
{
    let mut group = ConnectionGroup::new();
    for record in records {
        match record.decode() {
            Some(packet) => group.insert(packet),
            None => {
                debug!("Skipping frame {}: incomplete record", record.frame_number);
                group.skipped += 1;
            }
        }
    }
    group
}
