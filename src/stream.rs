// pcap-streamrate/src/stream.rs
//! TCP stream index assignment.
//!
//! Both directions of a connection share one normalized key. A pure SYN on a
//! key whose previous connection has already been closed (FIN from both ends
//! or a RST) starts a new stream, so port reuse shows up as a separate
//! connection.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::net::IpAddr;

use crate::packet_capture::ConnectionId;

/// TCP header flags relevant to stream tracking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcpFlags {
    pub syn: bool,
    pub ack: bool,
    pub fin: bool,
    pub rst: bool,
}

impl TcpFlags {
    pub fn from_byte(flags: u8) -> Self {
        TcpFlags {
            fin: flags & 0x01 != 0,
            syn: flags & 0x02 != 0,
            rst: flags & 0x04 != 0,
            ack: flags & 0x10 != 0,
        }
    }
}

/// The transport fields of one TCP segment, as extracted by the dissector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpSegment {
    pub src_ip: IpAddr,
    pub src_port: u16,
    pub dst_ip: IpAddr,
    pub dst_port: u16,
    pub flags: TcpFlags,
}

/// Normalized connection key (lower endpoint first).
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct ConnectionKey {
    ip_a: IpAddr,
    port_a: u16,
    ip_b: IpAddr,
    port_b: u16,
}

impl ConnectionKey {
    pub fn new(src_ip: IpAddr, src_port: u16, dst_ip: IpAddr, dst_port: u16) -> Self {
        if (src_ip, src_port) <= (dst_ip, dst_port) {
            ConnectionKey {
                ip_a: src_ip,
                port_a: src_port,
                ip_b: dst_ip,
                port_b: dst_port,
            }
        } else {
            ConnectionKey {
                ip_a: dst_ip,
                port_a: dst_port,
                ip_b: src_ip,
                port_b: src_port,
            }
        }
    }

    fn is_from_a(&self, src_ip: IpAddr, src_port: u16) -> bool {
        src_ip == self.ip_a && src_port == self.port_a
    }
}

#[derive(Debug, Clone, Copy)]
struct StreamState {
    id: ConnectionId,
    fin_from_a: bool,
    fin_from_b: bool,
    reset: bool,
}

impl StreamState {
    fn new(id: ConnectionId) -> Self {
        StreamState {
            id,
            fin_from_a: false,
            fin_from_b: false,
            reset: false,
        }
    }

    fn is_closed(&self) -> bool {
        self.reset || (self.fin_from_a && self.fin_from_b)
    }
}

/// Assigns stream indexes to TCP segments in the order they are seen.
#[derive(Debug, Default)]
pub struct StreamTracker {
    streams: HashMap<ConnectionKey, StreamState>,
    next_index: u64,
}

impl StreamTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stream indexes handed out so far.
    pub fn stream_count(&self) -> u64 {
        self.next_index
    }

    pub fn assign(&mut self, segment: &TcpSegment) -> ConnectionId {
        let key = ConnectionKey::new(
            segment.src_ip,
            segment.src_port,
            segment.dst_ip,
            segment.dst_port,
        );
        let opens_connection = segment.flags.syn && !segment.flags.ack;

        let from_a = key.is_from_a(segment.src_ip, segment.src_port);

        let state = match self.streams.entry(key) {
            Entry::Occupied(entry) => {
                let state = entry.into_mut();
                if opens_connection && state.is_closed() {
                    *state = StreamState::new(ConnectionId(self.next_index));
                    self.next_index += 1;
                }
                state
            }
            Entry::Vacant(entry) => {
                let id = ConnectionId(self.next_index);
                self.next_index += 1;
                entry.insert(StreamState::new(id))
            }
        };
        if segment.flags.rst {
            state.reset = true;
        }
        if segment.flags.fin {
            if from_a {
                state.fin_from_a = true;
            } else {
                state.fin_from_b = true;
            }
        }
        state.id
    }
}
