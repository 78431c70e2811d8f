// pcap-streamrate/src/dissector.rs
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use pcap_file::pcap::PcapReader;
use pcap_file::pcapng::blocks::interface_description::{
    InterfaceDescriptionBlock, InterfaceDescriptionOption,
};
use pcap_file::pcapng::{Block, PcapNgReader};
use pcap_file::DataLink;
use serde::{Deserialize, Serialize};

use crate::error::{PcapError, Result};
use crate::packet_capture::PacketRecord;
use crate::stream::{StreamTracker, TcpFlags, TcpSegment};

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_IPV6: u16 = 0x86DD;
const ETHERTYPE_VLAN: u16 = 0x8100;
const ETHERTYPE_QINQ: u16 = 0x88A8;
const IP_PROTO_TCP: u8 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureFormat {
    Pcap,
    PcapNg,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    pub filename: String,
    pub format: CaptureFormat,
    pub file_size: u64,
    pub total_packets: u64,
    pub tcp_packets: u64,
    pub tcp_streams: u64,
    pub capture_start_time: Option<String>,
    pub capture_end_time: Option<String>,
}

/// Everything the dissector produced for one capture file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureDissection {
    pub file_info: FileInfo,
    pub records: Vec<PacketRecord>,
}

/// Decodes capture files into per-frame records carrying a timestamp, a TCP
/// stream index and the frame length.
#[derive(Debug, Default, Clone)]
pub struct PcapDissector {
    limit: Option<usize>,
}

/// Earliest and latest capture timestamp seen.
#[derive(Default)]
struct TimeBounds {
    first: Option<Duration>,
    last: Option<Duration>,
}

impl TimeBounds {
    fn observe(&mut self, ts: Duration) {
        if self.first.map_or(true, |first| ts < first) {
            self.first = Some(ts);
        }
        if self.last.map_or(true, |last| ts > last) {
            self.last = Some(ts);
        }
    }

    fn rfc3339(ts: Option<Duration>) -> Option<String> {
        let ts = ts?;
        DateTime::<Utc>::from_timestamp(ts.as_secs() as i64, ts.subsec_nanos())
            .map(|t| t.to_rfc3339())
    }
}

/// A pcapng interface: its link type and how many timestamp units make up
/// one second (`if_tsresol`, microseconds unless stated otherwise).
#[derive(Debug, Clone, Copy, PartialEq)]
struct Interface {
    linktype: DataLink,
    units_per_second: u128,
}

impl Interface {
    const DEFAULT_UNITS_PER_SECOND: u128 = 1_000_000;

    fn from_block(idb: &InterfaceDescriptionBlock) -> Self {
        let tsresol = idb.options.iter().find_map(|opt| match opt {
            InterfaceDescriptionOption::IfTsResol(resol) => Some(*resol),
            _ => None,
        });
        let units_per_second = match tsresol {
            None => Self::DEFAULT_UNITS_PER_SECOND,
            Some(resol) => units_per_second(resol).unwrap_or_else(|| {
                warn!("Unsupported if_tsresol {:#04x}, assuming microseconds", resol);
                Self::DEFAULT_UNITS_PER_SECOND
            }),
        };
        Interface {
            linktype: idb.linktype,
            units_per_second,
        }
    }

    /// pcap_file hands the raw EPB timestamp over as nanoseconds; rescale it
    /// to the interface's actual resolution.
    fn timestamp(&self, raw: Duration) -> Duration {
        let units = raw.as_nanos();
        let secs = units / self.units_per_second;
        let nanos = (units % self.units_per_second) * 1_000_000_000 / self.units_per_second;
        Duration::new(secs as u64, nanos as u32)
    }
}

impl Default for Interface {
    fn default() -> Self {
        Interface {
            linktype: DataLink::ETHERNET,
            units_per_second: Self::DEFAULT_UNITS_PER_SECOND,
        }
    }
}

/// Timestamp units per second for an `if_tsresol` value: a negative power of
/// ten, or of two when the high bit is set.
fn units_per_second(tsresol: u8) -> Option<u128> {
    let exponent = u32::from(tsresol & 0x7F);
    if tsresol & 0x80 != 0 {
        1u128.checked_shl(exponent)
    } else {
        10u128.checked_pow(exponent)
    }
}

impl PcapDissector {
    pub fn new() -> Self {
        PcapDissector { limit: None }
    }

    /// Only read the first `limit` frames of the capture.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Read a pcap or pcapng file to the end and decode every frame.
    pub fn dissect_pcap_file<P: AsRef<Path>>(&self, pcap_path: P) -> Result<CaptureDissection> {
        let path = pcap_path.as_ref();
        let (file, format) = open_capture(path)?;
        let file_size = file.metadata()?.len();
        let reader = BufReader::new(file);

        let mut tracker = StreamTracker::new();
        let mut bounds = TimeBounds::default();
        let records = match format {
            CaptureFormat::Pcap => self.read_legacy(reader, &mut tracker, &mut bounds)?,
            CaptureFormat::PcapNg => self.read_pcapng(reader, &mut tracker, &mut bounds)?,
        };

        let tcp_packets = records.iter().filter(|r| r.connection_id.is_some()).count() as u64;
        info!(
            "Decoded {} frames from {} ({} TCP packets in {} streams)",
            records.len(),
            path.display(),
            tcp_packets,
            tracker.stream_count()
        );

        Ok(CaptureDissection {
            file_info: FileInfo {
                filename: path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("unknown")
                    .to_string(),
                format,
                file_size,
                total_packets: records.len() as u64,
                tcp_packets,
                tcp_streams: tracker.stream_count(),
                capture_start_time: TimeBounds::rfc3339(bounds.first),
                capture_end_time: TimeBounds::rfc3339(bounds.last),
            },
            records,
        })
    }

    fn limit_reached(&self, count: usize) -> bool {
        self.limit.map_or(false, |limit| count >= limit)
    }

    fn read_legacy<R: Read>(
        &self,
        reader: R,
        tracker: &mut StreamTracker,
        bounds: &mut TimeBounds,
    ) -> Result<Vec<PacketRecord>> {
        let mut pcap_reader = PcapReader::new(reader).map_err(PcapError::Read)?;
        let datalink = pcap_reader.header().datalink;
        debug!("pcap link type: {:?}", datalink);

        let mut records = Vec::new();
        while let Some(pkt) = pcap_reader.next_packet() {
            if self.limit_reached(records.len()) {
                break;
            }
            let packet = match pkt {
                Ok(packet) => packet,
                Err(e) => {
                    warn!(
                        "Stopping after {} frames, capture is damaged: {}",
                        records.len(),
                        e
                    );
                    break;
                }
            };
            bounds.observe(packet.timestamp);
            let record = self.dissect_frame(
                tracker,
                datalink,
                &packet.data,
                Some(packet.timestamp),
                packet.orig_len,
                records.len() as u64 + 1,
            );
            records.push(record);
        }
        Ok(records)
    }

    fn read_pcapng<R: Read>(
        &self,
        reader: R,
        tracker: &mut StreamTracker,
        bounds: &mut TimeBounds,
    ) -> Result<Vec<PacketRecord>> {
        let mut pcapng_reader = PcapNgReader::new(reader).map_err(PcapError::Read)?;
        let mut interfaces: Vec<Interface> = Vec::new();

        let mut records = Vec::new();
        while let Some(block) = pcapng_reader.next_block() {
            if self.limit_reached(records.len()) {
                break;
            }
            let block = match block {
                Ok(block) => block,
                Err(e) => {
                    warn!(
                        "Stopping after {} frames, capture is damaged: {}",
                        records.len(),
                        e
                    );
                    break;
                }
            };
            let frame_number = records.len() as u64 + 1;
            match block {
                // interface ids restart with every section
                Block::SectionHeader(_) => interfaces.clear(),
                Block::InterfaceDescription(idb) => {
                    let interface = Interface::from_block(&idb);
                    debug!(
                        "pcapng interface {}: {:?}, {} units/s",
                        interfaces.len(),
                        interface.linktype,
                        interface.units_per_second
                    );
                    interfaces.push(interface);
                }
                Block::EnhancedPacket(epb) => {
                    let interface = match interfaces.get(epb.interface_id as usize) {
                        Some(interface) => *interface,
                        None => {
                            debug!(
                                "Frame {} refers to unknown interface {}",
                                frame_number, epb.interface_id
                            );
                            Interface::default()
                        }
                    };
                    let timestamp = interface.timestamp(epb.timestamp);
                    bounds.observe(timestamp);
                    records.push(self.dissect_frame(
                        tracker,
                        interface.linktype,
                        &epb.data,
                        Some(timestamp),
                        epb.original_len,
                        frame_number,
                    ));
                }
                Block::SimplePacket(spb) => {
                    let datalink = interfaces.first().map_or(DataLink::ETHERNET, |i| i.linktype);
                    records.push(self.dissect_frame(
                        tracker,
                        datalink,
                        &spb.data,
                        None,
                        spb.original_len,
                        frame_number,
                    ));
                }
                _ => {}
            }
        }
        Ok(records)
    }

    /// Decode one captured frame into a record. Frames that do not carry a
    /// complete TCP header get no connection id.
    fn dissect_frame(
        &self,
        tracker: &mut StreamTracker,
        datalink: DataLink,
        packet_data: &[u8],
        timestamp: Option<Duration>,
        orig_len: u32,
        frame_number: u64,
    ) -> PacketRecord {
        let segment = match datalink {
            DataLink::ETHERNET => self.parse_ethernet(packet_data),
            DataLink::RAW | DataLink::IPV4 | DataLink::IPV6 => self.parse_raw_ip(packet_data),
            DataLink::LINUX_SLL => self.parse_linux_sll(packet_data),
            _ => None,
        };

        PacketRecord {
            frame_number,
            timestamp: timestamp.map(|ts| ts.as_secs_f64()),
            connection_id: segment.map(|s| tracker.assign(&s)),
            length: Some(orig_len as u64),
        }
    }

    fn parse_ethernet(&self, packet_data: &[u8]) -> Option<TcpSegment> {
        if packet_data.len() < 14 {
            return None;
        }
        let mut ethertype = u16::from_be_bytes([packet_data[12], packet_data[13]]);
        let mut offset = 14;

        // 802.1Q / 802.1ad tags
        while ethertype == ETHERTYPE_VLAN || ethertype == ETHERTYPE_QINQ {
            if packet_data.len() < offset + 4 {
                return None;
            }
            ethertype = u16::from_be_bytes([packet_data[offset + 2], packet_data[offset + 3]]);
            offset += 4;
        }
        self.parse_network(ethertype, &packet_data[offset..])
    }

    fn parse_linux_sll(&self, packet_data: &[u8]) -> Option<TcpSegment> {
        if packet_data.len() < 16 {
            return None;
        }
        let protocol = u16::from_be_bytes([packet_data[14], packet_data[15]]);
        self.parse_network(protocol, &packet_data[16..])
    }

    fn parse_raw_ip(&self, ip_data: &[u8]) -> Option<TcpSegment> {
        match ip_data.first()? >> 4 {
            4 => self.parse_ipv4(ip_data),
            6 => self.parse_ipv6(ip_data),
            _ => None,
        }
    }

    fn parse_network(&self, ethertype: u16, ip_data: &[u8]) -> Option<TcpSegment> {
        match ethertype {
            ETHERTYPE_IPV4 => self.parse_ipv4(ip_data),
            ETHERTYPE_IPV6 => self.parse_ipv6(ip_data),
            _ => None,
        }
    }

    fn parse_ipv4(&self, ip_data: &[u8]) -> Option<TcpSegment> {
        if ip_data.len() < 20 || ip_data[0] >> 4 != 4 {
            return None;
        }
        let header_len = ((ip_data[0] & 0x0F) as usize) * 4;
        if header_len < 20 || ip_data.len() < header_len {
            return None;
        }
        // Only the first fragment carries the TCP header
        let fragment_offset = u16::from_be_bytes([ip_data[6], ip_data[7]]) & 0x1FFF;
        if fragment_offset != 0 || ip_data[9] != IP_PROTO_TCP {
            return None;
        }

        let src = Ipv4Addr::new(ip_data[12], ip_data[13], ip_data[14], ip_data[15]);
        let dst = Ipv4Addr::new(ip_data[16], ip_data[17], ip_data[18], ip_data[19]);
        self.parse_tcp(IpAddr::V4(src), IpAddr::V4(dst), &ip_data[header_len..])
    }

    fn parse_ipv6(&self, ipv6_data: &[u8]) -> Option<TcpSegment> {
        if ipv6_data.len() < 40 || ipv6_data[0] >> 4 != 6 {
            return None;
        }
        let mut src = [0u8; 16];
        let mut dst = [0u8; 16];
        src.copy_from_slice(&ipv6_data[8..24]);
        dst.copy_from_slice(&ipv6_data[24..40]);

        let mut next_header = ipv6_data[6];
        let mut offset = 40;
        loop {
            match next_header {
                IP_PROTO_TCP => {
                    return self.parse_tcp(
                        IpAddr::V6(Ipv6Addr::from(src)),
                        IpAddr::V6(Ipv6Addr::from(dst)),
                        &ipv6_data[offset..],
                    );
                }
                // hop-by-hop, routing, destination options
                0 | 43 | 60 => {
                    if ipv6_data.len() < offset + 2 {
                        return None;
                    }
                    next_header = ipv6_data[offset];
                    offset += (ipv6_data[offset + 1] as usize + 1) * 8;
                }
                // fragment
                44 => {
                    if ipv6_data.len() < offset + 8 {
                        return None;
                    }
                    let fragment_offset =
                        u16::from_be_bytes([ipv6_data[offset + 2], ipv6_data[offset + 3]]) >> 3;
                    if fragment_offset != 0 {
                        return None;
                    }
                    next_header = ipv6_data[offset];
                    offset += 8;
                }
                _ => return None,
            }
            if offset > ipv6_data.len() {
                return None;
            }
        }
    }

    fn parse_tcp(&self, src_ip: IpAddr, dst_ip: IpAddr, tcp_data: &[u8]) -> Option<TcpSegment> {
        if tcp_data.len() < 20 {
            return None;
        }
        let header_len = ((tcp_data[12] & 0xF0) >> 4) as usize * 4;
        if header_len < 20 {
            return None;
        }

        Some(TcpSegment {
            src_ip,
            src_port: u16::from_be_bytes([tcp_data[0], tcp_data[1]]),
            dst_ip,
            dst_port: u16::from_be_bytes([tcp_data[2], tcp_data[3]]),
            flags: TcpFlags::from_byte(tcp_data[13]),
        })
    }
}

/// Open the capture and sniff its format from the magic number.
fn open_capture(path: &Path) -> Result<(File, CaptureFormat)> {
    let mut file = File::open(path).map_err(|e| PcapError::FileNotFound {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let mut magic = [0u8; 4];
    file.read_exact(&mut magic)
        .map_err(|_| PcapError::InvalidFormat {
            reason: "file too short to read magic number".to_string(),
        })?;
    file.seek(SeekFrom::Start(0))?;

    let format = match magic {
        // microsecond and nanosecond pcap, either byte order
        [0xd4, 0xc3, 0xb2, 0xa1]
        | [0xa1, 0xb2, 0xc3, 0xd4]
        | [0x4d, 0x3c, 0xb2, 0xa1]
        | [0xa1, 0xb2, 0x3c, 0x4d] => CaptureFormat::Pcap,
        [0x0a, 0x0d, 0x0d, 0x0a] => CaptureFormat::PcapNg,
        _ => {
            return Err(PcapError::InvalidFormat {
                reason: format!("unknown magic number {:02x?}", magic),
            }
            .into())
        }
    };
    Ok((file, format))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet_capture::ConnectionId;

    fn tcp_header(src_port: u16, dst_port: u16, flags: u8) -> Vec<u8> {
        let mut tcp = vec![0u8; 20];
        tcp[0..2].copy_from_slice(&src_port.to_be_bytes());
        tcp[2..4].copy_from_slice(&dst_port.to_be_bytes());
        tcp[12] = 5 << 4;
        tcp[13] = flags;
        tcp
    }

    fn ipv4_tcp(src_port: u16, dst_port: u16, protocol: u8) -> Vec<u8> {
        let mut ip = vec![0u8; 20];
        ip[0] = 0x45;
        ip[9] = protocol;
        ip[12..16].copy_from_slice(&[10, 0, 0, 2]);
        ip[16..20].copy_from_slice(&[10, 0, 0, 1]);
        ip.extend(tcp_header(src_port, dst_port, 0x10));
        ip
    }

    fn ethernet(ethertype: u16, payload: &[u8]) -> Vec<u8> {
        let mut frame = vec![0u8; 12];
        frame.extend_from_slice(&ethertype.to_be_bytes());
        frame.extend_from_slice(payload);
        frame
    }

    fn record_for(datalink: DataLink, data: &[u8], tracker: &mut StreamTracker) -> PacketRecord {
        PcapDissector::new().dissect_frame(
            tracker,
            datalink,
            data,
            Some(Duration::from_millis(1500)),
            data.len() as u32,
            1,
        )
    }

    #[test]
    fn test_ethernet_ipv4_tcp_gets_stream() {
        let mut tracker = StreamTracker::new();
        let frame = ethernet(ETHERTYPE_IPV4, &ipv4_tcp(51000, 80, IP_PROTO_TCP));
        let record = record_for(DataLink::ETHERNET, &frame, &mut tracker);
        assert_eq!(record.connection_id, Some(ConnectionId(0)));
        assert_eq!(record.timestamp, Some(1.5));
        assert_eq!(record.length, Some(frame.len() as u64));
    }

    #[test]
    fn test_vlan_tagged_frame() {
        let mut tracker = StreamTracker::new();
        let mut payload = vec![0x00, 0x05];
        payload.extend_from_slice(&ETHERTYPE_IPV4.to_be_bytes());
        payload.extend(ipv4_tcp(51000, 80, IP_PROTO_TCP));
        let frame = ethernet(ETHERTYPE_VLAN, &payload);
        let record = record_for(DataLink::ETHERNET, &frame, &mut tracker);
        assert_eq!(record.connection_id, Some(ConnectionId(0)));
    }

    #[test]
    fn test_udp_has_no_connection() {
        let mut tracker = StreamTracker::new();
        let frame = ethernet(ETHERTYPE_IPV4, &ipv4_tcp(53000, 53, 17));
        let record = record_for(DataLink::ETHERNET, &frame, &mut tracker);
        assert_eq!(record.connection_id, None);
        assert!(record.decode().is_none());
    }

    #[test]
    fn test_truncated_tcp_header_has_no_connection() {
        let mut tracker = StreamTracker::new();
        let mut ip = ipv4_tcp(51000, 80, IP_PROTO_TCP);
        ip.truncate(30);
        let frame = ethernet(ETHERTYPE_IPV4, &ip);
        assert_eq!(record_for(DataLink::ETHERNET, &frame, &mut tracker).connection_id, None);
        assert_eq!(record_for(DataLink::ETHERNET, &[0u8; 10], &mut tracker).connection_id, None);
    }

    #[test]
    fn test_raw_ipv6_with_extension_header() {
        let mut tracker = StreamTracker::new();
        let mut ip = vec![0u8; 40];
        ip[0] = 0x60;
        ip[6] = 0; // hop-by-hop
        ip[23] = 2;
        ip[39] = 1;
        let mut hop_by_hop = vec![0u8; 8];
        hop_by_hop[0] = IP_PROTO_TCP;
        ip.extend(hop_by_hop);
        ip.extend(tcp_header(40000, 443, 0x02));
        let record = record_for(DataLink::RAW, &ip, &mut tracker);
        assert_eq!(record.connection_id, Some(ConnectionId(0)));
    }

    #[test]
    fn test_linux_sll_frame() {
        let mut tracker = StreamTracker::new();
        let mut frame = vec![0u8; 14];
        frame.extend_from_slice(&ETHERTYPE_IPV4.to_be_bytes());
        frame.extend(ipv4_tcp(51000, 80, IP_PROTO_TCP));
        let record = record_for(DataLink::LINUX_SLL, &frame, &mut tracker);
        assert_eq!(record.connection_id, Some(ConnectionId(0)));
    }

    #[test]
    fn test_tsresol_units() {
        assert_eq!(units_per_second(6), Some(1_000_000));
        assert_eq!(units_per_second(9), Some(1_000_000_000));
        assert_eq!(units_per_second(0x80 | 10), Some(1024));
        assert_eq!(units_per_second(0x80 | 127), Some(1u128 << 127));
        assert_eq!(units_per_second(39), None);
    }

    #[test]
    fn test_interface_rescales_epb_timestamps() {
        let mut idb = InterfaceDescriptionBlock::new(DataLink::ETHERNET, 0xFFFF);
        let micro = Interface::from_block(&idb);
        assert_eq!(micro.units_per_second, 1_000_000);
        // raw value 1_700_000_000_250_000 microseconds
        let raw = Duration::from_nanos(1_700_000_000_250_000);
        assert_eq!(micro.timestamp(raw), Duration::from_millis(1_700_000_000_250));

        idb.options.push(InterfaceDescriptionOption::IfTsResol(9));
        let nano = Interface::from_block(&idb);
        assert_eq!(nano.timestamp(raw), raw);

        idb.options = vec![InterfaceDescriptionOption::IfTsResol(0x80 | 1)];
        let half = Interface::from_block(&idb);
        assert_eq!(half.timestamp(Duration::from_nanos(3)), Duration::from_millis(1500));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = PcapDissector::new().dissect_pcap_file("nonexistent.pcap");
        assert!(matches!(
            result,
            Err(crate::Error::Pcap(PcapError::FileNotFound { .. }))
        ));
    }
}
