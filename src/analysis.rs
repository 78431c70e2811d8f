// pcap-streamrate/src/analysis.rs
//! Runs grouping, persistence classification, binning and stitching over a
//! decoded capture.

use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;
use crate::dissector::{FileInfo, PcapDissector};
use crate::error::Result;
use crate::grouper::{group_packets, ConnectionGroup};
use crate::packet_capture::ConnectionId;
use crate::persistence::{classify_persistence, PersistenceReport};
use crate::throughput::{bin_throughput, ThroughputBinSeries};
use crate::timeline::{CumulativeTimeline, TimelineStitcher};

/// Bit-rate results for one connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionAnalysis {
    /// 1-based position in first-seen order, used for titles
    pub index: usize,
    pub connection_id: ConnectionId,
    pub packet_count: usize,
    pub total_bytes: u64,
    pub duration: f64,
    pub series: ThroughputBinSeries,
}

/// Results for a grouped set of packets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamAnalysis {
    pub config: AnalysisConfig,
    pub persistence: PersistenceReport,
    pub skipped_records: usize,
    /// Connections within the cap, in first-seen order
    pub connections: Vec<ConnectionAnalysis>,
    pub timeline: CumulativeTimeline,
}

impl StreamAnalysis {
    /// Connections left out of the per-connection and cumulative outputs.
    pub fn excluded_connections(&self) -> usize {
        self.timeline.excluded_connections
    }
}

/// Full analysis of a capture file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureAnalysis {
    pub file_info: FileInfo,
    #[serde(flatten)]
    pub streams: StreamAnalysis,
}

pub fn analyze_group(group: &ConnectionGroup, config: &AnalysisConfig) -> Result<StreamAnalysis> {
    let persistence = classify_persistence(group);
    let mut stitcher = TimelineStitcher::new(config.max_connections);
    let mut connections = Vec::new();

    for (position, (connection_id, packets)) in group.iter().enumerate() {
        let series = bin_throughput(connection_id, packets, config.bin_width)?;
        if !stitcher.push(&series) {
            continue;
        }
        connections.push(ConnectionAnalysis {
            index: position + 1,
            connection_id,
            packet_count: packets.len(),
            total_bytes: packets.iter().map(|p| p.byte_length).sum(),
            duration: series.duration(),
            series,
        });
    }

    let timeline = stitcher.finish();
    if timeline.is_truncated() {
        info!(
            "Plotting the first {} of {} connections",
            connections.len(),
            persistence.connection_count
        );
    }

    Ok(StreamAnalysis {
        config: *config,
        persistence,
        skipped_records: group.skipped_records(),
        connections,
        timeline,
    })
}

/// Decode, group and analyze a capture file.
pub fn analyze_pcap<P: AsRef<Path>>(pcap_path: P, config: &AnalysisConfig) -> Result<CaptureAnalysis> {
    analyze_pcap_with(&PcapDissector::new(), pcap_path, config)
}

pub fn analyze_pcap_with<P: AsRef<Path>>(
    dissector: &PcapDissector,
    pcap_path: P,
    config: &AnalysisConfig,
) -> Result<CaptureAnalysis> {
    let dissection = dissector.dissect_pcap_file(pcap_path)?;
    let group = group_packets(&dissection.records);
    info!(
        "Grouped {} packets into {} connections ({} records skipped)",
        group.total_packets(),
        group.len(),
        group.skipped_records()
    );
    let streams = analyze_group(&group, config)?;
    Ok(CaptureAnalysis {
        file_info: dissection.file_info,
        streams,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet_capture::DecodedPacket;
    use crate::persistence::PersistenceVerdict;

    fn group_of(connections: u64, packets_each: u64) -> ConnectionGroup {
        let mut group = ConnectionGroup::new();
        for id in 0..connections {
            for n in 0..packets_each {
                group.insert(DecodedPacket {
                    timestamp: 1000.0 + id as f64 * 10.0 + n as f64 * 0.1,
                    connection_id: ConnectionId(id),
                    byte_length: 1500,
                });
            }
        }
        group
    }

    #[test]
    fn test_empty_group() {
        let analysis = analyze_group(&ConnectionGroup::new(), &AnalysisConfig::default()).unwrap();
        assert_eq!(analysis.persistence.verdict, PersistenceVerdict::NoStreams);
        assert!(analysis.connections.is_empty());
        assert!(analysis.timeline.values_bps.is_empty());
        assert_eq!(analysis.timeline.end_offset, 0.0);
    }

    #[test]
    fn test_cap_applies_to_every_output() {
        let group = group_of(40, 3);
        let config = AnalysisConfig::new(0.2, 31).unwrap();
        let analysis = analyze_group(&group, &config).unwrap();

        assert_eq!(analysis.persistence.connection_count, 40);
        assert_eq!(analysis.connections.len(), 31);
        assert_eq!(analysis.timeline.segments.len(), 31);
        assert_eq!(analysis.excluded_connections(), 9);

        let durations: f64 = analysis.connections.iter().map(|c| c.duration).sum();
        assert!((analysis.timeline.end_offset - durations).abs() < 1e-9);
        let bins: usize = analysis.connections.iter().map(|c| c.series.bin_count()).sum();
        assert_eq!(analysis.timeline.values_bps.len(), bins);
    }

    #[test]
    fn test_listed_connections_match_stitched_segments() {
        let config = AnalysisConfig::new(0.2, 2).unwrap();
        let analysis = analyze_group(&group_of(5, 2), &config).unwrap();

        let listed: Vec<ConnectionId> = analysis.connections.iter().map(|c| c.connection_id).collect();
        let stitched: Vec<ConnectionId> = analysis
            .timeline
            .segments
            .iter()
            .map(|s| s.connection_id)
            .collect();
        assert_eq!(listed, vec![ConnectionId(0), ConnectionId(1)]);
        assert_eq!(listed, stitched);
        assert_eq!(analysis.excluded_connections(), 3);
    }

    #[test]
    fn test_connection_details() {
        let analysis = analyze_group(&group_of(2, 5), &AnalysisConfig::default()).unwrap();
        assert_eq!(
            analysis.persistence.verdict,
            PersistenceVerdict::MultipleConnections
        );
        let first = &analysis.connections[0];
        assert_eq!(first.index, 1);
        assert_eq!(first.connection_id, ConnectionId(0));
        assert_eq!(first.packet_count, 5);
        assert_eq!(first.total_bytes, 7500);
        assert!((first.duration - 0.4).abs() < 1e-9);
        assert_eq!(analysis.connections[1].index, 2);
    }
}
