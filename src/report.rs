// pcap-streamrate/src/report.rs
//! Text, JSON and CSV renderings of a capture analysis.

use std::fmt::Write;

use crate::analysis::{CaptureAnalysis, StreamAnalysis};
use crate::error::Result;
use crate::persistence::PersistenceVerdict;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Text,
    Json,
    Csv,
}

impl ReportFormat {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "text" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            "csv" => Some(ReportFormat::Csv),
            _ => None,
        }
    }
}

pub fn render(analysis: &CaptureAnalysis, format: ReportFormat) -> Result<String> {
    match format {
        ReportFormat::Text => Ok(render_text(analysis)),
        ReportFormat::Json => Ok(serde_json::to_string_pretty(analysis)?),
        ReportFormat::Csv => Ok(render_csv(&analysis.streams)),
    }
}

fn truncation_notice(streams: &StreamAnalysis) -> Option<String> {
    if streams.excluded_connections() == 0 {
        return None;
    }
    Some(format!(
        "Only the first {} of {} connections are plotted; {} connections are excluded from the per-connection and cumulative results.",
        streams.connections.len(),
        streams.persistence.connection_count,
        streams.excluded_connections()
    ))
}

/// Human readable summary, the same content the CLI prints by default.
pub fn render_text(analysis: &CaptureAnalysis) -> String {
    let streams = &analysis.streams;
    let info = &analysis.file_info;
    let mut out = String::new();

    // writeln! into a String cannot fail
    let _ = writeln!(out, "Capture: {}", info.filename);
    let _ = writeln!(
        out,
        "Frames: {} ({} TCP, {} skipped)",
        info.total_packets, info.tcp_packets, streams.skipped_records
    );
    if let (Some(start), Some(end)) = (&info.capture_start_time, &info.capture_end_time) {
        let _ = writeln!(out, "Captured: {} .. {}", start, end);
    }

    let _ = writeln!(out, "\n----- Connection Persistence -----");
    let _ = writeln!(
        out,
        "TCP connections found: {}",
        streams.persistence.connection_count
    );
    let _ = writeln!(out, "Verdict: {}", streams.persistence.verdict);
    if streams.persistence.verdict == PersistenceVerdict::NoStreams {
        return out;
    }

    let _ = writeln!(
        out,
        "\n----- Bit-Rate ({}s bins) -----",
        streams.config.bin_width
    );
    for connection in &streams.connections {
        let _ = writeln!(
            out,
            "Connection {} (stream {}): {} packets over {:.2} s, {} bytes, mean {:.0} bps, peak {:.0} bps",
            connection.index,
            connection.connection_id,
            connection.packet_count,
            connection.duration,
            connection.total_bytes,
            connection.series.mean_bps(),
            connection.series.peak_bps()
        );
    }
    let _ = writeln!(
        out,
        "Cumulative timeline: {} bins over {:.2} s",
        streams.timeline.values_bps.len(),
        streams.timeline.end_offset
    );
    if let Some(notice) = truncation_notice(streams) {
        let _ = writeln!(out, "{}", notice);
    }
    let _ = writeln!(
        out,
        "Inspect the charts: steady throughput suggests constant bit-rate streaming, fluctuating throughput suggests variable bit-rate."
    );
    out
}

/// One row per bin for every connection, followed by the cumulative timeline.
pub fn render_csv(streams: &StreamAnalysis) -> String {
    let mut out = String::new();
    if let Some(notice) = truncation_notice(streams) {
        let _ = writeln!(out, "# {}", notice);
    }
    let _ = writeln!(out, "series,connection_index,connection_id,offset_s,throughput_bps");
    for connection in &streams.connections {
        let series = &connection.series;
        for (offset, value) in series.time_offsets.iter().zip(&series.values_bps) {
            let _ = writeln!(
                out,
                "connection,{},{},{},{}",
                connection.index, connection.connection_id, offset, value
            );
        }
    }
    for (position, segment) in streams.timeline.segments.iter().enumerate() {
        let bins = segment.first_bin..segment.first_bin + segment.bin_count;
        for bin in bins {
            let _ = writeln!(
                out,
                "cumulative,{},{},{},{}",
                position + 1,
                segment.connection_id,
                streams.timeline.time_offsets[bin],
                streams.timeline.values_bps[bin]
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyze_group;
    use crate::config::AnalysisConfig;
    use crate::dissector::{CaptureFormat, FileInfo};
    use crate::grouper::ConnectionGroup;
    use crate::packet_capture::{ConnectionId, DecodedPacket};

    fn capture(connections: u64, max_connections: usize) -> CaptureAnalysis {
        let mut group = ConnectionGroup::new();
        for id in 0..connections {
            for n in 0..4 {
                group.insert(DecodedPacket {
                    timestamp: id as f64 * 5.0 + n as f64 * 0.3,
                    connection_id: ConnectionId(id),
                    byte_length: 1000,
                });
            }
        }
        let config = AnalysisConfig::new(0.2, max_connections).unwrap();
        CaptureAnalysis {
            file_info: FileInfo {
                filename: "session.pcap".to_string(),
                format: CaptureFormat::Pcap,
                file_size: 0,
                total_packets: connections * 4,
                tcp_packets: connections * 4,
                tcp_streams: connections,
                capture_start_time: None,
                capture_end_time: None,
            },
            streams: analyze_group(&group, &config).unwrap(),
        }
    }

    #[test]
    fn test_text_report_for_single_connection() {
        let text = render_text(&capture(1, 31));
        assert!(text.contains("TCP connections found: 1"));
        assert!(text.contains("Verdict: persistent single connection"));
        assert!(text.contains("Connection 1 (stream 0): 4 packets over 0.90 s"));
        assert!(!text.contains("Only the first"));
    }

    #[test]
    fn test_text_report_states_truncation() {
        let text = render_text(&capture(3, 2));
        assert!(text.contains("multiple connections (non-persistent or reused)"));
        assert!(text.contains("Only the first 2 of 3 connections are plotted"));
        assert!(!text.contains("Connection 3 "));
    }

    #[test]
    fn test_text_report_without_streams() {
        let text = render_text(&capture(0, 31));
        assert!(text.contains("Verdict: no streams found"));
        assert!(!text.contains("Bit-Rate"));
    }

    #[test]
    fn test_csv_rows() {
        let analysis = capture(2, 31);
        let csv = render_csv(&analysis.streams);
        let bins: usize = analysis
            .streams
            .connections
            .iter()
            .map(|c| c.series.bin_count())
            .sum();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "series,connection_index,connection_id,offset_s,throughput_bps");
        assert_eq!(lines.iter().filter(|l| l.starts_with("connection,")).count(), bins);
        assert_eq!(lines.iter().filter(|l| l.starts_with("cumulative,")).count(), bins);
    }

    #[test]
    fn test_json_report() {
        let json = render(&capture(1, 31), ReportFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["persistence"]["verdict"], "persistent_single_connection");
        assert_eq!(value["config"]["max_connections"], 31);
        assert_eq!(value["file_info"]["filename"], "session.pcap");
    }
}
