// pcap-streamrate/src/overview.rs
//! Side-by-side comparison of several captures: how many packets each one
//! holds and how many TCP streams the session was spread over.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dissector::PcapDissector;
use crate::error::Result;
use crate::grouper::group_packets;
use crate::persistence::{classify_persistence, PersistenceVerdict};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverviewEntry {
    pub label: String,
    pub total_packets: u64,
    pub tcp_packets: u64,
    pub tcp_streams: usize,
    pub verdict: PersistenceVerdict,
}

/// Label used when none is given: the file name without its extension.
pub fn default_label(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("capture")
        .to_string()
}

pub fn summarize_capture<P: AsRef<Path>>(
    dissector: &PcapDissector,
    pcap_path: P,
    label: Option<&str>,
) -> Result<OverviewEntry> {
    let path = pcap_path.as_ref();
    let dissection = dissector.dissect_pcap_file(path)?;
    let group = group_packets(&dissection.records);
    let persistence = classify_persistence(&group);

    Ok(OverviewEntry {
        label: label.map_or_else(|| default_label(path), str::to_string),
        total_packets: dissection.file_info.total_packets,
        tcp_packets: group.total_packets() as u64,
        tcp_streams: persistence.connection_count,
        verdict: persistence.verdict,
    })
}

pub fn render_overview_table(entries: &[OverviewEntry]) -> String {
    let width = entries
        .iter()
        .map(|e| e.label.len())
        .max()
        .unwrap_or(0)
        .max("Capture".len());

    let mut out = format!(
        "{:<width$}  {:>10}  {:>10}  {:>7}  Verdict\n",
        "Capture",
        "Packets",
        "TCP pkts",
        "Streams",
        width = width
    );
    for entry in entries {
        out.push_str(&format!(
            "{:<width$}  {:>10}  {:>10}  {:>7}  {}\n",
            entry.label,
            entry.total_packets,
            entry.tcp_packets,
            entry.tcp_streams,
            entry.verdict,
            width = width
        ));
    }
    out
}
