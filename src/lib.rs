// pcap-streamrate/src/lib.rs
//! Connection persistence and bit-rate analysis of video streaming captures.
//!
//! A capture is decoded into per-frame records, TCP packets are grouped by
//! stream, each stream is binned into a throughput series, and the series
//! are stitched end to end into one cumulative timeline.
use std::path::Path;

mod analysis;
pub use analysis::*;

pub mod charts;

mod config;
pub use config::*;

mod dissector;
pub use dissector::*;

mod error;
pub use error::*;

mod grouper;
pub use grouper::*;

pub mod overview;

mod packet_capture;
pub use packet_capture::*;

mod persistence;
pub use persistence::*;

pub mod report;

pub mod stream;

mod throughput;
pub use throughput::*;

mod timeline;
pub use timeline::*;

/// Analyze a capture with the default 0.2s bins and 31 connection cap and
/// return the JSON report.
pub fn analyze_pcap_to_json<P: AsRef<Path>>(pcap_path: P) -> Result<String> {
    let analysis = analyze_pcap(pcap_path, &AnalysisConfig::default())?;
    Ok(serde_json::to_string_pretty(&analysis)?)
}
