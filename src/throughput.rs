// pcap-streamrate/src/throughput.rs
//! Fixed-width throughput binning for a single connection.
//!
//! Timestamps are normalized so that the connection's first packet sits at
//! offset 0. Offsets and bin widths are in seconds, values in bits per second.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::packet_capture::{ConnectionId, DecodedPacket};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughputBinSeries {
    pub connection_id: ConnectionId,
    pub bin_width: f64,
    pub values_bps: Vec<f64>,
    /// Start offset of each bin, same length as `values_bps`
    pub time_offsets: Vec<f64>,
    /// Closing boundary of the series; equals the connection's duration
    pub end_offset: f64,
}

impl ThroughputBinSeries {
    pub fn bin_count(&self) -> usize {
        self.values_bps.len()
    }

    /// Time between the first and the last packet of the connection.
    pub fn duration(&self) -> f64 {
        self.end_offset
    }

    /// All bin boundaries including the closing one.
    pub fn boundaries(&self) -> Vec<f64> {
        let mut boundaries = self.time_offsets.clone();
        boundaries.push(self.end_offset);
        boundaries
    }

    /// Bytes represented by the series.
    pub fn total_bytes(&self) -> f64 {
        self.values_bps.iter().sum::<f64>() * self.bin_width / 8.0
    }

    pub fn mean_bps(&self) -> f64 {
        if self.values_bps.is_empty() {
            return 0.0;
        }
        self.values_bps.iter().sum::<f64>() / self.values_bps.len() as f64
    }

    pub fn peak_bps(&self) -> f64 {
        self.values_bps.iter().copied().fold(0.0, f64::max)
    }
}

/// Upper bound on the bins of one connection. A single frame with a bogus
/// timestamp would otherwise stretch the series over years.
pub const MAX_BINS_PER_CONNECTION: usize = 10_000_000;

/// `num + 1` evenly spaced points from 0 to `end`, both ends included.
fn linspace(end: f64, num: usize) -> Vec<f64> {
    (0..=num).map(|i| end * i as f64 / num as f64).collect()
}

/// Bin one connection's packets into a throughput series.
///
/// The number of bins is `max(floor(duration / w), 1) + 1`, so even a single
/// packet produces a usable two-bin series. Bin start offsets come from
/// `linspace(0, duration, num_bins + 1)` without its closing point.
pub fn bin_throughput(
    connection_id: ConnectionId,
    packets: &[DecodedPacket],
    bin_width: f64,
) -> Result<ThroughputBinSeries, AnalysisError> {
    if !bin_width.is_finite() || bin_width <= 0.0 {
        return Err(AnalysisError::InvalidBinWidth(bin_width));
    }
    if packets.is_empty() {
        return Err(AnalysisError::EmptyConnection {
            connection: connection_id.to_string(),
        });
    }

    let mut sorted = packets.to_vec();
    sorted.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    let start = sorted[0].timestamp;
    let end = sorted[sorted.len() - 1].timestamp;
    let duration = end - start;

    let whole_bins = (duration / bin_width).floor();
    if whole_bins >= MAX_BINS_PER_CONNECTION as f64 {
        warn!(
            "Connection {} spans {:.1} s, too long for {} s bins",
            connection_id, duration, bin_width
        );
        return Err(AnalysisError::TooManyBins {
            connection: connection_id.to_string(),
            duration,
            limit: MAX_BINS_PER_CONNECTION,
        });
    }
    let num_bins = (whole_bins as usize).max(1) + 1;
    let mut bytes_per_bin = vec![0u64; num_bins];
    for packet in &sorted {
        let bin_index = ((packet.timestamp - start) / bin_width).floor() as usize;
        // floating point can push the last packet one bin too far
        if let Some(bin) = bytes_per_bin.get_mut(bin_index) {
            *bin += packet.byte_length;
        }
    }

    let values_bps = bytes_per_bin
        .iter()
        .map(|&bytes| {
            if bytes == 0 {
                0.0
            } else {
                (bytes as f64 * 8.0) / bin_width
            }
        })
        .collect();

    let mut time_offsets = linspace(duration, num_bins);
    let end_offset = time_offsets.pop().unwrap_or(duration);

    Ok(ThroughputBinSeries {
        connection_id,
        bin_width,
        values_bps,
        time_offsets,
        end_offset,
    })
}
