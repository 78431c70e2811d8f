// pcap-streamrate/src/timeline.rs
//! Stitch per-connection throughput series into one cumulative timeline.
//!
//! Each connection is placed right after the previous one ends, as if the
//! whole capture were a single ongoing transfer. Placement follows the order
//! in which series are pushed, so callers must push in a fixed order
//! (first-seen order of the connections).

use log::debug;
use serde::{Deserialize, Serialize};

use crate::packet_capture::ConnectionId;
use crate::throughput::ThroughputBinSeries;

/// Where one connection landed on the cumulative timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineSegment {
    pub connection_id: ConnectionId,
    pub start_offset: f64,
    pub end_offset: f64,
    /// Index of the connection's first bin in the cumulative sequence
    pub first_bin: usize,
    pub bin_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CumulativeTimeline {
    pub values_bps: Vec<f64>,
    pub time_offsets: Vec<f64>,
    /// Final cursor position: the summed durations of stitched connections
    pub end_offset: f64,
    pub segments: Vec<TimelineSegment>,
    /// Connections rejected because the cap was reached
    pub excluded_connections: usize,
}

impl CumulativeTimeline {
    pub fn is_truncated(&self) -> bool {
        self.excluded_connections > 0
    }
}

#[derive(Debug, Clone)]
pub struct TimelineStitcher {
    max_connections: usize,
    cursor: f64,
    timeline: CumulativeTimeline,
}

impl TimelineStitcher {
    pub fn new(max_connections: usize) -> Self {
        TimelineStitcher {
            max_connections,
            cursor: 0.0,
            timeline: CumulativeTimeline::default(),
        }
    }

    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    pub fn stitched_connections(&self) -> usize {
        self.timeline.segments.len()
    }

    /// Append a series after everything stitched so far. Returns `false`, and
    /// leaves the timeline untouched, once the connection cap is reached.
    pub fn push(&mut self, series: &ThroughputBinSeries) -> bool {
        if self.stitched_connections() >= self.max_connections {
            self.timeline.excluded_connections += 1;
            debug!(
                "Connection {} left out of the cumulative timeline (cap {})",
                series.connection_id, self.max_connections
            );
            return false;
        }

        let start_offset = self.cursor;
        let first_bin = self.timeline.values_bps.len();
        self.timeline
            .time_offsets
            .extend(series.time_offsets.iter().map(|offset| offset + start_offset));
        self.timeline.values_bps.extend_from_slice(&series.values_bps);
        self.cursor = start_offset + series.end_offset;

        self.timeline.segments.push(TimelineSegment {
            connection_id: series.connection_id,
            start_offset,
            end_offset: self.cursor,
            first_bin,
            bin_count: series.bin_count(),
        });
        true
    }

    pub fn finish(mut self) -> CumulativeTimeline {
        self.timeline.end_offset = self.cursor;
        self.timeline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet_capture::DecodedPacket;
    use crate::throughput::bin_throughput;

    const EPSILON: f64 = 1e-9;

    fn series_with_duration(id: u64, duration: f64, width: f64) -> ThroughputBinSeries {
        let packets = [
            DecodedPacket {
                timestamp: 50.0,
                connection_id: ConnectionId(id),
                byte_length: 1200,
            },
            DecodedPacket {
                timestamp: 50.0 + duration,
                connection_id: ConnectionId(id),
                byte_length: 800,
            },
        ];
        bin_throughput(ConnectionId(id), &packets, width).unwrap()
    }

    #[test]
    fn test_cursor_is_sum_of_durations() {
        let series = [
            series_with_duration(0, 1.0, 0.2),
            series_with_duration(1, 2.0, 0.2),
            series_with_duration(2, 0.5, 0.2),
        ];
        let mut stitcher = TimelineStitcher::new(31);
        for s in &series {
            assert!(stitcher.push(s));
        }
        assert!((stitcher.cursor() - 3.5).abs() < EPSILON);

        let timeline = stitcher.finish();
        let expected_len: usize = series.iter().map(|s| s.bin_count()).sum();
        assert_eq!(timeline.values_bps.len(), expected_len);
        assert_eq!(timeline.time_offsets.len(), expected_len);
        assert!((timeline.end_offset - 3.5).abs() < EPSILON);
        assert!(!timeline.is_truncated());
    }

    #[test]
    fn test_offsets_are_shifted_by_previous_durations() {
        let first = series_with_duration(0, 1.0, 0.5);
        let second = series_with_duration(1, 1.0, 0.5);
        let mut stitcher = TimelineStitcher::new(31);
        stitcher.push(&first);
        stitcher.push(&second);
        let timeline = stitcher.finish();

        let segment = &timeline.segments[1];
        assert_eq!(segment.connection_id, ConnectionId(1));
        assert_eq!(segment.first_bin, first.bin_count());
        assert!((segment.start_offset - 1.0).abs() < EPSILON);
        for (i, offset) in second.time_offsets.iter().enumerate() {
            let stitched = timeline.time_offsets[segment.first_bin + i];
            assert!((stitched - (offset + 1.0)).abs() < EPSILON);
        }
        assert!(timeline.time_offsets.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_cap_excludes_connections_from_arithmetic() {
        let mut stitcher = TimelineStitcher::new(31);
        let mut expected_len = 0;
        for id in 0..40u64 {
            let s = series_with_duration(id, 1.0, 0.2);
            let accepted = stitcher.push(&s);
            assert_eq!(accepted, id < 31);
            if accepted {
                expected_len += s.bin_count();
            }
        }
        let timeline = stitcher.finish();
        assert_eq!(timeline.segments.len(), 31);
        assert_eq!(timeline.excluded_connections, 9);
        assert_eq!(timeline.values_bps.len(), expected_len);
        assert!((timeline.end_offset - 31.0).abs() < 1e-6);
        assert!(timeline.is_truncated());
    }

    #[test]
    fn test_single_packet_series_does_not_move_cursor() {
        let single = bin_throughput(
            ConnectionId(0),
            &[DecodedPacket {
                timestamp: 3.0,
                connection_id: ConnectionId(0),
                byte_length: 1000,
            }],
            0.2,
        )
        .unwrap();
        let mut stitcher = TimelineStitcher::new(1);
        stitcher.push(&single);
        assert_eq!(stitcher.cursor(), 0.0);
        assert_eq!(stitcher.finish().values_bps, vec![40_000.0, 0.0]);
    }
}
