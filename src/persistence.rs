// pcap-streamrate/src/persistence.rs
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::grouper::ConnectionGroup;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceVerdict {
    /// The capture holds no TCP connection at all
    NoStreams,
    PersistentSingleConnection,
    MultipleConnections,
}

impl PersistenceVerdict {
    pub fn from_count(connection_count: usize) -> Self {
        match connection_count {
            0 => PersistenceVerdict::NoStreams,
            1 => PersistenceVerdict::PersistentSingleConnection,
            _ => PersistenceVerdict::MultipleConnections,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PersistenceVerdict::NoStreams => "no streams found",
            PersistenceVerdict::PersistentSingleConnection => "persistent single connection",
            PersistenceVerdict::MultipleConnections => {
                "multiple connections (non-persistent or reused)"
            }
        }
    }
}

impl fmt::Display for PersistenceVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceReport {
    pub connection_count: usize,
    pub verdict: PersistenceVerdict,
}

/// Count every connection in the group and derive the verdict.
pub fn classify_persistence(group: &ConnectionGroup) -> PersistenceReport {
    let connection_count = group.len();
    PersistenceReport {
        connection_count,
        verdict: PersistenceVerdict::from_count(connection_count),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet_capture::{ConnectionId, DecodedPacket};

    fn group_with(connections: u64) -> ConnectionGroup {
        let mut group = ConnectionGroup::new();
        for id in 0..connections {
            group.insert(DecodedPacket {
                timestamp: id as f64,
                connection_id: ConnectionId(id),
                byte_length: 60,
            });
        }
        group
    }

    #[test]
    fn test_no_streams() {
        let report = classify_persistence(&group_with(0));
        assert_eq!(report.connection_count, 0);
        assert_eq!(report.verdict, PersistenceVerdict::NoStreams);
        assert_eq!(report.verdict.to_string(), "no streams found");
    }

    #[test]
    fn test_single_connection_is_persistent() {
        let report = classify_persistence(&group_with(1));
        assert_eq!(report.connection_count, 1);
        assert_eq!(report.verdict.as_str(), "persistent single connection");
    }

    #[test]
    fn test_two_connections() {
        let report = classify_persistence(&group_with(2));
        assert_eq!(report.connection_count, 2);
        assert_eq!(
            report.verdict.as_str(),
            "multiple connections (non-persistent or reused)"
        );
    }
}
