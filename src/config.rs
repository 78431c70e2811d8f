// pcap-streamrate/src/config.rs
//! Analysis parameters.
//!
//! Every component receives these values explicitly; nothing reads them from
//! global state.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default throughput bin width in seconds (200ms).
pub const DEFAULT_BIN_WIDTH_SECS: f64 = 0.2;

/// Default cap on the number of connections that get binned, charted and stitched.
pub const DEFAULT_MAX_CONNECTIONS: usize = 31;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Width of one throughput bin, in seconds
    pub bin_width: f64,
    /// Connections beyond this many (in first-seen order) are left out of
    /// the per-connection and cumulative outputs
    pub max_connections: usize,
}

impl AnalysisConfig {
    pub fn new(bin_width: f64, max_connections: usize) -> Result<Self, ConfigError> {
        if !bin_width.is_finite() || bin_width <= 0.0 {
            return Err(ConfigError::InvalidBinWidth(bin_width));
        }
        if max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections);
        }
        Ok(AnalysisConfig {
            bin_width,
            max_connections,
        })
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            bin_width: DEFAULT_BIN_WIDTH_SECS,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

/// Output size of rendered charts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartOptions {
    pub width: u32,
    pub height: u32,
}

impl Default for ChartOptions {
    fn default() -> Self {
        ChartOptions {
            width: 1000,
            height: 600,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AnalysisConfig::default();
        assert_eq!(config.bin_width, 0.2);
        assert_eq!(config.max_connections, 31);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert_eq!(
            AnalysisConfig::new(0.0, 31),
            Err(ConfigError::InvalidBinWidth(0.0))
        );
        assert!(AnalysisConfig::new(-1.0, 31).is_err());
        assert!(AnalysisConfig::new(f64::NAN, 31).is_err());
        assert_eq!(
            AnalysisConfig::new(0.5, 0),
            Err(ConfigError::InvalidMaxConnections)
        );
        assert!(AnalysisConfig::new(0.5, 1).is_ok());
    }
}
