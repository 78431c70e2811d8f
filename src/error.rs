// pcap-streamrate/src/error.rs
//! Error types for pcap-streamrate.

use thiserror::Error;

/// Main error type for capture analysis.
#[derive(Error, Debug)]
pub enum Error {
    /// Error opening or reading the capture file
    #[error("PCAP error: {0}")]
    Pcap(#[from] PcapError),

    /// Error inside the throughput estimator
    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    /// Invalid analysis parameters
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Error while drawing a chart
    #[error("Chart error: {0}")]
    Chart(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors related to capture file reading.
#[derive(Error, Debug)]
pub enum PcapError {
    /// File not found or not readable
    #[error("Cannot open capture file {path}: {reason}")]
    FileNotFound { path: String, reason: String },

    /// Not a pcap or pcapng file
    #[error("Invalid capture format: {reason}")]
    InvalidFormat { reason: String },

    /// Error reported by the pcap reader
    #[error("Read error: {0}")]
    Read(#[from] pcap_file::PcapError),
}

/// Errors raised by the binning core when called with unusable input.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// A connection with no packets cannot be binned
    #[error("connection {connection} has no packets")]
    EmptyConnection { connection: String },

    /// Bin width must be a positive, finite number of seconds
    #[error("bin width must be positive and finite, got {0}")]
    InvalidBinWidth(f64),

    /// The connection spans more bins than can be held in memory
    #[error("connection {connection} spans {duration} s, more than {limit} bins")]
    TooManyBins {
        connection: String,
        duration: f64,
        limit: usize,
    },
}

/// Errors related to analysis configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("time window must be a positive number of seconds, got {0}")]
    InvalidBinWidth(f64),

    #[error("maximum number of plotted connections must be at least 1")]
    InvalidMaxConnections,
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
