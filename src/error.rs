//! Error types for caprewrite.

use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Main error type for a rewrite run.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid argument: {0}")]
    Parse(#[from] ParseError),

    #[error("cannot open {path:?}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot create {path:?}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("pcap error: {0}")]
    Pcap(String),

    #[error("unsupported link type {0}, only Ethernet captures can be rewritten")]
    UnsupportedLinkType(i32),

    #[error("record {record} is malformed")]
    MalformedFrame {
        record: u64,
        #[source]
        source: FrameError,
    },

    #[error("record {record}: rebased timestamp overflows the calendar")]
    RebaseOverflow { record: u64 },

    #[error("timestamp {0} is outside the range a pcap record can hold")]
    TimestampOutOfRange(DateTime<Utc>),
}

/// Option combinations that cannot be run.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("a source capture file is required (--file)")]
    MissingSource,

    #[error("a destination capture file is required (--file-new)")]
    MissingDestination,

    #[error("source and destination filenames are the same")]
    SameFile,

    #[error("--mac and --mac-new must be supplied together")]
    UnpairedMac,

    #[error("--ip4 and --ip4-new must be supplied together")]
    UnpairedIpv4,

    #[error("month must be between 1 and 12, got {0}")]
    InvalidMonth(u32),

    #[error("day must be between 1 and 31, got {0}")]
    InvalidDay(u32),
}

/// Malformed values supplied on the command line.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid MAC address {0:?}, expected AA:BB:CC:DD:EE:FF")]
    InvalidMac(String),

    #[error("invalid IPv4 address {0:?}")]
    InvalidIpv4(String),

    #[error("invalid time shift {0:?}, expected [+-]NhNmNs")]
    InvalidTimeShift(String),
}

/// A frame too short for the bytes a step needs to read.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum FrameError {
    #[error("frame of {len} bytes is truncated, {needed} bytes required")]
    Truncated { len: usize, needed: usize },
}

impl Error {
    /// Errors raised while validating options, before any file is touched.
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Parse(_))
    }
}


/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;
