//! caprewrite - rewrite addresses and timestamps in legacy pcap captures.
//!
//! Each record is read, its timestamp rebased, its framing classified and its
//! MAC/IPv4 fields (Ethernet header, ARP payload, IPv4 header) substituted in
//! place before it is written to the new capture. Frame lengths never change
//! and checksums are not recomputed.
//!
//! - [`config`]: command line surface and validated configuration
//! - [`frame`]: VLAN/QinQ detection and EtherType lookup
//! - [`rewrite`]: fixed-width address substitution
//! - [`timestamp`]: date rebase and time-of-day shifts
//! - [`pcap_io`]: legacy pcap reader and writer
//! - [`pipeline`]: per-record orchestration and counters

pub mod address;
pub mod config;
pub mod error;
pub mod frame;
pub mod pcap_io;
pub mod pipeline;
pub mod rewrite;
pub mod timestamp;

pub use config::Config;
pub use error::{Error, Result};
