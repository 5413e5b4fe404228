//! Command line surface and the validated run configuration.

use std::path::PathBuf;

use clap::Parser;

use crate::address::{parse_ipv4, MacAddr};
use crate::error::{ConfigError, Error, Result};
use crate::rewrite::{AddressRewriter, Ipv4Substitution, MacSubstitution, Substitution};
use crate::timestamp::{DateTarget, TimeShift};

#[derive(Parser, Debug)]
#[command(
    name = "caprewrite",
    version,
    about = "Rewrite MAC and IPv4 addresses (including ARP payloads) and rebase timestamps in legacy .pcap captures"
)]
pub struct Cli {
    /// Filename of the source pcap file
    #[arg(short = 'f', long = "file", value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// Filename for the new pcap file
    #[arg(short = 'n', long = "file-new", value_name = "FILE")]
    pub file_new: Option<PathBuf>,

    /// The MAC address to change, in AA:BB:CC:DD:EE:FF format
    #[arg(long)]
    pub mac: Option<String>,

    /// The replacement MAC address, required if --mac is used
    #[arg(long = "mac-new")]
    pub mac_new: Option<String>,

    /// The IPv4 address to change
    #[arg(long = "ip4")]
    pub ip4: Option<String>,

    /// The replacement IPv4 address, required if --ip4 is used
    #[arg(long = "ip4-new")]
    pub ip4_new: Option<String>,

    /// Rebase to year (yyyy)
    #[arg(short = 'y', long)]
    pub year: Option<i32>,

    /// Rebase to month (mm)
    #[arg(short = 'm', long)]
    pub month: Option<u32>,

    /// Rebase to day (dd)
    #[arg(short = 'd', long)]
    pub day: Option<u32>,

    /// Shift the time of day (+/-00h00m00s), several values separated by commas
    #[arg(long = "time-shift", value_name = "SHIFTS", allow_hyphen_values = true)]
    pub time_shift: Option<String>,

    /// Write frames too short to rewrite through unchanged instead of aborting
    #[arg(long, default_value_t = false)]
    pub skip_malformed: bool,

    /// Print the final counters as JSON to stdout
    #[arg(long, default_value_t = false)]
    pub report: bool,

    /// Do not print progress dots
    #[arg(short, long, default_value_t = false)]
    pub quiet: bool,

    /// Enable debug logging
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

/// Everything a run needs, validated once and then only read.
#[derive(Debug, Clone)]
pub struct Config {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub mac: Option<MacSubstitution>,
    pub ipv4: Option<Ipv4Substitution>,
    pub date: DateTarget,
    pub time_shifts: Vec<TimeShift>,
    pub skip_malformed: bool,
    pub progress: bool,
}

impl Config {
    pub fn rewriter(&self) -> AddressRewriter {
        AddressRewriter::new(self.mac, self.ipv4)
    }
}

/// Both halves of an old/new option pair, or neither.
fn pair(old: Option<String>, new: Option<String>, unpaired: ConfigError) -> Result<Option<(String, String)>> {
    let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
    match (non_empty(old), non_empty(new)) {
        (Some(old), Some(new)) => Ok(Some((old, new))),
        (None, None) => Ok(None),
        _ => Err(unpaired.into()),
    }
}

impl TryFrom<Cli> for Config {
    type Error = Error;

    fn try_from(cli: Cli) -> Result<Self> {
        let source = cli.file.ok_or(ConfigError::MissingSource)?;
        let destination = cli.file_new.ok_or(ConfigError::MissingDestination)?;
        if source == destination {
            return Err(ConfigError::SameFile.into());
        }

        let mac = match pair(cli.mac, cli.mac_new, ConfigError::UnpairedMac)? {
            Some((old, new)) => Some(Substitution::new(
                old.parse::<MacAddr>()?.octets(),
                new.parse::<MacAddr>()?.octets(),
            )),
            None => None,
        };
        let ipv4 = match pair(cli.ip4, cli.ip4_new, ConfigError::UnpairedIpv4)? {
            Some((old, new)) => Some(Substitution::new(parse_ipv4(&old)?.octets(), parse_ipv4(&new)?.octets())),
            None => None,
        };

        // Zero means "not supplied", as with an omitted flag.
        let date = DateTarget {
            year: cli.year.filter(|&y| y != 0),
            month: cli.month.filter(|&m| m != 0),
            day: cli.day.filter(|&d| d != 0),
        };
        if let Some(month) = date.month.filter(|m| !(1..=12).contains(m)) {
            return Err(ConfigError::InvalidMonth(month).into());
        }
        if let Some(day) = date.day.filter(|d| !(1..=31).contains(d)) {
            return Err(ConfigError::InvalidDay(day).into());
        }

        let time_shifts = TimeShift::parse_list(cli.time_shift.as_deref().unwrap_or(""))?;

        Ok(Self {
            source,
            destination,
            mac,
            ipv4,
            date,
            time_shifts,
            skip_malformed: cli.skip_malformed,
            progress: !cli.quiet,
        })
    }
}
