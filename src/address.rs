//! Hardware and protocol addresses as they are supplied on the command line.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::error::ParseError;

/// A 6-byte Ethernet hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const fn octets(self) -> [u8; 6] {
        self.0
    }
}

impl FromStr for MacAddr {
    type Err = ParseError;

    /// Accepts `AA:BB:CC:DD:EE:FF` and `AA-BB-CC-DD-EE-FF`, case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidMac(s.to_string());
        let sep = if s.contains('-') { '-' } else { ':' };

        let mut octets = [0u8; 6];
        let mut parts = s.split(sep);
        for octet in &mut octets {
            let part = parts.next().ok_or_else(invalid)?;
            if part.is_empty() || part.len() > 2 {
                return Err(invalid());
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self(octets))
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

pub fn parse_ipv4(s: &str) -> Result<Ipv4Addr, ParseError> {
    Ipv4Addr::from_str(s.trim()).map_err(|_| ParseError::InvalidIpv4(s.to_string()))
}

/// Renders a 6-byte field for log output.
pub(crate) fn fmt_mac(b: &[u8]) -> String {
    match <[u8; 6]>::try_from(b) {
        Ok(octets) => MacAddr(octets).to_string(),
        Err(_) => format!("{b:02x?}"),
    }
}

/// Renders a 4-byte field for log output.
pub(crate) fn fmt_ipv4(b: &[u8]) -> String {
    match <[u8; 4]>::try_from(b) {
        Ok(octets) => Ipv4Addr::from(octets).to_string(),
        Err(_) => format!("{b:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_colon_form() {
        let mac: MacAddr = "AA:bb:CC:dd:EE:ff".parse().unwrap();
        assert_eq!(mac.octets(), [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        assert_eq!(mac.to_string(), "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn mac_hyphen_form() {
        let mac: MacAddr = "00-1b-2c-3d-4e-5f".parse().unwrap();
        assert_eq!(mac.octets(), [0x00, 0x1b, 0x2c, 0x3d, 0x4e, 0x5f]);
    }

    #[test]
    fn mac_rejects_malformed() {
        for bad in ["", "aa:bb:cc:dd:ee", "aa:bb:cc:dd:ee:ff:00", "aa:bb:cc:dd:ee:gg", "aaa:bb:cc:dd:ee:ff", "aa::cc:dd:ee:ff"] {
            assert_eq!(
                bad.parse::<MacAddr>(),
                Err(ParseError::InvalidMac(bad.to_string())),
                "{bad:?} should not parse"
            );
        }
    }

    #[test]
    fn ipv4_dotted_quad() {
        assert_eq!(parse_ipv4("192.168.1.10").unwrap().octets(), [192, 168, 1, 10]);
        assert!(matches!(parse_ipv4("192.168.1"), Err(ParseError::InvalidIpv4(_))));
        assert!(matches!(parse_ipv4("256.0.0.1"), Err(ParseError::InvalidIpv4(_))));
    }

    #[test]
    fn log_formatting() {
        assert_eq!(fmt_mac(&[0x76, 0x9b, 0xe8, 0xe1, 0xde, 0x43]), "76:9b:e8:e1:de:43");
        assert_eq!(fmt_ipv4(&[10, 0, 0, 1]), "10.0.0.1");
    }
}
