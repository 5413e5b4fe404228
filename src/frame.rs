//! Link-layer framing: VLAN tag detection and EtherType lookup.

use crate::error::FrameError;

pub const ETHERNET_HEADER_LEN: usize = 14;

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_ARP: u16 = 0x0806;
pub const ETHERTYPE_VLAN: u16 = 0x8100;
pub const ETHERTYPE_QINQ: u16 = 0x88A8;

/// VLAN tagging found at the Ethernet type position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tagging {
    Untagged,
    /// Single 802.1Q tag.
    Vlan,
    /// 802.1ad outer tag followed by an inner tag.
    QinQ,
}

impl Tagging {
    /// Extra bytes the tags insert before the real EtherType.
    pub const fn offset(self) -> usize {
        match self {
            Self::Untagged => 0,
            Self::Vlan => 4,
            Self::QinQ => 8,
        }
    }
}

/// Where the interesting fields of one frame live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    pub tagging: Tagging,
    pub ethertype: u16,
}

impl FrameLayout {
    /// Classifies a frame from its first bytes. Never reads past `frame.len()`.
    pub fn classify(frame: &[u8]) -> Result<Self, FrameError> {
        let tagging = match read_u16(frame, 12)? {
            ETHERTYPE_VLAN => Tagging::Vlan,
            ETHERTYPE_QINQ => Tagging::QinQ,
            _ => Tagging::Untagged,
        };
        let ethertype = read_u16(frame, 12 + tagging.offset())?;
        Ok(Self { tagging, ethertype })
    }

    pub const fn offset(&self) -> usize {
        self.tagging.offset()
    }

    /// First byte after the Ethernet header and any VLAN tags.
    pub const fn payload_start(&self) -> usize {
        ETHERNET_HEADER_LEN + self.offset()
    }

    pub const fn is_arp(&self) -> bool {
        self.ethertype == ETHERTYPE_ARP
    }

    pub const fn is_ipv4(&self) -> bool {
        self.ethertype == ETHERTYPE_IPV4
    }
}

/// Big-endian u16 at `at`, bounds-checked.
pub(crate) fn read_u16(frame: &[u8], at: usize) -> Result<u16, FrameError> {
    match frame.get(at..at + 2) {
        Some(b) => Ok(u16::from_be_bytes([b[0], b[1]])),
        None => Err(FrameError::Truncated {
            len: frame.len(),
            needed: at + 2,
        }),
    }
}
