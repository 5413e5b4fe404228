//! In-place MAC and IPv4 substitution at the Ethernet, ARP and IPv4 levels.
//!
//! Every substitution is fixed-width: a field is overwritten only when it is
//! byte-for-byte equal to the configured old value, so frame lengths never
//! change. IPv4 and transport checksums are left as they were.

use tracing::debug;

use crate::address::{fmt_ipv4, fmt_mac};
use crate::error::FrameError;
use crate::frame::{read_u16, FrameLayout, ETHERTYPE_IPV4};

// Ethernet header
const ETH_DST: usize = 0;
const ETH_SRC: usize = 6;

// ARP payload, relative to the first byte after the Ethernet header and tags
const ARP_PTYPE: usize = 2;
const ARP_SHA: usize = 8;
const ARP_SPA: usize = 14;
const ARP_THA: usize = 18;
const ARP_TPA: usize = 24;
const ARP_IPV4_LEN: usize = 28;

// IPv4 header, relative to the same position
const IPV4_SRC: usize = 12;
const IPV4_DST: usize = 16;
const IPV4_MIN_HEADER: usize = 20;

/// An old/new pair of equal-width addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Substitution<const N: usize> {
    pub old: [u8; N],
    pub new: [u8; N],
}

pub type MacSubstitution = Substitution<6>;
pub type Ipv4Substitution = Substitution<4>;

impl<const N: usize> Substitution<N> {
    pub const fn new(old: [u8; N], new: [u8; N]) -> Self {
        Self { old, new }
    }

    /// Overwrites `frame[at..at + N]` when it equals `old`.
    pub fn apply(&self, frame: &mut [u8], at: usize) -> Result<bool, FrameError> {
        let len = frame.len();
        let field = frame
            .get_mut(at..at + N)
            .ok_or(FrameError::Truncated { len, needed: at + N })?;
        if *field != self.old[..] {
            return Ok(false);
        }
        field.copy_from_slice(&self.new);
        Ok(true)
    }
}

/// Fields rewritten in a single frame, per level.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Rewrites {
    pub ethernet_macs: u64,
    pub arp_macs: u64,
    pub arp_ipv4: u64,
    pub ipv4: u64,
}

impl Rewrites {
    pub fn total(&self) -> u64 {
        self.ethernet_macs + self.arp_macs + self.arp_ipv4 + self.ipv4
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AddressRewriter {
    mac: Option<MacSubstitution>,
    ipv4: Option<Ipv4Substitution>,
}

impl AddressRewriter {
    pub const fn new(mac: Option<MacSubstitution>, ipv4: Option<Ipv4Substitution>) -> Self {
        Self { mac, ipv4 }
    }

    pub const fn is_enabled(&self) -> bool {
        self.mac.is_some() || self.ipv4.is_some()
    }

    /// Rewrites every configured field of `frame`.
    ///
    /// The frame is checked against all the positions the enabled steps will
    /// touch before the first byte is written, so a truncated frame comes back
    /// as an error with its contents unchanged.
    pub fn rewrite(&self, frame: &mut [u8], layout: &FrameLayout) -> Result<Rewrites, FrameError> {
        self.check_bounds(frame, layout)?;

        let mut rewrites = Rewrites::default();
        if let Some(mac) = &self.mac {
            rewrites.ethernet_macs = replace_ethernet_macs(frame, mac)?;
        }
        if layout.is_arp() {
            if let Some(mac) = &self.mac {
                rewrites.arp_macs = replace_arp_macs(frame, layout, mac)?;
            }
            if let Some(ipv4) = &self.ipv4 {
                rewrites.arp_ipv4 = replace_arp_ipv4(frame, layout, ipv4)?;
            }
        } else if layout.is_ipv4() {
            if let Some(ipv4) = &self.ipv4 {
                rewrites.ipv4 = replace_ipv4_header(frame, layout, ipv4)?;
            }
        }
        Ok(rewrites)
    }

    fn check_bounds(&self, frame: &[u8], layout: &FrameLayout) -> Result<(), FrameError> {
        let base = layout.payload_start();
        let mut needed = if self.mac.is_some() { ETH_SRC + 6 } else { 0 };

        if layout.is_arp() {
            if self.mac.is_some() {
                needed = needed.max(base + ARP_THA + 6);
            }
            if self.ipv4.is_some() && read_u16(frame, base + ARP_PTYPE)? == ETHERTYPE_IPV4 {
                needed = needed.max(base + ARP_IPV4_LEN);
            }
        } else if layout.is_ipv4() && self.ipv4.is_some() {
            needed = needed.max(base + IPV4_MIN_HEADER);
        }

        if frame.len() < needed {
            return Err(FrameError::Truncated {
                len: frame.len(),
                needed,
            });
        }
        Ok(())
    }
}

fn replace_mac(frame: &mut [u8], at: usize, mac: &MacSubstitution, label: &str) -> Result<u64, FrameError> {
    let replaced = mac.apply(frame, at)?;
    if replaced {
        debug!("{label}: {} -> {}", fmt_mac(&mac.old), fmt_mac(&mac.new));
    }
    Ok(replaced.into())
}

fn replace_ipv4(frame: &mut [u8], at: usize, ip: &Ipv4Substitution, label: &str) -> Result<u64, FrameError> {
    let replaced = ip.apply(frame, at)?;
    if replaced {
        debug!("{label}: {} -> {}", fmt_ipv4(&ip.old), fmt_ipv4(&ip.new));
    }
    Ok(replaced.into())
}

/// Destination and source MAC of the Ethernet header.
pub fn replace_ethernet_macs(frame: &mut [u8], mac: &MacSubstitution) -> Result<u64, FrameError> {
    Ok(replace_mac(frame, ETH_DST, mac, "eth_dst_mac")? + replace_mac(frame, ETH_SRC, mac, "eth_src_mac")?)
}

/// Sender and target hardware addresses inside an ARP payload.
pub fn replace_arp_macs(
    frame: &mut [u8],
    layout: &FrameLayout,
    mac: &MacSubstitution,
) -> Result<u64, FrameError> {
    let base = layout.payload_start();
    Ok(replace_mac(frame, base + ARP_SHA, mac, "arp_sender_mac")?
        + replace_mac(frame, base + ARP_THA, mac, "arp_target_mac")?)
}

/// Sender and target protocol addresses inside an ARP payload, only when the
/// payload carries IPv4 addresses.
///
/// The protocol type is read from the ARP header itself, behind any VLAN tags,
/// so tagged ARP frames are rewritten as well.
pub fn replace_arp_ipv4(
    frame: &mut [u8],
    layout: &FrameLayout,
    ip: &Ipv4Substitution,
) -> Result<u64, FrameError> {
    let base = layout.payload_start();
    if read_u16(frame, base + ARP_PTYPE)? != ETHERTYPE_IPV4 {
        return Ok(0);
    }
    Ok(replace_ipv4(frame, base + ARP_SPA, ip, "arp_sender_ip")?
        + replace_ipv4(frame, base + ARP_TPA, ip, "arp_target_ip")?)
}

/// Source and destination address of the IPv4 header.
pub fn replace_ipv4_header(
    frame: &mut [u8],
    layout: &FrameLayout,
    ip: &Ipv4Substitution,
) -> Result<u64, FrameError> {
    let base = layout.payload_start();
    Ok(replace_ipv4(frame, base + IPV4_SRC, ip, "ipv4_src")?
        + replace_ipv4(frame, base + IPV4_DST, ip, "ipv4_dst")?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::ETHERTYPE_ARP;

    const OLD_MAC: [u8; 6] = [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff];
    const NEW_MAC: [u8; 6] = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66];
    const OTHER_MAC: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x01];
    const OLD_IP: [u8; 4] = [192, 168, 1, 10];
    const NEW_IP: [u8; 4] = [10, 0, 0, 10];
    const OTHER_IP: [u8; 4] = [192, 168, 1, 1];

    fn rewriter() -> AddressRewriter {
        AddressRewriter::new(
            Some(Substitution::new(OLD_MAC, NEW_MAC)),
            Some(Substitution::new(OLD_IP, NEW_IP)),
        )
    }

    /// Ethernet header with `tags` inserted before the EtherType.
    fn ethernet(dst: [u8; 6], src: [u8; 6], tags: &[u8], ethertype: u16) -> Vec<u8> {
        let mut frame = Vec::with_capacity(64);
        frame.extend_from_slice(&dst);
        frame.extend_from_slice(&src);
        frame.extend_from_slice(tags);
        frame.extend_from_slice(&ethertype.to_be_bytes());
        frame
    }

    fn arp(tags: &[u8], ptype: u16, sha: [u8; 6], spa: [u8; 4], tha: [u8; 6], tpa: [u8; 4]) -> Vec<u8> {
        let mut frame = ethernet([0xff; 6], OTHER_MAC, tags, ETHERTYPE_ARP);
        frame.extend_from_slice(&[0x00, 0x01]);
        frame.extend_from_slice(&ptype.to_be_bytes());
        frame.extend_from_slice(&[6, 4, 0x00, 0x01]);
        frame.extend_from_slice(&sha);
        frame.extend_from_slice(&spa);
        frame.extend_from_slice(&tha);
        frame.extend_from_slice(&tpa);
        frame
    }

    fn ipv4(tags: &[u8], src: [u8; 4], dst: [u8; 4]) -> Vec<u8> {
        let mut frame = ethernet(OTHER_MAC, OTHER_MAC, tags, ETHERTYPE_IPV4);
        let mut header = [0u8; 20];
        header[0] = 0x45;
        header[9] = 17;
        header[12..16].copy_from_slice(&src);
        header[16..20].copy_from_slice(&dst);
        frame.extend_from_slice(&header);
        frame.extend_from_slice(&[0u8; 8]);
        frame
    }

    fn run(frame: &mut Vec<u8>) -> Rewrites {
        let layout = FrameLayout::classify(frame).unwrap();
        rewriter().rewrite(frame, &layout).unwrap()
    }

    #[test]
    fn ethernet_macs_both_directions() {
        let mut frame = ethernet(OLD_MAC, OLD_MAC, &[], 0x86dd);
        frame.resize(60, 0);
        let rewrites = run(&mut frame);
        assert_eq!(rewrites.ethernet_macs, 2);
        assert_eq!(&frame[0..6], &NEW_MAC);
        assert_eq!(&frame[6..12], &NEW_MAC);
        assert_eq!(frame.len(), 60);
    }

    #[test]
    fn ipv4_positions_in_other_protocols_are_left_alone() {
        for tags in [&[][..], &[0x81, 0x00, 0x00, 0x64][..]] {
            let mut frame = ethernet(OTHER_MAC, OTHER_MAC, tags, 0x86dd);
            let base = frame.len();
            frame.resize(base + 40, 0);
            frame[base + IPV4_SRC..base + IPV4_SRC + 4].copy_from_slice(&OLD_IP);
            frame[base + IPV4_DST..base + IPV4_DST + 4].copy_from_slice(&OLD_IP);
            let before = frame.clone();

            let layout = FrameLayout::classify(&frame).unwrap();
            assert_eq!(layout.payload_start(), base);
            let rewrites = rewriter().rewrite(&mut frame, &layout).unwrap();
            assert_eq!(rewrites.ipv4, 0);
            assert_eq!(rewrites.total(), 0);
            assert_eq!(frame, before);
        }
    }

    #[test]
    fn one_byte_difference_is_not_a_match() {
        let near = [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x00];
        let mut frame = ethernet(OTHER_MAC, near, &[], ETHERTYPE_IPV4);
        frame.resize(60, 0);
        let before = frame.clone();
        let rewrites = run(&mut frame);
        assert_eq!(rewrites, Rewrites::default());
        assert_eq!(frame, before);
    }

    #[test]
    fn arp_sender_ip_only() {
        let mut frame = arp(&[], ETHERTYPE_IPV4, OTHER_MAC, OLD_IP, [0; 6], OTHER_IP);
        let rewrites = run(&mut frame);
        assert_eq!(rewrites.arp_ipv4, 1);
        assert_eq!(rewrites.arp_macs, 0);
        assert_eq!(&frame[14 + ARP_SPA..14 + ARP_SPA + 4], &NEW_IP);
        assert_eq!(&frame[14 + ARP_TPA..14 + ARP_TPA + 4], &OTHER_IP);
        assert_eq!(&frame[14 + ARP_SHA..14 + ARP_SHA + 6], &OTHER_MAC);
        assert_eq!(&frame[14 + ARP_THA..14 + ARP_THA + 6], &[0; 6]);
    }

    #[test]
    fn arp_all_four_fields() {
        let mut frame = arp(&[], ETHERTYPE_IPV4, OLD_MAC, OLD_IP, OLD_MAC, OLD_IP);
        let len = frame.len();
        let rewrites = run(&mut frame);
        assert_eq!(rewrites.arp_macs, 2);
        assert_eq!(rewrites.arp_ipv4, 2);
        assert_eq!(rewrites.total(), 4);
        assert_eq!(frame.len(), len);
    }

    #[test]
    fn arp_non_ipv4_protocol_is_left_alone() {
        // Protocol address bytes match the old IPv4 value but the payload
        // declares a different protocol type.
        let mut frame = arp(&[], 0x86dd, OLD_MAC, OLD_IP, OTHER_MAC, OLD_IP);
        let rewrites = run(&mut frame);
        assert_eq!(rewrites.arp_ipv4, 0);
        assert_eq!(rewrites.arp_macs, 1);
        assert_eq!(&frame[14 + ARP_SPA..14 + ARP_SPA + 4], &OLD_IP);
        assert_eq!(&frame[14 + ARP_TPA..14 + ARP_TPA + 4], &OLD_IP);
    }

    #[test]
    fn arp_fields_follow_vlan_offset() {
        let tag = [0x81, 0x00, 0x00, 0x64];
        let mut frame = arp(&tag, ETHERTYPE_IPV4, OLD_MAC, OTHER_IP, OTHER_MAC, OLD_IP);
        let rewrites = run(&mut frame);
        assert_eq!(rewrites.arp_macs, 1);
        assert_eq!(rewrites.arp_ipv4, 1);
        assert_eq!(&frame[14 + 4 + ARP_SHA..14 + 4 + ARP_SHA + 6], &NEW_MAC);
        assert_eq!(&frame[14 + 4 + ARP_TPA..14 + 4 + ARP_TPA + 4], &NEW_IP);
    }

    #[test]
    fn arp_fields_follow_qinq_offset() {
        let tags = [0x88, 0xa8, 0x00, 0x0a, 0x81, 0x00, 0x00, 0x64];
        let mut frame = arp(&tags, ETHERTYPE_IPV4, OLD_MAC, OLD_IP, OTHER_MAC, OTHER_IP);
        let rewrites = run(&mut frame);
        assert_eq!(rewrites.arp_macs, 1);
        assert_eq!(rewrites.arp_ipv4, 1);
        assert_eq!(&frame[22 + ARP_SHA..22 + ARP_SHA + 6], &NEW_MAC);
        assert_eq!(&frame[22 + ARP_SPA..22 + ARP_SPA + 4], &NEW_IP);
    }

    #[test]
    fn ipv4_header_source_and_destination() {
        let mut frame = ipv4(&[], OLD_IP, OTHER_IP);
        let rewrites = run(&mut frame);
        assert_eq!(rewrites.ipv4, 1);
        assert_eq!(&frame[26..30], &NEW_IP);
        assert_eq!(&frame[30..34], &OTHER_IP);

        let mut tagged = ipv4(&[0x81, 0x00, 0x00, 0x64], OTHER_IP, OLD_IP);
        let rewrites = run(&mut tagged);
        assert_eq!(rewrites.ipv4, 1);
        assert_eq!(&tagged[34..38], &NEW_IP);
    }

    #[test]
    fn rewriting_twice_is_a_no_op() {
        let mut once = arp(&[], ETHERTYPE_IPV4, OLD_MAC, OLD_IP, OLD_MAC, OTHER_IP);
        run(&mut once);
        let mut twice = once.clone();
        let rewrites = run(&mut twice);
        assert_eq!(rewrites, Rewrites::default());
        assert_eq!(once, twice);
    }

    #[test]
    fn disabled_rewriter_touches_nothing() {
        let mut frame = ipv4(&[], OLD_IP, OLD_IP);
        let before = frame.clone();
        let layout = FrameLayout::classify(&frame).unwrap();
        let rewrites = AddressRewriter::default().rewrite(&mut frame, &layout).unwrap();
        assert_eq!(rewrites, Rewrites::default());
        assert_eq!(frame, before);
    }

    #[test]
    fn truncated_arp_is_reported_without_mutation() {
        let mut frame = arp(&[], ETHERTYPE_IPV4, OLD_MAC, OLD_IP, OLD_MAC, OLD_IP);
        frame.truncate(14 + 26);
        frame[0..6].copy_from_slice(&OLD_MAC);
        let before = frame.clone();
        let layout = FrameLayout::classify(&frame).unwrap();
        assert_eq!(
            rewriter().rewrite(&mut frame, &layout),
            Err(FrameError::Truncated { len: 40, needed: 42 })
        );
        assert_eq!(frame, before);
    }

    #[test]
    fn truncated_ipv4_header_is_reported() {
        let mut frame = ipv4(&[], OLD_IP, OLD_IP);
        frame.truncate(30);
        let layout = FrameLayout::classify(&frame).unwrap();
        assert_eq!(
            rewriter().rewrite(&mut frame, &layout),
            Err(FrameError::Truncated { len: 30, needed: 34 })
        );
    }

    #[test]
    fn substitution_bounds() {
        let sub = Substitution::new([1, 2], [3, 4]);
        let mut buf = [0u8, 1, 2];
        assert_eq!(sub.apply(&mut buf, 1), Ok(true));
        assert_eq!(buf, [0, 3, 4]);
        assert_eq!(sub.apply(&mut buf, 2), Err(FrameError::Truncated { len: 3, needed: 4 }));
    }
}
