//! Raw-byte DNS packet helpers.
//!
//! The forwarder treats packets as opaque apart from the header id, the
//! flags word, the first question name, and one EDNS field. Nothing here
//! builds or rewrites full messages.

use crate::dns::name::Fqdn;
use crate::error::{ForwardError, Result};

/// Size of the fixed DNS header.
pub const HEADER_BYTES: usize = 12;

/// QR bit in the flags word at offset 2.
const QR_BIT: u16 = 0x8000;

/// TC bit in the flags word at offset 2.
const TC_BIT: u16 = 0x0200;

/// OPT pseudo-record type code (RFC 6891).
const TYPE_OPT: u16 = 41;

/// Wire size of an OPT record with root NAME and no options.
const EMPTY_OPT_BYTES: usize = 11;

fn be16(packet: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([packet[offset], packet[offset + 1]])
}

/// Transaction id of a DNS packet: the big-endian 16-bit header id,
/// zero-extended. Packets shorter than a header yield 0.
///
/// The high 32 bits are deliberately unused for matching: some upstreams
/// rewrite question case, so nothing derived from the question can be
/// round-tripped through them.
pub fn txid(packet: &[u8]) -> u64 {
    if packet.len() < HEADER_BYTES {
        return 0;
    }
    be16(packet, 0) as u64
}

/// Set the truncation flag in the header flags word.
pub fn set_truncated(packet: &mut [u8]) {
    if packet.len() < HEADER_BYTES {
        return;
    }
    let flags = be16(packet, 2) | TC_BIT;
    packet[2..4].copy_from_slice(&flags.to_be_bytes());
}

/// Cap the advertised EDNS UDP payload size at `max`, in place.
///
/// Only the simplest shape is handled: a trailing OPT record with root
/// NAME, EDNS version 0 and no options. Anything else is left untouched.
pub fn clamp_edns_size(packet: &mut [u8], max: u16) {
    if packet.len() < HEADER_BYTES + EMPTY_OPT_BYTES {
        return;
    }
    let arcount = be16(packet, 10);
    if arcount == 0 {
        return;
    }
    // Trailing empty OPT layout: NAME(1) TYPE(2) CLASS=size(2)
    // TTL: ext-rcode(1) version(1) flags(2), then RDLEN(2).
    let opt = packet.len() - EMPTY_OPT_BYTES;
    if packet[opt] != 0 {
        return;
    }
    if be16(packet, opt + 1) != TYPE_OPT {
        return;
    }
    if packet[opt + 6] != 0 {
        return;
    }
    if be16(packet, opt + 9) != 0 {
        return;
    }
    let requested = be16(packet, opt + 3);
    if requested > max {
        packet[opt + 3..opt + 5].copy_from_slice(&max.to_be_bytes());
    }
}

/// Parse the first question name out of a query packet.
///
/// Fails on a short or malformed packet and on packets with the response
/// flag set. The raw name bytes are lowercased before normalization.
pub fn name_from_query(packet: &[u8]) -> Result<Fqdn> {
    if packet.len() < HEADER_BYTES {
        return Err(ForwardError::Parse("packet shorter than header".to_string()));
    }
    if be16(packet, 2) & QR_BIT != 0 {
        return Err(ForwardError::NotAQuery);
    }
    if be16(packet, 4) == 0 {
        return Err(ForwardError::Parse("query has no question".to_string()));
    }

    let mut pos = HEADER_BYTES;
    let mut name = String::new();
    loop {
        let len = *packet
            .get(pos)
            .ok_or_else(|| ForwardError::Parse("question name runs past packet".to_string()))?
            as usize;
        pos += 1;
        if len == 0 {
            break;
        }
        if len & 0xC0 != 0 {
            return Err(ForwardError::Parse(
                "compressed name in question".to_string(),
            ));
        }
        let label = packet
            .get(pos..pos + len)
            .ok_or_else(|| ForwardError::Parse("question label runs past packet".to_string()))?;
        if !label.iter().all(u8::is_ascii) {
            return Err(ForwardError::Parse("non-ASCII question name".to_string()));
        }
        for &b in label {
            name.push(b.to_ascii_lowercase() as char);
        }
        name.push('.');
        pos += len;
        if name.len() > 255 {
            return Err(ForwardError::Parse("question name too long".to_string()));
        }
    }
    // qtype and qclass must be present for the question to be well formed
    if packet.len() < pos + 4 {
        return Err(ForwardError::Parse("question runs past packet".to_string()));
    }
    Fqdn::parse(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(id: u16, name: &str) -> Vec<u8> {
        let mut p = Vec::new();
        p.extend_from_slice(&id.to_be_bytes());
        p.extend_from_slice(&[0x01, 0x00]); // RD
        p.extend_from_slice(&1u16.to_be_bytes());
        p.extend_from_slice(&[0; 6]);
        for label in name.trim_end_matches('.').split('.') {
            p.push(label.len() as u8);
            p.extend_from_slice(label.as_bytes());
        }
        p.push(0);
        p.extend_from_slice(&1u16.to_be_bytes()); // A
        p.extend_from_slice(&1u16.to_be_bytes()); // IN
        p
    }

    fn with_opt(mut p: Vec<u8>, udp_size: u16) -> Vec<u8> {
        p[10..12].copy_from_slice(&1u16.to_be_bytes());
        p.push(0); // root NAME
        p.extend_from_slice(&TYPE_OPT.to_be_bytes());
        p.extend_from_slice(&udp_size.to_be_bytes());
        p.extend_from_slice(&[0, 0, 0, 0]); // ext-rcode, version, flags
        p.extend_from_slice(&0u16.to_be_bytes()); // RDLEN
        p
    }

    #[test]
    fn txid_roundtrip() {
        assert_eq!(txid(&query(0xbeef, "example.com")), 0xbeef);
        assert_eq!(txid(&query(7, "example.com")), 7);
    }

    #[test]
    fn txid_of_short_packet_is_zero() {
        assert_eq!(txid(&[0xff; 11]), 0);
        assert_eq!(txid(&[]), 0);
    }

    #[test]
    fn set_truncated_flips_only_tc() {
        let mut p = query(1, "example.com");
        let before = be16(&p, 2);
        set_truncated(&mut p);
        assert_eq!(be16(&p, 2), before | 0x0200);
    }

    #[test]
    fn clamp_caps_oversized_advertisement() {
        let mut p = with_opt(query(1, "example.com"), 4096);
        clamp_edns_size(&mut p, 1232);
        let opt = p.len() - EMPTY_OPT_BYTES;
        assert_eq!(be16(&p, opt + 3), 1232);
    }

    #[test]
    fn clamp_leaves_small_advertisement_alone() {
        let p = with_opt(query(1, "example.com"), 512);
        let mut clamped = p.clone();
        clamp_edns_size(&mut clamped, 1232);
        assert_eq!(p, clamped);
    }

    #[test]
    fn clamp_is_idempotent() {
        let mut once = with_opt(query(1, "example.com"), 4096);
        clamp_edns_size(&mut once, 1232);
        let mut twice = once.clone();
        clamp_edns_size(&mut twice, 1232);
        assert_eq!(once, twice);
    }

    #[test]
    fn clamp_ignores_packet_without_opt() {
        let p = query(1, "example.com");
        let mut clamped = p.clone();
        clamp_edns_size(&mut clamped, 1232);
        assert_eq!(p, clamped);
    }

    #[test]
    fn clamp_ignores_opt_with_options() {
        // RDLEN != 0 means the OPT carries options; shape is out of scope
        let mut p = with_opt(query(1, "example.com"), 4096);
        let rdlen = p.len() - 2;
        p[rdlen..].copy_from_slice(&4u16.to_be_bytes());
        let mut clamped = p.clone();
        clamp_edns_size(&mut clamped, 1232);
        assert_eq!(p, clamped);
    }

    #[test]
    fn clamp_ignores_nonzero_edns_version() {
        let mut p = with_opt(query(1, "example.com"), 4096);
        let version = p.len() - 5;
        p[version] = 1;
        let mut clamped = p.clone();
        clamp_edns_size(&mut clamped, 1232);
        assert_eq!(p, clamped);
    }

    #[test]
    fn name_parse_lowercases() {
        let p = query(1, "FOO.Example.COM");
        assert_eq!(name_from_query(&p).unwrap().as_str(), "foo.example.com.");
    }

    #[test]
    fn name_parse_rejects_responses() {
        let mut p = query(1, "example.com");
        p[2] |= 0x80;
        assert!(matches!(name_from_query(&p), Err(ForwardError::NotAQuery)));
    }

    #[test]
    fn name_parse_rejects_short_and_truncated_packets() {
        assert!(name_from_query(&[0u8; 4]).is_err());
        let mut p = query(1, "example.com");
        p.truncate(14);
        assert!(name_from_query(&p).is_err());
    }

    #[test]
    fn name_parse_rejects_questionless_query() {
        let mut p = query(1, "example.com");
        p[4..6].copy_from_slice(&0u16.to_be_bytes());
        assert!(name_from_query(&p).is_err());
    }
}
