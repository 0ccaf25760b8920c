//! Build-time registry of well-known public resolvers with DoH endpoints.
//!
//! Plain UDP upstreams whose address appears here are transparently
//! upgraded to DoH against the mapped URL base. Changes to this table are a
//! source change, not configuration.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::LazyLock;

struct KnownProvider {
    url: &'static str,
    v4: &'static [Ipv4Addr],
    v6: &'static [Ipv6Addr],
}

static KNOWN_PROVIDERS: &[KnownProvider] = &[
    KnownProvider {
        url: "https://cloudflare-dns.com/dns-query",
        v4: &[Ipv4Addr::new(1, 1, 1, 1), Ipv4Addr::new(1, 0, 0, 1)],
        v6: &[
            Ipv6Addr::new(0x2606, 0x4700, 0x4700, 0, 0, 0, 0, 0x1111),
            Ipv6Addr::new(0x2606, 0x4700, 0x4700, 0, 0, 0, 0, 0x1001),
        ],
    },
    KnownProvider {
        url: "https://security.cloudflare-dns.com/dns-query",
        v4: &[Ipv4Addr::new(1, 1, 1, 2), Ipv4Addr::new(1, 0, 0, 2)],
        v6: &[
            Ipv6Addr::new(0x2606, 0x4700, 0x4700, 0, 0, 0, 0, 0x1112),
            Ipv6Addr::new(0x2606, 0x4700, 0x4700, 0, 0, 0, 0, 0x1002),
        ],
    },
    KnownProvider {
        url: "https://family.cloudflare-dns.com/dns-query",
        v4: &[Ipv4Addr::new(1, 1, 1, 3), Ipv4Addr::new(1, 0, 0, 3)],
        v6: &[
            Ipv6Addr::new(0x2606, 0x4700, 0x4700, 0, 0, 0, 0, 0x1113),
            Ipv6Addr::new(0x2606, 0x4700, 0x4700, 0, 0, 0, 0, 0x1003),
        ],
    },
    KnownProvider {
        url: "https://dns.google/dns-query",
        v4: &[Ipv4Addr::new(8, 8, 8, 8), Ipv4Addr::new(8, 8, 4, 4)],
        v6: &[
            Ipv6Addr::new(0x2001, 0x4860, 0x4860, 0, 0, 0, 0, 0x8888),
            Ipv6Addr::new(0x2001, 0x4860, 0x4860, 0, 0, 0, 0, 0x8844),
        ],
    },
    KnownProvider {
        url: "https://dns.quad9.net/dns-query",
        v4: &[
            Ipv4Addr::new(9, 9, 9, 9),
            Ipv4Addr::new(149, 112, 112, 112),
        ],
        v6: &[
            Ipv6Addr::new(0x2620, 0x00fe, 0, 0, 0, 0, 0, 0x00fe),
            Ipv6Addr::new(0x2620, 0x00fe, 0, 0, 0, 0, 0, 0x0009),
        ],
    },
];

static URL_BY_IP: LazyLock<HashMap<IpAddr, &'static str>> = LazyLock::new(|| {
    let mut map = HashMap::new();
    for provider in KNOWN_PROVIDERS {
        for &ip in provider.v4 {
            map.insert(IpAddr::V4(ip), provider.url);
        }
        for &ip in provider.v6 {
            map.insert(IpAddr::V6(ip), provider.url);
        }
    }
    map
});

/// DoH URL base for a well-known resolver address, if any.
pub fn doh_url_for_ip(ip: IpAddr) -> Option<&'static str> {
    URL_BY_IP.get(&ip).copied()
}

/// Addresses known for a DoH URL base, IPv4 first then IPv6.
///
/// The ordering matters: these seed the DoH client's resolver override, and
/// the connector dials them in order, which gives the v4-then-v6 fallback.
pub fn known_ips_for_base(base: &str) -> Vec<IpAddr> {
    let Some(provider) = KNOWN_PROVIDERS.iter().find(|p| p.url == base) else {
        return Vec::new();
    };
    provider
        .v4
        .iter()
        .copied()
        .map(IpAddr::V4)
        .chain(provider.v6.iter().copied().map(IpAddr::V6))
        .collect()
}

/// A known IPv6 address for a DoH URL base, used to retry a failed IPv4 dial.
pub fn known_ipv6_for_base(base: &str) -> Option<Ipv6Addr> {
    KNOWN_PROVIDERS
        .iter()
        .find(|p| p.url == base)
        .and_then(|p| p.v6.first().copied())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_well_known_v4_addresses() {
        assert_eq!(
            doh_url_for_ip("1.1.1.1".parse().unwrap()),
            Some("https://cloudflare-dns.com/dns-query")
        );
        assert_eq!(
            doh_url_for_ip("8.8.4.4".parse().unwrap()),
            Some("https://dns.google/dns-query")
        );
        assert_eq!(
            doh_url_for_ip("149.112.112.112".parse().unwrap()),
            Some("https://dns.quad9.net/dns-query")
        );
    }

    #[test]
    fn maps_well_known_v6_addresses() {
        assert_eq!(
            doh_url_for_ip("2606:4700:4700::1001".parse().unwrap()),
            Some("https://cloudflare-dns.com/dns-query")
        );
        assert_eq!(
            doh_url_for_ip("2620:fe::9".parse().unwrap()),
            Some("https://dns.quad9.net/dns-query")
        );
    }

    #[test]
    fn unknown_addresses_are_absent() {
        assert_eq!(doh_url_for_ip("192.0.2.1".parse().unwrap()), None);
        assert_eq!(doh_url_for_ip("2001:db8::1".parse().unwrap()), None);
    }

    #[test]
    fn reverse_index_orders_v4_before_v6() {
        let ips = known_ips_for_base("https://dns.google/dns-query");
        assert_eq!(ips.len(), 4);
        assert!(ips[0].is_ipv4() && ips[1].is_ipv4());
        assert!(ips[2].is_ipv6() && ips[3].is_ipv6());
    }

    #[test]
    fn ipv6_fallback_lookup() {
        assert_eq!(
            known_ipv6_for_base("https://cloudflare-dns.com/dns-query"),
            Some("2606:4700:4700::1111".parse().unwrap())
        );
        assert_eq!(known_ipv6_for_base("https://example.com/dns-query"), None);
    }
}
