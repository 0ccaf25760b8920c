//! Start-delay computation for racing a suffix's resolver set.
//!
//! Addresses of the same well-known provider are not fired at once: the
//! first address per family is the primary, later ones are backups, and
//! IPv6 is biased behind IPv4. On a dual-stack network the IPv4 primary
//! answers long before the IPv6 delay elapses; on a v6-only network the
//! DoH dialer's own address-family fallback still reaches v6 quickly.

use std::collections::HashMap;
use std::time::Duration;

use crate::known_doh;
use crate::routes::{ResolverAndDelay, ResolverSpec};

/// Provider identity of a resolver, when it belongs to a well-known set.
fn provider_of(spec: &ResolverSpec) -> Option<(&'static str, bool)> {
    match spec {
        ResolverSpec::Udp(addr) => {
            known_doh::doh_url_for_ip(addr.ip()).map(|base| (base, addr.is_ipv6()))
        }
        _ => None,
    }
}

/// Assign a start delay to each resolver, in input order.
///
/// Backup addresses wait `backup_delay` per already-assigned sibling; the
/// IPv6 bias on a dual-stack provider is half of `response_timeout`, so
/// failover stays inside the query deadline. With the default 200 ms and
/// 5 s, the canonical Cloudflare set `[1.1.1.1, 1.0.0.1, 2606:…:1111,
/// 2606:…:1001]` comes out as `[0, 200ms, 2500ms, 2700ms]`.
pub fn resolvers_with_delays(
    specs: &[ResolverSpec],
    backup_delay: Duration,
    response_timeout: Duration,
) -> Vec<ResolverAndDelay> {
    // First pass: how many addresses each provider has, per family.
    let mut v4_total: HashMap<&str, usize> = HashMap::new();
    let mut v6_total: HashMap<&str, usize> = HashMap::new();
    for spec in specs {
        match provider_of(spec) {
            Some((base, false)) => *v4_total.entry(base).or_default() += 1,
            Some((base, true)) => *v6_total.entry(base).or_default() += 1,
            None => {}
        }
    }

    // Second pass: delays accumulate per entry.
    let mut v4_assigned: HashMap<&str, usize> = HashMap::new();
    let mut v6_assigned: HashMap<&str, usize> = HashMap::new();
    specs
        .iter()
        .map(|spec| {
            let mut delay = Duration::ZERO;
            match provider_of(spec) {
                Some((base, false)) => {
                    let assigned = v4_assigned.entry(base).or_default();
                    if *assigned > 0 {
                        delay += backup_delay;
                    }
                    *assigned += 1;
                }
                Some((base, true)) => {
                    match v4_total.get(base).copied().unwrap_or(0) {
                        n if n >= 2 => delay = response_timeout / 2,
                        1 => delay += backup_delay,
                        _ => {}
                    }
                    let assigned = v6_assigned.entry(base).or_default();
                    if *assigned > 0 {
                        delay += backup_delay;
                    }
                    *assigned += 1;
                }
                None => {}
            }
            ResolverAndDelay {
                resolver: spec.clone(),
                delay,
            }
        })
        .collect()
}
