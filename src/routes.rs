use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::config::{RESPONSE_TIMEOUT, WELL_KNOWN_HOST_BACKUP_DELAY};
use crate::dns::Fqdn;
use crate::error::{ForwardError, Result};
use crate::stagger;

/// Default port for plain UDP resolvers.
pub const DNS_PORT: u16 = 53;

/// An upstream resolver endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolverSpec {
    /// Plain UDP resolver.
    Udp(SocketAddr),
    /// DNS-over-HTTPS endpoint. The bootstrap set is consulted when the URL
    /// hostname cannot be resolved through the system resolver.
    Doh { url: String, bootstrap: Vec<IpAddr> },
    /// Recognized but unsupported; rejected at send time.
    Tls(String),
}

impl ResolverSpec {
    /// Parse a resolver specification string: `ip[:port]`, `http://…`,
    /// `https://…` or `tls://…`.
    pub fn parse(spec: &str) -> Result<Self> {
        if spec.starts_with("http://") || spec.starts_with("https://") {
            return Ok(ResolverSpec::Doh {
                url: spec.to_string(),
                bootstrap: Vec::new(),
            });
        }
        if spec.starts_with("tls://") {
            return Ok(ResolverSpec::Tls(spec.to_string()));
        }
        if let Ok(addr) = spec.parse::<SocketAddr>() {
            return Ok(ResolverSpec::Udp(addr));
        }
        if let Ok(ip) = spec.parse::<IpAddr>() {
            return Ok(ResolverSpec::Udp(SocketAddr::new(ip, DNS_PORT)));
        }
        Err(ForwardError::InvalidResolver(spec.to_string()))
    }

    /// Attach a bootstrap resolution set to a DoH spec. No-op for other
    /// variants.
    pub fn with_bootstrap(self, ips: Vec<IpAddr>) -> Self {
        match self {
            ResolverSpec::Doh { url, .. } => ResolverSpec::Doh {
                url,
                bootstrap: ips,
            },
            other => other,
        }
    }
}

impl fmt::Display for ResolverSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolverSpec::Udp(addr) => write!(f, "{addr}"),
            ResolverSpec::Doh { url, .. } => f.write_str(url),
            ResolverSpec::Tls(url) => f.write_str(url),
        }
    }
}

/// A resolver plus its precomputed start delay within a race.
#[derive(Clone, Debug)]
pub struct ResolverAndDelay {
    pub resolver: ResolverSpec,
    pub delay: Duration,
}

/// A suffix rule: all domains under `suffix` go to `resolvers`.
#[derive(Clone, Debug)]
pub struct Route {
    pub suffix: Fqdn,
    pub resolvers: Arc<[ResolverAndDelay]>,
}

/// Suffix-routing table. Lookups walk a snapshot sorted by descending label
/// count, so the most specific suffix wins; `"."` is the catch-all.
pub struct RouteTable {
    routes: Mutex<Arc<[Route]>>,
    backup_delay: Duration,
    response_timeout: Duration,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new(WELL_KNOWN_HOST_BACKUP_DELAY, RESPONSE_TIMEOUT)
    }
}

impl RouteTable {
    /// A table whose stagger delays derive from the given backup delay and
    /// query deadline.
    pub fn new(backup_delay: Duration, response_timeout: Duration) -> Self {
        Self {
            routes: Mutex::new(Vec::new().into()),
            backup_delay,
            response_timeout,
        }
    }

    /// Replace the whole table. Start delays are computed here, at
    /// configuration time, from the table's backup delay and deadline.
    pub fn set_routes(&self, routes_by_suffix: HashMap<Fqdn, Vec<ResolverSpec>>) {
        let routes = routes_by_suffix
            .into_iter()
            .map(|(suffix, specs)| Route {
                suffix,
                resolvers: stagger::resolvers_with_delays(
                    &specs,
                    self.backup_delay,
                    self.response_timeout,
                )
                .into(),
            })
            .collect();
        self.install(routes);
    }

    /// Replace the whole table with routes whose delays are already
    /// computed.
    pub fn install(&self, mut routes: Vec<Route>) {
        routes.sort_by(|a, b| {
            b.suffix
                .num_labels()
                .cmp(&a.suffix.num_labels())
                .then_with(|| a.suffix.cmp(&b.suffix))
        });
        debug!("Installing {} routes", routes.len());
        *self.routes.lock() = routes.into();
    }

    /// Resolvers for the first matching suffix.
    pub fn lookup(&self, domain: &Fqdn) -> Result<Arc<[ResolverAndDelay]>> {
        let snapshot = self.routes.lock().clone();
        for route in snapshot.iter() {
            if route.suffix.is_root() || route.suffix.contains(domain) {
                if route.resolvers.is_empty() {
                    return Err(ForwardError::NoUpstreams);
                }
                return Ok(route.resolvers.clone());
            }
        }
        Err(ForwardError::NoUpstreams)
    }
}
