//! Upstream transports: plain UDP and DNS-over-HTTPS, with opportunistic
//! DoH upgrade for well-known resolver addresses.

mod doh;
mod udp;

use std::net::IpAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::ForwarderConfig;
use crate::error::{ForwardError, Result};
use crate::forwarder::ForwardQuery;
use crate::known_doh;
use crate::link::{DefaultLinkSelector, LinkSelector, ListenHook};
use crate::routes::ResolverSpec;

use doh::DohClientPool;

pub(crate) struct Transport {
    clients: DohClientPool,
    doh_in_flight: Semaphore,
    link_selector: Arc<dyn LinkSelector>,
    listen_hook: Option<Arc<ListenHook>>,
    max_response_bytes: usize,
}

impl Transport {
    pub(crate) fn new(
        config: &ForwarderConfig,
        link_selector: Option<Arc<dyn LinkSelector>>,
        listen_hook: Option<Arc<ListenHook>>,
    ) -> Self {
        Self {
            clients: DohClientPool::new(),
            doh_in_flight: Semaphore::new(config.max_doh_in_flight),
            link_selector: link_selector.unwrap_or_else(|| Arc::new(DefaultLinkSelector)),
            listen_hook,
            max_response_bytes: config.max_response_bytes,
        }
    }

    /// Dispatch one attempt to a resolver.
    ///
    /// UDP resolvers whose address is a well-known DoH provider are first
    /// tried over DoH; on DoH failure the attempt falls back to plain UDP
    /// against the original address. Errors are returned verbatim unless
    /// the query was cancelled, in which case cancellation supersedes.
    pub(crate) async fn send(
        &self,
        query: &ForwardQuery,
        resolver: &ResolverSpec,
        cancel: &CancellationToken,
    ) -> Result<Bytes> {
        let result = match resolver {
            ResolverSpec::Doh { url, bootstrap } => {
                self.send_doh(query, url, bootstrap, cancel).await
            }
            ResolverSpec::Tls(url) => Err(ForwardError::UnsupportedScheme(url.clone())),
            ResolverSpec::Udp(addr) => {
                if let Some(base) = known_doh::doh_url_for_ip(addr.ip()) {
                    let bootstrap = known_doh::known_ips_for_base(base);
                    match self.send_doh(query, base, &bootstrap, cancel).await {
                        Ok(response) => return Ok(response),
                        Err(_) if cancel.is_cancelled() => return Err(ForwardError::Cancelled),
                        Err(e) => {
                            warn!(
                                "DoH upgrade to {} failed ({}), falling back to UDP {}",
                                base, e, addr
                            );
                        }
                    }
                }
                udp::send_udp(
                    query,
                    *addr,
                    self.max_response_bytes,
                    self.link_selector.as_ref(),
                    self.listen_hook.as_ref(),
                    cancel,
                )
                .await
            }
        };
        match result {
            Err(_) if cancel.is_cancelled() => Err(ForwardError::Cancelled),
            other => other,
        }
    }

    /// One DoH attempt against a URL base. A failed dial is retried once
    /// over the registry's IPv6 address for the base, if it has one and the
    /// query is still live.
    async fn send_doh(
        &self,
        query: &ForwardQuery,
        url: &str,
        bootstrap: &[IpAddr],
        cancel: &CancellationToken,
    ) -> Result<Bytes> {
        let client = self.clients.client_for(url, bootstrap).await?;
        debug!("DoH query to {}", url);
        match doh::send_doh(&client, &self.doh_in_flight, url, &query.packet, cancel).await {
            Err(ForwardError::Dial(reason)) if !cancel.is_cancelled() => {
                match known_doh::known_ipv6_for_base(url) {
                    Some(addr) => {
                        warn!(
                            "Dial to {} failed ({}), retrying over IPv6 {}",
                            url, reason, addr
                        );
                        let client = self.clients.ipv6_fallback_client(url, addr)?;
                        doh::send_doh(&client, &self.doh_in_flight, url, &query.packet, cancel)
                            .await
                    }
                    None => Err(ForwardError::Dial(reason)),
                }
            }
            other => other,
        }
    }
}
