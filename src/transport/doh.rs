use std::net::{IpAddr, Ipv6Addr, SocketAddr};

use bytes::Bytes;
use dashmap::DashMap;
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::DOH_TRANSPORT_TIMEOUT;
use crate::error::{ForwardError, Result};

pub(crate) const DOH_CONTENT_TYPE: &str = "application/dns-message";

const HTTPS_PORT: u16 = 443;

/// Long-lived HTTP clients, one per DoH URL base, created on demand and
/// reused for the lifetime of the forwarder.
#[derive(Default)]
pub(crate) struct DohClientPool {
    clients: DashMap<String, reqwest::Client>,
}

impl DohClientPool {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn client_for(
        &self,
        base: &str,
        bootstrap: &[IpAddr],
    ) -> Result<reqwest::Client> {
        if let Some(client) = self.clients.get(base) {
            return Ok(client.clone());
        }
        let client = build_client(base, bootstrap).await?;
        // First insert wins if two queries raced here.
        Ok(self
            .clients
            .entry(base.to_string())
            .or_insert(client)
            .clone())
    }

    /// Client pinned to the registry's IPv6 address for a base, used to
    /// retry after a failed dial.
    pub(crate) fn ipv6_fallback_client(
        &self,
        base: &str,
        addr: Ipv6Addr,
    ) -> Result<reqwest::Client> {
        let key = format!("{base}#v6");
        if let Some(client) = self.clients.get(&key) {
            return Ok(client.clone());
        }
        let client = build_pinned_client(base, IpAddr::V6(addr))?;
        Ok(self.clients.entry(key).or_insert(client).clone())
    }
}

/// Build the per-base client.
///
/// If the URL host is a name rather than an IP literal, resolution is
/// pinned at construction time: the system resolver first, then the
/// bootstrap set (IPv4 sorted ahead of IPv6, so a failed v4 dial falls
/// through to v6 in connector order). No Accept header is sent; the
/// well-known providers tolerate its absence.
async fn build_client(base: &str, bootstrap: &[IpAddr]) -> Result<reqwest::Client> {
    let url: reqwest::Url = base
        .parse()
        .map_err(|_| ForwardError::Http(format!("invalid DoH URL: {base}")))?;
    let host = url
        .host_str()
        .ok_or_else(|| ForwardError::Http(format!("DoH URL has no host: {base}")))?
        .to_string();
    let port = url.port_or_known_default().unwrap_or(HTTPS_PORT);

    let mut builder = reqwest::Client::builder().pool_idle_timeout(DOH_TRANSPORT_TIMEOUT);

    if host.parse::<IpAddr>().is_err() {
        let addrs = resolve_host(&host, port, bootstrap).await;
        if !addrs.is_empty() {
            debug!("Pinning {} to {:?}", host, addrs);
            builder = builder.resolve_to_addrs(&host, &addrs);
        }
    }

    builder.build().map_err(ForwardError::from)
}

fn build_pinned_client(base: &str, ip: IpAddr) -> Result<reqwest::Client> {
    let url: reqwest::Url = base
        .parse()
        .map_err(|_| ForwardError::Http(format!("invalid DoH URL: {base}")))?;
    let host = url
        .host_str()
        .ok_or_else(|| ForwardError::Http(format!("DoH URL has no host: {base}")))?
        .to_string();
    let port = url.port_or_known_default().unwrap_or(HTTPS_PORT);

    let mut builder = reqwest::Client::builder().pool_idle_timeout(DOH_TRANSPORT_TIMEOUT);
    if host.parse::<IpAddr>().is_err() {
        builder = builder.resolve(&host, SocketAddr::new(ip, port));
    }
    builder.build().map_err(ForwardError::from)
}

async fn resolve_host(host: &str, port: u16, bootstrap: &[IpAddr]) -> Vec<SocketAddr> {
    match tokio::net::lookup_host((host, port)).await {
        Ok(addrs) => {
            let mut resolved: Vec<SocketAddr> = addrs.collect();
            if !resolved.is_empty() {
                resolved.sort_by_key(|addr| addr.is_ipv6());
                return resolved;
            }
        }
        Err(e) => {
            warn!("System resolution of {} failed: {}", host, e);
        }
    }
    let mut fallback: Vec<SocketAddr> = bootstrap
        .iter()
        .map(|&ip| SocketAddr::new(ip, port))
        .collect();
    fallback.sort_by_key(|addr| addr.is_ipv6());
    fallback
}

/// One DoH round-trip: POST the query packet, require a 200 with the DNS
/// message content type, return the body.
pub(crate) async fn send_doh(
    client: &reqwest::Client,
    in_flight: &Semaphore,
    url: &str,
    packet: &Bytes,
    cancel: &CancellationToken,
) -> Result<Bytes> {
    // Permit is held for the whole round-trip and released on every exit.
    let _permit = tokio::select! {
        permit = in_flight.acquire() => permit.map_err(|_| ForwardError::Cancelled)?,
        _ = cancel.cancelled() => return Err(ForwardError::Cancelled),
    };

    let request = client
        .post(url)
        .header(CONTENT_TYPE, DOH_CONTENT_TYPE)
        .body(packet.clone());
    let response = tokio::select! {
        r = request.send() => r.map_err(|e| {
            if e.is_connect() {
                ForwardError::Dial(e.to_string())
            } else {
                ForwardError::Http(e.to_string())
            }
        })?,
        _ = cancel.cancelled() => return Err(ForwardError::Cancelled),
    };

    if response.status() != StatusCode::OK {
        return Err(ForwardError::Http(format!(
            "DoH response status: {}",
            response.status()
        )));
    }
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    if content_type != DOH_CONTENT_TYPE {
        return Err(ForwardError::BadContentType(content_type));
    }

    let body = tokio::select! {
        b = response.bytes() => b?,
        _ = cancel.cancelled() => return Err(ForwardError::Cancelled),
    };
    Ok(body)
}
