#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use bifrost::config::ForwarderConfig;
use bifrost::dns::Fqdn;
use bifrost::routes::ResolverSpec;
use bifrost::{Forwarder, Packet};

pub const CALLER: &str = "127.0.0.1:9999";

/// Build a minimal A/IN query packet.
pub fn build_query(id: u16, name: &str) -> Vec<u8> {
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

/// Echo the query back as a response, with a trailing marker byte so tests
/// can tell upstreams apart.
pub fn echo_response(query: &[u8], marker: u8) -> Vec<u8> {
    let mut response = query.to_vec();
    response[2] |= 0x80; // QR
    response.push(marker);
    response
}

pub struct MockUpstream {
    pub addr: SocketAddr,
    pub hits: Arc<AtomicUsize>,
}

impl MockUpstream {
    pub fn spec(&self) -> ResolverSpec {
        ResolverSpec::Udp(self.addr)
    }

    pub fn hit_count(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Spawn a mock UDP upstream. `respond` maps each received query to an
/// optional response, sent after `delay`.
pub async fn spawn_mock<F>(delay: Duration, respond: F) -> MockUpstream
where
    F: Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync + 'static,
{
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let hit_count = hits.clone();
    tokio::spawn(async move {
        let mut buf = vec![0u8; 8192];
        loop {
            let Ok((n, from)) = socket.recv_from(&mut buf).await else {
                break;
            };
            hit_count.fetch_add(1, Ordering::SeqCst);
            if let Some(response) = respond(&buf[..n]) {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let _ = socket.send_to(&response, from).await;
            }
        }
    });
    MockUpstream { addr, hits }
}

/// A forwarder with the given routes, a short deadline, and its response
/// channel.
pub fn forwarder_with_routes(
    routes: &[(&str, Vec<ResolverSpec>)],
    response_timeout: Duration,
) -> (Arc<Forwarder>, mpsc::Receiver<Packet>) {
    let (tx, rx) = mpsc::channel(8);
    let config = ForwarderConfig {
        response_timeout,
        ..ForwarderConfig::default()
    };
    let forwarder = Forwarder::new(tx, config);
    let map: HashMap<Fqdn, Vec<ResolverSpec>> = routes
        .iter()
        .map(|(suffix, specs)| (Fqdn::parse(suffix).unwrap(), specs.clone()))
        .collect();
    forwarder.set_routes(map);
    (Arc::new(forwarder), rx)
}

pub fn packet(payload: Vec<u8>) -> Packet {
    Packet {
        payload: Bytes::from(payload),
        from: CALLER.parse().unwrap(),
    }
}
