use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::close_pool::ClosePool;
use crate::config::ForwarderConfig;
use crate::dns::{self, Fqdn};
use crate::error::{ForwardError, Result};
use crate::link::{LinkSelector, ListenHook};
use crate::routes::{ResolverSpec, Route, RouteTable};
use crate::transport::Transport;

/// A DNS packet paired with the opaque address of the local caller it
/// belongs to. Input to `forward`; also the shape emitted on the response
/// channel.
#[derive(Clone, Debug)]
pub struct Packet {
    pub payload: Bytes,
    pub from: SocketAddr,
}

/// Per-query state shared by the concurrent send attempts.
pub(crate) struct ForwardQuery {
    pub(crate) txid: u64,
    pub(crate) packet: Bytes,
    /// Sockets opened for this query register their receive side here so
    /// the deadline can unblock them.
    pub(crate) close_pool: ClosePool,
}

/// Closes the query's socket pool when the forward call returns, by any
/// path.
struct CloseOnReturn(Arc<ForwardQuery>);

impl Drop for CloseOnReturn {
    fn drop(&mut self) {
        self.0.close_pool.close();
    }
}

/// A DNS forwarding resolver.
///
/// Queries come in through [`Forwarder::forward`]; the first valid
/// upstream response is delivered out-of-band to the response channel
/// supplied at construction.
pub struct Forwarder {
    routes: RouteTable,
    transport: Arc<Transport>,
    responses: mpsc::Sender<Packet>,
    cancel: CancellationToken,
    config: ForwarderConfig,
}

impl Forwarder {
    pub fn new(responses: mpsc::Sender<Packet>, config: ForwarderConfig) -> Self {
        Self::with_link(responses, config, None, None)
    }

    /// Construct with an injected link selector and platform bind hook.
    pub fn with_link(
        responses: mpsc::Sender<Packet>,
        config: ForwarderConfig,
        link_selector: Option<Arc<dyn LinkSelector>>,
        listen_hook: Option<Arc<ListenHook>>,
    ) -> Self {
        Self {
            routes: RouteTable::new(config.backup_delay, config.response_timeout),
            transport: Arc::new(Transport::new(&config, link_selector, listen_hook)),
            responses,
            cancel: CancellationToken::new(),
            config,
        }
    }

    /// Replace the routing table. Start delays are computed here, from the
    /// configured backup delay and query deadline.
    pub fn set_routes(&self, routes_by_suffix: HashMap<Fqdn, Vec<ResolverSpec>>) {
        self.routes.set_routes(routes_by_suffix);
    }

    /// Replace the routing table with routes carrying precomputed delays.
    pub fn install_routes(&self, routes: Vec<Route>) {
        self.routes.install(routes);
    }

    /// Tear down the forwarder. All outstanding queries observe
    /// cancellation.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Forward one query and deliver the first valid upstream response to
    /// the response channel. Nothing is emitted on failure.
    pub async fn forward(&self, packet: Packet) -> Result<()> {
        let mut payload = packet.payload.to_vec();
        let domain = dns::name_from_query(&payload)?;
        dns::clamp_edns_size(
            &mut payload,
            self.config.max_response_bytes.min(u16::MAX as usize) as u16,
        );
        let resolvers = self.routes.lookup(&domain)?;

        let query = Arc::new(ForwardQuery {
            txid: dns::txid(&payload),
            packet: Bytes::from(payload),
            close_pool: ClosePool::new(),
        });
        let _close_on_return = CloseOnReturn(query.clone());

        let cancel = self.cancel.child_token();
        let _cancel_on_return = cancel.clone().drop_guard();
        let deadline = tokio::time::Instant::now() + self.config.response_timeout;

        debug!(
            "Forwarding query for {} to {} resolver(s)",
            domain,
            resolvers.len()
        );

        // First response wins: capacity-1 channel, non-blocking send, later
        // responses dropped. The first error is kept in case no attempt
        // succeeds.
        let (tx, mut rx) = mpsc::channel::<Bytes>(1);
        let first_err: Arc<Mutex<Option<ForwardError>>> = Arc::new(Mutex::new(None));

        for entry in resolvers.iter() {
            let entry = entry.clone();
            let query = query.clone();
            let transport = self.transport.clone();
            let cancel = cancel.clone();
            let tx = tx.clone();
            let first_err = first_err.clone();
            tokio::spawn(async move {
                if !entry.delay.is_zero() {
                    tokio::select! {
                        _ = tokio::time::sleep(entry.delay) => {}
                        _ = cancel.cancelled() => return,
                    }
                }
                match transport.send(&query, &entry.resolver, &cancel).await {
                    Ok(response) => {
                        let _ = tx.try_send(response);
                    }
                    Err(e) => {
                        debug!("Attempt against {} failed: {}", entry.resolver, e);
                        let mut slot = first_err.lock();
                        if slot.is_none() {
                            *slot = Some(e);
                        }
                    }
                }
            });
        }
        drop(tx);

        tokio::select! {
            received = rx.recv() => match received {
                Some(payload) => {
                    let response = Packet { payload, from: packet.from };
                    // The sink may block; honor cancellation and the
                    // deadline during the handoff.
                    tokio::select! {
                        sent = self.responses.send(response) => {
                            sent.map_err(|_| ForwardError::SinkClosed)
                        }
                        _ = cancel.cancelled() => Err(ForwardError::Cancelled),
                        _ = tokio::time::sleep_until(deadline) => Err(ForwardError::Timeout),
                    }
                }
                // Every attempt finished without a response.
                None => Err(take_first(&first_err, ForwardError::Timeout)),
            },
            _ = cancel.cancelled() => Err(take_first(&first_err, ForwardError::Cancelled)),
            _ = tokio::time::sleep_until(deadline) => Err(take_first(&first_err, ForwardError::Timeout)),
        }
    }
}

impl Drop for Forwarder {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn take_first(slot: &Mutex<Option<ForwardError>>, fallback: ForwardError) -> ForwardError {
    slot.lock().take().unwrap_or(fallback)
}
