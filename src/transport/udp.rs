use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::dns;
use crate::error::{ForwardError, Result};
use crate::forwarder::ForwardQuery;
use crate::link::{self, LinkSelector, ListenHook};

/// Send a query over plain UDP and wait for the response.
///
/// The receive side is registered with the query's close pool so a
/// deadline elsewhere can unblock it. Responses longer than
/// `max_response_bytes` are clipped and flagged truncated.
pub(crate) async fn send_udp(
    query: &ForwardQuery,
    dst: SocketAddr,
    max_response_bytes: usize,
    selector: &dyn LinkSelector,
    hook: Option<&Arc<ListenHook>>,
    cancel: &CancellationToken,
) -> Result<Bytes> {
    let socket = link::bind_udp_for(dst.ip(), selector, hook)?;
    let socket = UdpSocket::from_std(socket)?;
    socket.connect(dst).await?;
    socket.send(&query.packet).await?;

    let closer = CancellationToken::new();
    let pool_id = query.close_pool.add(Arc::new(closer.clone()));

    let mut buf = vec![0u8; max_response_bytes + 1];
    let received = tokio::select! {
        n = socket.recv(&mut buf) => n.map_err(ForwardError::from),
        _ = closer.cancelled() => Err(ForwardError::Cancelled),
        _ = cancel.cancelled() => Err(ForwardError::Cancelled),
    };
    query.close_pool.remove(pool_id);
    let n = received?;

    trace!(
        "UDP response from {} ({} bytes): {:02x?}",
        dst,
        n,
        &buf[..n.min(32)]
    );

    buf.truncate(n.min(max_response_bytes));
    if n > max_response_bytes {
        dns::set_truncated(&mut buf);
    }
    if dns::txid(&buf) != query.txid {
        return Err(ForwardError::TxidMismatch);
    }
    dns::clamp_edns_size(&mut buf, max_response_bytes.min(u16::MAX as usize) as u16);
    Ok(Bytes::from(buf))
}
