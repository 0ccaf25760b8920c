//! Link-selection boundary: which local interface carries an outbound
//! query. The policy itself lives outside the forwarder; this module only
//! consumes it when binding sockets.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use socket2::{Domain, Protocol, Socket, Type};

/// Picks a local interface for reaching a destination IP. An empty string
/// means the default route.
pub trait LinkSelector: Send + Sync {
    fn pick_interface(&self, dst: IpAddr) -> String;
}

/// Always uses the default route.
pub struct DefaultLinkSelector;

impl LinkSelector for DefaultLinkSelector {
    fn pick_interface(&self, _dst: IpAddr) -> String {
        String::new()
    }
}

/// Platform capability applied to a raw socket before bind when a
/// non-default interface was selected (e.g. `SO_BINDTODEVICE` on Linux).
/// Injected at startup; absent means the default bind is used.
pub type ListenHook = dyn Fn(&str, &Socket) -> std::io::Result<()> + Send + Sync;

/// Bind an unconnected UDP socket suitable for reaching `dst`, honoring the
/// link selector and hook. Hook errors surface as bind errors.
pub(crate) fn bind_udp_for(
    dst: IpAddr,
    selector: &dyn LinkSelector,
    hook: Option<&Arc<ListenHook>>,
) -> std::io::Result<std::net::UdpSocket> {
    let domain = if dst.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;

    let interface = selector.pick_interface(dst);
    if !interface.is_empty() {
        if let Some(hook) = hook {
            hook(&interface, &socket)?;
        }
    }

    socket.set_nonblocking(true)?;
    let local: SocketAddr = if dst.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    socket.bind(&local.into())?;
    Ok(socket.into())
}
