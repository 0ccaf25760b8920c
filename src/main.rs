use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use bifrost::config::ForwarderConfig;
use bifrost::dns::Fqdn;
use bifrost::routes::ResolverSpec;
use bifrost::{Forwarder, Packet};

#[derive(Parser, Debug)]
#[command(name = "bifrost", about = "Suffix-routed DNS forwarding resolver")]
struct Args {
    /// Local address to serve DNS on
    #[arg(long, default_value = "127.0.0.1:5300")]
    listen: SocketAddr,

    /// Default-route upstreams, comma separated (ip[:port], https://… or
    /// tls://…)
    #[arg(
        long,
        default_value = "1.1.1.1,1.0.0.1,2606:4700:4700::1111,2606:4700:4700::1001"
    )]
    upstreams: String,

    /// Extra suffix route, `suffix=resolver[,resolver…]`; repeatable
    #[arg(long = "route")]
    routes: Vec<String>,
}

fn parse_resolver_list(list: &str) -> bifrost::Result<Vec<ResolverSpec>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ResolverSpec::parse)
        .collect()
}

fn build_routes(args: &Args) -> bifrost::Result<HashMap<Fqdn, Vec<ResolverSpec>>> {
    let mut routes = HashMap::new();
    routes.insert(Fqdn::root(), parse_resolver_list(&args.upstreams)?);
    for route in &args.routes {
        let Some((suffix, resolvers)) = route.split_once('=') else {
            return Err(bifrost::ForwardError::InvalidResolver(format!(
                "route must look like suffix=resolver[,resolver]: {route}"
            )));
        };
        routes.insert(Fqdn::parse(suffix)?, parse_resolver_list(resolvers)?);
    }
    Ok(routes)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let routes = build_routes(&args)?;

    let (responses_tx, mut responses_rx) = mpsc::channel::<Packet>(128);
    let forwarder = Arc::new(Forwarder::new(responses_tx, ForwarderConfig::default()));
    forwarder.set_routes(routes);

    let socket = Arc::new(UdpSocket::bind(args.listen).await?);
    info!("DNS forwarder listening on {}", args.listen);

    // Responses come back out-of-band; one writer drains the channel.
    let write_socket = socket.clone();
    tokio::spawn(async move {
        while let Some(packet) = responses_rx.recv().await {
            if let Err(e) = write_socket.send_to(&packet.payload, packet.from).await {
                warn!("Failed to write response to {}: {}", packet.from, e);
            }
        }
    });

    let serve_forwarder = forwarder.clone();
    let serve = tokio::spawn(async move {
        let mut buf = vec![0u8; 4096];
        loop {
            let (n, from) = match socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    error!("UDP receive failed: {}", e);
                    continue;
                }
            };
            let packet = Packet {
                payload: bytes::Bytes::copy_from_slice(&buf[..n]),
                from,
            };
            let forwarder = serve_forwarder.clone();
            tokio::spawn(async move {
                if let Err(e) = forwarder.forward(packet).await {
                    debug!("Query from {} failed: {}", from, e);
                }
            });
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    forwarder.close();
    serve.abort();
    Ok(())
}
