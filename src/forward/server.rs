use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::pump::BytePump;
use crate::chain::TunnelChain;
use crate::error::Result;
use crate::ssh::Transport;

/// Snapshot of a forward server's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardStatus {
    /// Number of hops in the chain the server forwards through.
    pub chain_hops: usize,
    /// Bound local port, once listening.
    pub local_port: Option<u16>,
    pub remote_host: String,
    pub remote_port: u16,
    /// Whether the listener is currently accepting connections.
    pub active: bool,
}

/// Accepts local TCP connections and relays each through the chain's
/// terminal transport to a fixed remote target.
///
/// Each accepted connection gets its own task and its own forwarding
/// channel; a rejected channel or a mid-session error closes that one
/// session and leaves the listener and all other sessions untouched.
#[derive(Debug)]
pub struct ForwardServer {
    transport: Transport,
    chain_hops: usize,
    remote_host: String,
    remote_port: u16,
    cancel: CancellationToken,
    // 0 means not bound; listeners never bind port 0 for longer than it
    // takes to learn the ephemeral port.
    local_port: Arc<AtomicU16>,
    active: Arc<AtomicBool>,
}

impl ForwardServer {
    /// Build a forward server over an initialized chain's terminal
    /// transport, targeting `remote_host:remote_port` as seen from the
    /// terminal hop.
    pub fn new(
        chain: &TunnelChain,
        remote_host: impl Into<String>,
        remote_port: u16,
    ) -> Result<Self> {
        let transport = chain.transport()?.clone();
        Ok(Self {
            transport,
            chain_hops: chain.len(),
            remote_host: remote_host.into(),
            remote_port,
            cancel: CancellationToken::new(),
            local_port: Arc::new(AtomicU16::new(0)),
            active: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Bind `local_port` and accept connections until [`stop`] is called.
    ///
    /// Bind failure is fatal and returned to the caller. Accept errors are
    /// logged and the loop continues. Returning releases the listening
    /// socket; sessions already open keep relaying until their own EOF.
    ///
    /// [`stop`]: ForwardServer::stop
    pub async fn listen(&self, local_port: u16) -> Result<()> {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, local_port)).await?;
        let bound = listener.local_addr()?;
        self.local_port.store(bound.port(), Ordering::SeqCst);
        self.active.store(true, Ordering::SeqCst);

        info!(
            "forward server listening on {bound}, relaying to {}:{}",
            self.remote_host, self.remote_port
        );

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((socket, peer)) => {
                        debug!("accepted forwarding client {peer}");
                        self.spawn_session(socket, peer);
                    }
                    Err(e) => {
                        error!("accept failed: {e}");
                        // Avoid a busy loop on persistent accept errors.
                        sleep(Duration::from_millis(100)).await;
                    }
                },
                _ = self.cancel.cancelled() => {
                    info!("forward server stopping, listener released");
                    break;
                }
            }
        }

        self.active.store(false, Ordering::SeqCst);
        self.local_port.store(0, Ordering::SeqCst);
        Ok(())
    }

    /// Stop accepting new connections. Sessions already open are not
    /// terminated; they run until their own EOF or error.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn status(&self) -> ForwardStatus {
        let port = self.local_port.load(Ordering::SeqCst);
        ForwardStatus {
            chain_hops: self.chain_hops,
            local_port: (port != 0).then_some(port),
            remote_host: self.remote_host.clone(),
            remote_port: self.remote_port,
            active: self.active.load(Ordering::SeqCst),
        }
    }

    /// Relay one accepted connection on its own task.
    fn spawn_session(&self, socket: TcpStream, peer: SocketAddr) {
        let transport = self.transport.clone();
        let host = self.remote_host.clone();
        let port = self.remote_port;

        tokio::spawn(async move {
            let channel = match transport.open_direct_tcpip(&host, port, Some(peer)).await {
                Ok(channel) => channel,
                Err(e) => {
                    // Channel rejection is isolated to this session; the
                    // client socket drops closed here.
                    warn!("forward request from {peer} to {host}:{port} failed: {e}");
                    return;
                }
            };

            debug!("tunnel open: {peer} -> {host}:{port}");

            match BytePump::run(socket, channel.into_stream()).await {
                Ok(stats) => debug!(
                    "tunnel closed from {peer}: {} bytes out, {} bytes in",
                    stats.client_to_remote, stats.remote_to_client
                ),
                Err(e) => warn!("forward session from {peer} failed: {e}"),
            }
        });
    }
}
