use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use russh::client::{Config, Handle, Msg};
use russh::{Channel, Disconnect};
use tracing::debug;

use super::handler::{HostCheck, TransportHandler};
use crate::error::{Error, Result};

/// An authenticated encrypted session to one hop.
///
/// A `Transport` is either connected directly over TCP (the root of a chain)
/// or over a `direct-tcpip` channel opened on the previous hop's transport
/// ([`Transport::connect_via`]). Cloning is cheap; all clones share the
/// underlying session, and the session supports concurrently multiplexed
/// channels, so forwarding sessions and file transfers may open channels on
/// the same transport at the same time.
#[derive(Clone)]
pub struct Transport {
    handle: Arc<Handle<TransportHandler>>,
    username: String,
    host: String,
    port: u16,
}

impl Transport {
    /// Connect directly to `host:port` over TCP and authenticate.
    pub async fn connect(
        host: &str,
        port: u16,
        username: &str,
        password: &str,
        check: HostCheck,
        timeout: Duration,
    ) -> Result<Self> {
        debug!("connecting directly to {host}:{port}");

        let config = Arc::new(Config::default());
        let handler = TransportHandler::new(host.to_string(), port, check);

        let mut handle = tokio::time::timeout(
            timeout,
            russh::client::connect(config, (host, port), handler),
        )
        .await
        .map_err(|_| Error::Connect {
            host: host.to_string(),
            port,
            reason: format!("connection timed out after {}s", timeout.as_secs()),
        })?
        .map_err(|e| Error::Connect {
            host: host.to_string(),
            port,
            reason: e.to_string(),
        })?;

        Self::authenticate(&mut handle, host, port, username, password).await?;

        Ok(Self {
            handle: Arc::new(handle),
            username: username.to_string(),
            host: host.to_string(),
            port,
        })
    }

    /// Connect to `host:port` through an existing transport and authenticate.
    ///
    /// Opens a `direct-tcpip` channel on `parent` aimed at the target and
    /// runs the SSH handshake over that channel's byte stream, so the new
    /// session is only reachable through the parent's encrypted session.
    pub async fn connect_via(
        parent: &Transport,
        host: &str,
        port: u16,
        username: &str,
        password: &str,
        check: HostCheck,
        timeout: Duration,
    ) -> Result<Self> {
        debug!(
            "connecting to {host}:{port} through {}:{}",
            parent.host, parent.port
        );

        let channel = tokio::time::timeout(timeout, parent.open_direct_tcpip(host, port, None))
            .await
            .map_err(|_| Error::Connect {
                host: host.to_string(),
                port,
                reason: format!("channel open timed out after {}s", timeout.as_secs()),
            })?
            .map_err(|e| Error::Connect {
                host: host.to_string(),
                port,
                reason: e.to_string(),
            })?;

        let stream = channel.into_stream();
        let config = Arc::new(Config::default());
        let handler = TransportHandler::new(host.to_string(), port, check);

        let mut handle = tokio::time::timeout(
            timeout,
            russh::client::connect_stream(config, stream, handler),
        )
        .await
        .map_err(|_| Error::Connect {
            host: host.to_string(),
            port,
            reason: format!("handshake timed out after {}s", timeout.as_secs()),
        })?
        .map_err(|e| Error::Connect {
            host: host.to_string(),
            port,
            reason: e.to_string(),
        })?;

        Self::authenticate(&mut handle, host, port, username, password).await?;

        Ok(Self {
            handle: Arc::new(handle),
            username: username.to_string(),
            host: host.to_string(),
            port,
        })
    }

    async fn authenticate(
        handle: &mut Handle<TransportHandler>,
        host: &str,
        port: u16,
        username: &str,
        password: &str,
    ) -> Result<()> {
        let auth = handle.authenticate_password(username, password).await?;
        if !auth.success() {
            let _ = handle
                .disconnect(Disconnect::AuthCancelledByUser, "", "")
                .await;
            return Err(Error::Authentication {
                host: host.to_string(),
                port,
                user: username.to_string(),
            });
        }
        Ok(())
    }

    /// Open a session channel, used for command execution and the sftp
    /// subsystem.
    pub async fn open_session(&self) -> Result<Channel<Msg>> {
        self.handle
            .channel_open_session()
            .await
            .map_err(|e| Error::ChannelRejected {
                target: self.address(),
                reason: e.to_string(),
            })
    }

    /// Open a `direct-tcpip` forwarding channel aimed at `host:port`.
    ///
    /// `originator` is reported to the server as the connecting peer; when
    /// absent, a loopback placeholder is sent.
    pub async fn open_direct_tcpip(
        &self,
        host: &str,
        port: u16,
        originator: Option<SocketAddr>,
    ) -> Result<Channel<Msg>> {
        let (orig_host, orig_port) = originator
            .map(|a| (a.ip().to_string(), u32::from(a.port())))
            .unwrap_or_else(|| ("127.0.0.1".to_string(), 0));

        self.handle
            .channel_open_direct_tcpip(host, u32::from(port), orig_host, orig_port)
            .await
            .map_err(|e| Error::ChannelRejected {
                target: format!("{host}:{port}"),
                reason: e.to_string(),
            })
    }

    /// Tear down the session. Channels opened on it must be closed first.
    pub async fn disconnect(&self) -> Result<()> {
        debug!("disconnecting from {}:{}", self.host, self.port);
        self.handle
            .disconnect(Disconnect::ByApplication, "", "")
            .await
            .map_err(Error::Ssh)
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    /// The `host:port` this transport is authenticated to.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("username", &self.username)
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}
