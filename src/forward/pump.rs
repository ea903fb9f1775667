use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::trace;

use crate::error::{Error, Result};

/// Bytes relayed per readiness event. Data is forwarded verbatim in chunks
/// of at most this size; no framing or extra buffering is introduced.
pub const RELAY_CHUNK: usize = 1024;

/// Byte counts for one finished forwarding session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PumpStats {
    pub client_to_remote: u64,
    pub remote_to_client: u64,
}

impl PumpStats {
    pub fn total(&self) -> u64 {
        self.client_to_remote + self.remote_to_client
    }
}

/// The bidirectional relay loop for one forwarded connection.
pub struct BytePump;

impl BytePump {
    /// Relay bytes between a client socket and a forwarding channel until
    /// either side reads EOF, then close both endpoints.
    ///
    /// The loop waits on readiness of both endpoints and forwards up to
    /// [`RELAY_CHUNK`] bytes in the ready direction. A zero-length read on
    /// either side ends the session; bytes already written before the EOF
    /// stay delivered. The channel side is any byte stream, in practice the
    /// stream form of a `direct-tcpip` channel.
    pub async fn run<C>(mut client: TcpStream, mut channel: C) -> Result<PumpStats>
    where
        C: AsyncRead + AsyncWrite + Unpin,
    {
        let mut stats = PumpStats::default();
        let mut inbound = [0u8; RELAY_CHUNK];
        let mut outbound = [0u8; RELAY_CHUNK];

        let outcome = loop {
            tokio::select! {
                read = client.read(&mut inbound) => match read {
                    Ok(0) => {
                        trace!("client EOF, ending session");
                        break Ok(());
                    }
                    Ok(n) => {
                        if let Err(e) = channel.write_all(&inbound[..n]).await {
                            break Err(e);
                        }
                        stats.client_to_remote += n as u64;
                    }
                    Err(e) if is_disconnect(&e) => {
                        trace!("client disconnected: {e}");
                        break Ok(());
                    }
                    Err(e) => break Err(e),
                },
                read = channel.read(&mut outbound) => match read {
                    Ok(0) => {
                        trace!("remote EOF, ending session");
                        break Ok(());
                    }
                    Ok(n) => {
                        if let Err(e) = client.write_all(&outbound[..n]).await {
                            if is_disconnect(&e) {
                                trace!("client disconnected: {e}");
                                break Ok(());
                            }
                            break Err(e);
                        }
                        stats.remote_to_client += n as u64;
                    }
                    Err(e) if is_disconnect(&e) => {
                        trace!("remote disconnected: {e}");
                        break Ok(());
                    }
                    Err(e) => break Err(e),
                },
            }
        };

        // Close both endpoints regardless of how the loop ended.
        let _ = channel.shutdown().await;
        let _ = client.shutdown().await;

        outcome.map(|()| stats).map_err(Error::Io)
    }
}

fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
    )
}
