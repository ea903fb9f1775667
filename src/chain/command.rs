//! FIFO execution of the commands queued on each hop.

use std::time::Duration;

use russh::ChannelMsg;
use tracing::{debug, warn};

use super::hop::CommandReply;
use super::tunnel::TunnelChain;
use crate::error::{Error, Result};
use crate::ssh::Transport;

/// How long to keep draining channel messages after the wait window. Output
/// buffered by the provider is returned immediately; this only bounds the
/// final empty poll.
const DRAIN_GRACE: Duration = Duration::from_millis(50);

impl TunnelChain {
    /// Execute every hop's queued commands in FIFO order.
    ///
    /// Each command runs on its own exec channel over the owning hop's
    /// transport: the command is sent, `interval` elapses, and whatever
    /// output has arrived by then is handed to the registered reply handler.
    /// A failing command is reported to its handler and does not abort the
    /// rest of the queue.
    ///
    /// Known limitation: output capture is interval-based, not
    /// completion-based. Output a slow command produces after the wait
    /// window is lost.
    pub async fn run_cmd(&mut self, interval: Duration) -> Result<()> {
        if !self.initialized {
            return Err(Error::Chain(
                "run_cmd requires an initialized tunnel".to_string(),
            ));
        }

        for i in 0..self.hops.len() {
            let transport = match self.hops[i].transport.clone() {
                Some(t) => t,
                None => {
                    return Err(Error::Chain(format!(
                        "hop {} has no transport",
                        self.hops[i].info
                    )))
                }
            };
            let host = self.hops[i].info.host.clone();
            let queued = std::mem::take(&mut self.hops[i].commands);

            for entry in queued {
                debug!("executing '{}' on {host}", entry.command);
                let reply = match execute_once(&transport, &entry.command, interval).await {
                    Ok(output) => CommandReply {
                        host: host.clone(),
                        command: entry.command,
                        output,
                        success: true,
                    },
                    Err(e) => {
                        warn!("command failed on {host}: {e}");
                        CommandReply {
                            host: host.clone(),
                            command: entry.command,
                            output: e.to_string(),
                            success: false,
                        }
                    }
                };
                if let Some(handler) = entry.handler {
                    handler.on_reply(reply).await;
                }
            }
        }

        Ok(())
    }
}

/// Run one command on a fresh exec channel and capture the output available
/// after `interval`.
async fn execute_once(transport: &Transport, command: &str, interval: Duration) -> Result<String> {
    let mut channel = transport.open_session().await?;
    channel.exec(true, command).await?;

    tokio::time::sleep(interval).await;

    let mut output = Vec::new();
    loop {
        match tokio::time::timeout(DRAIN_GRACE, channel.wait()).await {
            Ok(Some(ChannelMsg::Data { ref data })) => output.extend_from_slice(data),
            Ok(Some(ChannelMsg::ExtendedData { ref data, ext })) => {
                if ext == 1 {
                    output.extend_from_slice(data);
                }
            }
            Ok(Some(ChannelMsg::Eof | ChannelMsg::Close)) | Ok(None) => break,
            Ok(Some(_)) => {}
            // Nothing more buffered inside the window.
            Err(_) => break,
        }
    }

    let _ = channel.close().await;
    Ok(String::from_utf8_lossy(&output).to_string())
}
