use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use zeroize::Zeroizing;

use crate::error::{Error, Result};
use crate::ssh::Transport;

/// Connection info for one hop in the chain.
#[derive(Clone)]
pub struct HopInfo {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub(crate) password: Zeroizing<String>,
}

impl HopInfo {
    /// Validate and build a hop entry.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self> {
        let host = host.into();
        let username = username.into();

        if host.trim().is_empty() {
            return Err(Error::Config("host cannot be empty".to_string()));
        }
        if port == 0 {
            return Err(Error::Config(format!("invalid port for host '{host}'")));
        }
        if username.trim().is_empty() {
            return Err(Error::Config(format!(
                "username cannot be empty for host '{host}'"
            )));
        }

        Ok(Self {
            host,
            port,
            username,
            password: Zeroizing::new(password.into()),
        })
    }

    /// `user@host:port` form for logs and error messages.
    pub fn connection_string(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.port)
    }
}

impl fmt::Display for HopInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.connection_string())
    }
}

impl fmt::Debug for HopInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HopInfo")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Raw output of one executed command, delivered to a [`ReplyHandler`].
#[derive(Debug, Clone)]
pub struct CommandReply {
    /// Host the command ran on.
    pub host: String,
    /// The command text as queued.
    pub command: String,
    /// Output captured during the wait window, or the error text when
    /// `success` is false.
    pub output: String,
    pub success: bool,
}

/// Receives the reply of one executed command.
#[async_trait]
pub trait ReplyHandler: Send + Sync {
    async fn on_reply(&self, reply: CommandReply);
}

/// A command queued on a hop, paired with its optional reply handler.
pub(crate) struct QueuedCommand {
    pub command: String,
    pub handler: Option<Arc<dyn ReplyHandler>>,
}

/// One link in the authentication chain.
///
/// Hops live in an arena inside the chain; `parent` is the non-owning
/// back-reference used to open the next channel and `children` the owned
/// subtree. The transport is populated only once this hop's own
/// authentication step succeeds.
pub(crate) struct Hop {
    pub info: HopInfo,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub transport: Option<Transport>,
    pub commands: Vec<QueuedCommand>,
}

impl Hop {
    pub fn new(info: HopInfo, parent: Option<usize>) -> Self {
        Self {
            info,
            parent,
            children: Vec::new(),
            transport: None,
            commands: Vec::new(),
        }
    }
}
