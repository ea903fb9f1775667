use std::io;
use std::path::PathBuf;

/// Errors produced by chain construction, tunnel authentication, command
/// execution, forwarding and file transfer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A hop entry failed validation before any network activity.
    #[error("invalid hop configuration: {0}")]
    Config(String),

    /// The hop refused the supplied credentials.
    #[error("authentication failed for {user}@{host}:{port}")]
    Authentication {
        host: String,
        port: u16,
        user: String,
    },

    /// The hop could not be reached or the handshake did not complete.
    #[error("failed to connect to {host}:{port}: {reason}")]
    Connect {
        host: String,
        port: u16,
        reason: String,
    },

    /// The chain is in the wrong state for the requested operation.
    #[error("chain error: {0}")]
    Chain(String),

    /// The remote side refused to open a channel.
    #[error("channel to {target} rejected: {reason}")]
    ChannelRejected { target: String, reason: String },

    /// The server's host key failed verification.
    #[error("host key verification failed for {0}")]
    HostKey(String),

    /// The remote end broke the subsystem protocol mid-operation.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The local file to upload does not exist or is not a regular file.
    #[error("source file not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("ssh error: {0}")]
    Ssh(#[from] russh::Error),
}

impl From<russh_sftp::client::error::Error> for Error {
    fn from(e: russh_sftp::client::error::Error) -> Self {
        Error::Protocol(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
