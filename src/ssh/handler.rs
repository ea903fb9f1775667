use crate::error::Error;

/// Host key verification policy for a hop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCheck {
    /// Accept any server key without verification.
    AcceptAny,
    /// Verify the server key against a known_hosts file.
    KnownHostsFile(String),
}

/// russh client handler carrying the verification policy for one hop.
#[derive(Debug, Clone)]
pub struct TransportHandler {
    hostname: String,
    port: u16,
    check: HostCheck,
}

impl TransportHandler {
    pub fn new(hostname: String, port: u16, check: HostCheck) -> Self {
        Self {
            hostname,
            port,
            check,
        }
    }
}

impl russh::client::Handler for TransportHandler {
    type Error = Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        match &self.check {
            HostCheck::AcceptAny => Ok(true),
            HostCheck::KnownHostsFile(path) => russh::keys::check_known_hosts_path(
                &self.hostname,
                self.port,
                server_public_key,
                path,
            )
            .map_err(|_| Error::HostKey(format!("{}:{}", self.hostname, self.port))),
        }
    }
}
