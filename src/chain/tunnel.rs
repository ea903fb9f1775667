use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::hop::{Hop, HopInfo, QueuedCommand, ReplyHandler};
use crate::error::{Error, Result};
use crate::ssh::{HostCheck, Transport};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// An ordered path of hops authenticated strictly in sequence.
///
/// Build the chain with [`append`], authenticate it with [`init_tunnel`],
/// then hand the terminal [`transport`] to the forwarding or transfer layer.
/// The hop relation is a tree (each hop owns its children and keeps an index
/// back-reference to its parent), but the path used for forwarding and file
/// copy is the single root-to-tail line built by `append`.
///
/// [`append`]: TunnelChain::append
/// [`init_tunnel`]: TunnelChain::init_tunnel
/// [`transport`]: TunnelChain::transport
pub struct TunnelChain {
    pub(crate) hops: Vec<Hop>,
    pub(crate) initialized: bool,
    host_check: HostCheck,
    connect_timeout: Duration,
}

impl TunnelChain {
    pub fn new() -> Self {
        Self {
            hops: Vec::new(),
            initialized: false,
            host_check: HostCheck::AcceptAny,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Build a chain from an ordered list of hop entries, root hop first.
    pub fn from_hops(infos: impl IntoIterator<Item = HopInfo>) -> Self {
        let mut chain = Self::new();
        for info in infos {
            chain.append(info);
        }
        chain
    }

    /// Set the per-hop connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the host key verification policy applied to every hop.
    pub fn with_host_check(mut self, check: HostCheck) -> Self {
        self.host_check = check;
        self
    }

    /// Add a hop at the tail, parented to the current tail. Returns the new
    /// hop's index.
    pub fn append(&mut self, info: HopInfo) -> usize {
        let index = self.hops.len();
        let parent = index.checked_sub(1);
        if let Some(p) = parent {
            self.hops[p].children.push(index);
        }
        self.hops.push(Hop::new(info, parent));
        index
    }

    /// Queue a command on the hop at `index`, to be executed by
    /// [`run_cmd`](TunnelChain::run_cmd).
    pub fn add_command(
        &mut self,
        index: usize,
        command: impl Into<String>,
        handler: Option<Arc<dyn ReplyHandler>>,
    ) -> Result<()> {
        let hop = self
            .hops
            .get_mut(index)
            .ok_or_else(|| Error::Chain(format!("no hop at index {index}")))?;
        hop.commands.push(QueuedCommand {
            command: command.into(),
            handler,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    /// Whether `init_tunnel` has completed for every hop.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Authenticate all hops strictly in order.
    ///
    /// The root hop connects directly; every subsequent hop is reached over
    /// a `direct-tcpip` channel opened on its parent's transport, so hop *k*
    /// cannot begin before hop *k-1* holds a live transport. A failure at
    /// hop *k* aborts the remaining hops while hops before it keep their
    /// transports; re-invoking resumes at the first hop without one.
    pub async fn init_tunnel(&mut self) -> Result<()> {
        if self.hops.is_empty() {
            return Err(Error::Chain("chain has no hops".to_string()));
        }

        for i in 0..self.hops.len() {
            if self.hops[i].transport.is_some() {
                debug!("hop {} already authenticated, skipping", self.hops[i].info);
                continue;
            }

            let info = self.hops[i].info.clone();
            let transport = match self.hops[i].parent {
                None => {
                    Transport::connect(
                        &info.host,
                        info.port,
                        &info.username,
                        &info.password,
                        self.host_check.clone(),
                        self.connect_timeout,
                    )
                    .await?
                }
                Some(p) => {
                    let parent = self.hops[p].transport.as_ref().ok_or_else(|| {
                        Error::Chain(format!(
                            "parent of hop {} has no transport",
                            info.connection_string()
                        ))
                    })?;
                    Transport::connect_via(
                        parent,
                        &info.host,
                        info.port,
                        &info.username,
                        &info.password,
                        self.host_check.clone(),
                        self.connect_timeout,
                    )
                    .await?
                }
            };

            info!("authenticated hop {} of {}: {}", i + 1, self.hops.len(), info);
            self.hops[i].transport = Some(transport);
        }

        self.initialized = true;
        Ok(())
    }

    /// The terminal hop's transport.
    pub fn transport(&self) -> Result<&Transport> {
        if !self.initialized {
            return Err(Error::Chain(
                "tunnel not initialized, call init_tunnel first".to_string(),
            ));
        }
        self.hops
            .last()
            .and_then(|hop| hop.transport.as_ref())
            .ok_or_else(|| Error::Chain("terminal hop has no transport".to_string()))
    }

    /// Release hops in leaf-to-root order. Channels opened on a transport
    /// must be closed before this is called. Idempotent: a second call finds
    /// no transports and does nothing.
    pub async fn close(&mut self) {
        for hop in self.hops.iter_mut().rev() {
            if let Some(transport) = hop.transport.take() {
                if let Err(e) = transport.disconnect().await {
                    warn!("error closing transport to {}: {e}", hop.info);
                }
            }
        }
        self.initialized = false;
    }
}

impl Default for TunnelChain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hop(host: &str) -> HopInfo {
        HopInfo::new(host, 22, "user", "pw").unwrap()
    }

    #[test]
    fn test_append_parents_to_tail() {
        let mut chain = TunnelChain::new();
        assert_eq!(chain.append(hop("a")), 0);
        assert_eq!(chain.append(hop("b")), 1);
        assert_eq!(chain.append(hop("c")), 2);

        assert_eq!(chain.hops[0].parent, None);
        assert_eq!(chain.hops[1].parent, Some(0));
        assert_eq!(chain.hops[2].parent, Some(1));
        assert_eq!(chain.hops[0].children, vec![1]);
        assert_eq!(chain.hops[1].children, vec![2]);
        assert!(chain.hops[2].children.is_empty());
    }

    #[test]
    fn test_from_hops_preserves_order() {
        let chain = TunnelChain::from_hops([hop("root"), hop("mid"), hop("leaf")]);
        assert_eq!(chain.len(), 3);
        assert_eq!(chain.hops[0].info.host, "root");
        assert_eq!(chain.hops[2].info.host, "leaf");
    }

    #[test]
    fn test_transport_before_init_fails() {
        let chain = TunnelChain::from_hops([hop("a")]);
        assert!(matches!(chain.transport(), Err(Error::Chain(_))));
    }

    #[tokio::test]
    async fn test_init_tunnel_empty_chain_fails() {
        let mut chain = TunnelChain::new();
        assert!(matches!(chain.init_tunnel().await, Err(Error::Chain(_))));
    }

    #[test]
    fn test_add_command_bounds() {
        let mut chain = TunnelChain::from_hops([hop("a")]);
        assert!(chain.add_command(0, "pwd", None).is_ok());
        assert!(matches!(
            chain.add_command(5, "pwd", None),
            Err(Error::Chain(_))
        ));
        assert_eq!(chain.hops[0].commands.len(), 1);
        assert_eq!(chain.hops[0].commands[0].command, "pwd");
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mut chain = TunnelChain::from_hops([hop("a"), hop("b")]);
        chain.close().await;
        chain.close().await;
        assert!(!chain.is_initialized());
    }

    #[test]
    fn test_builder_configuration() {
        let chain = TunnelChain::new()
            .with_connect_timeout(Duration::from_secs(5))
            .with_host_check(HostCheck::AcceptAny);
        assert_eq!(chain.connect_timeout, Duration::from_secs(5));
        assert_eq!(chain.host_check, HostCheck::AcceptAny);
    }
}
