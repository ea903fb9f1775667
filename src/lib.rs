//! hopchain — SSH jump-host tunnel chains.
//!
//! Builds an encrypted path through an ordered sequence of jump hosts and
//! uses it three ways: executing remote commands on any hop, forwarding a
//! local TCP port to a host reachable from the terminal hop, and
//! transferring files to and from the terminal hop.
//!
//! ```no_run
//! use std::time::Duration;
//! use hopchain::{ForwardServer, HopInfo, TunnelChain};
//!
//! # async fn run() -> hopchain::Result<()> {
//! let mut chain = TunnelChain::from_hops([
//!     HopInfo::new("bastion.example.com", 22, "ops", "secret")?,
//!     HopInfo::new("10.0.0.5", 22, "app", "secret2")?,
//! ]);
//! chain.init_tunnel().await?;
//!
//! let server = ForwardServer::new(&chain, "10.0.0.9", 80)?;
//! server.listen(8080).await?;
//! # Ok(())
//! # }
//! ```

pub mod chain;
pub mod error;
pub mod forward;
pub mod ssh;
pub mod transfer;

pub use chain::{CommandReply, HopInfo, ReplyHandler, TunnelChain};
pub use error::{Error, Result};
pub use forward::{BytePump, ForwardServer, ForwardStatus, PumpStats};
pub use ssh::{HostCheck, Transport};
pub use transfer::{FileTransfer, ProgressHandler, TransferProgress};
