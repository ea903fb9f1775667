//! Tunnel chain construction and sequential authentication.
//!
//! A chain is an ordered path of hops where hop *i*'s encrypted session is
//! carried inside a channel of hop *i-1*'s session. The chain owns its hops,
//! drives their authentication strictly in order, and exposes the terminal
//! hop's transport to the forwarding and transfer layers.

pub mod command;
pub mod hop;
pub mod tunnel;

pub use hop::{CommandReply, HopInfo, ReplyHandler};
pub use tunnel::TunnelChain;
