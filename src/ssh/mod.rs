//! Thin wrapper around the russh session provider.
//!
//! The SSH protocol itself (handshake, ciphers, channel multiplexing) is
//! consumed as a black box; this module only packages an authenticated
//! session as a [`Transport`] that the chain, forwarding, and transfer
//! layers share.

pub mod handler;
pub mod transport;

pub use handler::{HostCheck, TransportHandler};
pub use transport::Transport;
