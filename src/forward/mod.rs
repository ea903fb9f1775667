//! TCP port forwarding through the chain's terminal transport.
//!
//! A [`ForwardServer`] accepts connections on a local port and relays each
//! one to a fixed remote target over its own `direct-tcpip` channel. Every
//! accepted connection runs on an independent task, so one stalled client
//! cannot block others, and per-session failures never reach the listener.

pub mod pump;
pub mod server;

pub use pump::{BytePump, PumpStats};
pub use server::{ForwardServer, ForwardStatus};
