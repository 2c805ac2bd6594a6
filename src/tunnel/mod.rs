//! SSH tunnel to the remote database.
//!
//! This module provides:
//! - A loopback listener that forwards every accepted connection over its own channel
//! - The SSH session that supplies those channels as `direct-tcpip` forwards

pub mod forward;
pub mod ssh;

pub use forward::{ChannelOpener, FORWARD_BUFFER_SIZE, LocalForwarder, forward_pair};
pub use ssh::{KeyFormat, SshSettings, TunnelManager, load_identity};
