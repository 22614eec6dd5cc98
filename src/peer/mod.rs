//! Peer management module
//!
//! Peer records, the per-connection request queue, pure message dispatch and
//! the socket-driving connection.

pub mod connection;
pub mod dispatch;
pub mod queue;
pub mod state;

// Re-export main types
pub use connection::{ConnectionConfig, HostState, PeerConnection, PeerHost};
pub use dispatch::{dispatch, ConnectionState, Effect};
pub use queue::RequestQueue;
pub use state::{Peer, PeerPhase, PeerSnapshot, SpeedWindow};
