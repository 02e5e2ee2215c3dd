//! Gateway event system.

use std::net::SocketAddr;
use tokio::sync::broadcast;

/// Events emitted by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    /// Listener is bound and serving.
    Started {
        /// Bound address.
        addr: SocketAddr,
    },

    /// Gateway is shutting down.
    ShuttingDown,

    /// A full verification minted a new upload session.
    SessionCreated {
        /// Uploader address (lowercase).
        uploader: String,
        /// Batch the session is bound to.
        batch_id: String,
    },

    /// An upload was admitted on an existing session.
    SessionReused {
        /// Uploader address (lowercase).
        uploader: String,
        /// Files admitted under the session so far.
        file_count: u64,
    },

    /// An upload was rejected.
    UploadRejected {
        /// HTTP status returned to the caller.
        status: u16,
        /// Rejection message.
        reason: String,
    },

    /// The periodic sweep removed expired sessions.
    SessionsSwept {
        /// Number of sessions removed.
        removed: usize,
    },
}

/// Channel for receiving gateway events.
pub type GatewayEventsChannel = broadcast::Receiver<GatewayEvent>;

/// Sender for gateway events.
pub type GatewayEventsSender = broadcast::Sender<GatewayEvent>;

/// Create a new event channel pair.
#[must_use]
pub fn create_event_channel() -> (GatewayEventsSender, GatewayEventsChannel) {
    broadcast::channel(256)
}
