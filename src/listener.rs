//! Observer hooks into connection lifecycle events, delivered from the
//! thread that drove the engine transition, outside its lock.

use std::net::SocketAddr;

use crate::error::FailureReason;

/// All methods default to doing nothing, so callers only implement the
/// events they care about.
pub trait ConnectionListener: Send + Sync {
    fn connection_opened(&self, _peer: SocketAddr) {}
    fn connection_closed(&self, _peer: SocketAddr) {}
    fn connection_failure(&self, _peer: SocketAddr, _reason: FailureReason) {}
}

/// A listener that logs every event at `info`/`warn` level. Useful as a
/// default for demos and as a template for a real listener.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingListener;

impl ConnectionListener for LoggingListener {
    fn connection_opened(&self, peer: SocketAddr) {
        log::info!("connection established with {peer}");
    }

    fn connection_closed(&self, peer: SocketAddr) {
        log::info!("connection with {peer} closed");
    }

    fn connection_failure(&self, peer: SocketAddr, reason: FailureReason) {
        log::warn!("connection with {peer} failed: {reason:?}");
    }
}
