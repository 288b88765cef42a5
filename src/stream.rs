//! The public per-connection handle returned by [`crate::Server::accept`]
//! and [`crate::Client::connect`]. Implements [`Read`]/[`Write`] directly,
//! the way a blocking socket stream does, rather than exposing separate
//! half-objects — `close` only shuts the output direction, so a caller
//! that wants the read half to keep draining simply keeps reading after
//! calling it.

use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::RudpError;
use crate::handle::ConnHandle;

/// A reliable, in-order byte stream to a single peer.
#[derive(Clone)]
pub struct Connection {
    handle: Arc<ConnHandle>,
}

impl Connection {
    pub(crate) fn new(handle: Arc<ConnHandle>) -> Self {
        Connection { handle }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.handle.peer_addr()
    }

    /// Shuts down the output direction: queues a FIN after any pending
    /// writes drain. Does not block; see [`Connection::wait_closed`].
    pub fn close(&self) {
        self.handle.close();
    }

    /// Blocks until both directions have fully closed (our FIN sent and
    /// acked, or the connection failed).
    pub fn wait_closed(&self) {
        self.handle.wait_closed();
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    /// Number of unread bytes currently buffered for `read`.
    pub fn available(&self) -> usize {
        self.handle.available()
    }

    /// Shuts down the input direction only: further reads report EOF.
    pub fn shutdown_input(&self) {
        self.handle.shutdown_input()
    }

    /// Shuts down the output direction only. Equivalent to [`Connection::close`].
    pub fn shutdown_output(&self) {
        self.handle.shutdown_output()
    }

    /// Byte capacity of the write-side backpressure buffer
    /// (`max_send_queue_size` segments at this connection's negotiated MSS).
    pub fn get_send_buffer_size(&self) -> usize {
        self.handle.send_buffer_size()
    }

    /// Byte capacity of the out-of-order reassembly buffer
    /// (`max_recv_queue_size` segments at this connection's negotiated MSS).
    pub fn get_receive_buffer_size(&self) -> usize {
        self.handle.receive_buffer_size()
    }
}

impl Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.handle.read(buf).map_err(to_io_error)
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.handle.write(buf).map_err(to_io_error)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn to_io_error(e: RudpError) -> io::Error {
    match e {
        RudpError::Closed => io::Error::new(io::ErrorKind::NotConnected, e),
        RudpError::Timeout => io::Error::new(io::ErrorKind::TimedOut, e),
        other => io::Error::new(io::ErrorKind::Other, other),
    }
}
