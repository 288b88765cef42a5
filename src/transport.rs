//! Host datagram transport: an external collaborator, specified here
//! only at its boundary, with a default implementation over
//! [`std::net::UdpSocket`] so the crate is usable without a test double.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

/// Send/receive of UDP datagrams to/from a peer address.
pub trait DatagramTransport: Send + Sync {
    fn send_to(&self, buf: &[u8], peer: SocketAddr) -> io::Result<usize>;
    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;
    fn local_addr(&self) -> io::Result<SocketAddr>;

    /// Bound how long `recv_from` may block so callers can interleave
    /// polling with periodic timer work. `None` blocks indefinitely.
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;
}

/// The default transport: a plain, already-bound UDP socket.
#[derive(Debug)]
pub struct UdpTransport(UdpSocket);

impl UdpTransport {
    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        Ok(UdpTransport(UdpSocket::bind(addr)?))
    }
}

impl DatagramTransport for UdpTransport {
    fn send_to(&self, buf: &[u8], peer: SocketAddr) -> io::Result<usize> {
        self.0.send_to(buf, peer)
    }

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.0.recv_from(buf)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.0.local_addr()
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.0.set_read_timeout(timeout)
    }
}
