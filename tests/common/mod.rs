//! An in-process datagram transport test double with injectable loss,
//! duplication and reordering, so the end-to-end tests can exercise the
//! real `Server`/`Client` threads without a real socket or real network
//! conditions to wait on.

use std::io;
use std::net::SocketAddr;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TryRecvError};
use std::sync::Mutex;
use std::time::Duration;

use rudp::{Client, Connection, DatagramTransport, Profile, Server};

pub type Shaper = dyn Fn(Vec<u8>) -> Vec<Vec<u8>> + Send + Sync;

pub fn identity_shaper() -> Box<Shaper> {
    Box::new(|datagram| vec![datagram])
}

/// Drops the `n`-th datagram sent through it (0-indexed), delivering
/// everything else untouched.
pub fn drop_nth_shaper(n: usize) -> Box<Shaper> {
    let seen = Mutex::new(0usize);
    Box::new(move |datagram| {
        let mut count = seen.lock().unwrap();
        let this = *count;
        *count += 1;
        if this == n {
            vec![]
        } else {
            vec![datagram]
        }
    })
}

/// Passes the first `skip` datagrams through untouched (so a handshake
/// ahead of the traffic under test isn't disturbed), then holds the next
/// one and delivers it after the one after that, swapping their order.
pub fn reorder_once_after_shaper(skip: usize) -> Box<Shaper> {
    let state: Mutex<(usize, Option<Vec<u8>>)> = Mutex::new((0, None));
    Box::new(move |datagram| {
        let mut s = state.lock().unwrap();
        if s.0 < skip {
            s.0 += 1;
            return vec![datagram];
        }
        match s.1.take() {
            None => {
                s.1 = Some(datagram);
                vec![]
            }
            Some(previous) => vec![datagram, previous],
        }
    })
}

pub struct LoopbackTransport {
    local: SocketAddr,
    peer: SocketAddr,
    rx: Mutex<Receiver<Vec<u8>>>,
    tx: SyncSender<Vec<u8>>,
    shaper: Box<Shaper>,
    read_timeout: Mutex<Option<Duration>>,
}

impl LoopbackTransport {
    /// Builds a connected pair: `a` talks to `b` through `shaper_a_to_b`,
    /// `b` talks to `a` through `shaper_b_to_a`.
    pub fn pair(
        addr_a: SocketAddr,
        addr_b: SocketAddr,
        shaper_a_to_b: Box<Shaper>,
        shaper_b_to_a: Box<Shaper>,
    ) -> (LoopbackTransport, LoopbackTransport) {
        let (tx_to_b, rx_at_b) = sync_channel(1024);
        let (tx_to_a, rx_at_a) = sync_channel(1024);

        let a = LoopbackTransport {
            local: addr_a,
            peer: addr_b,
            rx: Mutex::new(rx_at_a),
            tx: tx_to_b,
            shaper: shaper_a_to_b,
            read_timeout: Mutex::new(None),
        };
        let b = LoopbackTransport {
            local: addr_b,
            peer: addr_a,
            rx: Mutex::new(rx_at_b),
            tx: tx_to_a,
            shaper: shaper_b_to_a,
            read_timeout: Mutex::new(None),
        };
        (a, b)
    }
}

impl DatagramTransport for LoopbackTransport {
    fn send_to(&self, buf: &[u8], peer: SocketAddr) -> io::Result<usize> {
        if peer != self.peer {
            return Err(io::Error::new(io::ErrorKind::Other, "unknown peer"));
        }
        let len = buf.len();
        for datagram in (self.shaper)(buf.to_vec()) {
            let _ = self.tx.send(datagram);
        }
        Ok(len)
    }

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let timeout = *self.read_timeout.lock().unwrap();
        let rx = self.rx.lock().unwrap();
        let datagram = match timeout {
            Some(d) => rx
                .recv_timeout(d)
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "loopback recv timed out"))?,
            None => match rx.try_recv() {
                Ok(d) => d,
                Err(TryRecvError::Empty) => {
                    return Err(io::Error::new(io::ErrorKind::WouldBlock, "no datagram"))
                }
                Err(TryRecvError::Disconnected) => {
                    return Err(io::Error::new(io::ErrorKind::Other, "peer gone"))
                }
            },
        };
        let n = datagram.len().min(buf.len());
        buf[..n].copy_from_slice(&datagram[..n]);
        Ok((n, self.peer))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.local)
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        *self.read_timeout.lock().unwrap() = timeout;
        Ok(())
    }
}

/// Spins up a real `Server` and a real `Client::connect` over a pair of
/// loopback transports shaped as requested, returning the bound server
/// and the client's already-established connection.
pub fn connect_over(
    shaper_client_to_server: Box<Shaper>,
    shaper_server_to_client: Box<Shaper>,
    profile: Profile,
) -> (Server, Connection) {
    let addr_client: SocketAddr = "127.0.0.1:40001".parse().unwrap();
    let addr_server: SocketAddr = "127.0.0.1:40002".parse().unwrap();
    let (client_transport, server_transport) = LoopbackTransport::pair(
        addr_client,
        addr_server,
        shaper_client_to_server,
        shaper_server_to_client,
    );

    let server = Server::bind_with_transport(std::sync::Arc::new(server_transport), 4, profile)
        .expect("server bind");
    let conn = Client::connect_with_transport(
        std::sync::Arc::new(client_transport),
        addr_server,
        profile,
    )
    .expect("client connect");

    (server, conn)
}
