//! Client-side connect: a single outbound connection on its own socket,
//! driven by one dedicated background thread rather than a shared
//! demultiplexer (there is only ever one peer to demux).

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::{Duration, Instant};

use crate::connection::Engine;
use crate::error::{Result, RudpError};
use crate::handle::ConnHandle;
use crate::profile::Profile;
use crate::segment::Segment;
use crate::stream::Connection;
use crate::timer::{TimerService, WheelTimer};
use crate::transport::{DatagramTransport, UdpTransport};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Initiates a connection: send SYN, -> SYN-SENT, block for the
/// handshake to finish (or fail).
pub struct Client;

impl Client {
    pub fn connect<A: ToSocketAddrs>(addr: A, profile: Profile) -> Result<Connection> {
        let transport = Arc::new(UdpTransport::bind("0.0.0.0:0")?);
        Self::connect_with_transport(transport, addr, profile)
    }

    pub fn connect_with_transport<A: ToSocketAddrs>(
        transport: Arc<dyn DatagramTransport>,
        addr: A,
        profile: Profile,
    ) -> Result<Connection> {
        let peer = addr
            .to_socket_addrs()
            .map_err(RudpError::Io)?
            .next()
            .ok_or_else(|| RudpError::Malformed("connect address resolved to nothing".into()))?;
        transport.set_read_timeout(Some(POLL_INTERVAL))?;

        let now = Instant::now();
        let (engine, outcome) = Engine::connect(profile, now);
        let handle = ConnHandle::new(engine, transport.clone(), peer, Vec::new());
        handle.drive(outcome);

        let timer = WheelTimer::new();
        let pending_ticks: Arc<Mutex<Vec<Arc<ConnHandle>>>> = Arc::new(Mutex::new(Vec::new()));
        let weak: Weak<ConnHandle> = Arc::downgrade(&handle);
        let queue = pending_ticks.clone();
        timer.schedule_periodic(
            TICK_INTERVAL,
            Box::new(move || {
                if let Some(h) = weak.upgrade() {
                    queue.lock().unwrap().push(h);
                }
            }),
        );

        let shutdown = Arc::new(AtomicBool::new(false));
        let worker_handle = handle.clone();
        let worker_transport = transport.clone();
        let worker_shutdown = shutdown.clone();
        let worker_ticks = pending_ticks.clone();
        thread::spawn(move || {
            // `timer` and its periodic registration are kept alive for the
            // connection's lifetime by this closure's captured drop.
            let _timer = timer;
            client_recv_loop(worker_handle, worker_transport, worker_shutdown, worker_ticks);
        });

        handle.wait_established()?;
        Ok(Connection::new(handle))
    }
}

fn client_recv_loop(
    handle: Arc<ConnHandle>,
    transport: Arc<dyn DatagramTransport>,
    shutdown: Arc<AtomicBool>,
    pending_ticks: Arc<Mutex<Vec<Arc<ConnHandle>>>>,
) {
    let mut buf = vec![0u8; 65536];
    loop {
        if shutdown.load(Ordering::Acquire) || handle.is_closed() {
            return;
        }
        match transport.recv_from(&mut buf) {
            Ok((n, from)) => {
                if from != handle.peer_addr() {
                    continue;
                }
                match Segment::parse(&buf[..n]) {
                    Ok(seg) => handle.on_segment(seg, Instant::now()),
                    Err(e) => log::debug!("malformed segment from {from}: {e}"),
                }
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
            Err(e) => {
                log::warn!("client recv_from failed: {e}");
                return;
            }
        }

        let due: Vec<_> = {
            let mut q = pending_ticks.lock().unwrap();
            q.drain(..).collect()
        };
        let now = Instant::now();
        for h in due {
            h.on_tick(now);
        }
    }
}
