//! Server-side demultiplexer: one bound socket, many peers. A single
//! background thread maps incoming datagrams to per-peer connection
//! state by source address, the same shape as a segment-loop thread
//! fanning datagrams out to per-quad state — generalized from TCP's
//! four-tuple demux key to RUDP's simpler peer-address key, since one
//! bound UDP socket here plays the role several raw sockets play there.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread;
use std::time::{Duration, Instant};

use crate::connection::Engine;
use crate::error::{Result, RudpError};
use crate::handle::ConnHandle;
use crate::listener::ConnectionListener;
use crate::profile::Profile;
use crate::segment::Segment;
use crate::stream::Connection;
use crate::timer::{TimerService, WheelTimer};
use crate::transport::{DatagramTransport, UdpTransport};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const TICK_INTERVAL: Duration = Duration::from_millis(100);

struct ServerState {
    connections: HashMap<SocketAddr, Arc<ConnHandle>>,
    backlog: VecDeque<Connection>,
    backlog_peers: HashSet<SocketAddr>,
    closed: bool,
}

struct ServerInner {
    transport: Arc<dyn DatagramTransport>,
    timer: WheelTimer,
    profile: Profile,
    backlog_cap: usize,
    state: Mutex<ServerState>,
    accept_cvar: Condvar,
    accept_timeout: Mutex<Option<Duration>>,
    listeners: Mutex<Vec<Arc<dyn ConnectionListener>>>,
    pending_ticks: Arc<Mutex<Vec<Arc<ConnHandle>>>>,
    shutdown: AtomicBool,
}

/// A bound RUDP server accepting connections from any number of peers.
pub struct Server {
    inner: Arc<ServerInner>,
    recv_thread: Option<thread::JoinHandle<()>>,
}

impl Server {
    pub fn bind<A: ToSocketAddrs>(addr: A, backlog: usize, profile: Profile) -> Result<Server> {
        let transport = Arc::new(UdpTransport::bind(addr)?);
        Self::bind_with_transport(transport, backlog, profile)
    }

    pub fn bind_with_transport(
        transport: Arc<dyn DatagramTransport>,
        backlog: usize,
        profile: Profile,
    ) -> Result<Server> {
        transport.set_read_timeout(Some(POLL_INTERVAL))?;

        let inner = Arc::new(ServerInner {
            transport,
            timer: WheelTimer::new(),
            profile,
            backlog_cap: backlog.max(1),
            state: Mutex::new(ServerState {
                connections: HashMap::new(),
                backlog: VecDeque::new(),
                backlog_peers: HashSet::new(),
                closed: false,
            }),
            accept_cvar: Condvar::new(),
            accept_timeout: Mutex::new(None),
            listeners: Mutex::new(Vec::new()),
            pending_ticks: Arc::new(Mutex::new(Vec::new())),
            shutdown: AtomicBool::new(false),
        });

        let worker = inner.clone();
        let recv_thread = thread::spawn(move || recv_loop(worker));

        Ok(Server {
            inner,
            recv_thread: Some(recv_thread),
        })
    }

    pub fn add_listener(&self, listener: Arc<dyn ConnectionListener>) {
        self.inner.listeners.lock().unwrap().push(listener);
    }

    /// Blocks until a handshake completes, returning the new connection.
    /// Respects [`Server::set_timeout`].
    pub fn accept(&self) -> Result<Connection> {
        let mut state = self.inner.state.lock().unwrap();
        loop {
            if let Some(conn) = state.backlog.pop_front() {
                state.backlog_peers.remove(&conn.peer_addr());
                return Ok(conn);
            }
            if state.closed {
                return Err(RudpError::Closed);
            }
            let timeout = *self.inner.accept_timeout.lock().unwrap();
            match timeout {
                Some(d) => {
                    let (guard, result) = self.inner.accept_cvar.wait_timeout(state, d).unwrap();
                    state = guard;
                    if result.timed_out() && state.backlog.is_empty() {
                        return Err(RudpError::Timeout);
                    }
                }
                None => {
                    state = self.inner.accept_cvar.wait(state).unwrap();
                }
            }
        }
    }

    pub fn set_timeout(&self, millis: Option<u64>) {
        *self.inner.accept_timeout.lock().unwrap() = millis.map(Duration::from_millis);
    }

    pub fn get_timeout(&self) -> Option<u64> {
        self.inner
            .accept_timeout
            .lock()
            .unwrap()
            .map(|d| d.as_millis() as u64)
    }

    pub fn get_local_port(&self) -> io::Result<u16> {
        Ok(self.inner.transport.local_addr()?.port())
    }

    /// Closes every open connection and stops accepting new ones. Does
    /// not wait for peers to acknowledge their FINs.
    pub fn close(&self) {
        let mut state = self.inner.state.lock().unwrap();
        if state.closed {
            return;
        }
        state.closed = true;
        let conns: Vec<_> = state.connections.values().cloned().collect();
        drop(state);
        for c in conns {
            c.close();
        }
        self.inner.shutdown.store(true, Ordering::Release);
        self.inner.accept_cvar.notify_all();
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.close();
        if let Some(t) = self.recv_thread.take() {
            let _ = t.join();
        }
    }
}

impl ServerInner {
    fn notify_listeners_snapshot(&self) -> Vec<Arc<dyn ConnectionListener>> {
        self.listeners.lock().unwrap().clone()
    }

    fn on_datagram(self: &Arc<Self>, peer: SocketAddr, bytes: &[u8]) {
        let seg = match Segment::parse(bytes) {
            Ok(s) => s,
            Err(e) => {
                log::debug!("malformed segment from {peer}: {e}");
                return;
            }
        };
        let now = Instant::now();

        let existing = self.state.lock().unwrap().connections.get(&peer).cloned();
        if let Some(handle) = existing {
            handle.on_segment(seg, now);
            self.maybe_enqueue_backlog(peer, &handle);
            self.reap_if_closed(peer, &handle);
            return;
        }

        if let Segment::Syn { seq, params, .. } = seg {
            if crate::connection::validate_peer_params(&params) {
                self.accept_new(peer, seq, now);
            } else {
                let rst = Segment::Rst { seq: 0, ack: None };
                let _ = self.transport.send_to(&rst.serialize(), peer);
            }
        }
        // Any other segment from an unknown peer is safely discarded.
    }

    fn accept_new(self: &Arc<Self>, peer: SocketAddr, syn_seq: u8, now: Instant) {
        let mut state = self.state.lock().unwrap();
        if state.closed || state.connections.contains_key(&peer) {
            return;
        }
        let (engine, outcome) = Engine::accept(self.profile, syn_seq, now);
        let listeners = self.notify_listeners_snapshot();
        let handle = ConnHandle::new(engine, self.transport.clone(), peer, listeners);
        state.connections.insert(peer, handle.clone());
        drop(state);

        handle.drive(outcome);
        self.schedule_ticks(&handle);
    }

    fn maybe_enqueue_backlog(&self, peer: SocketAddr, handle: &Arc<ConnHandle>) {
        if !handle.is_established() {
            return;
        }
        let mut state = self.state.lock().unwrap();
        if state.backlog_peers.contains(&peer) {
            return;
        }
        if state.backlog.len() >= self.backlog_cap {
            // Backlog full; the peer keeps retransmitting its last
            // segment until a slot frees up or it gives up.
            return;
        }
        state.backlog_peers.insert(peer);
        state.backlog.push_back(Connection::new(handle.clone()));
        drop(state);
        self.accept_cvar.notify_one();
    }

    fn reap_if_closed(&self, peer: SocketAddr, handle: &Arc<ConnHandle>) {
        if !handle.is_closed() {
            return;
        }
        let mut state = self.state.lock().unwrap();
        state.connections.remove(&peer);
    }

    fn schedule_ticks(&self, handle: &Arc<ConnHandle>) {
        let weak: Weak<ConnHandle> = Arc::downgrade(handle);
        let queue = self.pending_ticks.clone();
        self.timer.schedule_periodic(
            TICK_INTERVAL,
            Box::new(move || {
                if let Some(h) = weak.upgrade() {
                    queue.lock().unwrap().push(h);
                }
            }),
        );
    }

    fn drain_pending_ticks(self: &Arc<Self>) {
        let due: Vec<_> = {
            let mut q = self.pending_ticks.lock().unwrap();
            q.drain(..).collect()
        };
        let now = Instant::now();
        for handle in due {
            handle.on_tick(now);
            self.maybe_enqueue_backlog(handle.peer_addr(), &handle);
            self.reap_if_closed(handle.peer_addr(), &handle);
        }
    }
}

fn recv_loop(inner: Arc<ServerInner>) {
    let mut buf = vec![0u8; 65536];
    loop {
        if inner.shutdown.load(Ordering::Acquire) {
            return;
        }
        match inner.transport.recv_from(&mut buf) {
            Ok((n, peer)) => inner.on_datagram(peer, &buf[..n]),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
            Err(e) => log::warn!("server recv_from failed: {e}"),
        }
        inner.drain_pending_ticks();
    }
}
