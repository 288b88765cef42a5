//! The lock and condition variables shared between a connection's engine
//! and the threads that drive and observe it: the demultiplexer thread
//! that feeds it incoming segments and ticks, and the reader/writer/closer
//! threads blocked waiting on it. Mirrors the lock/condvar pairing a
//! blocking socket stream wraps around its shared state, generalized to
//! three independent wait conditions (read, write, close) instead of one.

use std::net::SocketAddr;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Instant;

use crate::connection::Engine;
use crate::error::{Result, RudpError};
use crate::listener::ConnectionListener;
use crate::segment::Segment;
use crate::transport::DatagramTransport;

pub struct ConnHandle {
    pub(crate) engine: Mutex<Engine>,
    read_cvar: Condvar,
    write_cvar: Condvar,
    close_cvar: Condvar,
    established_cvar: Condvar,
    transport: Arc<dyn DatagramTransport>,
    pub(crate) peer: SocketAddr,
    listeners: Mutex<Vec<Arc<dyn ConnectionListener>>>,
}

impl ConnHandle {
    pub fn new(
        engine: Engine,
        transport: Arc<dyn DatagramTransport>,
        peer: SocketAddr,
        listeners: Vec<Arc<dyn ConnectionListener>>,
    ) -> Arc<Self> {
        Arc::new(ConnHandle {
            engine: Mutex::new(engine),
            read_cvar: Condvar::new(),
            write_cvar: Condvar::new(),
            close_cvar: Condvar::new(),
            established_cvar: Condvar::new(),
            transport,
            peer,
            listeners: Mutex::new(listeners),
        })
    }

    pub fn add_listener(&self, listener: Arc<dyn ConnectionListener>) {
        self.listeners.lock().unwrap().push(listener);
    }

    fn notify_listeners(&self, f: impl Fn(&dyn ConnectionListener)) {
        let listeners = self.listeners.lock().unwrap();
        for l in listeners.iter() {
            f(l.as_ref());
        }
    }

    /// Send every datagram an engine transition produced, wake whichever
    /// condvars it flagged, and fire listener callbacks — all outside the
    /// engine's own lock, which the caller must already have released.
    pub(crate) fn drive(&self, outcome: crate::connection::Outcome) {
        for seg in &outcome.to_send {
            let bytes = seg.serialize();
            if let Err(e) = self.transport.send_to(&bytes, self.peer) {
                log::warn!("send to {} failed: {e}", self.peer);
            }
        }

        if outcome.wake_reader {
            self.read_cvar.notify_all();
        }
        if outcome.wake_writer {
            self.write_cvar.notify_all();
        }
        if outcome.wake_closer {
            self.close_cvar.notify_all();
        }

        if outcome.opened {
            self.notify_listeners(|l| l.connection_opened(self.peer));
            self.established_cvar.notify_all();
        }
        if outcome.closed {
            self.notify_listeners(|l| l.connection_closed(self.peer));
        }
        if let Some(reason) = outcome.failed {
            self.notify_listeners(|l| l.connection_failure(self.peer, reason));
            self.read_cvar.notify_all();
            self.write_cvar.notify_all();
            self.close_cvar.notify_all();
            self.established_cvar.notify_all();
        }
    }

    /// Blocks the caller of `Client::connect` until the handshake
    /// completes or the connection fails.
    pub fn wait_established(&self) -> Result<()> {
        let engine = self.engine.lock().unwrap();
        let engine = self
            .established_cvar
            .wait_while(engine, |e| {
                !matches!(e.state(), crate::connection::ConnState::Estab) && !e.is_closed()
            })
            .unwrap();
        if engine.is_closed() {
            return Err(RudpError::Closed);
        }
        Ok(())
    }

    pub fn on_segment(&self, seg: Segment, now: Instant) {
        let outcome = self.engine.lock().unwrap().on_segment(seg, now);
        self.drive(outcome);
    }

    pub fn on_tick(&self, now: Instant) {
        let outcome = self.engine.lock().unwrap().on_tick(now);
        self.drive(outcome);
    }

    pub fn write(&self, bytes: &[u8]) -> Result<usize> {
        let mut engine = self.engine.lock().unwrap();
        loop {
            if engine.is_closed() {
                return Err(RudpError::Closed);
            }
            let n = engine.enqueue_write(bytes);
            if n > 0 {
                let outcome = engine.flush(Instant::now());
                drop(engine);
                self.drive(outcome);
                return Ok(n);
            }
            engine = self.write_cvar.wait(engine).unwrap();
        }
    }

    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let mut engine = self.engine.lock().unwrap();
        loop {
            if engine.available() > 0 {
                return Ok(engine.read(buf));
            }
            if engine.is_eof() {
                return Ok(0);
            }
            if engine.is_closed() {
                return Err(RudpError::Closed);
            }
            engine = self.read_cvar.wait(engine).unwrap();
        }
    }

    pub fn close(&self) {
        let mut engine = self.engine.lock().unwrap();
        let outcome = engine.initiate_close(Instant::now());
        drop(engine);
        self.drive(outcome);
    }

    pub fn wait_closed(&self) {
        let engine = self.engine.lock().unwrap();
        let _unused = self
            .close_cvar
            .wait_while(engine, |e| !e.is_closed())
            .unwrap();
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_closed(&self) -> bool {
        self.engine.lock().unwrap().is_closed()
    }

    pub fn is_established(&self) -> bool {
        self.engine.lock().unwrap().state() == crate::connection::ConnState::Estab
    }

    pub fn available(&self) -> usize {
        self.engine.lock().unwrap().available()
    }

    /// Shuts down the input direction only: further reads report EOF. The
    /// peer is not notified; it keeps sending and the engine keeps acking.
    pub fn shutdown_input(&self) {
        let mut engine = self.engine.lock().unwrap();
        engine.shutdown_input();
        drop(engine);
        self.read_cvar.notify_all();
    }

    /// Shuts down the output direction: queues a FIN after pending writes
    /// drain. Equivalent to `close`.
    pub fn shutdown_output(&self) {
        self.close();
    }

    pub fn send_buffer_size(&self) -> usize {
        let profile = self.engine.lock().unwrap().profile();
        profile.max_send_queue_size as usize * mss_payload_len(&profile)
    }

    pub fn receive_buffer_size(&self) -> usize {
        let profile = self.engine.lock().unwrap().profile();
        profile.max_recv_queue_size as usize * mss_payload_len(&profile)
    }
}

fn mss_payload_len(profile: &crate::profile::Profile) -> usize {
    profile.max_segment_size as usize - crate::segment::HEADER_LEN
}
