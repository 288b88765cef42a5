//! The connection engine: state machine, send-side sliding
//! window with retransmission, and receive-side reassembly. Owns no
//! thread or socket of its own — it is driven by whoever holds its lock
//! (see `server.rs`/`client.rs`); the engine itself never blocks or spawns.

use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

use crate::error::FailureReason;
use crate::profile::Profile;
use crate::segment::{Segment, SynParams};
use crate::seq::{seq_le, seq_lt};

/// CLOSE-WAIT lingers for this many retransmission intervals before giving
/// up on the peer ever acking the FIN and closing unconditionally. Keeps
/// CLOSED reachable even with `max_retrans == 0` (unlimited per-segment
/// retries), where `fire_retransmissions` alone would never time out.
const CLOSE_WAIT_LINGER_MULTIPLIER: u64 = 16;

/// RFC-9293-shaped state diagram, collapsed to the six states this crate
/// names. RUDP has no FIN-WAIT/CLOSING/TIME-WAIT split: both the
/// close-initiator and the peer that received a FIN land in `CloseWait`
/// and fall to `Closed` once outstanding segments drain.
///
/// `Listen` is never held by an `Engine` — it names the bound server
/// port's idle state, which `Server` represents itself; every `Engine`
/// the demultiplexer allocates for a peer is born directly in `SynRcvd`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Closed,
    Listen,
    SynSent,
    SynRcvd,
    Estab,
    CloseWait,
}

#[derive(Debug, Clone)]
struct Outstanding {
    seq: u8,
    segment: Segment,
    retries: u32,
    deadline: Instant,
}

/// What the caller driving the engine (demultiplexer receive loop, or a
/// direct user call) should do next: datagrams to send and which
/// condition variables / listener callbacks to fire. Listeners themselves
/// are invoked by the caller, outside the engine's lock.
#[derive(Debug, Default)]
pub struct Outcome {
    pub to_send: Vec<Segment>,
    pub opened: bool,
    pub closed: bool,
    pub failed: Option<FailureReason>,
    pub wake_reader: bool,
    pub wake_writer: bool,
    pub wake_closer: bool,
}

pub struct Engine {
    profile: Profile,
    state: ConnState,

    send_next: u8,
    send_unack: u8,
    pending: VecDeque<Vec<u8>>,
    outstanding: VecDeque<Outstanding>,
    queued_fin: bool,
    fin_sent: bool,

    recv_next: u8,
    reassembly: BTreeMap<u8, Vec<u8>>,
    delivered: VecDeque<u8>,
    out_of_order_count: u32,
    pending_fin_seq: Option<u8>,

    cumulative_ack_counter: u32,
    ack_pending_since: Option<Instant>,
    last_send_activity: Instant,

    write_closed: bool,
    peer_write_closed: bool,
    read_closed: bool,
    close_wait_deadline: Option<Instant>,
}

impl Engine {
    fn blank(profile: Profile, state: ConnState, iss: u8, now: Instant) -> Self {
        Engine {
            profile,
            state,
            send_next: iss,
            send_unack: iss,
            pending: VecDeque::new(),
            outstanding: VecDeque::new(),
            queued_fin: false,
            fin_sent: false,
            recv_next: 0,
            reassembly: BTreeMap::new(),
            delivered: VecDeque::new(),
            out_of_order_count: 0,
            pending_fin_seq: None,
            cumulative_ack_counter: 0,
            ack_pending_since: None,
            last_send_activity: now,
            write_closed: false,
            peer_write_closed: false,
            read_closed: false,
            close_wait_deadline: None,
        }
    }

    fn enter_close_wait(&mut self, now: Instant) {
        self.state = ConnState::CloseWait;
        let linger = Duration::from_millis(
            self.profile.retransmission_timeout as u64 * CLOSE_WAIT_LINGER_MULTIPLIER,
        );
        self.close_wait_deadline = Some(now + linger);
    }

    /// User `connect`: send SYN, arm its retransmission timer, -> SYN-SENT.
    pub fn connect(profile: Profile, now: Instant) -> (Engine, Outcome) {
        let iss = rand::random::<u8>();
        let mut conn = Engine::blank(profile, ConnState::SynSent, iss, now);
        let mut out = Outcome::default();
        conn.emit_syn(now, None, &mut out);
        (conn, out)
    }

    /// Server path on incoming SYN: allocate state, send SYN+ACK, -> SYN-RCVD.
    pub fn accept(profile: Profile, peer_syn_seq: u8, now: Instant) -> (Engine, Outcome) {
        let iss = rand::random::<u8>();
        let mut conn = Engine::blank(profile, ConnState::SynRcvd, iss, now);
        conn.recv_next = peer_syn_seq.wrapping_add(1);
        let mut out = Outcome::default();
        let ack_num = conn.recv_next.wrapping_sub(1);
        conn.emit_syn(now, Some(ack_num), &mut out);
        (conn, out)
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnState::Closed
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    // ---- send path ----------------------------------------------

    fn emit_syn(&mut self, now: Instant, ack: Option<u8>, out: &mut Outcome) {
        let seq = self.send_next;
        self.send_next = self.send_next.wrapping_add(1);
        let seg = Segment::Syn {
            seq,
            ack,
            params: self.profile.to_syn_params(),
        };
        self.schedule_outstanding(seg.clone(), seq, now);
        out.to_send.push(seg);
        self.last_send_activity = now;
    }

    fn schedule_outstanding(&mut self, segment: Segment, seq: u8, now: Instant) {
        let rto = Duration::from_millis(self.profile.retransmission_timeout as u64);
        self.outstanding.push_back(Outstanding {
            seq,
            segment,
            retries: 0,
            deadline: now + rto,
        });
    }

    /// Removes every outstanding segment with `seq <= ack` (cumulative
    /// ack). Returns whether anything was actually removed.
    fn ack_outstanding_upto(&mut self, ack: u8) -> bool {
        let before = self.outstanding.len();
        while let Some(front) = self.outstanding.front() {
            if seq_le(front.seq, ack) {
                self.outstanding.pop_front();
            } else {
                break;
            }
        }
        self.send_unack = self.outstanding.front().map(|o| o.seq).unwrap_or(self.send_next);
        self.outstanding.len() < before
    }

    /// EAK: remove the specific (non-contiguous) sequences the peer named.
    fn ack_outstanding_eak(&mut self, acks: &[u8]) {
        self.outstanding.retain(|o| !acks.contains(&o.seq));
        self.send_unack = self.outstanding.front().map(|o| o.seq).unwrap_or(self.send_next);
    }

    /// Queue user bytes, chunked into MSS-sized payloads, bounded by
    /// `max_send_queue_size` segments (pending + outstanding). Returns the
    /// number of bytes actually accepted; the caller blocks and retries
    /// the remainder when this is less than the full input.
    pub fn enqueue_write(&mut self, bytes: &[u8]) -> usize {
        if self.write_closed {
            return 0;
        }
        let cap = self.profile.max_send_queue_size as usize;
        let mss_payload = self.profile.max_segment_size as usize - crate::segment::HEADER_LEN;
        let mut offset = 0;
        while offset < bytes.len() {
            if self.pending.len() + self.outstanding.len() >= cap {
                break;
            }
            let end = (offset + mss_payload).min(bytes.len());
            self.pending.push_back(bytes[offset..end].to_vec());
            offset = end;
        }
        offset
    }

    /// Send whatever newly-queued data and deferred FIN the outstanding
    /// cap allows right now, instead of waiting for the next tick.
    pub fn flush(&mut self, now: Instant) -> Outcome {
        let mut out = Outcome::default();
        self.pump_send(now, &mut out.to_send);
        self.maybe_finalize_close_wait(&mut out);
        out
    }

    pub fn is_send_full(&self) -> bool {
        self.pending.len() + self.outstanding.len() >= self.profile.max_send_queue_size as usize
    }

    pub fn has_unacked_writes(&self) -> bool {
        !self.pending.is_empty() || !self.outstanding.is_empty()
    }

    /// Move queued chunks into outstanding DAT segments while the
    /// outstanding-segment cap allows, then, once data drains, flush a
    /// queued FIN.
    fn pump_send(&mut self, now: Instant, to_send: &mut Vec<Segment>) {
        while self.outstanding.len() < self.profile.max_outstanding_segs as usize {
            if let Some(chunk) = self.pending.pop_front() {
                let seq = self.send_next;
                self.send_next = self.send_next.wrapping_add(1);
                let ack = self.recv_next.wrapping_sub(1);
                let seg = Segment::Dat {
                    seq,
                    ack,
                    payload: chunk,
                };
                self.schedule_outstanding(seg.clone(), seq, now);
                to_send.push(seg);
                self.last_send_activity = now;
                continue;
            }

            if self.queued_fin && !self.fin_sent {
                let seq = self.send_next;
                self.send_next = self.send_next.wrapping_add(1);
                let ack = self.recv_next.wrapping_sub(1);
                let seg = Segment::Fin {
                    seq,
                    ack: Some(ack),
                };
                self.schedule_outstanding(seg.clone(), seq, now);
                to_send.push(seg);
                self.fin_sent = true;
                self.last_send_activity = now;
                continue;
            }

            break;
        }
    }

    /// User `close`: send FIN once pending data drains, -> CLOSE-WAIT.
    /// Shuts down the output direction only.
    pub fn initiate_close(&mut self, now: Instant) -> Outcome {
        let mut out = Outcome::default();
        if self.write_closed {
            return out;
        }
        self.write_closed = true;
        if self.state == ConnState::Estab {
            self.enter_close_wait(now);
        }
        self.queued_fin = true;
        self.pump_send(now, &mut out.to_send);
        self.maybe_finalize_close_wait(&mut out);
        out
    }

    // ---- receive path -------------------------------------------

    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        if self.read_closed {
            return 0;
        }
        let n = buf.len().min(self.delivered.len());
        for slot in buf[..n].iter_mut() {
            *slot = self.delivered.pop_front().expect("checked len above");
        }
        n
    }

    pub fn available(&self) -> usize {
        if self.read_closed {
            0
        } else {
            self.delivered.len()
        }
    }

    pub fn is_eof(&self) -> bool {
        self.read_closed || (self.peer_write_closed && self.delivered.is_empty())
    }

    /// Shuts down the input direction only: further reads report EOF and
    /// any buffered-but-unread bytes are discarded. The engine keeps
    /// acknowledging incoming data as usual; the peer is not told to stop
    /// sending.
    pub fn shutdown_input(&mut self) {
        self.read_closed = true;
        self.delivered.clear();
    }

    fn handle_incoming_data(&mut self, seq: u8, payload: Vec<u8>, now: Instant, out: &mut Outcome) {
        if seq == self.recv_next {
            self.delivered.extend(payload);
            self.recv_next = self.recv_next.wrapping_add(1);
            out.wake_reader = true;

            while let Some(buffered) = self.reassembly.remove(&self.recv_next) {
                self.delivered.extend(buffered);
                self.recv_next = self.recv_next.wrapping_add(1);
                out.wake_reader = true;
            }

            self.cumulative_ack_counter += 1;
            if self.ack_pending_since.is_none() {
                self.ack_pending_since = Some(now);
            }
            if self.cumulative_ack_counter >= self.profile.max_cumulative_acks as u32 {
                self.send_cumulative_ack(out);
            }
        } else if seq_lt(self.recv_next, seq) {
            if self.reassembly.len() < self.profile.max_recv_queue_size as usize {
                if self.reassembly.insert(seq, payload).is_none() {
                    self.out_of_order_count += 1;
                }
                if self.out_of_order_count >= self.profile.max_out_of_sequence as u32 {
                    self.send_eak(out);
                }
            }
            // else: reassembly buffer full, drop silently; peer retransmits.
        } else {
            // seq < recv_next: duplicate.
            self.send_forced_ack(out);
        }

        self.check_fin_delivered(now, out);
    }

    fn send_cumulative_ack(&mut self, out: &mut Outcome) {
        self.cumulative_ack_counter = 0;
        self.ack_pending_since = None;
        let ack_num = self.recv_next.wrapping_sub(1);
        out.to_send.push(Segment::Ack {
            seq: self.send_next,
            ack: ack_num,
        });
    }

    fn send_forced_ack(&mut self, out: &mut Outcome) {
        let ack_num = self.recv_next.wrapping_sub(1);
        out.to_send.push(Segment::Ack {
            seq: self.send_next,
            ack: ack_num,
        });
    }

    fn send_eak(&mut self, out: &mut Outcome) {
        let acks: Vec<u8> = self.reassembly.keys().copied().collect();
        let ack_num = self.recv_next.wrapping_sub(1);
        out.to_send.push(Segment::Eak {
            seq: self.send_next,
            ack: Some(ack_num),
            acks,
        });
    }

    /// Eagerly retransmit at minimum the oldest hole after an EAK names
    /// gaps.
    fn retransmit_oldest_hole(&mut self, now: Instant, out: &mut Outcome) {
        if let Some(hole) = self.outstanding.front_mut() {
            out.to_send.push(hole.segment.clone());
            hole.retries += 1;
            hole.deadline = now + Duration::from_millis(self.profile.retransmission_timeout as u64);
        }
    }

    fn handle_incoming_fin(&mut self, seq: u8, now: Instant, out: &mut Outcome) {
        self.pending_fin_seq = Some(seq);
        self.handle_incoming_data(seq, Vec::new(), now, out);
        // A FIN always gets an immediate ACK, unlike ordinary DAT segments,
        // which may ride the lazy cumulative-ack counter/timeout.
        self.cumulative_ack_counter = 0;
        self.ack_pending_since = None;
        self.send_forced_ack(out);
    }

    fn check_fin_delivered(&mut self, now: Instant, out: &mut Outcome) {
        if let Some(fin_seq) = self.pending_fin_seq {
            if !self.peer_write_closed && seq_lt(fin_seq, self.recv_next) {
                self.peer_write_closed = true;
                out.wake_reader = true;
                if self.state == ConnState::Estab {
                    self.enter_close_wait(now);
                    out.closed = true;
                }
            }
        }
    }

    fn maybe_finalize_close_wait(&mut self, out: &mut Outcome) {
        if self.state == ConnState::CloseWait
            && self.write_closed
            && self.outstanding.is_empty()
            && self.pending.is_empty()
        {
            self.state = ConnState::Closed;
            self.close_wait_deadline = None;
            out.wake_closer = true;
        }
    }

    /// Linger expiry: a peer that never acks our FIN (and never sends its
    /// own) would otherwise leave the connection in CLOSE-WAIT forever
    /// whenever `max_retrans == 0`. Forces CLOSED once the linger window
    /// passes, regardless of outstanding segments.
    fn maybe_expire_close_wait(&mut self, now: Instant, out: &mut Outcome) {
        if self.state != ConnState::CloseWait {
            return;
        }
        if let Some(deadline) = self.close_wait_deadline {
            if now >= deadline {
                self.outstanding.clear();
                self.pending.clear();
                self.state = ConnState::Closed;
                self.close_wait_deadline = None;
                out.wake_closer = true;
            }
        }
    }

    // ---- dispatch ------------------------------------------------

    pub fn on_segment(&mut self, seg: Segment, now: Instant) -> Outcome {
        let mut out = Outcome::default();
        match self.state {
            ConnState::Closed | ConnState::Listen => {}
            ConnState::SynSent => self.on_segment_syn_sent(seg, now, &mut out),
            ConnState::SynRcvd => self.on_segment_syn_rcvd(seg, now, &mut out),
            ConnState::Estab | ConnState::CloseWait => self.on_segment_open(seg, now, &mut out),
        }
        if !matches!(self.state, ConnState::Closed | ConnState::Listen) {
            self.pump_send(now, &mut out.to_send);
        }
        self.maybe_finalize_close_wait(&mut out);
        out
    }

    fn on_segment_syn_sent(&mut self, seg: Segment, now: Instant, out: &mut Outcome) {
        match seg {
            Segment::Rst { .. } => {
                self.state = ConnState::Closed;
                out.failed = Some(FailureReason::UnexpectedReset);
            }
            Segment::Syn { seq, ack: Some(ack), .. } => {
                if self.ack_outstanding_upto(ack) {
                    self.recv_next = seq.wrapping_add(1);
                    self.state = ConnState::Estab;
                    out.opened = true;
                    self.last_send_activity = now;
                    let ack_num = self.recv_next.wrapping_sub(1);
                    out.to_send.push(Segment::Ack {
                        seq: self.send_next,
                        ack: ack_num,
                    });
                }
            }
            _ => {}
        }
    }

    fn on_segment_syn_rcvd(&mut self, seg: Segment, now: Instant, out: &mut Outcome) {
        match seg {
            Segment::Rst { .. } => {
                self.state = ConnState::Closed;
                out.failed = Some(FailureReason::UnexpectedReset);
            }
            Segment::Syn { .. } => {
                // Duplicate SYN: every non-CLOSED state safely discards it
                // and replies with an ACK.
                let ack_num = self.recv_next.wrapping_sub(1);
                out.to_send.push(Segment::Ack {
                    seq: self.send_next,
                    ack: ack_num,
                });
            }
            Segment::Ack { ack, .. } => {
                if self.ack_outstanding_upto(ack) {
                    self.state = ConnState::Estab;
                    out.opened = true;
                }
            }
            Segment::Dat { seq, ack, payload } => {
                if self.ack_outstanding_upto(ack) {
                    self.state = ConnState::Estab;
                    out.opened = true;
                }
                if self.state == ConnState::Estab {
                    self.handle_incoming_data(seq, payload, now, out);
                }
            }
            _ => {}
        }
    }

    fn on_segment_open(&mut self, seg: Segment, now: Instant, out: &mut Outcome) {
        match seg {
            Segment::Rst { .. } => {
                self.state = ConnState::Closed;
                out.failed = Some(FailureReason::UnexpectedReset);
                out.wake_reader = true;
                out.wake_writer = true;
                out.wake_closer = true;
            }
            Segment::Syn { .. } => {
                let ack_num = self.recv_next.wrapping_sub(1);
                out.to_send.push(Segment::Ack {
                    seq: self.send_next,
                    ack: ack_num,
                });
            }
            Segment::Nul { ack, seq } => {
                if let Some(a) = ack {
                    if self.ack_outstanding_upto(a) {
                        out.wake_writer = true;
                    }
                }
                self.handle_incoming_data(seq, Vec::new(), now, out);
            }
            Segment::Eak { ack, acks, .. } => {
                if let Some(a) = ack {
                    self.ack_outstanding_upto(a);
                }
                self.ack_outstanding_eak(&acks);
                self.retransmit_oldest_hole(now, out);
                out.wake_writer = !self.is_send_full();
            }
            Segment::Ack { ack, .. } => {
                if self.ack_outstanding_upto(ack) {
                    out.wake_writer = true;
                }
            }
            Segment::Dat { seq, ack, payload } => {
                if self.ack_outstanding_upto(ack) {
                    out.wake_writer = true;
                }
                self.handle_incoming_data(seq, payload, now, out);
            }
            Segment::Fin { seq, ack } => {
                if let Some(a) = ack {
                    if self.ack_outstanding_upto(a) {
                        out.wake_writer = true;
                    }
                }
                self.handle_incoming_fin(seq, now, out);
            }
        }
    }

    // ---- timers ----------------------------------------

    /// Driven by whichever thread polls the datagram transport; never
    /// called directly from a timer callback; it should enqueue work instead.
    pub fn on_tick(&mut self, now: Instant) -> Outcome {
        let mut out = Outcome::default();
        if self.state == ConnState::Closed {
            return out;
        }

        self.fire_retransmissions(now, &mut out);
        if out.failed.is_some() {
            return out;
        }

        self.maybe_send_null(now, &mut out);
        self.maybe_flush_cumulative_ack(now, &mut out);
        self.pump_send(now, &mut out.to_send);
        self.maybe_expire_close_wait(now, &mut out);
        self.maybe_finalize_close_wait(&mut out);
        out
    }

    fn fire_retransmissions(&mut self, now: Instant, out: &mut Outcome) {
        let max_retrans = self.profile.max_retrans;
        let rto = Duration::from_millis(self.profile.retransmission_timeout as u64);

        for seg in self.outstanding.iter_mut() {
            if seg.deadline > now {
                // Deadlines are non-decreasing in send order (FIFO,
                // identical fixed RTO), so nothing later in the queue is
                // due either.
                break;
            }
            seg.retries += 1;
            if max_retrans > 0 && seg.retries > max_retrans as u32 {
                out.failed = Some(if matches!(seg.segment, Segment::Nul { .. }) {
                    FailureReason::NullSegmentTimeout
                } else {
                    FailureReason::RetransmissionLimitExceeded
                });
                break;
            }
            out.to_send.push(seg.segment.clone());
            seg.deadline = now + rto;
        }

        if out.failed.is_some() {
            self.state = ConnState::Closed;
            out.wake_reader = true;
            out.wake_writer = true;
            out.wake_closer = true;
        }
    }

    fn maybe_send_null(&mut self, now: Instant, out: &mut Outcome) {
        if self.state != ConnState::Estab {
            return;
        }
        if !self.pending.is_empty() || !self.outstanding.is_empty() {
            return;
        }
        let timeout = Duration::from_millis(self.profile.null_segment_timeout as u64);
        if now.duration_since(self.last_send_activity) >= timeout {
            let seq = self.send_next;
            self.send_next = self.send_next.wrapping_add(1);
            let ack_num = self.recv_next.wrapping_sub(1);
            let seg = Segment::Nul {
                seq,
                ack: Some(ack_num),
            };
            self.schedule_outstanding(seg.clone(), seq, now);
            out.to_send.push(seg);
            self.last_send_activity = now;
        }
    }

    fn maybe_flush_cumulative_ack(&mut self, now: Instant, out: &mut Outcome) {
        if let Some(since) = self.ack_pending_since {
            let timeout = Duration::from_millis(self.profile.cumulative_ack_timeout as u64);
            if now.duration_since(since) >= timeout {
                self.send_cumulative_ack(out);
            }
        }
    }
}

/// The set of out-of-range/negotiated values a SYN body may carry, reduced
/// to the `Profile` used by the accepting side. RUDP does not negotiate:
/// the accepting side keeps its own configured `Profile` and only
/// validates that the peer's advertised `SynParams` are well-formed.
pub fn validate_peer_params(params: &SynParams) -> bool {
    params.max_segment_size as usize >= crate::segment::SYN_HEADER_LEN
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn test_profile() -> Profile {
        Profile::default()
    }

    #[test]
    fn handshake_both_sides() {
        let now = Instant::now();
        let (mut client, out) = Engine::connect(test_profile(), now);
        assert_eq!(client.state(), ConnState::SynSent);
        let syn = out.to_send[0].clone();
        let Segment::Syn { seq: client_iss, .. } = syn.clone() else {
            panic!("expected SYN")
        };

        let (mut server, out) = Engine::accept(test_profile(), client_iss, now);
        assert_eq!(server.state(), ConnState::SynRcvd);
        let synack = out.to_send[0].clone();

        let out = client.on_segment(synack, now);
        assert_eq!(client.state(), ConnState::Estab);
        assert!(out.opened);
        let ack = out.to_send[0].clone();

        let out = server.on_segment(ack, now);
        assert_eq!(server.state(), ConnState::Estab);
        assert!(out.opened);
    }

    fn established_pair() -> (Engine, Engine, Instant) {
        let now = Instant::now();
        let (mut client, out) = Engine::connect(test_profile(), now);
        let syn = out.to_send[0].clone();
        let Segment::Syn { seq: client_iss, .. } = syn else {
            panic!("expected SYN")
        };
        let (mut server, out) = Engine::accept(test_profile(), client_iss, now);
        let synack = out.to_send[0].clone();
        let out = client.on_segment(synack, now);
        let ack = out.to_send[0].clone();
        server.on_segment(ack, now);
        (client, server, now)
    }

    #[test]
    fn ordered_delivery_of_three_bytes() {
        let (mut client, mut server, now) = established_pair();
        client.enqueue_write(&[1, 2, 3]);
        let out = client.on_tick(now);
        assert_eq!(out.to_send.len(), 1);
        let Segment::Dat { payload, .. } = out.to_send[0].clone() else {
            panic!("expected DAT")
        };
        assert_eq!(payload, vec![1, 2, 3]);

        let out = server.on_segment(out.to_send[0].clone(), now);
        assert!(out.wake_reader);
        let mut buf = [0u8; 3];
        assert_eq!(server.read(&mut buf), 3);
        assert_eq!(buf, [1, 2, 3]);

        let ack = out.to_send[0].clone();
        client.on_segment(ack, now);
        assert!(!client.has_unacked_writes());
    }

    #[test]
    fn reorder_buffers_then_delivers_in_order() {
        let (_client, mut server, now) = established_pair();
        let seq0 = server.recv_next;
        let seg1 = Segment::Dat {
            seq: seq0.wrapping_add(1),
            ack: 0,
            payload: vec![b'B'],
        };
        let out = server.on_segment(seg1, now);
        assert_eq!(server.available(), 0);
        assert!(out
            .to_send
            .iter()
            .any(|s| matches!(s, Segment::Eak { .. }))
            || true); // EAK only once threshold reached; just assert no crash/delivery yet.

        let seg0 = Segment::Dat {
            seq: seq0,
            ack: 0,
            payload: vec![b'A'],
        };
        let out = server.on_segment(seg0, now);
        assert!(out.wake_reader);
        let mut buf = [0u8; 2];
        assert_eq!(server.read(&mut buf), 2);
        assert_eq!(&buf, b"AB");
    }

    #[test]
    fn duplicate_below_recv_next_is_discarded_and_acked() {
        let (_client, mut server, now) = established_pair();
        let seq0 = server.recv_next;
        let seg = Segment::Dat {
            seq: seq0,
            ack: 0,
            payload: vec![1],
        };
        server.on_segment(seg.clone(), now);
        let mut buf = [0u8; 1];
        server.read(&mut buf);

        let out = server.on_segment(seg, now);
        assert!(out.to_send.iter().any(|s| matches!(s, Segment::Ack { .. })));
        assert_eq!(server.available(), 0);
    }

    #[test]
    fn retransmits_until_limit_then_fails() {
        let mut profile = test_profile();
        profile.max_retrans = 2;
        let now = Instant::now();
        let (mut client, _out) = Engine::connect(profile, now);

        let rto = Duration::from_millis(profile.retransmission_timeout as u64);
        let t1 = now + rto + Duration::from_millis(1);
        let out = client.on_tick(t1);
        assert_eq!(out.to_send.len(), 1);
        assert!(out.failed.is_none());

        let t2 = t1 + rto + Duration::from_millis(1);
        let out = client.on_tick(t2);
        assert_eq!(out.to_send.len(), 1);
        assert!(out.failed.is_none());

        let t3 = t2 + rto + Duration::from_millis(1);
        let out = client.on_tick(t3);
        assert_eq!(out.failed, Some(FailureReason::RetransmissionLimitExceeded));
        assert!(client.is_closed());
    }

    #[test]
    fn window_never_exceeds_outstanding_cap() {
        let mut profile = test_profile();
        profile.max_outstanding_segs = 2;
        profile.max_segment_size = crate::segment::HEADER_LEN as u16 + 1;
        let (mut client, mut server, now) = {
            let now = Instant::now();
            let (mut client, out) = Engine::connect(profile, now);
            let Segment::Syn { seq: iss, .. } = out.to_send[0].clone() else {
                panic!()
            };
            let (mut server, out) = Engine::accept(profile, iss, now);
            let synack = out.to_send[0].clone();
            let out = client.on_segment(synack, now);
            server.on_segment(out.to_send[0].clone(), now);
            (client, server, now)
        };

        client.enqueue_write(&[1, 2, 3, 4, 5]);
        let out = client.on_tick(now);
        assert!(out.to_send.len() <= profile.max_outstanding_segs as usize);

        let _ = server.on_segment(out.to_send[0].clone(), now);
    }

    #[test]
    fn orderly_close_delivers_eof() {
        let (mut client, mut server, now) = established_pair();
        let out = client.initiate_close(now);
        assert_eq!(client.state(), ConnState::CloseWait);
        let fin = out.to_send[0].clone();

        let out = server.on_segment(fin, now);
        assert!(out.closed);
        assert_eq!(server.state(), ConnState::CloseWait);
        assert!(server.is_eof());

        let ack = out.to_send[0].clone();
        let out = client.on_segment(ack, now);
        assert!(out.wake_closer || client.is_closed());
    }
}
