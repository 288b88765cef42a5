//! Scheduled one-shot and periodic callbacks with cancel.
//!
//! An external collaborator specified only at its boundary, but given a
//! default single-thread implementation so the crate runs standalone.
//! Timer callbacks must never mutate engine state or take the engine's
//! lock directly from the timer thread; callers are expected to have their
//! callback enqueue work instead (the demultiplexer does this, see
//! `server.rs`/`client.rs`).

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

pub trait TimerService: Send + Sync {
    fn schedule_once(&self, delay: Duration, f: Box<dyn FnOnce() + Send>) -> TimerHandle;
    fn schedule_periodic(&self, every: Duration, f: Box<dyn Fn() + Send + Sync>) -> TimerHandle;
}

/// Cancels the timer it was returned from. Cancelling after the callback
/// has already fired (one-shot) or mid-interval (periodic, before its next
/// fire) is a safe no-op.
#[derive(Clone)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

enum Callback {
    Once(Mutex<Option<Box<dyn FnOnce() + Send>>>),
    Periodic {
        every: Duration,
        f: Box<dyn Fn() + Send + Sync>,
    },
}

struct Entry {
    deadline: Instant,
    seq: u64,
    cancelled: Arc<AtomicBool>,
    callback: Callback,
}

impl Entry {
    fn key(&self) -> (Instant, u64) {
        (self.deadline, self.seq)
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}
impl Eq for Entry {}
impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key().cmp(&other.key())
    }
}

struct Shared {
    queue: Mutex<BinaryHeap<Reverse<Entry>>>,
    cvar: Condvar,
    shutdown: AtomicBool,
    next_seq: AtomicU64,
}

/// A timer service backed by a single background thread holding a
/// min-heap of pending deadlines, woken by a condition variable whenever a
/// new, earlier deadline is scheduled.
pub struct WheelTimer {
    shared: Arc<Shared>,
    worker: Option<thread::JoinHandle<()>>,
}

impl WheelTimer {
    pub fn new() -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(BinaryHeap::new()),
            cvar: Condvar::new(),
            shutdown: AtomicBool::new(false),
            next_seq: AtomicU64::new(0),
        });

        let worker_shared = shared.clone();
        let worker = thread::spawn(move || run_worker(worker_shared));

        WheelTimer {
            shared,
            worker: Some(worker),
        }
    }

    fn schedule(&self, deadline: Instant, callback: Callback) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let seq = self.shared.next_seq.fetch_add(1, Ordering::Relaxed);
        let entry = Entry {
            deadline,
            seq,
            cancelled: cancelled.clone(),
            callback,
        };

        let mut queue = self.shared.queue.lock().unwrap();
        queue.push(Reverse(entry));
        drop(queue);
        self.shared.cvar.notify_one();

        TimerHandle { cancelled }
    }
}

impl Default for WheelTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerService for WheelTimer {
    fn schedule_once(&self, delay: Duration, f: Box<dyn FnOnce() + Send>) -> TimerHandle {
        self.schedule(
            Instant::now() + delay,
            Callback::Once(Mutex::new(Some(f))),
        )
    }

    fn schedule_periodic(&self, every: Duration, f: Box<dyn Fn() + Send + Sync>) -> TimerHandle {
        self.schedule(Instant::now() + every, Callback::Periodic { every, f })
    }
}

impl Drop for WheelTimer {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.cvar.notify_all();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run_worker(shared: Arc<Shared>) {
    loop {
        let mut queue = shared.queue.lock().unwrap();
        loop {
            if shared.shutdown.load(Ordering::Acquire) {
                return;
            }
            match queue.peek() {
                None => {
                    queue = shared.cvar.wait(queue).unwrap();
                }
                Some(Reverse(entry)) => {
                    let now = Instant::now();
                    if entry.deadline <= now {
                        break;
                    }
                    let (guard, timed_out) =
                        shared.cvar.wait_timeout(queue, entry.deadline - now).unwrap();
                    queue = guard;
                    let _ = timed_out;
                }
            }
        }

        let Reverse(entry) = queue.pop().unwrap();
        drop(queue);

        if entry.cancelled.load(Ordering::Acquire) {
            continue;
        }

        match entry.callback {
            Callback::Once(cell) => {
                if let Some(f) = cell.lock().unwrap().take() {
                    f();
                }
            }
            Callback::Periodic { every, f } => {
                f();
                if !entry.cancelled.load(Ordering::Acquire) && !shared.shutdown.load(Ordering::Acquire) {
                    let mut queue = shared.queue.lock().unwrap();
                    let seq = shared.next_seq.fetch_add(1, Ordering::Relaxed);
                    queue.push(Reverse(Entry {
                        deadline: Instant::now() + every,
                        seq,
                        cancelled: entry.cancelled,
                        callback: Callback::Periodic { every, f },
                    }));
                    drop(queue);
                    shared.cvar.notify_one();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn fires_once_after_delay() {
        let timer = WheelTimer::new();
        let (tx, rx) = mpsc::channel();
        timer.schedule_once(Duration::from_millis(10), Box::new(move || {
            tx.send(()).unwrap();
        }));
        rx.recv_timeout(Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn cancel_before_fire_prevents_callback() {
        let timer = WheelTimer::new();
        let (tx, rx) = mpsc::channel::<()>();
        let handle = timer.schedule_once(Duration::from_millis(50), Box::new(move || {
            tx.send(()).unwrap();
        }));
        handle.cancel();
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn periodic_fires_multiple_times_then_cancels() {
        let timer = WheelTimer::new();
        let (tx, rx) = mpsc::channel();
        let handle = timer.schedule_periodic(Duration::from_millis(10), Box::new(move || {
            let _ = tx.send(());
        }));
        rx.recv_timeout(Duration::from_secs(1)).unwrap();
        rx.recv_timeout(Duration::from_secs(1)).unwrap();
        handle.cancel();
    }
}
