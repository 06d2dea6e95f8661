//! Task pools for the engine's threading model.
//!
//! Three named pools: **ui** (single-threaded, receives listener
//! callbacks), **background** (long-running work: mmap, derivation, track
//! replay, saves) and **network** (isolated for HTTP). Blocking I/O never
//! runs on ui. A scheduler thread dispatches delayed tasks to their pool at
//! the due time.
//!
//! The engine only depends on the [`TaskRunner`] trait, so a host with its
//! own executors can supply them instead.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

/// Target pool for a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pool {
    /// Listener callbacks; must never block.
    Ui,
    /// Long-running background work.
    Background,
    /// HTTP requests.
    Network,
}

/// A unit of work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Executor abstraction the engine and stats service schedule through.
pub trait TaskRunner: Send + Sync {
    /// Enqueue a task on a pool.
    fn run(&self, pool: Pool, task: Task);

    /// Enqueue a task on a pool after a delay.
    fn run_delayed(&self, pool: Pool, delay: Duration, task: Task);
}

/// Delayed task pending in the scheduler heap.
struct Pending {
    due: Instant,
    seq: u64,
    pool: Pool,
    task: Task,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}
impl Eq for Pending {}
impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Pending {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.due, self.seq).cmp(&(other.due, other.seq))
    }
}

/// Default [`TaskRunner`]: one worker per pool (two for background) plus a
/// scheduler thread for delayed tasks. Workers drain their queues and exit
/// once every sender is gone.
pub struct ThreadPools {
    ui_tx: Sender<Task>,
    background_tx: Sender<Task>,
    network_tx: Sender<Task>,
    delayed_tx: Sender<Pending>,
}

impl ThreadPools {
    pub fn new() -> Self {
        let (ui_tx, ui_rx) = unbounded::<Task>();
        let (background_tx, background_rx) = unbounded::<Task>();
        let (network_tx, network_rx) = unbounded::<Task>();
        let (delayed_tx, delayed_rx) = unbounded::<Pending>();

        spawn_worker("ui", ui_rx);
        spawn_worker("background-0", background_rx.clone());
        spawn_worker("background-1", background_rx);
        spawn_worker("network", network_rx);
        spawn_scheduler(delayed_rx, ui_tx.clone(), background_tx.clone(), network_tx.clone());

        Self { ui_tx, background_tx, network_tx, delayed_tx }
    }

    fn sender(&self, pool: Pool) -> &Sender<Task> {
        match pool {
            Pool::Ui => &self.ui_tx,
            Pool::Background => &self.background_tx,
            Pool::Network => &self.network_tx,
        }
    }
}

impl Default for ThreadPools {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRunner for ThreadPools {
    fn run(&self, pool: Pool, task: Task) {
        self.sender(pool).send(task).ok();
    }

    fn run_delayed(&self, pool: Pool, delay: Duration, task: Task) {
        static SEQ: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
        let pending = Pending {
            due: Instant::now() + delay,
            seq: SEQ.fetch_add(1, std::sync::atomic::Ordering::Relaxed),
            pool,
            task,
        };
        self.delayed_tx.send(pending).ok();
    }
}

fn spawn_worker(name: &str, rx: Receiver<Task>) {
    thread::Builder::new()
        .name(name.into())
        .spawn(move || {
            for task in rx {
                task();
            }
        })
        .unwrap_or_else(|e| panic!("Failed to spawn {name} thread: {e}"));
}

fn spawn_scheduler(
    rx: Receiver<Pending>,
    ui_tx: Sender<Task>,
    background_tx: Sender<Task>,
    network_tx: Sender<Task>,
) {
    thread::Builder::new()
        .name("scheduler".into())
        .spawn(move || {
            let mut heap: BinaryHeap<Reverse<Pending>> = BinaryHeap::new();
            let mut disconnected = false;
            loop {
                // Fire everything due.
                let now = Instant::now();
                while let Some(Reverse(next)) = heap.peek() {
                    if next.due > now {
                        break;
                    }
                    let Some(Reverse(p)) = heap.pop() else { break };
                    let tx = match p.pool {
                        Pool::Ui => &ui_tx,
                        Pool::Background => &background_tx,
                        Pool::Network => &network_tx,
                    };
                    tx.send(p.task).ok();
                }

                if disconnected && heap.is_empty() {
                    return;
                }

                let timeout = heap
                    .peek()
                    .map(|Reverse(p)| p.due.saturating_duration_since(Instant::now()))
                    .unwrap_or(Duration::from_secs(3600));
                match rx.recv_timeout(timeout) {
                    Ok(pending) => heap.push(Reverse(pending)),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => disconnected = true,
                }
            }
        })
        .unwrap_or_else(|e| panic!("Failed to spawn scheduler thread: {e}"));
}

/// Runner that executes every task inline on the calling thread and treats
/// delays as zero. Used by unit tests for deterministic scheduling.
#[derive(Default)]
pub struct InlineRunner;

impl TaskRunner for InlineRunner {
    fn run(&self, _pool: Pool, task: Task) {
        task();
    }

    fn run_delayed(&self, _pool: Pool, _delay: Duration, task: Task) {
        task();
    }
}
