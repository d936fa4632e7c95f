//! Delayed requeue.
//!
//! One timer task owns every not-yet-due watch in a min-heap keyed by due
//! instant and pushes each into the progress FIFO once due.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::debug;

/// An item scheduled for `due`.
#[derive(Debug)]
pub(crate) struct Delayed<T> {
    pub due: Instant,
    pub item: T,
}

struct Entry<T> {
    due: Instant,
    seq: u64,
    item: T,
}

// Ordered on (due, seq) only; seq keeps equal deadlines FIFO.
impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.due, self.seq).cmp(&(other.due, other.seq))
    }
}

/// Min-heap of items keyed by due instant.
pub(crate) struct DelayHeap<T> {
    heap: BinaryHeap<Reverse<Entry<T>>>,
    seq: u64,
}

impl<T> DelayHeap<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            seq: 0,
        }
    }

    pub fn push(&mut self, due: Instant, item: T) {
        self.seq += 1;
        self.heap.push(Reverse(Entry {
            due,
            seq: self.seq,
            item,
        }));
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.heap.peek().map(|Reverse(entry)| entry.due)
    }

    /// Remove and return every item due at or before `now`, earliest first.
    pub fn pop_due(&mut self, now: Instant) -> Vec<T> {
        let mut due = Vec::new();
        while self.next_due().is_some_and(|d| d <= now) {
            if let Some(Reverse(entry)) = self.heap.pop() {
                due.push(entry.item);
            }
        }
        due
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }
}

async fn sleep_until(due: Option<Instant>) {
    match due {
        Some(due) => tokio::time::sleep_until(due).await,
        None => std::future::pending().await,
    }
}

/// Run the timer until shutdown or until every scheduler handle is dropped.
///
/// Items still pending at exit are discarded.
pub(crate) async fn run_requeue_timer<T: Send>(
    mut incoming: mpsc::UnboundedReceiver<Delayed<T>>,
    queue: mpsc::Sender<T>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut heap = DelayHeap::new();
    debug!("requeue timer starting");

    'outer: loop {
        tokio::select! {
            delayed = incoming.recv() => match delayed {
                Some(Delayed { due, item }) => heap.push(due, item),
                None => break,
            },
            _ = sleep_until(heap.next_due()) => {
                for item in heap.pop_due(Instant::now()) {
                    tokio::select! {
                        sent = queue.send(item) => {
                            if sent.is_err() {
                                break 'outer;
                            }
                        }
                        _ = shutdown.changed() => break 'outer,
                    }
                }
            }
            _ = shutdown.changed() => break,
        }
    }

    debug!(pending = heap.len(), "requeue timer stopped");
}
