//! Merging of the notifications of several ports.

use std::{cmp::Ordering, collections::VecDeque};

use min_max_heap::MinMaxHeap;

use crate::{
    error::{Error, Result},
    fs::iterator::NotificationIterator,
    notification::Notification,
};

struct MuxEntry {
    ts: i64,
    priority: u64,
    port: usize,
    notif: Notification,
}

impl MuxEntry {
    fn key(&self) -> (i64, u64, usize) {
        (self.ts, self.priority, self.port)
    }
}

impl PartialEq for MuxEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for MuxEntry {}

impl PartialOrd for MuxEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MuxEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Yields the notifications of every port by increasing time. Ties go to
/// the clock class of highest priority, then to the lowest port index.
/// Notifications without a clock value take the time of the previous one of
/// their port, so the order within a port is never changed.
pub struct Muxer {
    iterators: Vec<NotificationIterator>,
    last_ts: Vec<i64>,
    heap: MinMaxHeap<MuxEntry>,
    /// Port errors not returned yet, one per failed port.
    deferred_errs: VecDeque<Error>,
    primed: bool,
}

impl Muxer {
    pub fn new(iterators: Vec<NotificationIterator>) -> Self {
        let n = iterators.len();

        Self {
            iterators,
            last_ts: vec![i64::MIN; n],
            heap: MinMaxHeap::with_capacity(n),
            deferred_errs: VecDeque::new(),
            primed: false,
        }
    }

    pub fn iterators(&self) -> &[NotificationIterator] {
        &self.iterators
    }

    fn pull(&mut self, port: usize) -> Result<()> {
        let it = &mut self.iterators[port];

        if let Some(notif) = it.next_notification()? {
            let ts = notif.timestamp_ns().unwrap_or(self.last_ts[port]);
            self.last_ts[port] = ts;

            let priority = notif
                .clock()
                .and_then(|c| it.port().priority_map().priority(c.clock))
                .unwrap_or(u64::MAX);

            self.heap.push(MuxEntry {
                ts,
                priority,
                port,
                notif,
            });
        }

        Ok(())
    }

    /// Returns the next notification along with the index of its port. A
    /// port error is returned once, for every failed port; the other ports go
    /// on.
    pub fn next_notification(&mut self) -> Result<Option<(usize, Notification)>> {
        if !self.primed {
            self.primed = true;

            for port in 0..self.iterators.len() {
                if let Err(e) = self.pull(port) {
                    self.deferred_errs.push_back(e);
                }
            }
        }

        if let Some(e) = self.deferred_errs.pop_front() {
            return Err(e);
        }

        let Some(entry) = self.heap.pop_min() else {
            return Ok(None);
        };

        // The failure of the refill shows up on the next call.
        if let Err(e) = self.pull(entry.port) {
            self.deferred_errs.push_back(e);
        }

        Ok(Some((entry.port, entry.notif)))
    }
}

impl Iterator for Muxer {
    type Item = Result<(usize, Notification)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_notification().transpose()
    }
}
