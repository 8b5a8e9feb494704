//! Bounded per-subscriber queues with drop-oldest overflow.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use std::fmt;
use std::time::Duration;

/// Registry key. Ids are never reused within one tracker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(pub(crate) u64);

impl SubscriptionId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Producer side. Holds a receiver clone so a full queue can shed its
/// oldest item instead of blocking the tracking loop.
pub(crate) struct Outbox<T> {
    tx: Sender<T>,
    shed: Receiver<T>,
}

impl<T> Outbox<T> {
    pub(crate) fn new(capacity: usize) -> (Self, Receiver<T>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        (
            Self {
                tx,
                shed: rx.clone(),
            },
            rx,
        )
    }

    /// Enqueue without blocking. Returns `true` if an older item was dropped.
    ///
    /// Safe with several producers: the new item is retried until it lands,
    /// shedding one queued item per full attempt.
    pub(crate) fn push(&self, mut item: T) -> bool {
        let mut dropped = false;
        loop {
            match self.tx.try_send(item) {
                Ok(()) | Err(TrySendError::Disconnected(_)) => return dropped,
                Err(TrySendError::Full(back)) => {
                    item = back;
                    // The consumer may have emptied the queue since the send.
                    dropped |= self.shed.try_recv().is_ok();
                }
            }
        }
    }
}

/// Consumer side of one tracker subscription.
#[derive(Debug)]
pub struct Subscription<T> {
    id: SubscriptionId,
    frame_size: (u32, u32),
    rx: Receiver<T>,
}

impl<T> Subscription<T> {
    pub(crate) fn new(id: SubscriptionId, frame_size: (u32, u32), rx: Receiver<T>) -> Self {
        Self { id, frame_size, rx }
    }

    #[inline]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Camera frame size when the subscription was made.
    #[inline]
    pub fn frame_size(&self) -> (u32, u32) {
        self.frame_size
    }

    /// Block until an item arrives. `None` once unsubscribed and drained.
    pub fn recv(&self) -> Option<T> {
        self.rx.recv().ok()
    }

    /// Next queued item, if any.
    pub fn try_recv(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(item) => Some(item),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Drain the queue and keep only the newest item.
    pub fn latest(&self) -> Option<T> {
        self.rx.try_iter().last()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
