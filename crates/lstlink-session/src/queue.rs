use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tracing::warn;

/// Default number of packets a link buffers before dropping the oldest.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Bounded hand-off between a background reader and a waiting session.
///
/// When full, the oldest packet is dropped so a stalled consumer never
/// blocks the reader.
#[derive(Debug)]
pub struct InboundQueue {
    state: Mutex<State>,
    ready: Condvar,
    capacity: usize,
}

#[derive(Debug, Default)]
struct State {
    messages: VecDeque<Bytes>,
    closed: Option<String>,
}

/// Result of waiting on the queue.
#[derive(Debug, PartialEq, Eq)]
pub enum Recv {
    Message(Bytes),
    Empty,
    Closed(String),
}

impl InboundQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(State::default()),
            ready: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a packet. Returns `false` if an older one had to be dropped.
    pub fn push(&self, message: Bytes) -> bool {
        let mut state = self.lock();
        let mut kept_all = true;
        if state.messages.len() >= self.capacity {
            state.messages.pop_front();
            kept_all = false;
            warn!(capacity = self.capacity, "inbound queue full, dropped oldest packet");
        }
        state.messages.push_back(message);
        drop(state);
        self.ready.notify_one();
        kept_all
    }

    /// Wait up to `timeout` for a packet.
    ///
    /// Buffered packets are still delivered after the queue is closed.
    pub fn recv_timeout(&self, timeout: Duration) -> Recv {
        let state = self.lock();
        let (mut state, _) = self
            .ready
            .wait_timeout_while(state, timeout, |s| {
                s.messages.is_empty() && s.closed.is_none()
            })
            .unwrap_or_else(PoisonError::into_inner);
        match state.messages.pop_front() {
            Some(message) => Recv::Message(message),
            None => match &state.closed {
                Some(reason) => Recv::Closed(reason.clone()),
                None => Recv::Empty,
            },
        }
    }

    /// Drop every buffered packet.
    pub fn clear(&self) {
        self.lock().messages.clear();
    }

    /// Mark the producer as gone and wake all waiters.
    pub fn close(&self, reason: impl Into<String>) {
        let mut state = self.lock();
        if state.closed.is_none() {
            state.closed = Some(reason.into());
        }
        drop(state);
        self.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed.is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InboundQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}
