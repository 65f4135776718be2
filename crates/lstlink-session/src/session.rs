use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, trace};

use crate::error::{Result, SessionError};
use crate::link::Link;
use crate::queue::DEFAULT_QUEUE_CAPACITY;

/// Lowest sequence number a session emits. `[0, 16)` is reserved.
pub const SEQUENCE_MIN: u16 = 16;

/// Sequence numbers wrap back to [`SEQUENCE_MIN`] on reaching this value.
pub const SEQUENCE_MAX: u16 = 64000;

/// Longest single wait on the link, so the cancel flag stays responsive.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default per-attempt reply timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1200);

/// The sequence number that follows `sequence`.
pub fn next_sequence(sequence: u16) -> u16 {
    let next = ((u32::from(sequence) + 1) % u32::from(SEQUENCE_MAX)) as u16;
    next.max(SEQUENCE_MIN)
}

/// Whether `candidate` answers `request`: same target id and sequence.
pub fn is_reply(request: &[u8], candidate: &[u8]) -> bool {
    request.len() >= 4 && candidate.len() >= 4 && request[..4] == candidate[..4]
}

/// Reply waiting policy.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Per-attempt wait. `None` waits until a reply or cancellation.
    pub timeout: Option<Duration>,
    /// Re-sends after the first attempt. `None` retries forever.
    pub retries: Option<usize>,
    /// Inbound packets buffered by a link before the oldest is dropped.
    pub queue_capacity: usize,
    /// Raised by another thread to abandon a wait.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: Some(DEFAULT_TIMEOUT),
            retries: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            cancel: None,
        }
    }
}

impl SessionConfig {
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: Option<usize>) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Request/response conversation with one radio.
///
/// Owns the sequence counter. Every logical command gets a fresh sequence
/// number; re-sends of the same command reuse it, so a late reply to an
/// earlier attempt still matches.
#[derive(Debug)]
pub struct Session<L: Link> {
    link: L,
    target_id: u16,
    sequence: u16,
    config: SessionConfig,
}

impl<L: Link> Session<L> {
    pub fn new(link: L, target_id: u16) -> Self {
        Self::with_config(link, target_id, SessionConfig::default())
    }

    pub fn with_config(link: L, target_id: u16, config: SessionConfig) -> Self {
        Self {
            link,
            target_id,
            sequence: SEQUENCE_MIN,
            config,
        }
    }

    /// Start counting from `sequence`. The next send uses
    /// `next_sequence(sequence)`, which always lands in `[16, 64000)`.
    pub fn with_sequence(mut self, sequence: u16) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn target_id(&self) -> u16 {
        self.target_id
    }

    /// The sequence number of the most recent send.
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn into_link(self) -> L {
        self.link
    }

    /// Send once and wait up to `timeout`. No reply is `Ok(None)`.
    pub fn send_once(&mut self, command: &str, timeout: Duration) -> Result<Option<String>> {
        self.send_with(command, Some(timeout), Some(0))
    }

    /// Send with the configured timeout and retry policy.
    pub fn send(&mut self, command: &str) -> Result<Option<String>> {
        self.send_with(command, self.config.timeout, self.config.retries)
    }

    /// Send with an explicit timeout and retry policy.
    pub fn send_with(
        &mut self,
        command: &str,
        timeout: Option<Duration>,
        retries: Option<usize>,
    ) -> Result<Option<String>> {
        let reply = self.request(command, timeout, retries)?;
        Ok(reply.map(|packet| lstlink_command::decode(&packet)))
    }

    /// Like [`Session::send_with`], returning the raw reply packet.
    pub fn request(
        &mut self,
        command: &str,
        timeout: Option<Duration>,
        retries: Option<usize>,
    ) -> Result<Option<Bytes>> {
        self.sequence = next_sequence(self.sequence);
        let message = lstlink_command::encode(self.target_id, self.sequence, command)?;
        debug!(
            target_id = self.target_id,
            sequence = self.sequence,
            command,
            "sending command"
        );
        self.transact(&message, timeout, retries)
    }

    /// Send with the configured policy and require the reply to read `expected`.
    pub fn send_expect(&mut self, command: &str, expected: &str) -> Result<String> {
        self.send_expect_with(command, expected, self.config.timeout, self.config.retries)
    }

    pub fn send_expect_with(
        &mut self,
        command: &str,
        expected: &str,
        timeout: Option<Duration>,
        retries: Option<usize>,
    ) -> Result<String> {
        match self.send_with(command, timeout, retries)? {
            Some(reply) if reply == expected => Ok(reply),
            actual => Err(SessionError::UnexpectedReply {
                command: command.to_string(),
                expected: expected.to_string(),
                actual,
            }),
        }
    }

    fn transact(
        &mut self,
        message: &[u8],
        timeout: Option<Duration>,
        retries: Option<usize>,
    ) -> Result<Option<Bytes>> {
        let mut attempt = 0usize;
        loop {
            self.link.flush()?;
            self.link.send_message(message)?;
            if let Some(reply) = self.await_reply(message, timeout)? {
                return Ok(Some(reply));
            }
            attempt += 1;
            if retries.is_some_and(|limit| attempt > limit) {
                debug!(sequence = self.sequence, attempt, "no reply");
                return Ok(None);
            }
            debug!(sequence = self.sequence, attempt, "no reply, re-sending");
        }
    }

    fn await_reply(&mut self, request: &[u8], timeout: Option<Duration>) -> Result<Option<Bytes>> {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        loop {
            self.check_cancel()?;
            let wait = match deadline {
                Some(deadline) => deadline
                    .saturating_duration_since(Instant::now())
                    .min(POLL_INTERVAL),
                None => POLL_INTERVAL,
            };
            if let Some(candidate) = self.link.poll_message(wait)? {
                if is_reply(request, &candidate) {
                    return Ok(Some(candidate));
                }
                trace!(packet = %hex::encode(&candidate), "ignoring unrelated packet");
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Ok(None);
            }
        }
    }

    fn check_cancel(&self) -> Result<()> {
        match &self.config.cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(SessionError::Cancelled),
            _ => Ok(()),
        }
    }
}
