//! Bootloader flashing protocol.
//!
//! 1. Reboot the radio and immediately ask its bootloader to erase the
//!    application. Repeat until the erase is acknowledged.
//! 2. Write every non-erased application page and require an
//!    acknowledgment carrying the page number.
//! 3. Send the sentinel page to end the transfer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use lstlink_session::{Link, Session, SessionError};
use tracing::{debug, info, warn};

use crate::error::{FlashError, Result};
use crate::image::FlashImage;
use crate::layout::{FLASH_APP_END, FLASH_APP_START, FLASH_SIGNATURE_LEN, SENTINEL_PAGE};

pub const REBOOT_COMMAND: &str = "lst reboot";
pub const ERASE_COMMAND: &str = "lst bootloader_erase";
pub const ERASE_ACK: &str = "lst bootloader_ack 1";

/// What the flasher needs from a radio connection.
pub trait CommandPort {
    /// Send once, wait up to `timeout`, no retries.
    fn send_once(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> std::result::Result<Option<String>, SessionError>;

    /// Send and require the reply text to equal `expected`.
    fn send_expect(
        &mut self,
        command: &str,
        expected: &str,
        timeout: Option<Duration>,
        retries: Option<usize>,
    ) -> std::result::Result<String, SessionError>;
}

impl<L: Link> CommandPort for Session<L> {
    fn send_once(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> std::result::Result<Option<String>, SessionError> {
        Session::send_once(self, command, timeout)
    }

    fn send_expect(
        &mut self,
        command: &str,
        expected: &str,
        timeout: Option<Duration>,
        retries: Option<usize>,
    ) -> std::result::Result<String, SessionError> {
        self.send_expect_with(command, expected, timeout, retries)
    }
}

/// Timing and retry policy of a flashing run.
#[derive(Debug, Clone)]
pub struct FlashConfig {
    /// Wait for an answer to the reboot (usually none comes).
    pub reboot_timeout: Duration,
    /// Pause between reboot and erase so the bootloader is listening.
    pub settle_delay: Duration,
    pub erase_timeout: Option<Duration>,
    /// Erase re-sends within one entry attempt.
    pub erase_retries: Option<usize>,
    /// Pause after every reboot/erase round, before the next round or the
    /// first page write.
    pub retry_delay: Duration,
    /// Entry attempts before giving up. `None` keeps trying.
    pub max_entry_attempts: Option<usize>,
    pub page_timeout: Option<Duration>,
    pub page_retries: Option<usize>,
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            reboot_timeout: Duration::from_millis(100),
            settle_delay: Duration::from_millis(200),
            erase_timeout: Some(Duration::from_secs(2)),
            erase_retries: Some(0),
            retry_delay: Duration::from_millis(1500),
            max_entry_attempts: None,
            page_timeout: Some(Duration::from_millis(1200)),
            page_retries: Some(3),
            cancel: None,
        }
    }
}

impl FlashConfig {
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_max_entry_attempts(mut self, attempts: Option<usize>) -> Self {
        self.max_entry_attempts = attempts;
        self
    }

    pub fn with_page_policy(mut self, timeout: Option<Duration>, retries: Option<usize>) -> Self {
        self.page_timeout = timeout;
        self.page_retries = retries;
        self
    }

    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlashReport {
    pub pages_written: usize,
    pub pages_skipped: usize,
    /// Reboot/erase rounds needed to reach the bootloader.
    pub attempts: usize,
}

/// Drives the bootloader over any [`CommandPort`].
pub struct Flasher<P: CommandPort> {
    port: P,
    config: FlashConfig,
}

impl<P: CommandPort> Flasher<P> {
    pub fn new(port: P) -> Self {
        Self::with_config(port, FlashConfig::default())
    }

    pub fn with_config(port: P, config: FlashConfig) -> Self {
        Self { port, config }
    }

    pub fn config(&self) -> &FlashConfig {
        &self.config
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    pub fn into_port(self) -> P {
        self.port
    }

    fn check_cancel(&self) -> Result<()> {
        match &self.config.cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(FlashError::Cancelled),
            _ => Ok(()),
        }
    }

    /// Reboot into the bootloader and erase the application.
    ///
    /// Returns the number of reboot/erase rounds it took. A missing or
    /// wrong erase acknowledgment starts another round; link failures are
    /// returned.
    pub fn enter_bootloader(&mut self) -> Result<usize> {
        let mut attempt = 0;
        loop {
            self.check_cancel()?;
            attempt += 1;
            debug!(attempt, "rebooting into bootloader");
            self.port
                .send_once(REBOOT_COMMAND, self.config.reboot_timeout)?;
            thread::sleep(self.config.settle_delay);

            let erased = match self.port.send_expect(
                ERASE_COMMAND,
                ERASE_ACK,
                self.config.erase_timeout,
                self.config.erase_retries,
            ) {
                Ok(_) => true,
                Err(err @ SessionError::UnexpectedReply { .. }) => {
                    warn!(attempt, %err, "bootloader did not acknowledge erase, retrying");
                    false
                }
                Err(err) => return Err(err.into()),
            };

            if !erased
                && self
                    .config
                    .max_entry_attempts
                    .is_some_and(|limit| attempt >= limit)
            {
                return Err(FlashError::BootloaderUnreachable { attempts: attempt });
            }
            // The bootloader needs the same pause after a good erase
            // before it takes page writes.
            thread::sleep(self.config.retry_delay);
            if erased {
                info!(attempt, "bootloader erased application");
                return Ok(attempt);
            }
        }
    }

    /// Write the application pages of `image`, then the sentinel page.
    ///
    /// Returns `(written, skipped)`. The first unacknowledged page aborts
    /// the run.
    pub fn transfer_pages(&mut self, image: &FlashImage) -> Result<(usize, usize)> {
        let mut written = 0;
        let mut skipped = 0;
        for page in image.pages(FLASH_APP_START..=FLASH_APP_END) {
            self.check_cancel()?;
            if page.is_erased() {
                debug!(page = page.number, "page is empty, skipping");
                skipped += 1;
                continue;
            }
            let command = format!(
                "lst bootloader_write_page {} {}",
                page.number,
                hex::encode(page.data)
            );
            let expected = format!("lst bootloader_ack {}", page.number);
            self.port
                .send_expect(
                    &command,
                    &expected,
                    self.config.page_timeout,
                    self.config.page_retries,
                )
                .map_err(|source| FlashError::PageWrite {
                    page: page.number,
                    source,
                })?;
            debug!(page = page.number, "page written");
            written += 1;
        }

        // End of transfer. The bootloader may not answer.
        let sentinel = format!("lst bootloader_write_page {SENTINEL_PAGE}");
        let timeout = self.config.page_timeout.unwrap_or(self.config.reboot_timeout);
        self.port.send_once(&sentinel, timeout)?;
        info!(written, skipped, "application transferred");
        Ok((written, skipped))
    }

    /// Splice `signature` into a copy of `application` and flash it.
    pub fn flash(
        &mut self,
        application: &FlashImage,
        signature: &[u8; FLASH_SIGNATURE_LEN],
    ) -> Result<FlashReport> {
        let mut image = application.clone();
        image.set_signature(signature);
        info!(signature = %hex::encode(signature), "inserted signature");

        let attempts = self.enter_bootloader()?;
        let (pages_written, pages_skipped) = self.transfer_pages(&image)?;
        Ok(FlashReport {
            pages_written,
            pages_skipped,
            attempts,
        })
    }
}

impl<P: CommandPort + std::fmt::Debug> std::fmt::Debug for Flasher<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flasher")
            .field("port", &self.port)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use bytes::Bytes;
    use lstlink_session::{Result as SessionResult, SessionConfig};

    use super::*;
    use crate::layout::{FLASH_PAGE_SIZE, FLASH_SIGNATURE_START};

    /// Scripted radio: erase acks are consumed from a queue; page writes
    /// are acknowledged unless listed in `reject_pages`.
    #[derive(Default)]
    struct ScriptedPort {
        log: Vec<String>,
        erase_outcomes: VecDeque<bool>,
        reject_pages: Vec<usize>,
    }

    impl ScriptedPort {
        fn count(&self, prefix: &str) -> usize {
            self.log.iter().filter(|c| c.starts_with(prefix)).count()
        }
    }

    impl CommandPort for ScriptedPort {
        fn send_once(
            &mut self,
            command: &str,
            _timeout: Duration,
        ) -> std::result::Result<Option<String>, SessionError> {
            self.log.push(command.to_string());
            Ok(None)
        }

        fn send_expect(
            &mut self,
            command: &str,
            expected: &str,
            _timeout: Option<Duration>,
            _retries: Option<usize>,
        ) -> std::result::Result<String, SessionError> {
            self.log.push(command.to_string());
            let acked = if command == ERASE_COMMAND {
                self.erase_outcomes.pop_front().unwrap_or(true)
            } else {
                let page: usize = command.split_whitespace().nth(2).unwrap().parse().unwrap();
                !self.reject_pages.contains(&page)
            };
            if acked {
                Ok(expected.to_string())
            } else {
                Err(SessionError::UnexpectedReply {
                    command: command.to_string(),
                    expected: expected.to_string(),
                    actual: None,
                })
            }
        }
    }

    fn quick() -> FlashConfig {
        FlashConfig::default()
            .with_settle_delay(Duration::ZERO)
            .with_retry_delay(Duration::ZERO)
    }

    fn firmware(programmed_pages: usize) -> FlashImage {
        let mut image = FlashImage::erased();
        for index in 0..programmed_pages {
            let address = FLASH_APP_START + index * FLASH_PAGE_SIZE;
            image.write(address, &[index as u8; FLASH_PAGE_SIZE]);
        }
        image
    }

    #[test]
    fn erased_tail_pages_are_not_sent() {
        // 208 application pages, the last 30 erased.
        let image = firmware(178);
        let mut flasher = Flasher::with_config(ScriptedPort::default(), quick());
        let (written, skipped) = flasher.transfer_pages(&image).unwrap();

        assert_eq!((written, skipped), (178, 30));
        let port = flasher.into_port();
        assert_eq!(port.count("lst bootloader_write_page"), 178 + 1);
        assert_eq!(port.log.last().unwrap(), "lst bootloader_write_page 255");
    }

    #[test]
    fn entry_retries_until_erase_is_acknowledged() {
        let port = ScriptedPort {
            erase_outcomes: VecDeque::from([false, false, true]),
            ..ScriptedPort::default()
        };
        let mut flasher = Flasher::with_config(port, quick());
        let report = flasher.flash(&firmware(2), &[0xAA; 16]).unwrap();

        assert_eq!(report.attempts, 3);
        let port = flasher.into_port();
        assert_eq!(port.count(REBOOT_COMMAND), 3);
        assert_eq!(port.count(ERASE_COMMAND), 3);

        let last_erase = port.log.iter().rposition(|c| c == ERASE_COMMAND).unwrap();
        let first_page = port
            .log
            .iter()
            .position(|c| c.starts_with("lst bootloader_write_page"))
            .unwrap();
        assert!(last_erase < first_page);
        assert_eq!(
            &port.log[..6],
            &[
                REBOOT_COMMAND,
                ERASE_COMMAND,
                REBOOT_COMMAND,
                ERASE_COMMAND,
                REBOOT_COMMAND,
                ERASE_COMMAND
            ]
        );
    }

    #[test]
    fn pauses_after_successful_erase() {
        let delay = Duration::from_millis(40);
        let mut flasher = Flasher::with_config(
            ScriptedPort::default(),
            quick().with_retry_delay(delay),
        );
        let started = std::time::Instant::now();
        assert_eq!(flasher.enter_bootloader().unwrap(), 1);
        assert!(started.elapsed() >= delay);
    }

    #[test]
    fn flash_writes_signature_page() {
        let mut flasher = Flasher::with_config(ScriptedPort::default(), quick());
        let report = flasher.flash(&firmware(1), &[0x5A; 16]).unwrap();
        assert_eq!(report.pages_written, 2);
        assert_eq!(report.pages_skipped, 206);

        let port = flasher.into_port();
        let signature_page = FLASH_SIGNATURE_START / FLASH_PAGE_SIZE;
        let command = port
            .log
            .iter()
            .find(|c| c.starts_with(&format!("lst bootloader_write_page {signature_page} ")))
            .unwrap();
        assert!(command.ends_with(&"5a".repeat(16)));
    }

    #[test]
    fn rejected_page_aborts_run() {
        let port = ScriptedPort {
            reject_pages: vec![9],
            ..ScriptedPort::default()
        };
        let mut flasher = Flasher::with_config(port, quick());
        let err = flasher.transfer_pages(&firmware(3)).unwrap_err();
        assert!(matches!(err, FlashError::PageWrite { page: 9, .. }));

        let port = flasher.into_port();
        assert_eq!(port.count("lst bootloader_write_page 10"), 0);
        assert_eq!(port.count("lst bootloader_write_page 255"), 0);
    }

    #[test]
    fn bounded_entry_gives_up() {
        let port = ScriptedPort {
            erase_outcomes: VecDeque::from([false, false, false]),
            ..ScriptedPort::default()
        };
        let config = quick().with_max_entry_attempts(Some(2));
        let mut flasher = Flasher::with_config(port, config);
        assert!(matches!(
            flasher.enter_bootloader(),
            Err(FlashError::BootloaderUnreachable { attempts: 2 })
        ));
    }

    #[test]
    fn cancel_stops_entry_loop() {
        let cancel = Arc::new(AtomicBool::new(true));
        let mut flasher =
            Flasher::with_config(ScriptedPort::default(), quick().with_cancel(cancel));
        assert!(matches!(
            flasher.enter_bootloader(),
            Err(FlashError::Cancelled)
        ));
        assert!(flasher.into_port().log.is_empty());
    }

    /// A radio bootloader behind a real session: acks erase and every page.
    struct BootloaderLink {
        inbox: VecDeque<Bytes>,
    }

    impl Link for BootloaderLink {
        fn send_message(&mut self, message: &[u8]) -> SessionResult<()> {
            let text = lstlink_command::decode(message);
            let target = u16::from_le_bytes([message[0], message[1]]);
            let sequence = u16::from_le_bytes([message[2], message[3]]);
            let reply = match text.split_whitespace().collect::<Vec<_>>().as_slice() {
                ["lst", "bootloader_erase", ..] => Some("lst bootloader_ack 1".to_string()),
                ["lst", "bootloader_write_page", page, _data] => {
                    Some(format!("lst bootloader_ack {page}"))
                }
                _ => None,
            };
            if let Some(reply) = reply {
                self.inbox
                    .push_back(lstlink_command::encode(target, sequence, &reply).unwrap());
            }
            Ok(())
        }

        fn poll_message(&mut self, _timeout: Duration) -> SessionResult<Option<Bytes>> {
            Ok(self.inbox.pop_front())
        }

        fn flush(&mut self) -> SessionResult<()> {
            self.inbox.clear();
            Ok(())
        }
    }

    #[test]
    fn flashes_through_a_session() {
        let link = BootloaderLink {
            inbox: VecDeque::new(),
        };
        let session = Session::with_config(
            link,
            0x0171,
            SessionConfig::default().with_timeout(Some(Duration::from_millis(20))),
        );
        let config = quick().with_page_policy(Some(Duration::from_millis(50)), Some(0));
        let mut flasher = Flasher::with_config(session, config);
        let report = flasher.flash(&firmware(4), &[1; 16]).unwrap();
        assert_eq!(
            report,
            FlashReport {
                pages_written: 5,
                pages_skipped: 203,
                attempts: 1,
            }
        );
    }
}
