//! Polling producer/consumer protocol over a mailbox
//!
//! The producer writes a fixed number of copies of one message into slots
//! chosen by stepping backwards through the array; the consumer sweeps all
//! slots at a fixed interval until a deadline passes. Neither side waits on
//! the other, so a slot revisited before the consumer's next sweep loses its
//! earlier message. Rounds are tuned so that this stays rare.

use crate::mailbox::{FlagAccess, MailboxArray, Volatile, MESSAGE_CAPACITY};
use crate::{Error, Result};
use std::thread;
use std::time::{Duration, Instant};

/// Message both roles agree on
pub const DEFAULT_MESSAGE: &str = "Sent from the Producer";

/// Largest count a role can report through its exit status
pub const MAX_REPORTABLE_COUNT: usize = 254;

/// Parameters of a mailbox round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolConfig {
    /// Number of mailbox slots
    pub boxes: usize,
    /// Messages the producer sends
    pub messages: usize,
    /// Slots the producer steps back between sends
    pub stride: usize,
    /// Pause between sends
    pub send_interval: Duration,
    /// Pause between consumer sweeps
    pub sweep_interval: Duration,
    /// How long the consumer keeps sweeping
    pub deadline: Duration,
    /// Message sent and counted
    pub message: String,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            boxes: 8,
            messages: 12,
            stride: 3,
            send_interval: Duration::from_millis(10),
            sweep_interval: Duration::from_millis(10),
            deadline: Duration::from_secs(5),
            message: DEFAULT_MESSAGE.to_string(),
        }
    }
}

impl ProtocolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn boxes(mut self, boxes: usize) -> Self {
        self.boxes = boxes;
        self
    }

    pub fn messages(mut self, messages: usize) -> Self {
        self.messages = messages;
        self
    }

    pub fn stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    pub fn send_interval(mut self, interval: Duration) -> Self {
        self.send_interval = interval;
        self
    }

    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Segment size needed for this round's mailbox
    pub fn segment_size(&self) -> Result<usize> {
        MailboxArray::<Volatile>::required_size(self.boxes)
    }

    pub fn validate(&self) -> Result<()> {
        SlotSequence::new(self.boxes, self.stride)?;
        self.segment_size()?;
        if self.messages > MAX_REPORTABLE_COUNT {
            return Err(Error::InvalidConfig(format!(
                "at most {} messages can be reported, got {}",
                MAX_REPORTABLE_COUNT, self.messages
            )));
        }
        if self.message.is_empty() {
            return Err(Error::InvalidConfig("message cannot be empty".to_string()));
        }
        if self.message.len() > MESSAGE_CAPACITY {
            return Err(Error::MessageTooLong {
                len: self.message.len(),
                capacity: MESSAGE_CAPACITY,
            });
        }
        Ok(())
    }

    fn check_mailbox<F: FlagAccess>(&self, mailbox: &MailboxArray<'_, F>) -> Result<()> {
        self.validate()?;
        if mailbox.len() < self.boxes {
            return Err(Error::InvalidConfig(format!(
                "round uses {} boxes but the mailbox has {}",
                self.boxes,
                mailbox.len()
            )));
        }
        Ok(())
    }
}

/// Slot indices visited by the producer
///
/// Starts one past the last slot and steps back by `stride`, wrapping to
/// the top whenever the index would go negative.
#[derive(Debug, Clone)]
pub struct SlotSequence {
    index: usize,
    boxes: usize,
    stride: usize,
}

impl SlotSequence {
    /// `stride` must be between 1 and `boxes`, so one wrap always suffices.
    pub fn new(boxes: usize, stride: usize) -> Result<Self> {
        if boxes == 0 {
            return Err(Error::InvalidConfig("boxes must be greater than zero".to_string()));
        }
        if stride == 0 || stride > boxes {
            return Err(Error::InvalidConfig(format!(
                "stride must be between 1 and {}, got {}",
                boxes, stride
            )));
        }
        Ok(Self {
            index: boxes,
            boxes,
            stride,
        })
    }
}

impl Iterator for SlotSequence {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        self.index = if self.index >= self.stride {
            self.index - self.stride
        } else {
            self.index + self.boxes - self.stride
        };
        Some(self.index)
    }
}

/// Send `config.messages` copies of the message, returning how many were sent
pub fn produce<F: FlagAccess>(mailbox: &MailboxArray<'_, F>, config: &ProtocolConfig) -> Result<usize> {
    config.check_mailbox(mailbox)?;

    let mut sent = 0;
    for index in SlotSequence::new(config.boxes, config.stride)?.take(config.messages) {
        mailbox.put(index, &config.message)?;
        sent += 1;
        log::debug!("sent message {} into slot {}", sent, index);
        thread::sleep(config.send_interval);
    }

    log::info!("producer sent {} messages", sent);
    Ok(sent)
}

/// Sweep the mailbox until the deadline, returning how many messages matched
pub fn consume<F: FlagAccess>(mailbox: &MailboxArray<'_, F>, config: &ProtocolConfig) -> Result<usize> {
    config.check_mailbox(mailbox)?;

    let start = Instant::now();
    let mut received = 0;
    while start.elapsed() < config.deadline {
        for index in 0..config.boxes {
            match mailbox.try_take(index)? {
                Some(msg) if msg == config.message => {
                    received += 1;
                    log::debug!("received message {} from slot {}", received, index);
                }
                Some(msg) => log::warn!("slot {}: unexpected message {:?}", index, msg),
                None => {}
            }
        }
        thread::sleep(config.sweep_interval);
    }

    log::info!("consumer received {} messages", received);
    Ok(received)
}

/// Counts reported by both roles of a finished round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundReport {
    pub sent: usize,
    pub received: usize,
}

impl RoundReport {
    pub fn is_complete(&self) -> bool {
        self.sent == self.received
    }

    /// Fail with [`Error::CountMismatch`] when messages were lost
    pub fn check(&self) -> Result<()> {
        if self.is_complete() {
            return Ok(());
        }
        log::warn!(
            "round lost {} messages: sent {}, received {}",
            self.sent.abs_diff(self.received),
            self.sent,
            self.received
        );
        Err(Error::CountMismatch {
            sent: self.sent,
            received: self.received,
        })
    }
}
