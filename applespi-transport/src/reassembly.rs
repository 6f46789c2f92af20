//! Multi-packet message reassembly

use tracing::warn;

use crate::error::{FramingError, ProtocolError};
use crate::message::Message;
use crate::packet::Packet;
use crate::protocol::MAX_MESSAGE_SIZE;

/// Result of feeding one packet to the [`Reassembler`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assembly {
    /// A verified message is ready
    Complete(Message),
    /// More packets are needed
    Pending,
}

/// Accumulates the packets of one message at a time
///
/// Any framing violation drops the partial message, so the next packet with
/// offset 0 always starts cleanly.
#[derive(Debug, Default)]
pub struct Reassembler {
    buf: Vec<u8>,
    expected_total: Option<usize>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(MAX_MESSAGE_SIZE),
            expected_total: None,
        }
    }

    /// Bytes accumulated for the message in progress
    pub fn accumulated(&self) -> usize {
        self.buf.len()
    }

    pub fn is_idle(&self) -> bool {
        self.buf.is_empty() && self.expected_total.is_none()
    }

    /// Drop any partial message
    pub fn reset(&mut self) {
        self.buf.clear();
        self.expected_total = None;
    }

    /// Feed one decoded packet
    pub fn accept(&mut self, packet: &Packet) -> Result<Assembly, ProtocolError> {
        let off = packet.offset() as usize;
        let rem = packet.remaining() as usize;
        let len = packet.length() as usize;

        if off == 0 && !self.is_idle() {
            warn!(
                "Dropping incomplete message ({} of {:?} bytes)",
                self.buf.len(),
                self.expected_total
            );
            self.reset();
        }

        if packet.is_single() {
            return Ok(Assembly::Complete(Message::parse(packet.data())?));
        }

        if let Err(e) = self.check(off, rem, len) {
            self.reset();
            return Err(e.into());
        }

        self.expected_total = Some(off + len + rem);
        self.buf.extend_from_slice(packet.data());
        if rem > 0 {
            return Ok(Assembly::Pending);
        }

        let bytes = std::mem::take(&mut self.buf);
        self.reset();
        Ok(Assembly::Complete(Message::parse(&bytes)?))
    }

    fn check(&self, off: usize, rem: usize, len: usize) -> Result<(), FramingError> {
        if off != self.buf.len() {
            return Err(FramingError::UnexpectedOffset {
                got: off as u16,
                expected: self.buf.len(),
            });
        }
        if off + rem > MAX_MESSAGE_SIZE {
            return Err(FramingError::MessageTooLarge(off + rem));
        }
        if off + len > MAX_MESSAGE_SIZE {
            return Err(FramingError::MessageTooLarge(off + len));
        }
        let total = off + len + rem;
        if total > MAX_MESSAGE_SIZE {
            return Err(FramingError::MessageTooLarge(total));
        }
        match self.expected_total {
            Some(expected) if expected != total => {
                Err(FramingError::TotalMismatch { got: total, expected })
            }
            _ => Ok(()),
        }
    }
}
