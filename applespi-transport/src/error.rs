//! Transport error types
//!
//! Nothing here is fatal: framing and integrity errors drop the offending
//! packet or message, transport errors fail the current write exchange.

use thiserror::Error;

/// A packet could not be accepted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    #[error("Received corrupted packet (crc mismatch, residue 0x{residue:04X})")]
    ChecksumMismatch { residue: u16 },

    #[error("Received corrupted packet (invalid packet length {0})")]
    InvalidLength(u16),

    #[error("Received unexpected offset (got {got}, expected {expected})")]
    UnexpectedOffset { got: u16, expected: usize },

    #[error("Received message too large (size {0})")]
    MessageTooLarge(usize),

    #[error("Packet total changed mid-message (got {got}, expected {expected})")]
    TotalMismatch { got: usize, expected: usize },
}

/// A reassembled message failed verification
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("Message too short: {0} bytes")]
    TooShort(usize),

    #[error("Invalid message length: declared {declared}, actual {actual}")]
    LengthMismatch { declared: u16, actual: usize },

    #[error("Message crc mismatch (residue 0x{residue:04X})")]
    ChecksumMismatch { residue: u16 },
}

/// Reassembler output error: either layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error(transparent)]
    Framing(#[from] FramingError),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),
}

/// Errors that can occur during transport operations
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Bus error: {0}")]
    Bus(i32),

    #[error("Error writing to device: status {0:02x?}")]
    BadStatus([u8; 4]),

    #[error("Device disconnected")]
    Disconnected,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<FramingError> for TransportError {
    fn from(e: FramingError) -> Self {
        TransportError::Protocol(e.into())
    }
}

impl From<IntegrityError> for TransportError {
    fn from(e: IntegrityError) -> Self {
        TransportError::Protocol(e.into())
    }
}

/// A report body does not match its declared layout
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReportError {
    #[error("Invalid {report} report length: expected {expected}, got {actual}")]
    InvalidLength {
        report: &'static str,
        expected: usize,
        actual: usize,
    },
}
