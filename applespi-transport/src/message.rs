//! Message layer
//!
//! A message is an 8-byte header, a body and a trailing CRC-16 over both.

use serde::Serialize;
use zerocopy::byteorder::little_endian::U16;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::error::IntegrityError;
use crate::protocol::{crc16, msg_type, MESSAGE_CRC_SIZE, MESSAGE_HEADER_SIZE};

/// Wire layout of the message header
#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct MessageHeader {
    pub msg_type: U16,
    pub zero: u8,
    pub counter: u8,
    pub rsp_buf_len: U16,
    pub length: U16,
}

/// A verified message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub msg_type: u16,
    /// Per-command sequence number, diagnostics only
    pub counter: u8,
    /// Response buffer length; equals the body length on commands and echoes
    /// the request on responses
    pub rsp_buf_len: u16,
    pub body: Vec<u8>,
}

impl Message {
    pub fn new(msg_type: u16, counter: u8, rsp_buf_len: u16, body: Vec<u8>) -> Self {
        Self {
            msg_type,
            counter,
            rsp_buf_len,
            body,
        }
    }

    /// A command message: the device is told to expect a response as long
    /// as the command body
    pub fn command(msg_type: u16, counter: u8, body: Vec<u8>) -> Self {
        let len = body.len() as u16;
        Self::new(msg_type, counter, len, body)
    }

    /// Value of the header `length` field
    pub fn declared_length(&self) -> u16 {
        self.body.len() as u16
    }

    /// Size of the encoded message
    pub fn encoded_len(&self) -> usize {
        MESSAGE_HEADER_SIZE + self.body.len() + MESSAGE_CRC_SIZE
    }

    pub fn type_name(&self) -> &'static str {
        msg_type::name(self.msg_type)
    }

    /// Parse and verify a fully reassembled message
    pub fn parse(bytes: &[u8]) -> Result<Self, IntegrityError> {
        if bytes.len() < MESSAGE_HEADER_SIZE + MESSAGE_CRC_SIZE {
            return Err(IntegrityError::TooShort(bytes.len()));
        }
        let (header, _) = MessageHeader::ref_from_prefix(bytes)
            .map_err(|_| IntegrityError::TooShort(bytes.len()))?;

        let declared = header.length.get();
        let actual = bytes.len() - MESSAGE_HEADER_SIZE - MESSAGE_CRC_SIZE;
        if declared as usize != actual {
            return Err(IntegrityError::LengthMismatch { declared, actual });
        }

        let residue = crc16(0, bytes);
        if residue != 0 {
            return Err(IntegrityError::ChecksumMismatch { residue });
        }

        Ok(Self {
            msg_type: header.msg_type.get(),
            counter: header.counter,
            rsp_buf_len: header.rsp_buf_len.get(),
            body: bytes[MESSAGE_HEADER_SIZE..MESSAGE_HEADER_SIZE + actual].to_vec(),
        })
    }

    /// Encode header, body and CRC
    pub fn encode(&self) -> Vec<u8> {
        let header = MessageHeader {
            msg_type: U16::new(self.msg_type),
            zero: 0,
            counter: self.counter,
            rsp_buf_len: U16::new(self.rsp_buf_len),
            length: U16::new(self.declared_length()),
        };
        let mut out = Vec::with_capacity(self.encoded_len());
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(&self.body);
        let crc = crc16(0, &out);
        out.extend_from_slice(&crc.to_le_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_size() {
        assert_eq!(std::mem::size_of::<MessageHeader>(), MESSAGE_HEADER_SIZE);
    }

    #[test]
    fn test_encode_caps_lock() {
        let msg = Message::command(msg_type::CAPS_LOCK, 7, vec![0x01, 0x02]);
        let bytes = msg.encode();
        assert_eq!(&bytes[..8], &[0x51, 0x01, 0x00, 0x07, 0x02, 0x00, 0x02, 0x00]);
        assert_eq!(&bytes[8..10], &[0x01, 0x02]);
        assert_eq!(bytes.len(), 12);
        assert_eq!(crc16(0, &bytes), 0);
    }

    #[test]
    fn test_parse_roundtrip() {
        let msg = Message::new(msg_type::KEYBOARD, 0, 0, vec![0; 8]);
        assert_eq!(Message::parse(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn test_parse_empty_body() {
        let msg = Message::new(msg_type::INIT, 3, 2, vec![]);
        let parsed = Message::parse(&msg.encode()).unwrap();
        assert!(parsed.body.is_empty());
        assert_eq!(parsed.rsp_buf_len, 2);
    }

    #[test]
    fn test_parse_too_short() {
        assert_eq!(Message::parse(&[0; 9]), Err(IntegrityError::TooShort(9)));
    }

    #[test]
    fn test_parse_length_mismatch() {
        let mut bytes = Message::new(msg_type::KEYBOARD, 0, 0, vec![1, 2, 3]).encode();
        bytes.push(0);
        assert_eq!(
            Message::parse(&bytes),
            Err(IntegrityError::LengthMismatch {
                declared: 3,
                actual: 4
            })
        );
    }

    #[test]
    fn test_parse_bad_crc() {
        let mut bytes = Message::new(msg_type::KEYBOARD, 0, 0, vec![1, 2, 3]).encode();
        bytes[9] ^= 0x40;
        assert!(matches!(
            Message::parse(&bytes),
            Err(IntegrityError::ChecksumMismatch { .. })
        ));
    }
}
