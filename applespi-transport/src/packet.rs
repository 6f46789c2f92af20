//! Packet codec
//!
//! Every bus transfer is exactly [`PACKET_SIZE`] bytes. A packet carries all
//! or part of one message; messages longer than [`PACKET_DATA_SIZE`] are split
//! over consecutive packets using the `offset` and `remaining` fields.

use serde::Serialize;
use std::fmt;
use zerocopy::byteorder::little_endian::U16;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::error::FramingError;
use crate::protocol::{
    self, crc16, MAX_PACKETS_PER_MESSAGE, PACKET_DATA_SIZE, PACKET_SIZE,
};

/// Wire layout of a packet
#[derive(Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct RawPacket {
    flags: u8,
    device: u8,
    offset: U16,
    remaining: U16,
    length: U16,
    data: [u8; PACKET_DATA_SIZE],
    crc_16: U16,
}

// ============================================================================
// Header fields
// ============================================================================

/// Packet direction (the `flags` byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Direction {
    /// Device-initiated read
    Read,
    /// Command written to the device, or the response to one
    Write,
    /// Any other flags value
    Other(u8),
}

impl Direction {
    pub fn from_byte(b: u8) -> Self {
        match b {
            protocol::flags::READ => Self::Read,
            protocol::flags::WRITE => Self::Write,
            other => Self::Other(other),
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::Read => protocol::flags::READ,
            Self::Write => protocol::flags::WRITE,
            Self::Other(b) => b,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other(b) => write!(f, "0x{b:02X}"),
            _ => f.write_str(protocol::flags::name(self.as_byte())),
        }
    }
}

/// Target device (the `device` byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DeviceId {
    Keyboard,
    Touchpad,
    Other(u8),
}

impl DeviceId {
    pub fn from_byte(b: u8) -> Self {
        match b {
            protocol::device::KEYBOARD => Self::Keyboard,
            protocol::device::TOUCHPAD => Self::Touchpad,
            other => Self::Other(other),
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::Keyboard => protocol::device::KEYBOARD,
            Self::Touchpad => protocol::device::TOUCHPAD,
            Self::Other(b) => b,
        }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other(b) => write!(f, "0x{b:02X}"),
            _ => f.write_str(protocol::device::name(self.as_byte())),
        }
    }
}

// ============================================================================
// Packet
// ============================================================================

/// A decoded packet
///
/// Only the valid part of the payload is kept; encoding pads it with zeros.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Packet {
    direction: Direction,
    device: DeviceId,
    offset: u16,
    remaining: u16,
    data: Vec<u8>,
}

impl Packet {
    /// Build a packet carrying `data` at `offset` of a message, with
    /// `remaining` message bytes to follow in later packets.
    pub fn new(
        direction: Direction,
        device: DeviceId,
        offset: u16,
        remaining: u16,
        data: &[u8],
    ) -> Result<Self, FramingError> {
        if data.len() > PACKET_DATA_SIZE {
            return Err(FramingError::InvalidLength(data.len() as u16));
        }
        Ok(Self {
            direction,
            device,
            offset,
            remaining,
            data: data.to_vec(),
        })
    }

    /// Build a packet holding a whole message
    pub fn single(
        direction: Direction,
        device: DeviceId,
        message: &[u8],
    ) -> Result<Self, FramingError> {
        Self::new(direction, device, 0, 0, message)
    }

    /// Command packets always fit in one packet
    pub(crate) fn command(device: DeviceId, message: Vec<u8>) -> Self {
        debug_assert!(message.len() <= PACKET_DATA_SIZE);
        Self {
            direction: Direction::Write,
            device,
            offset: 0,
            remaining: 0,
            data: message,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }

    pub fn offset(&self) -> u16 {
        self.offset
    }

    pub fn remaining(&self) -> u16 {
        self.remaining
    }

    /// Valid payload bytes
    pub fn length(&self) -> u16 {
        self.data.len() as u16
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// True when this packet carries a complete message on its own
    pub fn is_single(&self) -> bool {
        self.offset == 0 && self.remaining == 0
    }

    /// Decode and CRC-check a raw packet
    ///
    /// The CRC is computed over all 256 bytes including the stored CRC, which
    /// yields zero for an intact packet.
    pub fn decode(buf: &[u8; PACKET_SIZE]) -> Result<Self, FramingError> {
        let residue = crc16(0, buf);
        if residue != 0 {
            return Err(FramingError::ChecksumMismatch { residue });
        }

        let raw: RawPacket = zerocopy::transmute!(*buf);
        let length = raw.length.get();
        if length as usize > PACKET_DATA_SIZE {
            return Err(FramingError::InvalidLength(length));
        }

        Ok(Self {
            direction: Direction::from_byte(raw.flags),
            device: DeviceId::from_byte(raw.device),
            offset: raw.offset.get(),
            remaining: raw.remaining.get(),
            data: raw.data[..length as usize].to_vec(),
        })
    }

    /// Encode into a raw packet with the CRC filled in
    pub fn encode(&self) -> [u8; PACKET_SIZE] {
        let mut data = [0u8; PACKET_DATA_SIZE];
        data[..self.data.len()].copy_from_slice(&self.data);

        let mut raw = RawPacket {
            flags: self.direction.as_byte(),
            device: self.device.as_byte(),
            offset: U16::new(self.offset),
            remaining: U16::new(self.remaining),
            length: U16::new(self.data.len() as u16),
            data,
            crc_16: U16::ZERO,
        };
        let crc = crc16(0, &raw.as_bytes()[..PACKET_SIZE - 2]);
        raw.crc_16 = U16::new(crc);

        zerocopy::transmute!(raw)
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} off={} rem={} len={}",
            self.direction,
            self.device,
            self.offset,
            self.remaining,
            self.data.len()
        )
    }
}

/// Split an encoded message into the packets that carry it
pub fn split_message(
    direction: Direction,
    device: DeviceId,
    message: &[u8],
) -> Result<Vec<Packet>, FramingError> {
    if message.len() > MAX_PACKETS_PER_MESSAGE * PACKET_DATA_SIZE {
        return Err(FramingError::MessageTooLarge(message.len()));
    }
    if message.is_empty() {
        return Ok(vec![Packet::single(direction, device, message)?]);
    }

    let total = message.len();
    message
        .chunks(PACKET_DATA_SIZE)
        .scan(0usize, |offset, chunk| {
            let start = *offset;
            *offset += chunk.len();
            Some(Packet::new(
                direction,
                device,
                start as u16,
                (total - *offset) as u16,
                chunk,
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PACKET_HEADER_SIZE;
    use proptest::prelude::*;

    fn sample() -> Packet {
        Packet::new(
            Direction::Read,
            DeviceId::Keyboard,
            0,
            0,
            &[0x10, 0x01, 0x00, 0x05, 0x00, 0x00, 0x0a, 0x00],
        )
        .unwrap()
    }

    #[test]
    fn test_encode_layout() {
        let raw = sample().encode();
        assert_eq!(raw[0], 0x20);
        assert_eq!(raw[1], 0x01);
        assert_eq!(&raw[2..6], &[0, 0, 0, 0]);
        assert_eq!(&raw[6..8], &[8, 0]); // length, little-endian
        assert_eq!(raw[PACKET_HEADER_SIZE], 0x10);
        assert!(raw[PACKET_HEADER_SIZE + 8..PACKET_SIZE - 2]
            .iter()
            .all(|&b| b == 0));
        assert_eq!(crc16(0, &raw), 0);
    }

    #[test]
    fn test_roundtrip() {
        let packet = Packet::new(
            Direction::Write,
            DeviceId::Touchpad,
            246,
            0,
            &[1, 2, 3, 4, 5],
        )
        .unwrap();
        assert_eq!(Packet::decode(&packet.encode()).unwrap(), packet);
    }

    #[test]
    fn test_unknown_header_values_survive() {
        let packet =
            Packet::new(Direction::Other(0x11), DeviceId::Other(7), 0, 0, &[]).unwrap();
        let decoded = Packet::decode(&packet.encode()).unwrap();
        assert_eq!(decoded.direction(), Direction::Other(0x11));
        assert_eq!(decoded.device(), DeviceId::Other(7));
    }

    #[test]
    fn test_corrupted_crc() {
        let mut raw = sample().encode();
        raw[PACKET_SIZE - 1] ^= 0xFF;
        assert!(matches!(
            Packet::decode(&raw),
            Err(FramingError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_invalid_length_with_good_crc() {
        let mut raw = sample().encode();
        raw[6] = 0xF7; // 247 > 246
        raw[7] = 0x00;
        let crc = crc16(0, &raw[..PACKET_SIZE - 2]);
        raw[PACKET_SIZE - 2..].copy_from_slice(&crc.to_le_bytes());
        assert_eq!(Packet::decode(&raw), Err(FramingError::InvalidLength(247)));
    }

    #[test]
    fn test_payload_too_large() {
        let data = [0u8; PACKET_DATA_SIZE + 1];
        assert_eq!(
            Packet::single(Direction::Read, DeviceId::Keyboard, &data),
            Err(FramingError::InvalidLength(247))
        );
    }

    #[test]
    fn test_split_message() {
        let message: Vec<u8> = (0..300u16).map(|i| i as u8).collect();
        let packets = split_message(Direction::Read, DeviceId::Touchpad, &message).unwrap();
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].offset(), 0);
        assert_eq!(packets[0].remaining(), 54);
        assert_eq!(packets[0].length(), 246);
        assert_eq!(packets[1].offset(), 246);
        assert_eq!(packets[1].remaining(), 0);
        assert_eq!(packets[1].length(), 54);
    }

    #[test]
    fn test_split_short_message_is_single() {
        let packets = split_message(Direction::Write, DeviceId::Keyboard, &[1, 2, 3]).unwrap();
        assert_eq!(packets.len(), 1);
        assert!(packets[0].is_single());
    }

    #[test]
    fn test_split_rejects_three_packets() {
        let message = vec![0u8; 2 * PACKET_DATA_SIZE + 1];
        assert_eq!(
            split_message(Direction::Read, DeviceId::Touchpad, &message),
            Err(FramingError::MessageTooLarge(493))
        );
    }

    proptest! {
        #[test]
        fn test_roundtrip_any_packet(
            flags in any::<u8>(),
            device in any::<u8>(),
            offset in any::<u16>(),
            remaining in any::<u16>(),
            payload in proptest::collection::vec(any::<u8>(), 0..=PACKET_DATA_SIZE),
        ) {
            let packet = Packet::new(
                Direction::from_byte(flags),
                DeviceId::from_byte(device),
                offset,
                remaining,
                &payload,
            ).unwrap();
            prop_assert_eq!(Packet::decode(&packet.encode()).unwrap(), packet);
        }

        #[test]
        fn test_single_bit_flip_is_rejected(
            payload in proptest::collection::vec(any::<u8>(), 0..=PACKET_DATA_SIZE),
            bit in 0usize..PACKET_SIZE * 8,
        ) {
            let packet = Packet::single(Direction::Read, DeviceId::Touchpad, &payload).unwrap();
            let mut raw = packet.encode();
            raw[bit / 8] ^= 1 << (bit % 8);
            prop_assert!(matches!(
                Packet::decode(&raw),
                Err(FramingError::ChecksumMismatch { .. })
            ), "expected ChecksumMismatch");
        }

        #[test]
        fn test_decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), PACKET_SIZE)) {
            let mut raw = [0u8; PACKET_SIZE];
            raw.copy_from_slice(&bytes);
            let _ = Packet::decode(&raw);
        }
    }
}
