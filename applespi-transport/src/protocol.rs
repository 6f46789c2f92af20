//! Protocol constants and utilities for the Apple SPI keyboard/touchpad bus
//!
//! The device and driver exchange messages; each message is carried in one or
//! more fixed-size packets. There are two kinds of exchanges:
//!
//! - **read**: the device raises an interrupt and one packet is read from it
//! - **write**: a command packet is written, a short status is read back
//!   immediately, and the response message arrives later as a read whose
//!   packet flags still say "write"
//!
//! Write exchanges must never interleave.

/// Size of every packet on the bus
pub const PACKET_SIZE: usize = 256;
/// Packet header: flags, device, offset, remaining, length
pub const PACKET_HEADER_SIZE: usize = 8;
/// Payload bytes available in one packet
pub const PACKET_DATA_SIZE: usize = 246;
/// Status bytes read back right after writing a command packet
pub const STATUS_SIZE: usize = 4;
/// Status returned by the device when it accepted a command packet
pub const STATUS_OK: [u8; STATUS_SIZE] = [0xac, 0x27, 0x68, 0xd5];

/// Message header: type, zero, counter, rsp_buf_len, length
pub const MESSAGE_HEADER_SIZE: usize = 8;
/// Trailing message CRC
pub const MESSAGE_CRC_SIZE: usize = 2;
/// A message never spans more than this many packets
pub const MAX_PACKETS_PER_MESSAGE: usize = 2;
/// Upper bound on a reassembled message
pub const MAX_MESSAGE_SIZE: usize = MAX_PACKETS_PER_MESSAGE * PACKET_SIZE;

/// Packet direction flags
pub mod flags {
    /// Device-initiated read
    pub const READ: u8 = 0x20;
    /// Command written to the device; its response carries the same flag
    pub const WRITE: u8 = 0x40;

    /// Get human-readable name for a flags byte
    pub fn name(flags: u8) -> &'static str {
        match flags {
            READ => "READ",
            WRITE => "WRITE",
            _ => "UNKNOWN",
        }
    }
}

/// Device identifiers carried in the packet header
pub mod device {
    pub const KEYBOARD: u8 = 0x01;
    pub const TOUCHPAD: u8 = 0x02;

    /// Get human-readable name for a device byte
    pub fn name(device: u8) -> &'static str {
        match device {
            KEYBOARD => "KEYBOARD",
            TOUCHPAD => "TOUCHPAD",
            _ => "UNKNOWN",
        }
    }
}

/// Message type codes (first header field of every message)
pub mod msg_type {
    /// Keyboard state report (read)
    pub const KEYBOARD: u16 = 0x0110;
    /// Touchpad state report (read)
    pub const TOUCHPAD: u16 = 0x0210;
    /// Switch the touchpad into multitouch mode
    pub const INIT: u16 = 0x0252;
    /// Caps-lock LED
    pub const CAPS_LOCK: u16 = 0x0151;
    /// Keyboard backlight level
    pub const BACKLIGHT: u16 = 0xB051;

    /// Get human-readable name for a message type
    pub fn name(msg_type: u16) -> &'static str {
        match msg_type {
            KEYBOARD => "KEYBOARD",
            TOUCHPAD => "TOUCHPAD",
            INIT => "INIT",
            CAPS_LOCK => "CAPS_LOCK",
            BACKLIGHT => "BACKLIGHT",
            _ => "UNKNOWN",
        }
    }
}

/// Bus timing constants
pub mod timing {
    /// Delay after a write before the status read, and after each read (us)
    pub const RW_CHANGE_DELAY_US: u64 = 100;
    /// Time the interface needs after being switched to SPI mode (ms)
    pub const SPI_ENABLE_DELAY_MS: u64 = 50;
}

// ============================================================================
// CRC-16
// ============================================================================

/// CRC-16/ARC lookup table (polynomial 0x8005, reflected)
const CRC16_TABLE: [u16; 256] = build_crc16_table();

const fn build_crc16_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u16;
        let mut bit = 0;
        while bit < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Compute CRC-16/ARC over `data`, starting from `seed`
///
/// Both packets and messages store this CRC little-endian right after the
/// bytes it covers, so a CRC computed over the covered bytes *and* the stored
/// CRC is zero for intact data.
pub fn crc16(seed: u16, data: &[u8]) -> u16 {
    data.iter().fold(seed, |crc, &byte| {
        (crc >> 8) ^ CRC16_TABLE[((crc ^ byte as u16) & 0xFF) as usize]
    })
}

/// Check a buffer that ends with its own little-endian CRC-16
pub fn crc16_is_valid(data: &[u8]) -> bool {
    crc16(0, data) == 0
}

/// Compute the CRC over everything but the last two bytes and store it there
pub fn apply_crc16(buf: &mut [u8]) {
    if buf.len() < 2 {
        return;
    }
    let split = buf.len() - 2;
    let crc = crc16(0, &buf[..split]);
    buf[split..].copy_from_slice(&crc.to_le_bytes());
}
