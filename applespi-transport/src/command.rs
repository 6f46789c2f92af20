//! Type-safe command builders
//!
//! Three commands exist: the touchpad multitouch init, the caps-lock LED and
//! the keyboard backlight. Each is a single write packet whose message body is
//! a small fixed structure.

use serde::{Deserialize, Serialize};
use std::fmt;
use zerocopy::byteorder::little_endian::U16;
use zerocopy::{Immutable, IntoBytes, KnownLayout};

use crate::debug::DebugMask;
use crate::message::Message;
use crate::packet::{DeviceId, Packet};
use crate::protocol::msg_type;

// =============================================================================
// Backlight scaling
// =============================================================================

/// The backlight stays dark below this level
pub const MIN_BACKLIGHT_LEVEL: u16 = 32;
/// Highest level the controller accepts
pub const MAX_BACKLIGHT_LEVEL: u16 = 255;
const BACKLIGHT_LEVEL_SCALE: u32 = 1_000_000;
const BACKLIGHT_LEVEL_ADJ: u32 =
    (MAX_BACKLIGHT_LEVEL - MIN_BACKLIGHT_LEVEL) as u32 * BACKLIGHT_LEVEL_SCALE / 255;

/// Map a user brightness (0..=255) onto the controller level, so that
/// brightness 1 already lights the keys.
pub fn scale_backlight_level(brightness: u8) -> u16 {
    if brightness == 0 {
        return 0;
    }
    (brightness as u32 * BACKLIGHT_LEVEL_ADJ / BACKLIGHT_LEVEL_SCALE) as u16 + MIN_BACKLIGHT_LEVEL
}

// =============================================================================
// Core Trait
// =============================================================================

/// A command that can be serialized into a write packet
pub trait SpiCommand: Sized {
    /// Message type of the command (echoed by its response)
    const MSG_TYPE: u16;

    /// Device the command packet is addressed to
    const DEVICE: DeviceId;

    /// Serialize the message body
    fn to_body(&self) -> Vec<u8>;

    /// Build the command message
    fn build(&self, counter: u8) -> Message {
        Message::command(Self::MSG_TYPE, counter, self.to_body())
    }

    /// Build the complete write packet
    fn build_packet(&self, counter: u8) -> Packet {
        Packet::command(Self::DEVICE, self.build(counter).encode())
    }
}

// =============================================================================
// Commands
// =============================================================================

#[derive(IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
struct InitBody {
    cmd: U16,
}

/// Switch the touchpad into multitouch reporting
#[derive(Debug, Clone, Copy, Default)]
pub struct InitTouchpad;

impl SpiCommand for InitTouchpad {
    const MSG_TYPE: u16 = msg_type::INIT;
    const DEVICE: DeviceId = DeviceId::Touchpad;

    fn to_body(&self) -> Vec<u8> {
        InitBody {
            cmd: U16::new(0x0102),
        }
        .as_bytes()
        .to_vec()
    }
}

#[derive(IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
struct CapsLockBody {
    unknown: u8,
    led: u8,
}

/// Set the caps-lock LED
#[derive(Debug, Clone, Copy)]
pub struct SetCapsLockLed {
    pub on: bool,
}

impl SpiCommand for SetCapsLockLed {
    const MSG_TYPE: u16 = msg_type::CAPS_LOCK;
    const DEVICE: DeviceId = DeviceId::Keyboard;

    fn to_body(&self) -> Vec<u8> {
        CapsLockBody {
            unknown: 0x01,
            led: if self.on { 2 } else { 0 },
        }
        .as_bytes()
        .to_vec()
    }
}

#[derive(IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
struct BacklightBody {
    const1: U16,
    level: U16,
    const2: U16,
}

/// Set the keyboard backlight to a controller level (already scaled)
#[derive(Debug, Clone, Copy)]
pub struct SetBacklight {
    pub level: u16,
}

impl SpiCommand for SetBacklight {
    const MSG_TYPE: u16 = msg_type::BACKLIGHT;
    const DEVICE: DeviceId = DeviceId::Keyboard;

    fn to_body(&self) -> Vec<u8> {
        BacklightBody {
            const1: U16::new(0x01B0),
            level: U16::new(self.level),
            const2: U16::new(if self.level > 0 { 0x01F4 } else { 0x0001 }),
        }
        .as_bytes()
        .to_vec()
    }
}

// =============================================================================
// Requests and issued commands
// =============================================================================

/// A change of desired device state, as requested by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandRequest {
    /// (Re-)initialize the touchpad
    Init,
    CapsLock(bool),
    /// User brightness 0..=255
    Backlight(u8),
}

/// A command chosen for sending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Command {
    Init,
    CapsLock { on: bool },
    Backlight { level: u16 },
}

impl Command {
    pub fn msg_type(&self) -> u16 {
        match self {
            Self::Init => InitTouchpad::MSG_TYPE,
            Self::CapsLock { .. } => SetCapsLockLed::MSG_TYPE,
            Self::Backlight { .. } => SetBacklight::MSG_TYPE,
        }
    }

    pub fn device(&self) -> DeviceId {
        match self {
            Self::Init => InitTouchpad::DEVICE,
            Self::CapsLock { .. } => SetCapsLockLed::DEVICE,
            Self::Backlight { .. } => SetBacklight::DEVICE,
        }
    }

    /// Debug facility covering this command's traffic
    pub fn debug_facility(&self) -> DebugMask {
        match self {
            Self::Init => DebugMask::TP_INI,
            Self::CapsLock { .. } => DebugMask::CL,
            Self::Backlight { .. } => DebugMask::BL,
        }
    }

    pub fn build(&self, counter: u8) -> Message {
        match *self {
            Self::Init => InitTouchpad.build(counter),
            Self::CapsLock { on } => SetCapsLockLed { on }.build(counter),
            Self::Backlight { level } => SetBacklight { level }.build(counter),
        }
    }

    pub fn build_packet(&self, counter: u8) -> Packet {
        match *self {
            Self::Init => InitTouchpad.build_packet(counter),
            Self::CapsLock { on } => SetCapsLockLed { on }.build_packet(counter),
            Self::Backlight { level } => SetBacklight { level }.build_packet(counter),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => f.write_str("init"),
            Self::CapsLock { on } => write!(f, "caps-lock {}", if *on { "on" } else { "off" }),
            Self::Backlight { level } => write!(f, "backlight {level}"),
        }
    }
}
