//! Keyboard and touchpad report bodies

use serde::Serialize;
use tracing::warn;
use zerocopy::byteorder::little_endian::I16;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::error::ReportError;
use crate::protocol::MESSAGE_CRC_SIZE;

/// Non-modifier keys reported at once
pub const MAX_ROLLOVER: usize = 6;
/// Modifier bits in a keyboard report
pub const MAX_MODIFIERS: usize = 8;
/// Fingers the touchpad can track
pub const MAX_FINGERS: usize = 11;
/// Touchpad report header preceding the finger records
pub const TOUCHPAD_HEADER_SIZE: usize = 48;
/// One finger record, including its trailing CRC slot
pub const FINGER_SIZE: usize = 30;

// ============================================================================
// Keyboard
// ============================================================================

/// Keyboard report (message type 0x0110)
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    IntoBytes,
    FromBytes,
    KnownLayout,
    Immutable,
    Unaligned,
)]
#[repr(C)]
pub struct KeyboardReport {
    pub unknown1: u8,
    /// Bit i set means modifier i is held
    pub modifiers: u8,
    pub unknown2: u8,
    /// HID usage codes, 0 for an empty slot
    pub keys_pressed: [u8; MAX_ROLLOVER],
    pub fn_pressed: u8,
}

impl KeyboardReport {
    pub const SIZE: usize = 10;

    pub fn parse(body: &[u8]) -> Result<Self, ReportError> {
        Self::read_from_bytes(body).map_err(|_| ReportError::InvalidLength {
            report: "keyboard",
            expected: Self::SIZE,
            actual: body.len(),
        })
    }

    /// Report with the given keys, modifiers and fn state
    pub fn with_keys(keys: &[u8], modifiers: u8, fn_pressed: bool) -> Self {
        let mut keys_pressed = [0u8; MAX_ROLLOVER];
        for (slot, &key) in keys_pressed.iter_mut().zip(keys) {
            *slot = key;
        }
        Self {
            modifiers,
            keys_pressed,
            fn_pressed: fn_pressed as u8,
            ..Default::default()
        }
    }

    pub fn to_body(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

// ============================================================================
// Touchpad
// ============================================================================

#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct RawTouchpadHeader {
    unknown1: u8,
    clicked: u8,
    unknown2: [u8; 28],
    number_of_fingers: u8,
    clicked2: u8,
    unknown3: [u8; 16],
}

#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct RawFinger {
    origin: I16,
    abs_x: I16,
    abs_y: I16,
    rel_x: I16,
    rel_y: I16,
    tool_major: I16,
    tool_minor: I16,
    orientation: I16,
    touch_major: I16,
    touch_minor: I16,
    unused: [I16; 2],
    pressure: I16,
    multi: I16,
    crc_16: I16,
}

/// One finger record, raw device units
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Finger {
    pub origin: i16,
    pub abs_x: i16,
    pub abs_y: i16,
    pub rel_x: i16,
    pub rel_y: i16,
    pub tool_major: i16,
    pub tool_minor: i16,
    pub orientation: i16,
    pub touch_major: i16,
    pub touch_minor: i16,
    pub pressure: i16,
    pub multi: i16,
}

impl Finger {
    /// A finger in contact at the given position with typical sizes
    pub fn touching(abs_x: i16, abs_y: i16) -> Self {
        Self {
            abs_x,
            abs_y,
            tool_major: 600,
            tool_minor: 500,
            orientation: 8192,
            touch_major: 500,
            touch_minor: 400,
            pressure: 40,
            ..Default::default()
        }
    }

    /// Fingers hovering or just lifted report zero touch size
    pub fn is_touching(&self) -> bool {
        self.touch_major != 0
    }
}

impl From<&RawFinger> for Finger {
    fn from(raw: &RawFinger) -> Self {
        Self {
            origin: raw.origin.get(),
            abs_x: raw.abs_x.get(),
            abs_y: raw.abs_y.get(),
            rel_x: raw.rel_x.get(),
            rel_y: raw.rel_y.get(),
            tool_major: raw.tool_major.get(),
            tool_minor: raw.tool_minor.get(),
            orientation: raw.orientation.get(),
            touch_major: raw.touch_major.get(),
            touch_minor: raw.touch_minor.get(),
            pressure: raw.pressure.get(),
            multi: raw.multi.get(),
        }
    }
}

impl From<&Finger> for RawFinger {
    fn from(f: &Finger) -> Self {
        Self {
            origin: I16::new(f.origin),
            abs_x: I16::new(f.abs_x),
            abs_y: I16::new(f.abs_y),
            rel_x: I16::new(f.rel_x),
            rel_y: I16::new(f.rel_y),
            tool_major: I16::new(f.tool_major),
            tool_minor: I16::new(f.tool_minor),
            orientation: I16::new(f.orientation),
            touch_major: I16::new(f.touch_major),
            touch_minor: I16::new(f.touch_minor),
            unused: [I16::ZERO; 2],
            pressure: I16::new(f.pressure),
            multi: I16::new(f.multi),
            crc_16: I16::ZERO,
        }
    }
}

/// Touchpad report (message type 0x0210)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TouchpadReport {
    /// Physical button state
    pub clicked: bool,
    /// At most [`MAX_FINGERS`] records
    pub fingers: Vec<Finger>,
    /// Finger count as sent by the device, before clamping
    pub reported_fingers: u8,
}

impl TouchpadReport {
    pub fn new(clicked: bool, fingers: Vec<Finger>) -> Self {
        let reported_fingers = fingers.len() as u8;
        Self {
            clicked,
            fingers,
            reported_fingers,
        }
    }

    /// True if the device reported more fingers than can be tracked
    pub fn is_clamped(&self) -> bool {
        self.reported_fingers as usize > MAX_FINGERS
    }

    /// Parse a touchpad message body
    ///
    /// The last finger's CRC slot is the message CRC, so the body is two
    /// bytes shorter than header plus finger records.
    pub fn parse(body: &[u8]) -> Result<Self, ReportError> {
        let short = TOUCHPAD_HEADER_SIZE - MESSAGE_CRC_SIZE;
        if body.len() < short {
            return Err(ReportError::InvalidLength {
                report: "touchpad",
                expected: short,
                actual: body.len(),
            });
        }

        let mut buf = body.to_vec();
        buf.extend_from_slice(&[0; MESSAGE_CRC_SIZE]);

        let (header, records) = RawTouchpadHeader::ref_from_prefix(&buf).map_err(|_| {
            ReportError::InvalidLength {
                report: "touchpad",
                expected: short,
                actual: body.len(),
            }
        })?;

        let reported = header.number_of_fingers;
        let expected = TOUCHPAD_HEADER_SIZE + reported as usize * FINGER_SIZE;
        if buf.len() != expected {
            return Err(ReportError::InvalidLength {
                report: "touchpad",
                expected: expected - MESSAGE_CRC_SIZE,
                actual: body.len(),
            });
        }

        if reported as usize > MAX_FINGERS {
            warn!(
                "Number of reported fingers ({}) exceeds max ({})",
                reported, MAX_FINGERS
            );
        }

        let fingers = records
            .chunks_exact(FINGER_SIZE)
            .take(MAX_FINGERS)
            .filter_map(|chunk| RawFinger::ref_from_bytes(chunk).ok())
            .map(Finger::from)
            .collect();

        Ok(Self {
            clicked: header.clicked != 0,
            fingers,
            reported_fingers: reported,
        })
    }

    /// Encode into a message body (without the message CRC)
    pub fn to_body(&self) -> Vec<u8> {
        let header = RawTouchpadHeader {
            unknown1: 0,
            clicked: self.clicked as u8,
            unknown2: [0; 28],
            number_of_fingers: self.fingers.len() as u8,
            clicked2: self.clicked as u8,
            unknown3: [0; 16],
        };
        let mut out = header.as_bytes().to_vec();
        for finger in &self.fingers {
            out.extend_from_slice(RawFinger::from(finger).as_bytes());
        }
        out.truncate(out.len() - MESSAGE_CRC_SIZE);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_sizes() {
        assert_eq!(std::mem::size_of::<KeyboardReport>(), KeyboardReport::SIZE);
        assert_eq!(std::mem::size_of::<RawTouchpadHeader>(), TOUCHPAD_HEADER_SIZE);
        assert_eq!(std::mem::size_of::<RawFinger>(), FINGER_SIZE);
    }

    #[test]
    fn test_keyboard_parse() {
        let body = [0x00, 0x02, 0x00, 0x04, 0x05, 0, 0, 0, 0, 0x01];
        let report = KeyboardReport::parse(&body).unwrap();
        assert_eq!(report.modifiers, 0x02);
        assert_eq!(report.keys_pressed, [0x04, 0x05, 0, 0, 0, 0]);
        assert_eq!(report.fn_pressed, 1);
        assert_eq!(report.to_body(), body.to_vec());
    }

    #[test]
    fn test_keyboard_wrong_size() {
        assert_eq!(
            KeyboardReport::parse(&[0; 9]),
            Err(ReportError::InvalidLength {
                report: "keyboard",
                expected: 10,
                actual: 9
            })
        );
    }

    #[test]
    fn test_touchpad_no_fingers() {
        let report = TouchpadReport::new(true, vec![]);
        let body = report.to_body();
        assert_eq!(body.len(), 46);
        let parsed = TouchpadReport::parse(&body).unwrap();
        assert!(parsed.clicked);
        assert!(parsed.fingers.is_empty());
    }

    #[test]
    fn test_touchpad_two_fingers() {
        let report = TouchpadReport::new(
            false,
            vec![Finger::touching(100, -200), Finger::touching(-3000, 4000)],
        );
        let body = report.to_body();
        assert_eq!(body.len() + 2, TOUCHPAD_HEADER_SIZE + 2 * FINGER_SIZE);
        assert_eq!(TouchpadReport::parse(&body).unwrap(), report);
    }

    #[test]
    fn test_touchpad_count_mismatch() {
        let mut body = TouchpadReport::new(false, vec![Finger::touching(1, 1)]).to_body();
        body[30] = 2; // number_of_fingers
        assert!(matches!(
            TouchpadReport::parse(&body),
            Err(ReportError::InvalidLength { report: "touchpad", .. })
        ));
    }

    #[test]
    fn test_touchpad_too_many_fingers_clamped() {
        let fingers: Vec<_> = (0..13).map(|i| Finger::touching(i * 10, i * 10)).collect();
        let body = TouchpadReport::new(false, fingers).to_body();
        let parsed = TouchpadReport::parse(&body).unwrap();
        assert_eq!(parsed.reported_fingers, 13);
        assert_eq!(parsed.fingers.len(), MAX_FINGERS);
        assert!(parsed.is_clamped());
    }

    #[test]
    fn test_touchpad_truncated() {
        assert!(TouchpadReport::parse(&[0; 10]).is_err());
    }
}
