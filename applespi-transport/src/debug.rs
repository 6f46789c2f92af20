//! Debug facility mask
//!
//! Each bit enables hex dumps (at `debug` level) for one kind of bus traffic.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::packet::{DeviceId, Direction};

/// Bitmask of enabled debug facilities
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DebugMask(pub u32);

impl DebugMask {
    pub const NONE: Self = Self(0);
    /// Touchpad initialization command
    pub const TP_INI: Self = Self(1 << 0);
    /// Backlight command
    pub const BL: Self = Self(1 << 1);
    /// Caps-lock command
    pub const CL: Self = Self(1 << 2);
    /// Keyboard reports
    pub const RD_KEYB: Self = Self(1 << 8);
    /// Touchpad reports
    pub const RD_TPAD: Self = Self(1 << 9);
    /// Reads that are neither keyboard nor touchpad
    pub const RD_UNKN: Self = Self(1 << 10);
    /// Interrupts
    pub const RD_IRQ: Self = Self(1 << 11);
    /// Observed touchpad coordinate range
    pub const TP_DIM: Self = Self(1 << 16);

    pub const ALL: [Self; 8] = [
        Self::TP_INI,
        Self::BL,
        Self::CL,
        Self::RD_KEYB,
        Self::RD_TPAD,
        Self::RD_UNKN,
        Self::RD_IRQ,
        Self::TP_DIM,
    ];

    /// True if any bit of `facility` is enabled
    pub fn contains(self, facility: Self) -> bool {
        self.0 & facility.0 != 0
    }

    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Facility used for a packet read from the bus. Write responses are
    /// attributed to the command that is in flight.
    pub fn for_read(direction: Direction, device: DeviceId, command: Option<Self>) -> Self {
        match (direction, device) {
            (Direction::Read, DeviceId::Keyboard) => Self::RD_KEYB,
            (Direction::Read, DeviceId::Touchpad) => Self::RD_TPAD,
            (Direction::Write, _) => command.unwrap_or(Self::NONE),
            _ => Self::RD_UNKN,
        }
    }

    /// Human-readable name of a single facility bit
    pub fn facility_name(self) -> &'static str {
        match self {
            Self::TP_INI => "Touchpad Initialization",
            Self::BL => "Backlight Command",
            Self::CL => "Caps-Lock Command",
            Self::RD_KEYB => "Keyboard Event",
            Self::RD_TPAD => "Touchpad Event",
            Self::RD_UNKN => "Unknown Event",
            Self::RD_IRQ => "Interrupt Request",
            Self::TP_DIM => "Touchpad Dimensions",
            _ => "-Unknown-",
        }
    }

    /// Log a facility banner if `facility` is enabled
    pub fn banner(self, facility: Self) {
        if self.contains(facility) {
            debug!("--- {} ---------------------------", facility.facility_name());
        }
    }

    /// Hex-dump `bytes` (32 per line) if `facility` is enabled
    pub fn dump(self, facility: Self, label: &str, bytes: &[u8]) {
        if !self.contains(facility) {
            return;
        }
        for line in hex_dump(bytes).lines() {
            debug!("{label:<7}{line}");
        }
    }
}

impl fmt::Display for DebugMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:05X}", self.0)
    }
}

impl FromStr for DebugMask {
    type Err = std::num::ParseIntError;

    /// Accepts decimal or `0x`-prefixed hex
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let value = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u32::from_str_radix(hex, 16)?,
            None => s.parse()?,
        };
        Ok(Self(value))
    }
}

/// Format bytes as a hex dump, 32 bytes per line
pub fn hex_dump(bytes: &[u8]) -> String {
    bytes
        .chunks(32)
        .map(|row| {
            row.iter()
                .map(|b| format!("{b:02x}"))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits() {
        assert_eq!(DebugMask::TP_INI.0, 0x1);
        assert_eq!(DebugMask::RD_IRQ.0, 0x800);
        assert_eq!(DebugMask::TP_DIM.0, 0x10000);
    }

    #[test]
    fn test_contains() {
        let mask = DebugMask::RD_KEYB.union(DebugMask::TP_DIM);
        assert!(mask.contains(DebugMask::RD_KEYB));
        assert!(mask.contains(DebugMask::TP_DIM));
        assert!(!mask.contains(DebugMask::RD_TPAD));
        assert!(!DebugMask::NONE.contains(DebugMask::NONE));
    }

    #[test]
    fn test_facility_names() {
        assert_eq!(DebugMask::CL.facility_name(), "Caps-Lock Command");
        assert_eq!(DebugMask(3).facility_name(), "-Unknown-");
        for facility in DebugMask::ALL {
            assert_ne!(facility.facility_name(), "-Unknown-");
        }
    }

    #[test]
    fn test_for_read() {
        assert_eq!(
            DebugMask::for_read(Direction::Read, DeviceId::Touchpad, None),
            DebugMask::RD_TPAD
        );
        assert_eq!(
            DebugMask::for_read(Direction::Write, DeviceId::Keyboard, Some(DebugMask::BL)),
            DebugMask::BL
        );
        assert_eq!(
            DebugMask::for_read(Direction::Read, DeviceId::Other(9), None),
            DebugMask::RD_UNKN
        );
    }

    #[test]
    fn test_parse() {
        assert_eq!("0x10000".parse::<DebugMask>().unwrap(), DebugMask::TP_DIM);
        assert_eq!("768".parse::<DebugMask>().unwrap(), DebugMask(0x300));
        assert!("zz".parse::<DebugMask>().is_err());
    }

    #[test]
    fn test_hex_dump_rows() {
        let dump = hex_dump(&[0xab; 40]);
        let lines: Vec<_> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("ab ab"));
        assert_eq!(lines[1].split(' ').count(), 8);
    }
}
