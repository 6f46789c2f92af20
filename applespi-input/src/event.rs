//! Input events produced by the trackers

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::keycodes::key;

/// Which logical input device an event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputDevice {
    Keyboard,
    Touchpad,
}

/// One tracked touch contact in screen-oriented device units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub slot: u8,
    pub tracking_id: u32,
    pub x: i32,
    pub y: i32,
    pub touch_major: i32,
    pub touch_minor: i32,
    pub width_major: i32,
    pub width_minor: i32,
    pub orientation: i32,
}

/// Upward event stream; a `Sync` closes each batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputEvent {
    Key { code: u16, pressed: bool },
    Contact(Contact),
    ContactLifted { slot: u8 },
    Button { code: u16, pressed: bool },
    Sync { device: InputDevice },
}

impl InputEvent {
    pub fn key(code: u16, pressed: bool) -> Self {
        Self::Key { code, pressed }
    }

    pub fn sync(device: InputDevice) -> Self {
        Self::Sync { device }
    }

    pub fn is_sync(&self) -> bool {
        matches!(self, Self::Sync { .. })
    }
}

impl fmt::Display for InputEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key { code, pressed } => write!(
                f,
                "key {} {}",
                key::name(*code),
                if *pressed { "down" } else { "up" }
            ),
            Self::Contact(c) => write!(
                f,
                "contact slot={} id={} x={} y={} touch={}x{} width={}x{} orient={}",
                c.slot,
                c.tracking_id,
                c.x,
                c.y,
                c.touch_major,
                c.touch_minor,
                c.width_major,
                c.width_minor,
                c.orientation
            ),
            Self::ContactLifted { slot } => write!(f, "lift slot={slot}"),
            Self::Button { code, pressed } => write!(
                f,
                "button {} {}",
                key::name(*code),
                if *pressed { "down" } else { "up" }
            ),
            Self::Sync { device } => write!(f, "sync {device:?}"),
        }
    }
}
