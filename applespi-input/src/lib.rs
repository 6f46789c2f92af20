//! Keyboard and touchpad state tracking for the Apple SPI keyboard/touchpad
//!
//! Turns decoded reports into Linux-style input events: key presses and
//! releases with fn-key remapping, and multitouch contacts bound to
//! persistent slots.

pub mod event;
pub mod keyboard;
pub mod keycodes;
pub mod touchpad;

pub use event::{Contact, InputDevice, InputEvent};
pub use keyboard::{FnMode, KeyboardSettings, KeyboardTracker};
pub use touchpad::{AxisInfo, TouchpadInfo, TouchpadTracker};
