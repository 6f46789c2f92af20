//! Message dispatch
//!
//! Routes each verified message by (packet direction, packet device, message
//! type) to the keyboard tracker, the touchpad tracker or the command
//! completion path.

use serde::Serialize;
use tracing::{debug, info, warn};

use applespi_input::{InputEvent, KeyboardTracker, TouchpadTracker};
use applespi_transport::protocol::msg_type;
use applespi_transport::{
    DeviceId, Direction, KeyboardReport, Message, ReportError, TouchpadReport,
};

/// Header fields of the packet a message arrived in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PacketMeta {
    pub direction: Direction,
    pub device: DeviceId,
}

/// Why a message produced nothing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// No route for this (direction, device, type)
    Unknown {
        direction: Direction,
        device: DeviceId,
        msg_type: u16,
    },
    /// Report body did not match its layout
    Malformed(ReportError),
    /// Write responses are expected to carry no body
    UnexpectedResponseLength(u16),
}

/// Outcome of dispatching one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Input events, plus whether the report had to be clamped
    Input {
        events: Vec<InputEvent>,
        clamped: bool,
    },
    /// Response to a command write
    CommandResponse { msg_type: u16, modeswitch_done: bool },
    Dropped(DropReason),
}

/// Owns the trackers and feeds them
#[derive(Debug)]
pub struct Dispatcher {
    keyboard: KeyboardTracker,
    touchpad: TouchpadTracker,
}

impl Dispatcher {
    pub fn new(keyboard: KeyboardTracker, touchpad: TouchpadTracker) -> Self {
        Self { keyboard, touchpad }
    }

    pub fn keyboard(&self) -> &KeyboardTracker {
        &self.keyboard
    }

    pub fn touchpad(&self) -> &TouchpadTracker {
        &self.touchpad
    }

    pub fn dispatch(&mut self, msg: &Message, meta: PacketMeta) -> Dispatch {
        match (meta.direction, meta.device, msg.msg_type) {
            (Direction::Read, DeviceId::Keyboard, msg_type::KEYBOARD) => {
                match KeyboardReport::parse(&msg.body) {
                    Ok(report) => Dispatch::Input {
                        events: self.keyboard.update(&report),
                        clamped: false,
                    },
                    Err(e) => malformed(e),
                }
            }
            (Direction::Read, DeviceId::Touchpad, msg_type::TOUCHPAD) => {
                match TouchpadReport::parse(&msg.body) {
                    Ok(report) => Dispatch::Input {
                        events: self.touchpad.update(&report),
                        clamped: report.is_clamped(),
                    },
                    Err(e) => malformed(e),
                }
            }
            (Direction::Write, device, ty) => command_response(msg, device, ty),
            (direction, device, ty) => {
                debug!(
                    "Dropping unknown message: {} {} type 0x{:04X}",
                    direction, device, ty
                );
                Dispatch::Dropped(DropReason::Unknown {
                    direction,
                    device,
                    msg_type: ty,
                })
            }
        }
    }

    /// Release all keys and contacts
    pub fn release_all(&mut self) -> Vec<InputEvent> {
        let mut events = self.keyboard.release_all();
        events.extend(self.touchpad.release_all());
        events
    }
}

fn malformed(e: ReportError) -> Dispatch {
    warn!("Received corrupted packet ({})", e);
    Dispatch::Dropped(DropReason::Malformed(e))
}

fn command_response(msg: &Message, device: DeviceId, ty: u16) -> Dispatch {
    let length = msg.declared_length();
    if length != 0 {
        warn!("Received unexpected write response: length={:x}", length);
        return Dispatch::Dropped(DropReason::UnexpectedResponseLength(length));
    }

    let modeswitch_done =
        device == DeviceId::Touchpad && ty == msg_type::INIT && msg.rsp_buf_len == 2;
    if modeswitch_done {
        info!("modeswitch done.");
    }
    Dispatch::CommandResponse {
        msg_type: ty,
        modeswitch_done,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use applespi_input::keycodes::key;
    use applespi_input::{InputDevice, TouchpadInfo};
    use applespi_transport::report::{Finger, MAX_FINGERS};
    use applespi_transport::DebugMask;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(
            KeyboardTracker::default(),
            TouchpadTracker::new(TouchpadInfo::GENERIC, DebugMask::NONE),
        )
    }

    const READ_KEYB: PacketMeta = PacketMeta {
        direction: Direction::Read,
        device: DeviceId::Keyboard,
    };
    const READ_TPAD: PacketMeta = PacketMeta {
        direction: Direction::Read,
        device: DeviceId::Touchpad,
    };

    #[test]
    fn test_keyboard_route() {
        let mut d = dispatcher();
        let body = KeyboardReport::with_keys(&[0x04], 0, false).to_body();
        let msg = Message::new(msg_type::KEYBOARD, 0, 0, body);
        match d.dispatch(&msg, READ_KEYB) {
            Dispatch::Input { events, clamped } => {
                assert!(!clamped);
                assert_eq!(events[0], InputEvent::key(key::A, true));
                assert_eq!(events.last(), Some(&InputEvent::sync(InputDevice::Keyboard)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_touchpad_route_clamped() {
        let mut d = dispatcher();
        let fingers: Vec<_> = (0..12).map(|i| Finger::touching(i * 100, 0)).collect();
        let body = TouchpadReport::new(false, fingers).to_body();
        let msg = Message::new(msg_type::TOUCHPAD, 0, 0, body);
        match d.dispatch(&msg, READ_TPAD) {
            Dispatch::Input { events, clamped } => {
                assert!(clamped);
                let contacts = events
                    .iter()
                    .filter(|e| matches!(e, InputEvent::Contact(_)))
                    .count();
                assert_eq!(contacts, MAX_FINGERS);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_type_mismatch_is_unknown() {
        let mut d = dispatcher();
        let msg = Message::new(msg_type::TOUCHPAD, 0, 0, vec![0; 46]);
        assert!(matches!(
            d.dispatch(&msg, READ_KEYB),
            Dispatch::Dropped(DropReason::Unknown { .. })
        ));
    }

    #[test]
    fn test_unknown_device() {
        let mut d = dispatcher();
        let msg = Message::new(0x0999, 0, 0, vec![]);
        let meta = PacketMeta {
            direction: Direction::Read,
            device: DeviceId::Other(5),
        };
        assert_eq!(
            d.dispatch(&msg, meta),
            Dispatch::Dropped(DropReason::Unknown {
                direction: Direction::Read,
                device: DeviceId::Other(5),
                msg_type: 0x0999
            })
        );
    }

    #[test]
    fn test_malformed_keyboard_report() {
        let mut d = dispatcher();
        let msg = Message::new(msg_type::KEYBOARD, 0, 0, vec![0; 4]);
        assert!(matches!(
            d.dispatch(&msg, READ_KEYB),
            Dispatch::Dropped(DropReason::Malformed(_))
        ));
    }

    #[test]
    fn test_init_response_modeswitch() {
        let mut d = dispatcher();
        let msg = Message::new(msg_type::INIT, 0, 2, vec![]);
        let meta = PacketMeta {
            direction: Direction::Write,
            device: DeviceId::Touchpad,
        };
        assert_eq!(
            d.dispatch(&msg, meta),
            Dispatch::CommandResponse {
                msg_type: msg_type::INIT,
                modeswitch_done: true
            }
        );
    }

    #[test]
    fn test_response_with_body() {
        let mut d = dispatcher();
        let msg = Message::new(msg_type::CAPS_LOCK, 0, 2, vec![1, 2]);
        let meta = PacketMeta {
            direction: Direction::Write,
            device: DeviceId::Keyboard,
        };
        assert_eq!(
            d.dispatch(&msg, meta),
            Dispatch::Dropped(DropReason::UnexpectedResponseLength(2))
        );
    }
}
