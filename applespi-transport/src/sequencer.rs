//! Command write sequencer
//!
//! Requests only change the *desired* device state. Whenever the bus is free
//! [`CommandSequencer::pump`] picks the most important difference between
//! desired and applied state and turns it into exactly one write packet. At
//! most one write exchange is outstanding at any time.

use serde::Serialize;
use tracing::{debug, warn};

use crate::command::{scale_backlight_level, Command, CommandRequest};
use crate::packet::Packet;
use crate::protocol::PACKET_SIZE;

/// A write packet ready to go out on the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundWrite {
    pub command: Command,
    pub counter: u8,
    pub packet: Packet,
}

impl OutboundWrite {
    pub fn encode(&self) -> [u8; PACKET_SIZE] {
        self.packet.encode()
    }
}

/// How a write exchange ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WriteOutcome {
    /// The device sent its response message
    Responded,
    /// Bus error or bad status; no response will follow
    Failed,
}

/// Desired vs. applied command state plus the in-flight marker
#[derive(Debug, Default)]
pub struct CommandSequencer {
    want_init: bool,
    want_caps_lock: bool,
    have_caps_lock: bool,
    want_backlight: u16,
    have_backlight: u16,
    counter: u8,
    in_flight: Option<Command>,
    draining: bool,
}

impl CommandSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new desired state; never blocks and never sends
    pub fn request(&mut self, request: CommandRequest) {
        match request {
            CommandRequest::Init => self.want_init = true,
            CommandRequest::CapsLock(on) => self.want_caps_lock = on,
            CommandRequest::Backlight(brightness) => {
                self.want_backlight = scale_backlight_level(brightness)
            }
        }
    }

    /// Next write to send, if the bus is free and something changed
    ///
    /// Precedence is init, then caps-lock, then backlight. Applied state is
    /// updated here, at send time.
    pub fn pump(&mut self) -> Option<OutboundWrite> {
        if self.draining || self.in_flight.is_some() {
            return None;
        }

        let command = if self.want_init {
            self.want_init = false;
            Command::Init
        } else if self.want_caps_lock != self.have_caps_lock {
            self.have_caps_lock = self.want_caps_lock;
            Command::CapsLock {
                on: self.have_caps_lock,
            }
        } else if self.want_backlight != self.have_backlight {
            self.have_backlight = self.want_backlight;
            Command::Backlight {
                level: self.have_backlight,
            }
        } else {
            return None;
        };

        let counter = self.counter;
        self.counter = self.counter.wrapping_add(1);
        self.in_flight = Some(command);
        debug!("Sending {} command (counter {})", command, counter);

        Some(OutboundWrite {
            command,
            counter,
            packet: command.build_packet(counter),
        })
    }

    /// Finish the outstanding write exchange; returns the command it carried
    pub fn complete(&mut self, outcome: WriteOutcome) -> Option<Command> {
        let command = self.in_flight.take();
        match (command, outcome) {
            (None, _) => debug!("Write completion with no write in flight"),
            (Some(cmd), WriteOutcome::Failed) => warn!("{} command failed", cmd),
            (Some(cmd), WriteOutcome::Responded) => debug!("{} command done", cmd),
        }
        command
    }

    pub fn in_flight(&self) -> Option<Command> {
        self.in_flight
    }

    pub fn is_write_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// True when nothing would be sent by [`pump`](Self::pump) on a free bus
    pub fn is_up_to_date(&self) -> bool {
        !self.want_init
            && self.want_caps_lock == self.have_caps_lock
            && self.want_backlight == self.have_backlight
    }

    pub fn set_draining(&mut self, draining: bool) {
        self.draining = draining;
    }

    pub fn is_draining(&self) -> bool {
        self.draining
    }

    /// Forget what the device has applied, as after a power cycle
    ///
    /// The device comes back with the LED off and the backlight dark, and the
    /// touchpad needs its init again.
    pub fn reset_applied(&mut self) {
        self.have_caps_lock = false;
        self.have_backlight = 0;
        self.in_flight = None;
        self.want_init = true;
    }
}
