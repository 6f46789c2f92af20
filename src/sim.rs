//! Simulated keyboard/touchpad controller
//!
//! Stands in for the hardware behind [`SpiBus`]: reports pushed by a test or
//! the `simulate` command are queued as packets and announced with an
//! interrupt; command writes are recorded, applied to a small device model
//! and answered the way the real controller answers them.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, trace};

use applespi_transport::protocol::{flags, msg_type, timing};
use applespi_transport::{
    split_message, DeviceId, Direction, KeyboardReport, Message, Packet, SpiBus, TouchpadReport,
    TransportError, PACKET_SIZE, STATUS_OK, STATUS_SIZE,
};

use crate::driver::DriverHandle;

/// A fault to inject into the next write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteFault {
    /// Return a status other than `AC 27 68 D5`
    BadStatus,
    /// Fail the transfer
    BusError,
    /// Accept the write but never respond
    NoResponse,
}

/// What the simulated device has applied so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeviceModel {
    pub initialized: bool,
    pub caps_lock: bool,
    pub backlight: u16,
    pub enable_count: u32,
}

#[derive(Default)]
struct SimState {
    rx_queue: VecDeque<[u8; PACKET_SIZE]>,
    written: Vec<[u8; PACKET_SIZE]>,
    model: DeviceModel,
    fault: Option<WriteFault>,
    handle: Option<DriverHandle>,
    disconnected: bool,
}

/// In-memory device implementing [`SpiBus`]
#[derive(Default)]
pub struct SimulatedDevice {
    state: Mutex<SimState>,
}

impl SimulatedDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver interrupts to this driver from now on
    ///
    /// Packets queued before attaching are announced right away.
    pub fn attach(&self, handle: DriverHandle) {
        let queued = {
            let mut state = self.state.lock();
            state.handle = Some(handle.clone());
            state.rx_queue.len()
        };
        for _ in 0..queued {
            let _ = handle.interrupt();
        }
    }

    /// Queue a raw packet and raise an interrupt for it
    pub fn push_raw(&self, buf: [u8; PACKET_SIZE]) {
        let handle = {
            let mut state = self.state.lock();
            state.rx_queue.push_back(buf);
            state.handle.clone()
        };
        if let Some(handle) = handle {
            let _ = handle.interrupt();
        }
    }

    /// Queue an encoded message, split across as many packets as needed
    pub fn push_message(
        &self,
        device: DeviceId,
        message: &Message,
    ) -> Result<(), TransportError> {
        for packet in split_message(Direction::Read, device, &message.encode())? {
            self.push_raw(packet.encode());
        }
        Ok(())
    }

    pub fn push_keyboard(&self, report: &KeyboardReport) -> Result<(), TransportError> {
        let message = Message::new(msg_type::KEYBOARD, 0, 0, report.to_body());
        self.push_message(DeviceId::Keyboard, &message)
    }

    pub fn push_touchpad(&self, report: &TouchpadReport) -> Result<(), TransportError> {
        let message = Message::new(msg_type::TOUCHPAD, 0, 0, report.to_body());
        self.push_message(DeviceId::Touchpad, &message)
    }

    /// Press and release each character of `text`
    ///
    /// Characters without a key on the keyboard are skipped.
    pub fn type_text(&self, text: &str) -> Result<(), TransportError> {
        for c in text.chars() {
            let Some((usage, shift)) = hid_usage_for_char(c) else {
                debug!("No key for {:?}", c);
                continue;
            };
            let modifiers = if shift { LEFT_SHIFT_BIT } else { 0 };
            self.push_keyboard(&KeyboardReport::with_keys(&[usage], modifiers, false))?;
            self.push_keyboard(&KeyboardReport::default())?;
        }
        Ok(())
    }

    /// Make the next write fail in the given way
    pub fn fail_next_write(&self, fault: WriteFault) {
        self.state.lock().fault = Some(fault);
    }

    pub fn model(&self) -> DeviceModel {
        self.state.lock().model
    }

    /// Every packet written so far, oldest first
    pub fn written(&self) -> Vec<[u8; PACKET_SIZE]> {
        self.state.lock().written.clone()
    }

    /// Message types of every command written so far
    pub fn written_types(&self) -> Vec<u16> {
        self.state
            .lock()
            .written
            .iter()
            .filter_map(|buf| Packet::decode(buf).ok())
            .filter_map(|p| Message::parse(p.data()).ok())
            .map(|m| m.msg_type)
            .collect()
    }

    /// Packets queued but not yet read
    pub fn pending(&self) -> usize {
        self.state.lock().rx_queue.len()
    }

    /// Deliver the response to the last write
    ///
    /// Completes an exchange whose response was held back by
    /// [`WriteFault::NoResponse`].
    pub fn respond_to_last_write(&self) {
        let handle = {
            let mut state = self.state.lock();
            let Some(buf) = state.written.last().copied() else {
                return;
            };
            let Some(rsp) = Packet::decode(&buf)
                .ok()
                .and_then(|packet| apply_command(&mut state.model, &packet))
            else {
                return;
            };
            state.rx_queue.push_back(rsp);
            state.handle.clone()
        };
        if let Some(handle) = handle {
            let _ = handle.interrupt();
        }
    }

    /// Unplug the device; every later transfer fails
    pub fn disconnect(&self) {
        let mut state = self.state.lock();
        state.disconnected = true;
        state.rx_queue.clear();
    }
}

/// Modifier bit of the left shift key
const LEFT_SHIFT_BIT: u8 = 1 << 1;

/// HID usage code for a character, and whether shift is needed
pub fn hid_usage_for_char(c: char) -> Option<(u8, bool)> {
    let usage = match c.to_ascii_lowercase() {
        l @ 'a'..='z' => 0x04 + (l as u8 - b'a'),
        '1'..='9' => 0x1e + (c as u8 - b'1'),
        '0' => 0x27,
        '\n' => 0x28,
        '\t' => 0x2b,
        ' ' => 0x2c,
        '-' => 0x2d,
        '=' => 0x2e,
        ',' => 0x36,
        '.' => 0x37,
        '/' => 0x38,
        _ => return None,
    };
    Some((usage, c.is_ascii_uppercase()))
}

/// Apply a command to the model and build the response the device sends
fn apply_command(model: &mut DeviceModel, packet: &Packet) -> Option<[u8; PACKET_SIZE]> {
    let message = Message::parse(packet.data()).ok()?;
    match (packet.device(), message.msg_type) {
        (DeviceId::Touchpad, msg_type::INIT) => model.initialized = true,
        (DeviceId::Keyboard, msg_type::CAPS_LOCK) => {
            model.caps_lock = message.body.get(1).is_some_and(|&led| led != 0)
        }
        (DeviceId::Keyboard, msg_type::BACKLIGHT) => {
            if let Some(level) = message.body.get(2..4) {
                model.backlight = u16::from_le_bytes([level[0], level[1]]);
            }
        }
        (device, t) => debug!("Simulated device ignoring {} command 0x{:04X}", device, t),
    }

    let response = Message::new(
        message.msg_type,
        message.counter,
        message.rsp_buf_len,
        Vec::new(),
    );
    Packet::single(Direction::Write, packet.device(), &response.encode())
        .ok()
        .map(|p| p.encode())
}

#[async_trait]
impl SpiBus for SimulatedDevice {
    async fn read_packet(&self) -> Result<[u8; PACKET_SIZE], TransportError> {
        let mut state = self.state.lock();
        if state.disconnected {
            return Err(TransportError::Disconnected);
        }
        state
            .rx_queue
            .pop_front()
            .ok_or_else(|| TransportError::Internal("no packet pending".into()))
    }

    async fn write_packet(
        &self,
        buf: &[u8; PACKET_SIZE],
    ) -> Result<[u8; STATUS_SIZE], TransportError> {
        let (status, handle) = {
            let mut state = self.state.lock();
            if state.disconnected {
                return Err(TransportError::Disconnected);
            }
            state.written.push(*buf);
            let fault = state.fault.take();

            match fault {
                Some(WriteFault::BusError) => return Err(TransportError::Bus(-5)),
                Some(WriteFault::BadStatus) => return Ok([0xde, 0xad, 0xbe, 0xef]),
                Some(WriteFault::NoResponse) => return Ok(STATUS_OK),
                None => {}
            }

            if buf[0] != flags::WRITE {
                return Ok([0; STATUS_SIZE]);
            }
            let packet = Packet::decode(buf)?;
            let response = apply_command(&mut state.model, &packet);
            trace!("Simulated device applied {}", packet);

            match response {
                Some(rsp) => {
                    state.rx_queue.push_back(rsp);
                    (STATUS_OK, state.handle.clone())
                }
                None => ([0; STATUS_SIZE], None),
            }
        };

        // Status read follows the write after the turnaround delay
        tokio::time::sleep(Duration::from_micros(timing::RW_CHANGE_DELAY_US)).await;
        if let Some(handle) = handle {
            let _ = handle.interrupt();
        }
        Ok(status)
    }

    async fn enable(&self) -> Result<(), TransportError> {
        let disconnected = self.state.lock().disconnected;
        if disconnected {
            return Err(TransportError::Disconnected);
        }
        tokio::time::sleep(Duration::from_millis(timing::SPI_ENABLE_DELAY_MS)).await;

        let mut state = self.state.lock();
        state.model.enable_count += 1;
        // The controller forgets everything across a power cycle
        state.model.initialized = false;
        state.model.caps_lock = false;
        state.model.backlight = 0;
        Ok(())
    }
}
