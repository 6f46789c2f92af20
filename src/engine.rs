//! Transport engine state machine
//!
//! The engine owns every piece of protocol state: the reassembly buffer, the
//! command sequencer, both input trackers and the read/write/drain status. It
//! performs no I/O. Each input (interrupt, finished read, finished write,
//! command request, drain, resume) returns a [`Step`] with the input events
//! produced and at most one bus operation for the caller to start.
//!
//! Exactly one owner drives an engine, so no locking is needed.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

use applespi_input::{InputEvent, KeyboardSettings, KeyboardTracker, TouchpadInfo, TouchpadTracker};
use applespi_transport::{
    Assembly, CommandRequest, CommandSequencer, DebugMask, Direction, FramingError, Packet,
    ProtocolError, Reassembler, TransportError, WriteOutcome, PACKET_SIZE, STATUS_OK, STATUS_SIZE,
};
use applespi_transport::protocol::flags;

use crate::dispatch::{Dispatch, Dispatcher, DropReason, PacketMeta};

// =============================================================================
// Configuration and step types
// =============================================================================

/// Settings fixed for the lifetime of an engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub keyboard: KeyboardSettings,
    pub touchpad: TouchpadInfo,
    pub debug: DebugMask,
}

/// A bus transfer the caller must start
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusOp {
    /// Read one packet
    Read,
    /// Write one packet and report the status bytes
    Write([u8; PACKET_SIZE]),
}

/// Result of feeding one input to the engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Step {
    pub events: Vec<InputEvent>,
    pub next: Option<BusOp>,
}

impl Step {
    pub fn idle() -> Self {
        Self::default()
    }
}

/// Which bus exchanges are outstanding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LinkState {
    Idle,
    ReadInFlight,
    WriteInFlight,
    WriteAndReadInFlight,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::ReadInFlight => "read in flight",
            Self::WriteInFlight => "write in flight",
            Self::WriteAndReadInFlight => "write and read in flight",
        };
        f.write_str(name)
    }
}

/// Power mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PowerState {
    Active,
    /// Suspend requested; no new writes, waiting for outstanding ones
    Draining,
    /// Quiesced; interrupts are ignored until resume
    Suspended,
}

/// Diagnostic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub packets_read: u64,
    pub packets_written: u64,
    pub framing_errors: u64,
    pub integrity_errors: u64,
    pub report_errors: u64,
    pub unknown_messages: u64,
    pub finger_overflows: u64,
    pub write_failures: u64,
    pub bus_errors: u64,
    pub interrupts_ignored: u64,
    pub commands_completed: u64,
}

// =============================================================================
// Engine
// =============================================================================

/// The sans-IO transport engine
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    reassembler: Reassembler,
    sequencer: CommandSequencer,
    dispatcher: Dispatcher,
    read_active: bool,
    pending_interrupts: u32,
    power: PowerState,
    stats: EngineStats,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let mut sequencer = CommandSequencer::new();
        sequencer.request(CommandRequest::Init);

        Self {
            config,
            reassembler: Reassembler::new(),
            sequencer,
            dispatcher: Dispatcher::new(
                KeyboardTracker::new(config.keyboard),
                TouchpadTracker::new(config.touchpad, config.debug),
            ),
            read_active: false,
            pending_interrupts: 0,
            power: PowerState::Active,
            stats: EngineStats::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn power_state(&self) -> PowerState {
        self.power
    }

    pub fn link_state(&self) -> LinkState {
        match (self.sequencer.is_write_in_flight(), self.read_active) {
            (false, false) => LinkState::Idle,
            (false, true) => LinkState::ReadInFlight,
            (true, false) => LinkState::WriteInFlight,
            (true, true) => LinkState::WriteAndReadInFlight,
        }
    }

    /// Kick off the initial touchpad init
    pub fn start(&mut self) -> Step {
        info!("Starting transport engine");
        Step {
            events: Vec::new(),
            next: self.next_op(),
        }
    }

    /// The device signalled that it has a packet for us
    pub fn interrupt(&mut self) -> Step {
        let ignore = match self.power {
            PowerState::Suspended => true,
            PowerState::Draining => !self.sequencer.is_write_in_flight() && !self.read_active,
            PowerState::Active => false,
        };
        if ignore {
            debug!("Ignoring interrupt while {:?}", self.power);
            self.stats.interrupts_ignored += 1;
            return Step::idle();
        }

        if self.read_active {
            self.pending_interrupts += 1;
            return Step::idle();
        }

        self.config.debug.banner(DebugMask::RD_IRQ);
        self.read_active = true;
        Step {
            events: Vec::new(),
            next: Some(BusOp::Read),
        }
    }

    /// A read started by [`BusOp::Read`] finished
    pub fn read_complete(&mut self, result: Result<[u8; PACKET_SIZE], TransportError>) -> Step {
        self.read_active = false;

        let events = match result {
            Ok(buf) => self.handle_packet(&buf),
            Err(e) => {
                warn!("Error reading from device: {}", e);
                self.stats.bus_errors += 1;
                Vec::new()
            }
        };

        Step {
            events,
            next: self.next_op(),
        }
    }

    /// A write started by [`BusOp::Write`] finished with `result` status
    ///
    /// A good status keeps the write in flight until the response message
    /// arrives; anything else fails the exchange.
    pub fn write_complete(&mut self, result: Result<[u8; STATUS_SIZE], TransportError>) -> Step {
        match result {
            Ok(status) if status == STATUS_OK => {
                debug!("Write accepted, waiting for response");
            }
            Ok(status) => {
                warn!("{}", TransportError::BadStatus(status));
                self.fail_write();
            }
            Err(e) => {
                warn!("Error writing to device: {}", e);
                self.stats.bus_errors += 1;
                self.fail_write();
            }
        }

        Step {
            events: Vec::new(),
            next: self.next_op(),
        }
    }

    /// Change the desired command state
    pub fn request(&mut self, request: CommandRequest) -> Step {
        self.sequencer.request(request);
        Step {
            events: Vec::new(),
            next: self.next_op(),
        }
    }

    /// Stop issuing writes and wait for outstanding exchanges
    pub fn begin_drain(&mut self) {
        if self.power == PowerState::Active {
            info!("Draining for suspend ({})", self.link_state());
            self.power = PowerState::Draining;
            self.sequencer.set_draining(true);
        }
    }

    /// True once draining (or suspended) with nothing outstanding
    pub fn is_quiesced(&self) -> bool {
        self.power != PowerState::Active && self.link_state() == LinkState::Idle
    }

    /// Move from draining to suspended if quiesced
    pub fn finish_drain(&mut self) -> bool {
        if self.power == PowerState::Draining && self.is_quiesced() {
            info!("Suspended");
            self.pending_interrupts = 0;
            self.power = PowerState::Suspended;
        }
        self.power == PowerState::Suspended
    }

    /// Bring the engine back after a power cycle
    ///
    /// Whatever the device had applied is lost, so caps-lock and backlight
    /// are re-sent after a fresh init. Keys and contacts held before the
    /// suspend are released.
    pub fn resume(&mut self) -> Step {
        info!("Resuming");
        self.power = PowerState::Active;
        self.read_active = false;
        self.pending_interrupts = 0;
        self.reassembler.reset();
        self.sequencer.set_draining(false);
        self.sequencer.reset_applied();

        Step {
            events: self.dispatcher.release_all(),
            next: self.next_op(),
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn next_op(&mut self) -> Option<BusOp> {
        if !self.read_active && self.pending_interrupts > 0 {
            self.pending_interrupts -= 1;
            if self.power != PowerState::Suspended {
                self.config.debug.banner(DebugMask::RD_IRQ);
                self.read_active = true;
                return Some(BusOp::Read);
            }
        }

        let write = self.sequencer.pump()?;
        let buf = write.encode();
        self.stats.packets_written += 1;
        self.config
            .debug
            .dump(write.command.debug_facility(), "write", &buf);
        Some(BusOp::Write(buf))
    }

    fn fail_write(&mut self) {
        self.stats.write_failures += 1;
        self.sequencer.complete(WriteOutcome::Failed);
    }

    fn handle_packet(&mut self, buf: &[u8; PACKET_SIZE]) -> Vec<InputEvent> {
        self.stats.packets_read += 1;

        let packet = match Packet::decode(buf) {
            Ok(packet) => packet,
            Err(e) => {
                self.packet_rejected(buf, e);
                return Vec::new();
            }
        };

        let command_facility = self.sequencer.in_flight().map(|c| c.debug_facility());
        let facility = DebugMask::for_read(packet.direction(), packet.device(), command_facility);
        self.config.debug.dump(facility, "read", buf);

        let meta = PacketMeta {
            direction: packet.direction(),
            device: packet.device(),
        };
        let message = match self.reassembler.accept(&packet) {
            Ok(Assembly::Pending) => return Vec::new(),
            Ok(Assembly::Complete(message)) => message,
            Err(e) => {
                warn!("Dropping message: {}", e);
                match e {
                    ProtocolError::Framing(_) => self.stats.framing_errors += 1,
                    ProtocolError::Integrity(_) => self.stats.integrity_errors += 1,
                }
                if meta.direction == Direction::Write && self.sequencer.is_write_in_flight() {
                    self.fail_write();
                }
                return Vec::new();
            }
        };

        match self.dispatcher.dispatch(&message, meta) {
            Dispatch::Input { events, clamped } => {
                if clamped {
                    self.stats.finger_overflows += 1;
                }
                events
            }
            Dispatch::CommandResponse { .. } => {
                self.stats.commands_completed += 1;
                self.sequencer.complete(WriteOutcome::Responded);
                Vec::new()
            }
            Dispatch::Dropped(reason) => {
                self.record_drop(&reason);
                if meta.direction == Direction::Write {
                    self.sequencer.complete(WriteOutcome::Responded);
                }
                Vec::new()
            }
        }
    }

    /// Bookkeeping for a packet that failed to decode
    fn packet_rejected(&mut self, buf: &[u8; PACKET_SIZE], e: FramingError) {
        self.stats.framing_errors += 1;
        self.reassembler.reset();

        match e {
            FramingError::ChecksumMismatch { .. } => {
                warn!("Received corrupted packet (crc mismatch)");
                if self.power == PowerState::Draining && self.sequencer.is_write_in_flight() {
                    self.sequencer.complete(WriteOutcome::Failed);
                }
            }
            e => {
                warn!("Received corrupted packet ({})", e);
                // The header is intact, so a write response still ends its exchange
                if buf[0] == flags::WRITE && self.sequencer.is_write_in_flight() {
                    self.fail_write();
                }
            }
        }
    }

    fn record_drop(&mut self, reason: &DropReason) {
        match reason {
            DropReason::Unknown { .. } => self.stats.unknown_messages += 1,
            DropReason::Malformed(_) => self.stats.report_errors += 1,
            DropReason::UnexpectedResponseLength(_) => {}
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use applespi_input::keycodes::key;
    use applespi_input::InputDevice;
    use applespi_transport::protocol::msg_type;
    use applespi_transport::{split_message, Command, DeviceId, KeyboardReport, Message};

    fn keyboard_packet(keys: &[u8]) -> [u8; PACKET_SIZE] {
        let body = KeyboardReport::with_keys(keys, 0, false).to_body();
        let msg = Message::new(msg_type::KEYBOARD, 0, 0, body);
        Packet::single(Direction::Read, DeviceId::Keyboard, &msg.encode())
            .unwrap()
            .encode()
    }

    fn response_packet(write: &[u8; PACKET_SIZE]) -> [u8; PACKET_SIZE] {
        let sent = Packet::decode(write).unwrap();
        let cmd = Message::parse(sent.data()).unwrap();
        let rsp = Message::new(cmd.msg_type, cmd.counter, cmd.rsp_buf_len, Vec::new());
        Packet::single(Direction::Write, sent.device(), &rsp.encode())
            .unwrap()
            .encode()
    }

    /// Run the startup init through to its response
    fn started() -> Engine {
        let mut engine = Engine::default();
        let Some(BusOp::Write(init)) = engine.start().next else {
            panic!("expected init write");
        };
        engine.write_complete(Ok(STATUS_OK));
        assert_eq!(engine.interrupt().next, Some(BusOp::Read));
        let step = engine.read_complete(Ok(response_packet(&init)));
        assert_eq!(step.next, None);
        assert_eq!(engine.link_state(), LinkState::Idle);
        engine
    }

    fn sent_command(buf: &[u8; PACKET_SIZE]) -> u16 {
        let packet = Packet::decode(buf).unwrap();
        Message::parse(packet.data()).unwrap().msg_type
    }

    #[test]
    fn test_start_sends_init() {
        let mut engine = Engine::default();
        match engine.start().next {
            Some(BusOp::Write(buf)) => assert_eq!(sent_command(&buf), msg_type::INIT),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(engine.link_state(), LinkState::WriteInFlight);
    }

    #[test]
    fn test_keyboard_read() {
        let mut engine = started();
        assert_eq!(engine.interrupt().next, Some(BusOp::Read));
        assert_eq!(engine.link_state(), LinkState::ReadInFlight);

        let step = engine.read_complete(Ok(keyboard_packet(&[0x04])));
        assert_eq!(
            step.events,
            vec![
                InputEvent::key(key::A, true),
                InputEvent::sync(InputDevice::Keyboard)
            ]
        );
        assert_eq!(engine.link_state(), LinkState::Idle);
        assert_eq!(engine.stats().packets_read, 2);
    }

    #[test]
    fn test_interrupt_during_read_is_deferred() {
        let mut engine = started();
        assert_eq!(engine.interrupt().next, Some(BusOp::Read));
        assert_eq!(engine.interrupt().next, None);

        let step = engine.read_complete(Ok(keyboard_packet(&[])));
        assert_eq!(step.next, Some(BusOp::Read));
        assert_eq!(engine.link_state(), LinkState::ReadInFlight);
    }

    #[test]
    fn test_chained_writes() {
        let mut engine = started();
        let Some(BusOp::Write(caps)) = engine.request(CommandRequest::CapsLock(true)).next else {
            panic!("expected caps-lock write");
        };
        assert_eq!(sent_command(&caps), msg_type::CAPS_LOCK);

        // Backlight waits for the caps-lock exchange
        assert_eq!(engine.request(CommandRequest::Backlight(128)).next, None);
        assert_eq!(engine.write_complete(Ok(STATUS_OK)).next, None);

        engine.interrupt();
        match engine.read_complete(Ok(response_packet(&caps))).next {
            Some(BusOp::Write(buf)) => assert_eq!(sent_command(&buf), msg_type::BACKLIGHT),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(engine.stats().commands_completed, 2);
    }

    #[test]
    fn test_bad_status_fails_write() {
        let mut engine = started();
        engine.request(CommandRequest::CapsLock(true));
        let step = engine.write_complete(Ok([0, 0, 0, 0]));
        assert_eq!(step.next, None);
        assert_eq!(engine.link_state(), LinkState::Idle);
        assert_eq!(engine.stats().write_failures, 1);
    }

    #[test]
    fn test_write_error_unblocks_next_command() {
        let mut engine = started();
        engine.request(CommandRequest::CapsLock(true));
        engine.request(CommandRequest::Backlight(255));
        let step = engine.write_complete(Err(TransportError::Bus(-5)));
        match step.next {
            Some(BusOp::Write(buf)) => assert_eq!(sent_command(&buf), msg_type::BACKLIGHT),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_corrupted_packet_counted() {
        let mut engine = started();
        let mut buf = keyboard_packet(&[0x04]);
        buf[20] ^= 0x01;
        engine.interrupt();
        let step = engine.read_complete(Ok(buf));
        assert!(step.events.is_empty());
        assert_eq!(engine.stats().framing_errors, 1);
    }

    #[test]
    fn test_drain_waits_for_write() {
        let mut engine = started();
        let Some(BusOp::Write(caps)) = engine.request(CommandRequest::CapsLock(true)).next else {
            panic!("expected caps-lock write");
        };
        engine.write_complete(Ok(STATUS_OK));

        engine.begin_drain();
        assert!(!engine.finish_drain());
        assert_eq!(engine.power_state(), PowerState::Draining);

        // No new writes while draining
        assert_eq!(engine.request(CommandRequest::Backlight(10)).next, None);

        assert_eq!(engine.interrupt().next, Some(BusOp::Read));
        let step = engine.read_complete(Ok(response_packet(&caps)));
        assert_eq!(step.next, None);
        assert!(engine.finish_drain());
        assert_eq!(engine.power_state(), PowerState::Suspended);
    }

    #[test]
    fn test_interrupts_ignored_when_suspended() {
        let mut engine = started();
        engine.begin_drain();
        assert!(engine.finish_drain());
        assert_eq!(engine.interrupt().next, None);
        assert_eq!(engine.stats().interrupts_ignored, 1);
    }

    #[test]
    fn test_crc_failure_while_draining_clears_write() {
        let mut engine = started();
        engine.request(CommandRequest::CapsLock(true));
        engine.write_complete(Ok(STATUS_OK));
        engine.begin_drain();

        engine.interrupt();
        let mut garbage = keyboard_packet(&[]);
        garbage[0] ^= 0xff;
        engine.read_complete(Ok(garbage));

        assert_eq!(engine.link_state(), LinkState::Idle);
        assert!(engine.finish_drain());
    }

    #[test]
    fn test_resume_reissues_init_then_state() {
        let mut engine = started();
        let Some(BusOp::Write(caps)) = engine.request(CommandRequest::CapsLock(true)).next else {
            panic!("expected caps-lock write");
        };
        engine.write_complete(Ok(STATUS_OK));
        engine.interrupt();
        engine.read_complete(Ok(response_packet(&caps)));

        engine.begin_drain();
        assert!(engine.finish_drain());

        let Some(BusOp::Write(init)) = engine.resume().next else {
            panic!("expected init write");
        };
        assert_eq!(sent_command(&init), msg_type::INIT);
        assert_eq!(engine.power_state(), PowerState::Active);

        engine.write_complete(Ok(STATUS_OK));
        engine.interrupt();
        match engine.read_complete(Ok(response_packet(&init))).next {
            Some(BusOp::Write(buf)) => assert_eq!(sent_command(&buf), msg_type::CAPS_LOCK),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_resume_releases_held_keys() {
        let mut engine = started();
        engine.interrupt();
        engine.read_complete(Ok(keyboard_packet(&[0x04])));
        engine.begin_drain();
        engine.finish_drain();

        let step = engine.resume();
        assert_eq!(step.events[0], InputEvent::key(key::A, false));
    }

    #[test]
    fn test_two_packet_touchpad_report() {
        use applespi_transport::{Finger, TouchpadReport};

        let mut engine = started();
        let fingers = (0..10).map(|i| Finger::touching(i * 200, 100)).collect();
        let body = TouchpadReport::new(false, fingers).to_body();
        let msg = Message::new(msg_type::TOUCHPAD, 0, 0, body).encode();
        let packets = split_message(Direction::Read, DeviceId::Touchpad, &msg).unwrap();
        assert_eq!(packets.len(), 2);

        engine.interrupt();
        let first = engine.read_complete(Ok(packets[0].encode()));
        assert!(first.events.is_empty());

        engine.interrupt();
        let second = engine.read_complete(Ok(packets[1].encode()));
        let contacts = second
            .events
            .iter()
            .filter(|e| matches!(e, InputEvent::Contact(_)))
            .count();
        assert_eq!(contacts, 10);
        assert_eq!(
            second.events.last(),
            Some(&InputEvent::sync(InputDevice::Touchpad))
        );
    }

    #[test]
    fn test_unknown_message_counted() {
        let mut engine = started();
        let msg = Message::new(0x0999, 0, 0, vec![1, 2, 3]);
        let buf = Packet::single(Direction::Read, DeviceId::Other(7), &msg.encode())
            .unwrap()
            .encode();
        engine.interrupt();
        engine.read_complete(Ok(buf));
        assert_eq!(engine.stats().unknown_messages, 1);
    }

    #[test]
    fn test_response_without_write_is_harmless() {
        let mut engine = started();
        let rsp = Command::CapsLock { on: true }.build(0);
        let rsp = Message::new(rsp.msg_type, 0, 2, Vec::new());
        let buf = Packet::single(Direction::Write, DeviceId::Keyboard, &rsp.encode())
            .unwrap()
            .encode();
        engine.interrupt();
        let step = engine.read_complete(Ok(buf));
        assert_eq!(step.next, None);
        assert_eq!(engine.link_state(), LinkState::Idle);
    }

    /// Write response with an intact packet but a broken message crc
    fn corrupt_response(write: &[u8; PACKET_SIZE]) -> [u8; PACKET_SIZE] {
        let sent = Packet::decode(write).unwrap();
        let cmd = Message::parse(sent.data()).unwrap();
        let mut msg =
            Message::new(cmd.msg_type, cmd.counter, cmd.rsp_buf_len, Vec::new()).encode();
        let last = msg.len() - 1;
        msg[last] ^= 0x5a;
        Packet::single(Direction::Write, sent.device(), &msg)
            .unwrap()
            .encode()
    }

    #[test]
    fn test_corrupt_response_fails_outstanding_write() {
        let mut engine = started();
        let Some(BusOp::Write(caps)) = engine.request(CommandRequest::CapsLock(true)).next else {
            panic!("expected caps-lock write");
        };
        engine.write_complete(Ok(STATUS_OK));

        engine.interrupt();
        engine.read_complete(Ok(corrupt_response(&caps)));
        assert_eq!(engine.stats().integrity_errors, 1);
        assert_eq!(engine.stats().write_failures, 1);
        assert_eq!(engine.link_state(), LinkState::Idle);
    }

    #[test]
    fn test_stray_corrupt_response_is_not_a_write_failure() {
        let mut engine = started();
        let init = Command::Init.build_packet(0).encode();

        engine.interrupt();
        let step = engine.read_complete(Ok(corrupt_response(&init)));
        assert_eq!(step.next, None);
        assert_eq!(engine.stats().integrity_errors, 1);
        assert_eq!(engine.stats().write_failures, 0);
    }
}
