//! Transport layer for the Apple SPI keyboard/touchpad controller
//!
//! This crate covers everything between raw 256-byte bus transfers and typed
//! reports and commands:
//!
//! - packet codec with CRC-16 verification
//! - multi-packet message reassembly
//! - command building and write sequencing
//! - keyboard and touchpad report layouts
//!
//! It performs no I/O itself. The bus is reached through [`SpiBus`].

pub mod command;
pub mod debug;
pub mod error;
pub mod message;
pub mod packet;
pub mod protocol;
pub mod reassembly;
pub mod report;
pub mod sequencer;

pub use command::{
    scale_backlight_level, Command, CommandRequest, InitTouchpad, SetBacklight, SetCapsLockLed,
    SpiCommand,
};
pub use debug::DebugMask;
pub use error::{FramingError, IntegrityError, ProtocolError, ReportError, TransportError};
pub use message::Message;
pub use packet::{split_message, DeviceId, Direction, Packet};
pub use protocol::{PACKET_SIZE, STATUS_OK, STATUS_SIZE};
pub use reassembly::{Assembly, Reassembler};
pub use report::{Finger, KeyboardReport, TouchpadReport, MAX_FINGERS};
pub use sequencer::{CommandSequencer, OutboundWrite, WriteOutcome};

use async_trait::async_trait;
use std::sync::Arc;

/// Full-duplex packet bus to the controller
///
/// Implemented by the hardware backend and by the simulated device. Calls
/// are never issued concurrently by the driver.
#[async_trait]
pub trait SpiBus: Send + Sync {
    /// Read one packet after the device raised an interrupt
    async fn read_packet(&self) -> Result<[u8; PACKET_SIZE], TransportError>;

    /// Write one command packet and return the status bytes read back
    /// immediately afterwards
    ///
    /// [`STATUS_OK`] means the device accepted the packet.
    async fn write_packet(
        &self,
        packet: &[u8; PACKET_SIZE],
    ) -> Result<[u8; STATUS_SIZE], TransportError>;

    /// Switch the controller interface into SPI mode (power-up and resume)
    async fn enable(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Type alias for a boxed bus
pub type BoxedBus = Arc<dyn SpiBus>;
