//! Apple SPI keyboard/touchpad driver engine
//!
//! Ties the transport and input crates together: a sans-IO [`engine`] that
//! owns all protocol state, an async [`driver`] task that runs it against an
//! [`SpiBus`](applespi_transport::SpiBus), a [`sim`]ulated device, trace
//! replay and the on-disk configuration.

pub mod config;
pub mod dispatch;
pub mod driver;
pub mod engine;
pub mod sim;
pub mod trace;

pub use config::DriverConfig;
pub use dispatch::{Dispatch, Dispatcher, DropReason, PacketMeta};
pub use driver::{Driver, DriverHandle, DriverMessage, DriverStopped, SuspendError};
pub use engine::{BusOp, Engine, EngineConfig, EngineStats, LinkState, PowerState, Step};
pub use sim::{DeviceModel, SimulatedDevice, WriteFault};

pub use applespi_input as input;
pub use applespi_transport as transport;
