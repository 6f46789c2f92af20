//! Command handlers for the CLI application.
//!
//! - `decode`: decode raw packets given on the command line
//! - `replay`: run a packet trace through the engine
//! - `simulate`: drive the simulated device end to end
//! - `info`: keyboard and touchpad capabilities
//! - `config`: show, locate and save the config file

pub mod config;
pub mod decode;
pub mod info;
pub mod replay;
pub mod simulate;

use applespi::input::InputEvent;

/// Result type for command handlers
pub type CommandResult = anyhow::Result<()>;

/// Print one input event, as text or a JSON line
pub fn print_event(event: &InputEvent, json: bool) -> CommandResult {
    if json {
        println!("{}", serde_json::to_string(event)?);
    } else {
        println!("{event}");
    }
    Ok(())
}
