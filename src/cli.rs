// CLI definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use applespi_input::FnMode;
use applespi_transport::DebugMask;

#[derive(Parser)]
#[command(name = "applespi")]
#[command(author, version, about = "Apple SPI keyboard/touchpad driver engine")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file path (default: ~/.config/applespi/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Function key mode (disabled, fkeys-last, fkeys-first or 0-2)
    #[arg(long, global = true)]
    pub fn_mode: Option<FnMode>,

    /// Swap the grave and 102nd keys
    #[arg(long, global = true)]
    pub iso_layout: bool,

    /// Debug facility bitmask, decimal or 0x-prefixed hex
    #[arg(long, global = true)]
    pub debug: Option<DebugMask>,

    /// Product name for touchpad bounds lookup (e.g. MacBookPro13,3)
    #[arg(long, global = true)]
    pub product: Option<String>,

    /// Touchpad bounds override: x_min x_max y_min y_max
    #[arg(long, global = true, num_args = 4, allow_negative_numbers = true)]
    pub touchpad_dimensions: Option<Vec<i32>>,

    /// Print events as JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Decode raw packets given as hex
    #[command(visible_alias = "d")]
    Decode {
        /// One 256-byte packet in hex (spaces allowed when quoted)
        #[arg(required = true)]
        packets: Vec<String>,
    },

    /// Feed a packet trace through the engine and print input events
    #[command(visible_alias = "r")]
    Replay {
        /// Trace file, one hex packet per line
        file: PathBuf,

        /// Print engine counters at the end
        #[arg(long)]
        stats: bool,
    },

    /// Run the driver against the simulated device
    #[command(visible_alias = "sim")]
    Simulate {
        /// Text to type on the simulated keyboard
        #[arg(long, default_value = "hello")]
        text: String,

        /// Backlight brightness to request (0-255)
        #[arg(long, default_value_t = 128)]
        backlight: u8,

        /// Exercise suspend and resume at the end
        #[arg(long)]
        suspend: bool,
    },

    /// List keyboard key codes and touchpad axes
    #[command(visible_alias = "caps")]
    Capabilities,

    /// Configuration file commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
    /// Write the effective configuration to the config file
    Save,
}
