//! Capability listing command.

use serde::Serialize;

use applespi::input::keycodes::key;
use applespi::input::{AxisInfo, KeyboardTracker, TouchpadInfo, TouchpadTracker};
use applespi::DriverConfig;

use super::CommandResult;

#[derive(Serialize)]
struct Capabilities {
    keys: Vec<u16>,
    touchpad: TouchpadInfo,
    axes: Vec<AxisInfo>,
}

/// Print every key code the keyboard emits and the touchpad axis ranges
pub fn capabilities(config: &DriverConfig, json: bool) -> CommandResult {
    let engine_config = config.engine_config();
    let keyboard = KeyboardTracker::new(engine_config.keyboard);
    let touchpad = TouchpadTracker::new(engine_config.touchpad, engine_config.debug);

    let caps = Capabilities {
        keys: keyboard.capabilities(),
        touchpad: touchpad.info(),
        axes: touchpad.axes(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&caps)?);
        return Ok(());
    }

    println!("Keyboard ({} keys):", caps.keys.len());
    for code in &caps.keys {
        println!("  {:3} {}", code, key::name(*code));
    }
    let [x_min, x_max, y_min, y_max] = caps.touchpad.as_array();
    println!("Touchpad bounds: x {x_min}..{x_max}, y {y_min}..{y_max}");
    for axis in &caps.axes {
        println!("  {:<20} {}..{}", axis.name, axis.min, axis.max);
    }
    Ok(())
}
