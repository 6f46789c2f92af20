//! Config file commands.

use std::path::Path;

use applespi::DriverConfig;

use super::CommandResult;

pub fn show(config: &DriverConfig) -> CommandResult {
    print!("{}", toml::to_string_pretty(config)?);
    let [x_min, x_max, y_min, y_max] = config.touchpad_info().as_array();
    println!("# touchpad bounds in effect: [{x_min}, {x_max}, {y_min}, {y_max}]");
    Ok(())
}

pub fn path(path: &Path) -> CommandResult {
    println!("{}", path.display());
    Ok(())
}

pub fn save(config: &DriverConfig, path: &Path) -> CommandResult {
    config.save(path)?;
    println!("Saved config to {}", path.display());
    Ok(())
}
