//! Trace replay command.

use anyhow::Context;
use std::path::Path;
use tracing::info;

use applespi::trace::{parse_trace, replay};
use applespi::{DriverConfig, Engine};

use super::{print_event, CommandResult};

pub fn run(config: &DriverConfig, file: &Path, stats: bool, json: bool) -> CommandResult {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("reading trace {}", file.display()))?;
    let packets = parse_trace(&text)?;
    info!("Replaying {} packets from {}", packets.len(), file.display());

    let mut engine = Engine::new(config.engine_config());
    let result = replay(&mut engine, &packets);

    for event in &result.events {
        print_event(event, json)?;
    }

    if stats {
        if json {
            println!("{}", serde_json::to_string(&result.stats)?);
        } else {
            println!("{:#?}", result.stats);
            println!("writes: {}", result.writes.len());
        }
    }
    Ok(())
}
