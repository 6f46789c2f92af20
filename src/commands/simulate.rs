//! Simulated device command.
//!
//! Spawns the driver on a [`SimulatedDevice`], types some text, swipes a
//! finger across the touchpad, sets the caps-lock LED and backlight, and
//! prints the resulting input events.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use applespi::transport::{scale_backlight_level, CommandRequest, Finger, TouchpadReport};
use applespi::{DeviceModel, Driver, DriverConfig, EngineStats, SimulatedDevice};

use super::{print_event, CommandResult};

/// How long to wait for the device to catch up before draining
const SETTLE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Serialize)]
struct Summary {
    stats: EngineStats,
    device: DeviceModel,
}

pub async fn run(
    config: &DriverConfig,
    text: &str,
    backlight: u8,
    suspend: bool,
    json: bool,
) -> CommandResult {
    let sim = Arc::new(SimulatedDevice::new());
    let driver = Driver::spawn(sim.clone(), config.engine_config());
    let handle = driver.handle();
    let mut events = handle.subscribe();
    sim.attach(handle.clone());

    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Err(e) = print_event(&event, json) {
                        warn!("Failed to print event: {}", e);
                    }
                }
                Err(RecvError::Lagged(n)) => warn!("Dropped {} events", n),
                Err(RecvError::Closed) => break,
            }
        }
    });

    handle.request(CommandRequest::CapsLock(true))?;
    handle.request(CommandRequest::Backlight(backlight))?;
    sim.type_text(text)?;
    swipe(&sim)?;
    settle(&sim, backlight).await;

    if suspend {
        let stats = handle.suspend().await?;
        info!("Suspended after {} packets read", stats.packets_read);
        handle.resume()?;
        sim.type_text(text)?;
        settle(&sim, backlight).await;
    }

    handle.suspend().await?;
    let device = sim.model();
    drop(handle);
    drop(sim);
    let stats = driver.stop().await?;
    let _ = printer.await;

    let summary = Summary { stats, device };
    if json {
        println!("{}", serde_json::to_string(&summary)?);
    } else {
        println!("{:#?}", summary.stats);
        println!("{:#?}", summary.device);
    }
    Ok(())
}

/// One finger moving left to right, then lifting
fn swipe(sim: &SimulatedDevice) -> anyhow::Result<()> {
    for step in 0..5i16 {
        let finger = Finger::touching(-2000 + step * 1000, 3000);
        sim.push_touchpad(&TouchpadReport::new(false, vec![finger]))?;
    }
    sim.push_touchpad(&TouchpadReport::new(false, Vec::new()))?;
    Ok(())
}

/// Wait until every queued packet was read and the requested state applied
async fn settle(sim: &SimulatedDevice, backlight: u8) {
    let want = scale_backlight_level(backlight);
    let settled = tokio::time::timeout(SETTLE_TIMEOUT, async {
        loop {
            let model = sim.model();
            if sim.pending() == 0 && model.initialized && model.caps_lock && model.backlight == want
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    if settled.is_err() {
        warn!("Simulated device did not settle within {:?}", SETTLE_TIMEOUT);
    }
}
