//! End-to-end tests: driver task against the simulated device

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use applespi::input::keycodes::key;
use applespi::input::{InputDevice, InputEvent};
use applespi::transport::protocol::msg_type;
use applespi::transport::{
    scale_backlight_level, CommandRequest, Finger, KeyboardReport, TouchpadReport,
};
use applespi::{Driver, DriverStopped, EngineConfig, SimulatedDevice, SuspendError, WriteFault};

const TIMEOUT: Duration = Duration::from_secs(1);

fn start() -> (Arc<SimulatedDevice>, Driver) {
    let sim = Arc::new(SimulatedDevice::new());
    let driver = Driver::spawn(sim.clone(), EngineConfig::default());
    sim.attach(driver.handle());
    (sim, driver)
}

async fn wait_for(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(TIMEOUT, async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition not reached");
}

async fn next_event(rx: &mut broadcast::Receiver<InputEvent>) -> InputEvent {
    tokio::time::timeout(TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

async fn events_until_sync(
    rx: &mut broadcast::Receiver<InputEvent>,
    device: InputDevice,
) -> Vec<InputEvent> {
    let mut events = Vec::new();
    loop {
        let event = next_event(rx).await;
        let done = event == InputEvent::sync(device);
        events.push(event);
        if done {
            return events;
        }
    }
}

#[tokio::test]
async fn test_startup_init_and_typing() {
    let (sim, driver) = start();
    let mut rx = driver.handle().subscribe();

    wait_for(|| sim.model().initialized).await;
    sim.push_keyboard(&KeyboardReport::with_keys(&[0x04], 0, false))
        .unwrap();

    assert_eq!(next_event(&mut rx).await, InputEvent::key(key::A, true));
    assert_eq!(
        next_event(&mut rx).await,
        InputEvent::sync(InputDevice::Keyboard)
    );

    let stats = driver.stop().await.unwrap();
    assert_eq!(stats.commands_completed, 1);
    assert_eq!(sim.written_types(), vec![msg_type::INIT]);
}

#[tokio::test]
async fn test_caps_lock_goes_before_backlight() {
    let (sim, driver) = start();
    let handle = driver.handle();

    handle.request(CommandRequest::Backlight(255)).unwrap();
    handle.request(CommandRequest::CapsLock(true)).unwrap();
    wait_for(|| {
        let model = sim.model();
        model.caps_lock && model.backlight == 254
    })
    .await;

    assert_eq!(
        sim.written_types(),
        vec![msg_type::INIT, msg_type::CAPS_LOCK, msg_type::BACKLIGHT]
    );
    driver.stop().await.unwrap();
}

#[tokio::test]
async fn test_failed_write_is_not_retried() {
    let sim = Arc::new(SimulatedDevice::new());
    sim.fail_next_write(WriteFault::BadStatus);
    let driver = Driver::spawn(sim.clone(), EngineConfig::default());
    sim.attach(driver.handle());

    driver
        .handle()
        .request(CommandRequest::CapsLock(true))
        .unwrap();
    wait_for(|| sim.model().caps_lock).await;

    // The init failed and nothing asked for it again
    assert!(!sim.model().initialized);
    assert_eq!(
        sim.written_types(),
        vec![msg_type::INIT, msg_type::CAPS_LOCK]
    );
    let stats = driver.stop().await.unwrap();
    assert_eq!(stats.write_failures, 1);
}

#[tokio::test]
async fn test_two_packet_touchpad_report() {
    let (sim, driver) = start();
    let mut rx = driver.handle().subscribe();
    wait_for(|| sim.model().initialized).await;

    let fingers = (0..10).map(|i| Finger::touching(i * 300, 1000)).collect();
    sim.push_touchpad(&TouchpadReport::new(true, fingers)).unwrap();

    let events = events_until_sync(&mut rx, InputDevice::Touchpad).await;
    let slots: Vec<u8> = events
        .iter()
        .filter_map(|e| match e {
            InputEvent::Contact(c) => Some(c.slot),
            _ => None,
        })
        .collect();
    assert_eq!(slots, (0..10).collect::<Vec<u8>>());
    assert!(events.contains(&InputEvent::Button {
        code: key::BTN_LEFT,
        pressed: true
    }));
    driver.stop().await.unwrap();
}

#[tokio::test]
async fn test_suspend_waits_for_outstanding_write() {
    let (sim, driver) = start();
    let handle = driver.handle();
    wait_for(|| sim.model().initialized).await;

    // Accepted by the bus but never answered
    sim.fail_next_write(WriteFault::NoResponse);
    handle.request(CommandRequest::CapsLock(true)).unwrap();

    let suspended = tokio::time::timeout(Duration::from_millis(50), handle.suspend()).await;
    assert!(suspended.is_err(), "suspend completed with a write in flight");

    // No new writes while draining
    handle.request(CommandRequest::Backlight(100)).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(
        sim.written_types(),
        vec![msg_type::INIT, msg_type::CAPS_LOCK]
    );

    // Resume clears the hung exchange and re-syncs the device
    handle.resume().unwrap();
    let want = scale_backlight_level(100);
    wait_for(|| {
        let model = sim.model();
        model.initialized && model.caps_lock && model.backlight == want
    })
    .await;
    assert_eq!(
        sim.written_types(),
        vec![
            msg_type::INIT,
            msg_type::CAPS_LOCK,
            msg_type::INIT,
            msg_type::CAPS_LOCK,
            msg_type::BACKLIGHT
        ]
    );
    assert_eq!(sim.model().enable_count, 2);
    driver.stop().await.unwrap();
}

#[tokio::test]
async fn test_suspend_resume_cycle() {
    let (sim, driver) = start();
    let handle = driver.handle();
    let mut rx = handle.subscribe();

    handle.request(CommandRequest::CapsLock(true)).unwrap();
    wait_for(|| sim.model().caps_lock).await;

    sim.push_keyboard(&KeyboardReport::with_keys(&[0x05], 0, false))
        .unwrap();
    events_until_sync(&mut rx, InputDevice::Keyboard).await;

    let stats = handle.suspend().await.unwrap();
    assert_eq!(stats.commands_completed, 2);

    handle.resume().unwrap();
    // Keys held across the power cycle are released
    assert_eq!(next_event(&mut rx).await, InputEvent::key(key::B, false));

    wait_for(|| {
        let model = sim.model();
        model.initialized && model.caps_lock
    })
    .await;
    let written = sim.written_types();
    assert_eq!(
        &written[written.len() - 2..],
        &[msg_type::INIT, msg_type::CAPS_LOCK]
    );
    driver.stop().await.unwrap();
}

#[tokio::test]
async fn test_handle_fails_after_shutdown() {
    let (_sim, driver) = start();
    let handle = driver.handle();
    driver.stop().await.unwrap();

    assert_eq!(handle.interrupt(), Err(DriverStopped));
    assert_eq!(handle.shutdown().await, Err(DriverStopped));
}

#[tokio::test]
async fn test_shutdown_waits_for_outstanding_write() {
    let (sim, driver) = start();
    let handle = driver.handle();
    wait_for(|| sim.model().initialized).await;

    sim.fail_next_write(WriteFault::NoResponse);
    handle.request(CommandRequest::CapsLock(true)).unwrap();
    wait_for(|| sim.written_types().len() == 2).await;

    let shutdown = tokio::spawn({
        let handle = handle.clone();
        async move { handle.shutdown().await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!shutdown.is_finished(), "shutdown returned with a write in flight");
    // Still serving interrupts while it drains
    assert_eq!(handle.interrupt(), Ok(()));

    sim.respond_to_last_write();
    let stats = tokio::time::timeout(TIMEOUT, shutdown)
        .await
        .expect("shutdown did not finish after the response")
        .unwrap()
        .unwrap();
    assert_eq!(stats.commands_completed, 2);
    assert_eq!(stats.write_failures, 0);

    // The task is already gone
    assert_eq!(driver.stop().await, Err(DriverStopped));
}

#[tokio::test]
async fn test_resume_cancels_pending_suspend() {
    let (sim, driver) = start();
    let handle = driver.handle();
    wait_for(|| sim.model().initialized).await;

    sim.fail_next_write(WriteFault::NoResponse);
    handle.request(CommandRequest::CapsLock(true)).unwrap();
    wait_for(|| sim.written_types().len() == 2).await;

    let suspend = tokio::spawn({
        let handle = handle.clone();
        async move { handle.suspend().await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!suspend.is_finished());

    handle.resume().unwrap();
    let result = tokio::time::timeout(TIMEOUT, suspend)
        .await
        .expect("suspend caller still blocked after resume")
        .unwrap();
    assert_eq!(result, Err(SuspendError::Cancelled));

    wait_for(|| {
        let model = sim.model();
        model.initialized && model.caps_lock
    })
    .await;
    driver.stop().await.unwrap();
}

#[tokio::test]
async fn test_disconnected_device_counts_bus_errors() {
    let (sim, driver) = start();
    let handle = driver.handle();
    wait_for(|| sim.model().initialized).await;

    sim.disconnect();
    handle.interrupt().unwrap();
    wait_for(|| handle.stats().bus_errors == 1).await;

    let stats = driver.stop().await.unwrap();
    assert_eq!(stats.packets_read, 1);
}
