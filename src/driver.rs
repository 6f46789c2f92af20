//! Async driver actor
//!
//! A single tokio task owns the [`Engine`] and the bus. Interrupts, command
//! requests and power transitions arrive as messages on an unbounded channel;
//! bus transfers are awaited inline, so the engine is never re-entered.
//! Input events fan out on a broadcast channel.

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use applespi_input::InputEvent;
use applespi_transport::{BoxedBus, CommandRequest};

use crate::engine::{BusOp, Engine, EngineConfig, EngineStats, Step};

/// Capacity of the input event broadcast channel
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Messages understood by the driver task
#[derive(Debug)]
pub enum DriverMessage {
    Interrupt,
    Request(CommandRequest),
    Suspend(oneshot::Sender<Result<EngineStats, SuspendError>>),
    Resume,
    Shutdown(oneshot::Sender<EngineStats>),
}

/// The driver task is gone
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Driver has stopped")]
pub struct DriverStopped;

/// A suspend request that did not complete
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspendError {
    #[error("Suspend cancelled by resume")]
    Cancelled,

    #[error(transparent)]
    Stopped(#[from] DriverStopped),
}

/// Cloneable handle to a running driver
#[derive(Clone)]
pub struct DriverHandle {
    tx: mpsc::UnboundedSender<DriverMessage>,
    events: broadcast::Sender<InputEvent>,
    stats: Arc<Mutex<EngineStats>>,
}

impl DriverHandle {
    /// Signal a device interrupt; never blocks
    pub fn interrupt(&self) -> Result<(), DriverStopped> {
        self.send(DriverMessage::Interrupt)
    }

    pub fn request(&self, request: CommandRequest) -> Result<(), DriverStopped> {
        self.send(DriverMessage::Request(request))
    }

    /// Drain outstanding writes and stop reacting to interrupts
    ///
    /// Returns once the engine has quiesced, or [`SuspendError::Cancelled`]
    /// if a resume arrives first.
    pub async fn suspend(&self) -> Result<EngineStats, SuspendError> {
        let (tx, rx) = oneshot::channel();
        self.send(DriverMessage::Suspend(tx))?;
        rx.await.map_err(|_| DriverStopped)?
    }

    pub fn resume(&self) -> Result<(), DriverStopped> {
        self.send(DriverMessage::Resume)
    }

    /// Drain and stop the driver task
    ///
    /// Outstanding exchanges are waited for the same way as on suspend.
    pub async fn shutdown(&self) -> Result<EngineStats, DriverStopped> {
        let (tx, rx) = oneshot::channel();
        self.send(DriverMessage::Shutdown(tx))?;
        rx.await.map_err(|_| DriverStopped)
    }

    /// Receive input events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<InputEvent> {
        self.events.subscribe()
    }

    /// Snapshot of the engine counters as of the last processed message
    pub fn stats(&self) -> EngineStats {
        *self.stats.lock()
    }

    fn send(&self, msg: DriverMessage) -> Result<(), DriverStopped> {
        self.tx.send(msg).map_err(|_| DriverStopped)
    }
}

/// Running driver: a handle plus the task it talks to
pub struct Driver {
    handle: DriverHandle,
    task: JoinHandle<()>,
}

impl Driver {
    /// Spawn the driver task on the current runtime
    pub fn spawn(bus: BoxedBus, config: EngineConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let stats = Arc::new(Mutex::new(EngineStats::default()));

        let handle = DriverHandle {
            tx,
            events: events.clone(),
            stats: stats.clone(),
        };
        let worker = DriverWorker {
            bus,
            engine: Engine::new(config),
            events,
            stats,
            suspend_waiters: Vec::new(),
            shutdown_waiters: Vec::new(),
        };
        let task = tokio::spawn(worker.run(rx));

        Self { handle, task }
    }

    pub fn handle(&self) -> DriverHandle {
        self.handle.clone()
    }

    /// Shut down and wait for the task to exit
    pub async fn stop(self) -> Result<EngineStats, DriverStopped> {
        let stats = self.handle.shutdown().await;
        let _ = self.task.await;
        stats
    }
}

// =============================================================================
// Worker
// =============================================================================

struct DriverWorker {
    bus: BoxedBus,
    engine: Engine,
    events: broadcast::Sender<InputEvent>,
    stats: Arc<Mutex<EngineStats>>,
    suspend_waiters: Vec<oneshot::Sender<Result<EngineStats, SuspendError>>>,
    shutdown_waiters: Vec<oneshot::Sender<EngineStats>>,
}

impl DriverWorker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<DriverMessage>) {
        debug!("SPI driver worker started");

        if let Err(e) = self.bus.enable().await {
            warn!("Failed to enable SPI: {}", e);
        }
        let step = self.engine.start();
        self.drive(step).await;

        while let Some(msg) = rx.recv().await {
            match msg {
                DriverMessage::Interrupt => {
                    let step = self.engine.interrupt();
                    self.drive(step).await;
                }
                DriverMessage::Request(request) => {
                    let step = self.engine.request(request);
                    self.drive(step).await;
                }
                DriverMessage::Suspend(reply) => {
                    self.engine.begin_drain();
                    self.suspend_waiters.push(reply);
                }
                DriverMessage::Resume if !self.shutdown_waiters.is_empty() => {
                    warn!("Ignoring resume while shutting down");
                }
                DriverMessage::Resume => {
                    self.cancel_suspend();
                    if let Err(e) = self.bus.enable().await {
                        warn!("Failed to enable SPI: {}", e);
                    }
                    let step = self.engine.resume();
                    self.drive(step).await;
                }
                DriverMessage::Shutdown(reply) => {
                    if self.shutdown_waiters.is_empty() {
                        info!("Shutting down ({})", self.engine.link_state());
                    }
                    self.engine.begin_drain();
                    self.shutdown_waiters.push(reply);
                }
            }
            self.check_suspended();
            if self.check_shutdown() {
                break;
            }
        }

        // Late shutdown requests get the final counters too
        rx.close();
        let stats = self.engine.stats();
        while let Ok(msg) = rx.try_recv() {
            match msg {
                DriverMessage::Shutdown(reply) => {
                    let _ = reply.send(stats);
                }
                DriverMessage::Suspend(reply) => {
                    let _ = reply.send(Ok(stats));
                }
                _ => {}
            }
        }

        debug!("SPI driver worker stopped");
    }

    /// Run bus operations until the engine has nothing more to start
    async fn drive(&mut self, mut step: Step) {
        loop {
            self.publish(std::mem::take(&mut step.events));
            step = match step.next.take() {
                Some(BusOp::Read) => {
                    let result = self.bus.read_packet().await;
                    self.engine.read_complete(result)
                }
                Some(BusOp::Write(packet)) => {
                    let result = self.bus.write_packet(&packet).await;
                    self.engine.write_complete(result)
                }
                None => break,
            };
        }
        *self.stats.lock() = self.engine.stats();
    }

    fn publish(&self, events: Vec<InputEvent>) {
        for event in events {
            // No subscribers is fine
            let _ = self.events.send(event);
        }
    }

    fn check_suspended(&mut self) {
        if !self.suspend_waiters.is_empty() && self.engine.finish_drain() {
            let stats = self.snapshot();
            for waiter in self.suspend_waiters.drain(..) {
                let _ = waiter.send(Ok(stats));
            }
        }
    }

    /// Answer shutdown requests once drained; true when the task should exit
    fn check_shutdown(&mut self) -> bool {
        if self.shutdown_waiters.is_empty() || !self.engine.finish_drain() {
            return false;
        }
        let stats = self.snapshot();
        for waiter in self.shutdown_waiters.drain(..) {
            let _ = waiter.send(stats);
        }
        true
    }

    fn cancel_suspend(&mut self) {
        if !self.suspend_waiters.is_empty() {
            info!("Resume cancels {} pending suspend", self.suspend_waiters.len());
        }
        for waiter in self.suspend_waiters.drain(..) {
            let _ = waiter.send(Err(SuspendError::Cancelled));
        }
    }

    fn snapshot(&self) -> EngineStats {
        let stats = self.engine.stats();
        *self.stats.lock() = stats;
        stats
    }
}
