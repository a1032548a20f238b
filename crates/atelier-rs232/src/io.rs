//! IO task for the Atelier RS-232 link.
//!
//! One tokio task owns the transport exclusively, together with the
//! believed state, the command queue, the volume ramp and the liveness
//! detector. Nothing else mutates any of them. The device handle talks to
//! the task over an `mpsc` channel: intents are fire-and-forget, queries
//! carry a `oneshot` for the answer.
//!
//! Because requests and dispatches are handled one at a time inside the
//! same loop, a request always observes the effects of every write that
//! completed before it, and commands reach the wire strictly in the order
//! they were queued.

use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use atelier_core::error::{Error, Result};
use atelier_core::events::StateEvent;
use atelier_core::transport::Transport;
use atelier_core::types::DeviceState;

use crate::commands::Command;
use crate::liveness::{Expiry, LivenessDetector, DEFAULT_LIVENESS_TIMEOUT, DEFAULT_STALENESS_THRESHOLD};
use crate::protocol::{self, LineResult, MAX_BUF};
use crate::ramp::{RampTick, VolumeRamp, DEFAULT_MAX_RAMP_STEPS};
use crate::scheduler::{Action, Applied, QueueEntry, Scheduler, SchedulerConfig};
use crate::state::{StateTracker, StateUpdate};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Default idle receive timeout. Bounds how long the loop waits on the
/// transport before re-evaluating its timers.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Configuration for the IO task.
#[derive(Debug, Clone, Copy)]
pub struct IoConfig {
    /// Settle delays and the display refresh window.
    pub scheduler: SchedulerConfig,
    /// Age after which the believed state is refreshed.
    pub staleness_threshold: Duration,
    /// How long an unanswered status request takes to mean "off".
    pub liveness_timeout: Duration,
    /// Step budget of a single volume ramp.
    pub max_ramp_steps: u32,
    /// Idle receive timeout.
    pub read_timeout: Duration,
}

impl Default for IoConfig {
    fn default() -> Self {
        IoConfig {
            scheduler: SchedulerConfig::default(),
            staleness_threshold: DEFAULT_STALENESS_THRESHOLD,
            liveness_timeout: DEFAULT_LIVENESS_TIMEOUT,
            max_ramp_steps: DEFAULT_MAX_RAMP_STEPS,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// A request sent from the device handle to the IO task.
pub(crate) enum Request {
    /// Queue a single write.
    Enqueue {
        command: Command,
        applied: Option<Applied>,
    },
    /// Switch power after refreshing the believed state.
    SetPower { on: bool },
    /// Queue the command that writes `update`, unless the believed state
    /// already holds it.
    Assign { update: StateUpdate },
    /// Ramp the volume to an absolute target.
    SetVolume { target: u8 },
    GetState {
        reply: oneshot::Sender<DeviceState>,
    },
    IsEnqueued {
        command: Command,
        reply: oneshot::Sender<bool>,
    },
    RecentlyConfirmed {
        reply: oneshot::Sender<bool>,
    },
    RampTarget {
        reply: oneshot::Sender<Option<u8>>,
    },
    /// Close the transport and stop the task.
    Shutdown { reply: oneshot::Sender<()> },
}

/// Handle to the IO task. Stored inside the device handle.
pub(crate) struct DeviceIo {
    tx: mpsc::Sender<Request>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl DeviceIo {
    /// Deliver an intent.
    pub(crate) async fn send(&self, req: Request) -> Result<()> {
        self.tx.send(req).await.map_err(|_| Error::NotConnected)
    }

    /// Deliver a query and await its answer.
    pub(crate) async fn query<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Request,
    ) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(make(reply_tx)).await?;
        reply_rx.await.map_err(|_| Error::NotConnected)
    }

    /// Close the transport and wait for the task to finish.
    pub(crate) async fn shutdown(self) -> Result<()> {
        let result = self.query(|reply| Request::Shutdown { reply }).await;
        if result.is_err() {
            self.cancel.cancel();
        }
        let _ = self.task.await;
        result
    }
}

// ---------------------------------------------------------------------------
// Spawn
// ---------------------------------------------------------------------------

/// Spawn the IO task. Returns the handle for sending requests.
pub(crate) fn spawn_io_task(
    transport: Box<dyn Transport>,
    config: IoConfig,
    event_tx: broadcast::Sender<StateEvent>,
) -> DeviceIo {
    let (tx, rx) = mpsc::channel::<Request>(32);
    let cancel = CancellationToken::new();

    let engine = Engine::new(transport, config, event_tx);
    let task = tokio::spawn(engine.run(rx, cancel.clone()));

    DeviceIo { tx, cancel, task }
}

// ---------------------------------------------------------------------------
// IO Loop
// ---------------------------------------------------------------------------

struct Engine {
    transport: Box<dyn Transport>,
    config: IoConfig,
    state: StateTracker,
    scheduler: Scheduler,
    ramp: VolumeRamp,
    liveness: LivenessDetector,
    /// A power decision waiting for the outstanding poll to resolve.
    pending_power: Option<bool>,
    rx_buf: Vec<u8>,
}

impl Engine {
    fn new(
        transport: Box<dyn Transport>,
        config: IoConfig,
        event_tx: broadcast::Sender<StateEvent>,
    ) -> Self {
        Engine {
            transport,
            state: StateTracker::new(event_tx),
            scheduler: Scheduler::new(config.scheduler),
            ramp: VolumeRamp::new(config.max_ramp_steps),
            liveness: LivenessDetector::new(config.staleness_threshold, config.liveness_timeout),
            pending_power: None,
            rx_buf: Vec::new(),
            config,
        }
    }

    /// The main IO loop. Runs as a spawned tokio task.
    ///
    /// Uses `tokio::select! { biased; }` to prioritize:
    /// 1. Cancellation
    /// 2. Requests from the device handle
    /// 3. The liveness deadline
    /// 4. Dispatch of the next due queue entry
    /// 5. Idle reading of status frames
    async fn run(mut self, mut rx: mpsc::Receiver<Request>, cancel: CancellationToken) {
        loop {
            let now = Instant::now();
            let due = self.scheduler.next_due(now);
            let deadline = self.liveness.deadline();
            let read_timeout = self.config.read_timeout;
            let mut buf = [0u8; 256];

            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("IO task cancelled");
                    break;
                }

                req = rx.recv() => {
                    match req {
                        Some(Request::Shutdown { reply }) => {
                            debug!("IO task shutdown requested");
                            self.close().await;
                            let _ = reply.send(());
                            return;
                        }
                        Some(req) => self.handle_request(req),
                        None => {
                            debug!("request channel closed, exiting IO task");
                            break;
                        }
                    }
                }

                _ = sleep_until(deadline.unwrap_or(now)), if deadline.is_some() => {
                    self.expire_poll();
                }

                _ = sleep_until(due.unwrap_or(now)), if due.is_some() => {
                    self.dispatch().await;
                }

                result = self.transport.receive(&mut buf, read_timeout) => {
                    match result {
                        Ok(n) => self.on_bytes(&buf[..n]),
                        Err(Error::Timeout) => {}
                        Err(e) => {
                            trace!(error = %e, "receive failed");
                            // Yield so a dead port does not spin the loop.
                            sleep(read_timeout).await;
                        }
                    }
                }
            }
        }
    }

    async fn close(&mut self) {
        match self.transport.close().await {
            Ok(()) => info!("port closed"),
            Err(e) => error!(error = %e, "error closing port"),
        }
    }

    // -----------------------------------------------------------------------
    // Requests
    // -----------------------------------------------------------------------

    fn handle_request(&mut self, req: Request) {
        let now = Instant::now();
        match req {
            Request::Enqueue { command, applied } => self.scheduler.enqueue(command, applied),
            Request::SetPower { on } => {
                self.poll_if_stale(now);
                if self.liveness.is_polling() {
                    debug!(on, "power decision deferred until poll resolves");
                    self.pending_power = Some(on);
                } else {
                    self.decide_power(on);
                }
            }
            Request::Assign { update } => self.assign(update),
            Request::SetVolume { target } => self.set_volume(target, now),
            Request::GetState { reply } => {
                self.poll_if_stale(now);
                let _ = reply.send(self.state.state().clone());
            }
            Request::IsEnqueued { command, reply } => {
                let _ = reply.send(self.scheduler.is_enqueued(command));
            }
            Request::RecentlyConfirmed { reply } => {
                let _ = reply.send(self.scheduler.was_recently_confirmed());
            }
            Request::RampTarget { reply } => {
                let _ = reply.send(self.ramp.target());
            }
            Request::Shutdown { .. } => unreachable!("Shutdown handled in run"),
        }
    }

    fn poll_if_stale(&mut self, now: Instant) {
        if self.liveness.check(self.state.last_updated(), now) {
            self.scheduler.enqueue(Command::TransmitStatus, None);
        }
    }

    fn decide_power(&mut self, on: bool) {
        let update = StateUpdate::Power(on);
        if update.is_current(self.state.state()) {
            debug!(on, "power already in requested state");
            return;
        }
        self.scheduler
            .enqueue(Command::Power, Some(Applied::Assign(update)));
    }

    fn resolve_pending_power(&mut self) {
        if let Some(on) = self.pending_power.take() {
            self.decide_power(on);
        }
    }

    fn assign(&mut self, update: StateUpdate) {
        let command = match update {
            StateUpdate::Power(_) => Command::Power,
            StateUpdate::Mute(_) => Command::Mute,
            StateUpdate::Loudness(_) => Command::Loudness,
            StateUpdate::Input(input) => Command::for_input(input),
            StateUpdate::Speaker1(_) => Command::Speaker1,
            StateUpdate::Speaker2(_) => Command::Speaker2,
            StateUpdate::Volume(target) => return self.set_volume(target, Instant::now()),
        };
        if update.is_current(self.state.state()) {
            debug!(?update, "already in requested state");
            return;
        }
        self.scheduler
            .enqueue(command, Some(Applied::Assign(update)));
    }

    fn set_volume(&mut self, target: u8, now: Instant) {
        let current = self.state.state().volume;
        if current == target && !self.ramp.is_active() {
            return;
        }
        if self.ramp.ramp_to(target, current) {
            // The first step only switches the front panel to the volume
            // readout.
            self.scheduler.enqueue(Command::VolumeUp, None);
            self.scheduler.enqueue_entry(QueueEntry::ramp_iteration());
        }
        self.state.apply(StateUpdate::Volume(target), now);
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    async fn dispatch(&mut self) {
        let Some(entry) = self.scheduler.pop(Instant::now()) else {
            return;
        };

        match entry.action {
            Action::Write(applied) => self.write(entry.command, applied).await,
            Action::RampIteration => match self.ramp.tick() {
                RampTick::Step(command) => {
                    self.write(command, Some(Applied::RampStep)).await;
                    self.scheduler.push_front(QueueEntry::ramp_iteration());
                }
                RampTick::Finished | RampTick::Abandoned | RampTick::Idle => {}
            },
        }
    }

    async fn write(&mut self, command: Command, applied: Option<Applied>) {
        trace!(command = %command, bytes = ?command.wire_bytes(), "writing");
        let result = self.transport.send(command.wire_bytes()).await;
        let now = Instant::now();

        match result {
            Ok(()) => {
                let wakeup = self.scheduler.is_display_wakeup(command, now);
                self.scheduler.record_write(command, now);
                debug!(command = %command, "command written");

                if command == Command::TransmitStatus {
                    self.liveness.armed(self.state.last_heard(), now);
                }
                match applied {
                    Some(_) if wakeup => debug!(command = %command, "display wakeup, effect skipped"),
                    Some(applied) => self.run_applied(command, applied, now),
                    None => {}
                }
            }
            Err(e) => {
                warn!(command = %command, error = %e, "error writing command to port");
                if command == Command::TransmitStatus {
                    self.liveness.armed(self.state.last_heard(), now);
                }
            }
        }

        self.scheduler.settle(command, now);
    }

    fn run_applied(&mut self, command: Command, applied: Applied, now: Instant) {
        match applied {
            Applied::Catalog => {
                if let Some(effect) = command.effect() {
                    self.state.apply_effect(effect, now);
                }
            }
            Applied::Assign(update) => self.state.apply(update, now),
            Applied::GatedStep => {
                if self.scheduler.was_recently_confirmed() {
                    if let Some(effect) = command.effect() {
                        self.state.apply_effect(effect, now);
                    }
                } else {
                    debug!(command = %command, "volume not confirmed, step not applied");
                }
            }
            Applied::RampStep => {
                if self.scheduler.was_recently_confirmed() {
                    self.ramp.advance(command);
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------------

    fn on_bytes(&mut self, data: &[u8]) {
        trace!(bytes = ?data, "received");
        self.rx_buf.extend_from_slice(data);
        if self.rx_buf.len() > MAX_BUF {
            warn!(len = self.rx_buf.len(), "receive buffer overflow, resetting");
            self.rx_buf.clear();
            return;
        }

        let mut framed = false;
        while let LineResult::Line { text, consumed } = protocol::decode_line(&self.rx_buf) {
            self.rx_buf.drain(..consumed);
            let Some(line) = text else {
                trace!("dropping non-UTF-8 line");
                continue;
            };
            match protocol::decode_status(&line) {
                Some(update) => {
                    debug!(line = %line, "status frame");
                    self.state.heard(update, Instant::now());
                    framed = true;
                }
                None => trace!(line = %line, "dropping unrecognised line"),
            }
        }

        if framed && self.liveness.observe(self.state.last_heard()) {
            self.resolve_pending_power();
        }
    }

    fn expire_poll(&mut self) {
        match self.liveness.expire(self.state.last_heard()) {
            Expiry::Silent => {
                debug!("status request unanswered, appliance is off");
                self.state.apply(StateUpdate::Power(false), Instant::now());
            }
            Expiry::Answered => {}
        }
        self.resolve_pending_power();
    }
}
