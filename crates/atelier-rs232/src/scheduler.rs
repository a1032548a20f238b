//! The strictly sequential command queue.
//!
//! The appliance cannot take a second command while it is still applying
//! the first, and it never acknowledges a write directly. The scheduler
//! therefore spaces dispatches by a fixed settle delay and keeps a short
//! write history from which the IO task infers whether the front panel has
//! caught up with the volume commands it was sent.
//!
//! Nothing here performs I/O or reads the clock. The IO task passes the
//! current instant in, which keeps every timing rule testable with plain
//! arithmetic on [`Instant`]s.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::commands::Command;
use crate::state::StateUpdate;

/// Settle delay after an ordinary command.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Settle delay after a status request. The appliance needs several seconds
/// to emit all of its status lines.
pub const DEFAULT_STATUS_SETTLE_DELAY: Duration = Duration::from_secs(3);

/// Window within which two volume commands count as one front-panel session.
pub const DEFAULT_DISPLAY_REFRESH_WINDOW: Duration = Duration::from_secs(3);

const HISTORY_LEN: usize = 2;

/// What to do with the believed state once a write has been acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Run the command's catalog effect.
    Catalog,
    /// Write an absolute value.
    Assign(StateUpdate),
    /// Step the volume by the command's effect, but only if the device was
    /// recently confirmed to be showing the volume.
    GatedStep,
    /// Advance the ramp's believed volume, gated like [`Applied::GatedStep`].
    RampStep,
}

/// How the IO task executes a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Write the entry's command once.
    Write(Option<Applied>),
    /// Compare the ramp's believed volume with its target and step once.
    RampIteration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueEntry {
    pub command: Command,
    pub action: Action,
}

impl QueueEntry {
    pub fn write(command: Command, applied: Option<Applied>) -> Self {
        QueueEntry {
            command,
            action: Action::Write(applied),
        }
    }

    pub fn ramp_iteration() -> Self {
        QueueEntry {
            command: Command::VolumeUp,
            action: Action::RampIteration,
        }
    }
}

/// One successful write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteRecord {
    pub command: Command,
    pub at: Instant,
}

/// Timing parameters of the scheduler.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub settle_delay: Duration,
    pub status_settle_delay: Duration,
    pub display_refresh_window: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            settle_delay: DEFAULT_SETTLE_DELAY,
            status_settle_delay: DEFAULT_STATUS_SETTLE_DELAY,
            display_refresh_window: DEFAULT_DISPLAY_REFRESH_WINDOW,
        }
    }
}

pub struct Scheduler {
    config: SchedulerConfig,
    queue: VecDeque<QueueEntry>,
    /// Newest first.
    history: VecDeque<WriteRecord>,
    ready_at: Option<Instant>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Scheduler {
            config,
            queue: VecDeque::new(),
            history: VecDeque::with_capacity(HISTORY_LEN),
            ready_at: None,
        }
    }

    /// Append a single write.
    pub fn enqueue(&mut self, command: Command, applied: Option<Applied>) {
        self.enqueue_entry(QueueEntry::write(command, applied));
    }

    pub fn enqueue_entry(&mut self, entry: QueueEntry) {
        debug!(command = %entry.command, action = ?entry.action, "enqueued");
        self.queue.push_back(entry);
    }

    /// Insert an entry ahead of everything already queued.
    pub fn push_front(&mut self, entry: QueueEntry) {
        self.queue.push_front(entry);
    }

    /// Whether an entry for `command` is still waiting to be dispatched.
    pub fn is_enqueued(&self, command: Command) -> bool {
        self.queue.iter().any(|e| e.command == command)
    }

    pub fn history(&self) -> impl Iterator<Item = &WriteRecord> {
        self.history.iter()
    }

    /// Whether the two most recent writes were volume commands issued
    /// within the display refresh window of each other.
    pub fn was_recently_confirmed(&self) -> bool {
        match (self.history.front(), self.history.get(1)) {
            (Some(newest), Some(older)) => {
                newest.command.is_volume()
                    && older.command.is_volume()
                    && newest.at.saturating_duration_since(older.at)
                        < self.config.display_refresh_window
            }
            _ => false,
        }
    }

    /// Whether a write of `command` at `now` would only wake the front
    /// panel up. Must be asked before the write is recorded.
    ///
    /// The first volume command after a pause switches the display to the
    /// volume readout without changing the volume, so its applied effect
    /// must be skipped.
    pub fn is_display_wakeup(&self, command: Command, now: Instant) -> bool {
        if !command.is_volume() {
            return false;
        }
        match self.history.front() {
            Some(prev) => {
                !prev.command.is_volume()
                    || now.saturating_duration_since(prev.at) > self.config.display_refresh_window
            }
            None => true,
        }
    }

    /// Record a successful write.
    pub fn record_write(&mut self, command: Command, at: Instant) {
        if self.history.len() == HISTORY_LEN {
            self.history.pop_back();
        }
        self.history.push_front(WriteRecord { command, at });
    }

    /// Block further dispatch until the settle delay for `command` has
    /// passed since `completed_at`. Called for failed writes too.
    pub fn settle(&mut self, command: Command, completed_at: Instant) {
        let delay = if command == Command::TransmitStatus {
            self.config.status_settle_delay
        } else {
            self.config.settle_delay
        };
        self.ready_at = Some(completed_at + delay);
    }

    /// When the front entry may be dispatched, or `None` if the queue is
    /// empty.
    pub fn next_due(&self, now: Instant) -> Option<Instant> {
        if self.queue.is_empty() {
            return None;
        }
        Some(match self.ready_at {
            Some(ready) if ready > now => ready,
            _ => now,
        })
    }

    /// Take the front entry if it is due.
    pub fn pop(&mut self, now: Instant) -> Option<QueueEntry> {
        match self.ready_at {
            Some(ready) if ready > now => None,
            _ => self.queue.pop_front(),
        }
    }
}
