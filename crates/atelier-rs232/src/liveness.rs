//! Liveness detection.
//!
//! A powered-off appliance is silent, so the only way to learn that it is
//! off is to ask for its status and hear nothing back. The detector decides
//! when the believed state is stale enough to poll, and judges the poll
//! once its timer runs out.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// Age after which the believed state is refreshed.
pub const DEFAULT_STALENESS_THRESHOLD: Duration = Duration::from_secs(60);

/// How long a status request may go unanswered before the appliance is
/// considered off.
pub const DEFAULT_LIVENESS_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// No poll outstanding.
    Fresh,
    /// A status request is queued but not yet written.
    Polling,
    /// The status request was written; waiting for any frame. `baseline`
    /// is the last frame time when the request went out.
    Awaiting {
        baseline: Option<Instant>,
        deadline: Instant,
    },
}

/// How an outstanding poll ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Nothing arrived. The appliance is off.
    Silent,
    /// A frame arrived during the wait.
    Answered,
}

/// Staleness is judged on `last_updated`, which local writes also stamp.
/// Polls are judged only on the time of the last frame heard from the
/// appliance.
#[derive(Debug)]
pub struct LivenessDetector {
    state: Liveness,
    staleness_threshold: Duration,
    timeout: Duration,
}

impl LivenessDetector {
    pub fn new(staleness_threshold: Duration, timeout: Duration) -> Self {
        LivenessDetector {
            state: Liveness::Fresh,
            staleness_threshold,
            timeout,
        }
    }

    pub fn state(&self) -> Liveness {
        self.state
    }

    /// Whether a poll is queued or awaiting its answer.
    pub fn is_polling(&self) -> bool {
        self.state != Liveness::Fresh
    }

    /// The instant the outstanding poll times out, if it has been written.
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            Liveness::Awaiting { deadline, .. } => Some(deadline),
            _ => None,
        }
    }

    /// Start a poll if the state is stale. Returns `true` when the caller
    /// must queue a status request.
    pub fn check(&mut self, last_updated: Option<Instant>, now: Instant) -> bool {
        if self.state != Liveness::Fresh {
            return false;
        }
        let stale = match last_updated {
            Some(at) => now.saturating_duration_since(at) > self.staleness_threshold,
            None => true,
        };
        if stale {
            debug!(?last_updated, "state is stale, polling");
            self.state = Liveness::Polling;
        }
        stale
    }

    /// The status request was written (or failed to be). Takes the
    /// baseline from `last_heard` and arms the timer.
    pub fn armed(&mut self, last_heard: Option<Instant>, now: Instant) {
        self.state = Liveness::Awaiting {
            baseline: last_heard,
            deadline: now + self.timeout,
        };
    }

    /// A frame was heard. Resolves a queued poll outright, and a written one
    /// if `last_heard` moved off its baseline. Returns `true` if the poll
    /// was resolved.
    pub fn observe(&mut self, last_heard: Option<Instant>) -> bool {
        let resolved = match self.state {
            Liveness::Fresh => false,
            Liveness::Polling => true,
            Liveness::Awaiting { baseline, .. } => last_heard != baseline,
        };
        if resolved {
            debug!("liveness poll answered");
            self.state = Liveness::Fresh;
        }
        resolved
    }

    /// The deadline passed. Judge the poll and return to `Fresh`.
    pub fn expire(&mut self, last_heard: Option<Instant>) -> Expiry {
        let Liveness::Awaiting { baseline, .. } = self.state else {
            self.state = Liveness::Fresh;
            return Expiry::Answered;
        };
        self.state = Liveness::Fresh;
        if last_heard == baseline {
            Expiry::Silent
        } else {
            Expiry::Answered
        }
    }
}
