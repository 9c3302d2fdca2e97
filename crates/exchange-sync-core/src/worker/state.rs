//! Worker-local mutable state (spec.md §9: "Replacing worker-local mutable
//! state with message passing"). Owned exclusively by the command-
//! processing task; nothing outside this module ever mutates it directly.

use std::time::{Duration, Instant};

use crate::config::ExchangeConfig;
use crate::model::Identity;
use crate::poll::PollState;

/// spec.md §4.F state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    Unregistered,
    Bootstrapping,
    Steady,
    Degraded,
    ShuttingDown,
}

/// `(lastSuccessAt, failedFlag, graceSeconds)` (spec.md §3 HeartbeatState).
/// In-memory only.
#[derive(Debug)]
pub struct HeartbeatState {
    last_success_at: Instant,
    failed: bool,
    grace: Duration,
}

impl HeartbeatState {
    pub fn new(grace: Duration) -> Self {
        HeartbeatState {
            last_success_at: Instant::now(),
            failed: false,
            grace,
        }
    }

    /// Returns `true` if this success is a `failed → success` edge
    /// (spec.md §8: "`HEARTBEAT_RESTORED` is emitted iff the previous state
    /// was `failed`").
    pub fn record_success(&mut self) -> bool {
        let was_failed = self.failed;
        self.failed = false;
        self.last_success_at = Instant::now();
        was_failed
    }

    /// Returns `true` if this failure is the edge that flips the flag
    /// (spec.md §8: "`HEARTBEAT_FAILED` is emitted iff ... the streak of
    /// consecutive failures since the last success exceeds `graceSeconds`").
    pub fn record_failure(&mut self, now: Instant) -> bool {
        if self.failed {
            return false;
        }
        if now.duration_since(self.last_success_at) > self.grace {
            self.failed = true;
            true
        } else {
            false
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }
}

pub struct WorkerState {
    pub phase: WorkerPhase,
    pub identity: Option<Identity>,
    pub cursor: u64,
    pub poll: PollState,
    pub heartbeat: Option<HeartbeatState>,
    pub last_tick_at: Instant,
    /// Single-slot guard (spec.md §9 "Cursor race on concurrent early-
    /// dispatch"): only one in-flight fetch-and-dispatch per worker.
    pub tick_in_flight: bool,
}

impl WorkerState {
    pub fn new(config: &ExchangeConfig) -> Self {
        WorkerState {
            phase: WorkerPhase::Unregistered,
            identity: None,
            cursor: 0,
            poll: PollState::new(
                config.exchange_poll_interval_sec,
                config.exchange_poll_max_interval_sec,
                config.exchange_poll_increment_sec,
                config.exchange_message_dynamic_poll,
            ),
            heartbeat: None,
            last_tick_at: Instant::now(),
            tick_in_flight: false,
        }
    }

    /// Resumes a previously-registered identity after a process restart
    /// (spec.md §3: "changeID and PollState live for the lifetime of the
    /// agent process and outlive single restarts via the Cursor Store").
    pub fn resume(&mut self, identity: Identity, cursor: u64, grace: Duration) {
        self.identity = Some(identity);
        self.cursor = cursor;
        self.heartbeat = Some(HeartbeatState::new(grace));
        self.phase = WorkerPhase::Steady;
    }

    pub fn heartbeat_mut(&mut self) -> &mut HeartbeatState {
        self.heartbeat
            .get_or_insert_with(|| HeartbeatState::new(Duration::from_secs(120)))
    }
}
