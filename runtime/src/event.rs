//! Host-side command lifecycle tracking.
//!
//! Every enqueued command owns an [`Event`] whose status advances
//! `Queued -> Submitted -> Running -> Complete` and never regresses;
//! assigning a state out of order is a programming error and asserts.
//! When the owning queue has profiling enabled, each transition captures a
//! device-timer timestamp.
//!
//! Events are shared between the queue and the caller; a caller-retained
//! handle outlives the command node that created it.

use parking_lot::{Condvar, Mutex};

/// Kind of the command an event monitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    ReadBuffer,
    WriteBuffer,
    ReadImage,
    FillBuffer,
    Run,
}

/// Command execution status, monotonically advancing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CommandStatus {
    Queued,
    Submitted,
    Running,
    Complete,
}

/// Device-timer timestamps of the four lifecycle phases, in nanoseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProfilingTimes {
    pub queued_ns: u64,
    pub submitted_ns: u64,
    pub running_ns: u64,
    pub complete_ns: u64,
}

#[derive(Debug)]
struct EventState {
    status: CommandStatus,
    profile: Option<ProfilingTimes>,
}

/// Lifecycle handle for one enqueued command.
#[derive(Debug)]
pub struct Event {
    kind: CommandKind,
    state: Mutex<EventState>,
    condvar: Condvar,
}

impl Event {
    /// Create an event in the `Queued` state.
    ///
    /// `queued_ns` is `Some` when the owning queue profiles; it seeds the
    /// first timestamp and enables capture of the later ones.
    pub(crate) fn new(kind: CommandKind, queued_ns: Option<u64>) -> Self {
        let profile = queued_ns.map(|queued_ns| ProfilingTimes { queued_ns, ..Default::default() });
        Self {
            kind,
            state: Mutex::new(EventState { status: CommandStatus::Queued, profile }),
            condvar: Condvar::new(),
        }
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// Current status.
    pub fn status(&self) -> CommandStatus {
        self.state.lock().status
    }

    /// Profiling timestamps, if the owning queue profiles.
    ///
    /// Timestamps for phases not yet reached are zero.
    pub fn profile(&self) -> Option<ProfilingTimes> {
        self.state.lock().profile
    }

    /// Block until the command completes.
    pub fn wait(&self) {
        let mut state = self.state.lock();
        while state.status != CommandStatus::Complete {
            self.condvar.wait(&mut state);
        }
    }

    /// Advance the status, capturing a timestamp when profiling.
    ///
    /// # Panics
    ///
    /// Status only moves forward; requesting a non-advancing transition is
    /// an invariant violation.
    pub(crate) fn advance(&self, to: CommandStatus, now_ns: Option<u64>) {
        let mut state = self.state.lock();
        assert!(
            to > state.status,
            "event status may only advance (current {:?}, requested {to:?})",
            state.status
        );
        state.status = to;

        if let Some(profile) = state.profile.as_mut() {
            let stamp = now_ns.unwrap_or_default();
            match to {
                CommandStatus::Queued => unreachable!("events are created queued"),
                CommandStatus::Submitted => profile.submitted_ns = stamp,
                CommandStatus::Running => profile.running_ns = stamp,
                CommandStatus::Complete => profile.complete_ns = stamp,
            }
        }

        if to == CommandStatus::Complete {
            self.condvar.notify_all();
        }
    }
}
