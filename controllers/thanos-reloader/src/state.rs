//! Controller state machine.
//!
//! `Starting → Syncing → Watching ⇄ ReloadInFlight → Stopped`
//!
//! A sequence still running at shutdown keeps reporting `ReloadInFlight`
//! until it finishes; the state then settles on `Stopped`.
//!
//! The dispatcher owns the watch phase and the reload worker owns the
//! in-flight flag; both publish into one `tokio::sync::watch` channel so
//! anyone holding a receiver sees a consistent [`ControllerState`].

use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Lifecycle phase of the watch side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Constructed, stream not started.
    Starting,
    /// Initial list in progress.
    Syncing,
    /// Initial list done; following the watch.
    Watching,
    /// Shut down. Terminal.
    Stopped,
}

/// Observable controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Constructed, stream not started.
    Starting,
    /// Waiting for the initial list to complete.
    Syncing,
    /// Steady state.
    Watching,
    /// A reload sequence is running, while watching or after shutdown.
    ReloadInFlight,
    /// Shut down.
    Stopped,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ControllerState::Starting => "Starting",
            ControllerState::Syncing => "Syncing",
            ControllerState::Watching => "Watching",
            ControllerState::ReloadInFlight => "ReloadInFlight",
            ControllerState::Stopped => "Stopped",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Status {
    phase: Phase,
    reload_in_flight: bool,
}

impl Status {
    fn state(self) -> ControllerState {
        match (self.phase, self.reload_in_flight) {
            (Phase::Starting, _) => ControllerState::Starting,
            (Phase::Syncing, _) => ControllerState::Syncing,
            (Phase::Watching, false) => ControllerState::Watching,
            (Phase::Watching, true) => ControllerState::ReloadInFlight,
            (Phase::Stopped, true) => ControllerState::ReloadInFlight,
            (Phase::Stopped, false) => ControllerState::Stopped,
        }
    }
}

/// Shared writer side of the controller state.
#[derive(Debug, Clone)]
pub struct StatusBoard {
    tx: Arc<watch::Sender<Status>>,
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBoard {
    /// Creates a board in the `Starting` state.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Status {
            phase: Phase::Starting,
            reload_in_flight: false,
        });
        Self { tx: Arc::new(tx) }
    }

    /// Current state.
    pub fn state(&self) -> ControllerState {
        self.tx.borrow().state()
    }

    /// Current watch phase.
    pub fn phase(&self) -> Phase {
        self.tx.borrow().phase
    }

    /// Moves the watch side to `phase`. `Stopped` is never left.
    pub fn set_phase(&self, phase: Phase) {
        self.tx.send_if_modified(|status| {
            if status.phase == Phase::Stopped || status.phase == phase {
                return false;
            }
            status.phase = phase;
            true
        });
    }

    /// Records whether a reload sequence is running.
    pub fn set_reload_in_flight(&self, in_flight: bool) {
        self.tx.send_if_modified(|status| {
            if status.reload_in_flight == in_flight {
                return false;
            }
            status.reload_in_flight = in_flight;
            true
        });
    }

    /// Subscribes to state changes.
    pub fn subscribe(&self) -> StateWatch {
        StateWatch {
            rx: self.tx.subscribe(),
        }
    }
}

/// Read side of the controller state.
#[derive(Debug, Clone)]
pub struct StateWatch {
    rx: watch::Receiver<Status>,
}

impl StateWatch {
    /// Current state.
    pub fn current(&self) -> ControllerState {
        self.rx.borrow().state()
    }

    /// Resolves once the initial list has completed.
    ///
    /// Returns `false` if the controller stopped first.
    pub async fn ready(&mut self) -> bool {
        match self
            .rx
            .wait_for(|s| matches!(s.phase, Phase::Watching | Phase::Stopped))
            .await
        {
            Ok(status) => status.phase == Phase::Watching,
            Err(_) => false,
        }
    }
}
