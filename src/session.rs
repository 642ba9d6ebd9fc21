use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

/// Identifies one target document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Plain copy of a session's flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionFlags {
    pub attached: bool,
    pub running: bool,
    pub stop_requested: bool,
    pub paused: bool,
}

/// Control state for one target document.
///
/// Every operation is a single atomic store or swap; none of them block, so
/// they are safe to call from a signal handler thread as well as from tasks.
#[derive(Debug, Default)]
pub struct Session {
    attached: AtomicBool,
    running: AtomicBool,
    stop_requested: AtomicBool,
    paused: AtomicBool,
    epoch: AtomicU64,
}

impl Session {
    pub fn attach(&self) {
        self.attached.store(true, Ordering::SeqCst);
    }

    pub fn detach(&self) {
        self.attached.store(false, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        self.stop_requested.store(false, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
        // Orphan any run still in flight.
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// A stop always cancels a pending pause.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    /// Returns the new `paused` value.
    pub fn toggle_pause(&self) -> bool {
        !self.paused.fetch_xor(true, Ordering::SeqCst)
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> SessionFlags {
        SessionFlags {
            attached: self.is_attached(),
            running: self.is_running(),
            stop_requested: self.stop_requested(),
            paused: self.is_paused(),
        }
    }

    /// Claim the session for a new run and clear any earlier stop request.
    ///
    /// Returns the run's epoch, or `None` if a run is already active.
    pub(crate) fn begin_run(&self) -> Option<u64> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        self.stop_requested.store(false, Ordering::SeqCst);
        Some(self.epoch.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Release the session, unless a detach or newer run has taken it over.
    pub(crate) fn end_run(&self, epoch: u64) {
        if self.epoch.load(Ordering::SeqCst) == epoch {
            self.running.store(false, Ordering::SeqCst);
        }
    }
}

/// All sessions, keyed by document identifier.
///
/// Sessions are created on first reference and never removed; detaching only
/// resets their flags.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &SessionId) -> Arc<Session> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.entry(id.clone()).or_default().clone()
    }

    pub fn ids(&self) -> Vec<SessionId> {
        let sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<_> = sessions.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Ask every running session to stop at its next checkpoint.
    pub fn request_stop_all(&self) {
        let sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        for session in sessions.values().filter(|s| s.is_running()) {
            session.request_stop();
        }
    }
}
