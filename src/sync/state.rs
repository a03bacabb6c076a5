//! Per-root session lifecycle.

use std::fmt;

use parking_lot::Mutex;

use crate::error::SyncError;
use crate::Result;

/// Lifecycle of one watched root.
///
/// `Uninitialized -> Loaded -> Watching <-> Diffing -> Applying -> Watching`,
/// with `Stopped` reachable from anywhere and final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Uninitialized,
    /// A prior snapshot (or the empty sentinel) is in memory.
    Loaded,
    Watching,
    Diffing,
    Applying,
    Stopped,
}

impl SessionState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Loaded => "loaded",
            Self::Watching => "watching",
            Self::Diffing => "diffing",
            Self::Applying => "applying",
            Self::Stopped => "stopped",
        }
    }

    /// Whether `self -> next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use SessionState::{Applying, Diffing, Loaded, Stopped, Uninitialized, Watching};
        matches!(
            (self, next),
            (Uninitialized, Loaded)
                | (Loaded, Watching | Diffing)
                | (Watching, Diffing)
                | (Diffing, Applying | Watching)
                | (Applying, Watching)
                | (Uninitialized | Loaded | Watching | Diffing | Applying, Stopped)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thread-safe holder of a [`SessionState`].
#[derive(Debug)]
pub struct StateCell {
    state: Mutex<SessionState>,
}

impl StateCell {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SessionState::Uninitialized),
        }
    }

    #[must_use]
    pub fn get(&self) -> SessionState {
        *self.state.lock()
    }

    /// Move to `next`, returning the previous state.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::InvalidTransition` if the move is not allowed.
    pub fn transition(&self, next: SessionState) -> Result<SessionState> {
        let mut state = self.state.lock();
        let prev = *state;
        if !prev.can_transition_to(next) {
            return Err(SyncError::InvalidTransition {
                from: prev.as_str(),
                to: next.as_str(),
            }
            .into());
        }
        *state = next;
        tracing::trace!(from = %prev, to = %next, "Session transition");
        Ok(prev)
    }

    /// Enter `Stopped` from any state. Returns the previous state.
    pub fn stop(&self) -> SessionState {
        std::mem::replace(&mut *self.state.lock(), SessionState::Stopped)
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}
