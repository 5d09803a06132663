/// What the station is currently showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Live camera frames, optionally over onion-skin history.
    LiveView,
    /// A snapshot sequence owns the device.
    Capturing,
    /// Reviewing cached frames (manual browse or timed playback).
    Playback,
}

/// Guarded mode holder. Setting the current mode again is a no-op.
///
/// Not synchronized on its own; the session controller keeps it behind the
/// same lock as the frame cache.
#[derive(Debug)]
pub struct ModeStateMachine {
    current: Mode,
}

impl ModeStateMachine {
    pub fn new() -> Self {
        Self {
            current: Mode::LiveView,
        }
    }

    /// Returns `false` and changes nothing when `target` is already current.
    pub fn try_transition(&mut self, target: Mode) -> bool {
        if target == self.current {
            return false;
        }
        tracing::debug!(from = ?self.current, to = ?target, "Mode transition");
        self.current = target;
        true
    }

    pub fn current(&self) -> Mode {
        self.current
    }
}

impl Default for ModeStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
