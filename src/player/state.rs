use std::sync::{
    Arc,
    atomic::{AtomicU8, Ordering},
};

use serde::Serialize;

/// Lifecycle of one playback session. `Disconnected` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[repr(u8)]
pub enum SessionState {
    Idle = 0,
    Joining = 1,
    Speaking = 2,
    Draining = 3,
    Disconnected = 4,
}

impl SessionState {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Idle,
            1 => Self::Joining,
            2 => Self::Speaking,
            3 => Self::Draining,
            _ => Self::Disconnected,
        }
    }

    /// Whether a session in this state still holds its destination.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Joining | Self::Speaking | Self::Draining)
    }
}

/// Shared view of a session's state, readable from any thread.
#[derive(Clone, Debug)]
pub struct StateCell(Arc<AtomicU8>);

impl StateCell {
    pub fn new(state: SessionState) -> Self {
        Self(Arc::new(AtomicU8::new(state as u8)))
    }

    pub fn get(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, state: SessionState) {
        self.0.store(state as u8, Ordering::Release);
    }
}
