//! Decoder session lifecycle

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a decoder session.
///
/// `Uninitialized → Initialized → Opened → Decoding → Closed`. A session whose
/// container or codec fails moves to `Failed`, which behaves like `Closed` for every
/// call except `close_video()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Uninitialized,
    Initialized,
    Opened,
    Decoding,
    Closed,
    Failed,
}

impl LifecycleState {
    /// Whether `submit()` is accepted in this state.
    pub fn accepts_packets(self) -> bool {
        matches!(
            self,
            LifecycleState::Initialized | LifecycleState::Opened | LifecycleState::Decoding
        )
    }

    /// Whether `decode()` is valid in this state.
    pub fn can_decode(self) -> bool {
        matches!(self, LifecycleState::Opened | LifecycleState::Decoding)
    }

    /// Closed or failed.
    pub fn is_terminal(self) -> bool {
        matches!(self, LifecycleState::Closed | LifecycleState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Uninitialized => "uninitialized",
            LifecycleState::Initialized => "initialized",
            LifecycleState::Opened => "opened",
            LifecycleState::Decoding => "decoding",
            LifecycleState::Closed => "closed",
            LifecycleState::Failed => "failed",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only snapshot of the worker's session aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub state: LifecycleState,
    /// Bytes currently retained by the packet buffer
    pub buffered_bytes: usize,
    /// Bytes acknowledged over the whole session
    pub total_bytes: u64,
    pub frame_width: u32,
    pub frame_height: u32,
    pub decoded_frame_count: u64,
}
