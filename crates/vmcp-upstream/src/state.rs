//! The Upstream Session state machine (spec §4.1 "States").

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    Disconnected,
    AuthRequired,
    Error,
}

impl SessionState {
    /// `connect()` is valid from any terminal state (spec §4.1).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Idle | Self::Disconnected | Self::AuthRequired | Self::Error
        )
    }

    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}
