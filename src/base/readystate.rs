use serde::Serialize;
use std::fmt;

/// Lifecycle state of a client socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadyState {
    /// Transport handshake in progress.
    #[default]
    Connecting,

    /// Connected; reads and writes are allowed.
    Open,

    /// Graceful close requested; waiting for buffered output to flush.
    Closing,

    /// Terminal.
    Closed,
}

/// Caller operations gated by [`ReadyState::allows`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Send,
    UpgradeToSecure,
    Close,
    CloseImmediately,
    Suspend,
    Resume,
}

impl ReadyState {
    /// Whether `op` has an effect in this state.
    ///
    /// | state      | send | upgrade | close | close_immediately | suspend/resume |
    /// |------------|------|---------|-------|-------------------|----------------|
    /// | Connecting |  -   |    -    |   x   |         x         |       x        |
    /// | Open       |  x   |    x    |   x   |         x         |       x        |
    /// | Closing    |  -   |    -    |   -   |         x         |       x        |
    /// | Closed     |  -   |    -    |   -   |         -         |       -        |
    pub fn allows(self, op: Operation) -> bool {
        use Operation::*;
        match self {
            ReadyState::Connecting => matches!(op, Close | CloseImmediately | Suspend | Resume),
            ReadyState::Open => true,
            ReadyState::Closing => matches!(op, CloseImmediately | Suspend | Resume),
            ReadyState::Closed => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReadyState::Connecting => "connecting",
            ReadyState::Open => "open",
            ReadyState::Closing => "closing",
            ReadyState::Closed => "closed",
        }
    }
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
