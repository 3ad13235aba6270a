use crate::base::classify::ClassifiedError;
use crate::base::neterror::NetError;
use crate::base::readystate::ReadyState;
use thiserror::Error;

/// Errors returned by the socket API.
///
/// Usage errors are raised synchronously when an operation is invalid for
/// the socket's current state. Transport failures always arrive already
/// classified.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SocketError {
    #[error("Socket is not open (state: {state})")]
    NotOpen { state: ReadyState },
    #[error("A read is already pending on this socket")]
    ReadPending,
    #[error("Range {offset}+{length} is out of bounds for a {size} byte chunk")]
    InvalidRange { offset: usize, length: usize, size: usize },
    #[error("Failed to bind: {0}")]
    Bind(ClassifiedError),
    #[error("{0}")]
    Transport(ClassifiedError),
}

impl SocketError {
    /// The classified `{category, name}` pair for transport failures.
    pub fn classified(&self) -> Option<&ClassifiedError> {
        match self {
            SocketError::Bind(err) | SocketError::Transport(err) => Some(err),
            _ => None,
        }
    }

    /// True for errors caused by the caller's call pattern.
    pub fn is_usage_error(&self) -> bool {
        self.classified().is_none()
    }
}

impl From<ClassifiedError> for SocketError {
    fn from(err: ClassifiedError) -> Self {
        SocketError::Transport(err)
    }
}

impl From<NetError> for SocketError {
    fn from(err: NetError) -> Self {
        SocketError::Transport(ClassifiedError::from(err))
    }
}
