//! Controller errors.
//!
//! Nothing here is fatal: action errors become user notifications, poll
//! errors are logged and healed by the next tick.

use std::fmt;
use vpnctl_net::{BackendError, HttpError};

/// User-triggered action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Connect,
    Disconnect,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Connect => write!(f, "connect"),
            Action::Disconnect => write!(f, "disconnect"),
        }
    }
}

/// Action dispatch errors
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Failed to {action}: {source}")]
    Transport {
        action: Action,
        #[source]
        source: HttpError,
    },

    #[error("Failed to {action}: {reason}")]
    Rejected { action: Action, reason: String },

    #[error("Another {pending} is still in progress")]
    Busy { pending: Action },

    #[error("Backend still reports the tunnel as connected")]
    StillConnected,
}

impl ActionError {
    pub(crate) fn from_backend(action: Action, err: BackendError) -> Self {
        match err {
            BackendError::Transport(source) => ActionError::Transport { action, source },
            BackendError::Rejected(reason) => ActionError::Rejected { action, reason },
        }
    }

    /// The request never reached a backend decision
    pub fn is_transport(&self) -> bool {
        matches!(self, ActionError::Transport { .. })
    }
}

/// Background poll errors
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("Status poll failed: {0}")]
    Status(#[source] BackendError),

    #[error("Catalog refresh failed: {0}")]
    Catalog(#[source] BackendError),

    #[error("No catalog backend configured")]
    NoCatalog,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_mapping() {
        let err = ActionError::from_backend(
            Action::Connect,
            BackendError::Transport(HttpError::ConnectionFailed("refused".into())),
        );
        assert!(err.is_transport());
        assert_eq!(err.to_string(), "Failed to connect: Connection failed: refused");

        let err = ActionError::from_backend(
            Action::Disconnect,
            BackendError::Rejected("disconnect reported failure".into()),
        );
        assert!(!err.is_transport());
        assert_eq!(err.to_string(), "Failed to disconnect: disconnect reported failure");
    }
}
