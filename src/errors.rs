use std::time::Duration;

use crate::connection::LinkAction;
use crate::controller::Operation;
use crate::types::ControllerAddress;

/// All error types that can occur when talking to a JellyFish controller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Connecting to (or disconnecting from) the controller failed or timed out.
    ///
    /// The session is flagged for a full reconnect cycle before the next call.
    #[error("failed to {action} controller at {address}: {source}")]
    Connection {
        address: ControllerAddress,
        action: LinkAction,
        #[source]
        source: TransportError,
    },

    /// A device operation failed after a connection was established.
    #[error(
        "{operation} failed for zones [{}] on controller at {address}: {source}",
        .zones.join(", ")
    )]
    Command {
        address: ControllerAddress,
        operation: Operation,
        zones: Vec<String>,
        #[source]
        source: TransportError,
    },

    /// A run-state response matched neither classification branch cleanly.
    ///
    /// Only ever logged; the zone falls back to the pattern/off classification.
    #[error("ambiguous run state for zone '{zone}': {reason}")]
    ClassificationAmbiguous { zone: String, reason: String },

    /// A command resolved to an empty zone list before any I/O was issued.
    #[error("no zones known for controller at {0}; refresh before issuing commands")]
    NoZones(ControllerAddress),

    /// The client was shut down and no longer talks to the controller.
    #[error("client for controller at {0} has been shut down")]
    Shutdown(ControllerAddress),

    /// Failed to deserialize a raw run-state record.
    #[error("failed to load json: {0:?}")]
    JsonLoad(serde_json::Error),

    /// Failed to parse a [`crate::Color`] from a string.
    #[error("invalid color string: {0}")]
    InvalidColorString(String),
}

impl Error {
    /// Create a new connection error
    pub fn connection(address: &ControllerAddress, action: LinkAction, source: TransportError) -> Self {
        Error::Connection {
            address: address.clone(),
            action,
            source,
        }
    }

    /// Create a new command error
    pub fn command(
        address: &ControllerAddress,
        operation: Operation,
        zones: &[String],
        source: TransportError,
    ) -> Self {
        Error::Command {
            address: address.clone(),
            operation,
            zones: zones.to_vec(),
            source,
        }
    }

    /// Create a new ambiguous classification signal
    pub fn classification_ambiguous(zone: &str, reason: &str) -> Self {
        Error::ClassificationAmbiguous {
            zone: zone.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether this failure came from talking to the device (and so flags a reconnect).
    pub fn is_device_failure(&self) -> bool {
        matches!(self, Error::Connection { .. } | Error::Command { .. })
    }
}

/// Failures reported by a [`crate::Transport`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The underlying socket failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The call did not complete within its deadline.
    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    /// The handle has no open session.
    #[error("not connected")]
    NotConnected,

    /// The controller answered with something the handle could not use.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl TransportError {
    /// Create a new protocol error
    pub fn protocol(reason: &str) -> Self {
        TransportError::Protocol(reason.to_string())
    }
}

/// Hacky implementation of PartialEq for testing
#[cfg(test)]
impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}
