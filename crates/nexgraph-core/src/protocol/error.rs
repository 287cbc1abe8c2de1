//! Protocol errors

use thiserror::Error;

use super::{Command, SessionMode};
use crate::export::ExportError;

/// Errors that can occur during gauge communication
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Invalid connection settings
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No transport is open
    #[error("Not connected to gauge")]
    NotConnected,

    /// A transport is already open
    #[error("Already connected")]
    AlreadyConnected,

    /// The port failed to open, read or write
    #[error("Transport error: {0}")]
    Transport(String),

    /// The session mode does not allow this command
    #[error("Command {command:?} is not available in {mode:?} mode")]
    ModeMismatch {
        /// Rejected command
        command: Command,
        /// Mode of the session
        mode: SessionMode,
    },

    /// The capture worker owns the transport
    #[error("A torque capture is running; stop it before sending commands")]
    CaptureActive,

    /// Stop requested with no capture running
    #[error("No torque capture is running")]
    CaptureNotRunning,

    /// Downloaded data could not be exported
    #[error(transparent)]
    Export(#[from] ExportError),
}

impl From<std::io::Error> for ProtocolError {
    fn from(e: std::io::Error) -> Self {
        ProtocolError::Transport(e.to_string())
    }
}

impl From<serialport::Error> for ProtocolError {
    fn from(e: serialport::Error) -> Self {
        ProtocolError::Transport(e.to_string())
    }
}

impl ProtocolError {
    /// Whether the error came from the port itself rather than from the caller
    pub fn is_transport(&self) -> bool {
        matches!(self, ProtocolError::Transport(_))
    }
}
