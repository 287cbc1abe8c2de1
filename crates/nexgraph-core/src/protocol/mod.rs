//! Serial Protocol Communication
//!
//! Implements the Nextech gauge protocol: single ASCII command bytes with
//! newline-separated ASCII replies and no framing. Reply boundaries are found
//! by waiting a fixed settle delay and then reading until the port is idle.

mod capture;
pub mod commands;
mod connection;
mod error;
pub mod serial;
pub mod stream;

pub use commands::Command;
pub use connection::{
    BaudProfile, ConnectionConfig, ConnectionState, DeviceIdentity, Force, ForceSession, Mode,
    Reply, Session, SessionMode, Torque, TorqueSession,
};
pub use error::ProtocolError;
pub use serial::{configure_port, open_port, SerialTransport};
pub use stream::{decode_chunk, DecodeError, Transport};

/// Baud rate of the fast profile
pub const FAST_BAUD_RATE: u32 = 38400;

/// Baud rate of the slow profile
pub const SLOW_BAUD_RATE: u32 = 9600;

/// Default read timeout of the serial port in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// Default delay between writing a command and reading its reply, in milliseconds
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 100;

/// Default sleep of the capture worker when no bytes are pending, in milliseconds
pub const DEFAULT_IDLE_YIELD_MS: u64 = 10;

/// Default number of decoded chunks the capture queue holds before the worker blocks
pub const DEFAULT_CAPTURE_QUEUE_DEPTH: usize = 64;
