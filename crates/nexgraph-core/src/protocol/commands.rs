//! Protocol commands
//!
//! Defines the single-byte commands understood by Nextech gauges.

use serde::{Deserialize, Serialize};

/// Protocol commands for gauge communication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    /// Identify: model, offset, overload counter ('!')
    Info,

    /// Print the current or max value ('x')
    Print,

    /// Current peak tension ('p')
    PeakTension,

    /// Current peak compression ('c')
    PeakCompression,

    /// Current value, long format ('l')
    LongOutput,

    /// Current value, short format ('v')
    ShortOutput,

    /// Current value, mini format ('L')
    MiniOutput,

    /// Dump stored memory ('d')
    Download,

    /// Zero / tare ('z')
    Zero,

    /// Reset stored values ('r')
    Reset,

    /// Cycle unit of measurement ('u')
    Unit,

    /// Toggle track / peak mode ('m')
    Mode,
}

impl Command {
    /// Every command, in protocol table order
    pub const ALL: [Command; 12] = [
        Command::Info,
        Command::Print,
        Command::PeakTension,
        Command::PeakCompression,
        Command::LongOutput,
        Command::ShortOutput,
        Command::MiniOutput,
        Command::Download,
        Command::Zero,
        Command::Reset,
        Command::Unit,
        Command::Mode,
    ];

    /// Get the byte sent on the wire
    pub fn byte(&self) -> u8 {
        match self {
            Command::Info => b'!',
            Command::Print => b'x',
            Command::PeakTension => b'p',
            Command::PeakCompression => b'c',
            Command::LongOutput => b'l',
            Command::ShortOutput => b'v',
            Command::MiniOutput => b'L',
            Command::Download => b'd',
            Command::Zero => b'z',
            Command::Reset => b'r',
            Command::Unit => b'u',
            Command::Mode => b'm',
        }
    }

    /// Look up a command from its wire byte
    pub fn from_byte(byte: u8) -> Option<Command> {
        Command::ALL.into_iter().find(|c| c.byte() == byte)
    }

    /// Check if the gauge answers this command with text
    pub fn expects_response(&self) -> bool {
        !matches!(
            self,
            Command::Zero | Command::Reset | Command::Unit | Command::Mode
        )
    }
}
