//! Serial port handling
//!
//! Provides the `serialport`-backed transport used for real gauges.

use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::time::Duration;

use super::{ProtocolError, Transport};

/// Open a serial port at the given baud rate with a fixed read timeout
pub fn open_port(
    name: &str,
    baud_rate: u32,
    timeout: Duration,
) -> Result<Box<dyn SerialPort>, ProtocolError> {
    serialport::new(name, baud_rate)
        .timeout(timeout)
        .open()
        .map_err(|e| ProtocolError::Transport(format!("{}: {}", name, e)))
}

/// Configure a serial port for gauge communication
pub fn configure_port(port: &mut dyn SerialPort) -> Result<(), ProtocolError> {
    // Standard 8N1 configuration, the gauges have no handshake lines
    port.set_data_bits(serialport::DataBits::Eight)?;
    port.set_parity(serialport::Parity::None)?;
    port.set_stop_bits(serialport::StopBits::One)?;
    port.set_flow_control(serialport::FlowControl::None)?;
    Ok(())
}

/// Serial port wrapper implementing [`Transport`]
pub struct SerialTransport {
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    /// Open and configure `name` for 8N1 at `baud_rate`
    pub fn open(name: &str, baud_rate: u32, timeout: Duration) -> Result<Self, ProtocolError> {
        let mut port = open_port(name, baud_rate, timeout)?;
        configure_port(port.as_mut())?;
        tracing::debug!(port = name, baud_rate, "serial port opened");
        Ok(Self::new(port))
    }

    /// Wrap an already opened port
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port: Some(port) }
    }

    fn port(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "serial port closed"))
    }
}

impl Transport for SerialTransport {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let port = self.port()?;
        port.write_all(bytes)?;
        port.flush()
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        let port = self.port()?;
        port.bytes_to_read()
            .map(|n| n as usize)
            .map_err(io::Error::from)
    }

    fn read_available(&mut self) -> io::Result<Vec<u8>> {
        let port = self.port()?;
        let available = port.bytes_to_read().map_err(io::Error::from)? as usize;
        if available == 0 {
            return Ok(Vec::new());
        }

        let mut buffer = vec![0u8; available];
        match port.read(&mut buffer) {
            Ok(n) => {
                buffer.truncate(n);
                Ok(buffer)
            }
            Err(ref e)
                if e.kind() == io::ErrorKind::TimedOut || e.kind() == io::ErrorKind::WouldBlock =>
            {
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        // Dropping the handle releases the device
        if self.port.take().is_some() {
            tracing::debug!("serial port closed");
        }
        Ok(())
    }
}
