//! Connection management
//!
//! Handles the session lifecycle and command execution with the gauge.

use serde::{Deserialize, Serialize};
use std::fs;
use std::marker::PhantomData;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::capture::CaptureWorker;
use super::{
    decode_chunk, Command, ProtocolError, SerialTransport, Transport, DEFAULT_CAPTURE_QUEUE_DEPTH,
    DEFAULT_IDLE_YIELD_MS, DEFAULT_SETTLE_DELAY_MS, DEFAULT_TIMEOUT_MS, FAST_BAUD_RATE,
    SLOW_BAUD_RATE,
};
use crate::export::{self, Export, ExportFormat};
use crate::torque::CaptureSummary;

/// Measurement family a session talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionMode {
    /// DFS force gauges: identified at connect, full command set
    Force,
    /// DFT torque gauges: never identified, streamed capture only
    Torque,
}

/// Serial speed, fixed for the lifetime of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaudProfile {
    /// 38400 baud
    #[default]
    Fast,
    /// 9600 baud
    Slow,
}

impl BaudProfile {
    /// Get the baud rate of this profile
    pub fn baud_rate(&self) -> u32 {
        match self {
            BaudProfile::Fast => FAST_BAUD_RATE,
            BaudProfile::Slow => SLOW_BAUD_RATE,
        }
    }
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No transport held
    Disconnected,
    /// Transport open, identification not (yet) successful
    Connecting,
    /// Force gauge answered the identification request
    Identified,
    /// Torque session ready for capture
    Active,
}

/// Connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Serial port name (e.g. "/dev/ttyUSB0" or "COM3")
    pub port_name: String,
    /// Baud profile
    pub baud: BaudProfile,
    /// Serial read timeout in milliseconds
    pub read_timeout_ms: u64,
    /// Wait between writing a command and polling for its reply
    pub settle_delay_ms: u64,
    /// Capture worker sleep when the port is idle
    pub idle_yield_ms: u64,
    /// Decoded chunks buffered between the capture worker and the stitcher
    pub capture_queue_depth: usize,
    /// Reject identification lines whose model token lacks a known prefix
    pub require_model_prefix: bool,
    /// Model prefixes accepted when `require_model_prefix` is set
    pub model_prefixes: Vec<String>,
    /// Output delimiter for delimited exports
    pub delimiter: char,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud: BaudProfile::Fast,
            read_timeout_ms: DEFAULT_TIMEOUT_MS,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            idle_yield_ms: DEFAULT_IDLE_YIELD_MS,
            capture_queue_depth: DEFAULT_CAPTURE_QUEUE_DEPTH,
            require_model_prefix: false,
            model_prefixes: vec!["DFS".to_string(), "DFT".to_string()],
            delimiter: ',',
        }
    }
}

impl ConnectionConfig {
    /// Default configuration for the given port
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            ..Self::default()
        }
    }

    /// Load a configuration from a JSON file; missing keys take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ProtocolError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| ProtocolError::Configuration(format!("{}: {}", path.display(), e)))?;
        let config: ConnectionConfig = serde_json::from_str(&content)
            .map_err(|e| ProtocolError::Configuration(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the parameters needed to open a port
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.port_name.trim().is_empty() {
            return Err(ProtocolError::Configuration(
                "the device connection path is empty".to_string(),
            ));
        }
        if self.capture_queue_depth == 0 {
            return Err(ProtocolError::Configuration(
                "capture_queue_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Read timeout as a [`Duration`]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Settle delay as a [`Duration`]
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Idle yield as a [`Duration`]
    pub fn idle_yield(&self) -> Duration {
        Duration::from_millis(self.idle_yield_ms)
    }
}

/// Gauge identification taken from the first line of the `Info` reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Model number, e.g. "DFS-50"
    pub model_token: String,
    /// Current offset
    pub offset: String,
    /// Overload counter (empty when the gauge omits it)
    pub overload_counter: String,
    /// The identification line without its terminator
    pub raw: String,
}

impl DeviceIdentity {
    /// Parse an identification line; at least two whitespace tokens are required
    pub fn parse(line: &str) -> Option<Self> {
        let raw = line.trim_end_matches(['\r', '\n']);
        let tokens: Vec<&str> = raw.split_whitespace().collect();
        if tokens.len() < 2 {
            return None;
        }

        Some(Self {
            model_token: tokens[0].to_string(),
            offset: tokens[1].to_string(),
            overload_counter: tokens.get(2).map(|t| t.to_string()).unwrap_or_default(),
            raw: raw.to_string(),
        })
    }

    /// Whether the model token contains any of `prefixes`
    pub fn has_model_prefix<I, S>(&self, prefixes: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        prefixes
            .into_iter()
            .any(|p| self.model_token.contains(p.as_ref()))
    }
}

/// Text returned by a query.
///
/// `Empty` means the gauge sent nothing before the port went idle. It is not
/// an error: slow or bursty replies can be truncated to nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Decoded reply text
    Data(String),
    /// Nothing arrived
    Empty,
}

impl Reply {
    fn from_text(text: String) -> Self {
        if text.is_empty() {
            Reply::Empty
        } else {
            Reply::Data(text)
        }
    }

    /// Check if nothing arrived
    pub fn is_empty(&self) -> bool {
        matches!(self, Reply::Empty)
    }

    /// Reply text, empty for [`Reply::Empty`]
    pub fn text(&self) -> &str {
        match self {
            Reply::Data(text) => text,
            Reply::Empty => "",
        }
    }

    /// Consume into the reply text
    pub fn into_text(self) -> String {
        match self {
            Reply::Data(text) => text,
            Reply::Empty => String::new(),
        }
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Force {}
    impl Sealed for super::Torque {}
}

/// Type-level session mode
pub trait Mode: sealed::Sealed + Send + 'static {
    /// Runtime value of this mode
    const KIND: SessionMode;

    /// Whether `command` may be sent to a gauge in this mode
    fn permits(command: Command) -> bool;
}

/// Marker for force gauge sessions
#[derive(Debug, Clone, Copy)]
pub struct Force;

/// Marker for torque gauge sessions
#[derive(Debug, Clone, Copy)]
pub struct Torque;

impl Mode for Force {
    const KIND: SessionMode = SessionMode::Force;

    fn permits(_command: Command) -> bool {
        true
    }
}

impl Mode for Torque {
    const KIND: SessionMode = SessionMode::Torque;

    fn permits(_command: Command) -> bool {
        // Torque gauges only stream; the command set belongs to force gauges
        false
    }
}

/// Session with a force gauge
pub type ForceSession = Session<Force>;

/// Session with a torque gauge
pub type TorqueSession = Session<Torque>;

/// Gauge session.
///
/// Commands are strictly sequential: one write, one settle delay, one idle
/// read. While a torque capture runs the transport is owned by the capture
/// worker, so command dispatch fails with [`ProtocolError::CaptureActive`].
pub struct Session<M: Mode> {
    /// Transport handle, `None` when disconnected or while capturing
    transport: Option<Box<dyn Transport>>,
    /// Running torque capture
    capture: Option<CaptureWorker>,
    /// Current connection state
    state: ConnectionState,
    /// Connection configuration
    config: ConnectionConfig,
    /// Identification (force sessions, after a successful handshake)
    identity: Option<DeviceIdentity>,
    /// Metrics: cumulative bytes sent & received
    tx_bytes: u64,
    rx_bytes: u64,
    _mode: PhantomData<M>,
}

impl<M: Mode> Session<M> {
    /// Create a new session (not yet connected)
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            transport: None,
            capture: None,
            state: ConnectionState::Disconnected,
            config,
            identity: None,
            tx_bytes: 0,
            rx_bytes: 0,
            _mode: PhantomData,
        }
    }

    /// Get the session's mode
    pub fn session_mode(&self) -> SessionMode {
        M::KIND
    }

    /// Get current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Get the configuration
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Check whether a transport is held (directly or by a running capture)
    pub fn is_connected(&self) -> bool {
        self.transport.is_some() || self.capture.is_some()
    }

    /// Get cumulative tx/rx byte counters
    pub fn get_counters(&self) -> (u64, u64) {
        (self.tx_bytes, self.rx_bytes)
    }

    /// Open the configured serial port and, for force sessions, identify the gauge.
    ///
    /// Returns `Ok(false)` when the port opened but identification fell short;
    /// the port then stays open and the caller may retry or disconnect.
    pub fn connect(&mut self) -> Result<bool, ProtocolError> {
        if self.is_connected() {
            return Err(ProtocolError::AlreadyConnected);
        }
        self.config.validate()?;

        self.state = ConnectionState::Connecting;
        let transport = match SerialTransport::open(
            &self.config.port_name,
            self.config.baud.baud_rate(),
            self.config.read_timeout(),
        ) {
            Ok(transport) => transport,
            Err(e) => {
                warn!(port = %self.config.port_name, error = %e, "failed to open gauge port");
                self.state = ConnectionState::Disconnected;
                return Err(e);
            }
        };

        self.begin(Box::new(transport))
    }

    /// Like [`Session::connect`], over a transport the caller already opened
    pub fn attach(&mut self, transport: impl Transport + 'static) -> Result<bool, ProtocolError> {
        if self.is_connected() {
            return Err(ProtocolError::AlreadyConnected);
        }

        self.state = ConnectionState::Connecting;
        self.begin(Box::new(transport))
    }

    fn begin(&mut self, transport: Box<dyn Transport>) -> Result<bool, ProtocolError> {
        self.transport = Some(transport);
        match M::KIND {
            SessionMode::Force => self.handshake(),
            SessionMode::Torque => {
                debug!("torque session active, no identification");
                self.state = ConnectionState::Active;
                Ok(true)
            }
        }
    }

    /// Send `Info` and identify the gauge from the first reply line
    fn handshake(&mut self) -> Result<bool, ProtocolError> {
        let line = match self.read_identification_line() {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "identification failed at transport level");
                self.release_transport();
                return Err(e);
            }
        };

        let Some(line) = line else {
            warn!("gauge sent no identification reply");
            return Ok(false);
        };

        let Some(identity) = DeviceIdentity::parse(&line) else {
            warn!(line = %line.trim_end(), "identification reply has too few tokens");
            return Ok(false);
        };

        if self.config.require_model_prefix
            && !identity.has_model_prefix(&self.config.model_prefixes)
        {
            warn!(model = %identity.model_token, "unrecognized gauge model");
            return Ok(false);
        }

        debug!(model = %identity.model_token, offset = %identity.offset, "gauge identified");
        self.identity = Some(identity);
        self.state = ConnectionState::Identified;
        Ok(true)
    }

    /// Write `Info` and read one `\n` terminated line, or what arrived before the read timeout.
    ///
    /// Whatever follows the line is drained so it cannot leak into the next reply.
    fn read_identification_line(&mut self) -> Result<Option<String>, ProtocolError> {
        let settle = self.config.settle_delay();
        let idle = self.config.idle_yield();
        let timeout = self.config.read_timeout();
        let port = self.transport.as_mut().ok_or(ProtocolError::NotConnected)?;

        port.write(&[Command::Info.byte()])?;
        self.tx_bytes = self.tx_bytes.saturating_add(1);
        std::thread::sleep(settle);

        let deadline = Instant::now() + timeout;
        let mut buffer: Vec<u8> = Vec::new();
        let mut received = 0usize;

        while !buffer.contains(&b'\n') {
            if Instant::now() >= deadline {
                break;
            }
            if port.bytes_available()? == 0 {
                std::thread::sleep(idle);
                continue;
            }
            let bytes = port.read_available()?;
            if bytes.is_empty() {
                std::thread::sleep(idle);
                continue;
            }
            received += bytes.len();
            buffer.extend_from_slice(&bytes);
        }

        let line_end = buffer.iter().position(|&b| b == b'\n');
        let residue = match line_end {
            Some(end) => buffer.len() - end - 1,
            None => 0,
        };
        let drained = drain_pending(port)?;
        received += drained;
        let discarded = residue + drained;
        self.rx_bytes = self.rx_bytes.saturating_add(received as u64);
        if discarded > 0 {
            debug!(discarded, "dropped bytes after identification line");
        }

        if buffer.is_empty() {
            return Ok(None);
        }
        // A line cut off by the timeout is still a line
        let line = match line_end {
            Some(end) => &buffer[..end],
            None => {
                warn!(len = buffer.len(), "identification line not terminated before timeout");
                &buffer[..]
            }
        };

        match decode_chunk(line) {
            Ok(text) => Ok(Some(text.trim_end_matches('\r').to_string())),
            Err(e) => {
                warn!(error = %e, "identification reply is not text");
                Ok(None)
            }
        }
    }

    fn check_dispatch(&self, command: Command) -> Result<(), ProtocolError> {
        if !M::permits(command) {
            return Err(ProtocolError::ModeMismatch {
                command,
                mode: M::KIND,
            });
        }
        if self.capture.is_some() {
            return Err(ProtocolError::CaptureActive);
        }
        if self.transport.is_none() {
            return Err(ProtocolError::NotConnected);
        }
        Ok(())
    }

    /// Send a command without waiting for a reply
    pub fn send_command(&mut self, command: Command) -> Result<(), ProtocolError> {
        self.check_dispatch(command)?;
        let port = self.transport.as_mut().ok_or(ProtocolError::NotConnected)?;

        debug!(?command, byte = %(command.byte() as char), "sending command");
        port.write(&[command.byte()])?;
        self.tx_bytes = self.tx_bytes.saturating_add(1);
        Ok(())
    }

    /// Send a command and collect its reply until the port goes idle
    pub fn query(&mut self, command: Command) -> Result<Reply, ProtocolError> {
        self.send_command(command)?;
        std::thread::sleep(self.config.settle_delay());

        let port = self.transport.as_mut().ok_or(ProtocolError::NotConnected)?;
        let mut text = String::new();
        let mut received = 0usize;

        loop {
            if port.bytes_available()? == 0 {
                break;
            }

            let bytes = port.read_available()?;
            if bytes.is_empty() {
                // Reported pending but the read timed out
                break;
            }
            received += bytes.len();

            match decode_chunk(&bytes) {
                Ok(chunk) => text.push_str(&chunk),
                Err(e) => {
                    warn!(?command, error = %e, len = bytes.len(), "skipping undecodable chunk");
                }
            }
        }

        self.rx_bytes = self.rx_bytes.saturating_add(received as u64);
        debug!(?command, received, "reply complete");
        Ok(Reply::from_text(text))
    }

    /// Disconnect from the gauge.
    ///
    /// A running capture is stopped first and its records are discarded.
    pub fn disconnect(&mut self) -> Result<(), ProtocolError> {
        if let Some(worker) = self.capture.take() {
            match worker.stop() {
                Ok((transport, summary)) => {
                    debug!(
                        records = summary.records.len(),
                        "capture discarded by disconnect"
                    );
                    self.transport = Some(transport);
                }
                Err(e) => {
                    // The worker took the transport with it
                    warn!(error = %e, "capture worker failed during disconnect");
                    self.identity = None;
                    self.state = ConnectionState::Disconnected;
                    return Ok(());
                }
            }
        }

        self.identity = None;
        self.state = ConnectionState::Disconnected;

        let mut transport = self.transport.take().ok_or(ProtocolError::NotConnected)?;
        transport.close()?;
        debug!("disconnected");
        Ok(())
    }

    fn release_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close() {
                warn!(error = %e, "failed to close transport");
            }
        }
        self.state = ConnectionState::Disconnected;
    }
}

/// Read and discard whatever the transport still has pending
fn drain_pending<T: Transport + ?Sized>(port: &mut T) -> Result<usize, ProtocolError> {
    let mut discarded = 0usize;
    while port.bytes_available()? > 0 {
        let bytes = port.read_available()?;
        if bytes.is_empty() {
            break;
        }
        discarded += bytes.len();
    }
    Ok(discarded)
}

impl<M: Mode> Drop for Session<M> {
    fn drop(&mut self) {
        if let Some(worker) = self.capture.take() {
            worker.cancel();
        }
        if let Some(mut transport) = self.transport.take() {
            let _ = transport.close();
        }
    }
}

impl Session<Force> {
    /// Get gauge identification (after a successful connect)
    pub fn identity(&self) -> Option<&DeviceIdentity> {
        self.identity.as_ref()
    }

    /// Re-query model, offset and overload counter
    pub fn info(&mut self) -> Result<Reply, ProtocolError> {
        self.query(Command::Info)
    }

    /// Current or max value
    pub fn print_value(&mut self) -> Result<Reply, ProtocolError> {
        self.query(Command::Print)
    }

    /// Current peak tension
    pub fn peak_tension(&mut self) -> Result<Reply, ProtocolError> {
        self.query(Command::PeakTension)
    }

    /// Current peak compression
    pub fn peak_compression(&mut self) -> Result<Reply, ProtocolError> {
        self.query(Command::PeakCompression)
    }

    /// Current value, long format
    pub fn long_output(&mut self) -> Result<Reply, ProtocolError> {
        self.query(Command::LongOutput)
    }

    /// Current value, short format
    pub fn short_output(&mut self) -> Result<Reply, ProtocolError> {
        self.query(Command::ShortOutput)
    }

    /// Current value, mini format
    pub fn mini_output(&mut self) -> Result<Reply, ProtocolError> {
        self.query(Command::MiniOutput)
    }

    /// Zero / tare the gauge
    pub fn zero(&mut self) -> Result<(), ProtocolError> {
        self.send_command(Command::Zero)
    }

    /// Reset stored values
    pub fn reset(&mut self) -> Result<(), ProtocolError> {
        self.send_command(Command::Reset)
    }

    /// Cycle the unit of measurement
    pub fn toggle_unit(&mut self) -> Result<(), ProtocolError> {
        self.send_command(Command::Unit)
    }

    /// Toggle between track and peak mode
    pub fn toggle_mode(&mut self) -> Result<(), ProtocolError> {
        self.send_command(Command::Mode)
    }

    /// Download stored memory rendered as `format` (`raw`, `delimited`, `chart-series`).
    ///
    /// The format is checked before anything is written to the gauge.
    pub fn download(&mut self, format: &str) -> Result<Export, ProtocolError> {
        let format: ExportFormat = format.parse()?;
        self.download_as(format)
    }

    /// Download stored memory rendered as `format`
    pub fn download_as(&mut self, format: ExportFormat) -> Result<Export, ProtocolError> {
        let reply = self.query(Command::Download)?;
        Ok(export::export_memory(
            reply.text(),
            format,
            self.config.delimiter,
        )?)
    }
}

impl Session<Torque> {
    /// Start streaming the gauge output in a background worker
    pub fn start_capture(&mut self) -> Result<(), ProtocolError> {
        if self.capture.is_some() {
            return Err(ProtocolError::CaptureActive);
        }
        let transport = self.transport.take().ok_or(ProtocolError::NotConnected)?;

        self.capture = Some(CaptureWorker::spawn(
            transport,
            self.config.idle_yield(),
            self.config.capture_queue_depth,
        ));
        debug!("torque capture started");
        Ok(())
    }

    /// Check if a capture is running
    pub fn is_capturing(&self) -> bool {
        self.capture.is_some()
    }

    /// Feed chunks queued so far into the stitcher without stopping; returns how many
    pub fn drain_capture(&mut self) -> usize {
        self.capture.as_mut().map(|w| w.drain()).unwrap_or(0)
    }

    /// Stop the capture, wait for the worker to exit and stitch what it collected.
    ///
    /// Blocks the calling thread; do not call from inside an async runtime.
    pub fn stop_capture(&mut self) -> Result<CaptureSummary, ProtocolError> {
        let worker = self
            .capture
            .take()
            .ok_or(ProtocolError::CaptureNotRunning)?;

        match worker.stop() {
            Ok((transport, summary)) => {
                self.transport = Some(transport);
                if let Some(fault) = &summary.fault {
                    warn!(fault = %fault, "capture ended on a transport fault");
                }
                debug!(
                    chunks = summary.chunks,
                    records = summary.records.len(),
                    "torque capture stopped"
                );
                Ok(summary)
            }
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }
}
