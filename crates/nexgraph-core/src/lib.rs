//! # NexGraph Core Library
//!
//! Driver for Nextech DFS/DFT force and torque gauges.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Serial session handling for the gauge's single-byte ASCII protocol
//! - Memory dump parsing (raw text, delimited text, chart series)
//! - Live torque stream capture and record stitching
//! - Export format selection
//!
//! ## Supported Gauges
//!
//! - Nextech DFS series (force)
//! - Nextech DFT series (torque)
//!
//! ## Example
//!
//! ```rust,ignore
//! use nexgraph_core::protocol::{ConnectionConfig, ForceSession};
//!
//! let config = ConnectionConfig::new("/dev/ttyUSB0");
//! let mut session = ForceSession::new(config);
//!
//! if session.connect()? {
//!     println!("Gauge: {}", session.identity().unwrap().model_token);
//!     let csv = session.download("delimited")?;
//! }
//! session.disconnect()?;
//! ```

pub mod export;
pub mod memory;
pub mod protocol;
pub mod torque;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::export::{ChartPoint, Export, ExportError, ExportFormat};
    pub use crate::memory::MemoryRecord;
    pub use crate::protocol::{
        BaudProfile, Command, ConnectionConfig, ConnectionState, DeviceIdentity, ForceSession,
        ProtocolError, Reply, Session, SessionMode, TorqueSession, Transport,
    };
    pub use crate::torque::{CaptureSummary, StreamStitcher, TorqueRecord};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
