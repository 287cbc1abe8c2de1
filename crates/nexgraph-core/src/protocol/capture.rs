//! Background torque capture
//!
//! The worker owns the transport for the duration of a capture, polls it for
//! pending bytes and forwards decoded chunks over a bounded channel. The
//! session side feeds those chunks to a [`StreamStitcher`].

use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{decode_chunk, ProtocolError, Transport};
use crate::torque::{CaptureSummary, StreamStitcher};

/// What the worker hands back when it exits
struct WorkerExit {
    transport: Box<dyn Transport>,
    fault: Option<String>,
}

pub(crate) struct CaptureWorker {
    cancel: CancellationToken,
    chunks: mpsc::Receiver<String>,
    handle: Option<JoinHandle<WorkerExit>>,
    stitcher: StreamStitcher,
}

impl CaptureWorker {
    pub(crate) fn spawn(transport: Box<dyn Transport>, idle_yield: Duration, depth: usize) -> Self {
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(depth.max(1));

        let token = cancel.clone();
        let handle = thread::spawn(move || poll_transport(transport, token, tx, idle_yield));

        Self {
            cancel,
            chunks: rx,
            handle: Some(handle),
            stitcher: StreamStitcher::new(),
        }
    }

    /// Move already queued chunks into the stitcher
    pub(crate) fn drain(&mut self) -> usize {
        let mut count = 0;
        while let Ok(chunk) = self.chunks.try_recv() {
            self.stitcher.push(&chunk);
            count += 1;
        }
        count
    }

    /// Signal the worker without waiting for it
    pub(crate) fn cancel(self) {
        self.cancel.cancel();
    }

    /// Cancel, collect every queued chunk until the worker exits, then join it.
    ///
    /// Receiving while waiting keeps a worker blocked on a full queue moving,
    /// so it always reaches its next cancellation check.
    pub(crate) fn stop(mut self) -> Result<(Box<dyn Transport>, CaptureSummary), ProtocolError> {
        self.cancel.cancel();

        while let Some(chunk) = self.chunks.blocking_recv() {
            self.stitcher.push(&chunk);
        }

        let handle = self
            .handle
            .take()
            .ok_or_else(|| ProtocolError::Transport("capture worker already joined".to_string()))?;
        let exit = handle
            .join()
            .map_err(|_| ProtocolError::Transport("capture worker panicked".to_string()))?;

        let mut summary = std::mem::take(&mut self.stitcher).finish();
        summary.fault = exit.fault;
        Ok((exit.transport, summary))
    }
}

impl Drop for CaptureWorker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn poll_transport(
    mut transport: Box<dyn Transport>,
    cancel: CancellationToken,
    tx: mpsc::Sender<String>,
    idle_yield: Duration,
) -> WorkerExit {
    let mut fault = None;

    while !cancel.is_cancelled() {
        let available = match transport.bytes_available() {
            Ok(n) => n,
            Err(e) => {
                fault = Some(e.to_string());
                break;
            }
        };

        if available == 0 {
            thread::sleep(idle_yield);
            continue;
        }

        let bytes = match transport.read_available() {
            Ok(bytes) => bytes,
            Err(e) => {
                fault = Some(e.to_string());
                break;
            }
        };
        if bytes.is_empty() {
            thread::sleep(idle_yield);
            continue;
        }

        match decode_chunk(&bytes) {
            Ok(chunk) => {
                if tx.blocking_send(chunk).is_err() {
                    // Receiver gone, nobody is listening any more
                    break;
                }
            }
            Err(e) => warn!(error = %e, len = bytes.len(), "skipping undecodable capture chunk"),
        }
    }

    if let Some(fault) = &fault {
        warn!(fault = %fault, "capture worker stopped on transport error");
    } else {
        debug!("capture worker observed cancellation");
    }

    WorkerExit { transport, fault }
}
