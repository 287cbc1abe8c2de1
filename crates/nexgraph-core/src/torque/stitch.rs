//! Record stitching
//!
//! Serial chunks arrive whenever bytes happen to be available, so one torque
//! record may be split over several chunks. Fragments are collected in a
//! pending buffer until the buffer itself forms a complete record.

use super::{CaptureSummary, TorqueRecord};

/// Reassembles torque records from stream chunks
#[derive(Debug, Default)]
pub struct StreamStitcher {
    /// Fragments not yet forming a record
    pending: String,
    /// Completed records in arrival order
    records: Vec<TorqueRecord>,
    /// Number of chunks pushed
    chunks: usize,
}

impl StreamStitcher {
    /// Create an empty stitcher
    pub fn new() -> Self {
        Self::default()
    }

    /// Push one chunk as received from the transport.
    ///
    /// The pending buffer is flushed first if it already holds a record. A
    /// chunk that is a record by itself goes straight to the output; anything
    /// else is appended to the pending buffer.
    pub fn push(&mut self, chunk: &str) {
        self.chunks += 1;

        if let Some(record) = TorqueRecord::parse(&self.pending) {
            self.records.push(record);
            self.pending.clear();
        }

        let chunk = chunk.trim();
        if chunk.is_empty() {
            return;
        }

        match TorqueRecord::parse(chunk) {
            Some(record) => self.records.push(record),
            None => {
                if !self.pending.is_empty() {
                    self.pending.push(' ');
                }
                self.pending.push_str(chunk);
            }
        }
    }

    /// Fragments waiting for completion
    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// Records completed so far
    pub fn records(&self) -> &[TorqueRecord] {
        &self.records
    }

    /// End the run.
    ///
    /// A pending buffer that forms a record is kept. One that never completed
    /// is not turned into a record; it is reported as `unmatched`.
    pub fn finish(mut self) -> CaptureSummary {
        let mut unmatched = None;
        if let Some(record) = TorqueRecord::parse(&self.pending) {
            self.records.push(record);
        } else if !self.pending.is_empty() {
            unmatched = Some(std::mem::take(&mut self.pending));
        }

        CaptureSummary {
            records: self.records,
            unmatched,
            chunks: self.chunks,
            fault: None,
        }
    }
}
