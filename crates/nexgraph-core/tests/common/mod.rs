#![allow(dead_code)]

use nexgraph_core::protocol::{ConnectionConfig, Transport};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex};

/// Shared state behind a [`MockGauge`], inspectable from the test
#[derive(Default)]
pub struct MockState {
    /// Every byte written
    pub written: Vec<u8>,
    /// Number of write calls
    pub write_calls: usize,
    /// Chunks waiting to be read, one chunk per `read_available`
    pub inbox: VecDeque<Vec<u8>>,
    /// Chunks queued whenever the given command byte is written
    pub replies: HashMap<u8, Vec<Vec<u8>>>,
    pub closed: bool,
    pub fail_writes: bool,
    pub fail_reads: bool,
    /// Panic on the next poll, as a crashed driver thread would
    pub panic_reads: bool,
}

/// Mock gauge: replies are queued per command byte and delivered in chunks
#[derive(Clone, Default)]
pub struct MockGauge {
    pub state: Arc<Mutex<MockState>>,
}

impl MockGauge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `chunks` as the reply to `byte`
    pub fn reply(self, byte: u8, chunks: &[&str]) -> Self {
        self.reply_raw(byte, chunks.iter().map(|c| c.as_bytes().to_vec()).collect())
    }

    /// Queue raw byte chunks as the reply to `byte`
    pub fn reply_raw(self, byte: u8, chunks: Vec<Vec<u8>>) -> Self {
        self.state.lock().unwrap().replies.insert(byte, chunks);
        self
    }

    /// Make `chunks` readable right away
    pub fn stream(&self, chunks: &[&str]) {
        let mut state = self.state.lock().unwrap();
        for chunk in chunks {
            state.inbox.push_back(chunk.as_bytes().to_vec());
        }
    }

    pub fn written(&self) -> Vec<u8> {
        self.state.lock().unwrap().written.clone()
    }

    pub fn write_calls(&self) -> usize {
        self.state.lock().unwrap().write_calls
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    pub fn pending_chunks(&self) -> usize {
        self.state.lock().unwrap().inbox.len()
    }
}

impl Transport for MockGauge {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "write failed"));
        }
        state.write_calls += 1;
        state.written.extend_from_slice(bytes);
        for byte in bytes {
            if let Some(chunks) = state.replies.get(byte).cloned() {
                state.inbox.extend(chunks);
            }
        }
        Ok(())
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        let state = self.state.lock().unwrap();
        if state.panic_reads {
            drop(state);
            panic!("mock gauge driver crashed");
        }
        if state.fail_reads {
            return Err(io::Error::new(io::ErrorKind::Other, "device unplugged"));
        }
        Ok(state.inbox.front().map(|c| c.len()).unwrap_or(0))
    }

    fn read_available(&mut self) -> io::Result<Vec<u8>> {
        let mut state = self.state.lock().unwrap();
        Ok(state.inbox.pop_front().unwrap_or_default())
    }

    fn close(&mut self) -> io::Result<()> {
        self.state.lock().unwrap().closed = true;
        Ok(())
    }
}

/// Configuration with no delays so tests run fast
pub fn fast_config() -> ConnectionConfig {
    ConnectionConfig {
        read_timeout_ms: 50,
        settle_delay_ms: 0,
        idle_yield_ms: 1,
        ..ConnectionConfig::new("/dev/ttyUSB0")
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
