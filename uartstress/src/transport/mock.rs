//! In-memory transport for tests.
//!
//! [`MockTransport`] plays the device: every write after a clear arms the next
//! programmed [`Reply`], which later reads deliver. All state sits behind a
//! shared [`MockHandle`], so a test can keep inspecting writes and clears after
//! the transport itself has been moved into the engine.
//!
//! # Example
//!
//! ```
//! use uartstress::payload::ResponseByteOrder;
//! use uartstress::transport::{MockTransport, Transport};
//! use uartstress::transport::mock::Reply;
//!
//! let mut transport = MockTransport::new("MOCK0", 115200);
//! let handle = transport.handle();
//! handle.push_reply(Reply::Checksum(ResponseByteOrder::Little));
//!
//! transport.open().unwrap();
//! transport.clear();
//! assert_eq!(transport.write(&[1, 2, 3]), 3);
//!
//! let mut buf = [0u8; 4];
//! assert_eq!(transport.read(&mut buf), 4);
//! assert_eq!(buf, [6, 0, 0, 0]);
//! assert_eq!(handle.writes(), vec![vec![1, 2, 3]]);
//! ```

use crate::error::{Error, Result};
use crate::payload::{ResponseByteOrder, checksum};
use crate::transport::Transport;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// What the simulated device sends back after receiving a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// The correct checksum of everything written since the last clear.
    Checksum(ResponseByteOrder),
    /// The checksum plus `delta` (wrapping), to provoke a mismatch.
    CorruptChecksum(ResponseByteOrder, u32),
    /// Fixed bytes, regardless of what was written.
    Bytes(Vec<u8>),
    /// Nothing at all.
    Silence,
}

/// Shared state of a mock transport.
#[derive(Debug)]
struct MockState {
    open: bool,
    /// Simulates another process holding the device.
    locked: bool,
    /// Bytes visible to `read`.
    rx: VecDeque<u8>,
    /// Replies consumed in order, one per payload.
    replies: VecDeque<Reply>,
    /// Used once `replies` runs dry.
    default_reply: Reply,
    /// Reply armed by the first write after a clear.
    armed: Option<Reply>,
    /// Read attempts left before an armed reply becomes visible.
    latency_left: usize,
    latency: usize,
    /// Upper bound on bytes accepted per write.
    max_write: Option<usize>,
    written_since_clear: Vec<u8>,
    writes: Vec<Vec<u8>>,
    clears: usize,
    opens: usize,
    closes: usize,
    reads: usize,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            open: false,
            locked: false,
            rx: VecDeque::new(),
            replies: VecDeque::new(),
            default_reply: Reply::Silence,
            armed: None,
            latency_left: 0,
            latency: 0,
            max_write: None,
            written_since_clear: Vec::new(),
            writes: Vec::new(),
            clears: 0,
            opens: 0,
            closes: 0,
            reads: 0,
        }
    }
}

impl MockState {
    /// Move an armed reply into the receive queue once its latency has passed.
    fn deliver_armed(&mut self) {
        if self.armed.is_none() {
            return;
        }
        if self.latency_left > 0 {
            self.latency_left -= 1;
            return;
        }
        let bytes = match self.armed.take() {
            Some(Reply::Checksum(order)) => order
                .encode(checksum(&self.written_since_clear))
                .to_vec(),
            Some(Reply::CorruptChecksum(order, delta)) => order
                .encode(checksum(&self.written_since_clear).wrapping_add(delta))
                .to_vec(),
            Some(Reply::Bytes(bytes)) => bytes,
            Some(Reply::Silence) | None => Vec::new(),
        };
        self.rx.extend(bytes);
    }
}

/// Cloneable view of a mock transport's state.
#[derive(Debug, Clone, Default)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a reply for the next payload.
    pub fn push_reply(&self, reply: Reply) {
        self.lock()
            .replies
            .push_back(reply);
    }

    /// Reply used once the queue is empty.
    pub fn set_default_reply(&self, reply: Reply) {
        self.lock().default_reply = reply;
    }

    /// Number of read attempts that see nothing before a reply shows up.
    pub fn set_latency(&self, polls: usize) {
        self.lock().latency = polls;
    }

    /// Accept at most `max` bytes per write call.
    pub fn set_max_write(&self, max: Option<usize>) {
        self.lock().max_write = max;
    }

    /// Make `open` fail as if another process held the device.
    pub fn set_locked(&self, locked: bool) {
        self.lock().locked = locked;
    }

    /// Put unsolicited bytes into the receive buffer.
    pub fn inject_rx(&self, bytes: &[u8]) {
        self.lock()
            .rx
            .extend(bytes.iter().copied());
    }

    /// Every write call, in order, with the bytes that were accepted.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.lock()
            .writes
            .clone()
    }

    /// Number of `clear` calls while open.
    pub fn clears(&self) -> usize {
        self.lock().clears
    }

    /// Number of successful opens.
    pub fn opens(&self) -> usize {
        self.lock().opens
    }

    /// Number of closes that released an open device.
    pub fn closes(&self) -> usize {
        self.lock().closes
    }

    /// Number of read calls while open.
    pub fn reads(&self) -> usize {
        self.lock().reads
    }

    /// Whether the transport currently holds the simulated device.
    pub fn is_open(&self) -> bool {
        self.lock().open
    }
}

/// Transport that simulates a checksum-echo device in memory.
#[derive(Debug)]
pub struct MockTransport {
    port_name: String,
    baud_rate: u32,
    handle: MockHandle,
}

impl MockTransport {
    /// Create a closed mock transport that stays silent until replies are queued.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            handle: MockHandle::default(),
        }
    }

    /// Create a mock that answers every payload correctly.
    pub fn echoing(port_name: impl Into<String>, baud_rate: u32, order: ResponseByteOrder) -> Self {
        let transport = Self::new(port_name, baud_rate);
        transport
            .handle
            .set_default_reply(Reply::Checksum(order));
        transport
    }

    /// Shared handle for programming and inspecting this transport.
    pub fn handle(&self) -> MockHandle {
        self.handle
            .clone()
    }
}

impl Transport for MockTransport {
    fn open(&mut self) -> Result<()> {
        let mut state = self.handle.lock();
        if state.open {
            return Ok(());
        }
        if state.locked {
            return Err(Error::DeviceBusy(self.port_name.clone()));
        }
        state.open = true;
        state.opens += 1;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        let mut state = self.handle.lock();
        if !state.open {
            return 0;
        }
        state.reads += 1;
        state.deliver_armed();

        let n = buf
            .len()
            .min(state.rx.len());
        for (slot, byte) in buf
            .iter_mut()
            .zip(state.rx.drain(..n))
        {
            *slot = byte;
        }
        n
    }

    fn write(&mut self, data: &[u8]) -> usize {
        let mut state = self.handle.lock();
        if !state.open {
            return 0;
        }
        let accepted = state
            .max_write
            .map_or(data.len(), |max| data.len().min(max));
        let chunk = &data[..accepted];

        state.writes.push(chunk.to_vec());
        state
            .written_since_clear
            .extend_from_slice(chunk);

        if state.armed.is_none() {
            let reply = state
                .replies
                .pop_front()
                .unwrap_or_else(|| state.default_reply.clone());
            state.armed = Some(reply);
            state.latency_left = state.latency;
        }
        accepted
    }

    fn clear(&mut self) {
        let mut state = self.handle.lock();
        if !state.open {
            return;
        }
        state.clears += 1;
        state.rx.clear();
        state.armed = None;
        state.written_since_clear.clear();
    }

    fn close(&mut self) {
        let mut state = self.handle.lock();
        if state.open {
            state.open = false;
            state.closes += 1;
            state.armed = None;
            state.rx.clear();
        }
    }

    fn is_open(&self) -> bool {
        self.handle.is_open()
    }

    fn port_name(&self) -> &str {
        &self.port_name
    }

    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        self.close();
    }
}
