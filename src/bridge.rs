//! Bounded byte conduit between the blocking compressor and the flush loop.
//!
//! The writer half implements [`std::io::Write`] and blocks its thread while
//! the buffer holds `capacity` bytes. The reader half never blocks: it drains
//! whatever is buffered and can await a readiness notification. The fixed
//! capacity is the only backpressure between the two halves, so memory held
//! here never exceeds `capacity` no matter how large the archive grows.

use std::io::{self, Write};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use parking_lot::{Condvar, Mutex};
use tokio::sync::Notify;

struct State {
    data: BytesMut,
    writer_closed: bool,
    reader_closed: bool,
}

struct Shared {
    state: Mutex<State>,
    space: Condvar,
    readable: Notify,
    capacity: usize,
}

/// Create a bridge holding at most `capacity` bytes (at least one).
pub fn channel(capacity: usize) -> (BridgeWriter, BridgeReader) {
    let capacity = capacity.max(1);
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            data: BytesMut::with_capacity(capacity),
            writer_closed: false,
            reader_closed: false,
        }),
        space: Condvar::new(),
        readable: Notify::new(),
        capacity,
    });

    (
        BridgeWriter {
            shared: Arc::clone(&shared),
        },
        BridgeReader { shared },
    )
}

/// Blocking write half. Dropping it marks the end of the byte stream.
pub struct BridgeWriter {
    shared: Arc<Shared>,
}

impl BridgeWriter {
    /// Mark the end of the byte stream. The reader is told in `Drop`.
    pub fn close(self) {
        drop(self);
    }
}

impl Write for BridgeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut state = self.shared.state.lock();
        loop {
            if state.reader_closed {
                return Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "bridge reader closed",
                ));
            }

            let free = self.shared.capacity - state.data.len();
            if free > 0 {
                let n = free.min(buf.len());
                state.data.extend_from_slice(&buf[..n]);
                drop(state);
                self.shared.readable.notify_one();
                return Ok(n);
            }

            // Full: stall until the reader drains or goes away
            self.shared.space.wait(&mut state);
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for BridgeWriter {
    fn drop(&mut self) {
        self.shared.state.lock().writer_closed = true;
        self.shared.readable.notify_one();
    }
}

/// Non-blocking read half.
pub struct BridgeReader {
    shared: Arc<Shared>,
}

impl BridgeReader {
    /// Take every buffered byte, waking a writer stalled on a full buffer.
    pub fn drain(&self) -> Bytes {
        let chunk = {
            let mut state = self.shared.state.lock();
            state.data.split().freeze()
        };
        if !chunk.is_empty() {
            self.shared.space.notify_all();
        }
        chunk
    }

    /// Wait until the writer has pushed bytes or closed since the last wakeup.
    ///
    /// Spurious wakeups are possible; callers re-check with [`drain`](Self::drain).
    pub async fn readable(&self) {
        self.shared.readable.notified().await;
    }

    /// Number of bytes currently buffered.
    pub fn len(&self) -> usize {
        self.shared.state.lock().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// True once the writer is gone and every byte has been drained.
    pub fn is_finished(&self) -> bool {
        let state = self.shared.state.lock();
        state.writer_closed && state.data.is_empty()
    }

    /// Close the read side. Buffered bytes are discarded and any current or
    /// future write fails with `BrokenPipe`.
    pub fn close(&self) {
        {
            let mut state = self.shared.state.lock();
            state.reader_closed = true;
            state.data.clear();
        }
        self.shared.space.notify_all();
    }
}
