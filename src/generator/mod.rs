//! Streaming archive generation.
//!
//! A [`ZipGenerator`] turns an [`EntrySource`] into a ZIP byte stream pushed
//! to a consumer in chunks. Two loops cooperate:
//!
//! - the **entry loop** opens each entry, reads it in chunks and feeds the
//!   compressor. Reads and compressor writes run on tokio's blocking pool, one
//!   operation at a time, because a write stalls while the bridge buffer is
//!   full.
//! - the **flush loop** drains the bridge buffer into one chunk per turn and
//!   hands it to the subscriber.
//!
//! Both are driven by a single task, which also runs every subscriber
//! callback. The driver wakes whenever the bridge has bytes, the in-flight
//! blocking operation finishes, or the controller changes state, and drains
//! the bridge on every wakeup. The entry loop can therefore stall on a full
//! bridge but never while the driver is waiting on it.
//!
//! ```text
//! EntrySource ─▶ entry loop ─▶ ZipStreamWriter ─▶ bridge ─▶ flush loop ─▶ on_chunk
//!                (blocking pool)                  (≤ C bytes)  (driver task)
//! ```
//!
//! Memory stays bounded by the bridge capacity plus one read buffer,
//! independent of archive size.

mod driver;
mod subscription;

pub use subscription::{Controller, Subscription};

use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use std::cell::Cell;
use std::sync::Arc;
use tokio::sync::Notify;

use crate::bridge::{self, BridgeReader, BridgeWriter};
use crate::error::ProtocolError;
use crate::source::EntrySource;
use crate::zip::DosDateTime;

use driver::Driver;

/// Size of the chunks read from entries, and capacity of the bridge buffer
pub const DEFAULT_CHUNK_SIZE: usize = 8092;

/// Lifecycle of a generator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    Active,
    Paused,
    /// Terminal: completed, failed or cancelled
    Closed,
}

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Bridge capacity and entry read size, in bytes (at least 1)
    pub chunk_size: usize,
    /// Modification time stamped on every entry
    pub modified: DosDateTime,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            modified: DosDateTime::now(),
        }
    }
}

/// State shared between the driver task and every [`Controller`].
///
/// The reentrant lock doubles as the dispatch lock: the driver holds it while
/// invoking a callback, so a concurrent pause/resume/cancel waits for the
/// callback to return, while the same call made from inside the callback
/// re-enters.
pub(crate) struct Shared {
    state: ReentrantMutex<Cell<GeneratorState>>,
    changed: Notify,
    bridge: BridgeReader,
}

impl Shared {
    pub(crate) fn lock(&self) -> ReentrantMutexGuard<'_, Cell<GeneratorState>> {
        self.state.lock()
    }

    pub(crate) fn state(&self) -> GeneratorState {
        self.state.lock().get()
    }
}

struct Pending<S> {
    source: S,
    writer: BridgeWriter,
    config: GeneratorConfig,
}

/// Generates a ZIP archive from an [`EntrySource`] for exactly one subscriber.
pub struct ZipGenerator<S: EntrySource> {
    pending: Mutex<Option<Pending<S>>>,
    shared: Arc<Shared>,
}

impl<S: EntrySource> ZipGenerator<S> {
    pub fn new(source: S, config: GeneratorConfig) -> Self {
        let (writer, reader) = bridge::channel(config.chunk_size);
        Self {
            pending: Mutex::new(Some(Pending {
                source,
                writer,
                config,
            })),
            shared: Arc::new(Shared {
                state: ReentrantMutex::new(Cell::new(GeneratorState::Active)),
                changed: Notify::new(),
                bridge: reader,
            }),
        }
    }

    /// Start generating, delivering through `subscription`.
    ///
    /// Spawns the driver on the current Tokio runtime, so it must be called
    /// from within one. Only the first call succeeds; later calls fail with a
    /// [`ProtocolError`] and leave the running generation untouched.
    pub fn subscribe(&self, subscription: Subscription) -> Result<Controller, ProtocolError> {
        let Some(pending) = self.pending.lock().take() else {
            return Err(match self.shared.state() {
                GeneratorState::Closed => ProtocolError::SubscribeAfterClose,
                _ => ProtocolError::AlreadySubscribed,
            });
        };

        log::debug!(
            "starting archive generation (chunk size {})",
            pending.config.chunk_size
        );
        let driver = Driver::new(
            pending.source,
            pending.writer,
            &pending.config,
            subscription,
            Arc::clone(&self.shared),
        );
        tokio::spawn(driver.run());

        Ok(Controller::new(Arc::clone(&self.shared)))
    }

    pub fn state(&self) -> GeneratorState {
        self.shared.state()
    }
}
