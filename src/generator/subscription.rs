use bytes::Bytes;
use std::sync::Arc;

use super::{GeneratorState, Shared};
use crate::error::{GenerateError, ProtocolError};

/// Callbacks receiving one generation run.
///
/// All three handlers are required and fixed once the subscription is
/// built. They are invoked one at a time from the generator's driver task:
/// `on_chunk` any number of times, then exactly one of `on_error` or
/// `on_complete`, unless the run is cancelled first.
pub struct Subscription {
    pub(crate) on_chunk: Box<dyn FnMut(Bytes) + Send>,
    pub(crate) on_error: Option<Box<dyn FnOnce(GenerateError) + Send>>,
    pub(crate) on_complete: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new<C, E, D>(on_chunk: C, on_error: E, on_complete: D) -> Self
    where
        C: FnMut(Bytes) + Send + 'static,
        E: FnOnce(GenerateError) + Send + 'static,
        D: FnOnce() + Send + 'static,
    {
        Self {
            on_chunk: Box::new(on_chunk),
            on_error: Some(Box::new(on_error)),
            on_complete: Some(Box::new(on_complete)),
        }
    }
}

/// Flow control for a running generation.
///
/// Cheap to clone; every clone controls the same run.
#[derive(Clone)]
pub struct Controller {
    shared: Arc<Shared>,
}

impl Controller {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Stop delivering chunks and reading entries. No-op unless active.
    ///
    /// Once this returns no further chunk is delivered until [`resume`](Self::resume).
    pub fn pause(&self) {
        let state = self.shared.lock();
        if state.get() == GeneratorState::Active {
            state.set(GeneratorState::Paused);
            log::trace!("generator paused");
            self.shared.changed.notify_one();
        }
    }

    /// Restart both loops after a pause. No-op when already active.
    pub fn resume(&self) -> Result<(), ProtocolError> {
        let state = self.shared.lock();
        match state.get() {
            GeneratorState::Closed => Err(ProtocolError::ResumeAfterClose),
            GeneratorState::Paused => {
                state.set(GeneratorState::Active);
                log::trace!("generator resumed");
                self.shared.changed.notify_one();
                Ok(())
            }
            GeneratorState::Active => Ok(()),
        }
    }

    /// Close the run immediately.
    ///
    /// Releases the compressor and any open entry; a blocking write stalled
    /// on the bridge fails and unwinds on its own. Neither `on_error` nor
    /// `on_complete` is guaranteed to fire afterwards.
    pub fn cancel(&self) {
        let state = self.shared.lock();
        if state.get() != GeneratorState::Closed {
            state.set(GeneratorState::Closed);
            self.shared.bridge.close();
            log::debug!("generator cancelled");
            self.shared.changed.notify_one();
        }
    }

    pub fn state(&self) -> GeneratorState {
        self.shared.state()
    }
}
