//! Pull-based view of a generation run.
//!
//! [`ArchiveStream`] subscribes to a [`ZipGenerator`] and exposes the chunks
//! as a [`Stream`]. Chunks pushed by the generator are queued; once
//! `high_water` of them are waiting, the generator is paused, and it is
//! resumed when the consumer has pulled the queue down to half of that. A
//! consumer that stops polling (for example because its socket is full)
//! therefore stops the generator after a bounded number of chunks.

use bytes::Bytes;
use futures_util::Stream;
use parking_lot::Mutex;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll, ready};
use tokio::sync::mpsc;

use crate::error::{GenerateError, ProtocolError};
use crate::generator::{Controller, Subscription, ZipGenerator};
use crate::source::EntrySource;

/// Queued chunks before the generator is paused
pub const DEFAULT_HIGH_WATER: usize = 4;

enum Event {
    Chunk(Bytes),
    Error(GenerateError),
    Complete,
}

#[derive(Default)]
struct Flow {
    queued: usize,
    paused: bool,
}

/// Stream of archive chunks, ending with `None` on completion or after
/// yielding the single error of a failed run. Dropping it cancels the run.
pub struct ArchiveStream {
    events: mpsc::UnboundedReceiver<Event>,
    flow: Arc<Mutex<Flow>>,
    controller: Controller,
    low_water: usize,
    done: bool,
}

impl ArchiveStream {
    pub fn subscribe<S: EntrySource>(
        generator: &ZipGenerator<S>,
        high_water: usize,
    ) -> Result<Self, ProtocolError> {
        let high_water = high_water.max(1);
        let (tx, events) = mpsc::unbounded_channel();
        let flow = Arc::new(Mutex::new(Flow::default()));
        let cell: Arc<OnceLock<Controller>> = Arc::new(OnceLock::new());

        let on_chunk = {
            let tx = tx.clone();
            let flow = Arc::clone(&flow);
            let cell = Arc::clone(&cell);
            move |chunk: Bytes| {
                let mut flow = flow.lock();
                flow.queued += 1;
                let _ = tx.send(Event::Chunk(chunk));
                if flow.queued >= high_water && !flow.paused {
                    if let Some(controller) = cell.get() {
                        flow.paused = true;
                        controller.pause();
                    }
                }
            }
        };
        let on_error = {
            let tx = tx.clone();
            move |err: GenerateError| {
                let _ = tx.send(Event::Error(err));
            }
        };
        let on_complete = move || {
            let _ = tx.send(Event::Complete);
        };

        let controller = generator.subscribe(Subscription::new(on_chunk, on_error, on_complete))?;
        let _ = cell.set(controller.clone());

        Ok(Self {
            events,
            flow,
            controller,
            low_water: high_water / 2,
            done: false,
        })
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    /// Account for a chunk leaving the queue, resuming the generator once
    /// the queue has drained enough
    fn consumed(&self) {
        let resume = {
            let mut flow = self.flow.lock();
            flow.queued = flow.queued.saturating_sub(1);
            let resume = flow.paused && flow.queued <= self.low_water;
            if resume {
                flow.paused = false;
            }
            resume
        };

        // Outside the flow lock: the generator's dispatch lock is always
        // taken before it
        if resume && self.controller.resume().is_err() {
            log::trace!("generator closed before it could be resumed");
        }
    }
}

impl Stream for ArchiveStream {
    type Item = Result<Bytes, GenerateError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }

        match ready!(self.events.poll_recv(cx)) {
            Some(Event::Chunk(chunk)) => {
                self.consumed();
                Poll::Ready(Some(Ok(chunk)))
            }
            Some(Event::Error(err)) => {
                self.done = true;
                Poll::Ready(Some(Err(err)))
            }
            Some(Event::Complete) | None => {
                self.done = true;
                Poll::Ready(None)
            }
        }
    }
}

impl Drop for ArchiveStream {
    fn drop(&mut self) {
        self.controller.cancel();
    }
}
