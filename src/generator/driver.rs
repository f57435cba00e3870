use std::future::Future;
use std::io::{self, Read, Write};
use std::pin::Pin;
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};

use super::{GeneratorConfig, GeneratorState, Shared, Subscription};
use crate::bridge::BridgeWriter;
use crate::error::GenerateError;
use crate::source::{ArchiveEntry, EntryReader, EntrySource};
use crate::zip::ZipStreamWriter;

type Compressor = ZipStreamWriter<BridgeWriter>;
type OpenFuture = Pin<Box<dyn Future<Output = io::Result<EntryReader>> + Send>>;

/// Everything the blocking side needs; moved into each blocking job and
/// handed back with its outcome.
struct Work {
    compressor: Compressor,
    reader: Option<EntryReader>,
    buf: Vec<u8>,
}

enum Job {
    /// Move one chunk from the open entry into the compressor, first
    /// writing the local header when `start` names a new entry
    Pump { start: Option<String> },
    /// Write the central directory and close the bridge
    Finish,
}

enum JobError {
    Read(io::Error),
    Write(io::Error),
}

enum Outcome {
    Wrote(Work),
    EntryDone(Work),
    Finished,
    Failed(JobError),
}

/// Where the entry loop stands
#[derive(Default)]
enum Phase {
    Idle(Work),
    Opening { work: Work, open: OpenFuture },
    Working(JoinHandle<Outcome>),
    Finished,
    #[default]
    Released,
}

enum Progress {
    Opened(io::Result<EntryReader>),
    Worked(Result<Outcome, JoinError>),
}

impl Phase {
    /// Wait for the pending open or blocking job. Cancel safe: nothing is
    /// consumed until the awaited operation completes.
    async fn progress(&mut self) -> Progress {
        match self {
            Phase::Opening { open, .. } => Progress::Opened(open.await),
            Phase::Working(job) => Progress::Worked(job.await),
            _ => std::future::pending().await,
        }
    }
}

/// Single task running both loops and every subscriber callback
pub(super) struct Driver<S: EntrySource> {
    source: S,
    phase: Phase,
    subscription: Subscription,
    shared: Arc<Shared>,
    current: String,
    entries: u64,
    delivered: u64,
}

impl<S: EntrySource> Driver<S> {
    pub(super) fn new(
        source: S,
        writer: BridgeWriter,
        config: &GeneratorConfig,
        subscription: Subscription,
        shared: Arc<Shared>,
    ) -> Self {
        let work = Work {
            compressor: ZipStreamWriter::new(writer, config.modified),
            reader: None,
            buf: vec![0u8; config.chunk_size.max(1)],
        };

        Self {
            source,
            phase: Phase::Idle(work),
            subscription,
            shared,
            current: String::new(),
            entries: 0,
            delivered: 0,
        }
    }

    pub(super) async fn run(mut self) {
        let shared = Arc::clone(&self.shared);

        loop {
            match shared.state() {
                GeneratorState::Closed => return self.release(),
                GeneratorState::Paused => {
                    shared.changed.notified().await;
                    continue;
                }
                GeneratorState::Active => {}
            }

            // Flush turn, taken on every wakeup
            if !self.flush() {
                continue;
            }

            if matches!(self.phase, Phase::Idle(_)) {
                self.schedule();
            }

            if matches!(self.phase, Phase::Finished) && shared.bridge.is_finished() {
                return self.complete();
            }

            let progress = tokio::select! {
                _ = shared.changed.notified() => None,
                _ = shared.bridge.readable() => None,
                progress = self.phase.progress() => Some(progress),
            };

            if let Some(progress) = progress {
                if let Err(err) = self.advance(progress) {
                    return self.fail(err);
                }
            }
        }
    }

    /// Deliver everything buffered in the bridge as one chunk.
    /// Returns false when the generator is no longer active.
    fn flush(&mut self) -> bool {
        let state = self.shared.lock();
        if state.get() != GeneratorState::Active {
            return false;
        }

        let chunk = self.shared.bridge.drain();
        if !chunk.is_empty() {
            self.delivered += chunk.len() as u64;
            (self.subscription.on_chunk)(chunk);
        }
        true
    }

    /// Start the next step of the entry loop from `Phase::Idle`
    fn schedule(&mut self) {
        let Phase::Idle(work) = std::mem::take(&mut self.phase) else {
            return;
        };

        self.phase = if work.reader.is_some() {
            spawn(work, Job::Pump { start: None })
        } else if let Some(entry) = self.next_entry() {
            self.current = entry.path().to_string();
            log::debug!("opening entry {}", self.current);
            Phase::Opening {
                work,
                open: entry.open(),
            }
        } else {
            log::debug!("source exhausted after {} entries, writing trailer", self.entries);
            spawn(work, Job::Finish)
        };
    }

    fn next_entry(&mut self) -> Option<S::Entry> {
        if self.source.has_next() {
            self.source.next_entry()
        } else {
            None
        }
    }

    fn advance(&mut self, progress: Progress) -> Result<(), GenerateError> {
        self.phase = match (std::mem::take(&mut self.phase), progress) {
            (Phase::Opening { mut work, .. }, Progress::Opened(Ok(reader))) => {
                work.reader = Some(reader);
                spawn(
                    work,
                    Job::Pump {
                        start: Some(self.current.clone()),
                    },
                )
            }
            (_, Progress::Opened(Err(source))) => {
                return Err(GenerateError::EntryOpen {
                    path: self.current.clone(),
                    source,
                });
            }
            // Only an opening phase yields an opened reader
            (phase, Progress::Opened(Ok(_))) => phase,
            (_, Progress::Worked(Ok(outcome))) => match outcome {
                Outcome::Wrote(work) => Phase::Idle(work),
                Outcome::EntryDone(work) => {
                    self.entries += 1;
                    log::debug!("entry {} compressed", self.current);
                    Phase::Idle(work)
                }
                Outcome::Finished => Phase::Finished,
                Outcome::Failed(JobError::Read(source)) => {
                    return Err(GenerateError::EntryRead {
                        path: self.current.clone(),
                        source,
                    });
                }
                Outcome::Failed(JobError::Write(source)) => {
                    return Err(GenerateError::Compression(source));
                }
            },
            (_, Progress::Worked(Err(join))) => {
                return Err(GenerateError::Compression(io::Error::other(join)));
            }
        };
        Ok(())
    }

    fn complete(mut self) {
        let shared = Arc::clone(&self.shared);
        let state = shared.lock();
        if state.get() == GeneratorState::Closed {
            return;
        }
        state.set(GeneratorState::Closed);

        log::info!(
            "archive complete: {} entries, {} bytes",
            self.entries,
            self.delivered
        );
        if let Some(on_complete) = self.subscription.on_complete.take() {
            on_complete();
        }
    }

    fn fail(mut self, err: GenerateError) {
        self.phase = Phase::Released;
        let shared = Arc::clone(&self.shared);
        let state = shared.lock();
        shared.bridge.close();
        if state.get() == GeneratorState::Closed {
            log::debug!("generation already closed, dropping error: {err}");
            return;
        }
        state.set(GeneratorState::Closed);

        log::error!(
            "archive generation failed after {} bytes: {err}",
            self.delivered
        );
        if let Some(on_error) = self.subscription.on_error.take() {
            on_error(err);
        }
    }

    /// Drop the compressor and any open entry after a cancel
    fn release(mut self) {
        self.phase = Phase::Released;
        self.shared.bridge.close();
        log::debug!(
            "generation cancelled after {} entries, {} bytes",
            self.entries,
            self.delivered
        );
    }
}

fn spawn(work: Work, job: Job) -> Phase {
    Phase::Working(tokio::task::spawn_blocking(move || run_job(work, job)))
}

fn run_job(mut work: Work, job: Job) -> Outcome {
    let start = match job {
        Job::Finish => {
            return match work.compressor.finish() {
                Ok(writer) => {
                    writer.close();
                    Outcome::Finished
                }
                Err(err) => Outcome::Failed(JobError::Write(err)),
            };
        }
        Job::Pump { start } => start,
    };

    if let Some(path) = start {
        if let Err(err) = work.compressor.start_entry(&path) {
            return Outcome::Failed(JobError::Write(err));
        }
    }

    let Some(reader) = work.reader.as_mut() else {
        return Outcome::EntryDone(work);
    };
    let n = match read_chunk(reader, &mut work.buf) {
        Ok(n) => n,
        Err(err) => return Outcome::Failed(JobError::Read(err)),
    };

    if n == 0 {
        // End of entry: close its stream before moving on
        work.reader = None;
        return match work.compressor.finish_entry() {
            Ok(()) => Outcome::EntryDone(work),
            Err(err) => Outcome::Failed(JobError::Write(err)),
        };
    }

    match work.compressor.write_all(&work.buf[..n]) {
        Ok(()) => Outcome::Wrote(work),
        Err(err) => Outcome::Failed(JobError::Write(err)),
    }
}

fn read_chunk(reader: &mut EntryReader, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match reader.read(buf) {
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            result => return result,
        }
    }
}
