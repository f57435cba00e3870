//! Error types for archive generation.

use std::io;
use thiserror::Error;

/// Failure that terminates a generation run.
///
/// Reported exactly once through the subscription's error handler; no chunk
/// or completion follows it.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("failed to open entry {path}: {source}")]
    EntryOpen {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to read entry {path}: {source}")]
    EntryRead {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("compression failed: {0}")]
    Compression(#[source] io::Error),
}

/// Misuse of the generator contract.
///
/// Returned synchronously at the call site; never alters the state of a run
/// that is already in progress.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("generator already has a subscriber")]
    AlreadySubscribed,

    #[error("cannot subscribe, generator already closed")]
    SubscribeAfterClose,

    #[error("cannot resume, generator already closed")]
    ResumeAfterClose,
}
