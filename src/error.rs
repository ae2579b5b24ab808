use thiserror::Error;

/// Errors that cross a component boundary as an `Err` value.
///
/// In-protocol conditions (stale messages, log mismatches, quorum not yet
/// reached) are *not* represented here: per the error handling design they
/// are handled locally by branching on role/term and are never surfaced as
/// an `Error`. This enum exists only for conditions that abort a single
/// operation outright: an unparseable wire message, a transport failure, or
/// a bad CLI invocation.
#[derive(Debug, Error)]
pub enum Error {
    #[error("bad message: {0}")]
    BadMessage(String),

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;
